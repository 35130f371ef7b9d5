//! Outbound notification capability (spec §4.7, §9 "async side effects
//! after commit").
//!
//! User/tenant management and the real email/WhatsApp transport are
//! external collaborators (spec §1); the core only needs a trait to call
//! into after a transaction commits, plus a trivial logging implementation
//! for dev/test.

use crate::ids::{DocumentId, SignerId};
use crate::model::AuthChannel;

/// A notification the core wants delivered, fire-and-forget, after a
/// transaction has committed.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// A signer was invited and should receive their share-token link.
    SignerInvited {
        document_id: DocumentId,
        signer_id: SignerId,
        recipient: String,
        channel: AuthChannel,
        token: String,
    },
    /// An OTP code was issued for a signer.
    OtpIssued {
        signer_id: SignerId,
        recipient: String,
        channel: AuthChannel,
        code: String,
    },
    /// A document was fully signed and finalized.
    DocumentCompleted { document_id: DocumentId },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Dev/test implementation: logs at `info` and never fails. Stands in for
/// the real email/WhatsApp transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::SignerInvited {
                document_id,
                signer_id,
                recipient,
                channel,
                ..
            } => {
                tracing::info!(%document_id, %signer_id, %recipient, ?channel, "signer invited");
            }
            NotificationEvent::OtpIssued {
                signer_id,
                recipient,
                channel,
                ..
            } => {
                tracing::info!(%signer_id, %recipient, ?channel, "otp issued");
            }
            NotificationEvent::DocumentCompleted { document_id } => {
                tracing::info!(%document_id, "document completed");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingNotifier;
    use super::*;

    #[test]
    fn logging_notifier_never_panics_on_any_event() {
        let notifier = LoggingNotifier;
        notifier.notify(NotificationEvent::DocumentCompleted {
            document_id: DocumentId::new(),
        });
    }

    #[test]
    fn recording_notifier_captures_events_for_assertions() {
        let notifier = RecordingNotifier::default();
        notifier.notify(NotificationEvent::OtpIssued {
            signer_id: SignerId::new(),
            recipient: "a@example.com".to_string(),
            channel: AuthChannel::Email,
            code: "123456".to_string(),
        });
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}

//! Signer-facing state machine (spec §4.4): summary, identify, OTP
//! start/verify, place position, commit, decline.

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditEvent, AuditLogger};
use crate::blob::BlobStore;
use crate::clock::{Clock, to_canonical_iso};
use crate::error::{AppError, AppResult};
use crate::hash::sha256_hex;
use crate::ids::{DocumentId, SignerId};
use crate::model::{ActorKind, AuthChannel, Document, DocumentStatus, Signer, SignerStatus};
use crate::notifier::{NotificationEvent, Notifier};
use crate::otp::OtpStore;
use crate::pdf::{PdfFinalizer, SignatureStamp};
use crate::storage::Storage;

/// Outcome of a signer's commit: what to show them, and whether this call
/// was the one that finalized the document.
pub struct CommitOutcome {
    pub short_code: String,
    pub signature_hash: String,
    pub is_complete: bool,
}

pub struct SignerService {
    storage: Storage,
    audit: Arc<AuditLogger>,
    blobs: BlobStore,
    clock: Arc<dyn Clock>,
    otp: Arc<OtpStore>,
    pdf: PdfFinalizer,
    notifier: Arc<dyn Notifier>,
    shortcode_length: usize,
}

impl SignerService {
    #[must_use]
    pub fn new(
        storage: Storage,
        audit: Arc<AuditLogger>,
        blobs: BlobStore,
        clock: Arc<dyn Clock>,
        otp: Arc<OtpStore>,
        notifier: Arc<dyn Notifier>,
        shortcode_length: usize,
    ) -> Self {
        Self {
            storage,
            audit,
            blobs,
            clock,
            otp,
            pdf: PdfFinalizer::new(),
            notifier,
            shortcode_length,
        }
    }

    /// Resolve a share token to its `(Signer, Document)` pair. Every
    /// signer-facing event is authenticated this way (spec §4.4 "Access
    /// control").
    fn authenticate(&self, token: &str) -> AppResult<(Signer, Document)> {
        let token_hash = sha256_hex(token.as_bytes());
        let share_token = self.storage.get_share_token(&token_hash)?.ok_or(AppError::InvalidToken)?;
        if self.clock.now() > share_token.expires_at {
            return Err(AppError::InvalidToken);
        }

        let signer = self
            .storage
            .get_signer(&share_token.signer_id.to_string())?
            .ok_or(AppError::InvalidToken)?;
        let document = self
            .storage
            .get_document(&share_token.document_id.to_string())?
            .ok_or(AppError::InvalidToken)?;

        if !matches!(document.status, DocumentStatus::Ready | DocumentStatus::PartiallySigned) {
            return Err(AppError::InvalidToken);
        }

        Ok((signer, document))
    }

    /// `summary(token)`: PENDING -> VIEWED on first call, idempotent
    /// thereafter.
    pub fn summary(&self, token: &str) -> AppResult<(Signer, Document)> {
        let (mut signer, document) = self.authenticate(token)?;

        if signer.status == SignerStatus::Pending {
            signer.status = SignerStatus::Viewed;
            self.storage.put_signer(&signer)?;
            self.audit.append(AuditEvent {
                tenant_id: document.tenant_id,
                actor_kind: ActorKind::Signer,
                actor_id: Some(signer.id.to_string()),
                entity_type: "Signer",
                entity_id: signer.id.to_string(),
                action: "VIEWED",
                ip: None,
                user_agent: None,
                payload: json!({}),
            })?;
        }

        Ok((signer, document))
    }

    /// `identify(cpf?, phone?)`.
    pub fn identify(&self, token: &str, cpf: Option<String>, phone: Option<String>) -> AppResult<Signer> {
        let (mut signer, _document) = self.authenticate(token)?;
        if cpf.is_some() {
            signer.cpf = cpf;
        }
        if phone.is_some() {
            signer.phone = phone;
        }
        self.storage.put_signer(&signer)?;
        Ok(signer)
    }

    /// `otpStart()`: issue a code per `authChannels` target.
    pub fn otp_start(&self, token: &str) -> AppResult<()> {
        let (signer, document) = self.authenticate(token)?;

        let recipient_channels: Vec<(String, AuthChannel)> = signer
            .auth_channels
            .iter()
            .map(|channel| {
                let recipient = match channel {
                    AuthChannel::Email => signer.email.clone(),
                    AuthChannel::Whatsapp => signer.phone.clone().unwrap_or_else(|| signer.email.clone()),
                };
                (recipient, *channel)
            })
            .collect();

        let issued = self.otp.issue(&recipient_channels)?;

        for (channel, code) in &issued {
            let recipient = recipient_channels
                .iter()
                .find(|(_, c)| c == channel)
                .map(|(r, _)| r.clone())
                .unwrap_or_default();

            self.audit.append(AuditEvent {
                tenant_id: document.tenant_id,
                actor_kind: ActorKind::Signer,
                actor_id: Some(signer.id.to_string()),
                entity_type: "Signer",
                entity_id: signer.id.to_string(),
                action: "OTP_SENT",
                ip: None,
                user_agent: None,
                payload: json!({ "channel": channel, "maskedRecipient": mask(&recipient) }),
            })?;

            self.notifier.notify(NotificationEvent::OtpIssued {
                signer_id: signer.id,
                recipient,
                channel: *channel,
                code: code.clone(),
            });
        }

        Ok(())
    }

    /// `otpVerify(code)`.
    pub fn otp_verify(&self, token: &str, code: &str) -> AppResult<()> {
        let (signer, document) = self.authenticate(token)?;
        let contacts = signer.contacts();
        self.otp.verify(
            &contacts,
            code,
            &self.audit,
            document.tenant_id,
            "Signer",
            &signer.id.to_string(),
        )
    }

    /// `placePosition(page, x, y)`.
    pub fn place_position(&self, token: &str, page: u32, x: f64, y: f64) -> AppResult<Signer> {
        let (mut signer, _document) = self.authenticate(token)?;
        signer.signature_position_page = Some(page);
        signer.signature_position_x = Some(x);
        signer.signature_position_y = Some(y);
        self.storage.put_signer(&signer)?;
        Ok(signer)
    }

    /// `decline()`: reachable from PENDING or VIEWED.
    pub fn decline(&self, token: &str) -> AppResult<Signer> {
        let (mut signer, document) = self.authenticate(token)?;
        if !matches!(signer.status, SignerStatus::Pending | SignerStatus::Viewed) {
            return Err(AppError::AlreadyTerminal);
        }
        signer.status = SignerStatus::Declined;
        self.storage.put_signer(&signer)?;
        self.audit.append(AuditEvent {
            tenant_id: document.tenant_id,
            actor_kind: ActorKind::Signer,
            actor_id: Some(signer.id.to_string()),
            entity_type: "Signer",
            entity_id: signer.id.to_string(),
            action: "DECLINED",
            ip: None,
            user_agent: None,
            payload: json!({}),
        })?;
        Ok(signer)
    }

    /// `commit(fingerprint, imagePng)` (spec §4.4, the hardest step).
    pub fn commit(&self, token: &str, client_fingerprint: &str, image_png: &[u8]) -> AppResult<CommitOutcome> {
        let (mut signer, document) = self.authenticate(token)?;
        if signer.status == SignerStatus::Signed {
            return Err(AppError::AlreadyTerminal);
        }
        if signer.status == SignerStatus::Declined {
            return Err(AppError::AlreadyTerminal);
        }

        let timestamp_iso = to_canonical_iso(self.clock.now());
        let signature_hash = sha256_hex(
            format!(
                "{}{}{}{}",
                document.sha256,
                signer.id,
                timestamp_iso,
                client_fingerprint
            )
            .as_bytes(),
        );
        let short_code = signature_hash[..self.shortcode_length.min(signature_hash.len())].to_uppercase();

        let artefact_key = BlobStore::signature_key(&document.tenant_id.to_string(), &signer.id.to_string());
        self.blobs.write(&artefact_key, image_png)?;

        signer.status = SignerStatus::Signed;
        signer.signed_at = Some(self.clock.now());
        signer.signature_hash = Some(signature_hash.clone());
        signer.signature_artefact_path = Some(artefact_key);

        let siblings = self.storage.put_signer_and_list_siblings(&signer)?;

        self.audit.append(AuditEvent {
            tenant_id: document.tenant_id,
            actor_kind: ActorKind::Signer,
            actor_id: Some(signer.id.to_string()),
            entity_type: "Signer",
            entity_id: signer.id.to_string(),
            action: "SIGNED",
            ip: None,
            user_agent: None,
            payload: json!({
                "signatureHash": signature_hash,
                "shortCode": short_code,
                "artefactPath": signer.signature_artefact_path,
            }),
        })?;

        let all_signed = siblings.iter().all(|s| s.status == SignerStatus::Signed);
        let is_complete = if all_signed {
            self.finalize(&document)?;
            true
        } else {
            self.mark_partially_signed(&document)?;
            false
        };

        if is_complete {
            self.notifier.notify(NotificationEvent::DocumentCompleted {
                document_id: document.id,
            });
        }

        Ok(CommitOutcome {
            short_code,
            signature_hash,
            is_complete,
        })
    }

    fn mark_partially_signed(&self, document: &Document) -> AppResult<()> {
        if document.status == DocumentStatus::PartiallySigned {
            return Ok(());
        }
        let mut updated = document.clone();
        let previous_sha256 = updated.sha256.clone();
        updated.status = DocumentStatus::PartiallySigned;
        self.storage.put_document(&updated, Some(&previous_sha256))
    }

    /// Finalize (spec §4.5): stamp every signed signer's PNG onto the
    /// original PDF, persist the result under `-signed`, and issue the
    /// completion certificate.
    fn finalize(&self, document: &Document) -> AppResult<()> {
        let signers = self.storage.list_signers_for_document(&document.id.to_string())?;
        let original_bytes = self.blobs.read(&document.storage_key)?;

        let stamps: Vec<SignatureStamp> = signers
            .iter()
            .filter(|s| s.status == SignerStatus::Signed)
            .map(|s| SignatureStamp {
                signer_id: s.id.to_string(),
                png_bytes: s
                    .signature_artefact_path
                    .as_ref()
                    .and_then(|path| self.blobs.read(path).ok()),
                position_page: s.signature_position_page,
                position_x: s.signature_position_x,
                position_y: s.signature_position_y,
            })
            .collect();

        let finalized_bytes = self.pdf.finalize(&original_bytes, &stamps)?;
        let signed_key = BlobStore::signed_document_key(&document.storage_key);
        let sha256 = self.blobs.write(&signed_key, &finalized_bytes)?;

        let mut updated = document.clone();
        let previous_sha256 = updated.sha256.clone();
        updated.status = DocumentStatus::Signed;
        updated.storage_key = signed_key.clone();
        updated.sha256 = sha256.clone();
        self.storage.put_document(&updated, Some(&previous_sha256))?;

        self.audit.append(AuditEvent {
            tenant_id: document.tenant_id,
            actor_kind: ActorKind::System,
            actor_id: None,
            entity_type: "Document",
            entity_id: document.id.to_string(),
            action: "PADES_SIGNED",
            ip: None,
            user_agent: None,
            payload: json!({ "sha256": sha256 }),
        })?;
        self.audit.append(AuditEvent {
            tenant_id: document.tenant_id,
            actor_kind: ActorKind::System,
            actor_id: None,
            entity_type: "Document",
            entity_id: document.id.to_string(),
            action: "CERTIFICATE_ISSUED",
            ip: None,
            user_agent: None,
            payload: json!({}),
        })?;

        self.storage.put_certificate(&crate::model::Certificate {
            document_id: document.id,
            storage_key: signed_key,
            sha256,
            issued_at: self.clock.now(),
        })?;

        Ok(())
    }
}

/// Mask all but the first and last character of a recipient for audit
/// logging (`OTP_SENT{maskedRecipient}`, spec §4.4).
fn mask(recipient: &str) -> String {
    let chars: Vec<char> = recipient.chars().collect();
    if chars.len() <= 2 {
        return "*".repeat(chars.len());
    }
    let mut masked = String::new();
    masked.push(chars[0]);
    masked.push_str(&"*".repeat(chars.len() - 2));
    masked.push(chars[chars.len() - 1]);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::Settings;
    use crate::notifier::LoggingNotifier;
    use crate::rng::FixedRng;
    use chrono::Utc;

    struct Harness {
        storage: Storage,
        signer_service: SignerService,
        document: Document,
        tokens: Vec<String>,
    }

    fn build_harness(num_signers: usize) -> Harness {
        let storage = Storage::open_memory().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let rng: Arc<dyn crate::rng::RngSource> = Arc::new(FixedRng::new(vec![0x01, 0x02, 0x03, 0x04]));
        let audit = Arc::new(AuditLogger::new(storage.clone(), clock.clone(), "genesis_block_".to_string()));
        let blobs = BlobStore::new(tempfile::tempdir().unwrap().keep());
        let settings = Settings::for_tests();
        let otp = Arc::new(OtpStore::new(storage.clone(), clock.clone(), rng.clone(), settings.bcrypt_cost(), settings.otp_ttl()));
        let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);

        let tenant_id = crate::ids::TenantId::new();
        let document = Document {
            id: DocumentId::new(),
            tenant_id,
            owner_id: crate::ids::UserId::new(),
            title: "Contract".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 10,
            storage_key: "t/doc.pdf".to_string(),
            sha256: "original-sha".to_string(),
            status: DocumentStatus::Ready,
            deadline_at: None,
            created_at: clock.now(),
        };
        storage.put_document(&document, None).unwrap();
        blobs.write(&document.storage_key, minimal_pdf_bytes().as_slice()).unwrap();

        let mut tokens = Vec::new();
        for i in 0..num_signers {
            let signer = Signer {
                id: SignerId::new(),
                document_id: document.id,
                name: format!("Signer {i}"),
                email: format!("signer{i}@example.com"),
                phone: None,
                cpf: None,
                qualification: None,
                auth_channels: vec![AuthChannel::Email],
                order: i as u32,
                status: SignerStatus::Viewed,
                signed_at: None,
                signature_hash: None,
                signature_artefact_path: None,
                signature_position_page: None,
                signature_position_x: None,
                signature_position_y: None,
            };
            storage.put_signer(&signer).unwrap();

            let token = format!("token-{i}");
            storage
                .put_share_token(&crate::model::ShareToken {
                    document_id: document.id,
                    signer_id: signer.id,
                    token_hash: sha256_hex(token.as_bytes()),
                    expires_at: clock.now() + chrono::Duration::days(1),
                    consumed_at: None,
                })
                .unwrap();
            tokens.push(token);
        }

        let signer_service = SignerService::new(storage.clone(), audit, blobs, clock, otp, notifier, 6);

        Harness {
            storage,
            signer_service,
            document,
            tokens,
        }
    }

    fn minimal_pdf_bytes() -> Vec<u8> {
        use lopdf::{Dictionary, Document as LoDocument, Object, Stream};
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(pages_id));
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set("Resources", Object::Dictionary(Dictionary::new()));
        let page_id = doc.add_object(page_dict);
        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        pages_dict.set("Count", Object::Integer(1));
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let mut catalog_dict = Dictionary::new();
        catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog_dict.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(catalog_dict);
        doc.trailer.set("Root", Object::Reference(catalog_id));
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn single_signer_commit_finalizes_the_document() {
        let harness = build_harness(1);
        let outcome = harness.signer_service.commit(&harness.tokens[0], "fp1", sample_png().as_slice()).unwrap();
        assert!(outcome.is_complete);

        let document = harness.storage.get_document(&harness.document.id.to_string()).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Signed);
        let certificate = harness.storage.get_certificate(&document.id.to_string()).unwrap();
        assert!(certificate.is_some());
    }

    #[test]
    fn two_signers_both_commit_and_exactly_one_finalizes() {
        let harness = build_harness(2);
        let first = harness.signer_service.commit(&harness.tokens[0], "fp1", sample_png().as_slice()).unwrap();
        assert!(!first.is_complete);

        let second = harness.signer_service.commit(&harness.tokens[1], "fp2", sample_png().as_slice()).unwrap();
        assert!(second.is_complete);

        let document = harness.storage.get_document(&harness.document.id.to_string()).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Signed);
    }

    #[test]
    fn committing_twice_on_an_already_signed_signer_is_rejected() {
        let harness = build_harness(1);
        harness.signer_service.commit(&harness.tokens[0], "fp1", sample_png().as_slice()).unwrap();

        let second = harness.signer_service.commit(&harness.tokens[0], "fp1", sample_png().as_slice());
        assert!(matches!(second, Err(AppError::AlreadyTerminal)));
    }

    #[test]
    fn masking_keeps_first_and_last_character() {
        assert_eq!(mask("alice@example.com"), "a****************m");
    }

    fn sample_png() -> Vec<u8> {
        let image = image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }
}

//! One-time code issuance and verification (spec §4.3).
//!
//! Codes are 6-digit decimal strings drawn from the injected CSPRNG,
//! bcrypt-hashed at rest, and consumed (deleted) on first successful
//! verification. Verification matches the most recent code for any of a
//! signer's contacts, ignoring which channel delivered it.

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditEvent, AuditLogger};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::ids::{OtpId, TenantId};
use crate::model::{ActorKind, AuthChannel, OtpCode};
use crate::rng::{RngSource, gen_otp_code};
use crate::storage::Storage;

pub const SIGNING_CONTEXT: &str = "SIGNING";

/// Issues and verifies short-lived OTP challenge codes.
pub struct OtpStore {
    storage: Storage,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RngSource>,
    bcrypt_cost: u32,
    ttl: chrono::Duration,
}

impl OtpStore {
    #[must_use]
    pub fn new(
        storage: Storage,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RngSource>,
        bcrypt_cost: u32,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            rng,
            bcrypt_cost,
            ttl,
        }
    }

    /// Issue one code per channel, returning `(channel, plaintext code)`
    /// pairs for the caller to hand to the notifier. Never logs a code.
    pub fn issue(&self, recipient_channels: &[(String, AuthChannel)]) -> AppResult<Vec<(AuthChannel, String)>> {
        let now = self.clock.now();
        let mut issued = Vec::with_capacity(recipient_channels.len());

        for (recipient, channel) in recipient_channels {
            let code = gen_otp_code(self.rng.as_ref());
            let code_hash = bcrypt::hash(&code, self.bcrypt_cost)?;

            let row = OtpCode {
                id: OtpId::new(),
                recipient: recipient.clone(),
                channel: *channel,
                code_hash,
                expires_at: now + self.ttl,
                context: SIGNING_CONTEXT.to_string(),
                created_at: now,
            };
            self.storage.put_otp_code(&row)?;
            issued.push((*channel, code));
        }

        Ok(issued)
    }

    /// Verify `code` against the most recent row for any of `contacts`
    /// (spec §4.3: "regardless of channel"). On success the row is deleted
    /// and its hash recorded as consumed; on failure `audit` records
    /// `OTP_FAILED{reason}` against `entity_id`.
    ///
    /// A row that's genuinely never existed for any contact yields
    /// `OtpExpired` (spec §4.3). A row that existed and was already
    /// consumed yields `OtpWrong` on replay of that same code (spec §8 S4)
    /// rather than `OtpExpired`, even though the row itself is gone —
    /// distinguished via `Storage::get_consumed_otp_hash`.
    pub fn verify(
        &self,
        contacts: &[&str],
        code: &str,
        audit: &AuditLogger,
        tenant_id: TenantId,
        entity_type: &str,
        entity_id: &str,
    ) -> AppResult<()> {
        let now = self.clock.now();
        let Some(row) = self.storage.find_latest_otp_for_recipients(contacts, SIGNING_CONTEXT)? else {
            if self.code_matches_a_consumed_hash(contacts, code)? {
                self.record_failure(audit, tenant_id, entity_type, entity_id, "already_consumed")?;
                return Err(AppError::OtpWrong);
            }
            self.record_failure(audit, tenant_id, entity_type, entity_id, "not_found")?;
            return Err(AppError::OtpExpired);
        };

        if now > row.expires_at {
            self.storage.delete_otp_code(&row.id.to_string(), &row.recipient)?;
            self.record_failure(audit, tenant_id, entity_type, entity_id, "expired")?;
            return Err(AppError::OtpExpired);
        }

        if !bcrypt::verify(code, &row.code_hash)? {
            self.record_failure(audit, tenant_id, entity_type, entity_id, "wrong_code")?;
            return Err(AppError::OtpWrong);
        }

        self.storage.delete_otp_code(&row.id.to_string(), &row.recipient)?;
        self.storage.record_consumed_otp(&row.recipient, &row.code_hash)?;
        audit.append(AuditEvent {
            tenant_id,
            actor_kind: ActorKind::Signer,
            actor_id: None,
            entity_type,
            entity_id: entity_id.to_string(),
            action: "OTP_VERIFIED",
            ip: None,
            user_agent: None,
            payload: json!({}),
        })?;
        Ok(())
    }

    fn code_matches_a_consumed_hash(&self, contacts: &[&str], code: &str) -> AppResult<bool> {
        for contact in contacts {
            let Some(hash) = self.storage.get_consumed_otp_hash(contact)? else {
                continue;
            };
            if bcrypt::verify(code, &hash)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn record_failure(
        &self,
        audit: &AuditLogger,
        tenant_id: TenantId,
        entity_type: &str,
        entity_id: &str,
        reason: &str,
    ) -> AppResult<()> {
        audit.append(AuditEvent {
            tenant_id,
            actor_kind: ActorKind::Signer,
            actor_id: None,
            entity_type,
            entity_id: entity_id.to_string(),
            action: "OTP_FAILED",
            ip: None,
            user_agent: None,
            payload: json!({ "reason": reason }),
        })?;
        Ok(())
    }
}

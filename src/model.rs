//! Data model entities and enums (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, OtpId, SignerId, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Ready,
    PartiallySigned,
    Signed,
    Cancelled,
    Expired,
}

impl DocumentStatus {
    /// Terminal statuses are immutable (spec §3).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Signed | Self::Cancelled | Self::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub owner_id: UserId,
    pub title: String,
    pub mime_type: String,
    pub size: u64,
    pub storage_key: String,
    pub sha256: String,
    pub status: DocumentStatus,
    pub deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignerStatus {
    Pending,
    Viewed,
    Signed,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChannel {
    Email,
    Whatsapp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub id: SignerId,
    pub document_id: DocumentId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub qualification: Option<String>,
    pub auth_channels: Vec<AuthChannel>,
    pub order: u32,
    pub status: SignerStatus,
    pub signed_at: Option<DateTime<Utc>>,
    pub signature_hash: Option<String>,
    pub signature_artefact_path: Option<String>,
    pub signature_position_page: Option<u32>,
    pub signature_position_x: Option<f64>,
    pub signature_position_y: Option<f64>,
}

impl Signer {
    /// Every contact a recipient can be reached at, for OTP recipient
    /// matching (spec §4.3 — matching is by recipient, ignoring channel).
    #[must_use]
    pub fn contacts(&self) -> Vec<&str> {
        let mut contacts = vec![self.email.as_str()];
        if let Some(phone) = &self.phone {
            contacts.push(phone.as_str());
        }
        contacts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareToken {
    pub document_id: DocumentId,
    pub signer_id: SignerId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpCode {
    pub id: OtpId,
    pub recipient: String,
    pub channel: AuthChannel,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub context: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    User,
    Signer,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRow {
    pub seq: u64,
    pub tenant_id: TenantId,
    pub actor_kind: ActorKind,
    pub actor_id: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub payload_json: serde_json::Value,
    pub created_at: String,
    pub prev_event_hash: String,
    pub event_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub document_id: DocumentId,
    pub storage_key: String,
    pub sha256: String,
    pub issued_at: DateTime<Utc>,
}

/// Resolved caller identity for owner/admin operations (spec §4.8 — the
/// core's view of an externally-managed session).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
}

//! Content-addressed provenance lookup (spec §4.6): given raw bytes, report
//! whether they match a known document and, if so, its signers. No
//! authentication, no side effects.

use serde::Serialize;

use crate::error::AppResult;
use crate::hash::sha256_hex;
use crate::model::{DocumentStatus, Signer, SignerStatus};
use crate::storage::Storage;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerSummary {
    pub name: String,
    pub email: String,
    pub status: SignerStatus,
    pub signed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&Signer> for SignerSummary {
    fn from(signer: &Signer) -> Self {
        Self {
            name: signer.name.clone(),
            email: signer.email.clone(),
            status: signer.status,
            signed_at: signer.signed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub title: String,
    pub status: DocumentStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub owner_name: String,
    pub signers: Vec<SignerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub document: Option<ValidationReport>,
}

pub struct Validator {
    storage: Storage,
}

impl Validator {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Hash `bytes` and look up a document by that content address (spec
    /// §4.6). A miss is not an error: it's a negative validation result.
    pub fn validate(&self, bytes: &[u8]) -> AppResult<ValidationResult> {
        let sha256 = sha256_hex(bytes);
        let Some(document) = self.storage.get_document_by_sha256(&sha256)? else {
            return Ok(ValidationResult { valid: false, document: None });
        };

        let signers = self.storage.list_signers_for_document(&document.id.to_string())?;
        let owner_name = self
            .storage
            .get_user(&document.owner_id.to_string())?
            .map_or_else(|| document.owner_id.to_string(), |user| user.email);

        Ok(ValidationResult {
            valid: true,
            document: Some(ValidationReport {
                title: document.title,
                status: document.status,
                created_at: document.created_at,
                owner_name,
                signers: signers.iter().map(SignerSummary::from).collect(),
            }),
        })
    }
}

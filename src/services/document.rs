//! Document lifecycle: create + upload, invite signers, status
//! transitions (spec §4.1).

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditEvent, AuditLogger};
use crate::blob::BlobStore;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::ids::{DocumentId, SignerId, TenantId, UserId};
use crate::model::{ActorKind, AuthChannel, Document, DocumentStatus, Signer, SignerStatus};
use crate::notifier::{NotificationEvent, Notifier};
use crate::rng::{RngSource, gen_share_token};
use crate::storage::Storage;

pub struct NewDocument {
    pub tenant_id: TenantId,
    pub owner_id: UserId,
    pub title: String,
    pub mime_type: String,
    pub deadline_at: Option<chrono::DateTime<chrono::Utc>>,
    pub file_extension: String,
    pub bytes: Vec<u8>,
}

pub struct SignerDescriptor {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub qualification: Option<String>,
    pub auth_channels: Vec<AuthChannel>,
    pub order: u32,
}

pub struct DocumentService {
    storage: Storage,
    audit: Arc<AuditLogger>,
    blobs: BlobStore,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RngSource>,
    notifier: Arc<dyn Notifier>,
    invite_ttl: chrono::Duration,
}

impl DocumentService {
    #[must_use]
    pub fn new(
        storage: Storage,
        audit: Arc<AuditLogger>,
        blobs: BlobStore,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RngSource>,
        notifier: Arc<dyn Notifier>,
        invite_ttl: chrono::Duration,
    ) -> Self {
        Self {
            storage,
            audit,
            blobs,
            clock,
            rng,
            notifier,
            invite_ttl,
        }
    }

    /// Create a `Document` row from uploaded bytes (spec §4.1 "Create +
    /// upload"). Writes a temp-then-rename blob, computes its SHA-256,
    /// commits the row, and appends `STORAGE_UPLOADED`. On any failure
    /// after the blob is written, it is removed.
    pub fn create_and_upload(&self, input: NewDocument, original_file_name: &str) -> AppResult<Document> {
        let document_id = DocumentId::new();
        let storage_key = BlobStore::document_key(
            &input.tenant_id.to_string(),
            &document_id.to_string(),
            &input.file_extension,
        );

        let sha256 = match self.blobs.write(&storage_key, &input.bytes) {
            Ok(sha256) => sha256,
            Err(err) => return Err(err),
        };

        let document = Document {
            id: document_id,
            tenant_id: input.tenant_id,
            owner_id: input.owner_id,
            title: input.title,
            mime_type: input.mime_type,
            size: input.bytes.len() as u64,
            storage_key,
            sha256,
            status: DocumentStatus::Ready,
            deadline_at: input.deadline_at,
            created_at: self.clock.now(),
        };

        if let Err(err) = self.storage.put_document(&document, None) {
            self.blobs.remove(&document.storage_key);
            return Err(err);
        }

        self.audit.append(AuditEvent {
            tenant_id: document.tenant_id,
            actor_kind: ActorKind::User,
            actor_id: Some(document.owner_id.to_string()),
            entity_type: "Document",
            entity_id: document.id.to_string(),
            action: "STORAGE_UPLOADED",
            ip: None,
            user_agent: None,
            payload: json!({ "fileName": original_file_name, "sha256": document.sha256 }),
        })?;

        Ok(document)
    }

    /// Invite signers (spec §4.1 "Invite signers"): create each `Signer`
    /// row, mint an opaque share token, append `INVITED`, then hand the
    /// cleartext token to the notifier exactly once after commit.
    pub fn invite_signers(
        &self,
        document_id: &str,
        descriptors: Vec<SignerDescriptor>,
        acting_user: UserId,
    ) -> AppResult<Vec<Signer>> {
        let document = self
            .storage
            .get_document(document_id)?
            .ok_or(AppError::NotFound)?;
        if document.status.is_terminal() {
            return Err(AppError::AlreadyTerminal);
        }

        let expires_at = document.deadline_at.unwrap_or_else(|| self.clock.now() + self.invite_ttl);
        let mut created = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if descriptor.auth_channels.is_empty() {
                return Err(AppError::Validation("authChannels must be non-empty".to_string()));
            }

            let signer = Signer {
                id: SignerId::new(),
                document_id: document.id,
                name: descriptor.name,
                email: descriptor.email.clone(),
                phone: descriptor.phone,
                cpf: descriptor.cpf,
                qualification: descriptor.qualification,
                auth_channels: descriptor.auth_channels,
                order: descriptor.order,
                status: SignerStatus::Pending,
                signed_at: None,
                signature_hash: None,
                signature_artefact_path: None,
                signature_position_page: None,
                signature_position_x: None,
                signature_position_y: None,
            };
            self.storage.put_signer(&signer)?;

            let token = gen_share_token(self.rng.as_ref());
            let token_hash = crate::hash::sha256_hex(token.as_bytes());
            self.storage.put_share_token(&crate::model::ShareToken {
                document_id: document.id,
                signer_id: signer.id,
                token_hash,
                expires_at,
                consumed_at: None,
            })?;

            self.audit.append(AuditEvent {
                tenant_id: document.tenant_id,
                actor_kind: ActorKind::User,
                actor_id: Some(acting_user.to_string()),
                entity_type: "Signer",
                entity_id: signer.id.to_string(),
                action: "INVITED",
                ip: None,
                user_agent: None,
                payload: json!({ "documentId": document.id, "recipient": descriptor.email }),
            })?;

            self.notifier.notify(NotificationEvent::SignerInvited {
                document_id: document.id,
                signer_id: signer.id,
                recipient: signer.email.clone(),
                channel: signer.auth_channels[0],
                token,
            });

            created.push(signer);
        }

        Ok(created)
    }

    /// Cancel or expire a document (spec §4.1 "Status change").
    fn transition(&self, document_id: &str, new_status: DocumentStatus, acting_user: Option<UserId>) -> AppResult<Document> {
        let mut document = self
            .storage
            .get_document(document_id)?
            .ok_or(AppError::NotFound)?;
        if document.status.is_terminal() {
            return Err(AppError::AlreadyTerminal);
        }

        let previous_sha256 = document.sha256.clone();
        document.status = new_status;
        self.storage.put_document(&document, Some(&previous_sha256))?;

        self.audit.append(AuditEvent {
            tenant_id: document.tenant_id,
            actor_kind: ActorKind::User,
            actor_id: acting_user.map(|id| id.to_string()),
            entity_type: "Document",
            entity_id: document.id.to_string(),
            action: "STATUS_CHANGED",
            ip: None,
            user_agent: None,
            payload: json!({ "newStatus": new_status }),
        })?;

        Ok(document)
    }

    pub fn cancel(&self, document_id: &str, acting_user: UserId) -> AppResult<Document> {
        self.transition(document_id, DocumentStatus::Cancelled, Some(acting_user))
    }

    pub fn expire(&self, document_id: &str) -> AppResult<Document> {
        self.transition(document_id, DocumentStatus::Expired, None)
    }

    /// Administrative finalize entry point. Per the resolved open question
    /// (only the implicit finalize-on-last-commit path is exposed), this is
    /// an idempotent no-op unless the document is already `SIGNED`.
    pub fn finalize(&self, document_id: &str) -> AppResult<Document> {
        let document = self
            .storage
            .get_document(document_id)?
            .ok_or(AppError::NotFound)?;
        if document.status != DocumentStatus::Signed {
            return Err(AppError::Validation(
                "document is not fully signed; finalize happens automatically on last commit".to_string(),
            ));
        }
        Ok(document)
    }

    /// Tenant-scoped listing (`GET /documents`, SPEC_FULL §4.1 supplement).
    pub fn list_for_tenant(&self, tenant_id: &str) -> AppResult<Vec<Document>> {
        self.storage.list_documents_for_tenant(tenant_id)
    }

    pub fn get(&self, document_id: &str) -> AppResult<Document> {
        self.storage.get_document(document_id)?.ok_or(AppError::NotFound)
    }
}

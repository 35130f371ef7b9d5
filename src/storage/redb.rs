//! ReDB storage implementation for the e-signature service.
//!
//! One embedded database holds every entity table plus the secondary
//! indices the services need (documents by tenant, documents by content
//! hash, signers by document, audit rows by entity). `redb` only allows a
//! single write transaction at a time; every public service operation
//! that mutates state runs inside exactly one such transaction, which is
//! what gives the signer-commit step its serializability guarantee
//! (spec §5 — see SPEC_FULL.md §5 for the full argument).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{AppError, AppResult};
use crate::model::{AuditLogRow, Certificate, Document, OtpCode, Principal, ShareToken, Signer, Tenant, User};

const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USERS_BY_EMAIL: TableDefinition<&str, &str> = TableDefinition::new("users_by_email");
const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const DOCUMENTS_BY_TENANT: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("documents_by_tenant");
const DOCUMENTS_BY_SHA256: TableDefinition<&str, &str> = TableDefinition::new("documents_by_sha256");
const SIGNERS: TableDefinition<&str, &[u8]> = TableDefinition::new("signers");
const SIGNERS_BY_DOCUMENT: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("signers_by_document");
const SHARE_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("share_tokens");
const OTP_CODES: TableDefinition<&str, &[u8]> = TableDefinition::new("otp_codes");
const OTP_BY_RECIPIENT: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("otp_by_recipient");
const AUDIT_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_log");
const AUDIT_BY_ENTITY: MultimapTableDefinition<&str, u64> =
    MultimapTableDefinition::new("audit_by_entity");
const CERTIFICATES: TableDefinition<&str, &[u8]> = TableDefinition::new("certificates");
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const CONSUMED_OTP_HASHES: TableDefinition<&str, &str> = TableDefinition::new("consumed_otp_hashes");

/// Storage wrapper for ReDB. Thread-safe via internal `Arc`; clone is cheap.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path).map_err(|e| AppError::Storage(e.to_string()))?;
        Self::init_tables(&db)?;

        tracing::info!(path = %path.display(), "Opened storage database");
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory database for tests.
    pub fn open_memory() -> AppResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Self::init_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn init_tables(db: &Database) -> AppResult<()> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TENANTS)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(DOCUMENTS)?;
            let _ = write_txn.open_multimap_table(DOCUMENTS_BY_TENANT)?;
            let _ = write_txn.open_table(DOCUMENTS_BY_SHA256)?;
            let _ = write_txn.open_table(SIGNERS)?;
            let _ = write_txn.open_multimap_table(SIGNERS_BY_DOCUMENT)?;
            let _ = write_txn.open_table(SHARE_TOKENS)?;
            let _ = write_txn.open_table(OTP_CODES)?;
            let _ = write_txn.open_multimap_table(OTP_BY_RECIPIENT)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
            let _ = write_txn.open_multimap_table(AUDIT_BY_ENTITY)?;
            let _ = write_txn.open_table(CERTIFICATES)?;
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(CONSUMED_OTP_HASHES)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn put<T: Serialize>(table: &mut redb::Table<'_, &str, &[u8]>, key: &str, value: &T) -> AppResult<()> {
        let bytes = serde_json::to_vec(value)?;
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        key: &str,
    ) -> AppResult<Option<T>> {
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Tenants / Users
    // =========================================================================

    pub fn put_tenant(&self, tenant: &Tenant) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TENANTS)?;
            Self::put(&mut table, &tenant.id.to_string(), tenant)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_tenant(&self, id: &str) -> AppResult<Option<Tenant>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TENANTS)?;
        Self::get(&table, id)
    }

    pub fn put_user(&self, user: &User) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            Self::put(&mut table, &user.id.to_string(), user)?;
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            by_email.insert(user.email.as_str(), user.id.to_string().as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        Self::get(&table, id)
    }

    pub fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let by_email = read_txn.open_table(USERS_BY_EMAIL)?;
        let Some(user_id) = by_email.get(email)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(USERS)?;
        Self::get(&table, &user_id)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    pub fn put_document(&self, document: &Document, previous_sha256: Option<&str>) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOCUMENTS)?;
            Self::put(&mut table, &document.id.to_string(), document)?;

            let mut by_tenant = write_txn.open_multimap_table(DOCUMENTS_BY_TENANT)?;
            by_tenant.insert(document.tenant_id.to_string().as_str(), document.id.to_string().as_str())?;

            let mut by_sha256 = write_txn.open_table(DOCUMENTS_BY_SHA256)?;
            if let Some(previous) = previous_sha256
                && previous != document.sha256
            {
                by_sha256.remove(previous)?;
            }
            by_sha256.insert(document.sha256.as_str(), document.id.to_string().as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_document(&self, id: &str) -> AppResult<Option<Document>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS)?;
        Self::get(&table, id)
    }

    pub fn get_document_by_sha256(&self, sha256: &str) -> AppResult<Option<Document>> {
        let read_txn = self.db.begin_read()?;
        let by_sha256 = read_txn.open_table(DOCUMENTS_BY_SHA256)?;
        let Some(doc_id) = by_sha256.get(sha256)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(DOCUMENTS)?;
        Self::get(&table, &doc_id)
    }

    pub fn list_documents_for_tenant(&self, tenant_id: &str) -> AppResult<Vec<Document>> {
        let read_txn = self.db.begin_read()?;
        let by_tenant = read_txn.open_multimap_table(DOCUMENTS_BY_TENANT)?;
        let table = read_txn.open_table(DOCUMENTS)?;
        let mut documents = Vec::new();
        for entry in by_tenant.get(tenant_id)? {
            let doc_id = entry?.value().to_string();
            if let Some(document) = Self::get(&table, &doc_id)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    // =========================================================================
    // Signers
    // =========================================================================

    pub fn put_signer(&self, signer: &Signer) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SIGNERS)?;
            Self::put(&mut table, &signer.id.to_string(), signer)?;
            let mut by_document = write_txn.open_multimap_table(SIGNERS_BY_DOCUMENT)?;
            by_document.insert(
                signer.document_id.to_string().as_str(),
                signer.id.to_string().as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_signer(&self, id: &str) -> AppResult<Option<Signer>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SIGNERS)?;
        Self::get(&table, id)
    }

    /// Update `signer` and, within the SAME write transaction, read back
    /// every signer of `signer.document_id`. `redb` allows only one write
    /// transaction at a time, so this makes "did committing this signer
    /// complete the document" linearize across concurrent signer commits:
    /// whichever commit's write transaction runs second observes the
    /// first's `SIGNED` status already persisted here, and at most one
    /// caller can ever see "every signer signed" (spec §4.4, §5).
    pub fn put_signer_and_list_siblings(&self, signer: &Signer) -> AppResult<Vec<Signer>> {
        let write_txn = self.db.begin_write()?;
        let siblings = {
            let mut table = write_txn.open_table(SIGNERS)?;
            Self::put(&mut table, &signer.id.to_string(), signer)?;

            let mut by_document = write_txn.open_multimap_table(SIGNERS_BY_DOCUMENT)?;
            by_document.insert(
                signer.document_id.to_string().as_str(),
                signer.id.to_string().as_str(),
            )?;

            let mut siblings = Vec::new();
            for entry in by_document.get(signer.document_id.to_string().as_str())? {
                let signer_id = entry?.value().to_string();
                if let Some(s) = Self::get::<Signer>(&table, &signer_id)? {
                    siblings.push(s);
                }
            }
            siblings
        };
        write_txn.commit()?;
        Ok(siblings)
    }

    pub fn list_signers_for_document(&self, document_id: &str) -> AppResult<Vec<Signer>> {
        let read_txn = self.db.begin_read()?;
        let by_document = read_txn.open_multimap_table(SIGNERS_BY_DOCUMENT)?;
        let table = read_txn.open_table(SIGNERS)?;
        let mut signers = Vec::new();
        for entry in by_document.get(document_id)? {
            let signer_id = entry?.value().to_string();
            if let Some(signer) = Self::get(&table, &signer_id)? {
                signers.push(signer);
            }
        }
        signers.sort_by_key(|s| s.order);
        Ok(signers)
    }

    // =========================================================================
    // Share tokens
    // =========================================================================

    pub fn put_share_token(&self, token: &ShareToken) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SHARE_TOKENS)?;
            Self::put(&mut table, &token.token_hash, token)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_share_token(&self, token_hash: &str) -> AppResult<Option<ShareToken>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARE_TOKENS)?;
        Self::get(&table, token_hash)
    }

    // =========================================================================
    // OTP codes
    // =========================================================================

    pub fn put_otp_code(&self, otp: &OtpCode) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OTP_CODES)?;
            Self::put(&mut table, &otp.id.to_string(), otp)?;
            let mut by_recipient = write_txn.open_multimap_table(OTP_BY_RECIPIENT)?;
            by_recipient.insert(otp.recipient.as_str(), otp.id.to_string().as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Find the most recent OTP code row for any of `recipients`, in the
    /// given `context`, regardless of channel (spec §4.3, §9 open question).
    pub fn find_latest_otp_for_recipients(
        &self,
        recipients: &[&str],
        context: &str,
    ) -> AppResult<Option<OtpCode>> {
        let read_txn = self.db.begin_read()?;
        let by_recipient = read_txn.open_multimap_table(OTP_BY_RECIPIENT)?;
        let table = read_txn.open_table(OTP_CODES)?;

        let mut latest: Option<OtpCode> = None;
        for recipient in recipients {
            for entry in by_recipient.get(recipient)? {
                let otp_id = entry?.value().to_string();
                let Some(otp) = Self::get::<OtpCode>(&table, &otp_id)? else {
                    continue;
                };
                if otp.context != context {
                    continue;
                }
                if latest.as_ref().is_none_or(|current| otp.created_at > current.created_at) {
                    latest = Some(otp);
                }
            }
        }
        Ok(latest)
    }

    /// Delete an OTP row, used on both successful verification (one-shot
    /// consumption) and as a no-op when the row has already been deleted.
    pub fn delete_otp_code(&self, id: &str, recipient: &str) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OTP_CODES)?;
            table.remove(id)?;
            let mut by_recipient = write_txn.open_multimap_table(OTP_BY_RECIPIENT)?;
            by_recipient.remove(recipient, id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Record the bcrypt hash of the code just consumed for `recipient`,
    /// overwriting any prior record. Lets a later `verify` against a
    /// recipient whose row was already deleted tell "this exact code was
    /// replayed" (spec §8 S4 → `ErrOtpWrong`) apart from "no code was ever
    /// issued to this contact" (spec §4.3 → `ErrOtpExpired`).
    pub fn record_consumed_otp(&self, recipient: &str, code_hash: &str) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONSUMED_OTP_HASHES)?;
            table.insert(recipient, code_hash)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up the hash of the most recently consumed code for `recipient`,
    /// if any.
    pub fn get_consumed_otp_hash(&self, recipient: &str) -> AppResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONSUMED_OTP_HASHES)?;
        Ok(table.get(recipient)?.map(|v| v.value().to_string()))
    }

    // =========================================================================
    // Audit log
    // =========================================================================

    fn next_audit_seq(table: &impl ReadableTable<u64, &'static [u8]>) -> AppResult<u64> {
        Ok(table.iter()?.last().transpose()?.map_or(0, |(k, _)| k.value() + 1))
    }

    /// Get the most recent audit row for `entity_id`, if any.
    pub fn get_latest_audit_row_for_entity(&self, entity_id: &str) -> AppResult<Option<AuditLogRow>> {
        let read_txn = self.db.begin_read()?;
        let by_entity = read_txn.open_multimap_table(AUDIT_BY_ENTITY)?;
        let table = read_txn.open_table(AUDIT_LOG)?;

        let mut latest_seq: Option<u64> = None;
        for entry in by_entity.get(entity_id)? {
            let seq = entry?.value();
            if latest_seq.is_none_or(|current| seq > current) {
                latest_seq = Some(seq);
            }
        }
        match latest_seq {
            Some(seq) => match table.get(seq)? {
                Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Append a fully-formed audit row. The row's `seq` field is ignored;
    /// the table assigns the next sequence number itself so appends from
    /// concurrent transactions can never collide.
    pub fn append_audit_row(&self, mut row: AuditLogRow) -> AppResult<AuditLogRow> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            let seq = Self::next_audit_seq(&table)?;
            row.seq = seq;
            let bytes = serde_json::to_vec(&row)?;
            table.insert(seq, bytes.as_slice())?;

            let mut by_entity = write_txn.open_multimap_table(AUDIT_BY_ENTITY)?;
            by_entity.insert(row.entity_id.as_str(), seq)?;
        }
        write_txn.commit()?;
        Ok(row)
    }

    /// Overwrite an existing audit row in place at its own `seq`, without
    /// touching the entity index. Exists for tests that simulate direct
    /// database tampering (spec §8 S3); no production code path calls this.
    pub fn overwrite_audit_row(&self, row: &AuditLogRow) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            let bytes = serde_json::to_vec(row)?;
            table.insert(row.seq, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// List every audit row for `entity_id`, ordered by sequence number
    /// (which, since appends are the only write path and run one at a
    /// time, is also creation order — spec §4.2's "ordered by createdAt
    /// ascending").
    pub fn list_audit_chain(&self, entity_id: &str) -> AppResult<Vec<AuditLogRow>> {
        let read_txn = self.db.begin_read()?;
        let by_entity = read_txn.open_multimap_table(AUDIT_BY_ENTITY)?;
        let table = read_txn.open_table(AUDIT_LOG)?;

        let mut seqs = Vec::new();
        for entry in by_entity.get(entity_id)? {
            seqs.push(entry?.value());
        }
        seqs.sort_unstable();

        let mut rows = Vec::with_capacity(seqs.len());
        for seq in seqs {
            if let Some(value) = table.get(seq)? {
                rows.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(rows)
    }

    // =========================================================================
    // Certificates
    // =========================================================================

    pub fn put_certificate(&self, certificate: &Certificate) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CERTIFICATES)?;
            Self::put(&mut table, &certificate.document_id.to_string(), certificate)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_certificate(&self, document_id: &str) -> AppResult<Option<Certificate>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CERTIFICATES)?;
        Self::get(&table, document_id)
    }

    // =========================================================================
    // Sessions (stand-in for the externally-managed auth system, §4.8)
    // =========================================================================

    pub fn put_session(&self, token_hash: &str, principal: &Principal) -> AppResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            Self::put(&mut table, token_hash, principal)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_session(&self, token_hash: &str) -> AppResult<Option<Principal>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;
        Self::get(&table, token_hash)
    }
}

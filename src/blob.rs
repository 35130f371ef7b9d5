//! Content-addressed blob storage (spec §4.1, §6 "Persisted state layout").
//!
//! Every write goes through a temp-file-then-atomic-rename sequence so a
//! crash mid-write never leaves a partially-written file at its final path.
//! Storage keys are relative to `blob_root` and partitioned by tenant.

use std::path::{Path, PathBuf};

use crate::error::AppResult;
use crate::hash::sha256_hex;

/// Filesystem-backed content-addressed store rooted at `blob_root`.
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, relative_key: &str) -> PathBuf {
        self.root.join(relative_key)
    }

    /// Write `bytes` to `relative_key` via a temp-file-then-rename sequence,
    /// creating parent directories as needed. Returns the SHA-256 of the
    /// bytes actually written.
    pub fn write(&self, relative_key: &str, bytes: &[u8]) -> AppResult<String> {
        let final_path = self.absolute(relative_key);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp_path = final_path.with_extension(format!(
            "{}.tmp",
            final_path.extension().and_then(|e| e.to_str()).unwrap_or("bin")
        ));
        std::fs::write(&temp_path, bytes)?;

        if let Err(err) = std::fs::rename(&temp_path, &final_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }

        Ok(sha256_hex(bytes))
    }

    /// Read the bytes at `relative_key`.
    pub fn read(&self, relative_key: &str) -> AppResult<Vec<u8>> {
        Ok(std::fs::read(self.absolute(relative_key))?)
    }

    /// Remove the file at `relative_key`, if present. Used on the
    /// failure-cleanup path described in spec §4.1.
    pub fn remove(&self, relative_key: &str) {
        let _ = std::fs::remove_file(self.absolute(relative_key));
    }

    /// Storage key for a tenant's original upload.
    #[must_use]
    pub fn document_key(tenant_id: &str, document_id: &str, ext: &str) -> String {
        format!("{tenant_id}/{document_id}{ext}")
    }

    /// Storage key for a finalized, signed document. Spec §4.5: "insert
    /// `-signed` before the extension".
    #[must_use]
    pub fn signed_document_key(original_key: &str) -> String {
        match original_key.rfind('.') {
            Some(dot) if original_key[..dot].rfind('/').is_none_or(|slash| slash < dot) => {
                format!("{}-signed{}", &original_key[..dot], &original_key[dot..])
            }
            _ => format!("{original_key}-signed"),
        }
    }

    /// Storage key for a signer's signature PNG.
    #[must_use]
    pub fn signature_key(tenant_id: &str, signer_id: &str) -> String {
        format!("{tenant_id}/signatures/{signer_id}.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (BlobStore::new(dir.path().to_path_buf()), dir)
    }

    #[test]
    fn write_then_read_round_trips_and_hashes_correctly() {
        let (store, _dir) = tmp_store();
        let sha = store.write("tenant/doc.pdf", b"hello world").unwrap();
        assert_eq!(sha, sha256_hex(b"hello world"));
        assert_eq!(store.read("tenant/doc.pdf").unwrap(), b"hello world");
    }

    #[test]
    fn remove_deletes_the_file() {
        let (store, _dir) = tmp_store();
        store.write("tenant/doc.pdf", b"data").unwrap();
        store.remove("tenant/doc.pdf");
        assert!(store.read("tenant/doc.pdf").is_err());
    }

    #[test]
    fn signed_document_key_inserts_suffix_before_extension() {
        assert_eq!(
            BlobStore::signed_document_key("tenant/doc-1.pdf"),
            "tenant/doc-1-signed.pdf"
        );
    }

    #[test]
    fn document_and_signature_keys_are_tenant_partitioned() {
        assert_eq!(BlobStore::document_key("t1", "d1", ".pdf"), "t1/d1.pdf");
        assert_eq!(BlobStore::signature_key("t1", "s1"), "t1/signatures/s1.png");
    }
}

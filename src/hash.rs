//! SHA-256 helpers shared by the blob store, the audit chain, and the
//! signer commit step.

use sha2::{Digest, Sha256};

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `SHA-256(a ‖ b)` over UTF-8 bytes, as used throughout the audit chain
/// (`prevEventHash ‖ serialized`) and the signature hash (spec §4.4 step 1).
#[must_use]
pub fn sha256_hex_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// `serde_json` is built with the `preserve_order` feature so that a
/// `serde_json::Value::Object` serializes its keys in insertion order
/// rather than sorted order. This is the "canonical JSON" spec §4.2 and §9
/// require: the writer and the verifier must agree on the exact byte
/// string that was hashed.
#[must_use]
pub fn canonical_json(value: &serde_json::Value) -> String {
    serde_json::to_string(value).expect("serde_json::Value always serializes")
}

//! Bearer-session capability for owner/admin routes (spec §4.8, §6).
//!
//! User/tenant/login management is an external collaborator (spec §1); the
//! core only needs a contract to check a bearer token against. This is the
//! minimal stand-in for that system: check a shared-secret-derived token
//! without implementing the broader auth system it fronts.

use crate::error::{AppError, AppResult};
use crate::hash::sha256_hex;
use crate::model::Principal;
use crate::storage::Storage;

pub trait SessionResolver: Send + Sync {
    fn resolve(&self, bearer: &str) -> AppResult<Principal>;
}

/// Resolves bearer tokens against the `SESSIONS` table (`sha256(token) ->
/// Principal`). Plaintext tokens are never persisted.
#[derive(Clone)]
pub struct StorageSessionResolver {
    storage: Storage,
}

impl StorageSessionResolver {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Issue a session for `principal`, returning the plaintext bearer
    /// token. Administrative/test seeding path only; not exposed over HTTP.
    pub fn issue(&self, principal: &Principal, rng: &dyn crate::rng::RngSource) -> AppResult<String> {
        let token = crate::rng::gen_share_token(rng);
        self.storage.put_session(&sha256_hex(token.as_bytes()), principal)?;
        Ok(token)
    }
}

impl SessionResolver for StorageSessionResolver {
    fn resolve(&self, bearer: &str) -> AppResult<Principal> {
        self.storage
            .get_session(&sha256_hex(bearer.as_bytes()))?
            .ok_or(AppError::InvalidToken)
    }
}

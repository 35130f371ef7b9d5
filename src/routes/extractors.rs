//! `FromRequest` extractors for owner/admin bearer sessions (spec §6: "All
//! state-changing routes require either a bearer session ... or a
//! share-token ... except the validator"). Signer-facing routes carry their
//! share token as a path segment instead (`/sign/{token}/...`) and
//! authenticate through `SignerService`, so no extractor is needed there.

use std::future::{Ready, ready};
use std::sync::Arc;

use actix_web::{FromRequest, HttpRequest, dev::Payload, web};

use crate::error::AppError;
use crate::model::Principal;
use crate::session::SessionResolver;

/// The caller's resolved identity, extracted from `Authorization: Bearer
/// <token>`.
pub struct AuthedUser(pub Principal);

fn extract_bearer(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get("authorization")?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|t| t.trim().to_string())
}

impl FromRequest for AuthedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let resolver = req.app_data::<web::Data<Arc<dyn SessionResolver>>>().cloned();
        let bearer = extract_bearer(req);

        let result = (|| {
            let resolver = resolver.ok_or_else(|| AppError::Internal("session resolver not configured".to_string()))?;
            let bearer = bearer.ok_or(AppError::InvalidToken)?;
            resolver.resolve(&bearer)
        })();

        ready(result.map(AuthedUser))
    }
}

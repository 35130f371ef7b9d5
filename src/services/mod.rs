//! Service-layer orchestration: the public operations spec.md §4 describes,
//! each wired from the capability modules (storage, audit, blob, otp, pdf,
//! notifier, session).

pub mod document;
pub mod signer;
pub mod validator;

pub use document::DocumentService;
pub use signer::SignerService;
pub use validator::Validator;

//! Cross-cutting HTTP concerns. Bearer-session authentication lives in
//! `routes::extractors` (a `FromRequest` impl, not middleware); this module
//! only holds rate limiting.

pub mod rate_limit;

pub use rate_limit::{RateLimitConfig, RateLimiter, general_limiter, otp_verify_limiter, shared_config};

//! Rate limiting middleware.
//!
//! OTP verification is a brute-force target (six-digit codes): the
//! `/sign/{token}/otp/verify` route gets a strict per-IP limiter on top of
//! the general baseline applied to every route.
//!
//! Uses actix-governor with the built-in PeerIpKeyExtractor.

use actix_governor::{Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor};

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum OTP verify attempts per hour per IP.
    pub otp_verify_per_hour: u32,
    /// Burst size for OTP verify.
    pub otp_verify_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            otp_verify_per_hour: 20,
            otp_verify_burst: 5,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            otp_verify_per_hour: std::env::var("RATE_LIMIT_OTP_VERIFY_PER_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            otp_verify_burst: std::env::var("RATE_LIMIT_OTP_VERIFY_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }
}

/// Type alias for the Governor middleware with default settings.
pub type RateLimiter = Governor<PeerIpKeyExtractor, governor::middleware::NoOpMiddleware>;

/// Rate limiter for `/sign/{token}/otp/verify`.
pub fn otp_verify_limiter(config: &RateLimitConfig) -> RateLimiter {
    let seconds_per_request = if config.otp_verify_per_hour > 0 {
        3600 / u64::from(config.otp_verify_per_hour)
    } else {
        3600
    };

    let governor_config = GovernorConfigBuilder::default()
        .seconds_per_request(seconds_per_request)
        .burst_size(config.otp_verify_burst)
        .finish()
        .expect("failed to build OTP verify rate limiter");

    Governor::new(&governor_config)
}

/// General baseline limiter applied to every route: replenishes one
/// request per second sustained, with bursts up to 50 absorbing spikes.
pub fn general_limiter() -> RateLimiter {
    let governor_config = GovernorConfigBuilder::default()
        .seconds_per_request(1)
        .burst_size(50)
        .finish()
        .expect("failed to build general rate limiter");

    Governor::new(&governor_config)
}

/// Shared governor config for composing multiple limiter instances.
pub fn shared_config() -> GovernorConfig<PeerIpKeyExtractor, governor::middleware::NoOpMiddleware> {
    GovernorConfigBuilder::default()
        .seconds_per_request(1)
        .burst_size(20)
        .finish()
        .expect("failed to build shared rate limiter config")
}

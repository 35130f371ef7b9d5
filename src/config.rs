//! Service configuration derived from environment variables.
//!
//! Configuration is loaded once at startup and validated before the service
//! starts.
//!
//! ## Environment Variables
//!
//! - `HTTP_HOST` / `HTTP_PORT`: bind address (default `::` / 8080)
//! - `BLOB_ROOT`: filesystem root for content-addressed PDF/PNG storage
//! - `DB_PATH`: path to the ReDB database file
//! - `OTP_TTL_MINUTES`: OTP code lifetime (default 10)
//! - `INVITE_TTL_DAYS`: default share-token lifetime when a document has no
//!   deadline (default 30)
//! - `SHORTCODE_LENGTH`: hex characters of `signatureHash` shown to signers
//!   (default 6)
//! - `BCRYPT_COST`: bcrypt work factor for OTP code hashing (default 10)
//! - `CHAIN_GENESIS_PREFIX`: prefix hashed with `entityId` to seed a chain
//!   (default `"genesis_block_"`)
//! - `REQUEST_TIMEOUT_MS`, `BODY_LIMIT_MB`: ambient HTTP hygiene
//! - `RUST_LOG`: log level filter

use std::env;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_OTP_TTL_MINUTES: i64 = 10;
const DEFAULT_INVITE_TTL_DAYS: i64 = 30;
const DEFAULT_SHORTCODE_LENGTH: usize = 6;
const DEFAULT_BCRYPT_COST: u32 = 10;
const DEFAULT_CHAIN_GENESIS_PREFIX: &str = "genesis_block_";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BODY_LIMIT_MB: usize = 32;

fn env_trim(name: &str) -> String {
    env::var(name).unwrap_or_default().trim().to_string()
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    host: IpAddr,
    port: u16,
    blob_root: PathBuf,
    db_path: PathBuf,
    otp_ttl_minutes: i64,
    invite_ttl_days: i64,
    shortcode_length: usize,
    bcrypt_cost: u32,
    chain_genesis_prefix: String,
    request_timeout_ms: u64,
    body_limit_bytes: usize,
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        let host = env_trim("HTTP_HOST")
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        let port = env_trim("HTTP_PORT").parse::<u16>().unwrap_or(DEFAULT_PORT);

        let blob_root = env_trim("BLOB_ROOT")
            .parse::<PathBuf>()
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("./.data/blobs"));

        let db_path = env_trim("DB_PATH")
            .parse::<PathBuf>()
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("./.data/esign.redb"));

        let otp_ttl_minutes = env_trim("OTP_TTL_MINUTES")
            .parse::<i64>()
            .unwrap_or(DEFAULT_OTP_TTL_MINUTES);

        let invite_ttl_days = env_trim("INVITE_TTL_DAYS")
            .parse::<i64>()
            .unwrap_or(DEFAULT_INVITE_TTL_DAYS);

        let shortcode_length = env_trim("SHORTCODE_LENGTH")
            .parse::<usize>()
            .unwrap_or(DEFAULT_SHORTCODE_LENGTH);

        let bcrypt_cost = env_trim("BCRYPT_COST")
            .parse::<u32>()
            .unwrap_or(DEFAULT_BCRYPT_COST);

        let chain_genesis_prefix = {
            let v = env_trim("CHAIN_GENESIS_PREFIX");
            if v.is_empty() {
                DEFAULT_CHAIN_GENESIS_PREFIX.to_string()
            } else {
                v
            }
        };

        let request_timeout_ms = env_trim("REQUEST_TIMEOUT_MS")
            .parse::<u64>()
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);

        let body_limit_mb = env_trim("BODY_LIMIT_MB")
            .parse::<usize>()
            .unwrap_or(DEFAULT_BODY_LIMIT_MB);

        Self {
            host,
            port,
            blob_root,
            db_path,
            otp_ttl_minutes,
            invite_ttl_days,
            shortcode_length,
            bcrypt_cost,
            chain_genesis_prefix,
            request_timeout_ms,
            body_limit_bytes: body_limit_mb.saturating_mul(1024 * 1024),
        }
    }

    /// Settings for tests: in-memory-friendly defaults, low bcrypt cost so
    /// unit tests hashing OTP codes stay fast.
    pub fn for_tests() -> Self {
        Self {
            host: IpAddr::V6(Ipv6Addr::LOCALHOST),
            port: 0,
            blob_root: PathBuf::from("./.data/test-blobs"),
            db_path: PathBuf::from("./.data/test.redb"),
            otp_ttl_minutes: DEFAULT_OTP_TTL_MINUTES,
            invite_ttl_days: DEFAULT_INVITE_TTL_DAYS,
            shortcode_length: DEFAULT_SHORTCODE_LENGTH,
            bcrypt_cost: 4,
            chain_genesis_prefix: DEFAULT_CHAIN_GENESIS_PREFIX.to_string(),
            request_timeout_ms: 60_000,
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
        }
    }

    /// Validate settings. Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.shortcode_length == 0 || self.shortcode_length > 64 {
            return Err("SHORTCODE_LENGTH must be between 1 and 64".to_string());
        }
        if self.otp_ttl_minutes <= 0 {
            return Err("OTP_TTL_MINUTES must be positive".to_string());
        }
        if self.invite_ttl_days <= 0 {
            return Err("INVITE_TTL_DAYS must be positive".to_string());
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn blob_root(&self) -> &PathBuf {
        &self.blob_root
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn otp_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.otp_ttl_minutes)
    }

    pub fn invite_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.invite_ttl_days)
    }

    pub fn shortcode_length(&self) -> usize {
        self.shortcode_length
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    pub fn chain_genesis_prefix(&self) -> &str {
        &self.chain_genesis_prefix
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }
}

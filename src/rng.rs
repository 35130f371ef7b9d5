//! Injectable CSPRNG capability.
//!
//! Used for OTP code generation (spec §4.3: "drawn from the CSPRNG
//! uniformly over `[100000, 999999]`") and share-token generation (spec
//! §4.1: "generate a 32-byte URL-safe token"). Production code uses
//! `OsRngSource`; tests use `SequenceRng` to pin generated values.

use rand::RngCore;
use rand::rngs::OsRng;

pub trait RngSource: Send + Sync {
    /// Fill `dest` with cryptographically strong random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Uniform random integer in `[low, high]` inclusive.
    fn gen_range_inclusive(&self, low: u32, high: u32) -> u32 {
        assert!(low <= high, "gen_range_inclusive: low > high");
        let span = u64::from(high - low) + 1;
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        let raw = u64::from_le_bytes(buf);
        low + u32::try_from(raw % span).expect("span fits in u32")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngSource;

impl RngSource for OsRngSource {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Deterministic byte sequence for tests: cycles through a fixed buffer.
#[derive(Debug, Clone)]
pub struct FixedRng {
    bytes: std::sync::Arc<Vec<u8>>,
}

impl FixedRng {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        assert!(!bytes.is_empty(), "FixedRng needs at least one byte");
        Self {
            bytes: std::sync::Arc::new(bytes),
        }
    }
}

impl RngSource for FixedRng {
    fn fill_bytes(&self, dest: &mut [u8]) {
        for (i, slot) in dest.iter_mut().enumerate() {
            *slot = self.bytes[i % self.bytes.len()];
        }
    }
}

/// Generate a 6-digit decimal OTP code, uniform over `[100000, 999999]`.
pub fn gen_otp_code(rng: &dyn RngSource) -> String {
    let n = rng.gen_range_inclusive(100_000, 999_999);
    n.to_string()
}

/// Generate a 32-byte URL-safe share token, base64url-encoded (no padding).
pub fn gen_share_token(rng: &dyn RngSource) -> String {
    let mut buf = [0u8; 32];
    rng.fill_bytes(&mut buf);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, buf)
}

//! Injectable clock capability.
//!
//! Spec §9: "Clock, RNG ... are configuration; inject them through a
//! capability record passed into constructors." Production code uses
//! `SystemClock`; tests use `FixedClock` to pin `now()` and exercise
//! deadline/expiry edge cases deterministically.

use chrono::{DateTime, SecondsFormat, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Canonical millisecond-precision ISO-8601 (UTC) representation, used for
/// every timestamp that flows into the audit hash chain (spec §4.2, §9).
#[must_use]
pub fn to_canonical_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests; `now()` returns a fixed instant unless
/// advanced.
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(at)),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.inner.lock().expect("clock lock poisoned");
        *guard += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock().expect("clock lock poisoned")
    }
}

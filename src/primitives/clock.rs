//! Injectable clock. The rate limiter and token issuance read time
//! exclusively through this trait so tests can advance time deterministically
//! instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> f64;

    fn now_epoch_secs_u64(&self) -> u64 {
        self.now_epoch_seconds() as u64
    }
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// A clock tests can advance by hand instead of racing real time.
pub struct FixedClock {
    micros: AtomicU64,
}

impl FixedClock {
    pub fn at_epoch_seconds(seconds: f64) -> Self {
        Self {
            micros: AtomicU64::new((seconds * 1_000_000.0) as u64),
        }
    }

    pub fn advance_seconds(&self, seconds: f64) {
        self.micros.fetch_add((seconds * 1_000_000.0) as u64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_epoch_seconds(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

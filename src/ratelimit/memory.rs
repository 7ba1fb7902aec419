//! In-memory token-bucket rate limiter. Always available, priority 0, the
//! fallback every [`crate::ratelimit::provider::ProviderLoader`] keeps
//! around.
//!
//! Hand-rolled (not `governor`) because the decision record needs exact
//! `remaining`/`retryAfterSeconds` fields governor's GCRA API doesn't expose
//! in this shape, keyed in a `DashMap` the same way the registry's and
//! resolver's local caches are.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;

use super::model::{EffectiveRateLimit, RateLimitDecision, RateLimitKey};
use super::provider::{ProviderError, RateLimiterProvider};
use crate::primitives::clock::{Clock, SystemClock};

struct Bucket {
    tokens: f64,
    last_refill_epoch: f64,
    window_start_epoch: f64,
    request_count: u64,
}

pub struct MemoryRateLimiter {
    buckets: DashMap<RateLimitKey, Mutex<Bucket>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Pure function over bucket state, factored out so the algorithm is
    /// unit-testable without DashMap/Mutex plumbing.
    fn refill_and_consume(
        bucket: &mut Bucket,
        now: f64,
        effective: EffectiveRateLimit,
    ) -> RateLimitDecision {
        let EffectiveRateLimit {
            requests_per_window: r,
            window_seconds: w,
            burst_capacity: b,
        } = effective;

        if now - bucket.window_start_epoch >= w as f64 {
            bucket.window_start_epoch = now;
            bucket.request_count = 0;
        }

        let elapsed = (now - bucket.last_refill_epoch).max(0.0);
        let refill_rate = r as f64 / w as f64;
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(b as f64);
        bucket.last_refill_epoch = now;

        let allowed = bucket.tokens >= 1.0;
        let retry_after_seconds = if allowed {
            0
        } else {
            (((1.0 - bucket.tokens) * w as f64 / r as f64).ceil() as i64).max(1) as u64
        };

        if allowed {
            bucket.tokens -= 1.0;
            bucket.request_count += 1;
        }

        RateLimitDecision {
            allowed,
            limit: r,
            remaining: bucket.tokens.max(0.0).floor() as u32,
            reset_at_epoch_seconds: (bucket.window_start_epoch + w as f64) as u64,
            retry_after_seconds,
            request_count: bucket.request_count,
            window_seconds: w,
        }
    }
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterProvider for MemoryRateLimiter {
    fn priority(&self) -> u8 {
        0
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn check_and_consume(
        &self,
        key: &RateLimitKey,
        effective: EffectiveRateLimit,
    ) -> Result<RateLimitDecision, ProviderError> {
        let now = self.clock.now_epoch_seconds();
        let entry = self.buckets.entry(key.clone()).or_insert_with(|| {
            Mutex::new(Bucket {
                tokens: effective.burst_capacity as f64,
                last_refill_epoch: now,
                window_start_epoch: now,
                request_count: 0,
            })
        });
        let mut bucket = entry.lock().expect("bucket mutex poisoned");
        Ok(Self::refill_and_consume(&mut bucket, now, effective))
    }
}

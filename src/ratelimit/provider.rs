//! `RateLimiterProvider` SPI: small capability interface, providers selected
//! by a priority-sorted loader that falls back to memory when the
//! distributed provider degrades.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use super::model::{EffectiveRateLimit, RateLimitKey, RateLimitDecision};

#[async_trait]
pub trait RateLimiterProvider: Send + Sync {
    /// `0` for the always-available in-memory provider; `>0` for anything
    /// backed by shared/distributed storage, higher meaning more preferred.
    fn priority(&self) -> u8;

    /// Cheap liveness probe consulted by the loader; must not block on I/O
    /// longer than its own internal deadline.
    async fn is_available(&self) -> bool;

    async fn check_and_consume(
        &self,
        key: &RateLimitKey,
        effective: EffectiveRateLimit,
    ) -> Result<RateLimitDecision, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limit provider unreachable: {0}")]
    Unreachable(String),
    #[error("rate limit provider timed out")]
    Timeout,
}

/// Always-allow decision used by the fail-open policy: rate limiting must
/// never produce false 500s that hide real errors from a downed provider.
pub fn fail_open_decision(effective: EffectiveRateLimit, now_epoch: u64) -> RateLimitDecision {
    RateLimitDecision {
        allowed: true,
        limit: effective.requests_per_window,
        remaining: effective.requests_per_window,
        reset_at_epoch_seconds: now_epoch + effective.window_seconds,
        retry_after_seconds: 0,
        request_count: 0,
        window_seconds: effective.window_seconds,
    }
}

/// Sorts registered providers by descending priority and tracks whether
/// the top provider has degraded, falling back to the next (ultimately the
/// in-memory provider, which is always registered and always available).
///
/// Degradation state is a shared, lock-free counter so concurrent callers
/// observing provider failures agree on when to trip and when the
/// cool-down has elapsed, without a central scheduler.
pub struct ProviderLoader {
    providers: Vec<Arc<dyn RateLimiterProvider>>,
    consecutive_failures: AtomicU32,
    degrade_after_failures: u32,
    degraded_until_ms: AtomicU64,
    degrade_cooldown: Duration,
    started_at: Instant,
}

impl ProviderLoader {
    pub fn new(
        mut providers: Vec<Arc<dyn RateLimiterProvider>>,
        degrade_after_failures: u32,
        degrade_cooldown: Duration,
    ) -> Self {
        providers.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self {
            providers,
            consecutive_failures: AtomicU32::new(0),
            degrade_after_failures,
            degraded_until_ms: AtomicU64::new(0),
            degrade_cooldown,
            started_at: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn is_top_degraded(&self) -> bool {
        self.now_ms() < self.degraded_until_ms.load(Ordering::Relaxed)
    }

    /// Pick the highest-priority provider that isn't degraded and is
    /// currently available, falling back toward priority 0.
    pub async fn active_provider(&self) -> Option<&Arc<dyn RateLimiterProvider>> {
        for (idx, provider) in self.providers.iter().enumerate() {
            if idx == 0 && self.is_top_degraded() {
                continue;
            }
            if provider.is_available().await {
                return Some(provider);
            }
        }
        self.providers.last()
    }

    pub async fn check_and_consume(
        &self,
        key: &RateLimitKey,
        effective: EffectiveRateLimit,
        now_epoch: u64,
    ) -> RateLimitDecision {
        let Some(provider) = self.active_provider().await else {
            return fail_open_decision(effective, now_epoch);
        };

        match provider.check_and_consume(key, effective).await {
            Ok(decision) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                decision
            }
            Err(e) => {
                warn!(error = %e, key = %key, "rate limit provider error, failing open");
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.degrade_after_failures {
                    let until = self.now_ms() + self.degrade_cooldown.as_millis() as u64;
                    self.degraded_until_ms.store(until, Ordering::Relaxed);
                }
                fail_open_decision(effective, now_epoch)
            }
        }
    }
}

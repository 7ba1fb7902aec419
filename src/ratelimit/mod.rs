//! Rate-limit provider SPI, in-memory token-bucket implementation, and the
//! hierarchy resolver.

pub mod memory;
pub mod model;
pub mod provider;
pub mod resolver;

pub use memory::MemoryRateLimiter;
pub use model::{EffectiveRateLimit, RateLimitDecision, RateLimitKey, Scope};
pub use provider::{ProviderError, ProviderLoader, RateLimiterProvider};
pub use resolver::RateLimitResolver;

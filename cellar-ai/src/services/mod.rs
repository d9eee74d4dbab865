//! Shared services used by the provider adapters and the pipeline

pub mod cache_store;
pub mod rate_limiter;
pub mod session_log;
pub mod usage_stats;

pub use cache_store::{CacheBackend, CacheStore, CachedEntry, SqliteCacheBackend};
pub use rate_limiter::{RateLimitConfig, RateLimitUsage, RateLimiter};
pub use session_log::{ProcessingStats, SessionLog, StepStats};
pub use usage_stats::{ProviderUsage, ProviderUsageReport, UsageOutcome, UsagePeriod, UsageStats};

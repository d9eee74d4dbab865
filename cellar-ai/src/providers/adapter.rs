//! Provider adapter: cache, rate limit, retry and usage accounting around a
//! provider call
//!
//! Every provider request goes through [`ProviderAdapter::process`]:
//! 1. Cache lookup (when caching is on for the call). A hit returns
//!    immediately with `from_cache = true` and no provider call.
//! 2. One non-blocking rate-limit check. A denial fails the call without
//!    contacting the provider.
//! 3. Up to `max_retries` attempts. Retryable failures wait
//!    `attempt * base_delay` before the next attempt; anything else stops
//!    the loop.
//! 4. Successful results at or above `cache_min_confidence` are cached.
//! 5. One usage event is recorded with the total latency.
//!
//! The call never returns `Err`: failures come back as
//! [`AdapterResult::Failed`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::AdapterConfig;
use crate::models::{LabelExtraction, Transcription, WineAnalysis};
use crate::providers::{ProviderError, ProviderId};
use crate::services::{CacheStore, RateLimiter, UsageOutcome, UsageStats};

/// What a provider result reports about itself
pub trait ProviderOutput {
    /// 0-100 confidence, if the result carries one
    fn confidence(&self) -> Option<u8>;

    /// True when the provider answered but found nothing usable
    fn is_empty(&self) -> bool;
}

impl ProviderOutput for LabelExtraction {
    fn confidence(&self) -> Option<u8> {
        Some(self.confidence)
    }

    fn is_empty(&self) -> bool {
        self.raw_text.trim().is_empty()
    }
}

impl ProviderOutput for Transcription {
    fn confidence(&self) -> Option<u8> {
        Some(self.confidence)
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl ProviderOutput for WineAnalysis {
    fn confidence(&self) -> Option<u8> {
        Some(self.confidence)
    }

    fn is_empty(&self) -> bool {
        self.has_no_content()
    }
}

/// Result of one adapter call
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterResult<T> {
    Success(T),
    /// The provider answered but found nothing
    Empty,
    Failed(ProviderError),
}

/// Adapter result plus call metadata
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutcome<T> {
    pub result: AdapterResult<T>,
    pub from_cache: bool,
    /// Wall time of the whole call, including backoff
    pub latency_ms: u64,
    /// Provider attempts made; 0 for cache hits and rate-limit denials
    pub attempts: u32,
}

impl<T> AdapterOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self.result, AdapterResult::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match &self.result {
            AdapterResult::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ProviderError> {
        match &self.result {
            AdapterResult::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Wraps calls to one provider family
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: ProviderId,
    config: AdapterConfig,
    cache: CacheStore,
    limiter: Arc<RateLimiter>,
    stats: UsageStats,
}

impl ProviderAdapter {
    pub fn new(
        provider: ProviderId,
        config: AdapterConfig,
        cache: CacheStore,
        limiter: Arc<RateLimiter>,
        stats: UsageStats,
    ) -> Self {
        Self {
            provider,
            config,
            cache,
            limiter,
            stats,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Run `call` with caching, rate limiting, retry and usage accounting
    ///
    /// `cache_key` is `None` when the caller opted out of caching for this
    /// request.
    pub async fn process<T, F, Fut>(
        &self,
        operation: &'static str,
        cache_key: Option<String>,
        mut call: F,
    ) -> AdapterOutcome<T>
    where
        T: ProviderOutput + Serialize + DeserializeOwned + Send,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let started = Instant::now();
        let cache_key = cache_key.filter(|_| self.config.cache_enabled);

        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get::<T>(key).await {
                let latency_ms = elapsed_ms(started);
                debug!(provider = %self.provider, operation, latency_ms, "Cache hit");
                self.stats
                    .record(self.provider, UsageOutcome::CacheHit, latency_ms)
                    .await;
                return AdapterOutcome {
                    result: AdapterResult::Success(hit),
                    from_cache: true,
                    latency_ms,
                    attempts: 0,
                };
            }
        }

        if self.config.rate_limit_enabled && !self.limiter.try_acquire(self.provider) {
            let latency_ms = elapsed_ms(started);
            warn!(provider = %self.provider, operation, "Provider call denied by rate limiter");
            self.stats
                .record(self.provider, UsageOutcome::RateLimited, latency_ms)
                .await;
            return AdapterOutcome {
                result: AdapterResult::Failed(ProviderError::RateLimited(self.provider)),
                from_cache: false,
                latency_ms,
                attempts: 0,
            };
        }

        let max_attempts = self.config.max_retries.max(1);
        let mut attempts = 0;
        let result = loop {
            attempts += 1;

            match call().await {
                Ok(output) if output.is_empty() => {
                    debug!(
                        provider = %self.provider,
                        operation,
                        attempts,
                        "Provider returned no content"
                    );
                    break AdapterResult::Empty;
                }
                Ok(output) => {
                    if let Some(key) = &cache_key {
                        match output.confidence() {
                            Some(c) if c >= self.config.cache_min_confidence => {
                                self.cache.set(key, &output).await;
                            }
                            confidence => debug!(
                                provider = %self.provider,
                                operation,
                                ?confidence,
                                "Result below cache confidence threshold, not cached"
                            ),
                        }
                    }
                    break AdapterResult::Success(output);
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    if !retryable || attempts >= max_attempts {
                        warn!(
                            provider = %self.provider,
                            operation,
                            attempts,
                            retryable,
                            error = %err,
                            "Provider call failed"
                        );
                        break AdapterResult::Failed(err);
                    }

                    let delay = self.config.base_delay * attempts;
                    warn!(
                        provider = %self.provider,
                        operation,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Provider call failed, will retry after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let latency_ms = elapsed_ms(started);
        let outcome = match &result {
            AdapterResult::Success(_) => UsageOutcome::Success,
            AdapterResult::Empty => UsageOutcome::Empty,
            AdapterResult::Failed(_) => UsageOutcome::Failure,
        };
        self.stats.record(self.provider, outcome, latency_ms).await;

        AdapterOutcome {
            result,
            from_cache: false,
            latency_ms,
            attempts,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

//! Per-provider request ceilings over fixed minute and day windows
//!
//! Windows are aligned to the Unix epoch: the minute window of an instant is
//! `millis / 60_000`, the day window `millis / 86_400_000` (UTC days).
//! [`RateLimiter::try_acquire`] never blocks; it either admits the call and
//! counts it in both windows, or denies it without counting.

use cellar_common::Clock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::providers::ProviderId;

const MINUTE_MS: i64 = 60_000;
const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Day,
}

impl Granularity {
    fn window_ms(&self) -> i64 {
        match self {
            Granularity::Minute => MINUTE_MS,
            Granularity::Day => DAY_MS,
        }
    }

    fn window_of(&self, now_ms: i64) -> i64 {
        now_ms.div_euclid(self.window_ms())
    }
}

/// Ceilings for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_day: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CounterKey {
    provider: ProviderId,
    granularity: Granularity,
    window: i64,
}

/// Current window usage for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitUsage {
    pub provider: ProviderId,
    pub minute_count: u32,
    pub day_count: u32,
    /// `None` when the provider has no configured ceiling
    pub limits: Option<RateLimitConfig>,
}

#[derive(Debug)]
pub struct RateLimiter {
    limits: HashMap<ProviderId, RateLimitConfig>,
    clock: Arc<dyn Clock>,
    counters: Mutex<HashMap<CounterKey, u32>>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<ProviderId, RateLimitConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn lock_counters(&self) -> MutexGuard<'_, HashMap<CounterKey, u32>> {
        // Counters stay consistent even if a holder panicked; the critical
        // section only does integer updates.
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(provider: ProviderId, granularity: Granularity, now_ms: i64) -> CounterKey {
        CounterKey {
            provider,
            granularity,
            window: granularity.window_of(now_ms),
        }
    }

    /// Admit one call if both windows are below their ceilings
    ///
    /// Providers without configured limits are always admitted.
    pub fn try_acquire(&self, provider: ProviderId) -> bool {
        let Some(limit) = self.limits.get(&provider).copied() else {
            return true;
        };

        let now_ms = self.clock.now_millis();
        let minute_key = Self::key(provider, Granularity::Minute, now_ms);
        let day_key = Self::key(provider, Granularity::Day, now_ms);

        let mut counters = self.lock_counters();
        counters.retain(|key, _| key.window >= key.granularity.window_of(now_ms));

        let minute_count = counters.get(&minute_key).copied().unwrap_or(0);
        let day_count = counters.get(&day_key).copied().unwrap_or(0);

        if minute_count >= limit.per_minute || day_count >= limit.per_day {
            debug!(
                provider = %provider,
                minute_count,
                day_count,
                per_minute = limit.per_minute,
                per_day = limit.per_day,
                "Rate limit reached"
            );
            return false;
        }

        *counters.entry(minute_key).or_insert(0) += 1;
        *counters.entry(day_key).or_insert(0) += 1;
        true
    }

    pub fn usage(&self, provider: ProviderId) -> RateLimitUsage {
        let now_ms = self.clock.now_millis();
        let counters = self.lock_counters();
        let count = |g: Granularity| {
            counters
                .get(&Self::key(provider, g, now_ms))
                .copied()
                .unwrap_or(0)
        };

        RateLimitUsage {
            provider,
            minute_count: count(Granularity::Minute),
            day_count: count(Granularity::Day),
            limits: self.limits.get(&provider).copied(),
        }
    }

    #[cfg(test)]
    fn tracked_windows(&self) -> usize {
        self.lock_counters().len()
    }
}

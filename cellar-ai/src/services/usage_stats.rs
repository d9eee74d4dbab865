//! Provider usage counters per day and per month
//!
//! Each adapter call records one event. Counters are kept in
//! `ai_usage_stats`, keyed by provider and period (`YYYY-MM-DD` or
//! `YYYY-MM`, UTC). Recording is best-effort: a database failure is logged
//! and otherwise ignored.

use cellar_common::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

use crate::providers::ProviderId;

/// How an adapter call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    Success,
    /// Provider answered but found nothing
    Empty,
    Failure,
    CacheHit,
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    Day,
    Month,
}

impl UsagePeriod {
    pub fn key_for(&self, at: DateTime<Utc>) -> String {
        match self {
            UsagePeriod::Day => at.format("%Y-%m-%d").to_string(),
            UsagePeriod::Month => at.format("%Y-%m").to_string(),
        }
    }
}

/// Counters for one provider over one period
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub period: String,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub rate_limited: u64,
    pub total_latency_ms: u64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderUsageReport {
    pub provider: ProviderId,
    pub today: ProviderUsage,
    pub this_month: ProviderUsage,
}

#[derive(Clone)]
pub struct UsageStats {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl UsageStats {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Count one call in today's and this month's rows
    pub async fn record(&self, provider: ProviderId, outcome: UsageOutcome, latency_ms: u64) {
        let now = self.clock.now();
        for period in [UsagePeriod::Day, UsagePeriod::Month] {
            if let Err(e) = self
                .increment(provider, &period.key_for(now), outcome, latency_ms)
                .await
            {
                warn!(
                    provider = %provider,
                    error = %e,
                    "Failed to record provider usage"
                );
                return;
            }
        }
    }

    async fn increment(
        &self,
        provider: ProviderId,
        period: &str,
        outcome: UsageOutcome,
        latency_ms: u64,
    ) -> cellar_common::Result<()> {
        let flag = |wanted: &[UsageOutcome]| i64::from(wanted.contains(&outcome));

        sqlx::query(
            "INSERT INTO ai_usage_stats
                (provider, period, requests, successes, failures, cache_hits, rate_limited, total_latency_ms)
             VALUES (?, ?, 1, ?, ?, ?, ?, ?)
             ON CONFLICT(provider, period) DO UPDATE SET
                requests = requests + 1,
                successes = successes + excluded.successes,
                failures = failures + excluded.failures,
                cache_hits = cache_hits + excluded.cache_hits,
                rate_limited = rate_limited + excluded.rate_limited,
                total_latency_ms = total_latency_ms + excluded.total_latency_ms",
        )
        .bind(provider.as_str())
        .bind(period)
        .bind(flag(&[
            UsageOutcome::Success,
            UsageOutcome::Empty,
            UsageOutcome::CacheHit,
        ]))
        .bind(flag(&[UsageOutcome::Failure, UsageOutcome::RateLimited]))
        .bind(flag(&[UsageOutcome::CacheHit]))
        .bind(flag(&[UsageOutcome::RateLimited]))
        .bind(latency_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counters for the period containing now; zeroed on a missing row or error
    pub async fn usage(&self, provider: ProviderId, period: UsagePeriod) -> ProviderUsage {
        let key = period.key_for(self.clock.now());
        match self.load(provider, &key).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!(provider = %provider, error = %e, "Failed to read provider usage");
                ProviderUsage {
                    period: key,
                    ..ProviderUsage::default()
                }
            }
        }
    }

    async fn load(
        &self,
        provider: ProviderId,
        period: &str,
    ) -> cellar_common::Result<ProviderUsage> {
        let row: Option<(i64, i64, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT requests, successes, failures, cache_hits, rate_limited, total_latency_ms
             FROM ai_usage_stats WHERE provider = ? AND period = ?",
        )
        .bind(provider.as_str())
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        let Some((requests, successes, failures, cache_hits, rate_limited, total_latency_ms)) = row
        else {
            return Ok(ProviderUsage {
                period: period.to_string(),
                ..ProviderUsage::default()
            });
        };

        let average_latency_ms = if requests > 0 {
            total_latency_ms as f64 / requests as f64
        } else {
            0.0
        };

        Ok(ProviderUsage {
            period: period.to_string(),
            requests: requests.max(0) as u64,
            successes: successes.max(0) as u64,
            failures: failures.max(0) as u64,
            cache_hits: cache_hits.max(0) as u64,
            rate_limited: rate_limited.max(0) as u64,
            total_latency_ms: total_latency_ms.max(0) as u64,
            average_latency_ms,
        })
    }

    /// Today and this month for every provider
    pub async fn report(&self) -> Vec<ProviderUsageReport> {
        let mut reports = Vec::with_capacity(ProviderId::ALL.len());
        for provider in ProviderId::ALL {
            reports.push(ProviderUsageReport {
                provider,
                today: self.usage(provider, UsagePeriod::Day).await,
                this_month: self.usage(provider, UsagePeriod::Month).await,
            });
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_common::ManualClock;
    use chrono::TimeZone;
    use std::time::Duration;

    async fn stats_at(start: DateTime<Utc>) -> (UsageStats, Arc<ManualClock>) {
        let pool = crate::db::init_in_memory_pool().await.unwrap();
        let clock = Arc::new(ManualClock::starting_at(start));
        (UsageStats::new(pool, clock.clone()), clock)
    }

    #[test]
    fn test_period_keys() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 0).unwrap();
        assert_eq!(UsagePeriod::Day.key_for(at), "2025-03-09");
        assert_eq!(UsagePeriod::Month.key_for(at), "2025-03");
    }

    #[tokio::test]
    async fn test_record_accumulates_per_outcome() {
        let (stats, _clock) =
            stats_at(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap()).await;

        stats.record(ProviderId::Vision, UsageOutcome::Success, 100).await;
        stats.record(ProviderId::Vision, UsageOutcome::CacheHit, 2).await;
        stats.record(ProviderId::Vision, UsageOutcome::Failure, 300).await;
        stats.record(ProviderId::Vision, UsageOutcome::RateLimited, 0).await;

        let today = stats.usage(ProviderId::Vision, UsagePeriod::Day).await;
        assert_eq!(today.period, "2025-03-09");
        assert_eq!(today.requests, 4);
        assert_eq!(today.successes, 2);
        assert_eq!(today.failures, 2);
        assert_eq!(today.cache_hits, 1);
        assert_eq!(today.rate_limited, 1);
        assert_eq!(today.total_latency_ms, 402);
        assert!((today.average_latency_ms - 100.5).abs() < f64::EPSILON);

        let language = stats.usage(ProviderId::Language, UsagePeriod::Day).await;
        assert_eq!(language.requests, 0);
    }

    #[tokio::test]
    async fn test_month_spans_days_but_day_resets() {
        let (stats, clock) =
            stats_at(Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap()).await;

        stats.record(ProviderId::Language, UsageOutcome::Success, 10).await;
        clock.advance(Duration::from_secs(2 * 3600));
        stats.record(ProviderId::Language, UsageOutcome::Success, 30).await;

        let today = stats.usage(ProviderId::Language, UsagePeriod::Day).await;
        assert_eq!(today.period, "2025-03-10");
        assert_eq!(today.requests, 1);

        let month = stats.usage(ProviderId::Language, UsagePeriod::Month).await;
        assert_eq!(month.requests, 2);
        assert_eq!(month.total_latency_ms, 40);
    }

    #[tokio::test]
    async fn test_closed_pool_degrades_to_zeroes() {
        let (stats, _clock) =
            stats_at(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap()).await;
        stats.pool.close().await;

        stats.record(ProviderId::Vision, UsageOutcome::Success, 5).await;
        let today = stats.usage(ProviderId::Vision, UsagePeriod::Day).await;
        assert_eq!(today.requests, 0);
        assert_eq!(today.period, "2025-03-09");
    }

    #[tokio::test]
    async fn test_report_covers_every_provider() {
        let (stats, _clock) =
            stats_at(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap()).await;
        stats.record(ProviderId::Language, UsageOutcome::Empty, 50).await;

        let report = stats.report().await;
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].provider, ProviderId::Vision);
        assert_eq!(report[1].this_month.successes, 1);
    }
}

//! Append-only log of finished sessions and aggregate processing statistics

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::models::{ProcessingSession, StepId};

/// Aggregates for one step across all logged sessions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepStats {
    pub step: StepId,
    /// Sessions that had this step enabled
    pub enabled_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub skipped_count: u64,
    /// Mean over completed runs that reported a confidence
    pub average_confidence: Option<f64>,
    pub average_duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub total_sessions: u64,
    pub successful_sessions: u64,
    /// 0.0-1.0
    pub success_rate: f64,
    pub average_processing_time_ms: f64,
    pub average_confidence: f64,
    pub steps: Vec<StepStats>,
}

#[derive(Clone)]
pub struct SessionLog {
    pool: SqlitePool,
}

impl SessionLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a finished session; failures are logged and swallowed
    pub async fn record(&self, session: &ProcessingSession) {
        match self.try_record(session).await {
            Ok(()) => debug!(session_id = %session.session_id, "Session logged"),
            Err(e) => warn!(
                session_id = %session.session_id,
                error = %e,
                "Failed to write session log"
            ),
        }
    }

    async fn try_record(&self, session: &ProcessingSession) -> cellar_common::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO ai_session_log
                (session_id, success, confidence, processing_time_ms, error, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.session_id.to_string())
        .bind(session.succeeded())
        .bind(i64::from(session.confidence))
        .bind(session.processing_time_ms as i64)
        .bind(&session.error)
        .bind(session.started_at.to_rfc3339())
        .bind(session.completed_at.map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        for step in &session.steps {
            sqlx::query(
                "INSERT INTO ai_session_steps
                    (session_id, step_id, status, confidence, duration_ms, from_cache, error)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(session.session_id.to_string())
            .bind(step.id.as_str())
            .bind(step.status.as_str())
            .bind(step.confidence().map(i64::from))
            .bind(step.duration_ms.map(|d| d as i64))
            .bind(step.from_cache)
            .bind(&step.error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Aggregate statistics; all zeroes when the log is empty or unreadable
    pub async fn processing_stats(&self) -> ProcessingStats {
        match self.try_processing_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Failed to read processing stats");
                ProcessingStats::default()
            }
        }
    }

    async fn try_processing_stats(&self) -> cellar_common::Result<ProcessingStats> {
        let (total, successful, avg_time, avg_confidence): (i64, i64, Option<f64>, Option<f64>) =
            sqlx::query_as(
                "SELECT COUNT(*),
                        COALESCE(SUM(success), 0),
                        AVG(processing_time_ms),
                        AVG(confidence)
                 FROM ai_session_log",
            )
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<(String, i64, i64, i64, i64, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT step_id,
                    COUNT(*),
                    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END),
                    AVG(confidence),
                    AVG(duration_ms)
             FROM ai_session_steps
             GROUP BY step_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut steps: Vec<StepStats> = rows
            .into_iter()
            .filter_map(
                |(step_id, enabled, completed, failed, skipped, confidence, duration)| {
                    let step = StepId::parse(&step_id)?;
                    Some(StepStats {
                        step,
                        enabled_count: enabled.max(0) as u64,
                        completed_count: completed.max(0) as u64,
                        failed_count: failed.max(0) as u64,
                        skipped_count: skipped.max(0) as u64,
                        average_confidence: confidence,
                        average_duration_ms: duration,
                    })
                },
            )
            .collect();
        steps.sort_by_key(|s| s.step);

        let total = total.max(0) as u64;
        let successful = successful.max(0) as u64;

        Ok(ProcessingStats {
            total_sessions: total,
            successful_sessions: successful,
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
            average_processing_time_ms: avg_time.unwrap_or(0.0),
            average_confidence: avg_confidence.unwrap_or(0.0),
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabelExtraction, StepResult, WineDetails};
    use chrono::Utc;

    fn label_session(confidence: u8, time_ms: u64) -> ProcessingSession {
        let now = Utc::now();
        let mut session =
            ProcessingSession::new(now, &[StepId::LabelExtraction, StepId::SpeechTranscription]);
        let label = session.step_mut(StepId::LabelExtraction).unwrap();
        label.start().unwrap();
        label
            .complete(
                Some(StepResult::Label(LabelExtraction {
                    raw_text: "Barolo".to_string(),
                    wine: WineDetails::default(),
                    confidence,
                })),
                time_ms,
                false,
            )
            .unwrap();
        session
            .step_mut(StepId::SpeechTranscription)
            .unwrap()
            .skip("no audio")
            .unwrap();
        session.finish(None, time_ms, now);
        session
    }

    fn failed_session() -> ProcessingSession {
        let now = Utc::now();
        let mut session = ProcessingSession::new(now, &[StepId::LabelExtraction]);
        session.steps[0].force_fail("Session timed out after 10 ms");
        session.finish(Some("Session timed out after 10 ms".to_string()), 10, now);
        session
    }

    #[tokio::test]
    async fn test_empty_log_yields_zero_stats() {
        let pool = crate::db::init_in_memory_pool().await.unwrap();
        let stats = SessionLog::new(pool).processing_stats().await;
        assert_eq!(stats, ProcessingStats::default());
    }

    #[tokio::test]
    async fn test_stats_aggregate_sessions_and_steps() {
        let pool = crate::db::init_in_memory_pool().await.unwrap();
        let log = SessionLog::new(pool);

        log.record(&label_session(80, 100)).await;
        log.record(&label_session(60, 300)).await;
        log.record(&failed_session()).await;

        let stats = log.processing_stats().await;
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.successful_sessions, 2);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.average_processing_time_ms - 410.0 / 3.0).abs() < 1e-9);
        // (80 + 60 + 0) / 3
        assert!((stats.average_confidence - 140.0 / 3.0).abs() < 1e-9);

        assert_eq!(stats.steps.len(), 2);
        let label = &stats.steps[0];
        assert_eq!(label.step, StepId::LabelExtraction);
        assert_eq!(label.enabled_count, 3);
        assert_eq!(label.completed_count, 2);
        assert_eq!(label.failed_count, 1);
        assert_eq!(label.average_confidence, Some(70.0));

        let speech = &stats.steps[1];
        assert_eq!(speech.step, StepId::SpeechTranscription);
        assert_eq!(speech.enabled_count, 2);
        assert_eq!(speech.skipped_count, 2);
        assert_eq!(speech.average_confidence, None);
    }

    #[tokio::test]
    async fn test_closed_pool_degrades_to_default() {
        let pool = crate::db::init_in_memory_pool().await.unwrap();
        let log = SessionLog::new(pool.clone());
        pool.close().await;

        log.record(&label_session(90, 10)).await;
        assert_eq!(log.processing_stats().await, ProcessingStats::default());
    }
}

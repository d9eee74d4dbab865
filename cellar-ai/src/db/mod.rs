//! Database access for cellar-ai

pub mod settings;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Opens (or creates) the SQLite file in the root folder and ensures the
/// cellar-ai tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with all tables created
///
/// The connection is pinned open; an in-memory SQLite database disappears
/// with its last connection.
pub async fn init_in_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create cellar-ai tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_cache (
            cache_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            stored_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_usage_stats (
            provider TEXT NOT NULL,
            period TEXT NOT NULL,
            requests INTEGER NOT NULL DEFAULT 0,
            successes INTEGER NOT NULL DEFAULT 0,
            failures INTEGER NOT NULL DEFAULT 0,
            cache_hits INTEGER NOT NULL DEFAULT 0,
            rate_limited INTEGER NOT NULL DEFAULT 0,
            total_latency_ms INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (provider, period)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_session_log (
            session_id TEXT PRIMARY KEY,
            success INTEGER NOT NULL,
            confidence INTEGER NOT NULL,
            processing_time_ms INTEGER NOT NULL,
            error TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_session_steps (
            session_id TEXT NOT NULL REFERENCES ai_session_log(session_id),
            step_id TEXT NOT NULL,
            status TEXT NOT NULL,
            confidence INTEGER,
            duration_ms INTEGER,
            from_cache INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            PRIMARY KEY (session_id, step_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (settings, ai_cache, ai_usage_stats, ai_session_log, ai_session_steps)"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let pool = init_in_memory_pool().await.unwrap();
        init_tables(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'ai_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(
            names,
            vec!["ai_cache", "ai_session_log", "ai_session_steps", "ai_usage_stats"]
        );
    }

    #[tokio::test]
    async fn test_file_database_created_under_missing_parent() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("cellar.db");

        let pool = init_database_pool(&db_path).await.unwrap();
        assert!(db_path.exists());
        pool.close().await;
    }
}

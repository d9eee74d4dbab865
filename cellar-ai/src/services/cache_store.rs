//! Time-bounded result cache
//!
//! Entries are JSON payloads stamped with their write time. The TTL is
//! checked on read; an expired entry is deleted and reported as a miss.
//! Every backend failure degrades to a miss (or a skipped write) with a
//! warning, so a broken cache never fails a pipeline run.

use async_trait::async_trait;
use cellar_common::{Clock, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::providers::ProviderId;

/// Stored cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub payload: String,
    /// Unix milliseconds at write time
    pub stored_at_ms: i64,
}

/// Persistence behind [`CacheStore`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CachedEntry>>;
    async fn store(&self, key: &str, entry: &CachedEntry) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Cache backend on the `ai_cache` table
#[derive(Debug, Clone)]
pub struct SqliteCacheBackend {
    pool: SqlitePool,
}

impl SqliteCacheBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBackend for SqliteCacheBackend {
    async fn load(&self, key: &str) -> Result<Option<CachedEntry>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT payload, stored_at_ms FROM ai_cache WHERE cache_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(payload, stored_at_ms)| CachedEntry {
            payload,
            stored_at_ms,
        }))
    }

    async fn store(&self, key: &str, entry: &CachedEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_cache (cache_key, payload, stored_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                stored_at_ms = excluded.stored_at_ms",
        )
        .bind(key)
        .bind(&entry.payload)
        .bind(entry.stored_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM ai_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Typed, TTL-enforcing cache over a [`CacheBackend`]
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            ttl,
            clock,
        }
    }

    pub fn sqlite(pool: SqlitePool, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(SqliteCacheBackend::new(pool)), ttl, clock)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read a live entry; expired, unreadable or undecodable entries are misses
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = match self.backend.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(cache_key = key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let age_ms = self.clock.now_millis() - entry.stored_at_ms;
        if age_ms >= self.ttl.as_millis() as i64 {
            debug!(cache_key = key, age_ms, "Cache entry expired");
            self.evict(key).await;
            return None;
        }

        match serde_json::from_str(&entry.payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(cache_key = key, error = %e, "Cache entry undecodable, evicting");
                self.evict(key).await;
                None
            }
        }
    }

    /// Write an entry stamped with the current time; failures are logged only
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(cache_key = key, error = %e, "Cache value not serializable, skipping write");
                return;
            }
        };

        let entry = CachedEntry {
            payload,
            stored_at_ms: self.clock.now_millis(),
        };

        if let Err(e) = self.backend.store(key, &entry).await {
            warn!(cache_key = key, error = %e, "Cache write failed");
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.backend.remove(key).await {
            warn!(cache_key = key, error = %e, "Cache eviction failed");
        }
    }

    /// Deterministic key for a provider call
    ///
    /// SHA-256 over provider, operation, input reference and the serialized
    /// request flags, so differing options never share an entry.
    pub fn derive_key<F: Serialize>(
        provider: ProviderId,
        operation: &str,
        reference: &str,
        flags: &F,
    ) -> String {
        let flags = serde_json::to_string(flags).unwrap_or_default();
        let mut hasher = Sha256::new();
        for part in [provider.as_str(), operation, reference, flags.as_str()] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}:{}:{}", provider.as_str(), operation, hex)
    }

    /// Key under which a finished session snapshot is kept
    pub fn session_key(session_id: Uuid) -> String {
        format!("session:{}", session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_common::{Error, ManualClock};
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        text: String,
        confidence: u8,
    }

    #[derive(Default)]
    struct MemoryBackend {
        entries: Mutex<HashMap<String, CachedEntry>>,
    }

    #[async_trait]
    impl CacheBackend for MemoryBackend {
        async fn load(&self, key: &str) -> Result<Option<CachedEntry>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }
        async fn store(&self, key: &str, entry: &CachedEntry) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), entry.clone());
            Ok(())
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn load(&self, _key: &str) -> Result<Option<CachedEntry>> {
            Err(Error::Internal("disk on fire".to_string()))
        }
        async fn store(&self, _key: &str, _entry: &CachedEntry) -> Result<()> {
            Err(Error::Internal("disk on fire".to_string()))
        }
        async fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::Internal("disk on fire".to_string()))
        }
    }

    fn sample() -> Sample {
        Sample {
            text: "Chateau Margaux".to_string(),
            confidence: 91,
        }
    }

    #[tokio::test]
    async fn test_set_then_get_within_ttl() {
        let clock = Arc::new(ManualClock::at_millis(1_000_000));
        let store = CacheStore::new(
            Arc::new(MemoryBackend::default()),
            Duration::from_secs(60),
            clock.clone(),
        );

        store.set("k", &sample()).await;
        clock.advance(Duration::from_secs(59));
        assert_eq!(store.get::<Sample>("k").await, Some(sample()));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_deleted() {
        let clock = Arc::new(ManualClock::at_millis(1_000_000));
        let backend = Arc::new(MemoryBackend::default());
        let store = CacheStore::new(backend.clone(), Duration::from_secs(60), clock.clone());

        store.set("k", &sample()).await;
        clock.advance(Duration::from_secs(60));

        assert_eq!(store.get::<Sample>("k").await, None);
        assert!(backend.entries.lock().unwrap().get("k").is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_evicted() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let backend = Arc::new(MemoryBackend::default());
        backend.entries.lock().unwrap().insert(
            "k".to_string(),
            CachedEntry {
                payload: "{not json".to_string(),
                stored_at_ms: 0,
            },
        );
        let store = CacheStore::new(backend.clone(), Duration::from_secs(60), clock);

        assert_eq!(store.get::<Sample>("k").await, None);
        assert!(backend.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_miss() {
        let store = CacheStore::new(
            Arc::new(BrokenBackend),
            Duration::from_secs(60),
            Arc::new(ManualClock::at_millis(0)),
        );

        store.set("k", &sample()).await;
        assert_eq!(store.get::<Sample>("k").await, None);
    }

    #[tokio::test]
    async fn test_sqlite_backend_round_trip() {
        let pool = crate::db::init_in_memory_pool().await.unwrap();
        let clock = Arc::new(ManualClock::at_millis(5_000));
        let store = CacheStore::sqlite(pool.clone(), Duration::from_secs(10), clock.clone());

        store.set("vision:k", &sample()).await;
        let updated = Sample {
            text: "Chateau Latour".to_string(),
            confidence: 77,
        };
        store.set("vision:k", &updated).await;
        assert_eq!(store.get::<Sample>("vision:k").await, Some(updated));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);

        clock.advance(Duration::from_secs(11));
        assert_eq!(store.get::<Sample>("vision:k").await, None);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_derive_key_is_deterministic_and_flag_sensitive() {
        let a = CacheStore::derive_key(ProviderId::Language, "transcribe", "/a.m4a", &Some("en"));
        let b = CacheStore::derive_key(ProviderId::Language, "transcribe", "/a.m4a", &Some("en"));
        let c = CacheStore::derive_key(ProviderId::Language, "transcribe", "/a.m4a", &Some("fr"));
        let d = CacheStore::derive_key(ProviderId::Vision, "transcribe", "/a.m4a", &Some("en"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.starts_with("language:transcribe:"));
    }

    #[test]
    fn test_session_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            CacheStore::session_key(id),
            "session:00000000-0000-0000-0000-000000000000"
        );
    }
}

//! Test Helper Utilities
//!
//! Scripted providers, an in-memory media resolver and service wiring over
//! an in-memory database and a manual clock.

#![allow(dead_code)]

use async_trait::async_trait;
use cellar_ai::config::AiConfig;
use cellar_ai::models::{
    Appearance, Conclusion, LabelExtraction, MediaRef, Nose, Palate, Transcription, WineAnalysis,
    WineDetails, WineHints,
};
use cellar_ai::pipeline::{AiServices, PipelineOrchestrator};
use cellar_ai::providers::{
    LabelReader, MediaPayload, MediaResolver, ProviderError, SpeechTranscriber, TextAnalyzer,
};
use cellar_ai::services::{CacheBackend, CachedEntry};
use cellar_common::ManualClock;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 2024-03-15T12:00:00Z
pub const TEST_EPOCH_MS: i64 = 1_710_504_000_000;

/// Provider double that replays queued responses, then a fallback
pub struct Scripted<T> {
    responses: Mutex<VecDeque<Result<T, ProviderError>>>,
    fallback: Result<T, ProviderError>,
    delay: Duration,
    panic_with: Option<&'static str>,
    calls: AtomicU32,
    last_text: Mutex<Option<String>>,
}

impl<T: Clone + Send + Sync> Scripted<T> {
    pub fn new(fallback: Result<T, ProviderError>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            panic_with: None,
            calls: AtomicU32::new(0),
            last_text: Mutex::new(None),
        }
    }

    pub fn ok(value: T) -> Self {
        Self::new(Ok(value))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(Err(error))
    }

    /// Responses returned before the fallback, in order
    pub fn then_respond(self, responses: Vec<Result<T, ProviderError>>) -> Self {
        *self.responses.lock().unwrap() = responses.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panicking(mut self, message: &'static str) -> Self {
        self.panic_with = Some(message);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Text passed to the most recent `analyze` call
    pub fn last_text(&self) -> Option<String> {
        self.last_text.lock().unwrap().clone()
    }

    async fn respond(&self) -> Result<T, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = self.panic_with {
            panic!("{}", message);
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LabelReader for Scripted<LabelExtraction> {
    async fn read_label(
        &self,
        _image: &MediaPayload,
        _hints: Option<&WineHints>,
    ) -> Result<LabelExtraction, ProviderError> {
        self.respond().await
    }
}

#[async_trait]
impl SpeechTranscriber for Scripted<Transcription> {
    async fn transcribe(
        &self,
        _audio: &MediaPayload,
        _language: Option<&str>,
    ) -> Result<Transcription, ProviderError> {
        self.respond().await
    }
}

#[async_trait]
impl TextAnalyzer for Scripted<WineAnalysis> {
    async fn analyze(
        &self,
        text: &str,
        _hints: Option<&WineHints>,
    ) -> Result<WineAnalysis, ProviderError> {
        *self.last_text.lock().unwrap() = Some(text.to_string());
        self.respond().await
    }
}

/// Serves fixed bytes for every reference except those starting with `missing`
#[derive(Debug, Default)]
pub struct StaticMediaResolver;

#[async_trait]
impl MediaResolver for StaticMediaResolver {
    async fn fetch(&self, media: &MediaRef) -> Result<MediaPayload, ProviderError> {
        if media.as_str().starts_with("missing") {
            return Err(ProviderError::Media(format!("{} not found", media)));
        }
        Ok(MediaPayload {
            bytes: media.as_str().as_bytes().to_vec(),
            mime_type: "application/octet-stream".to_string(),
            file_name: media.as_str().to_string(),
        })
    }
}

/// Cache backend held in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl MemoryBackend {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn load(&self, key: &str) -> cellar_common::Result<Option<CachedEntry>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn store(&self, key: &str, entry: &CachedEntry) -> cellar_common::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> cellar_common::Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Cache backend whose every operation fails
#[derive(Debug, Default)]
pub struct BrokenBackend;

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn load(&self, _key: &str) -> cellar_common::Result<Option<CachedEntry>> {
        Err(cellar_common::Error::Internal("cache offline".to_string()))
    }

    async fn store(&self, _key: &str, _entry: &CachedEntry) -> cellar_common::Result<()> {
        Err(cellar_common::Error::Internal("cache offline".to_string()))
    }

    async fn remove(&self, _key: &str) -> cellar_common::Result<()> {
        Err(cellar_common::Error::Internal("cache offline".to_string()))
    }
}

/// Services over an in-memory database, a manual clock and static media
pub struct TestEnv {
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
    pub services: AiServices,
}

impl TestEnv {
    pub async fn new(config: AiConfig) -> Self {
        let pool = cellar_ai::db::init_in_memory_pool()
            .await
            .expect("in-memory database");
        let clock = Arc::new(ManualClock::at_millis(TEST_EPOCH_MS));
        let services = AiServices::new(pool.clone(), config, clock.clone())
            .with_media(Arc::new(StaticMediaResolver));
        Self {
            pool,
            clock,
            services,
        }
    }

    pub fn orchestrator(&self, providers: &Providers) -> PipelineOrchestrator {
        self.services.build_orchestrator_with(
            providers.reader.clone(),
            providers.transcriber.clone(),
            providers.analyzer.clone(),
        )
    }
}

/// Fast defaults: no backoff wait
pub fn fast_config() -> AiConfig {
    let mut config = AiConfig::default();
    config.adapter.base_delay = Duration::from_millis(1);
    config
}

/// One scripted double per provider call
pub struct Providers {
    pub reader: Arc<Scripted<LabelExtraction>>,
    pub transcriber: Arc<Scripted<Transcription>>,
    pub analyzer: Arc<Scripted<WineAnalysis>>,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            reader: Arc::new(Scripted::ok(label(80))),
            transcriber: Arc::new(Scripted::ok(transcription(
                "Cherry and plum, firm tannins, long finish",
                70,
            ))),
            analyzer: Arc::new(Scripted::ok(analysis(90))),
        }
    }
}

pub fn label(confidence: u8) -> LabelExtraction {
    LabelExtraction {
        raw_text: "CHATEAU MARGAUX\nGrand Vin\n2015\nMargaux\n13.5% vol".to_string(),
        wine: WineDetails {
            name: Some("Grand Vin".to_string()),
            producer: Some("Chateau Margaux".to_string()),
            vintage: Some(2015),
            region: Some("Margaux".to_string()),
            country: Some("France".to_string()),
            wine_type: Some("red".to_string()),
            grape_varieties: Vec::new(),
            alcohol_content: Some(13.5),
        },
        confidence,
    }
}

pub fn transcription(text: &str, confidence: u8) -> Transcription {
    Transcription {
        text: text.to_string(),
        language: Some("en".to_string()),
        duration_secs: Some(12.0),
        confidence,
    }
}

pub fn analysis(confidence: u8) -> WineAnalysis {
    WineAnalysis {
        wine: WineDetails {
            name: Some("Margaux Reserve".to_string()),
            grape_varieties: vec!["Cabernet Sauvignon".to_string(), "Merlot".to_string()],
            ..WineDetails::default()
        },
        appearance: Appearance {
            clarity: Some("clear".to_string()),
            intensity: Some("deep".to_string()),
            color: Some("ruby".to_string()),
        },
        nose: Nose {
            aromas: vec!["cherry".to_string(), "plum".to_string()],
            ..Nose::default()
        },
        palate: Palate {
            tannin: Some("high".to_string()),
            finish: Some("long".to_string()),
            flavors: vec!["cherry".to_string()],
            ..Palate::default()
        },
        conclusion: Conclusion {
            quality: Some("very good".to_string()),
            rating: Some(92),
            ..Conclusion::default()
        },
        summary: Some("Structured red with dark fruit".to_string()),
        confidence,
    }
}

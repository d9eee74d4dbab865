//! Wiring shared services and providers into a [`PipelineOrchestrator`]
//!
//! [`AiServices`] owns the long-lived pieces (cache, rate limiter, usage
//! stats, session log). Orchestrators built from it share those pieces, so
//! rebuilding after a key change keeps rate-limit windows and cache intact.

use cellar_common::Clock;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::{AiConfig, ProviderKeys};
use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
use crate::providers::google_vision::GoogleVisionClient;
use crate::providers::openai::OpenAiClient;
use crate::providers::{
    DefaultMediaResolver, LabelReader, LanguageAdapter, MediaResolver, ProviderAdapter, ProviderId,
    SpeechTranscriber, TextAnalyzer, VisionAdapter,
};
use crate::services::{CacheStore, RateLimiter, SessionLog, UsageStats};

#[derive(Clone)]
pub struct AiServices {
    pub config: AiConfig,
    pub cache: CacheStore,
    pub limiter: Arc<RateLimiter>,
    pub usage: UsageStats,
    pub session_log: SessionLog,
    pub media: Arc<dyn MediaResolver>,
    pub clock: Arc<dyn Clock>,
}

impl AiServices {
    /// Services backed by the given database
    pub fn new(pool: SqlitePool, config: AiConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: CacheStore::sqlite(pool.clone(), config.cache_ttl, clock.clone()),
            limiter: Arc::new(RateLimiter::new(config.rate_limits(), clock.clone())),
            usage: UsageStats::new(pool.clone(), clock.clone()),
            session_log: SessionLog::new(pool),
            media: Arc::new(DefaultMediaResolver::new(config.adapter.request_timeout)),
            config,
            clock,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaResolver>) -> Self {
        self.media = media;
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    pub fn adapter(&self, provider: ProviderId) -> ProviderAdapter {
        ProviderAdapter::new(
            provider,
            self.config.adapter.clone(),
            self.cache.clone(),
            self.limiter.clone(),
            self.usage.clone(),
        )
    }

    /// Orchestrator using Google Vision and OpenAI with the given keys
    pub fn build_orchestrator(&self, keys: &ProviderKeys) -> PipelineOrchestrator {
        let timeout = self.config.adapter.request_timeout;
        let vision = Arc::new(GoogleVisionClient::new(keys.vision.clone(), timeout));
        let openai = Arc::new(OpenAiClient::new(
            keys.openai.clone(),
            self.config.transcription_model.clone(),
            self.config.analysis_model.clone(),
            timeout,
        ));

        self.build_orchestrator_with(vision, openai.clone(), openai)
    }

    /// Orchestrator over caller-supplied provider implementations
    pub fn build_orchestrator_with(
        &self,
        reader: Arc<dyn LabelReader>,
        transcriber: Arc<dyn SpeechTranscriber>,
        analyzer: Arc<dyn TextAnalyzer>,
    ) -> PipelineOrchestrator {
        let vision = VisionAdapter::new(
            self.adapter(ProviderId::Vision),
            reader,
            self.media.clone(),
        );
        let language = LanguageAdapter::new(
            self.adapter(ProviderId::Language),
            transcriber,
            analyzer,
            self.media.clone(),
        );

        PipelineOrchestrator::new(
            vision,
            language,
            self.cache.clone(),
            self.session_log.clone(),
            PipelineConfig {
                session_timeout: self.config.session_timeout,
            },
            self.clock.clone(),
        )
    }
}

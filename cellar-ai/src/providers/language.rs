//! Language adapter: speech → [`Transcription`], notes → [`WineAnalysis`]

use std::sync::Arc;

use crate::models::{AiProcessingOptions, MediaRef, Transcription, WineAnalysis, WineHints};
use crate::providers::{
    AdapterOutcome, MediaResolver, ProviderAdapter, SpeechTranscriber, TextAnalyzer,
};
use crate::services::CacheStore;

const TRANSCRIBE: &str = "transcribe";
const ANALYZE: &str = "analyze";

#[derive(Clone)]
pub struct LanguageAdapter {
    core: ProviderAdapter,
    transcriber: Arc<dyn SpeechTranscriber>,
    analyzer: Arc<dyn TextAnalyzer>,
    media: Arc<dyn MediaResolver>,
}

impl LanguageAdapter {
    pub fn new(
        core: ProviderAdapter,
        transcriber: Arc<dyn SpeechTranscriber>,
        analyzer: Arc<dyn TextAnalyzer>,
        media: Arc<dyn MediaResolver>,
    ) -> Self {
        Self {
            core,
            transcriber,
            analyzer,
            media,
        }
    }

    pub async fn transcribe(
        &self,
        audio: &MediaRef,
        options: &AiProcessingOptions,
    ) -> AdapterOutcome<Transcription> {
        let language = options.language.as_deref();
        let cache_key = options.use_cache.then(|| {
            CacheStore::derive_key(self.core.provider(), TRANSCRIBE, audio.as_str(), &language)
        });

        let transcriber = &self.transcriber;
        let media = &self.media;
        self.core
            .process(TRANSCRIBE, cache_key, move || async move {
                let payload = media.fetch(audio).await?;
                transcriber.transcribe(&payload, language).await
            })
            .await
    }

    pub async fn analyze(
        &self,
        text: &str,
        hints: Option<&WineHints>,
        options: &AiProcessingOptions,
    ) -> AdapterOutcome<WineAnalysis> {
        let cache_key = options
            .use_cache
            .then(|| CacheStore::derive_key(self.core.provider(), ANALYZE, text, &hints));

        let analyzer = &self.analyzer;
        self.core
            .process(ANALYZE, cache_key, move || async move {
                analyzer.analyze(text, hints).await
            })
            .await
    }
}

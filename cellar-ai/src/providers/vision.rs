//! Vision adapter: label photo → [`LabelExtraction`]

use std::sync::Arc;

use crate::models::{AiProcessingOptions, LabelExtraction, MediaRef, WineHints};
use crate::providers::{AdapterOutcome, LabelReader, MediaResolver, ProviderAdapter};
use crate::services::CacheStore;

const EXTRACT_LABEL: &str = "extract_label";

#[derive(Clone)]
pub struct VisionAdapter {
    core: ProviderAdapter,
    reader: Arc<dyn LabelReader>,
    media: Arc<dyn MediaResolver>,
}

impl VisionAdapter {
    pub fn new(
        core: ProviderAdapter,
        reader: Arc<dyn LabelReader>,
        media: Arc<dyn MediaResolver>,
    ) -> Self {
        Self {
            core,
            reader,
            media,
        }
    }

    /// Read the label in `image`; hints only fill gaps the label leaves
    pub async fn extract_label(
        &self,
        image: &MediaRef,
        hints: Option<&WineHints>,
        options: &AiProcessingOptions,
    ) -> AdapterOutcome<LabelExtraction> {
        let cache_key = options.use_cache.then(|| {
            CacheStore::derive_key(self.core.provider(), EXTRACT_LABEL, image.as_str(), &hints)
        });

        let reader = &self.reader;
        let media = &self.media;
        self.core
            .process(EXTRACT_LABEL, cache_key, move || async move {
                let payload = media.fetch(image).await?;
                reader.read_label(&payload, hints).await
            })
            .await
    }
}

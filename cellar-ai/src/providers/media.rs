//! Loading media references into memory

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::MediaRef;
use crate::providers::ProviderError;

/// Media bytes ready to send to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

/// Resolves a [`MediaRef`] to bytes
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn fetch(&self, media: &MediaRef) -> Result<MediaPayload, ProviderError>;
}

/// Reads local paths and `file://` URLs from disk, downloads `http(s)://`
#[derive(Debug, Clone)]
pub struct DefaultMediaResolver {
    http: reqwest::Client,
    timeout: Duration,
}

impl DefaultMediaResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    async fn read_file(&self, path: &Path) -> Result<MediaPayload, ProviderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProviderError::Media(format!("{}: {}", path.display(), e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());

        Ok(MediaPayload {
            mime_type: mime_for_name(&file_name).to_string(),
            file_name,
            bytes,
        })
    }

    async fn download(&self, url: &str) -> Result<MediaPayload, ProviderError> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Media(format!(
                "{} returned HTTP {}",
                url,
                status.as_u16()
            )));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let file_name = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .unwrap_or("media")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?
            .to_vec();

        Ok(MediaPayload {
            mime_type: header_mime
                .filter(|m| m != "application/octet-stream")
                .unwrap_or_else(|| mime_for_name(&file_name).to_string()),
            file_name,
            bytes,
        })
    }
}

#[async_trait]
impl MediaResolver for DefaultMediaResolver {
    async fn fetch(&self, media: &MediaRef) -> Result<MediaPayload, ProviderError> {
        let reference = media.as_str().trim();
        let payload = if reference.starts_with("http://") || reference.starts_with("https://") {
            self.download(reference).await?
        } else {
            let path = reference
                .strip_prefix("file://")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(reference));
            self.read_file(&path).await?
        };

        if payload.bytes.is_empty() {
            return Err(ProviderError::Media(format!("{} is empty", reference)));
        }
        Ok(payload)
    }
}

/// MIME type from file extension
pub fn mime_for_name(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "gif" => "image/gif",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "ogg" | "oga" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mime_for_name() {
        assert_eq!(mime_for_name("label.JPG"), "image/jpeg");
        assert_eq!(mime_for_name("notes.m4a"), "audio/mp4");
        assert_eq!(mime_for_name("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_reads_plain_path_and_file_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("label.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let resolver = DefaultMediaResolver::new(Duration::from_secs(5));

        let plain = resolver
            .fetch(&MediaRef::new(path.to_string_lossy()))
            .await
            .unwrap();
        assert_eq!(plain.mime_type, "image/png");
        assert_eq!(plain.file_name, "label.png");
        assert_eq!(plain.bytes.len(), 4);

        let url = format!("file://{}", path.display());
        let via_url = resolver.fetch(&MediaRef::new(url)).await.unwrap();
        assert_eq!(via_url, plain);
    }

    #[tokio::test]
    async fn test_missing_and_empty_files_are_media_errors() {
        let dir = TempDir::new().unwrap();
        let resolver = DefaultMediaResolver::new(Duration::from_secs(5));

        let missing = dir.path().join("missing.jpg");
        let err = resolver
            .fetch(&MediaRef::new(missing.to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Media(_)));
        assert!(!err.is_retryable());

        let empty = dir.path().join("empty.jpg");
        std::fs::write(&empty, b"").unwrap();
        let err = resolver
            .fetch(&MediaRef::new(empty.to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Media(_)));
    }
}

//! Media uploads to the object store.

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use anyhow::Context as _;

use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Uploads local images and hands back their public URL.
#[async_trait::async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload the image at `path`. Returns `None` on any failure; the cause is
    /// logged, never raised.
    async fn upload_image(&self, path: &Path, identifier: &str) -> Option<String>;
}

/// [`MediaStore`] over a Supabase-style storage REST API.
pub struct MediaUploader {
    config: StorageConfig,
    http_client: reqwest::Client,
}

impl MediaUploader {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .with_context(|| "failed to build storage HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Public URL an uploaded object is served from.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket,
            key
        )
    }

    /// Collision-resistant object key inside the configured folder.
    pub fn object_key(&self, identifier: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let folder = self.config.folder.trim_matches('/');
        let name = format!("{}_{millis}_{}.jpg", sanitize_identifier(identifier), &nonce[..8]);
        if folder.is_empty() {
            name
        } else {
            format!("{folder}/{name}")
        }
    }

    async fn try_upload(
        &self,
        path: &Path,
        identifier: &str,
    ) -> std::result::Result<String, StorageError> {
        let source = path.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || normalize_to_jpeg(&source))
            .await
            .map_err(|error| StorageError::Encode(error.to_string()))??;

        let key = self.object_key(identifier);
        let upload_url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket,
            key
        );

        let response = self
            .http_client
            .post(&upload_url)
            .header("authorization", format!("Bearer {}", self.config.key))
            .header("apikey", &self.config.key)
            .header("content-type", "image/jpeg")
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|error| StorageError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(self.public_url(&key))
    }
}

#[async_trait::async_trait]
impl MediaStore for MediaUploader {
    async fn upload_image(&self, path: &Path, identifier: &str) -> Option<String> {
        match self.try_upload(path, identifier).await {
            Ok(url) => {
                tracing::debug!(%url, identifier, "uploaded image");
                Some(url)
            }
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), identifier, "image upload failed");
                None
            }
        }
    }
}

/// Decode any supported image, force 8-bit RGB and re-encode as JPEG.
pub fn normalize_to_jpeg(path: &Path) -> std::result::Result<Vec<u8>, StorageError> {
    let decoded = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|error| decode_error(path, error))?
        .decode()
        .map_err(|error| decode_error(path, error))?;

    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut encoded = Cursor::new(Vec::new());
    rgb.write_to(&mut encoded, image::ImageFormat::Jpeg)
        .map_err(|error| StorageError::Encode(error.to_string()))?;
    Ok(encoded.into_inner())
}

fn decode_error(path: &Path, error: impl std::fmt::Display) -> StorageError {
    StorageError::Decode {
        path: PathBuf::from(path).display().to_string(),
        reason: error.to_string(),
    }
}

/// Keep object keys URL-safe.
fn sanitize_identifier(identifier: &str) -> String {
    let cleaned: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "media".into()
    } else {
        cleaned
    }
}

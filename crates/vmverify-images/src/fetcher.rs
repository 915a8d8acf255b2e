//! Image acquisition and encoding
//!
//! Fetches object bytes through the shared store client, sniffs the format,
//! decodes dimensions, and base64-encodes the payload. Formats other than
//! JPEG and PNG fail the model-consumption pre-check here, before any model
//! call is attempted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use image::ImageReader;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;
use vmverify_store::client::ObjectStoreClient;
use vmverify_utils::retry::with_backoff;
use vmverify_types::{ImageFormat, ImageInfo, Reference, StorageMethod};
use vmverify_utils::VerifyError;

use crate::url::parse_s3_url;

/// One fetched, decoded, and encoded image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub url: String,
    pub source_bucket: String,
    pub source_key: String,
    pub size: u64,
    pub format: ImageFormat,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Base64 rendering of the raw bytes.
    pub base64: String,
}

impl FetchedImage {
    /// Assemble the persisted [`ImageInfo`] once the base64 artifact has been
    /// written to the state store.
    #[must_use]
    pub fn into_image_info(self, base64_reference: &Reference, at: DateTime<Utc>) -> ImageInfo {
        ImageInfo {
            url: self.url,
            source_bucket: self.source_bucket,
            source_key: self.source_key,
            size: self.size,
            format: self.format,
            content_type: self.content_type,
            width: self.width,
            height: self.height,
            etag: self.etag,
            last_modified: self.last_modified,
            base64_size: self.base64.len() as u64,
            base64_bucket: base64_reference.bucket.clone(),
            base64_key: base64_reference.key.clone(),
            storage_method: StorageMethod::S3Temporary,
            base64_generated: true,
            storage_decision_at: at,
        }
    }
}

/// Fetches and encodes images through the shared object-store client.
pub struct ImageFetcher {
    client: Arc<dyn ObjectStoreClient>,
    max_attempts: u32,
}

impl ImageFetcher {
    #[must_use]
    pub fn new(client: Arc<dyn ObjectStoreClient>, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fetch an image by URL and prepare it for model consumption.
    ///
    /// # Errors
    ///
    /// - `VALIDATION_ERROR` for unrecognized URLs or non-JPEG/PNG formats
    /// - `NOT_FOUND` when the object does not exist
    /// - retryable store errors after exhausting the retry budget
    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, VerifyError> {
        let parsed = parse_s3_url(url)?;
        let (bytes, meta) = with_backoff("image_fetch.get", self.max_attempts, || {
            self.client.get(&parsed.bucket, &parsed.key)
        })
        .await?;

        let format = sniff_format(&bytes);
        let mime = format.model_mime_type().map_err(|err| {
            err.with_context("url", url)
                .with_context("detectedFormat", format.to_string())
        })?;

        let (width, height) = decode_dimensions(&bytes)
            .map_err(|err| err.with_context("url", url))?;

        debug!(
            url = %url,
            format = %format,
            width,
            height,
            size = bytes.len() as u64,
            "fetched image"
        );

        Ok(FetchedImage {
            url: url.to_string(),
            source_bucket: parsed.bucket,
            source_key: parsed.key,
            size: bytes.len() as u64,
            format,
            content_type: mime.to_string(),
            width,
            height,
            etag: meta.etag,
            last_modified: meta.last_modified,
            base64: BASE64.encode(&bytes),
        })
    }
}

/// Map the sniffed container format into the pipeline's closed set.
fn sniff_format(bytes: &[u8]) -> ImageFormat {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => ImageFormat::Jpeg,
        Ok(image::ImageFormat::Png) => ImageFormat::Png,
        Ok(image::ImageFormat::WebP) => ImageFormat::Webp,
        Ok(image::ImageFormat::Gif) => ImageFormat::Gif,
        _ => ImageFormat::Unknown,
    }
}

fn decode_dimensions(bytes: &[u8]) -> Result<(u32, u32), VerifyError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| VerifyError::validation(format!("cannot sniff image container: {err}")))?
        .into_dimensions()
        .map_err(|err| VerifyError::validation(format!("cannot decode image dimensions: {err}")))
}

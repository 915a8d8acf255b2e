//! Image metadata records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use vmverify_utils::VerifyError;

/// Detected image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
    Unknown,
}

impl ImageFormat {
    /// MIME type for the model request. Only JPEG and PNG are admitted.
    pub fn model_mime_type(self) -> Result<&'static str, VerifyError> {
        match self {
            Self::Jpeg => Ok("image/jpeg"),
            Self::Png => Ok("image/png"),
            other => Err(VerifyError::validation(format!(
                "image format '{other}' is not supported for model input; only jpeg and png are accepted"
            ))),
        }
    }

    /// Whether this format can be sent to the model.
    #[must_use]
    pub const fn is_model_compatible(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }
}

/// How base64 payloads are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMethod {
    /// Base64 bytes live in the state store under a short-TTL key.
    #[serde(rename = "S3_TEMPORARY")]
    S3Temporary,
}

/// Everything recorded about one fetched image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    /// Original object URL from the trigger payload.
    pub url: String,
    pub source_bucket: String,
    pub source_key: String,
    /// Raw object size in bytes.
    pub size: u64,
    pub format: ImageFormat,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Size of the base64 artifact.
    pub base64_size: u64,
    /// Where the base64 artifact was written.
    pub base64_bucket: String,
    pub base64_key: String,
    pub storage_method: StorageMethod,
    pub base64_generated: bool,
    pub storage_decision_at: DateTime<Utc>,
}

/// Combined metadata for both images of a verification, persisted to
/// `images/metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub verification_id: String,
    pub reference_image: ImageInfo,
    pub checking_image: ImageInfo,
    pub fetched_at: DateTime<Utc>,
}

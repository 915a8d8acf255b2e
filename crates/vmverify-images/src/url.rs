//! Object-store URL parsing
//!
//! Accepted forms:
//! - `s3://{bucket}/{key}`
//! - `https://{bucket}.s3.{region}.{host}/{key}` (virtual-hosted)
//! - `https://s3.{region}.{host}/{bucket}/{key}` (path-style)
//!
//! Anything else (empty URL, other schemes, hosts that are neither form) is
//! rejected with `VALIDATION_ERROR`.

use vmverify_utils::VerifyError;

/// Parsed bucket/key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Url {
    pub bucket: String,
    pub key: String,
}

/// Parse an object URL into bucket and key.
pub fn parse_s3_url(url: &str) -> Result<S3Url, VerifyError> {
    if url.is_empty() {
        return Err(VerifyError::validation("object URL must not be empty"));
    }

    if let Some(rest) = url.strip_prefix("s3://") {
        let (bucket, key) = rest.split_once('/').ok_or_else(|| invalid(url, "missing key"))?;
        return build(url, bucket, key);
    }

    if let Some(rest) = url.strip_prefix("https://") {
        let (host, path) = rest.split_once('/').ok_or_else(|| invalid(url, "missing path"))?;

        if let Some(bucket) = host.strip_suffix_s3_host() {
            // Virtual-hosted: bucket.s3.region.host/key
            return build(url, bucket, path);
        }
        if host.starts_with("s3.") {
            // Path-style: s3.region.host/bucket/key
            let (bucket, key) = path.split_once('/').ok_or_else(|| invalid(url, "missing key"))?;
            return build(url, bucket, key);
        }
        return Err(invalid(url, "host is neither virtual-hosted nor path-style"));
    }

    Err(invalid(url, "unsupported scheme"))
}

/// Render a bucket/key pair as a canonical `s3://` URL.
#[must_use]
pub fn render_s3_url(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

fn build(url: &str, bucket: &str, key: &str) -> Result<S3Url, VerifyError> {
    if bucket.is_empty() {
        return Err(invalid(url, "empty bucket"));
    }
    if key.is_empty() {
        return Err(invalid(url, "empty key"));
    }
    Ok(S3Url {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

fn invalid(url: &str, reason: &str) -> VerifyError {
    VerifyError::validation(format!("unrecognized object URL '{url}': {reason}"))
        .with_context("url", url)
}

trait HostExt {
    fn strip_suffix_s3_host(&self) -> Option<&str>;
}

impl HostExt for &str {
    /// For `bucket.s3.region.host` returns `bucket`; `None` when the host is
    /// not virtual-hosted.
    fn strip_suffix_s3_host(&self) -> Option<&str> {
        let idx = self.find(".s3.")?;
        if idx == 0 {
            return None;
        }
        Some(&self[..idx])
    }
}

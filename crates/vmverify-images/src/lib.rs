//! Object URL parsing and image acquisition
//!
//! Supports the three accepted object URL forms (scheme, virtual-hosted,
//! path-style), fetches image bytes through the shared object-store client,
//! sniffs the format, decodes dimensions, and produces the base64 payload
//! sent to the model.

pub mod fetcher;
pub mod url;

pub use fetcher::{FetchedImage, ImageFetcher};
pub use url::{S3Url, parse_s3_url, render_s3_url};

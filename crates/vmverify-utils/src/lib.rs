//! Shared infrastructure for the vmverify pipeline
//!
//! This crate provides the error taxonomy used across all stages, correlation
//! id generation and propagation, structured logging setup, and verification
//! id generation. It has no knowledge of the domain model; higher crates
//! build on these primitives.

pub mod error;
pub mod ids;
pub mod logging;
pub mod retry;

pub use error::{ErrorKind, Severity, VerifyError};
pub use ids::{is_valid_verification_id, new_verification_id};
pub use logging::CorrelationId;
pub use retry::with_backoff;

//! Durable state store for the verification pipeline
//!
//! Artifacts are JSON or binary objects in a single state bucket, keyed by
//! `{YYYY}/{MM}/{DD}/{verificationId}/{category}/{filename}` with a closed
//! category set. Every artifact is written exactly once; references into the
//! store are registered in the envelope under symbolic names. Puts and gets
//! retry transient failures with exponential backoff; a not-found get is
//! never retried.

pub mod category;
pub mod client;
pub mod keys;
pub mod memory;
pub mod store;

pub use category::{Category, standard_filename};
pub use client::{ObjectMeta, ObjectStoreClient, S3ObjectStoreClient};
pub use keys::{build_object_key, symbolic_reference_key};
pub use memory::InMemoryObjectStore;
pub use store::StateStore;

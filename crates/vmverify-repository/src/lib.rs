//! Key-value repository for the verification pipeline
//!
//! Rows live in three tables: verifications (partition `verificationId`,
//! sort `verificationAt`), conversations (partition `verificationId`, sort
//! `conversationAt`), and layouts (partition `layoutId`, sort
//! `layoutPrefix`). The verifications table carries secondary indexes on
//! outcome, type, image URLs, and layout id, each sorted by
//! `verificationAt`; the historical lookup uses `ReferenceImageIndex`.
//!
//! Rows cross the client boundary as JSON objects; the DynamoDB
//! implementation converts to and from attribute values at the edge so the
//! repository logic and its tests stay in plain serde terms.

pub mod client;
pub mod memory;
pub mod repository;
pub mod rows;

pub use client::{DynamoKeyValueClient, KeyValueClient};
pub use memory::InMemoryKeyValueStore;
pub use repository::{REFERENCE_IMAGE_INDEX, VerificationRepository};
pub use rows::{ConversationRow, VerificationRow};

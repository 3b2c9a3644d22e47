//! Error types for rubric-store

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A caller-fixable problem with a submitted evaluation.
///
/// `field` is a path into the submission (e.g. `ranked_order[2]` or
/// `response_scores[0].clarity`) so clients can point at the offending input.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    /// Path of the offending field within the submission
    pub field: String,
    /// Human-readable explanation
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by [`RecordLedger`](crate::RecordLedger) implementations
#[derive(Error, Debug)]
pub enum StorageError {
    /// The record failed structural validation and was not persisted
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A record with the same identity already exists
    #[error("record already exists: {record_id}")]
    Conflict { record_id: String },

    /// A record identifier is not a valid digest
    #[error("invalid record id: {record_id}")]
    InvalidRecordId { record_id: String },

    /// Stored payload could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

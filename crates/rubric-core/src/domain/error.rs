//! Domain-level error taxonomy for Rubric.

use rubric_store::{StorageError, ValidationError};

use crate::directory::DirectoryError;

/// Rubric domain errors.
///
/// "Not enough data" is never an error: it is reported as
/// [`MetricValue::Undefined`](crate::MetricValue) inside a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum RubricError {
    /// Malformed or out-of-range input. The caller must fix and resubmit.
    #[error("validation error: {0}")]
    Validation(ValidationError),

    /// A referenced prompt, response or model could not be resolved.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// An external dependency exceeded its time bound.
    #[error("{dependency} timed out after {timeout_ms}ms")]
    DependencyTimeout { dependency: String, timeout_ms: u64 },

    #[error("storage error: {0}")]
    Storage(StorageError),

    /// An export failed after writing some records. `checkpoint` resumes
    /// right after the last complete record, if one was written.
    #[error("export interrupted after {records_written} records: {source}")]
    ExportInterrupted {
        records_written: u64,
        checkpoint: Option<String>,
        #[source]
        source: Box<RubricError>,
    },

    #[error("directory error: {0}")]
    Directory(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RubricError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        RubricError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// The validation failure, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            RubricError::Validation(v) => Some(v),
            _ => None,
        }
    }
}

impl From<ValidationError> for RubricError {
    fn from(err: ValidationError) -> Self {
        RubricError::Validation(err)
    }
}

impl From<StorageError> for RubricError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(v) => RubricError::Validation(v),
            other => RubricError::Storage(other),
        }
    }
}

impl From<DirectoryError> for RubricError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound { kind, id } => RubricError::NotFound { kind, id },
            other => RubricError::Directory(other.to_string()),
        }
    }
}

/// Result type for Rubric domain operations.
pub type Result<T> = std::result::Result<T, RubricError>;

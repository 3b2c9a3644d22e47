//! Rubric-Store: append-only evaluation record persistence
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: record identity, structural validation, atomic appends and
//! ordered reads.
//!
//! ## Key Components
//!
//! - `EvaluationRecord`: one evaluator's immutable judgment of a prompt's responses
//! - `RecordLedger`: the storage contract (append, per-prompt reads,
//!   version counters, export paging)
//! - `MemoryRecordLedger`: in-process ledger
//! - `SurrealRecordLedger`: SurrealDB-backed ledger

pub mod connection;
mod error;
pub mod memory;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_ledger;
pub mod validation;

pub use connection::CloudConfig;
pub use error::{StateError, StorageError, ValidationError};
pub use memory::MemoryRecordLedger;
pub use storage_traits::{
    Criterion, EvaluationRecord, ExportCursor, NewEvaluation, RecordFilter, RecordId,
    RecordLedger, ResponseScore, StorageResult, SCORE_MAX, SCORE_MIN,
};
pub use surreal_ledger::SurrealRecordLedger;
pub use validation::{validate_record, validate_submission};

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;

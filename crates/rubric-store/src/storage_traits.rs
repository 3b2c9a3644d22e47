//! Storage trait and record types for Rubric
//!
//! - `EvaluationRecord`: one evaluator's immutable judgment of the responses
//!   to one prompt
//! - `RecordId`: content-derived identity of a record
//! - `RecordLedger`: append-only persistence (append, per-prompt reads,
//!   version counters, ordered paging for export)
//!
//! The trait is async and backend-agnostic. `MemoryRecordLedger` and
//! `SurrealRecordLedger` implement it.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Lowest value on the rating scale.
pub const SCORE_MIN: u8 = 1;
/// Highest value on the rating scale.
pub const SCORE_MAX: u8 = 5;

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// Record identity (SHA-256 hex of `(prompt_id, evaluator_id, submitted_at)`).
///
/// The same identity triple always yields the same id, so a duplicate
/// submission is detected as a conflict rather than stored twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Derive the id for an identity triple.
    pub fn derive(prompt_id: &str, evaluator_id: &str, submitted_at: &DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            prompt_id,
            evaluator_id,
            &submitted_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        RecordId(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for RecordId {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidRecordId { record_id: s });
        }
        Ok(RecordId(s.to_ascii_lowercase()))
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The four rated quality criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Correctness,
    Clarity,
    Relevance,
    HallucinationRisk,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Correctness,
        Criterion::Clarity,
        Criterion::Relevance,
        Criterion::HallucinationRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Correctness => "correctness",
            Criterion::Clarity => "clarity",
            Criterion::Relevance => "relevance",
            Criterion::HallucinationRisk => "hallucination_risk",
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluator's scores for one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseScore {
    pub response_id: String,
    pub correctness: u8,
    pub clarity: u8,
    pub relevance: u8,
    pub hallucination_risk: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ResponseScore {
    /// Scores with no comment attached.
    pub fn new(
        response_id: impl Into<String>,
        correctness: u8,
        clarity: u8,
        relevance: u8,
        hallucination_risk: u8,
    ) -> Self {
        Self {
            response_id: response_id.into(),
            correctness,
            clarity,
            relevance,
            hallucination_risk,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn score(&self, criterion: Criterion) -> u8 {
        match criterion {
            Criterion::Correctness => self.correctness,
            Criterion::Clarity => self.clarity,
            Criterion::Relevance => self.relevance,
            Criterion::HallucinationRisk => self.hallucination_risk,
        }
    }
}

/// An evaluation as submitted by a client, before it is stamped with a
/// submission time and identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvaluation {
    pub prompt_id: String,
    pub evaluator_id: String,
    pub response_scores: Vec<ResponseScore>,
    pub ranked_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A persisted, immutable evaluation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub record_id: RecordId,
    pub prompt_id: String,
    pub evaluator_id: String,
    pub response_scores: Vec<ResponseScore>,
    pub ranked_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Stamp a submission with its creation time, deriving the record id.
    pub fn stamp(submission: NewEvaluation, submitted_at: DateTime<Utc>) -> Self {
        let record_id =
            RecordId::derive(&submission.prompt_id, &submission.evaluator_id, &submitted_at);
        Self {
            record_id,
            prompt_id: submission.prompt_id,
            evaluator_id: submission.evaluator_id,
            response_scores: submission.response_scores,
            ranked_order: submission.ranked_order,
            rationale: submission.rationale,
            submitted_at,
        }
    }

    /// Position of this record in the global export order.
    pub fn cursor(&self) -> ExportCursor {
        ExportCursor {
            submitted_at: self.submitted_at,
            record_id: self.record_id.clone(),
        }
    }

    /// Iterate over the response ids scored by this record.
    pub fn response_ids(&self) -> impl Iterator<Item = &str> {
        self.response_scores.iter().map(|s| s.response_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Position in the `(submitted_at, record_id)` ordering of all records.
///
/// Ties on `submitted_at` are broken by `record_id`, so resuming after a
/// cursor never skips or repeats a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExportCursor {
    pub submitted_at: DateTime<Utc>,
    pub record_id: RecordId,
}

/// Selection applied by [`RecordLedger::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Restrict to these prompts (`None` = all prompts)
    pub prompt_ids: Option<BTreeSet<String>>,
    /// Inclusive lower bound on `submitted_at`
    pub submitted_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `submitted_at`
    pub submitted_to: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn matches(&self, record: &EvaluationRecord) -> bool {
        if let Some(prompts) = &self.prompt_ids {
            if !prompts.contains(&record.prompt_id) {
                return false;
            }
        }
        if let Some(from) = self.submitted_from {
            if record.submitted_at < from {
                return false;
            }
        }
        if let Some(to) = self.submitted_to {
            if record.submitted_at > to {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// RecordLedger
// ---------------------------------------------------------------------------

/// Append-only evaluation record ledger.
///
/// Guarantees:
/// - `append` validates the record and persists it atomically, or persists
///   nothing.
/// - Records are never updated or deleted.
/// - `prompt_version` increases by one with every record appended for that
///   prompt.
/// - Reads return records ordered by `(submitted_at, record_id)`.
#[async_trait]
pub trait RecordLedger: Send + Sync {
    /// Validate and persist a record. Fails with `Conflict` if the identity
    /// is already present.
    async fn append(&self, record: EvaluationRecord) -> StorageResult<RecordId>;

    /// All records for a prompt.
    async fn records_for_prompt(&self, prompt_id: &str) -> StorageResult<Vec<EvaluationRecord>>;

    /// Number of records ever appended for a prompt.
    async fn prompt_version(&self, prompt_id: &str) -> StorageResult<u64>;

    /// One page of matching records strictly after `after`.
    async fn scan(
        &self,
        filter: &RecordFilter,
        after: Option<&ExportCursor>,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn record_id_is_deterministic() {
        let a = RecordId::derive("p1", "e1", &ts(100));
        let b = RecordId::derive("p1", "e1", &ts(100));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn record_id_separates_fields() {
        // Concatenation alone would make these collide.
        let a = RecordId::derive("p1e", "1", &ts(100));
        let b = RecordId::derive("p1", "e1", &ts(100));
        assert_ne!(a, b);
    }

    #[test]
    fn record_id_distinguishes_submission_time() {
        let a = RecordId::derive("p1", "e1", &ts(100));
        let b = RecordId::derive("p1", "e1", &ts(101));
        assert_ne!(a, b);
    }

    #[test]
    fn record_id_rejects_non_hex() {
        let err = RecordId::try_from("not-a-digest".to_string()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecordId { .. }));
    }

    #[test]
    fn cursor_orders_by_time_then_id() {
        let early = ExportCursor {
            submitted_at: ts(1),
            record_id: RecordId::derive("p", "z", &ts(1)),
        };
        let late = ExportCursor {
            submitted_at: ts(2),
            record_id: RecordId::derive("p", "a", &ts(2)),
        };
        assert!(early < late);
    }

    #[test]
    fn filter_bounds_are_inclusive() {
        let record = EvaluationRecord::stamp(
            NewEvaluation {
                prompt_id: "p1".into(),
                evaluator_id: "e1".into(),
                response_scores: vec![ResponseScore::new("r1", 3, 3, 3, 3)],
                ranked_order: vec!["r1".into()],
                rationale: None,
            },
            ts(50),
        );
        let filter = RecordFilter {
            prompt_ids: None,
            submitted_from: Some(ts(50)),
            submitted_to: Some(ts(50)),
        };
        assert!(filter.matches(&record));

        let other_prompt = RecordFilter {
            prompt_ids: Some(["p2".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert!(!other_prompt.matches(&record));
    }
}

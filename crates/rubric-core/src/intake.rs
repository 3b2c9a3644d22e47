//! Score Record Store: ingestion and record queries.
//!
//! Wraps a [`RecordLedger`] (persistence) and a [`ResponseDirectory`]
//! (prompt/response identity). Structural checks happen in the ledger;
//! this layer adds the checks that need the directory: the prompt exists
//! and every scored response belongs to it.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rubric_store::{
    validate_submission, EvaluationRecord, NewEvaluation, RecordId, RecordLedger, ValidationError,
};

use crate::directory::{DirectoryError, ResponseDirectory};
use crate::domain::{Result, RubricError};
use crate::metrics::METRICS;
use crate::obs;

/// Prompts and responses covered by one model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelFootprint {
    pub prompt_ids: BTreeSet<String>,
    pub response_ids: HashSet<String>,
}

impl ModelFootprint {
    /// Whether `record` scores at least one of the model's responses.
    pub fn touches(&self, record: &EvaluationRecord) -> bool {
        record.response_ids().any(|id| self.response_ids.contains(id))
    }
}

/// Ingestion and query front for evaluation records.
pub struct ScoreRecordStore<L: ?Sized, D: ?Sized> {
    ledger: Arc<L>,
    directory: Arc<D>,
}

impl<L: ?Sized, D: ?Sized> Clone for ScoreRecordStore<L, D> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<L: RecordLedger + ?Sized, D: ResponseDirectory + ?Sized> ScoreRecordStore<L, D> {
    pub fn new(ledger: Arc<L>, directory: Arc<D>) -> Self {
        Self { ledger, directory }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Record an evaluation submitted now.
    pub async fn submit(&self, submission: NewEvaluation) -> Result<RecordId> {
        self.submit_at(submission, Utc::now()).await
    }

    /// Record an evaluation with an explicit submission time (imports and
    /// backfills).
    ///
    /// On any validation failure nothing is persisted and the error names
    /// the offending field.
    pub async fn submit_at(
        &self,
        submission: NewEvaluation,
        submitted_at: DateTime<Utc>,
    ) -> Result<RecordId> {
        let prompt_id = submission.prompt_id.clone();

        if let Err(e) = validate_submission(&submission) {
            return Err(reject(&prompt_id, e));
        }
        if let Err(e) = self.check_membership(&submission).await {
            return match e {
                RubricError::Validation(v) => Err(reject(&prompt_id, v)),
                other => Err(other),
            };
        }

        let record = EvaluationRecord::stamp(submission, submitted_at);
        let evaluator_id = record.evaluator_id.clone();
        let record_id = match self.ledger.append(record).await {
            Ok(id) => id,
            Err(rubric_store::StorageError::Validation(v)) => return Err(reject(&prompt_id, v)),
            Err(e) => return Err(e.into()),
        };

        METRICS.inc_records_submitted();
        let version = self.ledger.prompt_version(&prompt_id).await?;
        obs::emit_record_submitted(&prompt_id, &evaluator_id, record_id.as_str(), version);
        Ok(record_id)
    }

    /// The prompt must exist and every scored response must belong to it.
    async fn check_membership(&self, submission: &NewEvaluation) -> Result<()> {
        match self.directory.prompt(&submission.prompt_id).await {
            Ok(_) => {}
            Err(DirectoryError::NotFound { .. }) => {
                return Err(ValidationError::new("prompt_id", "unknown prompt").into());
            }
            Err(e) => return Err(e.into()),
        }

        for (i, score) in submission.response_scores.iter().enumerate() {
            let field = format!("response_scores[{i}].response_id");
            let info = match self.directory.response(&score.response_id).await {
                Ok(info) => info,
                Err(DirectoryError::NotFound { .. }) => {
                    return Err(ValidationError::new(field, "unknown response").into());
                }
                Err(e) => return Err(e.into()),
            };
            if info.prompt_id != submission.prompt_id {
                return Err(ValidationError::new(
                    field,
                    format!(
                        "response {} belongs to prompt {}, not {}",
                        score.response_id, info.prompt_id, submission.prompt_id
                    ),
                )
                .into());
            }
        }
        Ok(())
    }

    /// All records for a prompt, oldest first. `NotFound` if the directory
    /// does not know the prompt.
    pub async fn query_by_prompt(&self, prompt_id: &str) -> Result<Vec<EvaluationRecord>> {
        self.directory.prompt(prompt_id).await?;
        Ok(self.ledger.records_for_prompt(prompt_id).await?)
    }

    /// All records that score at least one of the model's responses,
    /// ordered by `(submitted_at, record_id)`.
    pub async fn query_by_model(&self, model_name: &str) -> Result<Vec<EvaluationRecord>> {
        let footprint = self.model_footprint(model_name).await?;
        let mut records = self.records_for_prompts(&footprint.prompt_ids).await?;
        records.retain(|r| footprint.touches(r));
        Ok(records)
    }

    /// Resolve a model to its responses and their prompts.
    pub async fn model_footprint(&self, model_name: &str) -> Result<ModelFootprint> {
        let responses = self.directory.model_responses(model_name).await?;
        let mut footprint = ModelFootprint::default();
        for info in responses {
            footprint.prompt_ids.insert(info.prompt_id);
            footprint.response_ids.insert(info.response_id);
        }
        Ok(footprint)
    }

    /// Records of several prompts merged into one `(submitted_at, record_id)`
    /// ordered sequence.
    pub(crate) async fn records_for_prompts(
        &self,
        prompt_ids: &BTreeSet<String>,
    ) -> Result<Vec<EvaluationRecord>> {
        let reads = prompt_ids
            .iter()
            .map(|id| self.ledger.records_for_prompt(id));
        let mut records: Vec<EvaluationRecord> =
            try_join_all(reads).await?.into_iter().flatten().collect();
        records.sort_by(|a, b| {
            (a.submitted_at, &a.record_id).cmp(&(b.submitted_at, &b.record_id))
        });
        Ok(records)
    }
}

fn reject(prompt_id: &str, err: ValidationError) -> RubricError {
    METRICS.inc_submissions_rejected();
    obs::emit_submission_rejected(prompt_id, &err.field, &err.reason);
    RubricError::Validation(err)
}

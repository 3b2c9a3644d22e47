//! Row types for the Rubric SurrealDB tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::EvaluationRecord;

/// Serialize chrono DateTime as a SurrealDB datetime so range queries and
/// ordering compare timestamps rather than strings.
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// One row of the `evaluations` table.
///
/// Indexed columns are stored alongside the full record body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub record_id: String,
    pub prompt_id: String,
    pub evaluator_id: String,
    #[serde(with = "surreal_datetime")]
    pub submitted_at: DateTime<Utc>,
    pub response_ids: Vec<String>,
    pub body: serde_json::Value,
}

impl EvaluationRow {
    pub fn from_record(record: &EvaluationRecord) -> Result<Self, StorageError> {
        Ok(Self {
            record_id: record.record_id.to_string(),
            prompt_id: record.prompt_id.clone(),
            evaluator_id: record.evaluator_id.clone(),
            submitted_at: record.submitted_at,
            response_ids: record.response_ids().map(str::to_string).collect(),
            body: serde_json::to_value(record)?,
        })
    }

    pub fn into_record(self) -> Result<EvaluationRecord, StorageError> {
        let record: EvaluationRecord = serde_json::from_value(self.body)?;
        if record.record_id.as_str() != self.record_id {
            return Err(StorageError::Backend(format!(
                "row {} holds body for record {}",
                self.record_id, record.record_id
            )));
        }
        Ok(record)
    }
}

/// Result row of a `count()` aggregate.
#[derive(Debug, Clone, Deserialize)]
pub struct CountRow {
    pub total: u64,
}

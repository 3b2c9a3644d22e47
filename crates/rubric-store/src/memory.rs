//! In-memory record ledger
//!
//! `MemoryRecordLedger` satisfies the [`RecordLedger`] contract without any
//! external dependencies. Used by tests and by embedders that keep records
//! in process.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;
use crate::validation::validate_record;

#[derive(Debug, Default)]
struct LedgerState {
    /// Every record in export order
    ordered: BTreeMap<ExportCursor, EvaluationRecord>,
    /// Per-prompt cursors into `ordered`, in append order
    by_prompt: HashMap<String, Vec<ExportCursor>>,
    /// Identity index for conflict detection
    ids: HashMap<RecordId, ExportCursor>,
}

/// In-memory ledger backed by an ordered map keyed by export cursor.
///
/// Each append is a single write-locked insert, so readers see a record
/// either completely or not at all.
#[derive(Debug, Default)]
pub struct MemoryRecordLedger {
    state: RwLock<LedgerState>,
}

impl MemoryRecordLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records held.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.ordered.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordLedger for MemoryRecordLedger {
    async fn append(&self, record: EvaluationRecord) -> StorageResult<RecordId> {
        validate_record(&record)?;

        let cursor = record.cursor();
        let record_id = record.record_id.clone();

        let mut state = self.write()?;
        if state.ids.contains_key(&record_id) {
            return Err(StorageError::Conflict {
                record_id: record_id.to_string(),
            });
        }
        state
            .by_prompt
            .entry(record.prompt_id.clone())
            .or_default()
            .push(cursor.clone());
        state.ids.insert(record_id.clone(), cursor.clone());
        state.ordered.insert(cursor, record);

        debug!(record_id = %record_id.short(), "record appended");
        Ok(record_id)
    }

    async fn records_for_prompt(&self, prompt_id: &str) -> StorageResult<Vec<EvaluationRecord>> {
        let state = self.read()?;
        let mut records: Vec<EvaluationRecord> = state
            .by_prompt
            .get(prompt_id)
            .map(|cursors| {
                cursors
                    .iter()
                    .filter_map(|c| state.ordered.get(c).cloned())
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.cursor().cmp(&b.cursor()));
        Ok(records)
    }

    async fn prompt_version(&self, prompt_id: &str) -> StorageResult<u64> {
        let state = self.read()?;
        Ok(state
            .by_prompt
            .get(prompt_id)
            .map(|c| c.len() as u64)
            .unwrap_or(0))
    }

    async fn scan(
        &self,
        filter: &RecordFilter,
        after: Option<&ExportCursor>,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationRecord>> {
        use std::ops::Bound;

        let state = self.read()?;
        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.clone()),
            None => Bound::Unbounded,
        };
        Ok(state
            .ordered
            .range((lower, Bound::Unbounded))
            .map(|(_, record)| record)
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(prompt: &str, evaluator: &str, secs: i64) -> EvaluationRecord {
        EvaluationRecord::stamp(
            NewEvaluation {
                prompt_id: prompt.to_string(),
                evaluator_id: evaluator.to_string(),
                response_scores: vec![ResponseScore::new("r1", 4, 4, 4, 2)],
                ranked_order: vec!["r1".to_string()],
                rationale: None,
            },
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn len_tracks_appends() {
        let ledger = MemoryRecordLedger::new();
        assert!(ledger.is_empty());
        ledger.append(record("p1", "e1", 1)).await.unwrap();
        ledger.append(record("p2", "e1", 2)).await.unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn invalid_record_is_not_stored() {
        let ledger = MemoryRecordLedger::new();
        let mut bad = record("p1", "e1", 1);
        bad.response_scores[0].correctness = 9;
        let err = ledger.append(bad).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
        assert!(ledger.is_empty());
        assert_eq!(ledger.prompt_version("p1").await.unwrap(), 0);
    }
}

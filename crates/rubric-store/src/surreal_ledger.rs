//! SurrealDB-backed RecordLedger implementation
//!
//! Uses `schema::EvaluationRow` for persistence, converting to and from
//! `EvaluationRecord` at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::connection;
use crate::error::StorageError;
use crate::schema::{CountRow, EvaluationRow};
use crate::storage_traits::{
    EvaluationRecord, ExportCursor, RecordFilter, RecordId, RecordLedger, StorageResult,
};
use crate::validation::validate_record;

/// SurrealDB-backed implementation of [`RecordLedger`].
#[derive(Clone)]
pub struct SurrealRecordLedger {
    db: Surreal<Any>,
}

impl SurrealRecordLedger {
    /// Wrap an already-connected database. The schema must be initialized.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = connection::connect_in_memory().await?;
        info!("SurrealRecordLedger connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables (see [`connection::connect_from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        let db = connection::connect_from_env().await?;
        Ok(Self { db })
    }

    async fn exists(&self, record_id: &RecordId) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("SELECT count() AS total FROM evaluations WHERE record_id = $rid GROUP ALL")
            .bind(("rid", record_id.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<CountRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }

    fn rows_to_records(rows: Vec<EvaluationRow>) -> StorageResult<Vec<EvaluationRecord>> {
        rows.into_iter().map(EvaluationRow::into_record).collect()
    }
}

#[async_trait]
impl RecordLedger for SurrealRecordLedger {
    async fn append(&self, record: EvaluationRecord) -> StorageResult<RecordId> {
        validate_record(&record)?;

        let record_id = record.record_id.clone();
        if self.exists(&record_id).await? {
            return Err(StorageError::Conflict {
                record_id: record_id.to_string(),
            });
        }

        let row = EvaluationRow::from_record(&record)?;
        debug!(record_id = %record_id.short(), prompt_id = %record.prompt_id, "appending record");

        // A racing append of the same identity trips the unique index.
        let created: Result<Option<EvaluationRow>, surrealdb::Error> =
            self.db.create("evaluations").content(row).await;
        match created {
            Ok(_) => Ok(record_id),
            Err(e) if e.to_string().contains("already contains") => Err(StorageError::Conflict {
                record_id: record_id.to_string(),
            }),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn records_for_prompt(&self, prompt_id: &str) -> StorageResult<Vec<EvaluationRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM evaluations WHERE prompt_id = $pid \
                 ORDER BY submitted_at ASC, record_id ASC",
            )
            .bind(("pid", prompt_id.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<EvaluationRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::rows_to_records(rows)
    }

    async fn prompt_version(&self, prompt_id: &str) -> StorageResult<u64> {
        let mut res = self
            .db
            .query("SELECT count() AS total FROM evaluations WHERE prompt_id = $pid GROUP ALL")
            .bind(("pid", prompt_id.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<CountRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn scan(
        &self,
        filter: &RecordFilter,
        after: Option<&ExportCursor>,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conditions: Vec<&str> = Vec::new();
        if filter.prompt_ids.is_some() {
            conditions.push("prompt_id IN $prompts");
        }
        // `$from` would read as the FROM keyword and silently drop rows at
        // the lower bound.
        if filter.submitted_from.is_some() {
            conditions.push("submitted_at >= <datetime> $submitted_from");
        }
        if filter.submitted_to.is_some() {
            conditions.push("submitted_at <= <datetime> $submitted_to");
        }
        if after.is_some() {
            conditions.push(
                "(submitted_at > $after_ts OR (submitted_at = $after_ts AND record_id > $after_id))",
            );
        }

        let mut sql = String::from("SELECT * FROM evaluations");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY submitted_at ASC, record_id ASC LIMIT {limit}"
        ));

        let mut query = self.db.query(sql);
        if let Some(prompts) = &filter.prompt_ids {
            let prompts: Vec<String> = prompts.iter().cloned().collect();
            query = query.bind(("prompts", prompts));
        }
        if let Some(from) = filter.submitted_from {
            query = query.bind(("submitted_from", SurrealDatetime::from(from)));
        }
        if let Some(to) = filter.submitted_to {
            query = query.bind(("submitted_to", SurrealDatetime::from(to)));
        }
        if let Some(cursor) = after {
            query = query
                .bind(("after_ts", SurrealDatetime::from(cursor.submitted_at)))
                .bind(("after_id", cursor.record_id.to_string()));
        }

        let mut res = query
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<EvaluationRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::rows_to_records(rows)
    }
}

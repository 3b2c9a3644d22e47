//! SurrealDB schema migrations and initialization

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Rubric tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Rubric SurrealDB schema");
    init_evaluations_table(db).await?;
    info!("Rubric schema initialization complete");
    Ok(())
}

/// Initialize the `evaluations` table
///
/// Schema:
/// ```text
/// TABLE evaluations {
///   record_id:     STRING (unique)
///   prompt_id:     STRING (indexed)
///   evaluator_id:  STRING
///   submitted_at:  DATETIME (indexed)
///   response_ids:  ARRAY<STRING>
///   body:          OBJECT (full record)
/// }
/// ```
///
/// Records are append-only: updates and deletes are not permitted.
async fn init_evaluations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing evaluations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS evaluations
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        -- Identity: one row per (prompt_id, evaluator_id, submitted_at)
        DEFINE INDEX IF NOT EXISTS idx_record_id ON TABLE evaluations COLUMNS record_id UNIQUE;

        -- Per-prompt reads and version counts
        DEFINE INDEX IF NOT EXISTS idx_prompt_id ON TABLE evaluations COLUMNS prompt_id;

        -- Export ordering
        DEFINE INDEX IF NOT EXISTS idx_submitted_at ON TABLE evaluations COLUMNS submitted_at, record_id;
    "#;

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StateError::SchemaSetup(format!("evaluations: {e}")))?;
    debug!("evaluations table initialized");
    Ok(())
}

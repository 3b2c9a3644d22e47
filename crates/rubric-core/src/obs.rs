//! Structured observability hooks for ingestion and aggregation.
//!
//! Every event carries an `event` field (`record.submitted`,
//! `snapshot.computed`, ...) so log pipelines can route on it. Use
//! `--json` on the CLI for newline-delimited JSON output.

use tracing::{info, warn};

use crate::domain::{AggregationPolicy, MetricSnapshot, ScopeKey};

/// Span covering one snapshot computation. Attach it to a future with
/// `tracing::Instrument::instrument`.
pub fn scope_span(scope: &ScopeKey, policy: AggregationPolicy) -> tracing::Span {
    tracing::info_span!("rubric.snapshot", scope = %scope, policy = %policy)
}

pub fn emit_record_submitted(prompt_id: &str, evaluator_id: &str, record_id: &str, version: u64) {
    info!(
        event = "record.submitted",
        prompt_id = %prompt_id,
        evaluator_id = %evaluator_id,
        record_id = %record_id,
        version = version,
    );
}

/// Emit event: a submission failed validation (warning level).
pub fn emit_submission_rejected(prompt_id: &str, field: &str, reason: &str) {
    warn!(
        event = "record.rejected",
        prompt_id = %prompt_id,
        field = %field,
        reason = %reason,
    );
}

pub fn emit_snapshot_computed(snapshot: &MetricSnapshot, duration_ms: u64) {
    info!(
        event = "snapshot.computed",
        scope = %snapshot.scope,
        policy = %snapshot.policy,
        sample_size = snapshot.metrics.sample_size,
        degraded = snapshot.degraded,
        duration_ms = duration_ms,
    );
}

pub fn emit_cache_hit(scope: &ScopeKey, age_ms: u64) {
    info!(event = "snapshot.cache_hit", scope = %scope, age_ms = age_ms);
}

/// Emit event: metadata join failed and dependent fields were omitted.
pub fn emit_metadata_degraded(scope: &ScopeKey, error: &dyn std::fmt::Display) {
    warn!(event = "snapshot.degraded", scope = %scope, error = %error);
}

pub fn emit_export_finished(records_written: u64, checkpoint: Option<&str>) {
    info!(
        event = "export.finished",
        records_written = records_written,
        checkpoint = checkpoint.unwrap_or("-"),
    );
}

/// An export stopped early. `checkpoint` resumes after the last record
/// that reached the output.
pub fn emit_export_interrupted(
    records_written: u64,
    checkpoint: Option<&str>,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "export.interrupted",
        records_written = records_written,
        checkpoint = checkpoint.unwrap_or("-"),
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_span_can_be_entered() {
        let span = scope_span(&ScopeKey::prompt("p1"), AggregationPolicy::AllRecords);
        let _guard = span.enter();
    }
}

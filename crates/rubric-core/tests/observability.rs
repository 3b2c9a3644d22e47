//! Observability tests for ingestion and aggregation tracing.
//!
//! `#[traced_test]` installs a capturing subscriber, so these exercise the
//! emit paths (field formatting, span entry) under a live subscriber.

use std::sync::Arc;

use rubric_core::{
    emit_cache_hit, emit_export_finished, emit_export_interrupted, emit_metadata_degraded,
    emit_record_submitted, emit_snapshot_computed, emit_submission_rejected, scope_span,
    AggregationPolicy, AggregatorConfig, MemoryResponseDirectory, MetricAggregator,
    MetricSnapshot, NewEvaluation, ResponseScore, ScopeKey, ScoreRecordStore, SnapshotMetrics,
    METRICS,
};
use rubric_store::MemoryRecordLedger;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_record_submitted() {
    emit_record_submitted("p1", "e1", "9f2c0a", 3);
}

#[traced_test]
#[test]
fn test_emit_submission_rejected_logs_warning() {
    emit_submission_rejected("p1", "ranked_order[1]", "response r9 is not in response_scores");
}

#[traced_test]
#[test]
fn test_emit_snapshot_computed() {
    let snapshot = MetricSnapshot {
        scope: ScopeKey::model("model-a"),
        policy: AggregationPolicy::LatestPerEvaluator,
        as_of: None,
        metrics: SnapshotMetrics::empty(),
        computed_at: chrono::Utc::now(),
        degraded: false,
    };
    emit_snapshot_computed(&snapshot, 12);
}

#[traced_test]
#[test]
fn test_emit_cache_hit_and_degraded() {
    let scope = ScopeKey::prompt("p1");
    emit_cache_hit(&scope, 250);
    emit_metadata_degraded(&scope, &"response metadata timed out after 500ms");
}

#[traced_test]
#[test]
fn test_emit_export_finished() {
    emit_export_finished(0, None);
    emit_export_finished(42, Some("2024-01-01T00:00:00Z,abc"));
    emit_export_interrupted(7, Some("2024-01-01T00:00:00Z,abc"), &"connection reset");
}

#[traced_test]
#[test]
fn test_scope_span_enter() {
    let span = scope_span(&ScopeKey::model("model-a"), AggregationPolicy::AllRecords);
    let guard = span.enter();
    drop(guard);
}

#[traced_test]
#[tokio::test]
async fn test_submit_and_snapshot_update_counters() {
    let directory = MemoryResponseDirectory::new();
    directory.register_response("r1", "p1", "model-a");
    let store = ScoreRecordStore::new(Arc::new(MemoryRecordLedger::new()), Arc::new(directory));
    let agg = MetricAggregator::new(
        store.clone(),
        AggregatorConfig::new(AggregationPolicy::AllRecords),
    );

    let submitted = METRICS.records_submitted();
    let rejected = METRICS.submissions_rejected();
    let computed = METRICS.snapshots_computed();
    let hits = METRICS.cache_hits();

    store
        .submit(NewEvaluation {
            prompt_id: "p1".to_string(),
            evaluator_id: "e1".to_string(),
            response_scores: vec![ResponseScore::new("r1", 4, 4, 4, 2)],
            ranked_order: vec!["r1".to_string()],
            rationale: None,
        })
        .await
        .unwrap();
    let bad = store
        .submit(NewEvaluation {
            prompt_id: "p1".to_string(),
            evaluator_id: "e2".to_string(),
            response_scores: vec![ResponseScore::new("r1", 9, 4, 4, 2)],
            ranked_order: vec!["r1".to_string()],
            rationale: None,
        })
        .await;
    assert!(bad.is_err());

    agg.metrics_for_prompt("p1", None).await.unwrap();
    agg.metrics_for_prompt("p1", None).await.unwrap();

    // Counters are process-global; other tests may bump them concurrently.
    assert!(METRICS.records_submitted() > submitted);
    assert!(METRICS.submissions_rejected() > rejected);
    assert!(METRICS.snapshots_computed() > computed);
    assert!(METRICS.cache_hits() > hits);
    METRICS.flush();
}

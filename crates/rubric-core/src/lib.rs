//! Rubric Core Library
//!
//! ## Layer 1 - Aggregation engine
//!
//! Turns individual evaluator judgments into per-model and per-prompt
//! metric snapshots: win-rates from rankings, per-criterion score
//! summaries, inter-rater agreement, and latency/length aggregates joined
//! from the response directory.

pub mod agreement;
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod directory;
pub mod domain;
pub mod export;
pub mod intake;
pub mod metrics;
pub mod obs;
pub mod ranking;
pub mod stats;
pub mod telemetry;

pub use domain::{
    AggregationPolicy, MetricSnapshot, MetricValue, ModelStanding, Result, RubricError, ScopeKey,
    ScoreSummary, SnapshotMetrics, UndefinedReason,
};

pub use agreement::{compute_agreement, criterion_agreement, AgreementReport, ResponseAgreement};
pub use aggregator::{apply_policy, composite_quality, compute_metrics, MetadataJoin, MetricAggregator};
pub use cache::{CacheKey, SnapshotCache, VersionVector, DEFAULT_CACHE_CAPACITY};
pub use config::AggregatorConfig;
pub use directory::{
    Catalog, CatalogResponse, DirectoryError, HttpResponseDirectory, MemoryResponseDirectory,
    PromptInfo, ResponseDirectory, ResponseInfo, ResponseMetadata,
};
pub use export::{
    export_records, format_cursor, parse_cursor, write_jsonl, ExportFilter, ExportSummary,
    DEFAULT_PAGE_SIZE,
};
pub use intake::{ModelFootprint, ScoreRecordStore};
pub use ranking::{tally_rankings, RankingTally};

pub use metrics::METRICS;
pub use obs::{
    emit_cache_hit, emit_export_finished, emit_export_interrupted, emit_metadata_degraded,
    emit_record_submitted, emit_snapshot_computed, emit_submission_rejected, scope_span,
};
pub use telemetry::init_tracing;

pub use rubric_store::{
    Criterion, EvaluationRecord, ExportCursor, NewEvaluation, RecordId, RecordLedger,
    ResponseScore, ValidationError,
};

/// Rubric version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

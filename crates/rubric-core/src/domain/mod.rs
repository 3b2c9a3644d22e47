//! Domain models for Rubric.
//!
//! - `MetricValue`: a metric that is defined or explicitly undefined
//! - `MetricSnapshot`: the aggregation result for one scope
//! - `RubricError`: the error taxonomy

pub mod error;
pub mod metric;
pub mod snapshot;

pub use error::{Result, RubricError};
pub use metric::{MetricValue, UndefinedReason};
pub use snapshot::{
    AggregationPolicy, MetricSnapshot, ModelStanding, ScopeKey, ScoreSummary, SnapshotMetrics,
};

//! Metric snapshot types produced by the aggregator.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rubric_store::Criterion;
use serde::{Deserialize, Serialize};

use super::error::RubricError;
use super::metric::{MetricValue, UndefinedReason};

/// What a snapshot is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeKey {
    Model { model_name: String },
    Prompt { prompt_id: String },
}

impl ScopeKey {
    pub fn model(name: impl Into<String>) -> Self {
        ScopeKey::Model {
            model_name: name.into(),
        }
    }

    pub fn prompt(id: impl Into<String>) -> Self {
        ScopeKey::Prompt {
            prompt_id: id.into(),
        }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKey::Model { model_name } => write!(f, "model:{model_name}"),
            ScopeKey::Prompt { prompt_id } => write!(f, "prompt:{prompt_id}"),
        }
    }
}

/// Which records of an evaluator count towards a snapshot.
///
/// There is deliberately no `Default`: deployments choose one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationPolicy {
    /// Only each evaluator's most recent record per prompt.
    LatestPerEvaluator,
    /// Every record, including superseded ones.
    AllRecords,
}

impl AggregationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationPolicy::LatestPerEvaluator => "latest-per-evaluator",
            AggregationPolicy::AllRecords => "all-records",
        }
    }
}

impl std::fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationPolicy {
    type Err = RubricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "latest-per-evaluator" | "latest" => Ok(AggregationPolicy::LatestPerEvaluator),
            "all-records" | "all" => Ok(AggregationPolicy::AllRecords),
            other => Err(RubricError::Config(format!(
                "unknown aggregation policy '{other}' (expected latest-per-evaluator or all-records)"
            ))),
        }
    }
}

/// Mean and sample standard deviation of one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub mean: MetricValue,
    pub std_dev: MetricValue,
    pub count: usize,
}

impl ScoreSummary {
    pub fn empty() -> Self {
        Self {
            mean: MetricValue::undefined(UndefinedReason::NoRecords),
            std_dev: MetricValue::undefined(UndefinedReason::NoRecords),
            count: 0,
        }
    }
}

/// Pairwise outcome totals for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelStanding {
    pub wins: u64,
    pub losses: u64,
    pub win_rate: MetricValue,
}

/// The numeric content of a snapshot.
///
/// Two computations over the same record set produce equal values here,
/// down to the bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    /// Qualifying records that contributed
    pub sample_size: usize,
    /// Distinct evaluators among those records
    pub evaluator_count: usize,
    /// Win-rate of the scoped model (`not_applicable` for prompt scope)
    pub win_rate: MetricValue,
    /// Per-model pairwise standings over the qualifying rankings
    pub standings: BTreeMap<String, ModelStanding>,
    pub mean_scores: BTreeMap<Criterion, ScoreSummary>,
    pub inter_rater_agreement: MetricValue,
    /// Responses scored by two or more evaluators
    pub agreement_coverage: usize,
    pub mean_latency_ms: MetricValue,
    pub mean_response_length: MetricValue,
    pub latency_quality_correlation: MetricValue,
    pub length_quality_correlation: MetricValue,
}

impl SnapshotMetrics {
    /// Metrics for a scope with no qualifying records.
    pub fn empty() -> Self {
        let none = MetricValue::undefined(UndefinedReason::NoRecords);
        Self {
            sample_size: 0,
            evaluator_count: 0,
            win_rate: none,
            standings: BTreeMap::new(),
            mean_scores: Criterion::ALL
                .into_iter()
                .map(|c| (c, ScoreSummary::empty()))
                .collect(),
            inter_rater_agreement: none,
            agreement_coverage: 0,
            mean_latency_ms: none,
            mean_response_length: none,
            latency_quality_correlation: none,
            length_quality_correlation: none,
        }
    }
}

/// A point-in-time metric result for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub scope: ScopeKey,
    pub policy: AggregationPolicy,
    /// Records submitted after this instant were excluded
    pub as_of: Option<DateTime<Utc>>,
    pub metrics: SnapshotMetrics,
    pub computed_at: DateTime<Utc>,
    /// True when a dependent field was omitted because a dependency failed
    pub degraded: bool,
}

impl MetricSnapshot {
    pub fn sample_size(&self) -> usize {
        self.metrics.sample_size
    }

    pub fn win_rate(&self) -> MetricValue {
        self.metrics.win_rate
    }

    pub fn inter_rater_agreement(&self) -> MetricValue {
        self.metrics.inter_rater_agreement
    }

    pub fn mean_score(&self, criterion: Criterion) -> Option<&ScoreSummary> {
        self.metrics.mean_scores.get(&criterion)
    }
}

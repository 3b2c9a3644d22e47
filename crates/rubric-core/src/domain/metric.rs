//! Metric values that may be undefined.
//!
//! Every aggregate is a [`MetricValue`]: either a computed number or an
//! explicit marker saying why no number exists. There is no implicit zero.

use serde::{Deserialize, Serialize};

/// Why a metric has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// No qualifying records in scope.
    NoRecords,
    /// The model took part in no cross-model pairwise comparison.
    NoPairwiseComparisons,
    /// No response was scored by two or more evaluators.
    InsufficientRaterOverlap,
    /// Too few observations for the statistic (e.g. a std-dev of one value).
    InsufficientSamples,
    /// One of the correlated series is constant.
    ZeroVariance,
    /// The metric has no meaning for this scope.
    NotApplicable,
    /// Response metadata was not available for any scoped response.
    MetadataUnavailable,
    /// The metadata lookup exceeded its time bound.
    DependencyTimeout,
}

/// A metric that is either defined or explicitly undefined.
///
/// Serializes as `{"status":"defined","value":0.5}` or
/// `{"status":"undefined","reason":"no_records"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricValue {
    Defined { value: f64 },
    Undefined { reason: UndefinedReason },
}

impl MetricValue {
    pub fn defined(value: f64) -> Self {
        MetricValue::Defined { value }
    }

    pub fn undefined(reason: UndefinedReason) -> Self {
        MetricValue::Undefined { reason }
    }

    /// `Defined` when `value` is `Some`, otherwise undefined for `reason`.
    pub fn from_option(value: Option<f64>, reason: UndefinedReason) -> Self {
        match value {
            Some(value) => MetricValue::Defined { value },
            None => MetricValue::Undefined { reason },
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Defined { value } => Some(*value),
            MetricValue::Undefined { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<UndefinedReason> {
        match self {
            MetricValue::Defined { .. } => None,
            MetricValue::Undefined { reason } => Some(*reason),
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined { .. })
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Defined { value } => write!(f, "{value:.4}"),
            MetricValue::Undefined { reason } => write!(f, "undefined ({reason:?})"),
        }
    }
}

//! Aggregator configuration.
//!
//! Environment variables:
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `RUBRIC_AGGREGATION_POLICY` | `latest-per-evaluator` or `all-records` | required |
//! | `RUBRIC_MAX_STALENESS_SECS` | oldest cached snapshot that may be served | 30 |
//! | `RUBRIC_METADATA_TIMEOUT_MS` | bound on the metadata join | 500 |
//! | `RUBRIC_CACHE` | enable the snapshot cache | true |
//! | `RUBRIC_CACHE_CAPACITY` | most snapshots held by the cache | 1024 |

use std::time::Duration;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::domain::{AggregationPolicy, Result, RubricError};

pub const POLICY_ENV: &str = "RUBRIC_AGGREGATION_POLICY";
pub const MAX_STALENESS_ENV: &str = "RUBRIC_MAX_STALENESS_SECS";
pub const METADATA_TIMEOUT_ENV: &str = "RUBRIC_METADATA_TIMEOUT_MS";
pub const CACHE_ENV: &str = "RUBRIC_CACHE";
pub const CACHE_CAPACITY_ENV: &str = "RUBRIC_CACHE_CAPACITY";

pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(30);
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_millis(500);

/// Settings for [`MetricAggregator`](crate::MetricAggregator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub policy: AggregationPolicy,
    /// A cached snapshot older than this is recomputed even if no record
    /// was submitted since.
    pub max_staleness: Duration,
    pub metadata_timeout: Duration,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
}

impl AggregatorConfig {
    /// Defaults for everything except the policy, which has none.
    pub fn new(policy: AggregationPolicy) -> Self {
        Self {
            policy,
            max_staleness: DEFAULT_MAX_STALENESS,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = max_staleness;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let policy = lookup(POLICY_ENV)
            .ok_or_else(|| {
                RubricError::Config(format!(
                    "{POLICY_ENV} must be set to latest-per-evaluator or all-records"
                ))
            })?
            .parse::<AggregationPolicy>()?;

        let mut config = Self::new(policy);

        if let Some(raw) = lookup(MAX_STALENESS_ENV) {
            config.max_staleness = Duration::from_secs(parse_number(MAX_STALENESS_ENV, &raw)?);
        }
        if let Some(raw) = lookup(METADATA_TIMEOUT_ENV) {
            config.metadata_timeout =
                Duration::from_millis(parse_number(METADATA_TIMEOUT_ENV, &raw)?);
        }
        if let Some(raw) = lookup(CACHE_ENV) {
            config.cache_enabled = parse_bool(CACHE_ENV, &raw)?;
        }
        if let Some(raw) = lookup(CACHE_CAPACITY_ENV) {
            let capacity = parse_number(CACHE_CAPACITY_ENV, &raw)?;
            if capacity == 0 {
                return Err(RubricError::Config(format!(
                    "{CACHE_CAPACITY_ENV} must be positive"
                )));
            }
            config.cache_capacity = capacity as usize;
        }

        Ok(config)
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| RubricError::Config(format!("{key}: expected an integer, got '{raw}'")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RubricError::Config(format!(
            "{key}: expected true or false, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn policy_is_required() {
        let err = AggregatorConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, RubricError::Config(_)));
    }

    #[test]
    fn defaults_apply_when_only_policy_is_set() {
        let config =
            AggregatorConfig::from_lookup(lookup(&[(POLICY_ENV, "all-records")])).unwrap();
        assert_eq!(config, AggregatorConfig::new(AggregationPolicy::AllRecords));
        assert!(config.cache_enabled);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AggregatorConfig::from_lookup(lookup(&[
            (POLICY_ENV, "latest-per-evaluator"),
            (MAX_STALENESS_ENV, "5"),
            (METADATA_TIMEOUT_ENV, "50"),
            (CACHE_ENV, "off"),
            (CACHE_CAPACITY_ENV, "64"),
        ]))
        .unwrap();
        assert_eq!(config.policy, AggregationPolicy::LatestPerEvaluator);
        assert_eq!(config.max_staleness, Duration::from_secs(5));
        assert_eq!(config.metadata_timeout, Duration::from_millis(50));
        assert!(!config.cache_enabled);
        assert_eq!(config.cache_capacity, 64);
    }

    #[test]
    fn zero_cache_capacity_is_rejected() {
        let err = AggregatorConfig::from_lookup(lookup(&[
            (POLICY_ENV, "all"),
            (CACHE_CAPACITY_ENV, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RubricError::Config(_)));
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = AggregatorConfig::from_lookup(lookup(&[
            (POLICY_ENV, "all"),
            (MAX_STALENESS_ENV, "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(MAX_STALENESS_ENV));
    }
}

//! Metric Aggregator: per-model and per-prompt snapshots.
//!
//! A snapshot is computed from the qualifying record set, resolved as:
//!
//! 1. records of the scope's prompts submitted at or before `as_of`
//! 2. the configured policy (latest record per evaluator per prompt, or all)
//! 3. for model scope, records that score at least one of the model's
//!    responses
//! 4. ordered by `(submitted_at, record_id)`
//!
//! Every statistic iterates that order and groups with ordered maps, so
//! recomputation over an unchanged record set is bit-identical. The only
//! external call is the metadata join, which is bounded by a timeout and
//! degrades the latency/length fields instead of failing the snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rubric_store::{Criterion, EvaluationRecord, RecordLedger, ResponseScore};
use tracing::Instrument;

use crate::agreement::compute_agreement;
use crate::cache::{CacheKey, SnapshotCache, VersionVector};
use crate::config::AggregatorConfig;
use crate::directory::{ResponseDirectory, ResponseMetadata};
use crate::domain::{
    AggregationPolicy, MetricSnapshot, MetricValue, Result, RubricError, ScopeKey, ScoreSummary,
    SnapshotMetrics, UndefinedReason,
};
use crate::intake::ScoreRecordStore;
use crate::metrics::METRICS;
use crate::obs;
use crate::ranking::tally_rankings;
use crate::stats;

/// Outcome of the response-metadata join.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataJoin {
    Joined(BTreeMap<String, ResponseMetadata>),
    /// The lookup failed; dependent fields are undefined for this reason.
    Failed(UndefinedReason),
}

/// Which responses of the record set belong to the scope.
#[derive(Debug, Clone)]
enum ResponseScope {
    All,
    Only(HashSet<String>),
}

impl ResponseScope {
    fn contains(&self, response_id: &str) -> bool {
        match self {
            ResponseScope::All => true,
            ResponseScope::Only(ids) => ids.contains(response_id),
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedScope {
    prompt_ids: BTreeSet<String>,
    responses: ResponseScope,
}

/// Computes [`MetricSnapshot`]s over a [`ScoreRecordStore`].
pub struct MetricAggregator<L: ?Sized, D: ?Sized> {
    store: ScoreRecordStore<L, D>,
    config: AggregatorConfig,
    cache: Arc<SnapshotCache>,
}

impl<L: ?Sized, D: ?Sized> Clone for MetricAggregator<L, D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<L: RecordLedger + ?Sized, D: ResponseDirectory + ?Sized> MetricAggregator<L, D> {
    pub fn new(store: ScoreRecordStore<L, D>, config: AggregatorConfig) -> Self {
        let cache = Arc::new(SnapshotCache::with_capacity(config.cache_capacity));
        Self {
            store,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn store(&self) -> &ScoreRecordStore<L, D> {
        &self.store
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub async fn metrics_for_prompt(
        &self,
        prompt_id: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<MetricSnapshot> {
        self.snapshot(&ScopeKey::prompt(prompt_id), as_of).await
    }

    pub async fn metrics_for_model(
        &self,
        model_name: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<MetricSnapshot> {
        self.snapshot(&ScopeKey::model(model_name), as_of).await
    }

    /// Snapshot for `scope`, served from cache when still valid.
    ///
    /// An unknown prompt or model is `NotFound`; a known scope without
    /// records yields an empty snapshot.
    pub async fn snapshot(
        &self,
        scope: &ScopeKey,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<MetricSnapshot> {
        let span = obs::scope_span(scope, self.config.policy);
        self.snapshot_inner(scope, as_of).instrument(span).await
    }

    async fn snapshot_inner(
        &self,
        scope: &ScopeKey,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<MetricSnapshot> {
        let started = tokio::time::Instant::now();
        let resolved = self.resolve(scope).await?;

        // Versions are read before records so a concurrent submission can
        // only make the cached entry look older than it is.
        let versions = self.versions(&resolved.prompt_ids).await?;
        let key = CacheKey {
            scope: scope.clone(),
            policy: self.config.policy,
            as_of,
        };
        if self.config.cache_enabled {
            if let Some((snapshot, age)) =
                self.cache.get(&key, &versions, self.config.max_staleness)
            {
                METRICS.inc_cache_hits();
                obs::emit_cache_hit(scope, age.as_millis() as u64);
                return Ok(snapshot);
            }
        }

        let records = self.qualifying_records(&resolved, as_of).await?;

        let (metrics, degraded) = if records.is_empty() {
            (SnapshotMetrics::empty(), false)
        } else {
            let model_of = self.model_map(&records).await?;
            let (metadata, degraded) = self.join_metadata(scope, &records, &resolved).await;
            let in_scope = |id: &str| resolved.responses.contains(id);
            (
                compute_metrics(scope, &records, &model_of, in_scope, &metadata)?,
                degraded,
            )
        };

        let snapshot = MetricSnapshot {
            scope: scope.clone(),
            policy: self.config.policy,
            as_of,
            metrics,
            computed_at: Utc::now(),
            degraded,
        };

        METRICS.inc_snapshots_computed();
        obs::emit_snapshot_computed(&snapshot, started.elapsed().as_millis() as u64);

        if self.config.cache_enabled && !degraded {
            self.cache
                .insert(key, versions, snapshot.clone(), self.config.max_staleness);
        }
        Ok(snapshot)
    }

    async fn resolve(&self, scope: &ScopeKey) -> Result<ResolvedScope> {
        match scope {
            ScopeKey::Prompt { prompt_id } => {
                self.store.directory().prompt(prompt_id).await?;
                Ok(ResolvedScope {
                    prompt_ids: BTreeSet::from([prompt_id.clone()]),
                    responses: ResponseScope::All,
                })
            }
            ScopeKey::Model { model_name } => {
                let footprint = self.store.model_footprint(model_name).await?;
                Ok(ResolvedScope {
                    prompt_ids: footprint.prompt_ids,
                    responses: ResponseScope::Only(footprint.response_ids),
                })
            }
        }
    }

    async fn versions(&self, prompt_ids: &BTreeSet<String>) -> Result<VersionVector> {
        let ledger = self.store.ledger();
        let reads = prompt_ids.iter().map(|id| async move {
            let version = ledger.prompt_version(id).await?;
            Ok::<_, RubricError>((id.clone(), version))
        });
        Ok(try_join_all(reads).await?.into_iter().collect())
    }

    async fn qualifying_records(
        &self,
        resolved: &ResolvedScope,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<EvaluationRecord>> {
        let mut records = self.store.records_for_prompts(&resolved.prompt_ids).await?;
        if let Some(as_of) = as_of {
            records.retain(|r| r.submitted_at <= as_of);
        }
        let mut records = apply_policy(records, self.config.policy);
        if let ResponseScope::Only(ids) = &resolved.responses {
            records.retain(|r| r.response_ids().any(|id| ids.contains(id)));
        }
        Ok(records)
    }

    /// Model name of every response the records mention.
    async fn model_map(&self, records: &[EvaluationRecord]) -> Result<HashMap<String, String>> {
        let ids: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.response_ids().chain(r.ranked_order.iter().map(String::as_str)))
            .collect();
        let directory = self.store.directory();
        let lookups = ids.into_iter().map(|id| async move {
            let info = directory.response(id).await?;
            Ok::<_, RubricError>((info.response_id, info.model_name))
        });
        Ok(try_join_all(lookups).await?.into_iter().collect())
    }

    async fn join_metadata(
        &self,
        scope: &ScopeKey,
        records: &[EvaluationRecord],
        resolved: &ResolvedScope,
    ) -> (MetadataJoin, bool) {
        let ids: Vec<String> = records
            .iter()
            .flat_map(|r| r.response_ids())
            .filter(|id| resolved.responses.contains(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let timeout = self.config.metadata_timeout;
        let lookup = self.store.directory().metadata(&ids);
        match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(metadata)) => (MetadataJoin::Joined(metadata), false),
            Ok(Err(e)) => {
                obs::emit_metadata_degraded(scope, &e);
                (MetadataJoin::Failed(UndefinedReason::MetadataUnavailable), true)
            }
            Err(_) => {
                METRICS.inc_metadata_timeouts();
                let err = RubricError::DependencyTimeout {
                    dependency: "response metadata".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                obs::emit_metadata_degraded(scope, &err);
                (MetadataJoin::Failed(UndefinedReason::DependencyTimeout), true)
            }
        }
    }
}

/// Keep each evaluator's latest record per prompt, or everything.
///
/// `records` must be ordered by `(submitted_at, record_id)`; the output
/// keeps that order.
pub fn apply_policy(
    records: Vec<EvaluationRecord>,
    policy: AggregationPolicy,
) -> Vec<EvaluationRecord> {
    match policy {
        AggregationPolicy::AllRecords => records,
        AggregationPolicy::LatestPerEvaluator => {
            let mut latest: BTreeMap<(String, String), EvaluationRecord> = BTreeMap::new();
            for record in records {
                latest.insert(
                    (record.prompt_id.clone(), record.evaluator_id.clone()),
                    record,
                );
            }
            let mut kept: Vec<EvaluationRecord> = latest.into_values().collect();
            kept.sort_by(|a, b| {
                (a.submitted_at, &a.record_id).cmp(&(b.submitted_at, &b.record_id))
            });
            kept
        }
    }
}

/// Mean of correctness, clarity, relevance and inverted hallucination risk.
pub fn composite_quality(score: &ResponseScore) -> f64 {
    let inverted_risk = f64::from(rubric_store::SCORE_MAX + rubric_store::SCORE_MIN)
        - f64::from(score.hallucination_risk);
    (f64::from(score.correctness)
        + f64::from(score.clarity)
        + f64::from(score.relevance)
        + inverted_risk)
        / 4.0
}

/// Compute snapshot metrics from a qualifying record set.
///
/// Pure: the result depends only on the arguments. `in_scope` selects the
/// responses whose scores, agreement and metadata count (all responses for
/// prompt scope, the model's own for model scope). Rankings always use
/// every response so the model's opponents are counted.
pub fn compute_metrics(
    scope: &ScopeKey,
    records: &[EvaluationRecord],
    model_of: &HashMap<String, String>,
    in_scope: impl Fn(&str) -> bool,
    metadata: &MetadataJoin,
) -> Result<SnapshotMetrics> {
    if records.is_empty() {
        return Ok(SnapshotMetrics::empty());
    }

    let tally = tally_rankings(records, model_of)?;
    let win_rate = match scope {
        ScopeKey::Model { model_name } => tally.win_rate(model_name),
        ScopeKey::Prompt { .. } => MetricValue::undefined(UndefinedReason::NotApplicable),
    };

    let scored: Vec<&ResponseScore> = records
        .iter()
        .flat_map(|r| r.response_scores.iter())
        .filter(|s| in_scope(&s.response_id))
        .collect();

    let mean_scores: BTreeMap<Criterion, ScoreSummary> = Criterion::ALL
        .into_iter()
        .map(|criterion| {
            let values: Vec<f64> = scored.iter().map(|s| f64::from(s.score(criterion))).collect();
            (
                criterion,
                ScoreSummary {
                    mean: stats::mean_metric(&values),
                    std_dev: stats::std_dev_metric(&values),
                    count: values.len(),
                },
            )
        })
        .collect();

    let agreement = compute_agreement(records, &in_scope);

    let evaluator_count = records
        .iter()
        .map(|r| r.evaluator_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let mut metrics = SnapshotMetrics {
        sample_size: records.len(),
        evaluator_count,
        win_rate,
        standings: tally.standings(),
        mean_scores,
        inter_rater_agreement: agreement.overall,
        agreement_coverage: agreement.coverage,
        ..SnapshotMetrics::empty()
    };
    apply_metadata(&mut metrics, &scored, metadata);
    Ok(metrics)
}

fn apply_metadata(metrics: &mut SnapshotMetrics, scored: &[&ResponseScore], join: &MetadataJoin) {
    let metadata = match join {
        MetadataJoin::Joined(metadata) => metadata,
        MetadataJoin::Failed(reason) => {
            let undefined = MetricValue::undefined(*reason);
            metrics.mean_latency_ms = undefined;
            metrics.mean_response_length = undefined;
            metrics.latency_quality_correlation = undefined;
            metrics.length_quality_correlation = undefined;
            return;
        }
    };

    // Mean composite quality per response, in response id order.
    let mut quality: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for score in scored {
        quality
            .entry(score.response_id.as_str())
            .or_default()
            .push(composite_quality(score));
    }

    let mut latencies = Vec::new();
    let mut lengths = Vec::new();
    let mut latency_pairs = Vec::new();
    let mut length_pairs = Vec::new();
    for (response_id, values) in &quality {
        let Some(meta) = metadata.get(*response_id) else {
            continue;
        };
        let Some(q) = stats::mean(values) else {
            continue;
        };
        if let Some(latency) = meta.latency_ms {
            latencies.push(latency);
            latency_pairs.push((latency, q));
        }
        if let Some(length) = meta.length {
            lengths.push(length as f64);
            length_pairs.push((length as f64, q));
        }
    }

    let unavailable = UndefinedReason::MetadataUnavailable;
    metrics.mean_latency_ms = MetricValue::from_option(stats::mean(&latencies), unavailable);
    metrics.mean_response_length = MetricValue::from_option(stats::mean(&lengths), unavailable);
    metrics.latency_quality_correlation = if latency_pairs.is_empty() {
        MetricValue::undefined(unavailable)
    } else {
        stats::pearson(&latency_pairs)
    };
    metrics.length_quality_correlation = if length_pairs.is_empty() {
        MetricValue::undefined(unavailable)
    } else {
        stats::pearson(&length_pairs)
    };
}

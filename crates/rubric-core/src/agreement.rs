//! Inter-rater agreement.
//!
//! For every response scored by two or more evaluators, each criterion's
//! agreement is `1 - s / s_max`, where `s` is the sample standard deviation
//! of the evaluators' scores and `s_max` is the largest sample standard
//! deviation `n` ratings can reach on the score scale (half the raters at
//! each end). Identical scores give exactly 1.0; a maximal split gives
//! exactly 0.0. A response's agreement is the mean over the four criteria
//! and the scope's agreement is the mean over qualifying responses.
//!
//! Agreement is measured between raters, so an evaluator who scored the same
//! response more than once contributes only their latest score.

use std::collections::BTreeMap;

use rubric_store::{Criterion, EvaluationRecord, SCORE_MAX, SCORE_MIN};
use serde::{Deserialize, Serialize};

use crate::domain::{MetricValue, UndefinedReason};
use crate::stats;

/// Largest sample variance `n` scores on the scale can have.
fn max_sample_variance(n: usize) -> f64 {
    let width = f64::from(SCORE_MAX - SCORE_MIN);
    let low = (n / 2) as f64;
    let high = n.div_ceil(2) as f64;
    width * width * low * high / (n as f64 * (n as f64 - 1.0))
}

/// Agreement among one criterion's scores for one response.
pub fn criterion_agreement(scores: &[u8]) -> MetricValue {
    if scores.len() < 2 {
        return MetricValue::undefined(UndefinedReason::InsufficientRaterOverlap);
    }
    let values: Vec<f64> = scores.iter().map(|s| f64::from(*s)).collect();
    let Some(variance) = stats::sample_variance(&values) else {
        return MetricValue::undefined(UndefinedReason::InsufficientRaterOverlap);
    };
    let spread = (variance / max_sample_variance(scores.len())).sqrt();
    MetricValue::defined((1.0 - spread).clamp(0.0, 1.0))
}

/// Agreement for one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAgreement {
    pub evaluator_count: usize,
    pub criteria: BTreeMap<Criterion, MetricValue>,
    pub overall: MetricValue,
}

/// Agreement across a set of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementReport {
    /// Every scored response, keyed by response id
    pub responses: BTreeMap<String, ResponseAgreement>,
    /// Mean over responses with two or more evaluators
    pub overall: MetricValue,
    /// Number of responses with two or more evaluators
    pub coverage: usize,
}

/// Scores grouped by response, then evaluator. Later records overwrite
/// earlier ones, so each evaluator keeps their latest score.
type ScoreGrid<'a> = BTreeMap<&'a str, BTreeMap<&'a str, [u8; 4]>>;

fn group_scores<'a>(
    records: impl IntoIterator<Item = &'a EvaluationRecord>,
    include: impl Fn(&str) -> bool,
) -> ScoreGrid<'a> {
    let mut ordered: Vec<&EvaluationRecord> = records.into_iter().collect();
    ordered.sort_by(|a, b| {
        (a.submitted_at, &a.record_id).cmp(&(b.submitted_at, &b.record_id))
    });

    let mut grid = ScoreGrid::new();
    for record in ordered {
        for score in &record.response_scores {
            if !include(&score.response_id) {
                continue;
            }
            let by_evaluator = grid.entry(score.response_id.as_str()).or_default();
            by_evaluator.insert(
                record.evaluator_id.as_str(),
                Criterion::ALL.map(|c| score.score(c)),
            );
        }
    }
    grid
}

fn response_agreement(by_evaluator: &BTreeMap<&str, [u8; 4]>) -> ResponseAgreement {
    let criteria: BTreeMap<Criterion, MetricValue> = Criterion::ALL
        .iter()
        .enumerate()
        .map(|(i, criterion)| {
            let scores: Vec<u8> = by_evaluator.values().map(|s| s[i]).collect();
            (*criterion, criterion_agreement(&scores))
        })
        .collect();

    let values: Option<Vec<f64>> = criteria.values().map(MetricValue::value).collect();
    let overall = MetricValue::from_option(
        values.and_then(|v| stats::mean(&v)),
        UndefinedReason::InsufficientRaterOverlap,
    );

    ResponseAgreement {
        evaluator_count: by_evaluator.len(),
        criteria,
        overall,
    }
}

/// Compute agreement over `records`, considering only responses for which
/// `include` returns true.
pub fn compute_agreement<'a>(
    records: impl IntoIterator<Item = &'a EvaluationRecord>,
    include: impl Fn(&str) -> bool,
) -> AgreementReport {
    let grid = group_scores(records, include);

    let responses: BTreeMap<String, ResponseAgreement> = grid
        .iter()
        .map(|(response_id, by_evaluator)| {
            (response_id.to_string(), response_agreement(by_evaluator))
        })
        .collect();

    let qualifying: Vec<f64> = responses.values().filter_map(|r| r.overall.value()).collect();

    AgreementReport {
        coverage: qualifying.len(),
        overall: MetricValue::from_option(
            stats::mean(&qualifying),
            UndefinedReason::InsufficientRaterOverlap,
        ),
        responses,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rubric_store::{NewEvaluation, ResponseScore};

    use super::*;

    fn record(evaluator: &str, scores: Vec<ResponseScore>, secs: i64) -> EvaluationRecord {
        let ranked_order = scores.iter().map(|s| s.response_id.clone()).collect();
        EvaluationRecord::stamp(
            NewEvaluation {
                prompt_id: "p".to_string(),
                evaluator_id: evaluator.to_string(),
                response_scores: scores,
                ranked_order,
                rationale: None,
            },
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[test]
    fn identical_scores_agree_exactly() {
        assert_eq!(criterion_agreement(&[3, 3]), MetricValue::defined(1.0));
        assert_eq!(criterion_agreement(&[4, 4, 4, 4, 4]), MetricValue::defined(1.0));
    }

    #[test]
    fn maximal_split_is_exactly_zero() {
        assert_eq!(criterion_agreement(&[5, 1]), MetricValue::defined(0.0));
        assert_eq!(criterion_agreement(&[1, 5, 1, 5]), MetricValue::defined(0.0));
        let odd = criterion_agreement(&[1, 5, 5]).value().unwrap();
        assert!(odd.abs() < 1e-9);
    }

    #[test]
    fn partial_disagreement_is_between() {
        let v = criterion_agreement(&[4, 5]).value().unwrap();
        assert!(v > 0.0 && v < 1.0);
    }

    #[test]
    fn single_rater_is_undefined() {
        assert_eq!(
            criterion_agreement(&[4]).reason(),
            Some(UndefinedReason::InsufficientRaterOverlap)
        );

        let report = compute_agreement(
            &[record("e1", vec![ResponseScore::new("r1", 5, 5, 5, 5)], 1)],
            |_| true,
        );
        assert_eq!(report.coverage, 0);
        assert_eq!(
            report.overall.reason(),
            Some(UndefinedReason::InsufficientRaterOverlap)
        );
        assert!(!report.responses["r1"].overall.is_defined());
    }

    #[test]
    fn opposite_correctness_only() {
        let records = [
            record("e1", vec![ResponseScore::new("r1", 5, 5, 5, 5)], 1),
            record("e2", vec![ResponseScore::new("r1", 1, 5, 5, 5)], 2),
        ];
        let report = compute_agreement(&records, |_| true);
        let r1 = &report.responses["r1"];
        assert_eq!(r1.criteria[&Criterion::Correctness], MetricValue::defined(0.0));
        assert_eq!(r1.criteria[&Criterion::Clarity], MetricValue::defined(1.0));
        assert_eq!(r1.overall, MetricValue::defined(0.75));
        assert_eq!(report.overall, MetricValue::defined(0.75));
        assert_eq!(report.coverage, 1);
    }

    #[test]
    fn evaluator_counts_once_with_latest_score() {
        // e1 first disagrees with e2, then revises to match.
        let records = [
            record("e1", vec![ResponseScore::new("r1", 1, 1, 1, 1)], 1),
            record("e2", vec![ResponseScore::new("r1", 4, 4, 4, 4)], 2),
            record("e1", vec![ResponseScore::new("r1", 4, 4, 4, 4)], 3),
        ];
        let report = compute_agreement(&records, |_| true);
        assert_eq!(report.responses["r1"].evaluator_count, 2);
        assert_eq!(report.overall, MetricValue::defined(1.0));
    }

    #[test]
    fn include_filters_responses() {
        let records = [
            record(
                "e1",
                vec![
                    ResponseScore::new("r1", 5, 5, 5, 5),
                    ResponseScore::new("r2", 1, 1, 1, 1),
                ],
                1,
            ),
            record(
                "e2",
                vec![
                    ResponseScore::new("r1", 5, 5, 5, 5),
                    ResponseScore::new("r2", 5, 5, 5, 5),
                ],
                2,
            ),
        ];
        let report = compute_agreement(&records, |id| id == "r1");
        assert!(!report.responses.contains_key("r2"));
        assert_eq!(report.overall, MetricValue::defined(1.0));
    }
}

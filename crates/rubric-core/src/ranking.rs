//! Pairwise win/loss tallies from ranked orders.
//!
//! Each record's `ranked_order` is read as a strict total order: for every
//! pair where response A is listed before response B, A's model beats B's
//! model. Pairs whose responses come from the same model are skipped. The
//! ranking format has no tie notation, so no pair is ever a tie.

use std::collections::{BTreeMap, HashMap};

use rubric_store::EvaluationRecord;

use crate::domain::{MetricValue, ModelStanding, Result, RubricError, UndefinedReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    wins: u64,
    losses: u64,
}

/// Running pairwise outcome totals per model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingTally {
    models: BTreeMap<String, Tally>,
    comparisons: u64,
}

impl RankingTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record's ranking into the tally.
    ///
    /// `model_of` maps response ids to model names. A ranked response with
    /// no mapping is a `NotFound` error.
    pub fn add_record(
        &mut self,
        record: &EvaluationRecord,
        model_of: &HashMap<String, String>,
    ) -> Result<()> {
        let ranked: Vec<&str> = record
            .ranked_order
            .iter()
            .map(|response_id| {
                model_of
                    .get(response_id)
                    .map(String::as_str)
                    .ok_or_else(|| RubricError::not_found("response", response_id))
            })
            .collect::<Result<_>>()?;

        for model in &ranked {
            self.models.entry((*model).to_string()).or_default();
        }

        for (i, winner) in ranked.iter().enumerate() {
            for loser in &ranked[i + 1..] {
                if winner == loser {
                    continue;
                }
                self.record_outcome(winner, loser);
            }
        }
        Ok(())
    }

    fn record_outcome(&mut self, winner: &str, loser: &str) {
        self.comparisons += 1;
        if let Some(t) = self.models.get_mut(winner) {
            t.wins += 1;
        }
        if let Some(t) = self.models.get_mut(loser) {
            t.losses += 1;
        }
    }

    /// Cross-model comparisons counted so far.
    pub fn comparisons(&self) -> u64 {
        self.comparisons
    }

    /// wins / (wins + losses), undefined when the model took part in no
    /// cross-model comparison.
    pub fn win_rate(&self, model_name: &str) -> MetricValue {
        match self.models.get(model_name) {
            Some(t) => rate(*t),
            None => MetricValue::undefined(UndefinedReason::NoPairwiseComparisons),
        }
    }

    /// Standings for every model that appeared in a ranking.
    pub fn standings(&self) -> BTreeMap<String, ModelStanding> {
        self.models
            .iter()
            .map(|(model, t)| {
                (
                    model.clone(),
                    ModelStanding {
                        wins: t.wins,
                        losses: t.losses,
                        win_rate: rate(*t),
                    },
                )
            })
            .collect()
    }
}

fn rate(t: Tally) -> MetricValue {
    let total = t.wins + t.losses;
    if total == 0 {
        return MetricValue::undefined(UndefinedReason::NoPairwiseComparisons);
    }
    MetricValue::defined(t.wins as f64 / total as f64)
}

/// Tally every record's ranking.
pub fn tally_rankings<'a>(
    records: impl IntoIterator<Item = &'a EvaluationRecord>,
    model_of: &HashMap<String, String>,
) -> Result<RankingTally> {
    let mut tally = RankingTally::new();
    for record in records {
        tally.add_record(record, model_of)?;
    }
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rubric_store::{NewEvaluation, ResponseScore};

    use super::*;

    fn record(evaluator: &str, order: &[&str], secs: i64) -> EvaluationRecord {
        EvaluationRecord::stamp(
            NewEvaluation {
                prompt_id: "p".to_string(),
                evaluator_id: evaluator.to_string(),
                response_scores: order
                    .iter()
                    .map(|id| ResponseScore::new(*id, 3, 3, 3, 3))
                    .collect(),
                ranked_order: order.iter().map(|s| s.to_string()).collect(),
                rationale: None,
            },
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    fn models(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(r, m)| (r.to_string(), m.to_string()))
            .collect()
    }

    #[test]
    fn two_evaluators_agree_on_order() {
        let m = models(&[("r1", "a"), ("r2", "b")]);
        let records = [record("e1", &["r1", "r2"], 1), record("e2", &["r1", "r2"], 2)];
        let tally = tally_rankings(&records, &m).unwrap();
        assert_eq!(tally.win_rate("a"), MetricValue::defined(1.0));
        assert_eq!(tally.win_rate("b"), MetricValue::defined(0.0));
        assert_eq!(tally.comparisons(), 2);
    }

    #[test]
    fn same_model_pairs_are_skipped() {
        let m = models(&[("r1", "a"), ("r2", "a")]);
        let tally = tally_rankings(&[record("e1", &["r1", "r2"], 1)], &m).unwrap();
        assert_eq!(tally.comparisons(), 0);
        assert_eq!(
            tally.win_rate("a").reason(),
            Some(UndefinedReason::NoPairwiseComparisons)
        );
        assert!(tally.standings().contains_key("a"));
    }

    #[test]
    fn single_response_contributes_nothing() {
        let m = models(&[("r1", "a")]);
        let tally = tally_rankings(&[record("e1", &["r1"], 1)], &m).unwrap();
        assert_eq!(tally.comparisons(), 0);
        assert!(!tally.win_rate("a").is_defined());
    }

    #[test]
    fn unknown_model_is_undefined_not_zero() {
        let tally = RankingTally::new();
        assert_ne!(tally.win_rate("ghost"), MetricValue::defined(0.0));
    }

    #[test]
    fn three_way_ranking_counts_all_pairs() {
        let m = models(&[("r1", "a"), ("r2", "b"), ("r3", "c")]);
        let tally = tally_rankings(&[record("e1", &["r2", "r1", "r3"], 1)], &m).unwrap();
        let standings = tally.standings();
        assert_eq!((standings["b"].wins, standings["b"].losses), (2, 0));
        assert_eq!((standings["a"].wins, standings["a"].losses), (1, 1));
        assert_eq!((standings["c"].wins, standings["c"].losses), (0, 2));
        assert_eq!(standings["a"].win_rate, MetricValue::defined(0.5));
    }

    #[test]
    fn missing_model_mapping_is_not_found() {
        let m = models(&[("r1", "a")]);
        let err = tally_rankings(&[record("e1", &["r1", "r2"], 1)], &m).unwrap_err();
        assert!(matches!(err, RubricError::NotFound { .. }));
    }
}

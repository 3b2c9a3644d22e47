//! Structural validation for evaluation submissions.
//!
//! Checks that identifiers are present, scores lie on the rating scale, and
//! `ranked_order` is a total order over exactly the responses in
//! `response_scores`. Out-of-range scores are rejected, never clamped.
//!
//! Whether responses actually belong to the prompt needs the external
//! response directory and is checked by the ingestion service, not here.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::storage_traits::{
    Criterion, EvaluationRecord, NewEvaluation, RecordId, ResponseScore, SCORE_MAX, SCORE_MIN,
};

/// Validate a submission before it is stamped.
pub fn validate_submission(submission: &NewEvaluation) -> Result<(), ValidationError> {
    check_parts(
        &submission.prompt_id,
        &submission.evaluator_id,
        &submission.response_scores,
        &submission.ranked_order,
    )
}

/// Validate a stamped record, including that its id matches its identity.
pub fn validate_record(record: &EvaluationRecord) -> Result<(), ValidationError> {
    check_parts(
        &record.prompt_id,
        &record.evaluator_id,
        &record.response_scores,
        &record.ranked_order,
    )?;

    let expected = RecordId::derive(&record.prompt_id, &record.evaluator_id, &record.submitted_at);
    if record.record_id != expected {
        return Err(ValidationError::new(
            "record_id",
            format!("does not match record identity (expected {})", expected.short()),
        ));
    }
    Ok(())
}

fn check_parts(
    prompt_id: &str,
    evaluator_id: &str,
    scores: &[ResponseScore],
    ranked_order: &[String],
) -> Result<(), ValidationError> {
    if prompt_id.trim().is_empty() {
        return Err(ValidationError::new("prompt_id", "must not be empty"));
    }
    if evaluator_id.trim().is_empty() {
        return Err(ValidationError::new("evaluator_id", "must not be empty"));
    }
    if scores.is_empty() {
        return Err(ValidationError::new(
            "response_scores",
            "must score at least one response",
        ));
    }

    let mut scored: HashSet<&str> = HashSet::with_capacity(scores.len());
    for (i, score) in scores.iter().enumerate() {
        if score.response_id.trim().is_empty() {
            return Err(ValidationError::new(
                format!("response_scores[{i}].response_id"),
                "must not be empty",
            ));
        }
        if !scored.insert(score.response_id.as_str()) {
            return Err(ValidationError::new(
                format!("response_scores[{i}].response_id"),
                format!("duplicate response id {}", score.response_id),
            ));
        }
        for criterion in Criterion::ALL {
            let value = score.score(criterion);
            if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(ValidationError::new(
                    format!("response_scores[{i}].{criterion}"),
                    format!("score {value} outside {SCORE_MIN}..={SCORE_MAX}"),
                ));
            }
        }
    }

    let mut ranked: HashSet<&str> = HashSet::with_capacity(ranked_order.len());
    for (i, response_id) in ranked_order.iter().enumerate() {
        if !scored.contains(response_id.as_str()) {
            return Err(ValidationError::new(
                format!("ranked_order[{i}]"),
                format!("response {response_id} is not in response_scores"),
            ));
        }
        if !ranked.insert(response_id.as_str()) {
            return Err(ValidationError::new(
                format!("ranked_order[{i}]"),
                format!("response {response_id} ranked more than once"),
            ));
        }
    }

    if let Some(missing) = scores
        .iter()
        .find(|s| !ranked.contains(s.response_id.as_str()))
    {
        return Err(ValidationError::new(
            "ranked_order",
            format!("response {} is scored but not ranked", missing.response_id),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn submission() -> NewEvaluation {
        NewEvaluation {
            prompt_id: "p1".to_string(),
            evaluator_id: "e1".to_string(),
            response_scores: vec![
                ResponseScore::new("r1", 5, 4, 5, 1),
                ResponseScore::new("r2", 2, 3, 3, 4),
            ],
            ranked_order: vec!["r1".to_string(), "r2".to_string()],
            rationale: Some("r1 cites its sources".to_string()),
        }
    }

    #[test]
    fn accepts_well_formed_submission() {
        assert!(validate_submission(&submission()).is_ok());
    }

    #[test]
    fn rejects_empty_identifiers() {
        let mut s = submission();
        s.prompt_id = "  ".to_string();
        assert_eq!(validate_submission(&s).unwrap_err().field, "prompt_id");

        let mut s = submission();
        s.evaluator_id.clear();
        assert_eq!(validate_submission(&s).unwrap_err().field, "evaluator_id");
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let mut s = submission();
        s.response_scores[1].clarity = 6;
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(err.field, "response_scores[1].clarity");

        let mut s = submission();
        s.response_scores[0].hallucination_risk = 0;
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(err.field, "response_scores[0].hallucination_risk");
    }

    #[test]
    fn rejects_duplicate_scored_response() {
        let mut s = submission();
        s.response_scores[1].response_id = "r1".to_string();
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(err.field, "response_scores[1].response_id");
    }

    #[test]
    fn rejects_ranked_response_without_scores() {
        let mut s = submission();
        s.ranked_order.push("r3".to_string());
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(err.field, "ranked_order[2]");
        assert!(err.reason.contains("r3"));
    }

    #[test]
    fn rejects_scored_response_missing_from_ranking() {
        let mut s = submission();
        s.ranked_order.pop();
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(err.field, "ranked_order");
        assert!(err.reason.contains("r2"));
    }

    #[test]
    fn rejects_repeated_rank_entry() {
        let mut s = submission();
        s.ranked_order = vec!["r1".to_string(), "r1".to_string()];
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(err.field, "ranked_order[1]");
    }

    #[test]
    fn rejects_empty_scores() {
        let mut s = submission();
        s.response_scores.clear();
        s.ranked_order.clear();
        assert_eq!(validate_submission(&s).unwrap_err().field, "response_scores");
    }

    #[test]
    fn rejects_tampered_record_id() {
        let mut record = EvaluationRecord::stamp(submission(), Utc::now());
        assert!(validate_record(&record).is_ok());
        record.evaluator_id = "e2".to_string();
        assert_eq!(validate_record(&record).unwrap_err().field, "record_id");
    }
}

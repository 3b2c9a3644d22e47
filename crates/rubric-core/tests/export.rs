//! Export stream tests: ordering, filtering and restartability.

use std::io::{BufRead, BufReader};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::{StreamExt, TryStreamExt};
use rubric_core::{
    export_records, format_cursor, parse_cursor, write_jsonl, EvaluationRecord, ExportFilter,
    MemoryResponseDirectory, NewEvaluation, RecordId, ResponseScore, RubricError,
    ScoreRecordStore,
};
use rubric_store::{MemoryRecordLedger, SurrealRecordLedger};

type Store<L> = ScoreRecordStore<L, MemoryResponseDirectory>;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn directory() -> MemoryResponseDirectory {
    let dir = MemoryResponseDirectory::new();
    dir.register_response("r1", "p1", "model-a");
    dir.register_response("r2", "p1", "model-b");
    dir.register_response("r3", "p2", "model-b");
    dir
}

fn evaluation(prompt: &str, evaluator: &str, response_id: &str) -> NewEvaluation {
    NewEvaluation {
        prompt_id: prompt.to_string(),
        evaluator_id: evaluator.to_string(),
        response_scores: vec![ResponseScore::new(response_id, 3, 4, 4, 2)],
        ranked_order: vec![response_id.to_string()],
        rationale: None,
    }
}

/// 12 records across two prompts; records 4 and 5 share a timestamp.
async fn seeded<L: rubric_store::RecordLedger>(ledger: L) -> Store<L> {
    let store = ScoreRecordStore::new(Arc::new(ledger), Arc::new(directory()));
    for i in 0..12i64 {
        let (prompt, response) = match i % 3 {
            0 => ("p1", "r1"),
            1 => ("p1", "r2"),
            _ => ("p2", "r3"),
        };
        let secs = if i == 5 { 4 } else { i };
        store
            .submit_at(evaluation(prompt, &format!("e{i}"), response), at(secs))
            .await
            .unwrap();
    }
    store
}

async fn collect<L: rubric_store::RecordLedger + 'static>(
    store: &Store<L>,
    filter: ExportFilter,
    resume: Option<rubric_store::ExportCursor>,
    page_size: usize,
) -> Vec<EvaluationRecord> {
    export_records(store, filter, resume, page_size)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn exports_in_submission_order() {
    let store = seeded(MemoryRecordLedger::new()).await;
    let records = collect(&store, ExportFilter::default(), None, 5).await;
    assert_eq!(records.len(), 12);
    assert!(records
        .windows(2)
        .all(|w| w[0].cursor() < w[1].cursor()));
}

#[tokio::test]
async fn interrupted_export_resumes_where_it_stopped() {
    let store = seeded(MemoryRecordLedger::new()).await;
    let full = collect(&store, ExportFilter::default(), None, 4).await;

    for stop_after in [1, 4, 5, 11] {
        let stream = export_records(&store, ExportFilter::default(), None, 4)
            .await
            .unwrap();
        let head: Vec<EvaluationRecord> = stream
            .take(stop_after)
            .try_collect()
            .await
            .unwrap();
        let checkpoint = head.last().unwrap().cursor();

        let tail = collect(&store, ExportFilter::default(), Some(checkpoint), 3).await;
        let mut resumed = head;
        resumed.extend(tail);
        assert_eq!(resumed, full, "stopped after {stop_after}");
    }
}

#[tokio::test]
async fn filters_by_prompt_model_and_date() {
    let store = seeded(MemoryRecordLedger::new()).await;

    let p2 = collect(
        &store,
        ExportFilter {
            prompt_id: Some("p2".to_string()),
            ..Default::default()
        },
        None,
        2,
    )
    .await;
    assert_eq!(p2.len(), 4);
    assert!(p2.iter().all(|r| r.prompt_id == "p2"));

    // model-b owns r2 (p1) and r3 (p2); the model filter drops p1's r1
    // records without stalling the pager.
    let model_b = collect(
        &store,
        ExportFilter {
            model_name: Some("model-b".to_string()),
            ..Default::default()
        },
        None,
        1,
    )
    .await;
    assert_eq!(model_b.len(), 8);

    let window = collect(
        &store,
        ExportFilter {
            submitted_from: Some(at(2)),
            submitted_to: Some(at(6)),
            ..Default::default()
        },
        None,
        10,
    )
    .await;
    // seconds 2, 3, 4, 4, 6
    assert_eq!(window.len(), 5);
}

#[tokio::test]
async fn unknown_model_fails_before_streaming() {
    let store = seeded(MemoryRecordLedger::new()).await;
    let result = export_records(
        &store,
        ExportFilter {
            model_name: Some("model-z".to_string()),
            ..Default::default()
        },
        None,
        10,
    )
    .await;
    assert!(matches!(result, Err(RubricError::NotFound { .. })));
}

#[tokio::test]
async fn jsonl_export_writes_checkpoint_for_resume() {
    let store = seeded(MemoryRecordLedger::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("first.jsonl");

    let partial = export_records(&store, ExportFilter::default(), None, 4)
        .await
        .unwrap()
        .take(7);
    let mut file = std::fs::File::create(&path).unwrap();
    let summary = write_jsonl(partial, &mut file).await.unwrap();
    assert_eq!(summary.records_written, 7);

    let token = summary.checkpoint_token().unwrap();
    let resume = parse_cursor(&token).unwrap();
    assert_eq!(format_cursor(&resume), token);

    let rest_path = dir.path().join("rest.jsonl");
    let rest = export_records(&store, ExportFilter::default(), Some(resume), 4)
        .await
        .unwrap();
    let mut file = std::fs::File::create(&rest_path).unwrap();
    let rest_summary = write_jsonl(rest, &mut file).await.unwrap();
    assert_eq!(rest_summary.records_written, 5);

    let mut exported = Vec::new();
    for p in [&path, &rest_path] {
        let reader = BufReader::new(std::fs::File::open(p).unwrap());
        for line in reader.lines() {
            let record: EvaluationRecord = serde_json::from_str(&line.unwrap()).unwrap();
            exported.push(record.record_id);
        }
    }
    let expected: Vec<RecordId> = collect(&store, ExportFilter::default(), None, 100)
        .await
        .into_iter()
        .map(|r| r.record_id)
        .collect();
    assert_eq!(exported.len(), 12);
    assert_eq!(exported, expected);
}

#[tokio::test]
async fn failed_export_reports_the_resume_point() {
    let store = seeded(MemoryRecordLedger::new()).await;
    let all = collect(&store, ExportFilter::default(), None, 100).await;

    let failing = futures::stream::iter(
        all[..3]
            .iter()
            .cloned()
            .map(Ok)
            .chain(std::iter::once(Err(RubricError::Config(
                "ledger went away".to_string(),
            )))),
    );
    let mut out = Vec::new();
    let err = write_jsonl(failing, &mut out).await.unwrap_err();

    let (written, checkpoint) = match err {
        RubricError::ExportInterrupted {
            records_written,
            checkpoint,
            source,
        } => {
            assert!(matches!(*source, RubricError::Config(_)));
            (records_written, checkpoint.unwrap())
        }
        other => panic!("expected an interrupted export, got {other}"),
    };
    assert_eq!(written, 3);
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);

    let resume = parse_cursor(&checkpoint).unwrap();
    assert_eq!(resume, all[2].cursor());
    let rest = collect(&store, ExportFilter::default(), Some(resume), 4).await;
    assert_eq!(rest, all[3..].to_vec());
}

#[tokio::test]
async fn failure_before_any_record_has_no_checkpoint() {
    let failing = futures::stream::iter(vec![Err::<EvaluationRecord, _>(RubricError::Config(
        "ledger went away".to_string(),
    ))]);
    let mut out = Vec::new();
    match write_jsonl(failing, &mut out).await {
        Err(RubricError::ExportInterrupted {
            records_written,
            checkpoint,
            ..
        }) => {
            assert_eq!(records_written, 0);
            assert!(checkpoint.is_none());
        }
        other => panic!("expected an interrupted export, got {other:?}"),
    }
    assert!(out.is_empty());
}

#[tokio::test]
async fn surreal_export_matches_memory_export() {
    let memory = seeded(MemoryRecordLedger::new()).await;
    let surreal = seeded(SurrealRecordLedger::in_memory().await.unwrap()).await;

    let a = collect(&memory, ExportFilter::default(), None, 5).await;
    let b = collect(&surreal, ExportFilter::default(), None, 5).await;
    assert_eq!(a, b);

    let checkpoint = a[6].cursor();
    let tail = collect(&surreal, ExportFilter::default(), Some(checkpoint), 2).await;
    assert_eq!(tail, a[7..].to_vec());
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let store = seeded(MemoryRecordLedger::new()).await;
    assert!(matches!(
        export_records(&store, ExportFilter::default(), None, 0).await,
        Err(RubricError::Config(_))
    ));
}

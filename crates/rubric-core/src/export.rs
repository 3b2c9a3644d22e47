//! Bulk export of evaluation records.
//!
//! [`export_records`] is a lazy stream over the ledger in
//! `(submitted_at, record_id)` order, fetched a page at a time. It can be
//! resumed from the [`ExportCursor`] of the last record consumed and then
//! yields exactly the records an uninterrupted run would have yielded next.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use rubric_store::{EvaluationRecord, ExportCursor, RecordFilter, RecordId, RecordLedger};
use serde::Serialize;

use crate::directory::ResponseDirectory;
use crate::domain::{Result, RubricError};
use crate::intake::ScoreRecordStore;
use crate::metrics::METRICS;
use crate::obs;

pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Which records to export. Criteria combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFilter {
    pub prompt_id: Option<String>,
    /// Keep records that score at least one of this model's responses
    pub model_name: Option<String>,
    /// Inclusive lower bound on `submitted_at`
    pub submitted_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `submitted_at`
    pub submitted_to: Option<DateTime<Utc>>,
}

struct ExportState<L: ?Sized> {
    ledger: Arc<L>,
    filter: RecordFilter,
    responses: Option<HashSet<String>>,
    after: Option<ExportCursor>,
    buffer: VecDeque<EvaluationRecord>,
    exhausted: bool,
    page_size: usize,
}

impl<L: RecordLedger + ?Sized> ExportState<L> {
    async fn next(mut self) -> Result<Option<(EvaluationRecord, Self)>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some((record, self)));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .ledger
                .scan(&self.filter, self.after.as_ref(), self.page_size)
                .await?;
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            // Advance past every scanned record, including ones the model
            // filter drops, so the next page never repeats them.
            if let Some(last) = page.last() {
                self.after = Some(last.cursor());
            }
            let responses = &self.responses;
            self.buffer.extend(page.into_iter().filter(|r| match responses {
                Some(ids) => r.response_ids().any(|id| ids.contains(id)),
                None => true,
            }));
        }
    }
}

/// Stream the records matching `filter`, strictly after `resume` if given.
///
/// Resolving `model_name` needs the response directory, so an unknown model
/// fails here with `NotFound` before any record is read.
pub async fn export_records<L, D>(
    store: &ScoreRecordStore<L, D>,
    filter: ExportFilter,
    resume: Option<ExportCursor>,
    page_size: usize,
) -> Result<impl Stream<Item = Result<EvaluationRecord>> + Send + 'static>
where
    L: RecordLedger + ?Sized + 'static,
    D: ResponseDirectory + ?Sized,
{
    if page_size == 0 {
        return Err(RubricError::Config("export page size must be positive".to_string()));
    }

    let mut prompt_ids: Option<BTreeSet<String>> =
        filter.prompt_id.map(|id| BTreeSet::from([id]));
    let mut responses = None;

    if let Some(model_name) = &filter.model_name {
        let footprint = store.model_footprint(model_name).await?;
        prompt_ids = Some(match prompt_ids {
            Some(only) => only.intersection(&footprint.prompt_ids).cloned().collect(),
            None => footprint.prompt_ids,
        });
        responses = Some(footprint.response_ids);
    }

    let state = ExportState {
        ledger: Arc::clone(store.ledger()),
        filter: RecordFilter {
            prompt_ids,
            submitted_from: filter.submitted_from,
            submitted_to: filter.submitted_to,
        },
        responses,
        after: resume,
        buffer: VecDeque::new(),
        exhausted: false,
        page_size,
    };

    Ok(stream::try_unfold(state, ExportState::next))
}

/// Result of draining an export stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub records_written: u64,
    /// Resume point after the last written record (`None` if nothing was
    /// written).
    pub checkpoint: Option<ExportCursor>,
}

impl ExportSummary {
    /// The checkpoint in its `<rfc3339>,<record_id>` text form.
    pub fn checkpoint_token(&self) -> Option<String> {
        self.checkpoint.as_ref().map(format_cursor)
    }
}

/// Write every record of `records` to `out` as JSON lines.
///
/// If the stream or the writer fails part way, the error is
/// [`RubricError::ExportInterrupted`] carrying the number of records
/// written and the checkpoint to resume from. A record whose line was cut
/// short by a write error is not covered by that checkpoint.
pub async fn write_jsonl<S, W>(records: S, out: &mut W) -> Result<ExportSummary>
where
    S: Stream<Item = Result<EvaluationRecord>>,
    W: Write,
{
    futures::pin_mut!(records);

    let mut summary = ExportSummary {
        records_written: 0,
        checkpoint: None,
    };
    let drained: Result<()> = async {
        while let Some(record) = records.try_next().await? {
            serde_json::to_writer(&mut *out, &record)?;
            out.write_all(b"\n")?;
            summary.records_written += 1;
            summary.checkpoint = Some(record.cursor());
        }
        out.flush()?;
        Ok(())
    }
    .await;

    METRICS.add_records_exported(summary.records_written);

    match drained {
        Ok(()) => {
            obs::emit_export_finished(
                summary.records_written,
                summary.checkpoint_token().as_deref(),
            );
            Ok(summary)
        }
        Err(source) => {
            // Records still buffered in `out` only count if they reach it.
            let checkpoint = match out.flush() {
                Ok(()) => summary.checkpoint_token(),
                Err(_) => None,
            };
            obs::emit_export_interrupted(summary.records_written, checkpoint.as_deref(), &source);
            Err(RubricError::ExportInterrupted {
                records_written: summary.records_written,
                checkpoint,
                source: Box::new(source),
            })
        }
    }
}

/// Format a cursor as `<rfc3339 with nanoseconds>,<record_id>`.
pub fn format_cursor(cursor: &ExportCursor) -> String {
    format!(
        "{},{}",
        cursor
            .submitted_at
            .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
        cursor.record_id
    )
}

/// Parse a cursor produced by [`format_cursor`].
pub fn parse_cursor(token: &str) -> Result<ExportCursor> {
    let invalid = |reason: String| RubricError::Config(format!("invalid export cursor: {reason}"));

    let (ts, id) = token
        .rsplit_once(',')
        .ok_or_else(|| invalid("expected <timestamp>,<record_id>".to_string()))?;
    let submitted_at = DateTime::parse_from_rfc3339(ts.trim())
        .map_err(|e| invalid(e.to_string()))?
        .with_timezone(&Utc);
    let record_id = RecordId::try_from(id.trim().to_string()).map_err(|e| invalid(e.to_string()))?;
    Ok(ExportCursor {
        submitted_at,
        record_id,
    })
}

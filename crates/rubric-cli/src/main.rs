//! Rubric CLI
//!
//! Command-line interface for recording human evaluations and reading
//! aggregated metrics.
//!
//! Commands:
//! - `rubric submit --file <record.json>` - Record one evaluation
//! - `rubric metrics prompt <id>` - Metric snapshot for a prompt
//! - `rubric metrics model <name>` - Metric snapshot for a model
//! - `rubric records prompt|model <key>` - Raw records as a JSON array
//! - `rubric export --out <file.jsonl>` - Resumable bulk export

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rubric_core::config::POLICY_ENV;
use rubric_core::{
    export_records, format_cursor, init_tracing, parse_cursor, write_jsonl, AggregationPolicy,
    AggregatorConfig, ExportCursor, ExportFilter, HttpResponseDirectory, MemoryResponseDirectory,
    MetricAggregator, NewEvaluation, ResponseDirectory, RubricError, ScoreRecordStore,
    DEFAULT_PAGE_SIZE, METRICS,
};
use rubric_store::SurrealRecordLedger;
use tracing::Level;

type Store = ScoreRecordStore<SurrealRecordLedger, dyn ResponseDirectory>;

/// Exit code for a submission rejected by validation.
const EXIT_VALIDATION: i32 = 2;

#[derive(Parser)]
#[command(name = "rubric")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Human evaluation aggregation for LLM responses", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    directory: DirectoryArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where prompt, response and model membership is looked up.
#[derive(Args, Debug)]
struct DirectoryArgs {
    /// JSON catalog of prompts and responses; takes precedence over
    /// `--directory-url`
    #[arg(long, global = true, env = "RUBRIC_CATALOG")]
    catalog: Option<PathBuf>,

    /// Base URL of the response directory service
    #[arg(long, global = true, env = "RUBRIC_DIRECTORY_URL")]
    directory_url: Option<String>,

    /// Per-request timeout for the directory service, in milliseconds
    #[arg(long, global = true, default_value_t = 2000)]
    directory_timeout_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one evaluation
    Submit {
        /// Evaluation JSON (prompt_id, evaluator_id, response_scores, ranked_order)
        #[arg(short, long)]
        file: PathBuf,

        /// Submission time (RFC 3339); defaults to now
        #[arg(long)]
        submitted_at: Option<DateTime<Utc>>,
    },

    /// Print a metric snapshot
    Metrics {
        #[command(subcommand)]
        scope: ScopeArg,

        /// Aggregation policy: latest-per-evaluator or all-records
        #[arg(long, env = "RUBRIC_AGGREGATION_POLICY", value_parser = parse_policy)]
        policy: AggregationPolicy,

        /// Only count records submitted at or before this instant (RFC 3339)
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Print raw evaluation records as a JSON array
    Records {
        #[command(subcommand)]
        scope: ScopeArg,
    },

    /// Export records as JSON lines
    Export {
        /// Output file; appended to when resuming
        #[arg(short, long)]
        out: PathBuf,

        /// Only records for this prompt
        #[arg(long)]
        prompt: Option<String>,

        /// Only records scoring this model's responses
        #[arg(long)]
        model: Option<String>,

        /// Earliest submission time (RFC 3339, inclusive)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Latest submission time (RFC 3339, inclusive)
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Checkpoint printed by an earlier export: <rfc3339>,<record_id>
        #[arg(long, value_parser = parse_resume)]
        resume: Option<ExportCursor>,

        /// Records fetched per ledger page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum ScopeArg {
    /// A single prompt
    Prompt { id: String },
    /// Every prompt a model has responses for
    Model { name: String },
}

fn parse_policy(raw: &str) -> std::result::Result<AggregationPolicy, String> {
    raw.parse().map_err(|e: RubricError| e.to_string())
}

fn parse_resume(raw: &str) -> std::result::Result<ExportCursor, String> {
    parse_cursor(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let directory = open_directory(&cli.directory)?;
    let ledger = SurrealRecordLedger::from_env()
        .await
        .context("Failed to connect to the record ledger")?;
    let store: Store = ScoreRecordStore::new(Arc::new(ledger), directory);

    let outcome = match cli.command {
        Commands::Submit { file, submitted_at } => cmd_submit(&store, &file, submitted_at).await,
        Commands::Metrics {
            scope,
            policy,
            as_of,
        } => cmd_metrics(store, scope, policy, as_of).await,
        Commands::Records { scope } => cmd_records(&store, scope).await,
        Commands::Export {
            out,
            prompt,
            model,
            from,
            to,
            resume,
            page_size,
        } => {
            let filter = ExportFilter {
                prompt_id: prompt,
                model_name: model,
                submitted_from: from,
                submitted_to: to,
            };
            cmd_export(&store, &out, filter, resume, page_size).await
        }
    };

    METRICS.flush();
    outcome
}

fn open_directory(args: &DirectoryArgs) -> Result<Arc<dyn ResponseDirectory>> {
    match (&args.catalog, &args.directory_url) {
        (Some(path), _) => {
            let directory = MemoryResponseDirectory::load(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            Ok(Arc::new(directory))
        }
        (None, Some(url)) => {
            let directory = HttpResponseDirectory::new(
                url,
                Duration::from_millis(args.directory_timeout_ms),
            )
            .with_context(|| format!("Invalid directory URL {url}"))?;
            Ok(Arc::new(directory))
        }
        (None, None) => bail!("Either --catalog or --directory-url must be given"),
    }
}

/// Record one evaluation from a JSON file.
async fn cmd_submit(
    store: &Store,
    file: &Path,
    submitted_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let submission: NewEvaluation =
        serde_json::from_str(&raw).with_context(|| format!("Malformed evaluation in {}", file.display()))?;

    let result = match submitted_at {
        Some(ts) => store.submit_at(submission, ts).await,
        None => store.submit(submission).await,
    };

    match result {
        Ok(record_id) => {
            println!("{}", serde_json::json!({ "record_id": record_id }));
            Ok(())
        }
        Err(RubricError::Validation(err)) => {
            println!(
                "{}",
                serde_json::json!({
                    "error": "validation",
                    "field": err.field,
                    "reason": err.reason,
                })
            );
            METRICS.flush();
            std::process::exit(EXIT_VALIDATION);
        }
        Err(err) => Err(err).context("Submission failed"),
    }
}

/// Print the snapshot for a prompt or model.
async fn cmd_metrics(
    store: Store,
    scope: ScopeArg,
    policy: AggregationPolicy,
    as_of: Option<DateTime<Utc>>,
) -> Result<()> {
    // The flag wins over the environment for the policy; the remaining
    // knobs still come from the environment.
    let config = AggregatorConfig::from_lookup(|key| {
        if key == POLICY_ENV {
            Some(policy.to_string())
        } else {
            std::env::var(key).ok()
        }
    })
    .context("Invalid aggregation configuration")?;

    let aggregator = MetricAggregator::new(store, config);
    let snapshot = match &scope {
        ScopeArg::Prompt { id } => aggregator.metrics_for_prompt(id, as_of).await,
        ScopeArg::Model { name } => aggregator.metrics_for_model(name, as_of).await,
    }
    .with_context(|| format!("Failed to compute metrics for {scope:?}"))?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Print the raw records of a prompt or model.
async fn cmd_records(store: &Store, scope: ScopeArg) -> Result<()> {
    let records = match &scope {
        ScopeArg::Prompt { id } => store.query_by_prompt(id).await,
        ScopeArg::Model { name } => store.query_by_model(name).await,
    }
    .with_context(|| format!("Failed to query records for {scope:?}"))?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Export matching records to a JSON lines file.
async fn cmd_export(
    store: &Store,
    out: &Path,
    filter: ExportFilter,
    resume: Option<ExportCursor>,
    page_size: usize,
) -> Result<()> {
    let file = if resume.is_some() {
        OpenOptions::new().create(true).append(true).open(out)
    } else {
        File::create(out)
    }
    .with_context(|| format!("Failed to open {}", out.display()))?;

    // Nothing written this run leaves the caller where they started.
    let previous = resume.as_ref().map(format_cursor);
    let records = export_records(store, filter, resume, page_size)
        .await
        .context("Failed to start export")?;
    let mut writer = BufWriter::new(file);

    match write_jsonl(records, &mut writer).await {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::json!({
                    "records_written": summary.records_written,
                    "checkpoint": summary.checkpoint_token().or(previous),
                })
            );
            Ok(())
        }
        Err(RubricError::ExportInterrupted {
            records_written,
            checkpoint,
            source,
        }) => {
            println!(
                "{}",
                serde_json::json!({
                    "error": "export_interrupted",
                    "records_written": records_written,
                    "checkpoint": checkpoint.or(previous),
                    "reason": source.to_string(),
                })
            );
            Err(*source).with_context(|| format!("Export to {} was interrupted", out.display()))
        }
        Err(err) => Err(err).with_context(|| format!("Export to {} failed", out.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metrics_with_explicit_policy() {
        let cli = Cli::try_parse_from([
            "rubric",
            "--catalog",
            "catalog.json",
            "metrics",
            "--policy",
            "all-records",
            "model",
            "model-a",
        ])
        .unwrap();

        assert_eq!(cli.directory.catalog, Some(PathBuf::from("catalog.json")));
        match cli.command {
            Commands::Metrics { scope, policy, as_of } => {
                assert_eq!(scope, ScopeArg::Model { name: "model-a".to_string() });
                assert_eq!(policy, AggregationPolicy::AllRecords);
                assert!(as_of.is_none());
            }
            _ => panic!("expected metrics command"),
        }
    }

    #[test]
    fn rejects_unknown_policy() {
        let result = Cli::try_parse_from([
            "rubric", "metrics", "--policy", "median", "prompt", "p1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_export_resume_token() {
        let token = format!("2024-03-01T12:00:00.000000000Z,{}", "ab".repeat(32));
        let cli = Cli::try_parse_from([
            "rubric",
            "--directory-url",
            "http://directory.local/api/",
            "export",
            "--out",
            "records.jsonl",
            "--model",
            "model-b",
            "--resume",
            token.as_str(),
        ])
        .unwrap();

        match cli.command {
            Commands::Export {
                model,
                resume,
                page_size,
                ..
            } => {
                assert_eq!(model.as_deref(), Some("model-b"));
                assert_eq!(resume.unwrap().record_id.as_str(), "ab".repeat(32));
                assert_eq!(page_size, DEFAULT_PAGE_SIZE);
            }
            _ => panic!("expected export command"),
        }
    }

    #[test]
    fn directory_source_is_required() {
        let args = DirectoryArgs {
            catalog: None,
            directory_url: None,
            directory_timeout_ms: 2000,
        };
        assert!(open_directory(&args).is_err());
    }

    #[test]
    fn directory_url_builds_http_directory() {
        let args = DirectoryArgs {
            catalog: None,
            directory_url: Some("http://directory.local/api/".to_string()),
            directory_timeout_ms: 250,
        };
        assert!(open_directory(&args).is_ok());
    }

    #[test]
    fn submit_accepts_rfc3339_timestamp() {
        let cli = Cli::try_parse_from([
            "rubric",
            "submit",
            "--file",
            "eval.json",
            "--submitted-at",
            "2024-03-01T12:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit { submitted_at, .. } => {
                assert_eq!(submitted_at.unwrap().timestamp(), 1_709_294_400);
            }
            _ => panic!("expected submit command"),
        }
    }
}

//! attest: command-line driver for the audit ingestion pipeline.
//!
//! Runs the real pipeline (admission gate, ingestion service, hash chain,
//! idempotency) over the in-memory store.
//!
//! Usage:
//!   attest ingest --input events.jsonl --export records.json
//!   attest verify --input records.json
//!   attest scenario

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use attest_chain::{chains_by_resource, find_forks, verify_chain, verify_segment};
use attest_config::AttestConfig;
use attest_contracts::{AttestError, AuditRecord, CreateAuditRequest};
use attest_core::{AdmissionGate, AuditService};
use attest_store::MemoryAuditStore;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Tamper-evident audit ingestion.
#[derive(Parser)]
#[command(
    name = "attest",
    about = "Tamper-evident audit ingestion pipeline",
    long_about = "Ingests audit events into SHA-256 hash chains per resource,\n\
                  deduplicates idempotent retries, and verifies exported chains."
)]
struct Cli {
    /// TOML configuration file. ATTEST_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed JSON-lines create requests through the pipeline.
    Ingest {
        /// One CreateAuditRequest JSON object per line.
        #[arg(long)]
        input: PathBuf,
        /// Remote address the requests are attributed to for rate limiting.
        #[arg(long, default_value = "127.0.0.1:0")]
        client: String,
        /// Write every stored record as a JSON array here.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Verify the hash chains in an exported record array.
    Verify {
        #[arg(long)]
        input: PathBuf,
        /// Trust each chain's first link (history may have aged out).
        #[arg(long)]
        segment: bool,
    },
    /// Run the reference scenarios and print their outcomes.
    Scenario,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("'{}' is not a JSON array of audit records: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize records for '{}': {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Attest(#[from] AttestError),
}

type CliResult<T> = Result<T, CliError>;

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    // Set RUST_LOG=info (or debug) for pipeline logs on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let result = match cli.command {
        Command::Ingest { input, client, export } => {
            ingest(cli.config.as_deref(), &input, &client, export.as_deref(), &cancel).await
        }
        Command::Verify { input, segment } => verify(&input, segment),
        Command::Scenario => scenario(cli.config.as_deref(), &cancel).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("attest: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

struct Pipeline {
    store: Arc<MemoryAuditStore>,
    gate: AdmissionGate,
}

fn build_pipeline(config: &AttestConfig, cancel: &CancellationToken) -> Pipeline {
    let store = Arc::new(MemoryAuditStore::with_retention_days(config.retention.days));
    let service = AuditService::with_options(store.clone(), config.service.options());
    let limiter = config.rate_limiter();
    if let Some(interval) = config.rate_limit.sweep_interval() {
        limiter.spawn_sweeper(interval, cancel.child_token());
    }
    Pipeline {
        store,
        gate: AdmissionGate::new(limiter, service),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn ingest(
    config: Option<&Path>,
    input: &Path,
    client: &str,
    export: Option<&Path>,
    cancel: &CancellationToken,
) -> CliResult<bool> {
    let config = AttestConfig::load(config)?;
    let pipeline = build_pipeline(&config, cancel);

    let text = std::fs::read_to_string(input).map_err(|source| CliError::Read {
        path: input.to_path_buf(),
        source,
    })?;

    let mut failures = 0usize;
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<CreateAuditRequest>(line) {
            Ok(request) => pipeline
                .gate
                .create(client, cancel, request)
                .await
                .map_err(|e| e.kind().code()),
            Err(_) => Err("invalid_json"),
        };

        match outcome {
            Ok(record) => println!("{}", serde_json::json!({ "line": line_no, "record": record })),
            Err(code) => {
                failures += 1;
                println!("{}", serde_json::json!({ "line": line_no, "error": code }));
            }
        }
    }

    if let Some(path) = export {
        let records = pipeline.store.export()?;
        let json = serde_json::to_string_pretty(&records).map_err(|source| CliError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| CliError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(records = records.len(), path = %path.display(), "records exported");
    }

    Ok(failures == 0)
}

fn verify(input: &Path, segment: bool) -> CliResult<bool> {
    let text = std::fs::read_to_string(input).map_err(|source| CliError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let records: Vec<AuditRecord> =
        serde_json::from_str(&text).map_err(|source| CliError::Parse {
            path: input.to_path_buf(),
            source,
        })?;

    let mut clean = true;
    for (resource, chain) in chains_by_resource(&records) {
        let verdict = if segment { verify_segment(&chain) } else { verify_chain(&chain) };
        clean &= verdict.is_valid();
        println!(
            "{}",
            serde_json::json!({ "resource": resource.to_string(), "records": chain.len(), "result": verdict })
        );
    }

    for fork in find_forks(&records) {
        clean = false;
        println!("{}", serde_json::json!({ "fork": fork }));
    }

    Ok(clean)
}

async fn scenario(config: Option<&Path>, cancel: &CancellationToken) -> CliResult<bool> {
    let config = AttestConfig::load(config)?;
    let pipeline = build_pipeline(&config, cancel);
    let service = pipeline.gate.service();

    println!();
    println!("attest: reference scenarios");
    println!("===========================");

    println!();
    println!("[1] Two logins on session/r1");
    let first = service
        .create(cancel, CreateAuditRequest::new("u1", "login", "session", "r1"))
        .await?;
    let second = service
        .create(cancel, CreateAuditRequest::new("u1", "login", "session", "r1"))
        .await?;
    println!("    first  id={} prev=\"{}\" hash={}", first.id, first.chain_prev, first.chain_hash);
    println!("    second id={} prev={}", second.id, second.chain_prev);
    let linked = second.chain_prev == first.chain_hash;
    println!("    second links to first: {}", linked);

    println!();
    println!("[2] Empty actorId");
    match service
        .create(cancel, CreateAuditRequest::new("", "login", "session", "r1"))
        .await
    {
        Err(e) => println!("    rejected: {} ({})", e.kind(), e),
        Ok(record) => println!("    unexpectedly stored {}", record.id),
    }

    println!();
    println!("[3] Batch of three, second invalid");
    let results = service
        .create_batch(
            cancel,
            vec![
                CreateAuditRequest::new("u2", "read", "doc", "d1"),
                CreateAuditRequest::new("u2", "", "doc", "d1"),
                CreateAuditRequest::new("u2", "write", "doc", "d1"),
            ],
        )
        .await;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(record) => println!("    item {}: stored {}", i + 1, record.id),
            Err(e) => println!("    item {}: {}", i + 1, e.kind()),
        }
    }

    println!();
    println!("[4] Idempotent retry");
    let request = CreateAuditRequest::new("u3", "charge", "invoice", "inv-9")
        .with_idempotency_key("charge-inv-9-attempt");
    let original = service.create(cancel, request.clone()).await?;
    let retry = service.create(cancel, request).await?;
    println!("    same id on retry: {}", original.id == retry.id);

    println!();
    println!("[5] Chain verification over everything stored");
    let exported = pipeline.store.export()?;
    let mut all_valid = true;
    for (resource, chain) in chains_by_resource(&exported) {
        let verdict = verify_chain(&chain);
        all_valid &= verdict.is_valid();
        println!("    {:<16} {} record(s): {:?}", resource.to_string(), chain.len(), verdict);
    }
    println!();

    Ok(linked && all_valid)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<Vec<AuditRecord>>("{").unwrap_err()
    }

    #[test]
    fn export_failures_are_not_reported_as_bad_input() {
        let err = CliError::Serialize {
            path: PathBuf::from("out.json"),
            source: json_error(),
        };
        let message = err.to_string();
        assert!(message.starts_with("failed to serialize records for 'out.json'"));
        assert!(!message.contains("is not a JSON array"));
    }

    #[test]
    fn unreadable_record_file_names_the_input() {
        let err = CliError::Parse {
            path: PathBuf::from("records.json"),
            source: json_error(),
        };
        assert!(err.to_string().starts_with("'records.json' is not a JSON array"));
    }
}

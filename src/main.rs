//! factlens command-line entrypoint.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use mimalloc::MiMalloc;
use tokio::signal;

use factlens::config::Config;
use factlens::embedding::RerankerConfig;
use factlens::evidence::EvidenceRecord;
use factlens::lifecycle::{Engine, LifecycleConfig};
use factlens::retrieval::CancelFlag;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const USAGE: &str = "\
usage: factlens <command>

commands:
  ingest <file.jsonl>   add one JSON evidence record per line, then save the index
  query <text...>       print the reranked evidence for a claim as JSON
  stats                 print index, model and cache statistics as JSON

configuration is read from FACTLENS_* environment variables";

enum Command {
    Ingest(String),
    Query(String),
    Stats,
}

fn parse_args() -> anyhow::Result<Command> {
    let mut args = std::env::args().skip(1);
    let command = match args.next().as_deref() {
        Some("ingest") => {
            let Some(path) = args.next() else {
                bail!("ingest needs a file path\n\n{USAGE}");
            };
            Command::Ingest(path)
        }
        Some("query") => {
            let text = args.collect::<Vec<_>>().join(" ");
            if text.trim().is_empty() {
                bail!("query needs some text\n\n{USAGE}");
            }
            Command::Query(text)
        }
        Some("stats") => Command::Stats,
        Some("-h" | "--help") | None => {
            println!("{USAGE}");
            std::process::exit(0);
        }
        Some(other) => bail!("unknown command `{other}`\n\n{USAGE}"),
    };
    Ok(command)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = parse_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let lifecycle = LifecycleConfig::from_env()?;

    tracing::info!(
        data_dir = %config.data_dir.display(),
        cache_backend = ?config.cache_backend,
        "factlens starting"
    );

    let engine = Arc::new(
        Engine::builder(config)
            .with_lifecycle(lifecycle)
            .with_reranker_config(RerankerConfig::from_env())
            .build()?,
    );
    engine.start()?;

    let outcome = match command {
        Command::Ingest(path) => ingest(&engine, &path).await,
        Command::Query(text) => print_query(&engine, &text),
        Command::Stats => print_json(&engine.get_performance_stats()),
    };

    match engine.shutdown().await {
        Ok(report) => tracing::info!(
            persisted = report.persisted,
            flushed_embeddings = report.flushed_embeddings,
            "factlens shutdown complete"
        ),
        Err(e) => tracing::error!("Shutdown failed: {}", e),
    }
    outcome
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_query(engine: &Engine, text: &str) -> anyhow::Result<()> {
    let result = engine.query(text)?;
    tracing::info!(
        results = result.len(),
        ranking_method = %result.ranking_method,
        "Query complete"
    );
    print_json(&result)
}

fn read_records(path: &Path) -> anyhow::Result<Vec<EvidenceRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EvidenceRecord = serde_json::from_str(&line).with_context(|| {
            format!("{}:{}: invalid evidence record", path.display(), line_no + 1)
        })?;
        records.push(record);
    }
    Ok(records)
}

async fn ingest(engine: &Arc<Engine>, path: &str) -> anyhow::Result<()> {
    let records = read_records(Path::new(path))?;
    tracing::info!(records = records.len(), path, "Ingesting evidence");

    let cancel = CancelFlag::new();
    let mut worker = {
        let engine = Arc::clone(engine);
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || engine.ingest(&records, &cancel))
    };

    let report = tokio::select! {
        joined = &mut worker => joined??,
        _ = signal::ctrl_c() => {
            tracing::warn!("Received Ctrl+C, stopping after the current chunk");
            cancel.cancel();
            worker.await??
        }
    };

    engine.persist()?;
    print_json(&report)
}

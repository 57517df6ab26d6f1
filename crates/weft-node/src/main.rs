//! # Weft Node
//!
//! Streams an LLM transcript through the directive parser, executes the
//! actions it contains and reports what happened.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use weft_engine::{Dispatcher, EngineContext, OutputSink, TracingSink};
use weft_parser::StreamParser;
use weft_runtime::{LocalRuntime, MemoryRuntime, Runtime};

mod chunk;
mod config;
mod report;

use config::WeftConfig;
use report::Report;

/// Execute the file and shell directives embedded in an LLM response.
#[derive(Parser, Debug)]
#[command(name = "weft-node")]
#[command(version, about, long_about = None)]
struct Args {
    /// Transcript to read; stdin when omitted
    input: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bytes per simulated stream chunk
    #[arg(long, default_value_t = 16)]
    chunk_size: usize,

    /// Working root for file and shell actions
    #[arg(long)]
    root: Option<PathBuf>,

    /// Execute against an in-memory runtime instead of the real filesystem
    #[arg(long)]
    dry_run: bool,

    /// Stop an artifact's queue at its first failed action
    #[arg(long)]
    halt_on_failure: bool,

    /// Copy command output to stderr
    #[arg(long)]
    echo_output: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    report: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Table,
    Json,
}

fn load_config(args: &Args) -> anyhow::Result<WeftConfig> {
    let mut config = match &args.config {
        Some(path) => WeftConfig::load(path)?,
        None => WeftConfig::default(),
    };
    if let Some(root) = &args.root {
        config.runtime.root = root.clone();
    }
    if args.halt_on_failure {
        config.engine.failure_policy = weft_engine::FailurePolicy::Halt;
    }
    Ok(config)
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_env("WEFT_LOG")
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn read_input(path: Option<&PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("reading stdin")?;
            Ok(input)
        }
    }
}

fn echo_sink() -> Arc<dyn OutputSink> {
    Arc::new(|artifact_id: &str, ordinal: u32, chunk: &str| {
        eprint!("[{artifact_id}#{ordinal}] {chunk}");
    })
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = load_config(&args)?;
    init_tracing(&config.log_filter);

    let input = read_input(args.input.as_ref()).await?;

    let runtime: Arc<dyn Runtime> = if args.dry_run {
        info!("🧪 Dry run: actions execute in memory");
        Arc::new(MemoryRuntime::new())
    } else {
        tokio::fs::create_dir_all(&config.runtime.root)
            .await
            .with_context(|| format!("creating {}", config.runtime.root.display()))?;
        info!(root = %config.runtime.root.display(), "📁 Executing in working root");
        Arc::new(LocalRuntime::with_config(config.runtime.clone()))
    };

    let sink: Arc<dyn OutputSink> = if args.echo_output {
        echo_sink()
    } else {
        Arc::new(TracingSink)
    };
    let ctx = EngineContext::new(runtime)
        .with_config(config.engine.clone())
        .with_sink(sink);
    let dispatcher = Dispatcher::with_context(ctx);

    let stream_id = Uuid::new_v4().to_string();
    let mut parser = StreamParser::with_config(config.parser.clone());
    let mut handler = &dispatcher;
    let mut stdout = std::io::stdout();

    info!(%stream_id, bytes = input.len(), "🚀 Streaming transcript");
    for piece in chunk::chunks(&input, args.chunk_size) {
        let text = parser.consume(&stream_id, piece, &mut handler);
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
    }
    stdout.write_all(parser.finalize(&stream_id).as_bytes())?;
    writeln!(stdout)?;

    tokio::select! {
        _ = dispatcher.settled() => {}
        _ = tokio::signal::ctrl_c() => {
            let cancelled = dispatcher.cancel_all();
            warn!(cancelled, "Interrupted; cancelling outstanding actions");
            dispatcher.settled().await;
        }
    }

    let report = Report::new(stream_id, dispatcher.snapshot());
    match args.report {
        ReportFormat::Table => write!(stdout, "{}", report.to_table())?,
        ReportFormat::Json => writeln!(stdout, "{}", report.to_json()?)?,
    }

    if report.has_failures() {
        warn!(failed = report.summary.failed, "❌ Some actions failed");
        Ok(ExitCode::FAILURE)
    } else {
        info!("✅ All actions finished");
        Ok(ExitCode::SUCCESS)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    run(Args::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "weft-node",
            "--root",
            "/tmp/out",
            "--halt-on-failure",
            "--report",
            "json",
        ]);
        let config = load_config(&args).unwrap();

        assert_eq!(config.runtime.root, PathBuf::from("/tmp/out"));
        assert_eq!(
            config.engine.failure_policy,
            weft_engine::FailurePolicy::Halt
        );
        assert_eq!(args.report, ReportFormat::Json);
        assert_eq!(args.chunk_size, 16);
    }

    #[test]
    fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.json");
        std::fs::write(&path, r#"{"runtime": {"root": "from-file"}}"#).unwrap();

        let args = Args::parse_from(["weft-node", "--config", path.to_str().unwrap()]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.runtime.root, PathBuf::from("from-file"));
    }
}

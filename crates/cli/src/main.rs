//! trendstream CLI
//!
//! Feeds a JSONL stream of raw post messages through the pipeline and
//! writes the published records to stdout, one line per record:
//! `<topic>\t<word>\t<value JSON>`.

use clap::{Parser, Subcommand};
use colored::Colorize;
use processor::{ConsoleSink, FilteredSink, PipelineSupervisor, ProcessorConfig, Sink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Topic label for windowed count records
const COUNTS_TOPIC: &str = "mention-counts";

/// Topic label for statistics records
const STATS_TOPIC: &str = "mention-stats";

#[derive(Parser)]
#[command(
    name = "trendstream",
    version,
    about = "Windowed word-mention counts and statistics over a post stream"
)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a JSONL input stream
    Run {
        /// Input file with one raw post message per line (defaults to stdin)
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Subscribe the counts output to a single keyword (exact match)
        #[arg(long, env = "TRENDSTREAM_SUBSCRIBE")]
        subscribe: Option<String>,

        /// Force-close windows still open when the input ends
        #[arg(long)]
        flush_open: bool,
    },

    /// Validate the configuration and print the effective values
    Check,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ProcessorConfig::load(cli.config)?;

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run {
            input,
            subscribe,
            flush_open,
        } => run_pipeline(config, input, subscribe, flush_open).await,
    }
}

async fn run_pipeline(
    mut config: ProcessorConfig,
    input: Option<PathBuf>,
    subscribe: Option<String>,
    flush_open: bool,
) -> anyhow::Result<()> {
    if subscribe.is_some() {
        config.subscribe = subscribe;
    }

    let counts_sink: Arc<dyn Sink> = match &config.subscribe {
        Some(word) => {
            info!(word = %word, "subscribed counts view");
            Arc::new(FilteredSink::new(
                Arc::new(ConsoleSink::new(COUNTS_TOPIC)),
                word.clone(),
            ))
        }
        None => Arc::new(ConsoleSink::new(COUNTS_TOPIC)),
    };
    let stats_sink: Arc<dyn Sink> = Arc::new(ConsoleSink::new(STATS_TOPIC));

    let mut supervisor =
        PipelineSupervisor::start(config, counts_sink, stats_sink).await?;

    let reader = open_input(&input).await?;
    let mut lines = reader.lines();
    let mut offset: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        supervisor.ingest_raw(line.as_bytes(), offset).await?;
        offset += 1;
    }

    if flush_open {
        warn!("flushing open windows at end of input");
        supervisor.flush_open().await?;
    }

    let summary = supervisor.shutdown().await?;
    info!(
        records = offset,
        decoded = summary.decoder.decoded,
        dead_letters = summary.decoder.dead_letters(),
        mentions = summary.mentions_processed(),
        late_dropped = summary.late_dropped(),
        windows_closed = summary.windows_closed(),
        published = summary.records_published(),
        "pipeline finished"
    );

    eprintln!(
        "{} {} records in, {} decoded, {} dead-lettered, {} mentions, {} late dropped, {} windows closed, {} records published",
        "Done:".green().bold(),
        offset,
        summary.decoder.decoded,
        summary.decoder.dead_letters(),
        summary.mentions_processed(),
        summary.late_dropped(),
        summary.windows_closed(),
        summary.records_published(),
    );

    Ok(())
}

async fn open_input(
    input: &Option<PathBuf>,
) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin>> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("trendstream=debug,processor=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

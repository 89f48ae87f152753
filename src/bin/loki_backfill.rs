//! loki-backfill binary
//!
//! Runs every rule of a rules file against Loki and writes the results as
//! time-series blocks under the output directory.
//!
//! ```bash
//! loki-backfill \
//!   --rules rules.yaml \
//!   --loki.url http://localhost:3100 \
//!   --start 2024-01-01T00:00:00Z \
//!   --end 2024-01-02T00:00:00Z \
//!   --output.dir data
//! ```

use loki_backfill::backfill::{Backfiller, RunSummary};
use loki_backfill::clock::SystemClock;
use loki_backfill::config::{
    parse_duration, BackfillOptions, ComponentFactory, TimeWindow, DEFAULT_BLOCK_DURATION,
    DEFAULT_STEP,
};
use loki_backfill::query::LokiClientConfig;
use loki_backfill::rules::RulesFile;
use loki_backfill::telemetry::{init_logging, LogFormat};
use loki_backfill::Result;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Backfill Loki metric queries into time-series blocks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rules file (YAML)
    #[arg(long)]
    rules: PathBuf,

    /// Loki base URL
    #[arg(long = "loki.url", env = "LOKI_URL")]
    loki_url: String,

    /// Window start, RFC 3339 or Unix seconds
    #[arg(long)]
    start: String,

    /// Window end, RFC 3339 or Unix seconds (default: now minus 3h)
    #[arg(long)]
    end: Option<String>,

    /// Directory blocks are written to
    #[arg(long = "output.dir", default_value = "data")]
    output_dir: PathBuf,

    /// Query step used when neither rule nor group sets one
    #[arg(long, default_value = DEFAULT_STEP)]
    step: String,

    /// Duration of each block
    #[arg(long = "block.duration", default_value = DEFAULT_BLOCK_DURATION)]
    block_duration: String,

    /// Basic auth user for Loki
    #[arg(long = "loki.username", env = "LOKI_USERNAME")]
    loki_username: Option<String>,

    /// Basic auth password for Loki
    #[arg(long = "loki.password", env = "LOKI_PASSWORD", hide_env_values = true)]
    loki_password: Option<String>,

    /// Timeout of each Loki request (e.g. "30s"); no timeout by default
    #[arg(long = "loki.timeout")]
    loki_timeout: Option<humantime::Duration>,

    /// Query and encode everything, but keep blocks in memory
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<RunSummary> {
    let log_format: LogFormat = args.log_format.parse()?;
    init_logging(&args.log_level, log_format)?;

    let window = TimeWindow::from_flags(&args.start, args.end.as_deref(), &SystemClock)?;
    let options = BackfillOptions::new(
        window,
        parse_duration("step", &args.step)?,
        parse_duration("block duration", &args.block_duration)?,
    )?;
    let rules = RulesFile::load(&args.rules)?;

    let loki_config = LokiClientConfig {
        base_url: args.loki_url,
        username: args.loki_username,
        password: args.loki_password,
        timeout: args.loki_timeout.map(Into::into),
    };

    info!(
        rules_file = %args.rules.display(),
        output_dir = %args.output_dir.display(),
        dry_run = args.dry_run,
        "Configuration loaded"
    );

    let query_client = ComponentFactory::create_query_client(loki_config)?;
    let block_store = ComponentFactory::create_block_store(&args.output_dir, args.dry_run)?;

    Backfiller::new(query_client, block_store, options)
        .run(&rules)
        .await
}

fn print_summary(summary: &RunSummary) {
    for rule in &summary.rules {
        println!(
            "{:<40} series={:<6} samples={:<10} blocks={}",
            rule.rule, rule.series, rule.samples, rule.blocks
        );
    }
    println!(
        "total: {} rules, {} samples, {} blocks",
        summary.rules.len(),
        summary.total_samples(),
        summary.total_blocks()
    );
}

//! PR-Harvest main entry point
//!
//! This is the command-line interface for the PR-Harvest pull-request crawler.

use anyhow::Context;
use clap::Parser;
use pr_harvest::config::{
    compute_config_hash, parse_config, parse_repository, resolve_token, validate, Config,
};
use pr_harvest::crawler::run_crawl;
use pr_harvest::output::{load_statistics, print_report, print_statistics};
use pr_harvest::storage::OutputLayout;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when the run finished but work remains for a later run
const EXIT_INCOMPLETE: u8 = 2;

/// PR-Harvest: a resumable pull-request history crawler
///
/// PR-Harvest extracts the pull-request history of one repository (metadata,
/// comments, review threads, commits and per-commit diffs) while staying
/// inside the API rate limit. Interrupted runs resume from the checkpoint.
#[derive(Parser, Debug)]
#[command(name = "pr-harvest")]
#[command(version)]
#[command(about = "A resumable pull-request history crawler", long_about = None)]
struct Cli {
    /// Repository to crawl, as owner/name
    #[arg(long, value_name = "OWNER/NAME")]
    repo: Option<String>,

    /// Output directory for the checkpoint, records and diffs
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Number of concurrent diff downloads
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Stop after recording this many new pull requests
    #[arg(long, value_name = "N")]
    limit: Option<u64>,

    /// Do not download commit diffs
    #[arg(long)]
    skip_diffs: bool,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start a fresh crawl, ignoring the checkpoint
    #[arg(long, conflicts_with = "stats")]
    fresh: bool,

    /// Show statistics from the output directory and exit
    #[arg(long)]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = build_config(&cli)?;

    if cli.stats {
        handle_stats(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    validate(&config).context("Invalid configuration")?;
    let token = resolve_token(&config.github)?;
    handle_crawl(config, token, cli.fresh).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pr_harvest=info,warn"),
            1 => EnvFilter::new("pr_harvest=debug,info"),
            2 => EnvFilter::new("pr_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the optional configuration file and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = parse_config(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            let hash = compute_config_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(slug) = &cli.repo {
        config.repository = parse_repository(slug)?;
    }
    if let Some(output) = &cli.output {
        config.output.directory = output.to_string_lossy().into_owned();
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.diff_concurrency = concurrency;
    }
    if let Some(limit) = cli.limit {
        config.crawler.limit = Some(limit);
    }
    if cli.skip_diffs {
        config.crawler.skip_diffs = true;
    }

    Ok(config)
}

/// Handles the --stats mode: shows statistics from the output directory
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let layout = OutputLayout::new(&config.output.directory);
    println!("Output: {}\n", layout.root().display());

    let stats = load_statistics(&layout)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, token: String, fresh: bool) -> anyhow::Result<ExitCode> {
    tracing::info!(
        "Repository: {}, output: {}, diff workers: {}",
        config.repository.slug(),
        config.output.directory,
        config.crawler.diff_concurrency
    );
    if let Some(limit) = config.crawler.limit {
        tracing::info!("Recording at most {} new pull requests", limit);
    }

    let report = run_crawl(config, token, fresh)
        .await
        .context("Crawl failed")?;
    print_report(&report);

    if report.is_complete() {
        tracing::info!("Crawl completed successfully");
        Ok(ExitCode::SUCCESS)
    } else if report.is_successful() {
        tracing::info!("Item limit reached; rerun to continue enumeration");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!(
            "Crawl incomplete: {} pending, {} failures this run",
            report.pending_total,
            report.item_failures
        );
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}

//! Swarm-Scraper main entry point
//!
//! This is the command-line interface for the Swarm-Scraper worker pool.

use anyhow::Context;
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swarm_scraper::config::{load_config_with_hash, Config};
use swarm_scraper::crawler::mock::{MockExtractor, MockFetcher};
use swarm_scraper::crawler::{Extractor, Fetcher, HtmlExtractor, HttpFetcher, Scheduler};
use swarm_scraper::output::{compute_statistics, print_statistics, EngineEvent, Severity, Snapshot};
use swarm_scraper::{ExtractionMode, JobId, JobStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Swarm-Scraper: a bounded concurrent scraping pool
///
/// Submits every target URL as a job, runs at most N of them at once and
/// extracts the requested data from each page.
#[derive(Parser, Debug)]
#[command(name = "swarm-scraper")]
#[command(version)]
#[command(about = "A bounded concurrent scraping pool", long_about = None)]
struct Cli {
    /// Target URLs (a scheme is optional)
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// File with more targets, separated by newlines or commas
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Extraction mode: title, meta-description, structured-data, header-hierarchy, links, custom-selector
    #[arg(short, long, default_value = "title")]
    mode: String,

    /// CSS selector for the custom-selector mode
    #[arg(short, long)]
    selector: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured concurrency cap
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,

    /// Retry rounds for jobs that failed with a timeout or network error
    #[arg(short, long, default_value_t = 0)]
    retries: u32,

    /// Write a JSON snapshot of every job when done
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Run the pool against simulated pages instead of the network
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from a snapshot file and exit
    #[arg(long, value_name = "FILE")]
    stats: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if let Some(path) = &cli.stats {
        return handle_stats(path);
    }

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((config, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => Config::default(),
    };
    if let Some(n) = cli.concurrency {
        config.pool.max_concurrency = n;
    }

    let mode = ExtractionMode::parse(&cli.mode, cli.selector.as_deref())?;
    let targets = collect_targets(&cli.urls, cli.input.as_deref())?;

    let (fetcher, extractor): (Arc<dyn Fetcher>, Arc<dyn Extractor>) = if cli.dry_run {
        tracing::info!("Dry run: pages are simulated");
        (
            Arc::new(MockFetcher::new().with_latency(Duration::from_millis(250))),
            Arc::new(MockExtractor::new()),
        )
    } else {
        (
            Arc::new(HttpFetcher::new(&config.user_agent, &config.pool)?),
            Arc::new(HtmlExtractor),
        )
    };

    run(config, fetcher, extractor, &targets, mode, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("swarm_scraper=info,warn"),
            1 => EnvFilter::new("swarm_scraper=debug,info"),
            2 => EnvFilter::new("swarm_scraper=trace,debug"),
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

/// Joins positional targets and the input file into one batch
fn collect_targets(urls: &[String], input: Option<&Path>) -> anyhow::Result<String> {
    let mut batch = urls.join("\n");
    if let Some(path) = input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read targets from {}", path.display()))?;
        batch.push('\n');
        batch.push_str(&content);
    }
    Ok(batch)
}

/// Handles --stats: prints statistics for an exported snapshot
fn handle_stats(path: &Path) -> anyhow::Result<()> {
    let snapshot = Snapshot::read_from(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    println!("Snapshot generated at {}\n", snapshot.generated_at);
    print_statistics(&compute_statistics(&snapshot.jobs));
    Ok(())
}

async fn run(
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    targets: &str,
    mode: ExtractionMode,
    cli: &Cli,
) -> anyhow::Result<()> {
    let interval = config.metrics.interval();
    let scheduler = Scheduler::new(config, fetcher, extractor)?;

    let printer = tokio::spawn(print_events(scheduler.clone()));

    let ids = scheduler.submit_batch(targets, mode)?;
    tracing::info!("Submitted {} job(s)", ids.len());

    let interrupted = !wait_with_progress(&scheduler, interval).await;

    let mut retried: HashSet<JobId> = HashSet::new();
    for round in 1..=cli.retries {
        if interrupted {
            break;
        }
        let new_ids = scheduler.retry_where(|job| {
            !retried.contains(&job.id) && job.error.as_ref().is_some_and(|e| e.kind.is_retryable())
        })?;
        if new_ids.is_empty() {
            break;
        }
        retried.extend(
            new_ids
                .iter()
                .filter_map(|id| scheduler.job(*id))
                .filter_map(|job| job.retry_of),
        );
        tracing::info!("Retry round {}: {} job(s)", round, new_ids.len());
        if !wait_with_progress(&scheduler, interval).await {
            break;
        }
    }

    scheduler.shutdown(true).await;
    printer.abort();

    let snapshot = scheduler.snapshot();
    if let Some(path) = &cli.snapshot {
        snapshot
            .write_to(path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        tracing::info!("Snapshot written to {}", path.display());
    }

    if !cli.quiet {
        print_results(&snapshot);
        println!();
        print_statistics(&compute_statistics(&snapshot.jobs));
    }

    Ok(())
}

/// Waits for the pool to go idle, logging progress at every interval
///
/// Returns false if the run was interrupted with Ctrl-C.
async fn wait_with_progress(scheduler: &Scheduler, interval: Duration) -> bool {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    let idle = scheduler.wait_idle();
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => return true,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling in-flight jobs");
                scheduler.shutdown(false).await;
                return false;
            }
            _ = ticker.tick() => {
                let m = scheduler.metrics();
                tracing::info!(
                    "Progress: {}/{} active, {} queued, {} succeeded, {} failed, {:.1}/min, {}% success",
                    m.active,
                    m.max_concurrency,
                    m.queued,
                    m.succeeded,
                    m.failed,
                    m.throughput_per_minute,
                    m.success_rate
                );
            }
        }
    }
}

/// Mirrors engine log lines onto the tracing output
async fn print_events(scheduler: Scheduler) {
    let mut events = scheduler.subscribe();
    loop {
        match events.recv().await {
            Ok(EngineEvent::Log(line)) => match line.severity {
                Severity::Error => tracing::warn!("{} {}", line.tag, line.message),
                Severity::Info | Severity::Success => {
                    tracing::info!("{} {}", line.tag, line.message)
                }
            },
            Ok(EngineEvent::Transition(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Event printer skipped {} event(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_results(snapshot: &Snapshot) {
    println!("=== Results ===\n");
    for job in &snapshot.jobs {
        match job.status {
            JobStatus::Succeeded => {
                println!("[ok]   {} ({})", job.url, job.mode);
                if let Some(fields) = &job.result {
                    for (name, value) in fields.iter() {
                        println!("         {}: {}", name, value);
                    }
                }
            }
            JobStatus::Failed => {
                let reason = job
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                println!("[fail] {} ({}): {}", job.url, job.mode, reason);
            }
            status => println!("[{}] {}", status, job.url),
        }
    }
}

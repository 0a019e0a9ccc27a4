use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};

use sharpe_search::analysis::{TimingSummary, analyze_results};
use sharpe_search::data::load_prices_csv;
use sharpe_search::report::{BenchmarkEntry, PortfolioReport, append_benchmark, write_report};
use sharpe_search::search::{DEFAULT_COMBINATION_BATCH, PROGRESS_QUIET_PERIOD, default_workers};
use sharpe_search::{ExecutionMode, ProgressSnapshot, SearchConfig, run_search};

#[derive(Parser, Debug)]
#[command(author, version, about = "Max-Sharpe stock selection by exhaustive Monte Carlo search")]
struct Cli {
    /// Append logs to this file as well as stdout.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search every combination of the price universe for the best portfolio.
    Optimize(OptimizeArgs),
    /// Summarize result files and benchmarks from earlier runs.
    Analyze {
        #[arg(long, default_value = "results")]
        results: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct OptimizeArgs {
    /// Wide CSV: a date column, then one price column per ticker.
    #[arg(long)]
    prices: PathBuf,
    /// Stocks per portfolio.
    #[arg(long, default_value_t = 20)]
    size: usize,
    /// Weight vectors sampled per combination.
    #[arg(long, default_value_t = 10_000)]
    samples: usize,
    /// Weight vectors scored per vectorized call.
    #[arg(long, default_value_t = 1_000)]
    batch_size: usize,
    /// Combinations held in memory at once.
    #[arg(long, default_value_t = DEFAULT_COMBINATION_BATCH)]
    combination_batch: usize,
    /// Stop after this many combinations (0 = all).
    #[arg(long, default_value_t = 0)]
    limit: usize,
    /// Report progress every N combinations.
    #[arg(long, default_value_t = 1_000)]
    progress_every: usize,
    #[arg(long)]
    sequential: bool,
    /// Worker threads in parallel mode (default: half the hardware threads).
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "results")]
    out: PathBuf,
}

impl OptimizeArgs {
    fn search_config(&self) -> SearchConfig {
        let execution = if self.sequential {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel {
                workers: self.workers.unwrap_or_else(default_workers),
            }
        };
        SearchConfig {
            selection_size: self.size,
            samples_per_combination: self.samples,
            batch_size: self.batch_size,
            combination_batch_size: self.combination_batch,
            max_combinations: (self.limit > 0).then_some(self.limit),
            progress_interval: self.progress_every,
            progress_time_interval: PROGRESS_QUIET_PERIOD,
            execution,
            seed: self.seed,
        }
    }
}

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let (writer, guard) = non_blocking(file);
        // The writer must outlive every log call; keep the guard for the process lifetime.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn print_progress(snap: &ProgressSnapshot) {
    let eta = snap
        .remaining
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());
    match &snap.best {
        Some(best) => info!(
            "[{}/{} {:.1}%] elapsed={} eta={} best_sharpe={:.4} return={:.2}% vol={:.2}%",
            snap.processed,
            snap.total,
            snap.percent(),
            format_duration(snap.elapsed),
            eta,
            best.metrics.sharpe_ratio,
            best.metrics.annual_return * 100.0,
            best.metrics.annual_volatility * 100.0,
        ),
        None => info!(
            "[{}/{} {:.1}%] elapsed={} eta={} no candidate yet",
            snap.processed,
            snap.total,
            snap.percent(),
            format_duration(snap.elapsed),
            eta,
        ),
    }
}

fn optimize(args: &OptimizeArgs) -> Result<()> {
    let config = args.search_config();
    config.validate()?;

    let universe = load_prices_csv(&args.prices)?;
    if args.size > universe.len() {
        bail!(
            "--size {} exceeds the {} tickers in {}",
            args.size,
            universe.len(),
            args.prices.display()
        );
    }

    let summary = run_search(&universe, &config, print_progress)?;

    let Some(best) = summary.best.as_ref() else {
        warn!("no valid portfolio found");
        return Ok(());
    };

    let report = PortfolioReport::new(best, &config, &summary, Utc::now());
    let report_path = write_report(&args.out, &report)
        .with_context(|| format!("failed to write report under {}", args.out.display()))?;
    let log_path = append_benchmark(&args.out, &BenchmarkEntry::from_report(&report))
        .context("failed to append benchmark log")?;

    info!(
        "best portfolio: sharpe={:.4} return={:.2}% vol={:.2}% ({} combinations, {} failed, {})",
        best.metrics.sharpe_ratio,
        best.metrics.annual_return * 100.0,
        best.metrics.annual_volatility * 100.0,
        summary.processed,
        summary.failed,
        format_duration(summary.elapsed),
    );
    for stock in report.ranked_stocks() {
        info!("  {:<8} {:>6.2}%", stock.ticker, stock.weight * 100.0);
    }
    info!("saved result: {}", report_path.display());
    info!("benchmark log: {}", log_path.display());
    Ok(())
}

fn analyze(results: &Path) -> Result<()> {
    let summary = analyze_results(results)
        .with_context(|| format!("failed to analyze {}", results.display()))?;

    match &summary.best {
        Some((path, report)) => {
            info!(
                "best portfolio found in {} (sharpe={:.4})",
                path.display(),
                report.sharpe_ratio
            );
            info!("top 5 stocks:");
            for stock in report.ranked_stocks().iter().take(5) {
                info!("  {}: {:.2}%", stock.ticker, stock.weight * 100.0);
            }
        }
        None => warn!("no portfolio results in {}", results.display()),
    }

    match &summary.timing {
        TimingSummary::Missing => warn!("benchmark log not found in {}", results.display()),
        TimingSummary::TooFew { found } => warn!(
            "not enough benchmarks: found {found}, need at least {}",
            sharpe_search::analysis::MIN_BENCHMARKS
        ),
        TimingSummary::Stats { per_mode, speedup } => {
            for s in per_mode {
                info!(
                    "{:<10} runs={} mean={:.1}s ({:.2}min) std={:.1}s min={:.1}s max={:.1}s",
                    s.mode,
                    s.count,
                    s.mean,
                    s.mean / 60.0,
                    s.std,
                    s.min,
                    s.max
                );
            }
            if let Some(x) = speedup {
                info!("parallel speedup: {x:.2}x");
            }
        }
    }

    for s in &summary.sharpe_by_mode {
        info!(
            "sharpe {:<10} runs={} mean={:.4} std={:.4} min={:.4} max={:.4}",
            s.mode, s.count, s.mean, s.std, s.min, s.max
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file)?;

    match &cli.command {
        Commands::Optimize(args) => optimize(args),
        Commands::Analyze { results } => analyze(results),
    }
}

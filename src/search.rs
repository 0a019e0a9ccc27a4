use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::asset::Asset;
use crate::combination::{CombinationIter, planned_combinations, resolve, tickers};
use crate::error::OptimizerError;
use crate::metrics::{PortfolioMetrics, ReturnMatrix, score_batch};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::weights::WeightSampler;

pub const DEFAULT_COMBINATION_BATCH: usize = 10;
pub const DEFAULT_PROGRESS_EVERY: usize = 1_000;
pub const PROGRESS_QUIET_PERIOD: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Members of each combination group run on a pool of `workers` threads.
    Parallel { workers: usize },
    /// One combination at a time; tie-breaks are fully deterministic.
    Sequential,
}

impl ExecutionMode {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionMode::Parallel { .. } => "parallel",
            ExecutionMode::Sequential => "sequential",
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            ExecutionMode::Parallel { workers } => *workers,
            ExecutionMode::Sequential => 1,
        }
    }
}

/// Half the hardware threads, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub selection_size: usize,
    pub samples_per_combination: usize,
    /// Weight vectors scored per vectorized call.
    pub batch_size: usize,
    /// Combinations held in memory at once.
    pub combination_batch_size: usize,
    pub max_combinations: Option<usize>,
    pub progress_interval: usize,
    pub progress_time_interval: Duration,
    pub execution: ExecutionMode,
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            selection_size: 20,
            samples_per_combination: 10_000,
            batch_size: 1_000,
            combination_batch_size: DEFAULT_COMBINATION_BATCH,
            max_combinations: None,
            progress_interval: DEFAULT_PROGRESS_EVERY,
            progress_time_interval: PROGRESS_QUIET_PERIOD,
            execution: ExecutionMode::Parallel {
                workers: default_workers(),
            },
            seed: None,
        }
    }
}

impl SearchConfig {
    /// The combination cap, with `Some(0)` read as unlimited.
    pub fn combination_limit(&self) -> Option<usize> {
        self.max_combinations.filter(|&m| m > 0)
    }

    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.samples_per_combination == 0 {
            return Err(OptimizerError::input("samples per combination must be >= 1"));
        }
        if self.batch_size == 0 {
            return Err(OptimizerError::input("batch size must be >= 1"));
        }
        if self.combination_batch_size == 0 {
            return Err(OptimizerError::input("combination batch size must be >= 1"));
        }
        if self.execution.workers() == 0 {
            return Err(OptimizerError::input("worker count must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioCandidate {
    pub tickers: Vec<String>,
    pub weights: Vec<f64>,
    pub metrics: PortfolioMetrics,
}

impl PortfolioCandidate {
    pub fn holdings(&self) -> impl Iterator<Item = (&str, f64)> {
        self.tickers
            .iter()
            .map(String::as_str)
            .zip(self.weights.iter().copied())
    }

    fn beats(&self, other: &PortfolioCandidate) -> bool {
        self.metrics.sharpe_ratio > other.metrics.sharpe_ratio
    }
}

#[derive(Clone, Debug)]
pub struct SearchSummary {
    pub best: Option<PortfolioCandidate>,
    pub processed: usize,
    /// Combinations that produced no candidate.
    pub failed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub seed: u64,
}

struct SharedState {
    best: Option<PortfolioCandidate>,
    tracker: ProgressTracker,
    failed: usize,
}

/// Independent RNG stream per combination, so parallel and sequential runs
/// with the same seed draw the same weights.
fn combination_seed(base: u64, index: usize) -> u64 {
    let mut z = base.wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Sample and score one combination, keeping its best vector by Sharpe ratio.
pub fn evaluate_combination(
    universe: &[Asset],
    combo: &[usize],
    config: &SearchConfig,
    rng: &mut StdRng,
) -> Result<PortfolioCandidate, OptimizerError> {
    let computation_error = |reason: &str| OptimizerError::Computation {
        combination: tickers(universe, combo),
        reason: reason.to_string(),
    };

    let matrix = ReturnMatrix::from_assets(&resolve(universe, combo));
    if matrix.periods() == 0 {
        return Err(computation_error("no common return periods"));
    }

    let sampler = WeightSampler::new(combo.len());
    let mut local_best: Option<(PortfolioMetrics, Vec<f64>)> = None;
    let mut fallbacks = 0usize;
    let mut remaining = config.samples_per_combination;

    while remaining > 0 {
        let count = remaining.min(config.batch_size);
        let batch = sampler.sample_batch(count, rng);
        fallbacks += batch.fallbacks();
        for (i, m) in score_batch(&matrix, &batch).into_iter().enumerate() {
            if !m.is_finite() {
                continue;
            }
            if local_best
                .as_ref()
                .is_none_or(|(best, _)| m.sharpe_ratio > best.sharpe_ratio)
            {
                local_best = Some((m, batch.row(i).to_vec()));
            }
        }
        remaining -= count;
    }

    if fallbacks > 0 {
        debug!(
            combination = ?tickers(universe, combo),
            fallbacks, "equal-weight fallback used"
        );
    }

    let (metrics, weights) = local_best.ok_or_else(|| computation_error("no finite score"))?;
    Ok(PortfolioCandidate {
        tickers: tickers(universe, combo),
        weights,
        metrics,
    })
}

/// Advance the counter, keep the better candidate, and emit a snapshot when
/// one is due, all under the same lock.
fn publish<F>(state: &Mutex<SharedState>, local: Option<PortfolioCandidate>, on_progress: &F)
where
    F: Fn(&ProgressSnapshot) + Sync,
{
    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    match local {
        Some(candidate) => {
            if guard.best.as_ref().is_none_or(|best| candidate.beats(best)) {
                guard.best = Some(candidate);
            }
        }
        None => guard.failed += 1,
    }
    let now = Instant::now();
    if guard.tracker.record_at(now) {
        let snapshot = guard.tracker.snapshot_at(now, guard.best.clone());
        on_progress(&snapshot);
    }
}

/// Exhaustive search over every `selection_size` subset of `universe`.
///
/// A combination that fails to score is logged and skipped. `best` is `None`
/// only when there were no combinations or every one of them failed.
pub fn run_search<F>(
    universe: &[Asset],
    config: &SearchConfig,
    on_progress: F,
) -> Result<SearchSummary, OptimizerError>
where
    F: Fn(&ProgressSnapshot) + Sync,
{
    config.validate()?;

    let started = Instant::now();
    let k = config.selection_size;
    let limit = config.combination_limit();
    let total = planned_combinations(universe.len(), k, limit);
    let seed = config.seed.unwrap_or_else(rand::random);

    if total == 0 {
        info!(assets = universe.len(), k, "no combinations to evaluate");
        return Ok(SearchSummary {
            best: None,
            processed: 0,
            failed: 0,
            total: 0,
            elapsed: started.elapsed(),
            seed,
        });
    }

    info!(
        assets = universe.len(),
        k,
        total,
        samples = config.samples_per_combination,
        mode = config.execution.label(),
        workers = config.execution.workers(),
        seed,
        "starting search"
    );

    let pool = match config.execution {
        ExecutionMode::Parallel { workers } => {
            Some(ThreadPoolBuilder::new().num_threads(workers).build()?)
        }
        ExecutionMode::Sequential => None,
    };

    let state = Mutex::new(SharedState {
        best: None,
        tracker: ProgressTracker::starting_at(
            started,
            total,
            config.progress_interval,
            config.progress_time_interval,
        ),
        failed: 0,
    });

    let process = |index: usize, combo: &[usize]| {
        let mut rng = StdRng::seed_from_u64(combination_seed(seed, index));
        let local = match evaluate_combination(universe, combo, config, &mut rng) {
            Ok(candidate) => Some(candidate),
            Err(err) => {
                warn!(%err, "combination skipped");
                None
            }
        };
        publish(&state, local, &on_progress);
    };

    let mut combos =
        CombinationIter::new(universe.len(), k).with_limit(limit.unwrap_or(0));
    let mut offset = 0usize;

    while let Some(group) = combos.next_batch(config.combination_batch_size) {
        match &pool {
            Some(pool) => pool.install(|| {
                group
                    .par_iter()
                    .enumerate()
                    .for_each(|(i, combo)| process(offset + i, combo.as_slice()))
            }),
            None => {
                for (i, combo) in group.iter().enumerate() {
                    process(offset + i, combo.as_slice());
                }
            }
        }
        offset += group.len();
        debug!(processed = offset, total, "combination group finished");
        drop(group);
    }

    let state = state.into_inner().unwrap_or_else(PoisonError::into_inner);
    let summary = SearchSummary {
        best: state.best,
        processed: state.tracker.processed(),
        failed: state.failed,
        total,
        elapsed: started.elapsed(),
        seed,
    };

    match &summary.best {
        Some(best) => info!(
            processed = summary.processed,
            failed = summary.failed,
            sharpe = best.metrics.sharpe_ratio,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "search complete"
        ),
        None => warn!(
            processed = summary.processed,
            failed = summary.failed,
            "search complete without a valid portfolio"
        ),
    }

    Ok(summary)
}

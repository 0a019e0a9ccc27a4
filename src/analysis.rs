use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::OptimizerError;
use crate::report::{
    BENCHMARK_LOG, PortfolioReport, REPORT_PREFIX, REPORT_SUFFIX, read_benchmarks, read_report,
};

/// Benchmarks needed before timing statistics are reported.
pub const MIN_BENCHMARKS: usize = 5;

const TIMED_MODES: [&str; 2] = ["parallel", "sequential"];

#[derive(Clone, Debug, PartialEq)]
pub struct ModeStats {
    pub mode: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 for a single value.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl ModeStats {
    fn from_values(mode: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count < 2 {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
        };
        Some(Self {
            mode: mode.to_string(),
            count,
            mean,
            std,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

#[derive(Clone, Debug)]
pub enum TimingSummary {
    /// No benchmark log in the results directory.
    Missing,
    /// Fewer than `MIN_BENCHMARKS` parallel/sequential rows.
    TooFew { found: usize },
    Stats {
        /// Execution time in seconds, per mode.
        per_mode: Vec<ModeStats>,
        /// mean(sequential) / mean(parallel), when both modes were benchmarked.
        speedup: Option<f64>,
    },
}

#[derive(Clone, Debug)]
pub struct ResultsSummary {
    pub best: Option<(PathBuf, PortfolioReport)>,
    pub timing: TimingSummary,
    pub sharpe_by_mode: Vec<ModeStats>,
    pub reports: usize,
}

fn is_report_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(REPORT_PREFIX) && n.ends_with(REPORT_SUFFIX))
}

/// Every readable result file in `dir`, sorted by path. Unreadable files are
/// logged and skipped.
pub fn load_reports(dir: &Path) -> Result<Vec<(PathBuf, PortfolioReport)>, OptimizerError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_report_file(p))
        .collect();
    paths.sort();

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        match read_report(&path) {
            Ok(report) => reports.push((path, report)),
            Err(err) => warn!(path = %path.display(), %err, "skipping unreadable report"),
        }
    }
    Ok(reports)
}

fn summarize_timing(dir: &Path) -> Result<TimingSummary, OptimizerError> {
    let path = dir.join(BENCHMARK_LOG);
    if !path.exists() {
        return Ok(TimingSummary::Missing);
    }

    let mut secs: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let entries = read_benchmarks(&path)?;
    for entry in &entries {
        if let Some(mode) = TIMED_MODES.iter().find(|m| **m == entry.execution_mode) {
            secs.entry(*mode).or_default().push(entry.time_ms as f64 / 1000.0);
        }
    }

    let found: usize = secs.values().map(Vec::len).sum();
    if found < MIN_BENCHMARKS {
        return Ok(TimingSummary::TooFew { found });
    }

    let per_mode: Vec<ModeStats> = secs
        .iter()
        .filter_map(|(mode, values)| ModeStats::from_values(mode, values))
        .collect();
    let mean_of = |mode: &str| per_mode.iter().find(|s| s.mode == mode).map(|s| s.mean);
    let speedup = match (mean_of("sequential"), mean_of("parallel")) {
        (Some(seq), Some(par)) if par > 0.0 => Some(seq / par),
        _ => None,
    };
    Ok(TimingSummary::Stats { per_mode, speedup })
}

/// Best run, timing comparison, and Sharpe spread across a results directory.
pub fn analyze_results(dir: &Path) -> Result<ResultsSummary, OptimizerError> {
    let reports = load_reports(dir)?;

    let best = reports
        .iter()
        .filter(|(_, r)| r.sharpe_ratio.is_finite())
        .fold(None::<&(PathBuf, PortfolioReport)>, |acc, cur| match acc {
            Some(b) if b.1.sharpe_ratio >= cur.1.sharpe_ratio => Some(b),
            _ => Some(cur),
        })
        .cloned();

    let mut sharpe: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (_, report) in &reports {
        let mode = if report.execution_mode.is_empty() {
            "unknown".to_string()
        } else {
            report.execution_mode.clone()
        };
        sharpe.entry(mode).or_default().push(report.sharpe_ratio);
    }
    let sharpe_by_mode = sharpe
        .iter()
        .filter_map(|(mode, values)| ModeStats::from_values(mode, values))
        .collect();

    Ok(ResultsSummary {
        best,
        timing: summarize_timing(dir)?,
        sharpe_by_mode,
        reports: reports.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_use_sample_deviation() {
        let s = ModeStats::from_values("parallel", &[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(s.count, 3);
        assert!((s.mean - 4.0).abs() < 1e-12);
        assert!((s.std - 2.0).abs() < 1e-12);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 6.0);

        let one = ModeStats::from_values("sequential", &[3.0]).unwrap();
        assert_eq!(one.std, 0.0);
        assert!(ModeStats::from_values("x", &[]).is_none());
    }

    #[test]
    fn report_files_are_recognized_by_name() {
        assert!(is_report_file(Path::new("r/optimal_portfolio_20250101_000000.json")));
        assert!(!is_report_file(Path::new("r/benchmarks.log")));
        assert!(!is_report_file(Path::new("r/optimal_portfolio_x.csv")));
    }
}

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::search::{PortfolioCandidate, SearchConfig, SearchSummary};

pub const REPORT_PREFIX: &str = "optimal_portfolio_";
pub const REPORT_SUFFIX: &str = ".json";
pub const BENCHMARK_LOG: &str = "benchmarks.log";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StockWeight {
    pub ticker: String,
    pub weight: f64,
}

/// Result file for one run. Missing keys read back as defaults so older or
/// partial files still load.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortfolioReport {
    pub timestamp: DateTime<Utc>,
    pub execution_mode: String,
    pub time_elapsed_ms: u64,
    pub sharpe_ratio: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub selection_size: usize,
    pub samples_per_combination: usize,
    pub combinations_processed: usize,
    pub stocks: Vec<StockWeight>,
}

impl PortfolioReport {
    pub fn new(
        best: &PortfolioCandidate,
        config: &SearchConfig,
        summary: &SearchSummary,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            execution_mode: config.execution.label().to_string(),
            time_elapsed_ms: summary.elapsed.as_millis() as u64,
            sharpe_ratio: best.metrics.sharpe_ratio,
            annual_return: best.metrics.annual_return,
            annual_volatility: best.metrics.annual_volatility,
            selection_size: config.selection_size,
            samples_per_combination: config.samples_per_combination,
            combinations_processed: summary.processed,
            stocks: best
                .holdings()
                .map(|(ticker, weight)| StockWeight {
                    ticker: ticker.to_string(),
                    weight,
                })
                .collect(),
        }
    }

    /// Holdings by descending weight.
    pub fn ranked_stocks(&self) -> Vec<StockWeight> {
        let mut stocks = self.stocks.clone();
        stocks.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        stocks
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BenchmarkEntry {
    pub timestamp: DateTime<Utc>,
    pub execution_mode: String,
    pub time_ms: u64,
    pub selection_size: usize,
    pub samples_per_combination: usize,
    pub combinations_processed: usize,
    pub sharpe_ratio: f64,
}

impl BenchmarkEntry {
    pub fn from_report(report: &PortfolioReport) -> Self {
        Self {
            timestamp: report.timestamp,
            execution_mode: report.execution_mode.clone(),
            time_ms: report.time_elapsed_ms,
            selection_size: report.selection_size,
            samples_per_combination: report.samples_per_combination,
            combinations_processed: report.combinations_processed,
            sharpe_ratio: report.sharpe_ratio,
        }
    }
}

pub fn report_file_name(timestamp: DateTime<Utc>) -> String {
    format!(
        "{REPORT_PREFIX}{}{REPORT_SUFFIX}",
        timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Write `report` as pretty JSON under `dir`, creating the directory.
pub fn write_report(dir: &Path, report: &PortfolioReport) -> Result<PathBuf, OptimizerError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(report.timestamp));
    fs::write(&path, serde_json::to_string_pretty(report)?)?;
    Ok(path)
}

pub fn read_report(path: &Path) -> Result<PortfolioReport, OptimizerError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Append one row to `dir/benchmarks.log`; the header is written only when
/// the log is new.
pub fn append_benchmark(dir: &Path, entry: &BenchmarkEntry) -> Result<PathBuf, OptimizerError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(BENCHMARK_LOG);
    let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    wtr.serialize(entry)?;
    wtr.flush()?;
    Ok(path)
}

pub fn read_benchmarks(path: &Path) -> Result<Vec<BenchmarkEntry>, OptimizerError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut entries = Vec::new();
    for rec in rdr.deserialize() {
        let entry: BenchmarkEntry = rec?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn file_name_uses_compact_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(report_file_name(ts), "optimal_portfolio_20250309_140507.json");
    }

    #[test]
    fn report_keys_are_pascal_case() {
        let report = PortfolioReport {
            execution_mode: "parallel".to_string(),
            sharpe_ratio: 1.5,
            stocks: vec![StockWeight {
                ticker: "AAA".to_string(),
                weight: 0.2,
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["SharpeRatio"], 1.5);
        assert_eq!(json["ExecutionMode"], "parallel");
        assert_eq!(json["Stocks"][0]["Ticker"], "AAA");
        assert!(json.get("TimeElapsedMs").is_some());
    }

    #[test]
    fn partial_report_reads_with_defaults() {
        let report: PortfolioReport = serde_json::from_str(r#"{"SharpeRatio": 2.0}"#).unwrap();
        assert_eq!(report.sharpe_ratio, 2.0);
        assert!(report.stocks.is_empty());
        assert_eq!(report.execution_mode, "");
    }

    #[test]
    fn ranked_stocks_sort_descending() {
        let report = PortfolioReport {
            stocks: vec![
                StockWeight {
                    ticker: "A".to_string(),
                    weight: 0.1,
                },
                StockWeight {
                    ticker: "B".to_string(),
                    weight: 0.2,
                },
            ],
            ..Default::default()
        };
        let ranked = report.ranked_stocks();
        assert_eq!(ranked[0].ticker, "B");
        assert_eq!(ranked[1].ticker, "A");
    }
}

use std::sync::Mutex;

use sharpe_search::search::PROGRESS_QUIET_PERIOD;
use sharpe_search::{Asset, ExecutionMode, SearchConfig, run_search};

fn abc() -> Vec<Asset> {
    vec![
        Asset::from_returns("A", vec![0.01, -0.01]),
        Asset::from_returns("B", vec![0.02, 0.0]),
        Asset::from_returns("C", vec![-0.01, 0.01]),
    ]
}

fn config(k: usize, execution: ExecutionMode) -> SearchConfig {
    SearchConfig {
        selection_size: k,
        samples_per_combination: 1,
        batch_size: 1,
        combination_batch_size: 2,
        max_combinations: None,
        progress_interval: 1,
        progress_time_interval: PROGRESS_QUIET_PERIOD,
        execution,
        seed: Some(2024),
    }
}

fn wide_universe(n: usize) -> Vec<Asset> {
    (0..n)
        .map(|i| {
            let prices = (0..80)
                .map(|t| 100.0 + ((i * 13 + t * (i + 2)) % 29) as f64 - 0.05 * t as f64)
                .collect();
            Asset::from_prices(format!("S{i:02}"), prices)
        })
        .collect()
}

#[test]
fn three_assets_pairwise_matches_hand_computation() {
    // Two assets cannot satisfy the 20% cap, so every vector is the
    // equal-weight fallback [0.5, 0.5].
    //   {A,B}: daily [0.015, -0.005] -> mean 0.005, sample variance 0.0002
    //   {A,C}: daily [0, 0]          -> zero volatility, Sharpe 0
    //   {B,C}: daily [0.005, 0.005]  -> zero volatility, Sharpe 0
    let expected_ret = 0.005 * 252.0;
    let expected_vol = 0.0002_f64.sqrt() * 252.0_f64.sqrt();
    let expected_sharpe = expected_ret / expected_vol;

    let seen = Mutex::new(Vec::new());
    let summary = run_search(&abc(), &config(2, ExecutionMode::Sequential), |snap| {
        seen.lock().unwrap().push(snap.processed);
    })
    .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(seen.into_inner().unwrap(), vec![1, 2, 3]);

    let best = summary.best.expect("a candidate");
    assert_eq!(best.tickers, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(best.weights, vec![0.5, 0.5]);
    assert!((best.metrics.annual_return - expected_ret).abs() < 1e-9);
    assert!((best.metrics.annual_volatility - expected_vol).abs() < 1e-9);
    assert!((best.metrics.sharpe_ratio - expected_sharpe).abs() < 1e-9);
}

#[test]
fn parallel_run_finds_same_pair() {
    let summary = run_search(
        &abc(),
        &config(2, ExecutionMode::Parallel { workers: 2 }),
        |_| {},
    )
    .unwrap();
    let best = summary.best.unwrap();
    assert_eq!(best.tickers, vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn limit_processes_only_the_prefix() {
    let assets = wide_universe(8);
    let mut cfg = config(5, ExecutionMode::Sequential);
    cfg.samples_per_combination = 30;
    cfg.batch_size = 7;
    cfg.max_combinations = Some(4);

    let summary = run_search(&assets, &cfg, |_| {}).unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.processed, 4);

    // The first four lexicographic 5-subsets of S00..S07 all start with S00..S03.
    let best = summary.best.unwrap();
    assert_eq!(best.tickers.len(), 5);
    assert_eq!(&best.tickers[..4], &["S00", "S01", "S02", "S03"]);
    assert!(["S04", "S05", "S06", "S07"].contains(&best.tickers[4].as_str()));
    assert!(sharpe_search::weights::is_valid(&best.weights));
}

#[test]
fn limit_above_total_is_harmless() {
    let mut cfg = config(2, ExecutionMode::Sequential);
    cfg.max_combinations = Some(100);
    let summary = run_search(&abc(), &cfg, |_| {}).unwrap();
    assert_eq!(summary.processed, 3);
}

#[test]
fn zero_limit_runs_the_full_search() {
    let assets = wide_universe(6);
    let mut cfg = config(5, ExecutionMode::Sequential);
    cfg.samples_per_combination = 20;
    cfg.batch_size = 8;
    cfg.max_combinations = Some(0);

    let summary = run_search(&assets, &cfg, |_| {}).unwrap();
    assert_eq!(summary.total, 6);
    assert_eq!(summary.processed, 6);
    assert!(summary.best.is_some());
}

#[test]
fn empty_inputs_find_nothing_without_error() {
    let summary = run_search(&abc(), &config(0, ExecutionMode::Sequential), |_| {}).unwrap();
    assert!(summary.best.is_none());
    assert_eq!(summary.processed, 0);

    let summary = run_search(&[], &config(2, ExecutionMode::Sequential), |_| {}).unwrap();
    assert!(summary.best.is_none());

    let summary = run_search(&abc(), &config(4, ExecutionMode::Sequential), |_| {}).unwrap();
    assert!(summary.best.is_none());
}

#[test]
fn seeded_runs_are_reproducible() {
    let assets = wide_universe(7);
    let mut cfg = config(5, ExecutionMode::Sequential);
    cfg.samples_per_combination = 50;
    cfg.batch_size = 16;

    let a = run_search(&assets, &cfg, |_| {}).unwrap().best.unwrap();
    let b = run_search(&assets, &cfg, |_| {}).unwrap().best.unwrap();
    assert_eq!(a, b);
}

use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::weights::WeightBatch;

/// Trading periods per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub sharpe_ratio: f64,
}

impl PortfolioMetrics {
    pub fn is_finite(&self) -> bool {
        self.annual_return.is_finite()
            && self.annual_volatility.is_finite()
            && self.sharpe_ratio.is_finite()
    }
}

/// Return rows for one combination, truncated to the periods all rows share.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnMatrix {
    assets: usize,
    periods: usize,
    data: Vec<f64>,
}

impl ReturnMatrix {
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let periods = rows.iter().map(|r| r.as_ref().len()).min().unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * periods);
        for row in rows {
            data.extend_from_slice(&row.as_ref()[..periods]);
        }
        Self {
            assets: rows.len(),
            periods,
            data,
        }
    }

    pub fn from_assets(assets: &[&Asset]) -> Self {
        let rows: Vec<&[f64]> = assets.iter().map(|a| a.returns()).collect();
        Self::from_rows(&rows)
    }

    pub fn assets(&self) -> usize {
        self.assets
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn is_empty(&self) -> bool {
        self.assets == 0
    }

    pub fn row(&self, asset: usize) -> &[f64] {
        &self.data[asset * self.periods..(asset + 1) * self.periods]
    }

    /// Weighted sum across rows for every common period, written into `out`.
    pub fn portfolio_returns_into(&self, weights: &[f64], out: &mut Vec<f64>) {
        out.clear();
        out.resize(self.periods, 0.0);
        for (asset, w) in weights.iter().enumerate().take(self.assets) {
            for (acc, r) in out.iter_mut().zip(self.row(asset)) {
                *acc += w * r;
            }
        }
    }

    pub fn portfolio_returns(&self, weights: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.periods);
        self.portfolio_returns_into(weights, &mut out);
        out
    }

    /// Per-asset mean period return.
    pub fn mean_returns(&self) -> Vec<f64> {
        (0..self.assets).map(|i| mean(self.row(i))).collect()
    }

    /// Sample covariance (n - 1 denominator) of the rows, row-major `assets x assets`.
    /// All zeros with fewer than two periods.
    pub fn covariance(&self) -> Vec<f64> {
        let n = self.assets;
        let mut cov = vec![0.0; n * n];
        if self.periods < 2 {
            return cov;
        }
        let means = self.mean_returns();
        let denom = (self.periods - 1) as f64;
        for i in 0..n {
            for j in i..n {
                let c = self
                    .row(i)
                    .iter()
                    .zip(self.row(j))
                    .map(|(a, b)| (a - means[i]) * (b - means[j]))
                    .sum::<f64>()
                    / denom;
                cov[i * n + j] = c;
                cov[j * n + i] = c;
            }
        }
        cov
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn sample_std(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let ss: f64 = xs.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

fn sharpe(annual_return: f64, annual_volatility: f64) -> f64 {
    if annual_volatility == 0.0 {
        0.0
    } else {
        annual_return / annual_volatility
    }
}

/// Annualized statistics of a realized period-return series.
pub fn metrics_from_returns(daily: &[f64]) -> PortfolioMetrics {
    let m = mean(daily);
    let annual_return = m * TRADING_DAYS;
    let annual_volatility = sample_std(daily, m) * TRADING_DAYS.sqrt();
    PortfolioMetrics {
        annual_return,
        annual_volatility,
        sharpe_ratio: sharpe(annual_return, annual_volatility),
    }
}

/// Score every vector of `batch` against `matrix`, in input order.
///
/// Empty when the matrix has no rows, the batch is empty, or the vector
/// length does not match the row count.
pub fn score_batch(matrix: &ReturnMatrix, batch: &WeightBatch) -> Vec<PortfolioMetrics> {
    if matrix.is_empty() || batch.is_empty() || batch.vector_size() != matrix.assets() {
        return Vec::new();
    }
    let mut daily = Vec::with_capacity(matrix.periods());
    batch
        .rows()
        .map(|w| {
            matrix.portfolio_returns_into(w, &mut daily);
            metrics_from_returns(&daily)
        })
        .collect()
}

/// Mean-variance form: `w·μ` and `sqrt(wᵀΣw)`, annualized. Agrees with the
/// realized-return path up to rounding; the realized path is the one scored.
pub fn mean_variance(matrix: &ReturnMatrix, weights: &[f64]) -> PortfolioMetrics {
    let n = matrix.assets();
    let mu = matrix.mean_returns();
    let cov = matrix.covariance();

    let period_return: f64 = weights.iter().zip(&mu).map(|(w, m)| w * m).sum();
    let mut variance = 0.0;
    for i in 0..n.min(weights.len()) {
        for j in 0..n.min(weights.len()) {
            variance += weights[i] * cov[i * n + j] * weights[j];
        }
    }

    let annual_return = period_return * TRADING_DAYS;
    let annual_volatility = variance.max(0.0).sqrt() * TRADING_DAYS.sqrt();
    PortfolioMetrics {
        annual_return,
        annual_volatility,
        sharpe_ratio: sharpe(annual_return, annual_volatility),
    }
}

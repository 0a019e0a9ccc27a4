/// One ticker's price history and the period returns derived from it.
///
/// Built once by the loader and shared read-only by every search worker.
#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    ticker: String,
    prices: Vec<f64>,
    returns: Vec<f64>,
}

impl Asset {
    pub fn from_prices(ticker: impl Into<String>, prices: Vec<f64>) -> Self {
        let returns = period_returns(&prices);
        Self {
            ticker: ticker.into(),
            prices,
            returns,
        }
    }

    /// For callers that already hold a return series and no raw prices.
    pub fn from_returns(ticker: impl Into<String>, returns: Vec<f64>) -> Self {
        Self {
            ticker: ticker.into(),
            prices: Vec::new(),
            returns,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }
}

/// `r[t] = (p[t] - p[t-1]) / p[t-1]`, or 0 when the previous price is not positive.
pub fn period_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| {
            let (prev, cur) = (w[0], w[1]);
            if prev <= 0.0 { 0.0 } else { (cur - prev) / prev }
        })
        .collect()
}

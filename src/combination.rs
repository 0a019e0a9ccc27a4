use crate::asset::Asset;

/// Positions into the asset universe, strictly increasing.
pub type IndexCombination = Vec<usize>;

/// C(n, k). Returns 0 for k > n, 1 for k == 0, and `u128::MAX` when an
/// intermediate product overflows.
pub fn combination_count(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    // C(n, k) = C(n, n-k)
    let k = k.min(n - k);
    let mut result = 1u128;
    for i in 0..k {
        // The running value is C(n, i+1) whenever the product fits.
        result = match result.checked_mul((n - i) as u128) {
            Some(product) => product / (i + 1) as u128,
            None => return u128::MAX,
        };
    }
    result
}

/// Number of combinations a search will visit once the optional limit applies.
/// A limit of 0 means unlimited.
pub fn planned_combinations(n: usize, k: usize, limit: Option<usize>) -> usize {
    if k == 0 {
        return 0;
    }
    let total = usize::try_from(combination_count(n, k)).unwrap_or(usize::MAX);
    limit.filter(|&m| m > 0).map_or(total, |m| total.min(m))
}

/// Lazy lexicographic stream of k-subsets of `0..n`.
///
/// The stream is finite and not restartable; build a new one from the same
/// universe to iterate again. `k == 0` and `k > n` produce nothing.
#[derive(Debug, Clone)]
pub struct CombinationIter {
    n: usize,
    current: Vec<usize>,
    remaining: Option<usize>,
    exhausted: bool,
}

impl CombinationIter {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            current: (0..k).collect(),
            remaining: None,
            exhausted: k == 0 || k > n,
        }
    }

    /// Truncate the stream to its first `limit` subsets. `0` means unlimited.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.remaining = (limit > 0).then_some(limit);
        self
    }

    fn advance(&mut self) {
        let k = self.current.len();
        for i in (0..k).rev() {
            let max_val = self.n - (k - i);
            if self.current[i] < max_val {
                self.current[i] += 1;
                for j in (i + 1)..k {
                    self.current[j] = self.current[j - 1] + 1;
                }
                return;
            }
        }
        self.exhausted = true;
    }

    /// Pull up to `size` subsets; `None` once the stream is drained.
    pub fn next_batch(&mut self, size: usize) -> Option<Vec<IndexCombination>> {
        let batch: Vec<IndexCombination> = self.by_ref().take(size.max(1)).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }
}

impl Iterator for CombinationIter {
    type Item = IndexCombination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.remaining == Some(0) {
            return None;
        }
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }
        let combo = self.current.clone();
        self.advance();
        Some(combo)
    }
}

/// Resolve index positions back into assets, preserving universe order.
pub fn resolve<'a>(universe: &'a [Asset], combo: &[usize]) -> Vec<&'a Asset> {
    combo.iter().map(|&i| &universe[i]).collect()
}

/// Tickers of a combination, for reporting and error messages.
pub fn tickers(universe: &[Asset], combo: &[usize]) -> Vec<String> {
    combo
        .iter()
        .map(|&i| universe[i].ticker().to_string())
        .collect()
}

use rand::Rng;
use rand::seq::index;

use crate::error::OptimizerError;

/// Per-asset allocation ceiling.
pub const MAX_WEIGHT: f64 = 0.20;
/// Allowed distance between a vector's sum and 1.0.
pub const SUM_TOLERANCE: f64 = 1e-4;
/// Float slack on the cap check so that redistributed entries landing on the
/// cap are not rejected for rounding noise.
pub const CAP_TOLERANCE: f64 = 1e-12;
/// Clamp/redistribute passes per repair.
pub const MAX_REPAIR_ITERATIONS: usize = 10;
/// Fresh draws tried before falling back to equal weights.
pub const MAX_REPAIR_ATTEMPTS: usize = 5;

const SMALL_WEIGHT: f64 = 0.05;
const SMALL_WEIGHT_PROB: f64 = 0.7;
const CONCENTRATED_BASE: f64 = 0.01;
const CONCENTRATED_BOOST_LOW: f64 = 0.15;
const NEAR_EQUAL_LOW: f64 = 0.7;
const NEAR_EQUAL_HIGH: f64 = 1.3;

/// Raw draw profiles. One is picked at random for every vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightStrategy {
    /// Independent draws in `[0, cap)`.
    Uniform,
    /// Mostly draws in `[0, 0.05)`, the rest in `[0.05, cap)`.
    MostlySmall,
    /// Every entry at 0.01, then 3 to 6 entries boosted into `[0.15, cap)`.
    Concentrated,
    /// `1/k` scaled by a factor in `[0.7, 1.3]`.
    NearEqual,
}

impl WeightStrategy {
    pub const ALL: [WeightStrategy; 4] = [
        WeightStrategy::Uniform,
        WeightStrategy::MostlySmall,
        WeightStrategy::Concentrated,
        WeightStrategy::NearEqual,
    ];

    pub fn pick<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }

    /// Unnormalized draw of `size` entries.
    pub fn draw<R: Rng>(self, size: usize, rng: &mut R) -> Vec<f64> {
        match self {
            WeightStrategy::Uniform => (0..size)
                .map(|_| rng.random_range(0.0..MAX_WEIGHT))
                .collect(),
            WeightStrategy::MostlySmall => (0..size)
                .map(|_| {
                    if rng.random_bool(SMALL_WEIGHT_PROB) {
                        rng.random_range(0.0..SMALL_WEIGHT)
                    } else {
                        rng.random_range(SMALL_WEIGHT..MAX_WEIGHT)
                    }
                })
                .collect(),
            WeightStrategy::Concentrated => {
                let mut w = vec![CONCENTRATED_BASE; size];
                let boosted = rng.random_range(3..=6).min(size);
                for i in index::sample(rng, size, boosted) {
                    w[i] = rng.random_range(CONCENTRATED_BOOST_LOW..MAX_WEIGHT);
                }
                w
            }
            WeightStrategy::NearEqual => {
                let base = 1.0 / size as f64;
                (0..size)
                    .map(|_| base * rng.random_range(NEAR_EQUAL_LOW..=NEAR_EQUAL_HIGH))
                    .collect()
            }
        }
    }
}

pub fn equal_weights(size: usize) -> Vec<f64> {
    if size == 0 {
        return Vec::new();
    }
    vec![1.0 / size as f64; size]
}

/// Non-negative, capped, and summing to 1 within tolerance.
pub fn is_valid(weights: &[f64]) -> bool {
    if weights.is_empty() {
        return false;
    }
    let in_range = weights
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0 && *w <= MAX_WEIGHT + CAP_TOLERANCE);
    in_range && (weights.iter().sum::<f64>() - 1.0).abs() <= SUM_TOLERANCE
}

/// Scale to unit sum. False when the sum is not positive and finite.
pub fn normalize(weights: &mut [f64]) -> bool {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return false;
    }
    for w in weights.iter_mut() {
        *w /= total;
    }
    true
}

/// Clamp entries into `[0, cap]` and hand the missing mass to entries still
/// under the cap, proportionally to their size.
///
/// Fails when fewer than `1/cap` assets can carry weight, which makes the
/// constraint set empty (any `size < 5` at the default cap).
pub fn repair_weights(weights: &mut [f64]) -> Result<(), OptimizerError> {
    let unsatisfiable = OptimizerError::ConstraintUnsatisfiable {
        size: weights.len(),
        attempts: MAX_REPAIR_ITERATIONS,
    };

    for _ in 0..MAX_REPAIR_ITERATIONS {
        for w in weights.iter_mut() {
            *w = w.clamp(0.0, MAX_WEIGHT);
        }
        if is_valid(weights) {
            return Ok(());
        }

        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(unsatisfiable);
        }
        if total > 1.0 {
            normalize(weights);
            continue;
        }

        let free_mass: f64 = weights
            .iter()
            .filter(|w| **w < MAX_WEIGHT - CAP_TOLERANCE)
            .sum();
        if free_mass <= 0.0 {
            return Err(unsatisfiable);
        }
        let deficit = 1.0 - total;
        for w in weights.iter_mut() {
            if *w < MAX_WEIGHT - CAP_TOLERANCE {
                *w += deficit * (*w / free_mass);
            }
        }
    }

    for w in weights.iter_mut() {
        *w = w.clamp(0.0, MAX_WEIGHT);
    }
    if is_valid(weights) {
        Ok(())
    } else {
        Err(unsatisfiable)
    }
}

/// Row-major batch of weight vectors sharing one length.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightBatch {
    size: usize,
    data: Vec<f64>,
    fallbacks: usize,
}

impl WeightBatch {
    pub fn with_capacity(size: usize, count: usize) -> Self {
        Self {
            size,
            data: Vec::with_capacity(size * count),
            fallbacks: 0,
        }
    }

    pub fn from_rows(size: usize, rows: &[Vec<f64>]) -> Self {
        let mut batch = Self::with_capacity(size, rows.len());
        for row in rows {
            batch.push(row);
        }
        batch
    }

    pub fn push(&mut self, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.size);
        self.data.extend_from_slice(weights);
    }

    pub fn vector_size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.data.len() / self.size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.size..(idx + 1) * self.size]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.size.max(1))
    }

    /// Vectors in this batch that ended on the equal-weight fallback.
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }
}

/// Draws constrained weight vectors for combinations of one size.
#[derive(Clone, Copy, Debug)]
pub struct WeightSampler {
    size: usize,
}

impl WeightSampler {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Bounded draw-normalize-repair attempts, without the fallback.
    pub fn try_sample<R: Rng>(&self, rng: &mut R) -> Result<Vec<f64>, OptimizerError> {
        for _ in 0..MAX_REPAIR_ATTEMPTS {
            let mut w = WeightStrategy::pick(rng).draw(self.size, rng);
            if !normalize(&mut w) {
                continue;
            }
            if is_valid(&w) || repair_weights(&mut w).is_ok() {
                return Ok(w);
            }
        }
        Err(OptimizerError::ConstraintUnsatisfiable {
            size: self.size,
            attempts: MAX_REPAIR_ATTEMPTS,
        })
    }

    /// One vector. A single asset always gets `[1.0]`, even though that
    /// exceeds the cap; sizes below `1/cap` end on the equal-weight fallback.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        self.sample_tracked(rng).0
    }

    fn sample_tracked<R: Rng>(&self, rng: &mut R) -> (Vec<f64>, bool) {
        match self.size {
            0 => (Vec::new(), false),
            1 => (vec![1.0], false),
            _ => match self.try_sample(rng) {
                Ok(w) => (w, false),
                Err(_) => (equal_weights(self.size), true),
            },
        }
    }

    pub fn sample_batch<R: Rng>(&self, count: usize, rng: &mut R) -> WeightBatch {
        let mut batch = WeightBatch::with_capacity(self.size, count);
        if self.size == 0 {
            return batch;
        }
        for _ in 0..count {
            let (w, fell_back) = self.sample_tracked(rng);
            if fell_back {
                batch.fallbacks += 1;
            }
            batch.push(&w);
        }
        batch
    }
}

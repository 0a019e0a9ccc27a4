//! Exhaustive-combination Monte Carlo search for the highest-Sharpe portfolio.
//!
//! Every `k`-asset subset of the universe is scored with many random capped
//! weight vectors; the single best candidate across the whole run is kept.

pub mod analysis;
pub mod asset;
pub mod combination;
pub mod data;
pub mod error;
pub mod metrics;
pub mod progress;
pub mod report;
pub mod search;
pub mod weights;

pub use asset::Asset;
pub use error::OptimizerError;
pub use metrics::{PortfolioMetrics, ReturnMatrix, score_batch};
pub use progress::ProgressSnapshot;
pub use search::{ExecutionMode, PortfolioCandidate, SearchConfig, SearchSummary, run_search};
pub use weights::{WeightBatch, WeightSampler};

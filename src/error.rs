use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizerError {
    /// Malformed or missing input; aborts the run before the search starts.
    #[error("invalid input: {reason}")]
    Input { reason: String },

    /// Scoring one combination failed; the search skips it and continues.
    #[error("scoring failed for [{}]: {reason}", .combination.join(", "))]
    Computation {
        combination: Vec<String>,
        reason: String,
    },

    #[error("no weight vector within the cap for {size} assets after {attempts} attempts")]
    ConstraintUnsatisfiable { size: usize, attempts: usize },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OptimizerError {
    pub fn input(reason: impl Into<String>) -> Self {
        Self::Input {
            reason: reason.into(),
        }
    }
}

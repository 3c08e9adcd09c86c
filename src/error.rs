use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the simulation core.
///
/// Configuration problems fail fast before any worker starts. Numeric
/// anomalies are normally carried as values (see [`NumericAnomaly`]) and only
/// become an `Error` when a caller decides to escalate one.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid thread count, cell target, or interaction range for the box.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid particle, box, or id argument.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A collision prediction or response that cannot be trusted.
    #[error(transparent)]
    NumericAnomaly(#[from] NumericAnomaly),

    /// A worker failed while running its slice of a pass. The pass result is invalid.
    #[error("worker {worker} failed: {message}")]
    WorkerFailure { worker: usize, message: String },

    /// Propagated I/O errors (worker thread spawning).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single bad pair detected by a pair model. Passes record these instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum NumericAnomaly {
    /// The selected root of the collision quadratic lies in the past.
    #[error("negative collision time {time} for pair ({i}, {j})")]
    NegativeTime { i: usize, j: usize, time: f64 },

    /// The discriminant of the collision quadratic is NaN.
    #[error("NaN discriminant for pair ({i}, {j})")]
    NanDiscriminant { i: usize, j: usize },

    /// Collision response requested for two particles at the same point.
    #[error("coincident centers for pair ({i}, {j})")]
    CoincidentCenters { i: usize, j: usize },
}

impl NumericAnomaly {
    /// The pair the anomaly was detected on.
    pub fn pair(&self) -> (usize, usize) {
        match *self {
            NumericAnomaly::NegativeTime { i, j, .. }
            | NumericAnomaly::NanDiscriminant { i, j }
            | NumericAnomaly::CoincidentCenters { i, j } => (i, j),
        }
    }
}

//! Error types for this crate.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed record, an unknown element symbol, or an experimental
    /// curve with fewer than two usable rows.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Contradictory or out-of-range configuration values.
    #[error("configuration error: {0}")]
    Config(String),
    /// Coordinates outside the grid extent or another geometry violation.
    #[error("geometric error: {0}")]
    Geometry(String),
    /// The minimizer exhausted its evaluation budget without reaching the
    /// convergence tolerance. The best parameters found so far are attached.
    #[error("fit did not converge after {evaluations} evaluations (χ² = {chi2})")]
    Convergence {
        /// Number of χ² evaluations spent.
        evaluations: usize,
        /// Best χ² reached before giving up.
        chi2: f64,
    },
    /// χ² evaluated to a negative or non-finite value.
    #[error("numeric failure: {0}")]
    Numeric(String),
    /// Error that does not originate from this crate.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Shorthand for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

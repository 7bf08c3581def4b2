use chrono::NaiveDate;
use thiserror::Error;

/// Failures that abort an allocation run.
///
/// A zero-volatility portfolio is not an error: the affected ratios are
/// reported as `None` inside [`crate::metrics::MetricsReport`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No price data for {tickers:?} between {start} and {end}: {reason}")]
    DataUnavailable {
        tickers: Vec<String>,
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("Insufficient history for {tickers:?}: need at least {required} return observations, got {actual}")]
    InsufficientHistory {
        tickers: Vec<String>,
        required: usize,
        actual: usize,
    },

    #[error("Optimization failed for {tickers:?}: {diagnostic}")]
    OptimizationFailed {
        tickers: Vec<String>,
        diagnostic: String,
    },
}

pub type Result<T> = std::result::Result<T, AllocError>;

//! Error taxonomy for the risk engine

use thiserror::Error;

/// Errors raised by basket validation, price loading and scenario computation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error(
        "No valid price data found for tickers: {}. These assets may not have been trading during the specified period.",
        .tickers.join(", ")
    )]
    NoPriceData { tickers: Vec<String> },

    #[error("Insufficient price data: {observations} observations, need at least {required} trading days")]
    InsufficientHistory { observations: usize, required: usize },

    #[error("Correlation analysis unavailable: {0}")]
    CorrelationUnavailable(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Price source error: {0}")]
    PriceSource(String),
}

impl RiskError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        RiskError::MalformedInput(reason.into())
    }

    /// True for failures that only affect a single computation, never the whole request
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RiskError::MalformedInput(_))
    }
}

impl From<csv::Error> for RiskError {
    fn from(err: csv::Error) -> Self {
        RiskError::PriceSource(err.to_string())
    }
}

impl From<std::io::Error> for RiskError {
    fn from(err: std::io::Error) -> Self {
        RiskError::PriceSource(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;

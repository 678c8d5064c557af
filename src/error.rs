use chrono::{DateTime, Utc};
use thiserror::Error;

/// Raw failure talking to the exchange.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid JSON: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if let Some(status) = err.status() {
            SourceError::Status(status.as_u16())
        } else if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

/// The market list could not be obtained. Fatal to a scan.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("market list request failed: {0}")]
    Source(#[from] SourceError),
    #[error("market list payload is not a JSON array")]
    NotAList,
}

/// Why one symbol produced no record. Never escapes the orchestrator.
#[derive(Debug, Error)]
pub enum Unavailable {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("malformed candle payload: {0}")]
    Malformed(String),
    #[error("only {got} candles, need at least {need}")]
    InsufficientHistory { got: usize, need: usize },
    #[error("latest candle {latest} is older than boundary {boundary}")]
    Stale {
        latest: DateTime<Utc>,
        boundary: DateTime<Utc>,
    },
    #[error("task failed: {0}")]
    TaskFailed(String),
}

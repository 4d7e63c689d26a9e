//! Unified error type for the swing bot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("broker error (status={status}): {message}")]
    Broker { status: u16, message: String },

    #[error("order rejected for {ticker}: {reason}")]
    OrderRejected { ticker: String, reason: String },

    #[error("state corruption: {0}")]
    StateCorruption(String),

    #[error("risk check failed: {0}")]
    RiskViolation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("memory store error: {0}")]
    Memory(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

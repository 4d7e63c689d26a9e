//! Core domain types shared across the engine crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order direction sent to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Lifecycle status of a tracked position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A position tracked by the ledger.
///
/// At most one OPEN position exists per ticker. `entry_time` is set once at
/// fill confirmation and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub entry_time: DateTime<Utc>,
    pub entry_notional: f64,
    pub entry_price: Option<f64>,
    pub order_id: String,
    pub status: PositionStatus,
}

/// Broker-side view of an open position, used for pnl lookups and for
/// rebuilding the ledger when local state is unreadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub ticker: String,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub market_value: f64,
    /// Unrealized P&L as a fraction of entry notional (0.03 = +3%).
    pub unrealized_pl_pct: f64,
}

/// Per-ticker raw inputs from the signal feed.
///
/// `momentum_score` is `None` when the price feed is unavailable and the
/// cycle runs sentiment-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub ticker: String,
    pub sentiment_score: f64,
    pub momentum_score: Option<f64>,
    pub volatility: Option<f64>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeDecision {
    Buy,
    Skip,
}

/// A scored per-ticker signal for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    /// Mean document-level compound sentiment, in [-1, 1].
    pub sentiment_score: f64,
    /// Fractional price change over the lookback window. `None` when the
    /// price feed was unavailable and the signal is sentiment-only.
    pub momentum_score: Option<f64>,
    /// Weighted blend of sentiment and momentum, clamped to [-1, 1].
    pub composite_score: f64,
    pub decision: TradeDecision,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_buy(&self) -> bool {
        self.decision == TradeDecision::Buy
    }

    pub fn sentiment_only(&self) -> bool {
        self.momentum_score.is_none()
    }
}

//! Tunable strategy parameters.
//!
//! This is the subset of configuration that HypothesisSearch explores and
//! that an accepted insight artifact overrides on the next trading cycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Minimum composite score required to buy.
    pub buy_threshold: f64,
    /// Fractional take-profit exit level (0.05 = +5%).
    pub take_profit_pct: f64,
    /// Fractional stop-loss exit level (0.03 = -3%).
    pub stop_loss_pct: f64,
    /// Multiplier applied to the per-trade allocation.
    pub position_size_multiplier: f64,
    /// When set, only these tickers are traded.
    #[serde(default)]
    pub focus_tickers: Option<Vec<String>>,
}

impl StrategyParams {
    /// True when `ticker` passes the focus filter.
    pub fn allows_ticker(&self, ticker: &str) -> bool {
        match &self.focus_tickers {
            Some(focus) => focus.iter().any(|t| t == ticker),
            None => true,
        }
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            buy_threshold: 0.4,
            take_profit_pct: 0.05,
            stop_loss_pct: 0.03,
            position_size_multiplier: 1.0,
            focus_tickers: None,
        }
    }
}

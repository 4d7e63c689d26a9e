//! Signal generation — composite sentiment/momentum scoring and candidate
//! ranking for the trading cycle.

mod generator;
mod types;

pub use generator::SignalGenerator;
pub use types::{Signal, TradeDecision};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::TickerSnapshot;
use tracing::debug;

use crate::types::{Signal, TradeDecision};

/// Produces ranked buy/skip signals from per-ticker feed snapshots.
///
/// Pure with respect to ledger and circuit state: the generator only reads
/// its inputs and emits `Signal`s.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    buy_threshold: f64,
    sentiment_weight: f64,
    momentum_weight: f64,
    max_positions: usize,
}

impl SignalGenerator {
    pub fn new(
        buy_threshold: f64,
        sentiment_weight: f64,
        momentum_weight: f64,
        max_positions: usize,
    ) -> Self {
        Self {
            buy_threshold,
            sentiment_weight,
            momentum_weight,
            max_positions,
        }
    }

    fn clamp_score(value: f64) -> f64 {
        value.clamp(-1.0, 1.0)
    }

    /// Score one snapshot.
    ///
    /// With momentum present: composite = w_s·sentiment + w_m·momentum and a
    /// buy additionally requires momentum > 0. Without momentum (degraded
    /// price feed) the composite is sentiment-only and the momentum gate is
    /// waived.
    pub fn compose(&self, snap: &TickerSnapshot, now: DateTime<Utc>) -> Signal {
        let (composite, decision) = match snap.momentum_score {
            Some(momentum) => {
                let composite = Self::clamp_score(
                    self.sentiment_weight * snap.sentiment_score + self.momentum_weight * momentum,
                );
                let buy = composite >= self.buy_threshold && momentum > 0.0;
                (composite, buy)
            }
            None => {
                let composite = Self::clamp_score(self.sentiment_weight * snap.sentiment_score);
                (composite, composite >= self.buy_threshold)
            }
        };

        Signal {
            ticker: snap.ticker.clone(),
            sentiment_score: snap.sentiment_score,
            momentum_score: snap.momentum_score,
            composite_score: composite,
            decision: if decision {
                TradeDecision::Buy
            } else {
                TradeDecision::Skip
            },
            generated_at: now,
        }
    }

    /// Score every snapshot for this cycle.
    pub fn generate(&self, snapshots: &[TickerSnapshot], now: DateTime<Utc>) -> Vec<Signal> {
        snapshots.iter().map(|s| self.compose(s, now)).collect()
    }

    /// Rank buy candidates and cap them at the remaining position slots.
    ///
    /// Candidates are ordered by composite score descending with ties broken
    /// by ticker lexical order. Tickers that already have an open position
    /// are demoted to skip (one open position per ticker). Candidates beyond
    /// `max_positions - open_count` are demoted as well.
    pub fn rank_and_admit(
        &self,
        mut signals: Vec<Signal>,
        open_tickers: &HashSet<String>,
    ) -> Vec<Signal> {
        signals.sort_by(|a, b| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let slots = self.max_positions.saturating_sub(open_tickers.len());
        let mut admitted = 0usize;
        for signal in signals.iter_mut() {
            if signal.decision != TradeDecision::Buy {
                continue;
            }
            if open_tickers.contains(&signal.ticker) {
                debug!(ticker = %signal.ticker, "already open, demoting buy");
                signal.decision = TradeDecision::Skip;
                continue;
            }
            if admitted >= slots {
                signal.decision = TradeDecision::Skip;
                continue;
            }
            admitted += 1;
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ticker: &str, sentiment: f64, momentum: Option<f64>) -> TickerSnapshot {
        TickerSnapshot {
            ticker: ticker.into(),
            sentiment_score: sentiment,
            momentum_score: momentum,
            volatility: None,
        }
    }

    fn generator() -> SignalGenerator {
        // Equal weights, 0.4 buy threshold, 3 slots.
        SignalGenerator::new(0.4, 0.5, 0.5, 3)
    }

    #[test]
    fn buy_requires_threshold_and_positive_momentum() {
        let g = generator();
        let now = Utc::now();

        let s = g.compose(&snap("AAPL", 0.8, Some(0.05)), now);
        assert_eq!(s.decision, TradeDecision::Buy);

        // Score clears the bar but momentum is negative.
        let s = g.compose(&snap("AAPL", 0.9, Some(-0.01)), now);
        assert_eq!(s.decision, TradeDecision::Skip);

        // Positive momentum but composite under the bar.
        let s = g.compose(&snap("AAPL", 0.3, Some(0.01)), now);
        assert_eq!(s.decision, TradeDecision::Skip);
    }

    #[test]
    fn composite_is_clamped() {
        let g = SignalGenerator::new(0.4, 1.0, 1.0, 3);
        let s = g.compose(&snap("NVDA", 1.0, Some(0.9)), Utc::now());
        assert!(s.composite_score <= 1.0);
    }

    #[test]
    fn sentiment_only_mode_waives_momentum_gate() {
        let g = generator();
        let s = g.compose(&snap("MSFT", 0.9, None), Utc::now());
        assert_eq!(s.decision, TradeDecision::Buy);
        assert!(s.sentiment_only());
    }

    #[test]
    fn ranking_is_deterministic_with_lexical_tie_break() {
        let g = generator();
        let now = Utc::now();
        let signals = g.generate(
            &[
                snap("MSFT", 0.9, Some(0.02)),
                snap("AAPL", 0.9, Some(0.02)),
                snap("NVDA", 0.95, Some(0.03)),
            ],
            now,
        );
        let ranked = g.rank_and_admit(signals, &HashSet::new());
        assert_eq!(ranked[0].ticker, "NVDA");
        // Equal scores: AAPL before MSFT.
        assert_eq!(ranked[1].ticker, "AAPL");
        assert_eq!(ranked[2].ticker, "MSFT");
    }

    #[test]
    fn admission_respects_remaining_slots() {
        let g = SignalGenerator::new(0.4, 0.5, 0.5, 2);
        let now = Utc::now();
        let signals = g.generate(
            &[
                snap("AAPL", 0.9, Some(0.02)),
                snap("MSFT", 0.85, Some(0.02)),
                snap("NVDA", 0.95, Some(0.03)),
            ],
            now,
        );
        let mut open = HashSet::new();
        open.insert("TSLA".to_string());

        let ranked = g.rank_and_admit(signals, &open);
        let buys: Vec<_> = ranked.iter().filter(|s| s.is_buy()).collect();
        // One slot left of two: only the top candidate survives.
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].ticker, "NVDA");
    }

    #[test]
    fn open_ticker_is_never_bought_again() {
        let g = generator();
        let now = Utc::now();
        let signals = g.generate(&[snap("AAPL", 0.9, Some(0.05))], now);
        let mut open = HashSet::new();
        open.insert("AAPL".to_string());

        let ranked = g.rank_and_admit(signals, &open);
        assert!(ranked.iter().all(|s| !s.is_buy()));
    }
}

//! Signal adjustment from nearest historical analogs.

use common::Result;
use signal_engine::{Signal, TradeDecision};
use tracing::{debug, warn};

use crate::types::{MemoryStore, OutcomeLabel, QueryHit};

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub enabled: bool,
    pub n_similar_results: usize,
    /// Buys whose neighbor win-fraction falls below this are suppressed.
    pub confidence_floor: f64,
    /// Upper bound on the additive composite-score boost.
    pub max_boost: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_similar_results: 5,
            confidence_floor: 0.35,
            max_boost: 0.2,
        }
    }
}

/// What the retriever did to one signal, for journaling.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryAdjustment {
    pub ticker: String,
    pub neighbors: usize,
    pub labeled_neighbors: usize,
    pub win_fraction: Option<f64>,
    pub mean_similarity: Option<f64>,
    pub boost: f64,
    pub suppressed: bool,
}

/// Additive confidence boost, monotonically non-decreasing in both the
/// neighbor win-fraction and the mean similarity.
pub fn compute_boost(win_fraction: f64, mean_similarity: f64, max_boost: f64) -> f64 {
    max_boost * win_fraction.clamp(0.0, 1.0) * mean_similarity.clamp(0.0, 1.0)
}

/// Short textual description of current conditions for a ticker, used as the
/// similarity query.
pub fn describe_conditions(
    ticker: &str,
    sentiment: f64,
    momentum: Option<f64>,
    volatility: Option<f64>,
) -> String {
    let sentiment_level = match sentiment {
        s if s >= 0.5 => "strongly bullish",
        s if s >= 0.2 => "mildly bullish",
        s if s > -0.2 => "neutral",
        s if s > -0.5 => "mildly bearish",
        _ => "strongly bearish",
    };
    let momentum_regime = match momentum {
        Some(m) if m > 0.02 => "strong upward momentum",
        Some(m) if m > 0.0 => "upward momentum",
        Some(m) if m > -0.02 => "downward momentum",
        Some(_) => "strong downward momentum",
        None => "momentum unavailable",
    };
    let volatility_bucket = match volatility {
        Some(v) if v >= 0.03 => "high volatility",
        Some(v) if v >= 0.015 => "moderate volatility",
        Some(_) => "low volatility",
        None => "volatility unknown",
    };
    format!(
        "Ticker: {ticker}. Sentiment: {sentiment_level} ({sentiment:.2}). \
         Momentum: {momentum_regime}. Volatility: {volatility_bucket}."
    )
}

/// Reads nearest historical analogs and adjusts live signals. Never writes
/// records — labeling and appending happen out of band.
pub struct MemoryRetriever<S> {
    store: S,
    config: RetrieverConfig,
}

impl<S: MemoryStore> MemoryRetriever<S> {
    pub fn new(store: S, config: RetrieverConfig) -> Self {
        Self { store, config }
    }

    /// Adjust one signal in place and report what happened.
    ///
    /// Provider failures degrade to a no-op adjustment: the cycle proceeds
    /// on the unadjusted signal.
    pub async fn adjust(&self, signal: &mut Signal, volatility: Option<f64>) -> MemoryAdjustment {
        let mut adjustment = MemoryAdjustment {
            ticker: signal.ticker.clone(),
            neighbors: 0,
            labeled_neighbors: 0,
            win_fraction: None,
            mean_similarity: None,
            boost: 0.0,
            suppressed: false,
        };

        if !self.config.enabled {
            return adjustment;
        }

        let query = describe_conditions(
            &signal.ticker,
            signal.sentiment_score,
            signal.momentum_score,
            volatility,
        );

        let hits = match self.neighbors(&query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(ticker = %signal.ticker, error = %e, "memory query failed, skipping adjustment");
                return adjustment;
            }
        };
        adjustment.neighbors = hits.len();

        let labeled: Vec<&QueryHit> = hits
            .iter()
            .filter(|h| h.record.outcome != OutcomeLabel::Unlabeled)
            .collect();
        adjustment.labeled_neighbors = labeled.len();
        if labeled.is_empty() {
            return adjustment;
        }

        let wins = labeled
            .iter()
            .filter(|h| h.record.outcome == OutcomeLabel::Win)
            .count();
        let win_fraction = wins as f64 / labeled.len() as f64;
        let mean_similarity =
            labeled.iter().map(|h| h.similarity).sum::<f64>() / labeled.len() as f64;

        let boost = compute_boost(win_fraction, mean_similarity, self.config.max_boost);
        signal.composite_score = (signal.composite_score + boost).clamp(-1.0, 1.0);

        adjustment.win_fraction = Some(win_fraction);
        adjustment.mean_similarity = Some(mean_similarity);
        adjustment.boost = boost;

        // Suppress buys that contradict historical outcomes.
        if signal.decision == TradeDecision::Buy && win_fraction < self.config.confidence_floor {
            signal.decision = TradeDecision::Skip;
            adjustment.suppressed = true;
            debug!(
                ticker = %signal.ticker,
                win_fraction,
                floor = self.config.confidence_floor,
                "buy suppressed by historical outcomes"
            );
        }

        adjustment
    }

    async fn neighbors(&self, query: &str) -> Result<Vec<QueryHit>> {
        self.store.query(query, self.config.n_similar_results).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryRecord;
    use async_trait::async_trait;
    use chrono::Utc;
    use signal_engine::TradeDecision;

    struct FixedStore {
        hits: Vec<QueryHit>,
    }

    #[async_trait]
    impl MemoryStore for FixedStore {
        async fn store(&self, _record: MemoryRecord) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _text: &str, n: usize) -> Result<Vec<QueryHit>> {
            Ok(self.hits.iter().take(n).cloned().collect())
        }
    }

    fn hit(outcome: OutcomeLabel, similarity: f64) -> QueryHit {
        QueryHit {
            record: MemoryRecord {
                source_text: "past conditions".into(),
                scope: "AAPL".into(),
                observed_at: Utc::now(),
                outcome,
            },
            similarity,
        }
    }

    fn buy_signal(composite: f64) -> Signal {
        Signal {
            ticker: "AAPL".into(),
            sentiment_score: 0.7,
            momentum_score: Some(0.02),
            composite_score: composite,
            decision: TradeDecision::Buy,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn boost_is_monotone_in_win_fraction() {
        let mut last = f64::NEG_INFINITY;
        for step in 0..=10 {
            let wf = f64::from(step) / 10.0;
            let b = compute_boost(wf, 0.8, 0.2);
            assert!(b >= last, "boost must not decrease as win fraction grows");
            last = b;
        }
    }

    #[test]
    fn boost_is_monotone_in_similarity() {
        let mut last = f64::NEG_INFINITY;
        for step in 0..=10 {
            let sim = f64::from(step) / 10.0;
            let b = compute_boost(0.6, sim, 0.2);
            assert!(b >= last);
            last = b;
        }
    }

    #[tokio::test]
    async fn winning_neighbors_boost_composite() {
        let store = FixedStore {
            hits: vec![
                hit(OutcomeLabel::Win, 0.9),
                hit(OutcomeLabel::Win, 0.8),
                hit(OutcomeLabel::Loss, 0.7),
            ],
        };
        let retriever = MemoryRetriever::new(store, RetrieverConfig::default());

        let mut signal = buy_signal(0.5);
        let adj = retriever.adjust(&mut signal, None).await;

        assert!(adj.boost > 0.0);
        assert!(signal.composite_score > 0.5);
        assert!(!adj.suppressed);
        assert_eq!(signal.decision, TradeDecision::Buy);
    }

    #[tokio::test]
    async fn low_win_fraction_suppresses_buy() {
        let store = FixedStore {
            hits: vec![
                hit(OutcomeLabel::Loss, 0.9),
                hit(OutcomeLabel::Loss, 0.85),
                hit(OutcomeLabel::Win, 0.8),
            ],
        };
        let retriever = MemoryRetriever::new(store, RetrieverConfig::default());

        let mut signal = buy_signal(0.6);
        let adj = retriever.adjust(&mut signal, None).await;

        assert!(adj.suppressed);
        assert_eq!(signal.decision, TradeDecision::Skip);
    }

    #[tokio::test]
    async fn unlabeled_neighbors_leave_signal_untouched() {
        let store = FixedStore {
            hits: vec![hit(OutcomeLabel::Unlabeled, 0.95)],
        };
        let retriever = MemoryRetriever::new(store, RetrieverConfig::default());

        let mut signal = buy_signal(0.5);
        let adj = retriever.adjust(&mut signal, None).await;

        assert_eq!(adj.boost, 0.0);
        assert_eq!(signal.composite_score, 0.5);
        assert_eq!(signal.decision, TradeDecision::Buy);
    }

    #[tokio::test]
    async fn disabled_retriever_is_a_no_op() {
        let store = FixedStore {
            hits: vec![hit(OutcomeLabel::Loss, 0.9)],
        };
        let retriever = MemoryRetriever::new(
            store,
            RetrieverConfig {
                enabled: false,
                ..RetrieverConfig::default()
            },
        );

        let mut signal = buy_signal(0.5);
        retriever.adjust(&mut signal, None).await;
        assert_eq!(signal.decision, TradeDecision::Buy);
        assert_eq!(signal.composite_score, 0.5);
    }

    #[test]
    fn condition_description_buckets() {
        let text = describe_conditions("NVDA", 0.62, Some(0.031), Some(0.04));
        assert!(text.contains("strongly bullish"));
        assert!(text.contains("strong upward momentum"));
        assert!(text.contains("high volatility"));
    }
}

//! Deterministic replay of historical signals under a candidate parameter
//! set. Each node evaluation reduces to one pass over the snapshot.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use common::{Result, StrategyParams};
use serde::{Deserialize, Serialize};

/// Notional assumed per simulated trade before the size multiplier.
const BASE_NOTIONAL: f64 = 100.0;

/// One historical signal with its realized forward return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalSignal {
    pub ticker: String,
    pub sentiment: f64,
    /// Fractional price change over the hold window that followed the signal.
    pub forward_return_pct: f64,
    pub observed_at: DateTime<Utc>,
}

/// Read-only snapshot of historical signals for one search run.
#[derive(Debug, Clone, Default)]
pub struct HistoricalSnapshot {
    records: Vec<HistoricalSignal>,
}

impl HistoricalSnapshot {
    pub fn new(records: Vec<HistoricalSignal>) -> Self {
        Self { records }
    }

    /// Load a JSONL file of historical signals. Unparsable lines are skipped
    /// so one bad record cannot invalidate the whole snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoricalSignal>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "skipping malformed history line"),
            }
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[HistoricalSignal] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Tickers ranked by cumulative forward return, best first.
    pub fn best_performing_tickers(&self, limit: usize) -> Vec<String> {
        let mut totals: HashMap<&str, f64> = HashMap::new();
        for record in &self.records {
            *totals.entry(record.ticker.as_str()).or_insert(0.0) += record.forward_return_pct;
        }
        let mut ranked: Vec<(&str, f64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(ticker, _)| ticker.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimResult {
    pub score: f64,
    pub total_pnl: f64,
    pub trades: usize,
    pub win_rate: f64,
}

/// Replay the snapshot under `params`.
///
/// A record trades when its sentiment clears the candidate threshold and its
/// ticker passes the focus filter. The realized per-trade return is the
/// recorded forward return clamped into [-stop_loss, +take_profit] — the
/// exit rules applied to the recorded path. The score blends win rate with
/// profitability, weighted toward win rate.
pub fn simulate(params: &StrategyParams, history: &HistoricalSnapshot) -> SimResult {
    let mut trades = 0usize;
    let mut wins = 0usize;
    let mut total_pnl = 0.0f64;

    let notional = BASE_NOTIONAL * params.position_size_multiplier;
    for record in history.records() {
        if record.sentiment < params.buy_threshold {
            continue;
        }
        if !params.allows_ticker(&record.ticker) {
            continue;
        }

        let realized = record
            .forward_return_pct
            .clamp(-params.stop_loss_pct, params.take_profit_pct);
        let pnl = notional * realized;
        trades += 1;
        if pnl > 0.0 {
            wins += 1;
        }
        total_pnl += pnl;
    }

    if trades == 0 {
        return SimResult {
            score: 0.0,
            total_pnl: 0.0,
            trades: 0,
            win_rate: 0.0,
        };
    }

    let win_rate = wins as f64 / trades as f64;
    let score = 0.7 * win_rate + 0.3 * (total_pnl / 1000.0).clamp(0.0, 1.0);
    SimResult {
        score,
        total_pnl,
        trades,
        win_rate,
    }
}

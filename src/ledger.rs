//! Position ledger — the persistent record of open positions.
//!
//! The ledger exclusively owns `Position` records. Every read-modify-write
//! runs under a scoped lock and persists atomically before the lock is
//! released, so overlapping manual and scheduled runs see consistent state.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use common::{BrokerPosition, Error, Position, PositionStatus, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    positions: BTreeMap<String, Position>,
}

#[derive(Debug)]
pub struct PositionLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl PositionLedger {
    /// Load the ledger file, or start empty when it does not exist yet.
    ///
    /// An unreadable or internally inconsistent file is reported as
    /// `StateCorruption`; the caller rebuilds from the broker instead of
    /// trusting local state.
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let state: LedgerState = serde_json::from_str(&raw)
                .map_err(|e| Error::StateCorruption(format!("ledger unreadable: {e}")))?;
            for (ticker, position) in &state.positions {
                if position.status != PositionStatus::Open || &position.ticker != ticker {
                    return Err(Error::StateCorruption(format!(
                        "ledger entry for {ticker} is inconsistent"
                    )));
                }
            }
            state
        } else {
            LedgerState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Start an empty ledger at `path`, discarding whatever the file held.
    /// Used when local state is corrupt and is about to be rebuilt from the
    /// broker's authoritative list.
    pub fn recover(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, state: &LedgerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.lock().positions.values().cloned().collect()
    }

    pub fn open_tickers(&self) -> HashSet<String> {
        self.lock().positions.keys().cloned().collect()
    }

    pub fn open_count(&self) -> usize {
        self.lock().positions.len()
    }

    /// Track a broker-confirmed entry. At most one open position may exist
    /// per ticker.
    pub fn record_entry(&self, position: Position) -> Result<()> {
        let mut state = self.lock();
        if state.positions.contains_key(&position.ticker) {
            return Err(Error::RiskViolation(format!(
                "position already open for {}",
                position.ticker
            )));
        }
        state.positions.insert(position.ticker.clone(), position);
        self.persist(&state)
    }

    /// Transition a position to CLOSED after a broker-confirmed sell and
    /// drop it from the ledger. Returns the closed position.
    pub fn close(&self, ticker: &str) -> Result<Position> {
        let mut state = self.lock();
        let mut position = state.positions.remove(ticker).ok_or_else(|| {
            Error::StateCorruption(format!("no open position for {ticker} to close"))
        })?;
        position.status = PositionStatus::Closed;
        self.persist(&state)?;
        Ok(position)
    }

    /// Drop a position the broker no longer reports, without the close
    /// ceremony. Used only during reconciliation.
    pub fn remove_stale(&self, ticker: &str) -> Result<Option<Position>> {
        let mut state = self.lock();
        let removed = state.positions.remove(ticker);
        if removed.is_some() {
            warn!(ticker, "removed stale ledger entry missing at broker");
            self.persist(&state)?;
        }
        Ok(removed)
    }

    /// Rebuild the ledger from the broker's authoritative open-position
    /// list. Hold clocks restart at `now` because the broker does not report
    /// original entry times.
    pub fn rebuild_from_broker(
        &self,
        broker_positions: &[BrokerPosition],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut state = self.lock();
        state.positions.clear();
        for bp in broker_positions {
            state.positions.insert(
                bp.ticker.clone(),
                Position {
                    ticker: bp.ticker.clone(),
                    entry_time: now,
                    entry_notional: bp.market_value,
                    entry_price: Some(bp.avg_entry_price),
                    order_id: format!("recovered-{}", bp.ticker),
                    status: PositionStatus::Open,
                },
            );
        }
        self.persist(&state)?;
        info!(count = state.positions.len(), "ledger rebuilt from broker");
        Ok(state.positions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(ticker: &str) -> Position {
        Position {
            ticker: ticker.into(),
            entry_time: Utc::now(),
            entry_notional: 250.0,
            entry_price: Some(187.5),
            order_id: "ord-1".into(),
            status: PositionStatus::Open,
        }
    }

    fn ledger_at(dir: &std::path::Path) -> PositionLedger {
        PositionLedger::load(dir.join("ledger.json")).unwrap()
    }

    #[test]
    fn entries_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_at(dir.path());
        ledger.record_entry(position("AAPL")).unwrap();
        ledger.record_entry(position("MSFT")).unwrap();

        let reloaded = ledger_at(dir.path());
        assert_eq!(reloaded.open_count(), 2);
        assert!(reloaded.open_tickers().contains("AAPL"));
    }

    #[test]
    fn second_open_for_same_ticker_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_at(dir.path());
        ledger.record_entry(position("AAPL")).unwrap();
        let err = ledger.record_entry(position("AAPL")).unwrap_err();
        assert!(matches!(err, Error::RiskViolation(_)));
    }

    #[test]
    fn close_removes_and_reports_closed_status() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_at(dir.path());
        ledger.record_entry(position("AAPL")).unwrap();

        let closed = ledger.close("AAPL").unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(ledger.open_count(), 0);

        // Closing twice is an error, not a silent no-op.
        assert!(ledger.close("AAPL").is_err());
    }

    #[test]
    fn corrupt_file_reports_state_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{broken").unwrap();

        let err = PositionLedger::load(path).unwrap_err();
        assert!(matches!(err, Error::StateCorruption(_)));
    }

    #[test]
    fn rebuild_replaces_local_state_with_broker_truth() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_at(dir.path());
        ledger.record_entry(position("AAPL")).unwrap();

        let broker = vec![BrokerPosition {
            ticker: "NVDA".into(),
            qty: 2.0,
            avg_entry_price: 450.0,
            market_value: 900.0,
            unrealized_pl_pct: 0.01,
        }];
        let count = ledger.rebuild_from_broker(&broker, Utc::now()).unwrap();
        assert_eq!(count, 1);
        assert!(ledger.open_tickers().contains("NVDA"));
        assert!(!ledger.open_tickers().contains("AAPL"));
    }
}

//! Daily circuit breaker — a process-wide, day-scoped gate on new entries.
//!
//! Exits are never blocked: risk reduction is always permitted. The breaker
//! trips on the daily loss limit, the trade-count cap, or a consecutive-loss
//! streak, and an externally managed kill-switch file forces it open. Once
//! tripped it stays tripped until the day key rolls over.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use common::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub day_key: String,
    pub realized_pnl_today: f64,
    pub trade_count_today: u32,
    pub consecutive_losses: u32,
    pub tripped: bool,
}

impl CircuitState {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            day_key: day.format("%Y-%m-%d").to_string(),
            realized_pnl_today: 0.0,
            trade_count_today: 0,
            consecutive_losses: 0,
            tripped: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitLimits {
    pub capital: f64,
    pub daily_loss_limit_pct: f64,
    pub max_trades_per_day: u32,
    pub max_consecutive_losses: u32,
}

/// Whether new entries may be submitted this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryGate {
    Allowed,
    Blocked(String),
}

impl EntryGate {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EntryGate::Allowed)
    }
}

pub struct CircuitBreaker {
    limits: CircuitLimits,
    state_path: PathBuf,
    kill_switch_path: PathBuf,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    /// Load persisted state; a missing or unreadable file starts fresh.
    pub fn load(
        limits: CircuitLimits,
        state_path: PathBuf,
        kill_switch_path: PathBuf,
        today: NaiveDate,
    ) -> Self {
        let state = std::fs::read_to_string(&state_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| CircuitState::fresh(today));

        Self {
            limits,
            state_path,
            kill_switch_path,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, state: &CircuitState) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.state_path)?;
        Ok(())
    }

    fn rollover_if_needed(state: &mut CircuitState, today: NaiveDate) {
        let today_key = today.format("%Y-%m-%d").to_string();
        if state.day_key != today_key {
            info!(from = %state.day_key, to = %today_key, "circuit day rollover");
            *state = CircuitState::fresh(today);
        }
    }

    fn trip_reason(&self, state: &CircuitState) -> Option<String> {
        let loss_limit = self.limits.daily_loss_limit_pct * self.limits.capital;
        if state.realized_pnl_today <= -loss_limit {
            return Some(format!(
                "daily loss limit hit: {:.2} <= -{:.2}",
                state.realized_pnl_today, loss_limit
            ));
        }
        if state.trade_count_today >= self.limits.max_trades_per_day {
            return Some(format!(
                "max trades per day reached: {}/{}",
                state.trade_count_today, self.limits.max_trades_per_day
            ));
        }
        if state.consecutive_losses >= self.limits.max_consecutive_losses {
            return Some(format!(
                "max consecutive losses reached: {}",
                state.consecutive_losses
            ));
        }
        None
    }

    fn kill_switch_active(&self) -> bool {
        self.kill_switch_path.exists()
    }

    /// Evaluate the gate at the start of a cycle. Checked once, at the
    /// earliest gating point; the decision holds for the whole cycle.
    pub fn gate(&self, today: NaiveDate) -> EntryGate {
        let mut state = self.lock();
        Self::rollover_if_needed(&mut state, today);

        let mut reason = None;
        if self.kill_switch_active() {
            if !state.tripped {
                warn!("kill switch present, tripping circuit breaker");
            }
            state.tripped = true;
            reason = Some("kill switch activated".to_string());
        } else if !state.tripped {
            if let Some(r) = self.trip_reason(&state) {
                warn!(reason = %r, "circuit breaker tripped");
                state.tripped = true;
                reason = Some(r);
            }
        } else {
            reason = Some("circuit breaker already tripped today".to_string());
        }

        if let Err(e) = self.persist(&state) {
            warn!(error = %e, "failed to persist circuit state");
        }

        match reason {
            Some(r) if state.tripped => EntryGate::Blocked(r),
            _ => EntryGate::Allowed,
        }
    }

    /// Count a confirmed entry against the daily trade cap.
    pub fn record_entry(&self, today: NaiveDate) -> Result<()> {
        let mut state = self.lock();
        Self::rollover_if_needed(&mut state, today);
        state.trade_count_today += 1;
        if !state.tripped {
            if let Some(r) = self.trip_reason(&state) {
                warn!(reason = %r, "circuit breaker tripped");
                state.tripped = true;
            }
        }
        self.persist(&state)
    }

    /// Fold a realized close P&L into the daily totals.
    pub fn record_close(&self, realized_pnl: f64, today: NaiveDate) -> Result<()> {
        let mut state = self.lock();
        Self::rollover_if_needed(&mut state, today);
        state.realized_pnl_today += realized_pnl;
        if realized_pnl < 0.0 {
            state.consecutive_losses += 1;
        } else {
            state.consecutive_losses = 0;
        }
        if !state.tripped {
            if let Some(r) = self.trip_reason(&state) {
                warn!(reason = %r, "circuit breaker tripped");
                state.tripped = true;
            }
        }
        self.persist(&state)
    }

    pub fn snapshot(&self) -> CircuitState {
        self.lock().clone()
    }
}

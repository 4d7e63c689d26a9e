use chrono::Duration;
use common::StrategyParams;

use crate::types::{ExitDecision, ExitReason};

/// Decides hold vs. sell for one open position given its unrealized P&L and
/// how long it has been held. All percentages are fractional (0.03 = 3%).
#[derive(Debug, Clone)]
pub struct ExitRuleEngine {
    take_profit_pct: f64,
    stop_loss_pct: f64,
    min_hold_hours: i64,
    max_hold_days: i64,
    small_loss_threshold: f64,
}

impl ExitRuleEngine {
    pub fn new(
        take_profit_pct: f64,
        stop_loss_pct: f64,
        min_hold_hours: i64,
        max_hold_days: i64,
        small_loss_threshold: f64,
    ) -> Self {
        Self {
            take_profit_pct,
            stop_loss_pct,
            min_hold_hours,
            max_hold_days,
            small_loss_threshold,
        }
    }

    /// Build an engine from a strategy parameter set, keeping the time gates
    /// from static configuration.
    pub fn with_params(params: &StrategyParams, min_hold_hours: i64, max_hold_days: i64, small_loss_threshold: f64) -> Self {
        Self::new(
            params.take_profit_pct,
            params.stop_loss_pct,
            min_hold_hours,
            max_hold_days,
            small_loss_threshold,
        )
    }

    /// Evaluate the decision table for one position.
    ///
    /// Capital-protection exits (take-profit, stop-loss) take precedence over
    /// the minimum-hold guard: a day-old position through its stop still
    /// sells immediately.
    pub fn evaluate(&self, pnl_pct: f64, held: Duration) -> ExitDecision {
        if pnl_pct >= self.take_profit_pct {
            return ExitDecision::sell(ExitReason::TakeProfit);
        }
        if pnl_pct <= -self.stop_loss_pct {
            return ExitDecision::sell(ExitReason::StopLoss);
        }

        if held < Duration::hours(self.min_hold_hours) {
            return ExitDecision::hold(ExitReason::TooNew);
        }

        if held >= Duration::days(self.max_hold_days) {
            if pnl_pct > 0.0 {
                return ExitDecision::sell(ExitReason::MaxHoldTimeProfit);
            }
            if pnl_pct > -self.small_loss_threshold {
                return ExitDecision::sell(ExitReason::MaxHoldTimeSmallLoss);
            }
            // Deep under water past max hold: wait for the stop to fire
            // rather than realizing a large loss on a time rule.
            return ExitDecision::hold(ExitReason::MaxHoldAwaitStop);
        }

        ExitDecision::hold(ExitReason::InRange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExitAction;

    /// 3% take-profit, 5% stop, 24h min hold, 7d max hold, 1% small-loss band.
    fn engine() -> ExitRuleEngine {
        ExitRuleEngine::new(0.03, 0.05, 24, 7, 0.01)
    }

    #[test]
    fn take_profit_fires_regardless_of_duration() {
        // NVDA up 3.5% with a 3% target sells even minutes after entry.
        let d = engine().evaluate(0.035, Duration::minutes(30));
        assert_eq!(d, ExitDecision::sell(ExitReason::TakeProfit));

        let d = engine().evaluate(0.035, Duration::days(30));
        assert_eq!(d, ExitDecision::sell(ExitReason::TakeProfit));
    }

    #[test]
    fn stop_loss_beats_min_hold_guard() {
        let d = engine().evaluate(-0.08, Duration::hours(2));
        assert_eq!(d, ExitDecision::sell(ExitReason::StopLoss));
    }

    #[test]
    fn too_new_holds_inside_band() {
        // AAPL at -0.03% one day in (min hold is 24h; 23h is still too new).
        let d = engine().evaluate(-0.0003, Duration::hours(23));
        assert_eq!(d, ExitDecision::hold(ExitReason::TooNew));
    }

    #[test]
    fn max_hold_profit_takes_small_gains() {
        // TSLA at +2.99% on day 9: take-profit misses by a hair, time rule fires.
        let d = engine().evaluate(0.0299, Duration::days(9));
        assert_eq!(d, ExitDecision::sell(ExitReason::MaxHoldTimeProfit));
    }

    #[test]
    fn max_hold_small_loss_closes_stale_position() {
        // GOOGL at -0.58% on day 9, small-loss band 1%.
        let d = engine().evaluate(-0.0058, Duration::days(9));
        assert_eq!(d, ExitDecision::sell(ExitReason::MaxHoldTimeSmallLoss));
    }

    #[test]
    fn max_hold_deep_loss_waits_for_stop() {
        let d = engine().evaluate(-0.03, Duration::days(9));
        assert_eq!(d, ExitDecision::hold(ExitReason::MaxHoldAwaitStop));
    }

    #[test]
    fn in_range_holds() {
        // MSFT at +0.18% on day 2.
        let d = engine().evaluate(0.0018, Duration::days(2));
        assert_eq!(d, ExitDecision::hold(ExitReason::InRange));
    }

    #[test]
    fn zero_pnl_at_max_hold_is_small_loss_exit() {
        let d = engine().evaluate(0.0, Duration::days(7));
        assert_eq!(d, ExitDecision::sell(ExitReason::MaxHoldTimeSmallLoss));
    }

    #[test]
    fn table_is_total() {
        // Every sampled (pnl, duration) pair maps to exactly one decision.
        let e = engine();
        for pnl_bp in (-1000i32..=1000).step_by(7) {
            for hours in (0i64..=24 * 14).step_by(5) {
                let d = e.evaluate(f64::from(pnl_bp) / 10_000.0, Duration::hours(hours));
                match d.action {
                    ExitAction::Sell | ExitAction::Hold => {}
                }
            }
        }
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitAction {
    Sell,
    Hold,
}

/// Why a position was sold or held this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TooNew,
    MaxHoldTimeProfit,
    MaxHoldTimeSmallLoss,
    MaxHoldAwaitStop,
    InRange,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TooNew => "too_new",
            ExitReason::MaxHoldTimeProfit => "max_hold_time_profit",
            ExitReason::MaxHoldTimeSmallLoss => "max_hold_time_small_loss",
            ExitReason::MaxHoldAwaitStop => "max_hold_await_stop",
            ExitReason::InRange => "in_range",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitDecision {
    pub action: ExitAction,
    pub reason: ExitReason,
}

impl ExitDecision {
    pub fn sell(reason: ExitReason) -> Self {
        Self {
            action: ExitAction::Sell,
            reason,
        }
    }

    pub fn hold(reason: ExitReason) -> Self {
        Self {
            action: ExitAction::Hold,
            reason,
        }
    }

    pub fn is_sell(&self) -> bool {
        self.action == ExitAction::Sell
    }
}

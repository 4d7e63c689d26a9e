use std::fmt;

use common::StrategyParams;
use serde::{Deserialize, Serialize};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Pending,
    Evaluated,
    Expanded,
    Pruned,
    Selected,
}

/// Which parameter(s) a node changed relative to its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamDelta {
    Root,
    BuyThreshold { from: f64, to: f64 },
    TakeProfit { from: f64, to: f64 },
    StopLoss { from: f64, to: f64 },
    PositionSize { from: f64, to: f64 },
    FocusTickers { tickers: Vec<String> },
}

impl fmt::Display for ParamDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamDelta::Root => write!(f, "current strategy"),
            ParamDelta::BuyThreshold { from, to } => {
                write!(f, "buy threshold {from:.2} -> {to:.2}")
            }
            ParamDelta::TakeProfit { from, to } => {
                write!(f, "take profit {:.1}% -> {:.1}%", from * 100.0, to * 100.0)
            }
            ParamDelta::StopLoss { from, to } => {
                write!(f, "stop loss {:.1}% -> {:.1}%", from * 100.0, to * 100.0)
            }
            ParamDelta::PositionSize { from, to } => {
                write!(f, "position size x{from:.1} -> x{to:.1}")
            }
            ParamDelta::FocusTickers { tickers } => {
                write!(f, "focus on {}", tickers.join(", "))
            }
        }
    }
}

/// One strategy variation in the arena.
#[derive(Debug, Clone)]
pub struct HypothesisNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub delta: ParamDelta,
    pub params: StrategyParams,
    pub depth: usize,
    pub score: f64,
    pub status: NodeStatus,
}

impl HypothesisNode {
    pub fn root(params: StrategyParams) -> Self {
        Self {
            id: 0,
            parent: None,
            delta: ParamDelta::Root,
            params,
            depth: 0,
            score: 0.0,
            status: NodeStatus::Pending,
        }
    }
}

//! Best-first beam search over the hypothesis tree.
//!
//! The tree is held in an arena indexed by node id and driven by an explicit
//! score-ordered frontier, so memory stays bounded and a run can be stopped
//! at any point with a usable best-so-far result.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use common::StrategyParams;
use tracing::{debug, info, warn};

use crate::simulate::{simulate, HistoricalSnapshot};
use crate::tree::{HypothesisNode, NodeId, NodeStatus, ParamDelta};

/// Upper bound on children generated per expansion.
const BRANCHING_FACTOR: usize = 7;

const SENTIMENT_STEP: f64 = 0.1;
const SENTIMENT_CEIL: f64 = 0.7;
const SENTIMENT_FLOOR: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_depth: usize,
    pub beam_width: usize,
    /// A child must beat its parent by more than this to stay expandable.
    pub improvement_epsilon: f64,
    /// Hard cap on node evaluations; 0 derives depth x beam x branching.
    pub max_evaluations: usize,
}

impl SearchConfig {
    pub fn evaluation_budget(&self) -> usize {
        if self.max_evaluations > 0 {
            self.max_evaluations
        } else {
            self.max_depth * self.beam_width * BRANCHING_FACTOR + 1
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            beam_width: 3,
            improvement_epsilon: 0.01,
            max_evaluations: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub selected_params: StrategyParams,
    pub rationale: String,
    pub best_score: f64,
    pub baseline_score: f64,
    pub nodes_evaluated: usize,
    pub timed_out: bool,
    /// Human-readable delta chain from root to the selected node.
    pub path: Vec<String>,
}

struct FrontierEntry {
    score: f64,
    id: NodeId,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on score; earlier ids win ties for determinism.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

pub struct HypothesisSearch<'a> {
    config: SearchConfig,
    history: &'a HistoricalSnapshot,
}

impl<'a> HypothesisSearch<'a> {
    pub fn new(config: SearchConfig, history: &'a HistoricalSnapshot) -> Self {
        Self { config, history }
    }

    /// Run one search from the active parameter set.
    pub fn run(&self, root_params: StrategyParams) -> SearchOutcome {
        let (arena, best_id, evaluations, timed_out) = self.explore(root_params);

        let baseline_score = arena[0].score;
        let best = &arena[best_id];
        let path = self.path_of(&arena, best_id);
        let rationale = self.synthesize_rationale(&arena, best_id, evaluations, timed_out);

        info!(
            nodes = arena.len(),
            evaluations,
            best_score = best.score,
            baseline = baseline_score,
            "hypothesis search complete"
        );

        SearchOutcome {
            selected_params: best.params.clone(),
            rationale,
            best_score: best.score,
            baseline_score,
            nodes_evaluated: evaluations,
            timed_out,
            path,
        }
    }

    fn explore(&self, root_params: StrategyParams) -> (Vec<HypothesisNode>, NodeId, usize, bool) {
        let mut arena = Vec::new();
        let mut root = HypothesisNode::root(root_params);
        root.score = simulate(&root.params, self.history).score;
        root.status = NodeStatus::Evaluated;
        arena.push(root);

        let budget = self.config.evaluation_budget();
        let mut evaluations = 1usize;
        let mut best_id: NodeId = 0;
        let mut timed_out = false;

        let mut frontier = BinaryHeap::new();
        frontier.push(FrontierEntry {
            score: arena[0].score,
            id: 0,
        });

        'depth: for _ in 0..self.config.max_depth {
            let mut beam = Vec::with_capacity(self.config.beam_width);
            for _ in 0..self.config.beam_width {
                match frontier.pop() {
                    Some(entry) => beam.push(entry.id),
                    None => break,
                }
            }
            if beam.is_empty() {
                break;
            }

            let mut next_frontier = BinaryHeap::new();
            for parent_id in beam {
                let parent_score = arena[parent_id].score;
                let parent_depth = arena[parent_id].depth;
                let variations = generate_variations(&arena[parent_id].params, self.history);
                arena[parent_id].status = NodeStatus::Expanded;

                for (delta, params) in variations {
                    if evaluations >= budget {
                        warn!(budget, "evaluation budget exhausted, returning best so far");
                        timed_out = true;
                        break 'depth;
                    }

                    let sim = simulate(&params, self.history);
                    evaluations += 1;

                    let id = arena.len();
                    let improved = sim.score > parent_score + self.config.improvement_epsilon;
                    debug!(
                        id,
                        parent = parent_id,
                        score = sim.score,
                        %delta,
                        pruned = !improved,
                        "evaluated hypothesis"
                    );

                    arena.push(HypothesisNode {
                        id,
                        parent: Some(parent_id),
                        delta,
                        params,
                        depth: parent_depth + 1,
                        score: sim.score,
                        status: if improved {
                            NodeStatus::Evaluated
                        } else {
                            NodeStatus::Pruned
                        },
                    });

                    if improved {
                        if sim.score > arena[best_id].score {
                            best_id = id;
                        }
                        next_frontier.push(FrontierEntry {
                            score: sim.score,
                            id,
                        });
                    }
                }
            }

            // An empty next frontier means no child improved on its parent.
            frontier = next_frontier;
        }

        arena[best_id].status = NodeStatus::Selected;
        (arena, best_id, evaluations, timed_out)
    }

    fn path_of(&self, arena: &[HypothesisNode], id: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(node_id) = cursor {
            let node = &arena[node_id];
            path.push(node.delta.to_string());
            cursor = node.parent;
        }
        path.reverse();
        path
    }

    fn synthesize_rationale(
        &self,
        arena: &[HypothesisNode],
        best_id: NodeId,
        evaluations: usize,
        timed_out: bool,
    ) -> String {
        let best = &arena[best_id];
        let baseline = arena[0].score;
        let sim = simulate(&best.params, self.history);
        let chain = self.path_of(arena, best_id).join(" -> ");

        let mut rationale = format!(
            "Evaluated {evaluations} strategy variations to depth {} (beam width {}). \
             Recommended path: {chain}. Simulated score {:.3} vs baseline {:.3} \
             over {} trades ({:.0}% win rate).",
            self.config.max_depth,
            self.config.beam_width,
            best.score,
            baseline,
            sim.trades,
            sim.win_rate * 100.0,
        );
        if best_id == 0 {
            rationale.push_str(" No variation beat the current strategy; keeping it unchanged.");
        }
        if timed_out {
            rationale.push_str(" Search stopped at its evaluation budget.");
        }
        rationale
    }
}

/// Generate the bounded variation set for one node.
///
/// Mirrors the variation families explored by the weekend analyzer:
/// sentiment-threshold nudges in both directions, wider take profit,
/// tighter stop loss, larger and smaller position sizing, and focusing on
/// the historically best-performing tickers.
fn generate_variations(
    base: &StrategyParams,
    history: &HistoricalSnapshot,
) -> Vec<(ParamDelta, StrategyParams)> {
    let mut variations = Vec::with_capacity(BRANCHING_FACTOR);

    let raise = (base.buy_threshold + SENTIMENT_STEP).min(SENTIMENT_CEIL);
    if raise > base.buy_threshold {
        let mut params = base.clone();
        params.buy_threshold = raise;
        variations.push((
            ParamDelta::BuyThreshold {
                from: base.buy_threshold,
                to: raise,
            },
            params,
        ));
    }

    let lower = (base.buy_threshold - SENTIMENT_STEP).max(SENTIMENT_FLOOR);
    if lower < base.buy_threshold {
        let mut params = base.clone();
        params.buy_threshold = lower;
        variations.push((
            ParamDelta::BuyThreshold {
                from: base.buy_threshold,
                to: lower,
            },
            params,
        ));
    }

    let wide_tp = base.take_profit_pct * 1.3;
    let mut params = base.clone();
    params.take_profit_pct = wide_tp;
    variations.push((
        ParamDelta::TakeProfit {
            from: base.take_profit_pct,
            to: wide_tp,
        },
        params,
    ));

    let tight_sl = base.stop_loss_pct * 0.8;
    let mut params = base.clone();
    params.stop_loss_pct = tight_sl;
    variations.push((
        ParamDelta::StopLoss {
            from: base.stop_loss_pct,
            to: tight_sl,
        },
        params,
    ));

    for factor in [1.3, 0.7] {
        let size = base.position_size_multiplier * factor;
        let mut params = base.clone();
        params.position_size_multiplier = size;
        variations.push((
            ParamDelta::PositionSize {
                from: base.position_size_multiplier,
                to: size,
            },
            params,
        ));
    }

    if base.focus_tickers.is_none() {
        let best = history.best_performing_tickers(3);
        if !best.is_empty() {
            let mut params = base.clone();
            params.focus_tickers = Some(best.clone());
            variations.push((ParamDelta::FocusTickers { tickers: best }, params));
        }
    }

    variations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::HistoricalSignal;
    use chrono::Utc;

    fn record(ticker: &str, sentiment: f64, forward: f64) -> HistoricalSignal {
        HistoricalSignal {
            ticker: ticker.into(),
            sentiment,
            forward_return_pct: forward,
            observed_at: Utc::now(),
        }
    }

    /// Low-sentiment records lose, high-sentiment records win: raising the
    /// buy threshold strictly improves the simulated win rate.
    fn threshold_sensitive_history() -> HistoricalSnapshot {
        let mut records = Vec::new();
        for i in 0..20 {
            let ticker = ["AAPL", "MSFT", "NVDA", "GOOGL"][i % 4];
            records.push(record(ticker, 0.45, -0.05));
            records.push(record(ticker, 0.75, 0.06));
        }
        HistoricalSnapshot::new(records)
    }

    #[test]
    fn search_terminates_within_evaluation_bound() {
        let config = SearchConfig {
            max_depth: 3,
            beam_width: 2,
            improvement_epsilon: 0.0,
            max_evaluations: 0,
        };
        let history = threshold_sensitive_history();
        let search = HypothesisSearch::new(config.clone(), &history);
        let outcome = search.run(StrategyParams::default());

        assert!(outcome.nodes_evaluated <= config.evaluation_budget());
        assert!(outcome.nodes_evaluated <= 3 * 2 * BRANCHING_FACTOR + 1);
    }

    #[test]
    fn search_finds_improving_threshold() {
        let config = SearchConfig {
            max_depth: 2,
            beam_width: 3,
            improvement_epsilon: 0.001,
            max_evaluations: 0,
        };
        let history = threshold_sensitive_history();
        let search = HypothesisSearch::new(config, &history);
        let outcome = search.run(StrategyParams {
            buy_threshold: 0.4,
            ..StrategyParams::default()
        });

        assert!(outcome.best_score > outcome.baseline_score);
        assert!(outcome.selected_params.buy_threshold > 0.4);
        assert!(!outcome.path.is_empty());
    }

    #[test]
    fn exhausted_budget_returns_best_so_far() {
        let config = SearchConfig {
            max_depth: 4,
            beam_width: 4,
            improvement_epsilon: 0.0,
            max_evaluations: 3,
        };
        let history = threshold_sensitive_history();
        let search = HypothesisSearch::new(config, &history);
        let outcome = search.run(StrategyParams::default());

        assert!(outcome.timed_out);
        assert_eq!(outcome.nodes_evaluated, 3);
        assert!(outcome.best_score >= outcome.baseline_score);
    }

    #[test]
    fn huge_epsilon_converges_to_root() {
        let config = SearchConfig {
            max_depth: 3,
            beam_width: 3,
            improvement_epsilon: 10.0,
            max_evaluations: 0,
        };
        let history = threshold_sensitive_history();
        let search = HypothesisSearch::new(config, &history);
        let outcome = search.run(StrategyParams::default());

        // Every child pruned at depth 1: the root survives as selection.
        assert_eq!(outcome.path, vec!["current strategy".to_string()]);
        assert!(outcome.rationale.contains("keeping it unchanged"));
    }

    #[test]
    fn parents_are_expanded_before_children_exist() {
        let config = SearchConfig {
            max_depth: 2,
            beam_width: 2,
            improvement_epsilon: 0.0,
            max_evaluations: 0,
        };
        let history = threshold_sensitive_history();
        let search = HypothesisSearch::new(config, &history);
        let (arena, _, _, _) = search.explore(StrategyParams::default());

        for node in arena.iter().filter(|n| n.parent.is_some()) {
            let parent = &arena[node.parent.unwrap()];
            assert!(matches!(
                parent.status,
                NodeStatus::Expanded | NodeStatus::Selected
            ));
            assert_eq!(node.depth, parent.depth + 1);
            assert!(node.depth <= 2);
        }
    }

    #[test]
    fn variations_are_bounded() {
        let history = threshold_sensitive_history();
        let variations = generate_variations(&StrategyParams::default(), &history);
        assert!(variations.len() <= BRANCHING_FACTOR);
        // Threshold at ceiling drops the raise variation.
        let at_ceiling = StrategyParams {
            buy_threshold: SENTIMENT_CEIL,
            ..StrategyParams::default()
        };
        let capped = generate_variations(&at_ceiling, &history);
        assert!(capped.len() < variations.len());
    }
}

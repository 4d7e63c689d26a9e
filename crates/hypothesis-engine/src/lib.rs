//! Bounded best-first search over strategy-parameter hypotheses.
//!
//! Runs on its own (e.g. weekend) cadence against a read-only historical
//! snapshot. The tree lives in an arena for the duration of one run; only
//! the selected parameter set and its rationale survive, written atomically
//! as a dated insight artifact.

mod insight;
mod search;
mod simulate;
mod tree;

pub use insight::InsightArtifact;
pub use search::{HypothesisSearch, SearchConfig, SearchOutcome};
pub use simulate::{simulate, HistoricalSignal, HistoricalSnapshot, SimResult};
pub use tree::{HypothesisNode, NodeId, NodeStatus, ParamDelta};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Result;
use serde::{Deserialize, Serialize};

/// Outcome label attached to a memory record once the corresponding trade
/// resolves. Records start UNLABELED and are labeled by an out-of-band
/// process; they are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeLabel {
    Win,
    Loss,
    Unlabeled,
}

/// A stored market-condition description with a known (or pending) outcome.
///
/// The embedding vector lives inside the similarity provider; only the text
/// and metadata cross the store/query contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub source_text: String,
    /// Ticker this record describes, or "market" for broad conditions.
    pub scope: String,
    pub observed_at: DateTime<Utc>,
    pub outcome: OutcomeLabel,
}

/// One nearest-neighbor result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    pub record: MemoryRecord,
    /// Cosine similarity in [0, 1].
    pub similarity: f64,
}

/// Narrow contract over the embedding/vector-similarity provider so the
/// concrete backend is swappable without touching retriever logic.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append one record. Records are immutable once stored.
    async fn store(&self, record: MemoryRecord) -> Result<()>;

    /// Return the `n` nearest records to `text` by embedding similarity,
    /// most similar first.
    async fn query(&self, text: &str, n: usize) -> Result<Vec<QueryHit>>;
}

//! Historical-similarity memory — store/query contract plus the retriever
//! that adjusts live signal confidence using past outcomes.

mod http;
mod retriever;
mod types;

pub use http::HttpMemoryStore;
pub use retriever::{
    compute_boost, describe_conditions, MemoryAdjustment, MemoryRetriever, RetrieverConfig,
};
pub use types::{MemoryRecord, MemoryStore, OutcomeLabel, QueryHit};

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use common::error::AppError;

use crate::{scoring::Identified, sparse::SparseVector, RetrievalLimits};

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

/// One hit from the vector index: point id, the score of the query that produced it, and
/// the stored payload (`{content, meta: {...}}`).
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

impl RawHit {
    pub fn content(&self) -> &str {
        self.payload
            .get("content")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

impl Identified for RawHit {
    fn identifier(&self) -> &str {
        &self.id
    }
}

/// A fused dense + sparse query.
#[derive(Debug, Clone)]
pub struct HybridQuery {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub sparse_limit: u64,
    pub dense_limit: u64,
    pub fusion_limit: u64,
}

impl HybridQuery {
    pub fn new(dense: Vec<f32>, sparse: SparseVector, limits: &RetrievalLimits) -> Self {
        Self {
            dense,
            sparse,
            sparse_limit: limits.sparse_limit,
            dense_limit: limits.dense_limit,
            fusion_limit: limits.hybrid_limit,
        }
    }
}

/// The document store behind retrieval.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Runs both prefetches and returns at most `fusion_limit` hits, best first, scored by
    /// reciprocal rank fusion.
    async fn query_hybrid(&self, query: &HybridQuery) -> Result<Vec<RawHit>, AppError>;

    /// Fetches stored points by id. Unknown ids are skipped.
    async fn retrieve_by_ids(&self, ids: &[String]) -> Result<Vec<RawHit>, AppError>;

    /// Connection slots currently free, for diagnostics.
    fn available_connections(&self) -> usize;
}

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::error::AppError;

use super::{DocumentIndex, HybridQuery, RawHit};
use crate::{
    pool::ResourcePool,
    scoring::{reciprocal_rank_fusion, RrfConfig, Scored},
    sparse::SparseVector,
};

/// A stored point: payload plus both vectors.
#[derive(Debug, Clone)]
pub struct MemoryPoint {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: serde_json::Value,
}

/// In-process index with the same query semantics as the Qdrant collection. Backs tests
/// and local runs without a vector database.
pub struct MemoryIndex {
    pool: ResourcePool<Arc<Vec<MemoryPoint>>>,
}

impl MemoryIndex {
    pub fn new(points: Vec<MemoryPoint>, pool_size: usize) -> Result<Self, AppError> {
        let shared = Arc::new(points);
        let slots = (0..pool_size.max(1)).map(|_| shared.clone()).collect();
        Ok(Self {
            pool: ResourcePool::new("memory-index", slots, Duration::from_secs(5))?,
        })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn to_hit(point: &MemoryPoint) -> RawHit {
    RawHit {
        id: point.id.clone(),
        score: 0.0,
        payload: point.payload.clone(),
    }
}

fn top_k(
    mut scored: Vec<Scored<RawHit>>,
    signal: fn(&Scored<RawHit>) -> f32,
    limit: u64,
) -> Vec<Scored<RawHit>> {
    scored.sort_by(|a, b| signal(b).total_cmp(&signal(a)));
    scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    scored
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn query_hybrid(&self, query: &HybridQuery) -> Result<Vec<RawHit>, AppError> {
        let points = self.pool.checkout().await?;

        let dense = top_k(
            points
                .iter()
                .map(|p| Scored::new(to_hit(p)).with_dense_score(cosine(&query.dense, &p.dense)))
                .collect(),
            |s| s.scores.dense.unwrap_or_default(),
            query.dense_limit,
        );
        let sparse = top_k(
            points
                .iter()
                .map(|p| Scored::new(to_hit(p)).with_sparse_score(query.sparse.dot(&p.sparse)))
                .filter(|s| s.scores.sparse.unwrap_or_default() > 0.0)
                .collect(),
            |s| s.scores.sparse.unwrap_or_default(),
            query.sparse_limit,
        );

        let mut fused = reciprocal_rank_fusion(dense, sparse, RrfConfig::default());
        fused.truncate(usize::try_from(query.fusion_limit).unwrap_or(usize::MAX));

        Ok(fused
            .into_iter()
            .map(|scored| RawHit {
                score: scored.fused,
                ..scored.item
            })
            .collect())
    }

    async fn retrieve_by_ids(&self, ids: &[String]) -> Result<Vec<RawHit>, AppError> {
        let points = self.pool.checkout().await?;
        Ok(ids
            .iter()
            .filter_map(|id| points.iter().find(|p| &p.id == id))
            .map(to_hit)
            .collect())
    }

    fn available_connections(&self) -> usize {
        self.pool.available()
    }
}

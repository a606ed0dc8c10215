use std::{sync::Arc, time::Duration};

use common::error::AppError;
use llm_backend::LlmBackend;
use tracing::{debug, error, warn};

use crate::index::RawHit;

/// Cross-encoder reranking over candidate texts. The returned order is authoritative.
pub struct Reranker {
    backend: Arc<dyn LlmBackend>,
    top_n: usize,
    request_timeout: Duration,
}

impl Reranker {
    pub fn new(backend: Arc<dyn LlmBackend>, top_n: usize, request_timeout: Duration) -> Self {
        Self {
            backend,
            top_n,
            request_timeout,
        }
    }

    /// Reorders `hits` by relevance to `query`, keeping at most `top_n`, each paired with
    /// its relevance score. Failures propagate; there is no unranked fallback.
    pub async fn rerank(
        &self,
        query: &str,
        hits: Vec<RawHit>,
    ) -> Result<Vec<(RawHit, f32)>, AppError> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = hits.iter().map(|hit| hit.content().to_string()).collect();
        let results = tokio::time::timeout(
            self.request_timeout,
            self.backend.rerank_documents(query, &texts, self.top_n),
        )
        .await
        .map_err(AppError::from)
        .and_then(|result| result)
        .inspect_err(|err| error!(error = %err, candidates = texts.len(), "rerank failed"))?;

        let mut slots: Vec<Option<RawHit>> = hits.into_iter().map(Some).collect();
        let ranked: Vec<(RawHit, f32)> = results
            .into_iter()
            .filter_map(|result| {
                let hit = slots.get_mut(result.index).and_then(Option::take);
                if hit.is_none() {
                    warn!(index = result.index, "rerank returned an unknown or repeated index");
                }
                hit.map(|hit| (hit, result.relevance_score))
            })
            .take(self.top_n)
            .collect();

        debug!(kept = ranked.len(), "rerank finished");
        Ok(ranked)
    }
}

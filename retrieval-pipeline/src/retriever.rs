use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{error::AppError, storage::types::document::Document};
use llm_backend::LlmBackend;
use tracing::{error, info, instrument, warn};

use crate::{
    assemble::assemble,
    index::{DocumentIndex, HybridQuery, RawHit},
    sparse::SparseEmbedder,
    RetrievalLimits,
};

/// Embeds a query both ways and runs the fused index query.
pub struct HybridRetriever {
    backend: Arc<dyn LlmBackend>,
    sparse: Arc<SparseEmbedder>,
    index: Arc<dyn DocumentIndex>,
    limits: RetrievalLimits,
    request_timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        sparse: Arc<SparseEmbedder>,
        index: Arc<dyn DocumentIndex>,
        limits: RetrievalLimits,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            sparse,
            index,
            limits,
            request_timeout,
        }
    }

    pub fn limits(&self) -> &RetrievalLimits {
        &self.limits
    }

    pub fn index(&self) -> &Arc<dyn DocumentIndex> {
        &self.index
    }

    pub fn sparse_embedder(&self) -> &Arc<SparseEmbedder> {
        &self.sparse
    }

    /// Candidate hits for `query`, best first, at most `hybrid_limit` of them.
    ///
    /// An empty result means nothing matched. Embedding or index failures are logged and
    /// returned as errors so callers can tell the two apart.
    #[instrument(skip_all, fields(query_chars = query.chars().count()))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RawHit>, AppError> {
        let started = Instant::now();

        let (dense, sparse) = tokio::join!(
            tokio::time::timeout(
                self.request_timeout,
                self.backend.generate_dense_embedding(query)
            ),
            self.sparse.embed(query)
        );
        let dense = dense
            .map_err(AppError::from)
            .and_then(|result| result)
            .inspect_err(|err| error!(error = %err, "dense query embedding failed"))?;
        let sparse =
            sparse.inspect_err(|err| error!(error = %err, "sparse query embedding failed"))?;

        let query = HybridQuery::new(dense, sparse, &self.limits);
        let hits = tokio::time::timeout(self.request_timeout, self.index.query_hybrid(&query))
            .await
            .map_err(AppError::from)
            .and_then(|result| result)
            .inspect_err(|err| error!(error = %err, "index query failed"))?;

        if hits.is_empty() {
            warn!("no documents found in index");
        }
        info!(
            hits = hits.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "hybrid retrieval finished"
        );
        Ok(hits)
    }

    /// Rehydrates documents by id, in the order the ids were given.
    pub async fn documents_by_ids(&self, ids: &[String]) -> Result<Vec<Document>, AppError> {
        let hits = tokio::time::timeout(self.request_timeout, self.index.retrieve_by_ids(ids))
            .await??;
        Ok(hits
            .into_iter()
            .map(|hit| Document {
                retrieval_score: None,
                ..assemble(hit, None)
            })
            .collect())
    }
}

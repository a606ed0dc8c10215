pub mod assemble;
pub mod formatting;
pub mod index;
pub mod merge;
pub mod pool;
pub mod reranking;
pub mod retriever;
pub mod scoring;
pub mod sparse;

use std::{sync::Arc, time::Duration};

use common::{error::AppError, storage::types::document::Document, utils::config::AppConfig};
use llm_backend::LlmBackend;
use tracing::{info, instrument};

use assemble::assemble;
use index::DocumentIndex;
use reranking::Reranker;
use retriever::HybridRetriever;
use sparse::SparseEmbedder;

pub use merge::{merge, order_for_panel};

/// Candidate counts for each retrieval stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalLimits {
    pub sparse_limit: u64,
    pub dense_limit: u64,
    pub hybrid_limit: u64,
    pub rerank_top_n: usize,
}

impl RetrievalLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sparse_limit: config.sparse_limit,
            dense_limit: config.dense_limit,
            hybrid_limit: config.hybrid_limit,
            rerank_top_n: config.rerank_top_n,
        }
    }
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            sparse_limit: 100,
            dense_limit: 100,
            hybrid_limit: 50,
            rerank_top_n: 20,
        }
    }
}

/// Query in, ranked documents out: hybrid retrieval, rerank, assembly.
pub struct RetrievalPipeline {
    retriever: HybridRetriever,
    reranker: Reranker,
}

impl RetrievalPipeline {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        sparse: Arc<SparseEmbedder>,
        index: Arc<dyn DocumentIndex>,
        limits: RetrievalLimits,
        request_timeout: Duration,
    ) -> Self {
        let reranker = Reranker::new(backend.clone(), limits.rerank_top_n, request_timeout);
        Self {
            retriever: HybridRetriever::new(backend, sparse, index, limits, request_timeout),
            reranker,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        backend: Arc<dyn LlmBackend>,
        index: Arc<dyn DocumentIndex>,
    ) -> Self {
        Self::new(
            backend,
            Arc::new(SparseEmbedder::from_config(config)),
            index,
            RetrievalLimits::from_config(config),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// The documents that best answer `query`, in rerank order, each carrying both its
    /// fusion score and its relevance score.
    ///
    /// `Ok(vec![])` means nothing relevant was found. Embedding, index and rerank
    /// failures surface as errors.
    #[instrument(skip_all)]
    pub async fn retrieve_documents(&self, query: &str) -> Result<Vec<Document>, AppError> {
        let hits = self.retriever.retrieve(query).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<Document> = self
            .reranker
            .rerank(query, hits)
            .await?
            .into_iter()
            .map(|(hit, relevance)| assemble(hit, Some(relevance)))
            .collect();

        info!(documents = documents.len(), "retrieved documents");
        Ok(documents)
    }

    pub async fn documents_by_ids(&self, ids: &[String]) -> Result<Vec<Document>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.retriever.documents_by_ids(ids).await
    }

    pub fn limits(&self) -> &RetrievalLimits {
        self.retriever.limits()
    }

    /// Free index connections, for diagnostics and leak checks.
    pub fn available_connections(&self) -> usize {
        self.retriever.index().available_connections()
    }

    /// Free sparse-inference slots.
    pub fn available_sparse_permits(&self) -> usize {
        self.retriever.sparse_embedder().available_permits()
    }
}

pub mod cohere;
pub mod litellm;
pub mod prompts;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
pub mod sse;

use std::sync::Arc;

use async_trait::async_trait;
use citation_stream::ChatStreamEvent;
use common::{
    error::AppError,
    storage::types::{chat_message::ChatMessage, document::Document},
    utils::config::{AppConfig, LlmService},
};
use futures::stream::BoxStream;
use serde::Deserialize;

pub use cohere::CohereBackend;
pub use litellm::LiteLlmBackend;

/// Provider-neutral chat events for one streaming call.
pub type ChatEventStream = BoxStream<'static, Result<ChatStreamEvent, AppError>>;

/// One reranked candidate: its position in the submitted list and the cross-encoder score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f32,
}

/// The model provider behind a chat turn.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Starts a grounded, streaming chat completion. `messages` excludes the system prompt.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        documents: &[Document],
    ) -> Result<ChatEventStream, AppError>;

    /// Scores `texts` against `query`, best first, at most `top_n` entries.
    async fn rerank_documents(
        &self,
        query: &str,
        texts: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, AppError>;

    async fn generate_dense_embedding(&self, query: &str) -> Result<Vec<f32>, AppError>;

    async fn create_chat_session_name(&self, query: &str) -> Result<String, AppError>;

    async fn rewrite_query(
        &self,
        query: &str,
        _history: &[ChatMessage],
    ) -> Result<String, AppError> {
        Ok(query.to_string())
    }
}

pub fn backend_from_config(config: &AppConfig) -> Result<Arc<dyn LlmBackend>, AppError> {
    let backend: Arc<dyn LlmBackend> = match config.llm_service {
        LlmService::Cohere => Arc::new(CohereBackend::from_config(config)?),
        LlmService::Litellm => Arc::new(LiteLlmBackend::from_config(config)?),
    };
    Ok(backend)
}

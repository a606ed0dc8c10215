use std::sync::Arc;

use chat_pipeline::ChatPipeline;
use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    utils::config::AppConfig,
};
use llm_backend::backend_from_config;
use retrieval_pipeline::{index::QdrantIndex, RetrievalPipeline};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub chat: Arc<ChatPipeline>,
}

impl ApiState {
    pub fn new(db: Arc<SurrealDbClient>, chat: Arc<ChatPipeline>) -> Self {
        Self { db, chat }
    }

    /// Connects every collaborator named in `config`: SurrealDB, the LLM provider and the
    /// Qdrant collection.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        db.ensure_initialized().await?;

        let backend = backend_from_config(config)?;
        let index = Arc::new(QdrantIndex::from_config(config)?);
        let retrieval = Arc::new(RetrievalPipeline::from_config(config, backend.clone(), index));
        let chat = Arc::new(ChatPipeline::from_config(
            config,
            backend,
            retrieval,
            db.clone(),
        ));

        Ok(Self::new(db, chat))
    }
}

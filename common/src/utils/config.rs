use std::thread::available_parallelism;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmService {
    #[default]
    Cohere,
    Litellm,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingQuantization {
    #[default]
    Float,
    Uint8,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SparseModelKind {
    #[default]
    Splade,
    Hashed,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub llm_service: LlmService,
    #[serde(default)]
    pub cohere_api_key: String,
    #[serde(default = "default_cohere_base_url")]
    pub cohere_base_url: String,
    #[serde(default = "default_chat_model")]
    pub cohere_chat_model: String,
    #[serde(default = "default_name_model")]
    pub cohere_name_model: String,
    #[serde(default = "default_embed_model")]
    pub cohere_embed_model: String,
    #[serde(default = "default_rerank_model")]
    pub cohere_rerank_model: String,
    #[serde(default)]
    pub embedding_quantization: EmbeddingQuantization,
    #[serde(default = "default_litellm_base_url")]
    pub litellm_base_url: String,
    #[serde(default)]
    pub litellm_api_key: Option<String>,

    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,
    #[serde(default = "default_dense_vector")]
    pub qdrant_dense_vector: String,
    #[serde(default = "default_sparse_vector")]
    pub qdrant_sparse_vector: String,
    #[serde(default = "default_qdrant_pool_size")]
    pub qdrant_pool_size: usize,

    #[serde(default)]
    pub sparse_model: SparseModelKind,
    pub sparse_concurrency: Option<usize>,
    pub fastembed_cache_dir: Option<String>,

    #[serde(default = "default_sparse_limit")]
    pub sparse_limit: u64,
    #[serde(default = "default_dense_limit")]
    pub dense_limit: u64,
    #[serde(default = "default_hybrid_limit")]
    pub hybrid_limit: u64,
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    #[serde(default = "default_pool_checkout_timeout_secs")]
    pub pool_checkout_timeout_secs: u64,

    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl AppConfig {
    /// Worker slots for the local sparse model, one per core unless overridden.
    pub fn sparse_concurrency(&self) -> usize {
        self.sparse_concurrency
            .unwrap_or_else(|| available_parallelism().map_or(2, std::num::NonZeroUsize::get))
            .max(1)
    }
}

fn default_cohere_base_url() -> String {
    "https://api.cohere.com".to_string()
}

fn default_chat_model() -> String {
    "command-r-plus".to_string()
}

fn default_name_model() -> String {
    "command-r".to_string()
}

fn default_embed_model() -> String {
    "embed-multilingual-v3.0".to_string()
}

fn default_rerank_model() -> String {
    "rerank-multilingual-v3.0".to_string()
}

fn default_litellm_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_qdrant_collection() -> String {
    "1_gemeente_cohere".to_string()
}

fn default_dense_vector() -> String {
    "text-dense".to_string()
}

fn default_sparse_vector() -> String {
    "text-sparse".to_string()
}

const fn default_qdrant_pool_size() -> usize {
    8
}

const fn default_sparse_limit() -> u64 {
    100
}

const fn default_dense_limit() -> u64 {
    100
}

const fn default_hybrid_limit() -> u64 {
    50
}

const fn default_rerank_top_n() -> usize {
    20
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_stream_idle_timeout_secs() -> u64 {
    60
}

const fn default_pool_checkout_timeout_secs() -> u64 {
    10
}

fn default_data_dir() -> String {
    "./data".to_string()
}

const fn default_http_port() -> u16 {
    8000
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        Config::builder()
            .set_override("surrealdb_address", "mem://")
            .and_then(|b| b.set_override("surrealdb_username", "root"))
            .and_then(|b| b.set_override("surrealdb_password", "root"))
            .and_then(|b| b.set_override("surrealdb_namespace", "bron"))
            .and_then(|b| b.set_override("surrealdb_database", "chat"))
            .expect("overrides")
            .build()
            .expect("config builds")
    }

    #[test]
    fn defaults_fill_everything_but_connection_keys() {
        let config: AppConfig = minimal().try_deserialize().expect("deserializes");

        assert_eq!(config.llm_service, LlmService::Cohere);
        assert_eq!(config.rerank_top_n, 20);
        assert_eq!(config.cohere_rerank_model, "rerank-multilingual-v3.0");
        assert_eq!(config.embedding_quantization, EmbeddingQuantization::Float);
        assert!(config.hybrid_limit <= config.dense_limit);
        assert!(config.sparse_concurrency() >= 1);
    }

    #[test]
    fn service_selection_is_lowercase() {
        let config: AppConfig = Config::builder()
            .add_source(minimal())
            .set_override("llm_service", "litellm")
            .expect("override")
            .set_override("sparse_model", "hashed")
            .expect("override")
            .set_override("sparse_concurrency", 0)
            .expect("override")
            .build()
            .expect("builds")
            .try_deserialize()
            .expect("deserializes");

        assert_eq!(config.llm_service, LlmService::Litellm);
        assert_eq!(config.sparse_model, SparseModelKind::Hashed);
        assert_eq!(config.sparse_concurrency(), 1);
    }
}

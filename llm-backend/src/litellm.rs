use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionStreamResponse, CreateEmbeddingRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use chrono::Local;
use citation_stream::ChatStreamEvent;
use common::{
    error::AppError,
    storage::types::{
        chat_message::{ChatMessage, ChatRole},
        document::Document,
    },
    utils::config::AppConfig,
};
use futures::StreamExt;
use tracing::info;

use crate::{
    cohere::{ensure_success, RerankRequest, RerankResponse},
    prompts::{
        grounding_documents, inline_documents, rag_system_message, truncate_chat_name,
        CHAT_NAME_SYSTEM_MESSAGE,
    },
    ChatEventStream, LlmBackend, RerankHit,
};

/// Cohere models reached through a LiteLLM proxy's OpenAI-compatible API.
///
/// The proxy has no grounded-chat document channel, so documents are inlined in the system
/// prompt and the stream never carries citations.
#[derive(Clone)]
pub struct LiteLlmBackend {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    name_model: String,
    embed_model: String,
    rerank_model: String,
    request_timeout: Duration,
}

impl LiteLlmBackend {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let base_url = config.litellm_base_url.trim_end_matches('/').to_string();
        let mut openai_config = OpenAIConfig::new().with_api_base(&base_url);
        if let Some(key) = &config.litellm_api_key {
            openai_config = openai_config.with_api_key(key);
        }
        let request_timeout = Duration::from_secs(config.request_timeout_secs);

        Ok(Self {
            client: Client::with_config(openai_config),
            http: reqwest::Client::builder()
                .connect_timeout(request_timeout)
                .build()?,
            base_url,
            api_key: config.litellm_api_key.clone(),
            chat_model: format!("cohere/{}", config.cohere_chat_model),
            name_model: format!("cohere/{}", config.cohere_name_model),
            embed_model: format!("cohere/{}", config.cohere_embed_model),
            rerank_model: format!("cohere/{}", config.cohere_rerank_model),
            request_timeout,
        })
    }

    fn chat_request(
        &self,
        model: &str,
        system: String,
        messages: &[ChatMessage],
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let mut wire: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(messages.len().saturating_add(1));
        wire.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?
                .into(),
        );
        for message in messages {
            wire.push(to_openai_message(message)?);
        }

        Ok(CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(wire)
            .build()?)
    }
}

fn to_openai_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, AppError> {
    let content = message.content.clone();
    let wire = match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    };
    Ok(wire)
}

fn delta_event(chunk: &CreateChatCompletionStreamResponse) -> ChatStreamEvent {
    chunk
        .choices
        .first()
        .and_then(|choice| choice.delta.content.clone())
        .map_or_else(
            || ChatStreamEvent::Unknown("empty-delta".to_string()),
            ChatStreamEvent::TextDelta,
        )
}

#[async_trait]
impl LlmBackend for LiteLlmBackend {
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        documents: &[Document],
    ) -> Result<ChatEventStream, AppError> {
        info!(
            messages = messages.len(),
            documents = documents.len(),
            model = %self.chat_model,
            "starting chat stream via proxy"
        );

        let mut system = rag_system_message(Local::now().naive_local());
        if !documents.is_empty() {
            system.push_str("\n\n");
            system.push_str(&inline_documents(&grounding_documents(documents)));
        }
        let request = self.chat_request(&self.chat_model, system, messages)?;

        let stream = tokio::time::timeout(
            self.request_timeout,
            self.client.chat().create_stream(request),
        )
        .await??;

        Ok(stream
            .map(|chunk| chunk.map(|chunk| delta_event(&chunk)).map_err(AppError::from))
            .boxed())
    }

    async fn rerank_documents(
        &self,
        query: &str,
        texts: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, AppError> {
        info!(candidates = texts.len(), top_n, "reranking documents via proxy");
        let request = RerankRequest {
            model: &self.rerank_model,
            query,
            documents: texts,
            top_n,
        };

        let mut builder = self
            .http
            .post(format!("{}/rerank", self.base_url))
            .timeout(self.request_timeout)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = ensure_success(builder.send().await?, AppError::Rerank).await?;
        Ok(response.json::<RerankResponse>().await?.results)
    }

    async fn generate_dense_embedding(&self, query: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embed_model)
            .input([query])
            .build()?;

        let response =
            tokio::time::timeout(self.request_timeout, self.client.embeddings().create(request))
                .await??;

        response
            .data
            .into_iter()
            .next()
            .map(|embedding| embedding.embedding)
            .ok_or_else(|| AppError::Embedding("No embedding data received".into()))
    }

    async fn create_chat_session_name(&self, query: &str) -> Result<String, AppError> {
        let request = self.chat_request(
            &self.name_model,
            CHAT_NAME_SYSTEM_MESSAGE.to_string(),
            &[ChatMessage::user(query)],
        )?;

        let response =
            tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
                .await??;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .filter(|content| !content.trim().is_empty())
            .map(truncate_chat_name)
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))
    }
}

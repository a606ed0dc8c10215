use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use citation_stream::{ChatStreamEvent, Citation};
use common::{
    error::AppError,
    storage::types::{chat_message::ChatMessage, document::Document},
    utils::config::{AppConfig, EmbeddingQuantization},
};
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    prompts::{
        grounding_documents, rag_system_message, truncate_chat_name, GroundingDocument,
        CHAT_NAME_SYSTEM_MESSAGE,
    },
    sse::{SseDecoder, SseFrame},
    ChatEventStream, LlmBackend, RerankHit,
};

/// Cohere v2 REST client.
#[derive(Clone)]
pub struct CohereBackend {
    http: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    name_model: String,
    embed_model: String,
    rerank_model: String,
    quantization: EmbeddingQuantization,
    request_timeout: Duration,
}

impl CohereBackend {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = Client::builder().connect_timeout(request_timeout).build()?;

        Ok(Self {
            http,
            base_url: config.cohere_base_url.trim_end_matches('/').to_string(),
            api_key: config.cohere_api_key.clone(),
            chat_model: config.cohere_chat_model.clone(),
            name_model: config.cohere_name_model.clone(),
            embed_model: config.cohere_embed_model.clone(),
            rerank_model: config.cohere_rerank_model.clone(),
            quantization: config.embedding_quantization,
            request_timeout,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    async fn send_json<B, T>(
        &self,
        path: &str,
        body: &B,
        on_error: fn(String) -> AppError,
    ) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .post(path)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        let response = ensure_success(response, on_error).await?;
        Ok(response.json::<T>().await?)
    }
}

pub(crate) async fn ensure_success(
    response: Response,
    on_error: fn(String) -> AppError,
) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(on_error(format!("{status}: {body}")))
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    documents: Vec<GroundingDocument>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Vec<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
pub(crate) struct RerankRequest<'a> {
    pub model: &'a str,
    pub query: &'a str,
    pub documents: &'a [String],
    pub top_n: usize,
}

#[derive(Deserialize)]
pub(crate) struct RerankResponse {
    pub results: Vec<RerankHit>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: [&'a str; 1],
    input_type: &'static str,
    embedding_types: [&'static str; 1],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbeddingsByType,
}

#[derive(Deserialize, Default)]
struct EmbeddingsByType {
    #[serde(default)]
    float: Vec<Vec<f32>>,
    #[serde(default)]
    uint8: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum StreamFrame {
    ContentDelta {
        delta: ContentDelta,
    },
    CitationStart {
        delta: CitationDelta,
    },
    CitationEnd,
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ContentDelta {
    message: ContentDeltaMessage,
}

#[derive(Deserialize)]
struct ContentDeltaMessage {
    content: ContentDeltaText,
}

#[derive(Deserialize)]
struct ContentDeltaText {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct CitationDelta {
    message: CitationDeltaMessage,
}

#[derive(Deserialize)]
struct CitationDeltaMessage {
    citations: WireCitation,
}

#[derive(Deserialize)]
struct WireCitation {
    start: usize,
    end: usize,
    #[serde(default)]
    text: String,
    #[serde(default)]
    sources: Vec<WireSource>,
}

#[derive(Deserialize)]
struct WireSource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    document: Option<WireSourceDocument>,
}

#[derive(Deserialize)]
struct WireSourceDocument {
    #[serde(default)]
    id: Option<String>,
}

impl WireSource {
    fn document_id(self) -> Option<String> {
        self.document.and_then(|doc| doc.id).or(self.id)
    }
}

/// Decodes one Cohere chat stream frame. Frames that do not parse are reported as
/// [`ChatStreamEvent::Unknown`] so a single bad frame does not end the turn.
pub(crate) fn decode_frame(frame: &SseFrame) -> ChatStreamEvent {
    let name = || frame.event.clone().unwrap_or_else(|| "unknown".to_string());
    if frame.data.is_empty() || frame.data == "[DONE]" {
        return ChatStreamEvent::Unknown(name());
    }

    match serde_json::from_str::<StreamFrame>(&frame.data) {
        Ok(StreamFrame::ContentDelta { delta }) => {
            ChatStreamEvent::TextDelta(delta.message.content.text)
        }
        Ok(StreamFrame::CitationStart { delta }) => {
            let wire = delta.message.citations;
            let document_ids = wire
                .sources
                .into_iter()
                .filter_map(WireSource::document_id)
                .collect();
            ChatStreamEvent::CitationStart(Citation::new(
                wire.start,
                wire.end,
                wire.text,
                document_ids,
            ))
        }
        Ok(StreamFrame::CitationEnd) => ChatStreamEvent::CitationEnd,
        Ok(StreamFrame::Other) => ChatStreamEvent::Unknown(name()),
        Err(err) => {
            warn!(error = %err, event = ?frame.event, "undecodable chat stream frame");
            ChatStreamEvent::Unknown(name())
        }
    }
}

#[async_trait]
impl LlmBackend for CohereBackend {
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        documents: &[Document],
    ) -> Result<ChatEventStream, AppError> {
        info!(
            messages = messages.len(),
            documents = documents.len(),
            model = %self.chat_model,
            "starting chat stream"
        );

        let system = rag_system_message(Local::now().naive_local());
        let mut wire_messages = Vec::with_capacity(messages.len().saturating_add(1));
        wire_messages.push(WireMessage {
            role: "system",
            content: &system,
        });
        wire_messages.extend(messages.iter().map(|message| WireMessage {
            role: message.role.as_str(),
            content: &message.content,
        }));

        let request = ChatRequest {
            model: &self.chat_model,
            messages: wire_messages,
            documents: grounding_documents(documents),
            stream: true,
        };

        let response =
            tokio::time::timeout(self.request_timeout, self.post("/v2/chat").json(&request).send())
                .await??;
        let mut body = Box::pin(ensure_success(response, AppError::Llm).await?.bytes_stream());

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for frame in decoder.push(&bytes) {
                            yield Ok(decode_frame(&frame));
                        }
                    }
                    Err(err) => {
                        yield Err(AppError::from(err));
                        return;
                    }
                }
            }
            if let Some(frame) = decoder.finish() {
                yield Ok(decode_frame(&frame));
            }
            debug!("chat stream body exhausted");
        };

        Ok(Box::pin(stream))
    }

    async fn rerank_documents(
        &self,
        query: &str,
        texts: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, AppError> {
        info!(candidates = texts.len(), top_n, "reranking documents");
        let request = RerankRequest {
            model: &self.rerank_model,
            query,
            documents: texts,
            top_n,
        };
        let response: RerankResponse = self
            .send_json("/v2/rerank", &request, AppError::Rerank)
            .await?;
        Ok(response.results)
    }

    async fn generate_dense_embedding(&self, query: &str) -> Result<Vec<f32>, AppError> {
        let embedding_type = match self.quantization {
            EmbeddingQuantization::Float => "float",
            EmbeddingQuantization::Uint8 => "uint8",
        };
        let request = EmbedRequest {
            model: &self.embed_model,
            texts: [query],
            input_type: "search_query",
            embedding_types: [embedding_type],
        };
        let response: EmbedResponse = self
            .send_json("/v2/embed", &request, AppError::Embedding)
            .await?;

        let embeddings = response.embeddings;
        let vector = match self.quantization {
            EmbeddingQuantization::Float => embeddings.float.into_iter().next(),
            EmbeddingQuantization::Uint8 => embeddings
                .uint8
                .into_iter()
                .next()
                .map(|values| values.into_iter().map(f32::from).collect()),
        };
        vector.ok_or_else(|| AppError::Embedding("No embedding data received".into()))
    }

    async fn create_chat_session_name(&self, query: &str) -> Result<String, AppError> {
        let request = ChatRequest {
            model: &self.name_model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: CHAT_NAME_SYSTEM_MESSAGE,
                },
                WireMessage {
                    role: "user",
                    content: query,
                },
            ],
            documents: Vec::new(),
            stream: false,
        };
        let response: ChatResponse = self
            .send_json("/v2/chat", &request, AppError::Llm)
            .await?;

        response
            .message
            .content
            .into_iter()
            .map(|part| part.text)
            .find(|text| !text.trim().is_empty())
            .map(|name| truncate_chat_name(&name))
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))
    }
}

//! A deterministic [`LlmBackend`] for tests: chat output, rerank order and failures are
//! scripted up front and every call is counted.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_stream::stream;
use async_trait::async_trait;
use citation_stream::ChatStreamEvent;
use common::{
    error::AppError,
    storage::types::{chat_message::ChatMessage, document::Document},
};

use crate::{ChatEventStream, LlmBackend, RerankHit};

/// One step of a scripted chat stream.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(ChatStreamEvent),
    /// The provider stream breaks with this message.
    Fail(String),
    /// The provider goes silent and never yields again.
    Stall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RerankBehavior {
    /// Keep submission order, scores descending from 1.0.
    #[default]
    Identity,
    /// Reverse submission order.
    Reverse,
    Fail,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    chat_script: Vec<ScriptStep>,
    step_delay: Option<Duration>,
    fail_chat_start: bool,
    fail_embedding: bool,
    rerank: RerankBehavior,
    session_name: Option<String>,
    embedding: Vec<f32>,

    pub chat_calls: AtomicUsize,
    pub rerank_calls: AtomicUsize,
    pub embedding_calls: AtomicUsize,
    pub name_calls: AtomicUsize,
    last_chat: Mutex<Option<(Vec<ChatMessage>, Vec<Document>)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            session_name: Some("Gesprek".to_string()),
            embedding: vec![1.0, 0.0, 0.0],
            ..Self::default()
        }
    }

    /// Streams `text` as word-sized deltas.
    pub fn answering(text: &str) -> Self {
        let steps = text
            .split_inclusive(' ')
            .map(|word| ScriptStep::Event(ChatStreamEvent::TextDelta(word.to_string())))
            .collect();
        Self::new().with_chat_script(steps)
    }

    pub fn with_chat_script(mut self, steps: Vec<ScriptStep>) -> Self {
        self.chat_script = steps;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn with_chat_start_failure(mut self) -> Self {
        self.fail_chat_start = true;
        self
    }

    pub fn with_embedding_failure(mut self) -> Self {
        self.fail_embedding = true;
        self
    }

    pub fn with_rerank(mut self, behavior: RerankBehavior) -> Self {
        self.rerank = behavior;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// `None` makes session naming fail.
    pub fn with_session_name(mut self, name: Option<&str>) -> Self {
        self.session_name = name.map(str::to_string);
        self
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Messages and documents from the most recent `chat_stream` call.
    pub fn last_chat(&self) -> Option<(Vec<ChatMessage>, Vec<Document>)> {
        self.last_chat.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        documents: &[Document],
    ) -> Result<ChatEventStream, AppError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_chat.lock() {
            *last = Some((messages.to_vec(), documents.to_vec()));
        }
        if self.fail_chat_start {
            return Err(AppError::Llm("scripted chat start failure".into()));
        }

        let steps = self.chat_script.clone();
        let delay = self.step_delay;
        Ok(Box::pin(stream! {
            for step in steps {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                match step {
                    ScriptStep::Event(event) => yield Ok(event),
                    ScriptStep::Fail(message) => {
                        yield Err(AppError::Llm(message));
                        return;
                    }
                    ScriptStep::Stall => {
                        futures::future::pending::<()>().await;
                    }
                }
            }
        }))
    }

    async fn rerank_documents(
        &self,
        _query: &str,
        texts: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, AppError> {
        self.rerank_calls.fetch_add(1, Ordering::SeqCst);
        let mut order: Vec<usize> = (0..texts.len()).collect();
        match self.rerank {
            RerankBehavior::Identity => {}
            RerankBehavior::Reverse => order.reverse(),
            RerankBehavior::Fail => return Err(AppError::Rerank("scripted rerank failure".into())),
        }
        Ok(order
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(rank, index)| RerankHit {
                index,
                relevance_score: 1.0 / (rank as f32 + 1.0),
            })
            .collect())
    }

    async fn generate_dense_embedding(&self, _query: &str) -> Result<Vec<f32>, AppError> {
        self.embedding_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embedding {
            return Err(AppError::Embedding("scripted embedding failure".into()));
        }
        Ok(self.embedding.clone())
    }

    async fn create_chat_session_name(&self, _query: &str) -> Result<String, AppError> {
        self.name_calls.fetch_add(1, Ordering::SeqCst);
        self.session_name
            .clone()
            .ok_or_else(|| AppError::Llm("scripted naming failure".into()))
    }
}

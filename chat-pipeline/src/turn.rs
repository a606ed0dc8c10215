use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_stream::stream;
use citation_stream::{Citation, CitationSplicer, SpliceOutcome};
use common::{
    error::AppError,
    storage::{
        repository::SessionRepository,
        types::{chat_message::ChatMessage, document::Document, session::Session},
    },
    utils::config::AppConfig,
};
use futures::{stream::BoxStream, StreamExt};
use llm_backend::LlmBackend;
use retrieval_pipeline::{merge, order_for_panel, RetrievalPipeline};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    events::{
        TurnEvent, FOUND_STATUS, GENERATING_STATUS, GENERATION_FAILED, GENERATION_TIMED_OUT,
        PROCESSING_STATUS, RETRIEVAL_FAILED, RETRIEVAL_TIMED_OUT, SEARCHING_STATUS,
    },
    state::{map_guard_error, retrieving},
};

/// Runs chat turns: retrieval, grounded generation with live citation splicing, and
/// session bookkeeping, streamed to the caller as [`TurnEvent`]s.
pub struct ChatPipeline {
    backend: Arc<dyn LlmBackend>,
    retrieval: Arc<RetrievalPipeline>,
    sessions: Arc<dyn SessionRepository>,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl ChatPipeline {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        retrieval: Arc<RetrievalPipeline>,
        sessions: Arc<dyn SessionRepository>,
        request_timeout: Duration,
        stream_idle_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            retrieval,
            sessions,
            request_timeout,
            stream_idle_timeout,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        backend: Arc<dyn LlmBackend>,
        retrieval: Arc<RetrievalPipeline>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::new(
            backend,
            retrieval,
            sessions,
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.stream_idle_timeout_secs),
        )
    }

    pub fn retrieval(&self) -> &Arc<RetrievalPipeline> {
        &self.retrieval
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRepository> {
        &self.sessions
    }

    /// Answers `query` within the given session, or a fresh one when `session_id` is `None`
    /// or unknown.
    ///
    /// The stream always finishes with [`TurnEvent::End`]. Cancelling `cancel` stops the
    /// turn at the next await point: no further upstream events are pulled and nothing more
    /// is persisted. Dropping the stream has the same effect on held resources.
    pub fn run_turn(
        self: Arc<Self>,
        session_id: Option<String>,
        query: String,
        cancel: CancellationToken,
    ) -> BoxStream<'static, TurnEvent> {
        Box::pin(stream! {
            let started = Instant::now();

            'turn: {
                let session = self.load_session(session_id.as_deref()).await;
                let is_new = session.is_new();
                let history = session.messages.clone();
                info!(session_id = %session.id, is_new, "chat turn started");

                yield TurnEvent::Session { session_id: session.id.clone() };
                yield TurnEvent::status(PROCESSING_STATUS);

                let user_message = ChatMessage::user(query.clone());
                if let Err(err) = self.sessions.append_message(&session.id, user_message.clone()).await {
                    error!(session_id = %session.id, error = %err, "failed to store user message");
                }

                yield TurnEvent::status(SEARCHING_STATUS);

                let machine = retrieving();
                let retrieved = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    result = self.retrieve(&query, &history) => Some(result),
                };
                let Some(retrieved) = retrieved else {
                    info!(session_id = %session.id, "turn cancelled during retrieval");
                    break 'turn;
                };
                let new_documents = match retrieved {
                    Ok(documents) => documents,
                    Err(err) => {
                        error!(session_id = %session.id, error = %err, "retrieval failed, skipping generation");
                        if let Err((_, guard)) = machine.abort() {
                            warn!(error = %map_guard_error("abort", &guard), "turn state");
                        }
                        let message = if err.is_timeout() { RETRIEVAL_TIMED_OUT } else { RETRIEVAL_FAILED };
                        yield TurnEvent::error(message);
                        break 'turn;
                    }
                };

                let existing = match self.sessions.get_documents(&session).await {
                    Ok(documents) => documents,
                    Err(err) => {
                        error!(session_id = %session.id, error = %err, "failed to load session documents");
                        Vec::new()
                    }
                };
                let documents = merge(new_documents, existing);
                if let Err(err) = self.sessions.attach_documents(&session.id, documents.clone()).await {
                    error!(session_id = %session.id, error = %err, "failed to attach documents to session");
                }

                yield TurnEvent::Documents { documents: order_for_panel(&documents) };
                yield TurnEvent::status(FOUND_STATUS);

                let machine = match machine.generate() {
                    Ok(machine) => machine,
                    Err((_, guard)) => {
                        let err = map_guard_error("generate", &guard);
                        error!(error = %err, "chat turn aborted");
                        yield TurnEvent::error(GENERATION_FAILED);
                        break 'turn;
                    }
                };
                yield TurnEvent::status(GENERATING_STATUS);

                let mut messages = history;
                messages.push(user_message);
                let opened = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    result = tokio::time::timeout(
                        self.request_timeout,
                        self.backend.chat_stream(&messages, &documents),
                    ) => Some(result.map_err(AppError::from).and_then(|result| result)),
                };
                let Some(opened) = opened else {
                    info!(session_id = %session.id, "turn cancelled before generation");
                    break 'turn;
                };
                let mut upstream = match opened {
                    Ok(upstream) => upstream,
                    Err(err) => {
                        error!(session_id = %session.id, error = %err, "failed to start chat stream");
                        if let Err((_, guard)) = machine.abort() {
                            warn!(error = %map_guard_error("abort", &guard), "turn state");
                        }
                        yield TurnEvent::error(generation_error_message(&err));
                        break 'turn;
                    }
                };

                let mut splicer = CitationSplicer::new();
                let mut stream_failed = false;
                loop {
                    let next = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        next = tokio::time::timeout(self.stream_idle_timeout, upstream.next()) => Some(next),
                    };
                    let Some(next) = next else {
                        info!(
                            session_id = %session.id,
                            streamed_chars = splicer.full_text().chars().count(),
                            "turn cancelled during generation"
                        );
                        break 'turn;
                    };
                    match next {
                        Ok(Some(Ok(event))) => {
                            if let Some(output) = splicer.process(event) {
                                yield TurnEvent::from(output);
                            }
                        }
                        Ok(None) => break,
                        Ok(Some(Err(err))) => {
                            error!(session_id = %session.id, error = %err, "chat stream failed");
                            yield TurnEvent::error(generation_error_message(&err));
                            stream_failed = true;
                            break;
                        }
                        Err(elapsed) => {
                            let err = AppError::from(elapsed);
                            error!(session_id = %session.id, error = %err, "chat stream went idle");
                            yield TurnEvent::error(GENERATION_TIMED_OUT);
                            stream_failed = true;
                            break;
                        }
                    }
                }
                drop(upstream);

                let machine = match machine.finalize() {
                    Ok(machine) => machine,
                    Err((_, guard)) => {
                        error!(error = %map_guard_error("finalize", &guard), "chat turn aborted");
                        break 'turn;
                    }
                };

                if stream_failed && splicer.full_text().is_empty() {
                    if let Err((_, guard)) = machine.abort() {
                        warn!(error = %map_guard_error("abort", &guard), "turn state");
                    }
                    break 'turn;
                }

                match splicer.finish() {
                    SpliceOutcome::Answered { formatted, raw, citations } => {
                        let cited = cited_documents(&documents, &citations);
                        yield TurnEvent::Full {
                            content: formatted.clone(),
                            content_original: raw.clone(),
                            citations,
                        };

                        if cancel.is_cancelled() {
                            break 'turn;
                        }
                        self.store_answer(&session.id, ChatMessage::assistant(raw, formatted, cited)).await;

                        if is_new {
                            if let Some(name) = self.name_session(&session.id, &query).await {
                                yield TurnEvent::SessionName { content: name };
                            }
                        }
                    }
                    SpliceOutcome::Empty => {
                        warn!(session_id = %session.id, documents = documents.len(), "model produced no text, answering with apology");
                        yield TurnEvent::apology();
                    }
                }

                if let Err((_, guard)) = machine.complete() {
                    warn!(error = %map_guard_error("complete", &guard), "turn state");
                }
            }

            debug!(
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "chat turn finished"
            );
            yield TurnEvent::end();
        })
    }

    async fn load_session(&self, session_id: Option<&str>) -> Session {
        if let Some(id) = session_id {
            match self.sessions.get_session(id).await {
                Ok(session) => return session,
                Err(AppError::NotFound(_)) => {
                    info!(session_id = %id, "unknown session, starting a new one");
                }
                Err(err) => {
                    error!(session_id = %id, error = %err, "failed to load session, starting a new one");
                }
            }
        }

        match self.sessions.create_session(None).await {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "failed to create session, continuing unsaved");
                Session::new(None)
            }
        }
    }

    #[instrument(skip_all, fields(history = history.len()))]
    async fn retrieve(
        &self,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Vec<Document>, AppError> {
        let rewritten = match tokio::time::timeout(
            self.request_timeout,
            self.backend.rewrite_query(query, history),
        )
        .await
        {
            Ok(Ok(rewritten)) if !rewritten.trim().is_empty() => rewritten,
            Ok(Ok(_)) => query.to_string(),
            Ok(Err(err)) => {
                warn!(error = %err, "query rewrite failed, using the original query");
                query.to_string()
            }
            Err(elapsed) => {
                warn!(error = %elapsed, "query rewrite timed out, using the original query");
                query.to_string()
            }
        };
        self.retrieval.retrieve_documents(&rewritten).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn store_answer(&self, session_id: &str, message: ChatMessage) {
        match self.sessions.append_message(session_id, message).await {
            Ok(session) => debug!(messages = session.messages.len(), "stored assistant message"),
            Err(err) => error!(error = %err, "failed to store assistant message"),
        }
    }

    /// Generates and stores a name for a fresh session. Failures keep the default name.
    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn name_session(&self, session_id: &str, query: &str) -> Option<String> {
        let name = match tokio::time::timeout(
            self.request_timeout,
            self.backend.create_chat_session_name(query),
        )
        .await
        .map_err(AppError::from)
        .and_then(|result| result)
        {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => {
                warn!("session name came back empty, keeping default");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "session naming failed, keeping default");
                return None;
            }
        };

        if let Err(err) = self.sessions.rename_session(session_id, &name).await {
            error!(error = %err, "failed to store session name");
        }
        Some(name)
    }
}

fn generation_error_message(err: &AppError) -> &'static str {
    if err.is_timeout() {
        GENERATION_TIMED_OUT
    } else {
        GENERATION_FAILED
    }
}

/// The documents backing at least one citation, in context order.
fn cited_documents(documents: &[Document], citations: &[Citation]) -> Vec<Document> {
    documents
        .iter()
        .filter(|doc| {
            citations
                .iter()
                .any(|citation| citation.document_ids.iter().any(|id| id == &doc.id))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cited_documents_keeps_context_order_and_skips_uncited() {
        let documents = vec![Document::new("a"), Document::new("b"), Document::new("c")];
        let citations = vec![
            Citation::new(0, 2, "xx", vec!["c".into()]),
            Citation::new(3, 4, "y", vec!["a".into(), "unknown".into()]),
        ];

        let ids: Vec<String> = cited_documents(&documents, &citations)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn timeouts_get_their_own_message() {
        assert_eq!(
            generation_error_message(&AppError::Timeout("stream".into())),
            GENERATION_TIMED_OUT
        );
        assert_eq!(
            generation_error_message(&AppError::Llm("boom".into())),
            GENERATION_FAILED
        );
    }
}

use std::time::Duration;

use async_stream::stream;
use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, KeepAliveStream},
        Sse,
    },
};
use futures::{stream::BoxStream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{error::ApiError, state::ApiState};

type EventStream = BoxStream<'static, Result<Event, axum::Error>>;

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub session_id: Option<String>,
    pub content: String,
}

/// Streams one chat turn as server-sent events: each turn event as a JSON `data:` frame,
/// then a final `close` event. A dropped connection cancels the turn.
pub async fn chat_stream(
    State(state): State<ApiState>,
    Query(params): Query<ChatParams>,
) -> Result<Sse<KeepAliveStream<EventStream>>, ApiError> {
    let query = params.content.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::ValidationError("content must not be empty".into()));
    }
    let session_id = params.session_id.filter(|id| !id.trim().is_empty());

    let cancel = CancellationToken::new();
    let mut turn = state.chat.clone().run_turn(session_id, query, cancel.clone());

    let events: EventStream = Box::pin(stream! {
        let _cancel_on_drop = cancel.drop_guard();
        while let Some(event) = turn.next().await {
            yield Event::default().json_data(&event);
        }
        debug!("chat stream closed");
        yield Ok(Event::default().event("close").data(""));
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

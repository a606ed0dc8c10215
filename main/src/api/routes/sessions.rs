use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiError, state::ApiState};

#[derive(Debug, Default, Deserialize)]
pub struct CreateSession {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
    pub name: String,
}

/// Creates an empty session. The body is optional; `{"name": "..."}` sets a name up front.
pub async fn create_session(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let request: CreateSession = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSession::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::ValidationError(format!("invalid body: {err}")))?
    };
    let name = request
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let session = state.chat.sessions().create_session(name).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id,
            name: session.name,
        }),
    ))
}

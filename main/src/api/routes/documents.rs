use axum::{
    extract::{Query, State},
    Json,
};
use common::storage::types::document::Document;
use serde::Deserialize;

use crate::api::{error::ApiError, state::ApiState};

#[derive(Debug, Deserialize)]
pub struct DocumentParams {
    /// Comma-separated document ids.
    pub ids: String,
}

pub async fn get_documents(
    State(state): State<ApiState>,
    Query(params): Query<DocumentParams>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let ids: Vec<String> = params
        .ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::ValidationError("ids must not be empty".into()));
    }

    let documents = state.chat.retrieval().documents_by_ids(&ids).await?;
    Ok(Json(documents))
}

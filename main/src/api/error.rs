use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::Timeout(_) | AppError::Qdrant(_) => {
                tracing::error!(error = %err, "upstream unavailable");
                Self::Unavailable("Upstream service unavailable".to_string())
            }
            _ => {
                tracing::error!(error = %err, "internal error");
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };

        let body = ErrorResponse {
            error: message,
            status: "error".to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_errors_map_to_api_errors() {
        let api_error = ApiError::from(AppError::NotFound("session x".to_string()));
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "session x"));

        let api_error = ApiError::from(AppError::Validation("ids".to_string()));
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "ids"));

        let api_error = ApiError::from(AppError::Timeout("index".to_string()));
        assert!(matches!(api_error, ApiError::Unavailable(_)));

        let api_error = ApiError::from(AppError::Llm("secret detail".to_string()));
        assert!(matches!(api_error, ApiError::InternalError(msg) if !msg.contains("secret")));
    }

    #[test]
    fn status_codes() {
        let cases = [
            (ApiError::InternalError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}

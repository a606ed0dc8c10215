pub mod error;
mod routes;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use routes::{
    chat::chat_stream,
    documents::get_documents,
    health::{live, ready},
    sessions::create_session,
};
use state::ApiState;

pub use routes::sessions::SessionCreated;

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/live", get(live))
        .route("/api/ready", get(ready))
        .route("/api/chat", get(chat_stream))
        .route("/api/sessions", post(create_session))
        .route("/api/documents", get(get_documents))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chat_pipeline::ChatPipeline;
    use common::storage::{db::SurrealDbClient, repository::SessionRepository};
    use llm_backend::scripted::ScriptedBackend;
    use retrieval_pipeline::{
        index::{memory::MemoryPoint, MemoryIndex},
        sparse::{hashed_sparse_embedding, SparseEmbedder},
        RetrievalLimits, RetrievalPipeline,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    async fn test_state(backend: ScriptedBackend) -> ApiState {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        let backend = Arc::new(backend);
        let index = MemoryIndex::new(
            vec![MemoryPoint {
                id: "doc-1".into(),
                dense: vec![1.0, 0.0, 0.0],
                sparse: hashed_sparse_embedding("de brug over het kanaal"),
                payload: json!({
                    "content": "de brug over het kanaal",
                    "meta": {"title": "Brug", "published": "2024-02-01"}
                }),
            }],
            1,
        )
        .expect("index");
        let retrieval = Arc::new(RetrievalPipeline::new(
            backend.clone(),
            Arc::new(SparseEmbedder::hashed(1)),
            Arc::new(index),
            RetrievalLimits::default(),
            Duration::from_secs(5),
        ));
        let chat = Arc::new(ChatPipeline::new(
            backend,
            retrieval,
            db.clone(),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        ApiState::new(db, chat)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn health_endpoints_answer() {
        let app = api_routes(test_state(ScriptedBackend::new()).await);

        let live = app.clone().oneshot(get("/api/live")).await.expect("live");
        assert_eq!(live.status(), StatusCode::OK);

        let ready = app.oneshot(get("/api/ready")).await.expect("ready");
        assert_eq!(ready.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(ready).await).expect("json");
        assert_eq!(body["checks"]["index_connections"], 1);
    }

    #[tokio::test]
    async fn chat_streams_turn_events_then_close() {
        let app = api_routes(test_state(ScriptedBackend::answering("De brug is klaar.")).await);

        let response = app
            .oneshot(get("/api/chat?content=Wanneer%20is%20de%20brug%20klaar%3F"))
            .await
            .expect("chat response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream")));

        let body = body_text(response).await;
        let frames: Vec<Value> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .filter_map(|data| serde_json::from_str(data).ok())
            .collect();

        assert_eq!(frames.first().map(|f| f["type"].clone()), Some(json!("session")));
        assert!(frames.iter().any(|f| f["type"] == "full"));
        assert_eq!(frames.last(), Some(&json!({"type": "end", "content": "Done."})));
        assert!(body.contains("event: close"));
    }

    #[tokio::test]
    async fn chat_rejects_blank_content() {
        let app = api_routes(test_state(ScriptedBackend::new()).await);

        let response = app
            .oneshot(get("/api/chat?content=%20%20"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn creates_named_and_unnamed_sessions() {
        let state = test_state(ScriptedBackend::new()).await;
        let app = api_routes(state.clone());

        let named = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name": "Woo-verzoeken"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(named.status(), StatusCode::CREATED);
        let created: SessionCreated =
            serde_json::from_str(&body_text(named).await).expect("json");
        assert_eq!(created.name, "Woo-verzoeken");
        assert!(state.db.get_session(&created.session_id).await.is_ok());

        let unnamed = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sessions")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(unnamed.status(), StatusCode::CREATED);
        let created: SessionCreated =
            serde_json::from_str(&body_text(unnamed).await).expect("json");
        assert!(created.name.starts_with("Sessie "));
    }

    #[tokio::test]
    async fn looks_up_documents_by_id() {
        let app = api_routes(test_state(ScriptedBackend::new()).await);

        let response = app
            .clone()
            .oneshot(get("/api/documents?ids=doc-1,onbekend"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let docs: Value = serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(docs.as_array().map(Vec::len), Some(1));
        assert_eq!(docs[0]["id"], "doc-1");
        assert_eq!(docs[0]["published"], "2024-02-01");

        let empty = app
            .oneshot(get("/api/documents?ids=,"))
            .await
            .expect("response");
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }
}

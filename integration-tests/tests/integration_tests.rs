use std::collections::HashSet;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use bron::api_routes;
use chat_pipeline::TurnEvent;
use citation_stream::{ChatStreamEvent, Citation};
use common::storage::{repository::SessionRepository, types::chat_message::ChatRole};
use futures::{future::join_all, StreamExt};
use llm_backend::scripted::{ScriptStep, ScriptedBackend};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use test_utils::*;

/// End-to-end chat turns over an in-memory index and session store.

fn cited_answer() -> ScriptedBackend {
    let answer = "De brug kost vier miljoen euro.";
    ScriptedBackend::new().with_chat_script(vec![
        ScriptStep::Event(ChatStreamEvent::TextDelta("De brug ".into())),
        ScriptStep::Event(ChatStreamEvent::TextDelta("kost vier miljoen euro.".into())),
        ScriptStep::Event(ChatStreamEvent::CitationStart(Citation::new(
            8,
            answer.chars().count(),
            "kost vier miljoen euro.",
            vec!["102".into()],
        ))),
        ScriptStep::Event(ChatStreamEvent::CitationEnd),
    ])
}

#[tokio::test]
async fn conversation_accumulates_documents_without_duplicates() {
    let app = setup_app(cited_answer()).await;

    let first = app.turn(None, "Hoeveel kost de brug?").await;
    assert_single_trailing_end(&first);
    let id = session_id(&first);

    let session = app.db.get_session(&id).await.expect("session");
    let first_docs: Vec<String> = session.documents.iter().map(|d| d.id.clone()).collect();
    assert_eq!(first_docs.len(), 3);
    assert!(first_docs.contains(&"102".to_string()));

    let second = app.turn(Some(id.clone()), "En de afvalstoffenheffing?").await;
    assert_single_trailing_end(&second);
    assert_eq!(session_id(&second), id);

    let session = app.db.get_session(&id).await.expect("session");
    let ids: Vec<&str> = session.documents.iter().map(|d| d.id.as_str()).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len(), "merged documents must be unique");
    assert!(first_docs.iter().all(|id| unique.contains(id.as_str())));

    let roles: Vec<ChatRole> = session.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            ChatRole::User,
            ChatRole::Assistant,
            ChatRole::User,
            ChatRole::Assistant
        ]
    );
    assert_eq!(session.messages[1].documents.len(), 1);
    assert_eq!(session.messages[1].documents[0].id, "102");

    let panel = second
        .iter()
        .find_map(|e| match e {
            TurnEvent::Documents { documents } => Some(documents.clone()),
            _ => None,
        })
        .expect("documents event");
    assert!(panel.iter().all(|d| d.published.is_some()));
    assert!(panel.windows(2).all(|w| w[0].published >= w[1].published));
}

#[tokio::test]
async fn http_turn_streams_and_documents_resolve() {
    let app = setup_app(cited_answer()).await;
    let router = api_routes(app.state());

    let created = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sessions")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("create session");
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = serde_json::from_slice(
        &to_bytes(created.into_body(), usize::MAX)
            .await
            .expect("body"),
    )
    .expect("json");
    let id = created["session_id"].as_str().expect("session id").to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/chat?session_id={id}&content=Hoeveel%20kost%20de%20brug%3F"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("chat");
    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(
        to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body")
            .to_vec(),
    )
    .expect("utf8");

    let frames: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect();
    let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
    assert_eq!(types.first(), Some(&"session"));
    assert_eq!(frames[0]["session_id"], id.as_str());
    assert!(types.contains(&"citation"));
    assert_eq!(types.last(), Some(&"end"));
    assert!(body.contains("event: close"));

    let full = frames
        .iter()
        .find(|f| f["type"] == "full")
        .expect("full frame");
    assert!(full["content"].as_str().is_some_and(|c| c.contains("citation-link")));
    let cited = full["citations"][0]["document_ids"][0]
        .as_str()
        .expect("cited id")
        .to_string();

    let docs = router
        .oneshot(
            Request::builder()
                .uri(format!("/api/documents?ids={cited}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("documents");
    assert_eq!(docs.status(), StatusCode::OK);
    let docs: Value = serde_json::from_slice(
        &to_bytes(docs.into_body(), usize::MAX)
            .await
            .expect("body"),
    )
    .expect("json");
    assert_eq!(docs[0]["id"], "102");
    assert_eq!(docs[0]["location_name"], "Utrecht");
    assert!(docs[0]["content"]
        .as_str()
        .is_some_and(|c| c.starts_with("<p>[...]")));
}

#[tokio::test]
async fn concurrent_turns_share_bounded_resources() {
    let app = setup_app(ScriptedBackend::answering("Dat staat in het raadsbesluit.")).await;

    let turns = (0..8).map(|i| {
        let chat = app.chat.clone();
        async move {
            chat.run_turn(None, format!("Vraag {i} over de brug"), CancellationToken::new())
                .collect::<Vec<_>>()
                .await
        }
    });
    let results = join_all(turns).await;

    let mut sessions = HashSet::new();
    for events in &results {
        assert_single_trailing_end(events);
        assert!(events.iter().any(|e| matches!(e, TurnEvent::Full { .. })));
        sessions.insert(session_id(events));
    }
    assert_eq!(sessions.len(), 8);

    let retrieval = app.chat.retrieval();
    assert_eq!(retrieval.available_connections(), POOL_SIZE);
    assert_eq!(retrieval.available_sparse_permits(), SPARSE_SLOTS);
}

#[tokio::test]
async fn client_disconnect_stops_generation_and_persistence() {
    let app = setup_app(ScriptedBackend::new().with_chat_script(vec![
        ScriptStep::Event(ChatStreamEvent::TextDelta("Een ".into())),
        ScriptStep::Event(ChatStreamEvent::TextDelta("twee ".into())),
        ScriptStep::Event(ChatStreamEvent::TextDelta("drie ".into())),
        ScriptStep::Stall,
    ]))
    .await;

    let mut stream = app
        .chat
        .clone()
        .run_turn(None, "brug".into(), CancellationToken::new());
    let mut seen = Vec::new();
    let mut partials = 0;
    while let Some(event) = stream.next().await {
        if matches!(event, TurnEvent::Partial { .. }) {
            partials += 1;
        }
        seen.push(event);
        if partials == 2 {
            break;
        }
    }
    drop(stream);

    let retrieval = app.chat.retrieval();
    assert_eq!(retrieval.available_connections(), POOL_SIZE);
    assert_eq!(retrieval.available_sparse_permits(), SPARSE_SLOTS);

    let session = app
        .db
        .get_session(&session_id(&seen))
        .await
        .expect("session");
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].role, ChatRole::User);
    assert_eq!(ScriptedBackend::calls(&app.backend.chat_calls), 1);

    let after = app.turn(None, "brug").await;
    assert_single_trailing_end(&after);
}

#[tokio::test]
async fn failed_naming_keeps_default_session_name() {
    let app = setup_app(ScriptedBackend::answering("Ja.").with_session_name(None)).await;

    let events = app.turn(None, "Is de brug klaar?").await;

    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::SessionName { .. })));
    assert!(events.iter().any(|e| matches!(e, TurnEvent::Full { .. })));
    let session = app.db.get_session(&session_id(&events)).await.expect("session");
    assert!(session.name.starts_with("Sessie "));
}

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use surrealdb::sql::Datetime as SurrealDatetime;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

use crate::error::AppError;

use super::{
    db::SurrealDbClient,
    types::{chat_message::ChatMessage, document::Document, session::Session, StoredObject},
};

/// Persistence collaborator for conversations. The chat pipeline reads a session, appends
/// to it, and never rewrites earlier messages.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, name: Option<String>) -> Result<Session, AppError>;

    async fn get_session(&self, session_id: &str) -> Result<Session, AppError>;

    async fn append_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<Session, AppError>;

    /// Stores the merged document set for the session, replacing the previous one.
    async fn attach_documents(
        &self,
        session_id: &str,
        documents: Vec<Document>,
    ) -> Result<(), AppError>;

    async fn rename_session(&self, session_id: &str, name: &str) -> Result<(), AppError>;

    async fn get_documents(&self, session: &Session) -> Result<Vec<Document>, AppError> {
        Ok(session.documents.clone())
    }
}

impl SurrealDbClient {
    /// Applies `assignments` to one session in a single statement, so concurrent turns on the
    /// same session never overwrite each other's changes. Write conflicts reported by the
    /// engine are retried.
    async fn update_session<V>(
        &self,
        session_id: &str,
        assignments: &str,
        value: V,
    ) -> Result<Session, AppError>
    where
        V: Serialize + Clone + Send + Sync + 'static,
    {
        let statement = format!(
            "UPDATE type::thing($table, $id) SET {assignments}, updated_at = $now RETURN AFTER;"
        );
        let client = &self.client;
        let statement = statement.as_str();
        let value = &value;
        let retry_strategy = ExponentialBackoff::from_millis(10).map(jitter).take(3);

        let updated: Option<Session> = RetryIf::spawn(
            retry_strategy,
            move || {
                let value = value.clone();
                let id = session_id.to_owned();
                async move {
                    let mut response = client
                        .query(statement.to_owned())
                        .bind(("table", Session::table_name()))
                        .bind(("id", id))
                        .bind(("value", value))
                        .bind(("now", SurrealDatetime::from(Utc::now())))
                        .await?;
                    response.take::<Option<Session>>(0)
                }
            },
            |err: &surrealdb::Error| is_write_conflict(err),
        )
        .await?;

        updated.ok_or_else(|| AppError::NotFound(format!("session {session_id}")))
    }
}

fn is_write_conflict(err: &surrealdb::Error) -> bool {
    let message = err.to_string();
    if message.contains("conflict") {
        warn!(error = %message, "session update conflicted, retrying");
        return true;
    }
    false
}

#[async_trait]
impl SessionRepository for SurrealDbClient {
    async fn create_session(&self, name: Option<String>) -> Result<Session, AppError> {
        let session = Session::new(name);
        self.store_item(session)
            .await?
            .ok_or_else(|| AppError::InternalError("session was not stored".into()))
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, AppError> {
        self.get_item::<Session>(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))
    }

    async fn append_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<Session, AppError> {
        debug!(%session_id, role = %message.role, "appending message to session");
        self.update_session(session_id, "messages += $value", message)
            .await
    }

    async fn attach_documents(
        &self,
        session_id: &str,
        documents: Vec<Document>,
    ) -> Result<(), AppError> {
        debug!(%session_id, documents = documents.len(), "attaching documents to session");
        self.update_session(session_id, "documents = $value", documents)
            .await
            .map(|_| ())
    }

    async fn rename_session(&self, session_id: &str, name: &str) -> Result<(), AppError> {
        self.update_session(session_id, "name = $value", name.to_owned())
            .await
            .map(|_| ())
    }
}

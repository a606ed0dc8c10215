use uuid::Uuid;

use crate::stored_object;

use super::{chat_message::ChatMessage, document::Document};

stored_object!(Session, "session", {
    name: String,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    documents: Vec<Document>
});

impl Session {
    pub fn new(name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name: name.unwrap_or_else(|| default_session_name(now)),
            messages: Vec::new(),
            documents: Vec::new(),
        }
    }

    /// A session without messages gets a generated name after its first answer.
    pub fn is_new(&self) -> bool {
        self.messages.is_empty()
    }
}

fn default_session_name(now: DateTime<Utc>) -> String {
    format!("Sessie {}", now.format("%Y-%m-%d %H:%M"))
}

use std::fmt;

use serde::{Deserialize, Serialize};

use super::document::Document;

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in a conversation. Embedded in [`super::session::Session`], not stored on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    /// Raw text: the user query or the model's unmodified output.
    pub content: String,
    /// Citation-spliced HTML, assistant messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_content: Option<String>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            formatted_content: None,
            documents: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(
        content: impl Into<String>,
        formatted_content: impl Into<String>,
        documents: Vec<Document>,
    ) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            formatted_content: Some(formatted_content.into()),
            documents,
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::user("Hoeveel kost de brug?"))
            .expect("serializes");
        assert_eq!(json["role"], "user");
        assert!(json.get("formatted_content").is_none());
    }

    #[test]
    fn assistant_message_keeps_both_renderings() {
        let message = ChatMessage::assistant("raw **text**", "<p>raw <strong>text</strong></p>", vec![]);
        assert_eq!(message.role, ChatRole::Assistant);
        assert_eq!(message.content, "raw **text**");
        assert_eq!(
            message.formatted_content.as_deref(),
            Some("<p>raw <strong>text</strong></p>")
        );
        assert_eq!(format!("{message}"), "assistant: raw **text**");
    }
}

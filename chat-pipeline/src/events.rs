use citation_stream::{Citation, SplicerOutput};
use common::storage::types::document::Document;
use serde::Serialize;

pub const PROCESSING_STATUS: &str = "Uw verzoek wordt nu verwerkt...";
pub const SEARCHING_STATUS: &str = "Documenten worden gezocht...";
pub const FOUND_STATUS: &str = "Documenten gevonden.";
pub const GENERATING_STATUS: &str = "Bron genereert nu een antwoord op uw vraag...";
pub const APOLOGY: &str =
    "Excuses, ik kon geen relevante informatie vinden om uw vraag te beantwoorden.";
pub const END_CONTENT: &str = "Done.";

pub const RETRIEVAL_FAILED: &str =
    "Er ging iets mis bij het zoeken naar documenten. Probeer het later opnieuw.";
pub const RETRIEVAL_TIMED_OUT: &str =
    "Het zoeken naar documenten duurde te lang. Probeer het later opnieuw.";
pub const GENERATION_FAILED: &str = "Er ging iets mis bij het genereren van een antwoord.";
pub const GENERATION_TIMED_OUT: &str = "Het genereren van een antwoord duurde te lang.";

/// One unit of progress in a chat turn, as sent to the client.
///
/// A turn always ends with exactly one [`TurnEvent::End`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Session {
        session_id: String,
    },
    Status {
        content: String,
        /// Present only on the apology, where it is always empty.
        #[serde(skip_serializing_if = "Option::is_none")]
        citations: Option<Vec<Citation>>,
    },
    /// The session's documents for the side panel, newest first.
    Documents {
        documents: Vec<Document>,
    },
    Partial {
        content: String,
    },
    /// The whole answer so far, re-spliced after a citation closed.
    Citation {
        content: String,
        content_original: String,
        citations: Vec<Citation>,
    },
    Full {
        content: String,
        content_original: String,
        citations: Vec<Citation>,
    },
    SessionName {
        content: String,
    },
    Error {
        content: String,
    },
    End {
        content: String,
    },
}

impl TurnEvent {
    pub fn status(content: impl Into<String>) -> Self {
        Self::Status {
            content: content.into(),
            citations: None,
        }
    }

    pub fn apology() -> Self {
        Self::Status {
            content: APOLOGY.to_string(),
            citations: Some(Vec::new()),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    pub fn end() -> Self {
        Self::End {
            content: END_CONTENT.to_string(),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::End { .. })
    }
}

impl From<SplicerOutput> for TurnEvent {
    fn from(output: SplicerOutput) -> Self {
        match output {
            SplicerOutput::Status(content) => Self::status(content),
            SplicerOutput::Partial(content) => Self::Partial { content },
            SplicerOutput::Citation {
                formatted,
                raw,
                citations,
            } => Self::Citation {
                content: formatted,
                content_original: raw,
                citations,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = TurnEvent::Citation {
            content: "<p>x</p>".into(),
            content_original: "x".into(),
            citations: vec![Citation::new(0, 1, "x", vec!["d1".into()])],
        };

        assert_eq!(
            serde_json::to_value(&event).expect("serializes"),
            json!({
                "type": "citation",
                "content": "<p>x</p>",
                "content_original": "x",
                "citations": [{"start": 0, "end": 1, "text": "x", "document_ids": ["d1"]}]
            })
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::SessionName { content: "Woo".into() })
                .expect("serializes"),
            json!({"type": "session_name", "content": "Woo"})
        );
    }

    #[test]
    fn apology_carries_empty_citations_and_plain_status_does_not() {
        assert_eq!(
            serde_json::to_value(TurnEvent::apology()).expect("serializes"),
            json!({"type": "status", "content": APOLOGY, "citations": []})
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::status(FOUND_STATUS)).expect("serializes"),
            json!({"type": "status", "content": FOUND_STATUS})
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::end()).expect("serializes"),
            json!({"type": "end", "content": "Done."})
        );
    }
}

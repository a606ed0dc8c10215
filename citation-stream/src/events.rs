use crate::citation::Citation;

/// Provider-neutral view of one event from a streaming chat call.
///
/// Adapters decode raw provider frames into this type exactly once; nothing downstream
/// looks at provider payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    TextDelta(String),
    /// Opens a citation span. Carries the full span description up front.
    CitationStart(Citation),
    /// Closes the most recently opened span.
    CitationEnd,
    /// Any other frame (message-start, tool plans, stream-end, ...), kept by name for logs.
    Unknown(String),
}

impl ChatStreamEvent {
    pub fn kind(&self) -> &str {
        match self {
            ChatStreamEvent::TextDelta(_) => "content-delta",
            ChatStreamEvent::CitationStart(_) => "citation-start",
            ChatStreamEvent::CitationEnd => "citation-end",
            ChatStreamEvent::Unknown(kind) => kind,
        }
    }
}

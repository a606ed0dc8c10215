use tracing::{debug, trace, warn};

use crate::{citation::Citation, events::ChatStreamEvent, splice::splice};

pub const SOURCES_STATUS: &str = "De bronnen om deze tekst te onderbouwen worden er nu bij gezocht.";

#[derive(Debug, Clone, PartialEq, Eq)]
enum SplicerState {
    Idle,
    CitationOpen(Citation),
}

/// What a single upstream event turns into for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplicerOutput {
    /// One-time notice that source attribution has started.
    Status(String),
    /// The new text fragment only.
    Partial(String),
    /// Whole text re-rendered with every citation closed so far.
    Citation {
        formatted: String,
        raw: String,
        citations: Vec<Citation>,
    },
}

/// How the turn's text ended up once the stream is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceOutcome {
    Answered {
        formatted: String,
        raw: String,
        citations: Vec<Citation>,
    },
    /// No text was generated at all.
    Empty,
}

/// Consumes one turn's chat stream events and tracks the accumulated text and citations.
///
/// At most one citation is open at a time. Protocol violations from upstream are logged
/// and absorbed.
#[derive(Debug)]
pub struct CitationSplicer {
    state: SplicerState,
    full_text: String,
    citations: Vec<Citation>,
    sources_announced: bool,
    status_message: String,
}

impl Default for CitationSplicer {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationSplicer {
    pub fn new() -> Self {
        Self::with_status_message(SOURCES_STATUS)
    }

    pub fn with_status_message(status_message: impl Into<String>) -> Self {
        Self {
            state: SplicerState::Idle,
            full_text: String::new(),
            citations: Vec::new(),
            sources_announced: false,
            status_message: status_message.into(),
        }
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn has_open_citation(&self) -> bool {
        matches!(self.state, SplicerState::CitationOpen(_))
    }

    pub fn process(&mut self, event: ChatStreamEvent) -> Option<SplicerOutput> {
        match event {
            ChatStreamEvent::TextDelta(delta) => {
                if delta.is_empty() {
                    return None;
                }
                self.full_text.push_str(&delta);
                Some(SplicerOutput::Partial(delta))
            }
            ChatStreamEvent::CitationStart(citation) => {
                let previous = std::mem::replace(
                    &mut self.state,
                    SplicerState::CitationOpen(citation),
                );
                if let SplicerState::CitationOpen(dropped) = previous {
                    warn!(
                        start = dropped.start,
                        end = dropped.end,
                        "citation-start while a citation was open; replacing pending citation"
                    );
                }

                if self.sources_announced {
                    None
                } else {
                    self.sources_announced = true;
                    Some(SplicerOutput::Status(self.status_message.clone()))
                }
            }
            ChatStreamEvent::CitationEnd => {
                match std::mem::replace(&mut self.state, SplicerState::Idle) {
                    SplicerState::CitationOpen(citation) => {
                        self.citations.push(citation);
                        Some(SplicerOutput::Citation {
                            formatted: splice(&self.full_text, &self.citations),
                            raw: self.full_text.clone(),
                            citations: self.citations.clone(),
                        })
                    }
                    SplicerState::Idle => {
                        debug!("citation-end without an open citation ignored");
                        None
                    }
                }
            }
            ChatStreamEvent::Unknown(kind) => {
                trace!(%kind, "ignoring chat stream event");
                None
            }
        }
    }

    pub fn finish(self) -> SpliceOutcome {
        if let SplicerState::CitationOpen(pending) = &self.state {
            warn!(
                start = pending.start,
                end = pending.end,
                "stream ended with an unclosed citation; discarding it"
            );
        }

        if self.full_text.is_empty() {
            return SpliceOutcome::Empty;
        }

        SpliceOutcome::Answered {
            formatted: splice(&self.full_text, &self.citations),
            raw: self.full_text,
            citations: self.citations,
        }
    }
}

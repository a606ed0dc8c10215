//! Turns a model's token stream with citation markers into span-accurate HTML while the
//! text is still being generated.

pub mod citation;
pub mod events;
pub mod markdown;
pub mod splice;
pub mod splicer;

pub use citation::Citation;
pub use events::ChatStreamEvent;
pub use splice::splice;
pub use splicer::{CitationSplicer, SpliceOutcome, SplicerOutput, SOURCES_STATUS};

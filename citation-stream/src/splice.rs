use std::fmt::Write;

use tracing::warn;

use crate::{
    citation::{resolve_span, CharIndex, Citation},
    markdown,
};

pub const CITATION_CLASS: &str = "citation-link";

/// Renders `full_text` to HTML with every citation span wrapped in a citation marker.
///
/// The output depends only on the arguments: callers re-run it from scratch whenever the
/// text or the citation set grows.
pub fn splice(full_text: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return markdown::render(full_text);
    }
    markdown::render(&insert_markers(full_text, citations))
}

/// The Markdown source with citation markers inserted, before rendering.
///
/// Spans are applied in `start` order (stable for ties). A span starting inside the
/// previous one is skipped so every character of `full_text` is emitted exactly once.
pub fn insert_markers(full_text: &str, citations: &[Citation]) -> String {
    let index = CharIndex::new(full_text);

    let mut spans: Vec<(usize, usize, &Citation)> = citations
        .iter()
        .map(|citation| {
            let (start, end) = resolve_span(full_text, &index, citation);
            (start, end, citation)
        })
        .collect();
    spans.sort_by_key(|(start, _, _)| *start);

    let mut out = String::with_capacity(full_text.len().saturating_add(spans.len().saturating_mul(64)));
    let mut last_end = 0usize;

    for (start, end, citation) in spans {
        if start < last_end {
            warn!(
                start,
                end,
                previous_end = last_end,
                "overlapping citation span dropped from rendering"
            );
            continue;
        }

        out.push_str(slice(full_text, &index, last_end, start));
        open_marker(&mut out, &citation.document_ids);
        out.push_str(slice(full_text, &index, start, end));
        out.push_str("</span>");
        last_end = end;
    }

    out.push_str(slice(full_text, &index, last_end, index.char_len()));
    out
}

fn slice<'a>(text: &'a str, index: &CharIndex, from: usize, to: usize) -> &'a str {
    text.get(index.byte_at(from)..index.byte_at(to))
        .unwrap_or_default()
}

fn open_marker(out: &mut String, document_ids: &[String]) {
    let ids = document_ids
        .iter()
        .map(|id| format!("'{}'", escape_attribute(id)))
        .collect::<Vec<_>>()
        .join(",");
    let _ = write!(
        out,
        r#"<span class="{CITATION_CLASS}" data-document-ids="[{ids}]">"#
    );
}

fn escape_attribute(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

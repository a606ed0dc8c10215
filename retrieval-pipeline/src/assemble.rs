use common::storage::types::document::{parse_published, Document};
use serde::Deserialize;
use serde_json::Value;

use crate::{formatting::format_content, index::RawHit};

#[derive(Debug, Default, Deserialize)]
struct HitPayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    meta: HitMeta,
}

/// Index metadata. Values arrive loosely typed (nulls, numbers as strings), so everything
/// is read as JSON and narrowed afterwards.
#[derive(Debug, Default, Deserialize)]
struct HitMeta {
    #[serde(default)]
    title: Value,
    #[serde(default)]
    url: Value,
    #[serde(default)]
    doc_url: Value,
    #[serde(default)]
    location: Value,
    #[serde(default)]
    location_name: Value,
    #[serde(default)]
    published: Value,
    #[serde(default)]
    modified: Value,
    #[serde(default)]
    source: Value,
    #[serde(default, rename = "type")]
    doc_type: Value,
    #[serde(default)]
    source_id: Value,
    #[serde(default)]
    identifier: Value,
    #[serde(default)]
    page_number: Value,
    #[serde(default)]
    page_count: Value,
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Maps a raw index hit onto a [`Document`].
///
/// `retrieval_score` is the hit's fusion score. `relevance_score` is the cross-encoder
/// score when the hit went through rerank.
pub fn assemble(hit: RawHit, relevance_score: Option<f32>) -> Document {
    let payload: HitPayload = serde_json::from_value(hit.payload).unwrap_or_default();
    let meta = payload.meta;

    Document {
        id: hit.id,
        retrieval_score: Some(hit.score),
        relevance_score,
        title: text(&meta.title).unwrap_or_default(),
        url: text(&meta.doc_url).or_else(|| text(&meta.url)),
        content: format_content(&payload.content),
        location: text(&meta.location),
        location_name: text(&meta.location_name),
        published: text(&meta.published).and_then(|raw| parse_published(&raw)),
        modified: text(&meta.modified),
        source: text(&meta.source),
        doc_type: text(&meta.doc_type),
        source_id: text(&meta.source_id),
        identifier: text(&meta.identifier),
        page_number: number(&meta.page_number),
        page_count: number(&meta.page_count),
    }
}

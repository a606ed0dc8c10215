use std::collections::HashSet;

use common::storage::types::document::Document;

/// Combines this turn's documents with the ones already attached to the session.
///
/// New documents come first and win on id collisions; order is otherwise preserved.
pub fn merge(new_docs: Vec<Document>, existing_docs: Vec<Document>) -> Vec<Document> {
    if existing_docs.is_empty() {
        return new_docs;
    }

    let mut seen: HashSet<String> =
        HashSet::with_capacity(new_docs.len().saturating_add(existing_docs.len()));
    new_docs
        .into_iter()
        .chain(existing_docs)
        .filter(|doc| seen.insert(doc.id.clone()))
        .collect()
}

/// The document panel: most recently published first. Documents without a publication
/// date are not shown.
pub fn order_for_panel(documents: &[Document]) -> Vec<Document> {
    let mut dated: Vec<Document> = documents
        .iter()
        .filter(|doc| doc.published.is_some())
        .cloned()
        .collect();
    dated.sort_by(|a, b| b.published.cmp(&a.published));
    dated
}

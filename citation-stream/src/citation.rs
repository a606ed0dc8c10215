use serde::{Deserialize, Serialize};

/// A `[start, end)` span of generated text, in characters, backed by the listed documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub start: usize,
    pub end: usize,
    /// What the model says sits at `start..end`. Used to re-anchor drifted offsets.
    pub text: String,
    pub document_ids: Vec<String>,
}

impl Citation {
    pub fn new(
        start: usize,
        end: usize,
        text: impl Into<String>,
        document_ids: Vec<String>,
    ) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            document_ids,
        }
    }
}

/// Character offsets of `text` mapped to byte offsets, with a trailing entry for the end.
pub(crate) struct CharIndex {
    byte_offsets: Vec<usize>,
}

impl CharIndex {
    pub(crate) fn new(text: &str) -> Self {
        let byte_offsets = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { byte_offsets }
    }

    pub(crate) fn char_len(&self) -> usize {
        self.byte_offsets.len().saturating_sub(1)
    }

    pub(crate) fn byte_at(&self, char_pos: usize) -> usize {
        let clamped = char_pos.min(self.char_len());
        self.byte_offsets.get(clamped).copied().unwrap_or_default()
    }

    pub(crate) fn char_at(&self, byte_pos: usize) -> usize {
        self.byte_offsets
            .binary_search(&byte_pos)
            .unwrap_or_else(|insert_at| insert_at)
    }
}

/// Resolves a citation to an in-bounds character span of `text`.
///
/// Offsets are clamped. If the cited text is not found at the reported offsets but occurs
/// elsewhere, the occurrence nearest to `start` wins.
pub(crate) fn resolve_span(text: &str, index: &CharIndex, citation: &Citation) -> (usize, usize) {
    let len = index.char_len();
    let end = citation.end.min(len);
    let start = citation.start.min(end);

    if citation.text.is_empty() {
        return (start, end);
    }

    let at_offsets = text
        .get(index.byte_at(start)..index.byte_at(end))
        .unwrap_or_default();
    if at_offsets == citation.text {
        return (start, end);
    }

    let cited_len = citation.text.chars().count();
    text.match_indices(citation.text.as_str())
        .map(|(byte_pos, _)| index.char_at(byte_pos))
        .min_by_key(|candidate| candidate.abs_diff(citation.start))
        .map_or((start, end), |found| (found, found.saturating_add(cited_len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cite(start: usize, end: usize, text: &str) -> Citation {
        Citation::new(start, end, text, vec!["doc".into()])
    }

    #[test]
    fn char_index_handles_multibyte_text() {
        let index = CharIndex::new("één brug");
        assert_eq!(index.char_len(), 8);
        assert_eq!(index.byte_at(1), 2);
        assert_eq!(index.char_at(2), 1);
        assert_eq!(index.byte_at(99), "één brug".len());
    }

    #[test]
    fn exact_offsets_are_kept() {
        let text = "De gemeente betaalt de brug.";
        let index = CharIndex::new(text);
        assert_eq!(resolve_span(text, &index, &cite(12, 19, "betaalt")), (12, 19));
    }

    #[test]
    fn drifted_offsets_reanchor_to_nearest_match() {
        let text = "De brug, de brug, de brug.";
        let index = CharIndex::new(text);
        // reported one character late on the second occurrence
        assert_eq!(resolve_span(text, &index, &cite(13, 17, "brug")), (12, 16));
    }

    #[test]
    fn out_of_range_spans_are_clamped() {
        let text = "kort";
        let index = CharIndex::new(text);
        assert_eq!(resolve_span(text, &index, &cite(2, 50, "")), (2, 4));
        assert_eq!(resolve_span(text, &index, &cite(9, 3, "")), (3, 3));
        assert_eq!(resolve_span(text, &index, &cite(1, 3, "afwezig")), (1, 3));
    }
}

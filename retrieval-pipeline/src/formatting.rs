use citation_stream::markdown;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

#[allow(clippy::expect_used)]
static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?([A-Za-z][A-Za-z0-9-]*)\b[^>]*>").expect("HTML tag pattern is valid")
});

/// Drops every HTML tag except `<span>` / `</span>`. Tag contents are kept.
pub fn strip_tags_except_span(text: &str) -> String {
    HTML_TAG.replace_all(text, |caps: &Captures<'_>| {
        let is_span = caps
            .get(1)
            .is_some_and(|name| name.as_str().eq_ignore_ascii_case("span"));
        if is_span {
            caps.get(0).map_or_else(String::new, |m| m.as_str().to_string())
        } else {
            String::new()
        }
    })
    .into_owned()
}

/// Renders a raw index excerpt for display: ellipsis markers on both ends (it is a
/// mid-document chunk), stray markup removed, Markdown converted to HTML.
pub fn format_content(content: &str) -> String {
    let wrapped = format!("[...] {} [...]", content.trim());
    markdown::render(&strip_tags_except_span(&wrapped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_spans_and_drops_other_tags() {
        let stripped = strip_tags_except_span(
            r#"<div class="x">De <b>raad</b> <span class="hl">besloot</span><br/> unaniem</div>"#,
        );
        assert_eq!(stripped, r#"De raad <span class="hl">besloot</span> unaniem"#);
    }

    #[test]
    fn tag_pattern_matches_open_close_and_self_closing() {
        assert!(HTML_TAG.is_match("<b>"));
        assert!(HTML_TAG.is_match("</span>"));
        assert!(HTML_TAG.is_match("<br/>"));
        assert!(!HTML_TAG.is_match("a < b"));
    }

    #[test]
    fn leaves_comparisons_alone() {
        assert_eq!(strip_tags_except_span("3 < 4 en 5 > 2"), "3 < 4 en 5 > 2");
    }

    #[test]
    fn formats_excerpt_with_markers_and_markdown() {
        let html = format_content("De **begroting** <i>stijgt</i>.");
        assert_eq!(html, "<p>[...] De <strong>begroting</strong> stijgt. [...]</p>\n");
    }
}

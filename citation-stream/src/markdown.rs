use pulldown_cmark::{html, Options, Parser};

/// Renders Markdown to HTML. Raw inline HTML (the citation spans) passes through untouched.
pub fn render(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::empty());
    let mut out = String::with_capacity(text.len().saturating_mul(3) / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_paragraphs_and_emphasis() {
        assert_eq!(render("Hallo **wereld**"), "<p>Hallo <strong>wereld</strong></p>\n");
    }

    #[test]
    fn inline_span_markup_survives() {
        let html = render(r#"De <span class="citation-link" data-document-ids="['a']">brug</span> is duur."#);
        assert!(html.contains(r#"<span class="citation-link" data-document-ids="['a']">brug</span>"#));
        assert!(html.starts_with("<p>"));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(render(""), "");
    }
}

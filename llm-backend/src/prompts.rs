use chrono::{Datelike, NaiveDateTime};
use common::storage::types::document::Document;
use serde::Serialize;

/// Upper bound for generated session names, in characters.
pub const MAX_CHAT_NAME_CHARS: usize = 250;

const RAG_SYSTEM_MESSAGE: &str = r#"## Task and Context

You are Bron Chat. You are an extremely capable large language model built by Open State Foundation and the SvdJ Incubator. You are given instructions programmatically via an API that you follow to the best of your ability. Your users are journalists and researchers based in the Netherlands. You will be provided with government documents and asked to answer questions based on these documents. There are 3.5 million open government documents in the Bron corpus from various Dutch government agencies and organizations. These documents categories are "Raadstukken" from the dataset "openbesluitvorming", "Politieke nieuwsbericht" from the dataset "poliflw", "Begrotingsdata" from the dataset "openspending", "Woo-verzoeken" from the dataset "woogle", "Officiële bekendmakingen" from the dataset "obk", "Rapporten" from the dataset "cvdr", "Lokale wet- en regelgeving" from the dataset "oor". It contains documents from the years 2010 to {year}. Today's date is {date}.

## Style Guide

1. Always answer in Dutch.
2. Formulate your answers in the style of a journalist.
3. When making factual statements, always cite the source document(s) that provided the information.
4. If the answer is not specifically found in the context, prefer to answer "Ik heb het antwoord niet kunnen vinden." instead of guessing.
5. When asked about the present, or time sensitive information, be sure to qualify your answer with the publication date of the document, and state that you cannot provide information about events after the publication date of retrieved the document(s).
6. If you cannot find documents supporting a factual answer of the question, suggest that the user review the Bron Gids which suggests resources and organizations that might be able to help.
"#;

pub const CHAT_NAME_SYSTEM_MESSAGE: &str = r"## Task and Context

You are Bron Chat. You are an extremely capable large language model built by Open State Foundation and the SvdJ Incubator. You are given instructions programmatically via an API that you follow to the best of your ability. Your users are journalists and researchers based in the Netherlands. You will be provided with a query. Your job is to turn this query into a concise and descriptive title for a AI chatbot session.

## Style Guide

Always create a short and descriptive title of five words or less in Dutch. Don't use any special characters or punctuation.
";

const HUMAN_READABLE_SOURCES: [(&str, &str); 7] = [
    ("openbesluitvorming", "Raadstuk"),
    ("poliflw", "Politiek nieuwsbericht"),
    ("openspending", "Begrotingsdata"),
    ("woogle", "Woo-verzoek"),
    ("obk", "Officiële bekendmaking"),
    ("cvdr", "Rapport"),
    ("oor", "Lokale wet- en regelgeving"),
];

pub fn rag_system_message(now: NaiveDateTime) -> String {
    RAG_SYSTEM_MESSAGE
        .replace("{year}", &now.year().to_string())
        .replace("{date}", &now.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Display label for a dataset tag. Unknown tags are returned as given.
pub fn human_readable_source(source: &str) -> &str {
    HUMAN_READABLE_SOURCES
        .iter()
        .find(|(tag, _)| *tag == source)
        .map_or(source, |(_, label)| label)
}

/// Cuts a model-generated name down to [`MAX_CHAT_NAME_CHARS`], preferring a sentence break
/// in the second half of the allowed length.
pub fn truncate_chat_name(name: &str) -> String {
    let name = name.trim();
    if name.chars().count() <= MAX_CHAT_NAME_CHARS {
        return name.to_string();
    }

    let truncated: String = name.chars().take(MAX_CHAT_NAME_CHARS).collect();
    let last_break = truncated
        .chars()
        .enumerate()
        .filter(|(_, c)| matches!(c, '.' | '?' | '!' | '\n'))
        .map(|(pos, _)| pos)
        .last();

    match last_break {
        Some(pos) if pos > MAX_CHAT_NAME_CHARS / 2 => truncated
            .chars()
            .take(pos.saturating_add(1))
            .collect::<String>()
            .trim()
            .to_string(),
        _ => truncated.trim().to_string(),
    }
}

/// Grounding record as sent to the chat model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroundingDocument {
    pub id: String,
    pub data: GroundingData,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroundingData {
    pub title: String,
    pub snippet: String,
    #[serde(rename = "publication date")]
    pub publication_date: String,
    pub municipality: String,
    pub source: String,
}

pub fn grounding_documents(documents: &[Document]) -> Vec<GroundingDocument> {
    documents
        .iter()
        .map(|doc| GroundingDocument {
            id: doc.id.clone(),
            data: GroundingData {
                title: doc.title.clone(),
                snippet: doc.content.clone(),
                publication_date: doc
                    .published
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                municipality: doc.location_name.clone().unwrap_or_default(),
                source: doc
                    .source
                    .as_deref()
                    .map(human_readable_source)
                    .unwrap_or_default()
                    .to_string(),
            },
        })
        .collect()
}

/// Plain-text rendering of the grounding set, for backends that only take chat messages.
pub fn inline_documents(documents: &[GroundingDocument]) -> String {
    let mut out = String::from("## Documents\n");
    for doc in documents {
        out.push_str(&format!(
            "\n[{}] {} ({}, {}, {})\n{}\n",
            doc.id,
            doc.data.title,
            doc.data.source,
            doc.data.municipality,
            doc.data.publication_date,
            doc.data.snippet
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn system_message_carries_date_and_year() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("valid datetime");
        let message = rag_system_message(now);
        assert!(message.contains("from the years 2010 to 2024"));
        assert!(message.contains("Today's date is 2024-03-05 09:30:00"));
        assert!(!message.contains("{year}"));
    }

    #[test]
    fn maps_known_sources_and_passes_unknown_through() {
        assert_eq!(human_readable_source("woogle"), "Woo-verzoek");
        assert_eq!(human_readable_source("obk"), "Officiële bekendmaking");
        assert_eq!(human_readable_source("rechtspraak"), "rechtspraak");
    }

    #[test]
    fn short_names_are_only_trimmed() {
        assert_eq!(truncate_chat_name("  Begroting Utrecht 2024 \n"), "Begroting Utrecht 2024");
    }

    #[test]
    fn long_names_cut_at_late_sentence_break() {
        let name = format!("{}. {}", "a".repeat(200), "b".repeat(100));
        let truncated = truncate_chat_name(&name);
        assert_eq!(truncated, format!("{}.", "a".repeat(200)));
    }

    #[test]
    fn long_names_without_late_break_are_hard_cut() {
        let name = format!("{}. {}", "a".repeat(50), "b".repeat(300));
        let truncated = truncate_chat_name(&name);
        assert_eq!(truncated.chars().count(), MAX_CHAT_NAME_CHARS);
    }

    #[test]
    fn grounding_uses_labels_and_municipality() {
        let mut doc = Document::new("doc-1");
        doc.title = "Raadsbesluit".into();
        doc.content = "<p>[...] tekst [...]</p>".into();
        doc.source = Some("openbesluitvorming".into());
        doc.location_name = Some("Utrecht".into());
        doc.published = NaiveDate::from_ymd_opt(2023, 6, 1);

        let grounded = grounding_documents(&[doc]);
        let json = serde_json::to_value(&grounded).expect("serializable");

        assert_eq!(json[0]["id"], "doc-1");
        assert_eq!(json[0]["data"]["source"], "Raadstuk");
        assert_eq!(json[0]["data"]["municipality"], "Utrecht");
        assert_eq!(json[0]["data"]["publication date"], "2023-06-01");
    }
}

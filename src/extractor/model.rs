use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\f\v]+").unwrap());
static NEWLINE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\n\s*\n\s*").unwrap());
static SINGLE_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\n *").unwrap());

/// An article-like page found during a pass. Lives only until it is either
/// persisted or dropped as a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub url: Url,
    pub title: String,
    pub body: String,
    pub language: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

/// Everything the extractor pulled out of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub candidates: Vec<ArticleCandidate>,
    pub links: Vec<Url>,
}

/// Title and main text as read from the document, before any judgement.
#[derive(Debug, Default)]
pub struct ReadResult {
    pub title: Option<String>,
    pub body: String,
}

pub fn normalize_whitespace(text: &str) -> String {
    let text = text.trim();

    // Replace multiple spaces/tabs with single space
    let spaced = SPACE_RUNS.replace_all(text, " ");

    // Paragraph breaks collapse to one blank line, lone breaks to a newline
    let paragraphs = NEWLINE_RUNS.replace_all(&spaced, "\n\n");
    SINGLE_NEWLINES.replace_all(&paragraphs, "\n").into_owned()
}

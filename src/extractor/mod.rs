pub mod language;
pub mod links;
pub mod model;
pub mod reader;
pub mod reject;

#[cfg(test)]
mod tests;

pub use model::{ArticleCandidate, Extraction};

use chrono::Utc;
use scraper::Html;
use thiserror::Error;
use url::Url;

const DEFAULT_MIN_BODY_CHARS: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("empty document")]
    EmptyDocument,

    #[error("base url has no host: {0}")]
    UnsupportedBase(String),
}

/// Splits fetched HTML into article candidates and in-scope links.
#[derive(Debug, Clone)]
pub struct Extractor {
    min_body_chars: usize,
}

impl Extractor {
    pub fn new(min_body_chars: usize) -> Self {
        Self { min_body_chars }
    }

    pub fn extract(&self, content: &str, base_url: &Url) -> Result<Extraction, ExtractError> {
        if base_url.host_str().is_none() {
            return Err(ExtractError::UnsupportedBase(base_url.to_string()));
        }
        if content.trim().is_empty() {
            return Err(ExtractError::EmptyDocument);
        }

        let document = Html::parse_document(content);
        let links = links::collect_links(&document, base_url);
        let read = reader::read(&document, self.min_body_chars);

        let mut candidates = Vec::new();
        if reject::is_article_like(read.title.as_deref(), &read.body, self.min_body_chars)
            && let Some(title) = read.title
        {
            candidates.push(ArticleCandidate {
                url: base_url.clone(),
                language: language::detect_language(&read.body),
                title,
                body: read.body,
                extracted_at: Utc::now(),
            });
        }

        Ok(Extraction { candidates, links })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BODY_CHARS)
    }
}

//! Keyword relevance of articles against criteria.
//!
//! Everything here is a pure function of normalized strings: the same
//! article text and match set always produce the same score.

pub mod normalize;
pub mod similarity;
pub mod stopwords;

pub use normalize::normalize;
pub use similarity::{Similarity, SimilarityMetric};

use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::entities::Criterion;

/// Normalized terms a criterion is matched with: its keywords plus the
/// significant words of its sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    terms: BTreeSet<String>,
}

impl MatchSet {
    pub fn new<S: AsRef<str>>(keywords: &[S], sentence: Option<&str>) -> Self {
        let mut terms: BTreeSet<String> = keywords
            .iter()
            .map(|k| normalize(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();

        if let Some(sentence) = sentence {
            let sentence = normalize(sentence);
            terms.extend(
                normalize::words(&sentence)
                    .filter(|w| stopwords::is_significant(w))
                    .map(str::to_string),
            );
        }

        Self { terms }
    }

    pub fn from_criterion(criterion: &Criterion) -> Self {
        Self::new(criterion.keywords.0.as_slice(), criterion.sentence.as_deref())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }
}

/// Article title and body, normalized once and reused for every criterion.
#[derive(Debug, Clone)]
pub struct ArticleText {
    padded: String,
    words: Vec<String>,
}

impl ArticleText {
    pub fn new(title: &str, body: &str) -> Self {
        let normalized = normalize(&format!("{title} {body}"));
        let words = normalize::words(&normalized).map(str::to_string).collect();
        Self {
            padded: format!(" {normalized} "),
            words,
        }
    }

    /// Whole-word occurrence of a normalized term.
    fn contains_term(&self, term: &str) -> bool {
        self.padded.contains(&format!(" {term} "))
    }

    /// Runs of `len` consecutive words.
    fn windows(&self, len: usize) -> impl Iterator<Item = String> + '_ {
        self.words.windows(len.max(1)).map(|w| w.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TermMatch {
    Exact,
    Fuzzy(f64),
    Missing,
}

/// Scores articles against criteria on a 0..=1 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceScorer {
    similarity: Similarity,
    exact_weight: f64,
    fuzzy_weight: f64,
}

impl RelevanceScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            similarity: Similarity::new(SimilarityMetric::default(), config.fuzzy_threshold),
            exact_weight: config.exact_weight,
            fuzzy_weight: config.fuzzy_weight,
        }
    }

    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    pub fn match_term(&self, text: &ArticleText, term: &str) -> TermMatch {
        if text.contains_term(term) {
            return TermMatch::Exact;
        }

        let width = normalize::words(term).count();
        text.windows(width)
            .filter_map(|window| self.similarity.matches(term, &window))
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
            .map_or(TermMatch::Missing, TermMatch::Fuzzy)
    }

    /// Weighted share of matched terms. An empty match set scores 0.
    pub fn score_text(&self, text: &ArticleText, set: &MatchSet) -> f64 {
        if set.is_empty() {
            return 0.0;
        }

        let matched: f64 = set
            .terms()
            .map(|term| match self.match_term(text, term) {
                TermMatch::Exact => self.exact_weight,
                TermMatch::Fuzzy(_) => self.fuzzy_weight,
                TermMatch::Missing => 0.0,
            })
            .sum();

        (matched / set.len() as f64).clamp(0.0, 1.0)
    }

    pub fn score(&self, title: &str, body: &str, criterion: &Criterion) -> f64 {
        self.score_text(&ArticleText::new(title, body), &MatchSet::from_criterion(criterion))
    }

    /// Scores against every criterion, keyed by criterion id.
    pub fn score_all(&self, title: &str, body: &str, criteria: &[Criterion]) -> BTreeMap<Uuid, f64> {
        let text = ArticleText::new(title, body);
        criteria
            .iter()
            .map(|c| (c.id, self.score_text(&text, &MatchSet::from_criterion(c))))
            .collect()
    }
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

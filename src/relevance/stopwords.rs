use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Words too common to say anything about a criterion sentence.
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "about", "as", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "should", "could", "may", "might", "must",
        "can", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they",
        "what", "which", "who", "when", "where", "why", "how", "any", "all", "some", "into",
        "than", "then", "there", "their", "them", "our", "your", "its", "not", "only", "also",
        "more", "most", "other", "such", "very", "just", "over", "under", "between", "interested",
    ]
    .into_iter()
    .collect()
});

/// Shortest word a sentence can contribute to a match set.
pub const MIN_SIGNIFICANT_LEN: usize = 3;

pub fn is_significant(word: &str) -> bool {
    word.chars().count() >= MIN_SIGNIFICANT_LEN && !STOP_WORDS.contains(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significance() {
        assert!(is_significant("climate"));
        assert!(!is_significant("the"));
        assert!(!is_significant("ai"));
        assert!(!is_significant("which"));
    }
}

use serde::{Deserialize, Serialize};

/// String similarity metric on a 0..=1 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// `1 - levenshtein / max(len)`
    #[default]
    NormalizedLevenshtein,
    JaroWinkler,
}

impl SimilarityMetric {
    pub fn compare(self, a: &str, b: &str) -> f64 {
        match self {
            Self::NormalizedLevenshtein => strsim::normalized_levenshtein(a, b),
            Self::JaroWinkler => strsim::jaro_winkler(a, b),
        }
    }

    /// Cheap upper bound of `compare` from the lengths alone, if the metric has one.
    fn upper_bound(self, a_len: usize, b_len: usize) -> Option<f64> {
        match self {
            Self::NormalizedLevenshtein => {
                let longest = a_len.max(b_len);
                if longest == 0 {
                    return Some(1.0);
                }
                Some(1.0 - a_len.abs_diff(b_len) as f64 / longest as f64)
            }
            Self::JaroWinkler => None,
        }
    }
}

/// A metric together with the threshold a fuzzy match has to reach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Similarity {
    pub metric: SimilarityMetric,
    pub threshold: f64,
}

impl Similarity {
    pub fn new(metric: SimilarityMetric, threshold: f64) -> Self {
        Self {
            metric,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Similarity of `a` and `b` when it reaches the threshold.
    pub fn matches(&self, a: &str, b: &str) -> Option<f64> {
        if let Some(bound) = self
            .metric
            .upper_bound(a.chars().count(), b.chars().count())
            && bound < self.threshold
        {
            return None;
        }
        let score = self.metric.compare(a, b);
        (score >= self.threshold).then_some(score)
    }
}

impl Default for Similarity {
    fn default() -> Self {
        Self::new(SimilarityMetric::default(), 0.85)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_is_above_default_threshold() {
        let sim = Similarity::default();
        let score = sim.matches("machine learning", "machine learnings").unwrap();
        assert!(score >= 0.85 && score < 1.0);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // one edit over ten characters
        let exact = SimilarityMetric::NormalizedLevenshtein.compare("abcdefghij", "abcdefghik");
        assert!((exact - 0.9).abs() < 1e-12);

        assert!(Similarity::new(SimilarityMetric::NormalizedLevenshtein, exact)
            .matches("abcdefghij", "abcdefghik")
            .is_some());
        assert!(Similarity::new(SimilarityMetric::NormalizedLevenshtein, exact + 1e-9)
            .matches("abcdefghij", "abcdefghik")
            .is_none());
    }

    #[test]
    fn test_length_bound_never_rejects_a_real_match() {
        let sim = Similarity::new(SimilarityMetric::NormalizedLevenshtein, 0.5);
        assert!(sim.matches("cat", "cats").is_some());
        assert!(sim.matches("cat", "catastrophe").is_none());
    }

    #[test]
    fn test_jaro_winkler_metric() {
        let sim = Similarity::new(SimilarityMetric::JaroWinkler, 0.85);
        assert!(sim.matches("climate", "climates").is_some());
        assert!(sim.matches("climate", "football").is_none());
    }

    #[test]
    fn test_threshold_is_clamped() {
        assert_eq!(Similarity::new(SimilarityMetric::default(), 3.0).threshold, 1.0);
        assert_eq!(Similarity::new(SimilarityMetric::default(), -1.0).threshold, 0.0);
    }
}

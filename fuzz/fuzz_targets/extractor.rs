#![no_main]

use libfuzzer_sys::fuzz_target;
use url::Url;

use newsdesk::extractor::Extractor;
use newsdesk::relevance::{ArticleText, MatchSet, RelevanceScorer};

fuzz_target!(|data: &[u8]| {
    let html = String::from_utf8_lossy(data);
    let base = Url::parse("https://example.com/news/").unwrap();

    // Extraction and scoring must never panic, and scores stay in [0, 1].
    let Ok(extraction) = Extractor::default().extract(&html, &base) else {
        return;
    };
    let scorer = RelevanceScorer::default();
    let set = MatchSet::new(&["rust", "machine-learning"], Some("systems programming news"));
    for candidate in extraction.candidates {
        let score = scorer.score_text(&ArticleText::new(&candidate.title, &candidate.body), &set);
        assert!((0.0..=1.0).contains(&score));
    }
});

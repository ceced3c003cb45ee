use url::Url;

use crate::extractor::{ExtractError, Extractor};

const ARTICLE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Sample Article - News Site</title>
  <meta property="og:site_name" content="News Site">
  <style>body { color: red; }</style>
</head>
<body>
  <header><a href="/">Home</a> <a href="/world">World</a></header>
  <nav><a href="/tech">Tech</a></nav>
  <article>
    <h1>Sample Article</h1>
    <p>This is the first paragraph of the sample article, and it talks about rivers and bridges at length.</p>
    <p>This is the second paragraph, which continues the story with more detail about the city council vote.</p>
    <a href="/related">Related story</a>
    <script>trackPageView();</script>
  </article>
  <footer><a href="https://twitter.com/newssite">Follow us</a></footer>
</body>
</html>"#;

const NAVIGATION_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Sections</title></head>
<body>
  <ul>
    <li><a href="/world">World</a></li>
    <li><a href="/tech">Tech</a></li>
    <li><a href="https://blog.example.com/">Blog</a></li>
    <li><a href="https://ads.example.net/">Ads</a></li>
  </ul>
</body>
</html>"#;

fn base(url: &str) -> Url {
    Url::parse(url).unwrap()
}

#[test]
fn test_extract_article() {
    let extraction = Extractor::default()
        .extract(ARTICLE_PAGE, &base("https://example.com/article"))
        .unwrap();

    assert_eq!(extraction.candidates.len(), 1);
    let candidate = &extraction.candidates[0];
    assert_eq!(candidate.title, "Sample Article");
    assert_eq!(candidate.url.as_str(), "https://example.com/article");
    assert!(candidate.body.contains("first paragraph"));
    assert!(candidate.body.contains("second paragraph"));
    assert!(!candidate.body.contains("trackPageView"));
    assert!(!candidate.body.contains("Follow us"));
    assert_eq!(candidate.language.as_deref(), Some("en"));
}

#[test]
fn test_article_links_are_absolute_and_in_scope() {
    let extraction = Extractor::default()
        .extract(ARTICLE_PAGE, &base("https://example.com/article"))
        .unwrap();

    let links: Vec<&str> = extraction.links.iter().map(Url::as_str).collect();
    assert_eq!(
        links,
        vec![
            "https://example.com/",
            "https://example.com/world",
            "https://example.com/tech",
            "https://example.com/related",
        ]
    );
}

#[test]
fn test_navigation_page_yields_only_links() {
    let extraction = Extractor::default()
        .extract(NAVIGATION_PAGE, &base("https://example.com/sections"))
        .unwrap();

    assert!(extraction.candidates.is_empty());
    let links: Vec<&str> = extraction.links.iter().map(Url::as_str).collect();
    assert_eq!(
        links,
        vec![
            "https://example.com/world",
            "https://example.com/tech",
            "https://blog.example.com/",
        ]
    );
}

#[test]
fn test_minimal_valid_content() {
    let html = format!(
        r#"<!DOCTYPE html><html><head><title>Valid Article</title></head><body><article><h1>Valid Article</h1><p>{}</p></article></body></html>"#,
        "This is a valid article with enough content to pass the minimum requirements for extraction. ".repeat(5)
    );

    let extraction = Extractor::default()
        .extract(&html, &base("https://example.com/valid"))
        .unwrap();

    assert_eq!(extraction.candidates.len(), 1);
    assert_eq!(extraction.candidates[0].title, "Valid Article");
    assert!(extraction.candidates[0].body.len() > 100);
}

#[test]
fn test_malformed_html() {
    let html = "<html><head><title>Broken</title><body><p>Unclosed tags<div>More content";

    let extraction = Extractor::default()
        .extract(html, &base("https://example.com/broken"))
        .unwrap();

    // Too short to be an article, but parsing must not fail
    assert!(extraction.candidates.is_empty());
}

#[test]
fn test_empty_document_is_an_error() {
    let result = Extractor::default().extract("   ", &base("https://example.com/"));
    assert_eq!(result, Err(ExtractError::EmptyDocument));
}

mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_extract_never_panics(html in ".*") {
            let _ = Extractor::default().extract(&html, &base("https://example.com/"));
        }

        #[test]
        fn test_links_stay_in_domain(path in "[a-z]{1,8}", host in "[a-z]{1,8}\\.(com|org)") {
            let html = format!(r#"<a href="/{path}">in</a><a href="https://{host}/{path}">out</a>"#);
            let extraction = Extractor::default()
                .extract(&html, &base("https://example.net/"))
                .unwrap();
            for link in extraction.links {
                prop_assert!(link.host_str().unwrap().ends_with("example.net"));
            }
        }
    }
}

use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::crawler::domain::{normalize_url, registered_domain, within_domain};

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Absolute http(s) links of a page that stay inside `base_url`'s registered
/// domain (subdomains included). Order of first appearance, no repeats.
pub fn collect_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let Some(base_host) = base_url.host_str() else {
        return Vec::new();
    };
    let domain = registered_domain(base_host);

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        let Ok(mut absolute) = base_url.join(href) else {
            continue;
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            continue;
        }
        absolute.set_fragment(None);

        let in_scope = absolute
            .host_str()
            .is_some_and(|host| within_domain(host, &domain));
        if !in_scope {
            continue;
        }

        if seen.insert(normalize_url(&absolute)) {
            links.push(absolute);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links_of(html: &str, base: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        collect_links(&document, &Url::parse(base).unwrap())
            .into_iter()
            .map(|u| u.to_string())
            .collect()
    }

    #[test]
    fn test_resolves_relative_links() {
        let links = links_of(
            r#"<a href="/page">a</a><a href="other">b</a><a href="../up">c</a>"#,
            "https://example.com/section/index.html",
        );
        assert_eq!(
            links,
            vec![
                "https://example.com/page",
                "https://example.com/section/other",
                "https://example.com/up",
            ]
        );
    }

    #[test]
    fn test_drops_external_and_non_http_links() {
        let links = links_of(
            r#"
            <a href="https://other.org/x">external</a>
            <a href="mailto:someone@example.com">mail</a>
            <a href="javascript:void(0)">js</a>
            <a href="https://blog.example.com/post">subdomain</a>
            <a href="https://notexample.com/">lookalike</a>
            "#,
            "https://example.com/",
        );
        assert_eq!(links, vec!["https://blog.example.com/post"]);
    }

    #[test]
    fn test_deduplicates_normalized_links() {
        let links = links_of(
            r##"<a href="/a">1</a><a href="/a#top">2</a><a href="https://www.example.com/a/">3</a>"##,
            "https://example.com/",
        );
        assert_eq!(links, vec!["https://example.com/a"]);
    }
}

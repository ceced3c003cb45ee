use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

use crate::extractor::model::{ReadResult, normalize_whitespace};

/// Subtrees that never hold article text.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside", "form", "iframe", "svg",
    "template", "button",
];

/// Tags after which a line break is inserted so paragraphs stay apart.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "br",
    "blockquote", "pre", "tr", "ul", "ol", "figure",
];

/// Minimum text length for a single paragraph to count in the fallback path.
const MIN_PARAGRAPH_CHARS: usize = 50;

static CONTENT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "article",
        "main",
        "[role='main']",
        "[class*='content'], [class*='article'], [class*='post'], [class*='entry']",
        "#content, #main",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[property='og:title']").unwrap());
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());

/// Read the title and main text of a parsed document.
///
/// The body comes from the first content container holding at least
/// `min_body_chars` characters; otherwise every substantial paragraph is
/// joined.
pub fn read(document: &Html, min_body_chars: usize) -> ReadResult {
    ReadResult {
        title: extract_title(document),
        body: extract_body(document, min_body_chars),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let from_h1 = document
        .select(&H1)
        .map(|h1| normalize_whitespace(&visible_text(h1)))
        .find(|t| !t.is_empty());
    if from_h1.is_some() {
        return from_h1;
    }

    let from_og = document
        .select(&OG_TITLE)
        .filter_map(|meta| meta.value().attr("content"))
        .map(normalize_whitespace)
        .find(|t| !t.is_empty());
    if from_og.is_some() {
        return from_og;
    }

    document
        .select(&TITLE)
        .map(|title| normalize_whitespace(&title.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn extract_body(document: &Html, min_body_chars: usize) -> String {
    for selector in CONTENT_SELECTORS.iter() {
        for element in document.select(selector) {
            let text = normalize_whitespace(&visible_text(element));
            if text.chars().count() >= min_body_chars {
                return text;
            }
        }
    }

    // Last resort: every paragraph long enough to be prose
    let paragraphs: Vec<String> = document
        .select(&PARAGRAPH)
        .map(|p| normalize_whitespace(&visible_text(p)))
        .filter(|t| t.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect();
    paragraphs.join("\n\n")
}

/// Text of an element, skipping script/nav/boilerplate subtrees.
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

const MAX_BOILERPLATE_RATIO: f64 = 0.3;

const BOILERPLATE_PHRASES: &[&str] = &[
    "cookie",
    "privacy policy",
    "terms of service",
    "gdpr",
    "consent",
    "accept all",
    "manage preferences",
    "subscribe",
    "newsletter",
    "log in",
    "login",
    "sign up",
    "forgot password",
    "404",
    "not found",
    "access denied",
    "please wait",
    "enable javascript",
    "click here",
    "read more",
];

/// Decide whether a page's title and body are article-like.
///
/// A candidate needs a title and at least `min_body_chars` characters of
/// body, and must not be dominated by consent/login/error chrome.
pub fn is_article_like(title: Option<&str>, body: &str, min_body_chars: usize) -> bool {
    let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
        return false;
    };
    if body.chars().count() < min_body_chars.max(1) {
        return false;
    }
    !has_too_much_boilerplate(title, body)
}

fn has_too_much_boilerplate(title: &str, body: &str) -> bool {
    let total_words = body.split_whitespace().count();
    if total_words == 0 {
        return true;
    }

    let text_lower = format!("{title} {body}").to_lowercase();
    let boilerplate_count: usize = BOILERPLATE_PHRASES
        .iter()
        .map(|phrase| text_lower.matches(phrase).count())
        .sum();

    boilerplate_count as f64 / total_words as f64 > MAX_BOILERPLATE_RATIO
}

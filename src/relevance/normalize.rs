/// Lower-case `text`, fold every run of non-alphanumeric characters
/// (punctuation, `-`, `_`, whitespace) into one space and trim.
///
/// "Machine-Learning", "machine_learning" and "machine  learning" all
/// normalize to "machine learning".
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Words of an already normalized string.
pub fn words(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|w| !w.is_empty())
}

//! Charset sniffing and decoding of fetched HTML.

use bytes::Bytes;
use encoding_rs::Encoding;
use regex::Regex;
use std::sync::LazyLock;

use crate::fetcher::{
    errors::FetchError,
    types::{Charset, PageBody},
};

/// Bytes of the document inspected for `<meta>` declarations and by the
/// statistical detector.
const SNIFF_WINDOW: usize = 4096;

static HEADER_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).unwrap());

static META_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>]+)"#).unwrap());

static META_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+[^>]*?http-equiv\s*=\s*["']?content-type["']?[^>]*?content\s*=\s*["']?[^"'>]*?charset\s*=\s*([^"'\s;/>]+)"#).unwrap()
});

/// Decode a downloaded HTML body to UTF-8.
pub fn decode_body(raw: Bytes, content_type: &str) -> Result<PageBody, FetchError> {
    let encoding = sniff_encoding(content_type, &raw);
    let (text, _, malformed) = encoding.decode(&raw);
    if malformed {
        return Err(FetchError::Charset(format!(
            "body is not valid {}",
            encoding.name()
        )));
    }
    let utf8 = text.into_owned();

    Ok(PageBody {
        raw,
        utf8,
        charset: Charset::from_encoding(encoding),
    })
}

/// The Content-Type header wins, then `<meta charset>`, then the
/// `http-equiv` form. Undeclared pages fall back to chardetng.
fn sniff_encoding(content_type: &str, body: &[u8]) -> &'static Encoding {
    let head = String::from_utf8_lossy(&body[..body.len().min(SNIFF_WINDOW)]);

    let declared = [
        (&*HEADER_CHARSET, content_type),
        (&*META_CHARSET, head.as_ref()),
        (&*META_CONTENT_TYPE, head.as_ref()),
    ]
    .into_iter()
    .find_map(|(pattern, text)| {
        let label = pattern.captures(text)?.get(1)?;
        Encoding::for_label(label.as_str().as_bytes())
    });

    declared.unwrap_or_else(|| {
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(&body[..body.len().min(SNIFF_WINDOW)], false);
        detector.guess(None, true)
    })
}

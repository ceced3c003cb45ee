use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetcher::errors::FetchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    Utf8,
    Windows1252,
    ShiftJis,
    Gb2312,
    Big5,
    Other(String),
}

impl Charset {
    pub fn from_encoding(encoding: &'static encoding_rs::Encoding) -> Self {
        use std::ptr;

        if ptr::eq(encoding, encoding_rs::UTF_8) {
            Self::Utf8
        } else if ptr::eq(encoding, encoding_rs::WINDOWS_1252) {
            Self::Windows1252
        } else if ptr::eq(encoding, encoding_rs::SHIFT_JIS) {
            Self::ShiftJis
        } else if ptr::eq(encoding, encoding_rs::GBK) || ptr::eq(encoding, encoding_rs::GB18030) {
            Self::Gb2312
        } else if ptr::eq(encoding, encoding_rs::BIG5) {
            Self::Big5
        } else {
            Self::Other(encoding.name().to_string())
        }
    }
}

/// `ETag` / `Last-Modified` values used for conditional requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// What the transport hands back for one GET, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url_final: Url,
    pub status: StatusCode,
    pub validators: Validators,
    pub body: Option<PageBody>,
}

/// Decoded body of a 2xx HTML response.
#[derive(Debug, Clone)]
pub struct PageBody {
    pub raw: Bytes,
    pub utf8: String,
    pub charset: Charset,
}

impl PageBody {
    pub fn utf8(html: impl Into<String>) -> Self {
        let utf8 = html.into();
        Self {
            raw: Bytes::from(utf8.clone()),
            utf8,
            charset: Charset::Utf8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub url_final: Url,
    pub status: StatusCode,
    pub body_raw: Bytes,
    pub body_utf8: String,
    pub charset: Charset,
    pub fetched_at: DateTime<Utc>,
}

/// Result of one conditional fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    Fresh {
        page: PageResponse,
        validators: Validators,
    },
    NotModified {
        validators: Validators,
    },
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }
}

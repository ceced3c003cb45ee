use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category recorded on page errors and job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    Network,
    Http,
    Parse,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("dns failure: {0}")]
    Dns(String),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("request timeout")]
    RequestTimeout,

    #[error("too many redirects")]
    RedirectLoop,

    #[error("http error {status}")]
    Http { status: reqwest::StatusCode },

    #[error("body too large ({0} bytes)")]
    BodyTooLarge(u64),

    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("charset error: {0}")]
    Charset(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("unknown: {0}")]
    Unknown(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::ConnectTimeout | Self::RequestTimeout => FetchErrorKind::Timeout,
            Self::Dns(_) | Self::Connect(_) | Self::Io(_) | Self::Unknown(_) => {
                FetchErrorKind::Network
            }
            Self::Http { .. } | Self::RedirectLoop => FetchErrorKind::Http,
            Self::InvalidUrl(_)
            | Self::BodyTooLarge(_)
            | Self::UnsupportedContentType(_)
            | Self::Charset(_) => FetchErrorKind::Parse,
        }
    }

    /// Whether the next scheduled pass has a chance of succeeding.
    /// Nothing is retried inside a pass.
    pub fn is_transient(&self) -> bool {
        match self.kind() {
            FetchErrorKind::Timeout | FetchErrorKind::Network => true,
            FetchErrorKind::Http => {
                matches!(self, Self::Http { status } if status.is_server_error())
            }
            FetchErrorKind::Parse => false,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            if err.is_connect() {
                Self::ConnectTimeout
            } else {
                Self::RequestTimeout
            }
        } else if err.is_redirect() {
            Self::RedirectLoop
        } else if let Some(status) = err.status() {
            Self::Http { status }
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_request() {
            Self::Dns(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}

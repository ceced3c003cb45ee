use thiserror::Error;
use uuid::Uuid;

use crate::fetcher::{FetchError, FetchErrorKind};
use crate::repositories::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("http error: status {status}")]
    Http { status: u16 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("site {0} not found")]
    SiteNotFound(Uuid),

    #[error("criterion {0} not found")]
    CriterionNotFound(Uuid),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl From<&FetchError> for PipelineError {
    fn from(err: &FetchError) -> Self {
        if let FetchError::Http { status } = err {
            return Self::Http {
                status: status.as_u16(),
            };
        }
        match err.kind() {
            FetchErrorKind::Parse => Self::Parse(err.to_string()),
            FetchErrorKind::Timeout | FetchErrorKind::Network | FetchErrorKind::Http => {
                Self::Network(err.to_string())
            }
        }
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        Self::from(&err)
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

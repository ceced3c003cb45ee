pub mod client;
pub mod errors;
pub mod pipeline;
pub mod types;

pub use client::{ReqwestTransport, Transport};
pub use errors::{FetchError, FetchErrorKind};
pub use types::{Charset, FetchOutcome, PageBody, PageResponse, RawResponse, Validators};

use chrono::Utc;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Turns transport responses into [`FetchOutcome`]s. Never retries.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    #[instrument(skip(self, validators), fields(url = %url, conditional = !validators.is_empty()))]
    pub async fn fetch(&self, url: &Url, validators: &Validators) -> FetchOutcome {
        let response = match self.transport.get(url, validators).await {
            Ok(response) => response,
            Err(err) => {
                warn!(kind = ?err.kind(), "fetch failed: {}", err);
                return FetchOutcome::Failed(err);
            }
        };

        if response.status == StatusCode::NOT_MODIFIED {
            debug!("not modified");
            return FetchOutcome::NotModified {
                validators: response.validators,
            };
        }

        if !response.status.is_success() {
            warn!(status = %response.status, "http error");
            return FetchOutcome::Failed(FetchError::Http {
                status: response.status,
            });
        }

        let Some(body) = response.body else {
            return FetchOutcome::Failed(FetchError::Io(format!(
                "{} response without a body",
                response.status
            )));
        };

        FetchOutcome::Fresh {
            page: PageResponse {
                url_final: response.url_final,
                status: response.status,
                body_raw: body.raw,
                body_utf8: body.utf8,
                charset: body.charset,
                fetched_at: Utc::now(),
            },
            validators: response.validators,
        }
    }
}

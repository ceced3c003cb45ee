use crate::config::HttpConfig;
use crate::fetcher::{
    errors::FetchError,
    pipeline::decode_body,
    types::{RawResponse, Validators},
};
use async_trait::async_trait;
use reqwest::{
    Client, ClientBuilder, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use tracing::{debug, instrument};
use url::Url;

const MAX_BODY_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Performs a single conditional GET. Redirects and the request timeout are
/// the transport's business; classification into fresh/not-modified/failed
/// happens in [`crate::fetcher::Fetcher`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, validators: &Validators) -> Result<RawResponse, FetchError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Unknown(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip_all, fields(url = %url))]
    async fn get(&self, url: &Url, validators: &Validators) -> Result<RawResponse, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(etag) = &validators.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        let url_final = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let validators = Validators {
            etag: header_string(&headers, header::ETAG),
            last_modified: header_string(&headers, header::LAST_MODIFIED),
        };

        if status == StatusCode::NOT_MODIFIED || !status.is_success() {
            debug!(%status, "no body to decode");
            return Ok(RawResponse {
                url_final,
                status,
                validators,
                body: None,
            });
        }

        // Check content length before downloading
        if let Some(content_length) = response.content_length()
            && content_length > MAX_BODY_SIZE
        {
            return Err(FetchError::BodyTooLarge(content_length));
        }

        let content_type = header_string(&headers, header::CONTENT_TYPE)
            .unwrap_or_else(|| "text/html".to_string());

        // Only HTML pages carry articles and links
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let body_bytes = response
            .bytes()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        // Check body size after download (in case Content-Length was missing)
        if body_bytes.len() as u64 > MAX_BODY_SIZE {
            return Err(FetchError::BodyTooLarge(body_bytes.len() as u64));
        }

        let body = decode_body(body_bytes, &content_type)?;

        Ok(RawResponse {
            url_final,
            status,
            validators,
            body: Some(body),
        })
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

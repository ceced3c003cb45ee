use newsdesk::config::HttpConfig;
use newsdesk::fetcher::{
    FetchError, FetchErrorKind, FetchOutcome, Fetcher, ReqwestTransport, Validators,
};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::{
    Mock, MockServer, Request, ResponseTemplate,
    matchers::{header, method, path},
};

fn fetcher() -> Fetcher {
    fetcher_with(HttpConfig::default())
}

fn fetcher_with(config: HttpConfig) -> Fetcher {
    Fetcher::new(Arc::new(ReqwestTransport::new(&config).unwrap()))
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(body.as_bytes())
        .insert_header("Content-Type", "text/html; charset=utf-8")
}

fn expect_failed(outcome: FetchOutcome) -> FetchError {
    match outcome {
        FetchOutcome::Failed(err) => err,
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_fresh_returns_body_and_validators() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(
            html("<html><head><title>Test</title></head><body>Hello World</body></html>")
                .insert_header("ETag", "\"v1\"")
                .insert_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        )
        .mount(&mock_server)
        .await;

    let target = url(&mock_server, "/news");
    match fetcher().fetch(&target, &Validators::default()).await {
        FetchOutcome::Fresh { page, validators } => {
            assert!(page.status.is_success());
            assert!(page.body_utf8.contains("Hello World"));
            assert_eq!(page.url_final, target);
            assert_eq!(validators.etag.as_deref(), Some("\"v1\""));
            assert_eq!(
                validators.last_modified.as_deref(),
                Some("Wed, 21 Oct 2015 07:28:00 GMT")
            );
        }
        other => panic!("expected fresh page, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_sends_etag_and_gets_not_modified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/news"))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("ETag", "\"v1\""))
        .expect(1)
        .mount(&mock_server)
        .await;

    let validators = Validators {
        etag: Some("\"v1\"".to_string()),
        last_modified: None,
    };
    let outcome = fetcher()
        .fetch(&url(&mock_server, "/news"), &validators)
        .await;

    match outcome {
        FetchOutcome::NotModified { validators } => {
            assert_eq!(validators.etag.as_deref(), Some("\"v1\""));
        }
        other => panic!("expected not modified, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_sends_if_modified_since() {
    let mock_server = MockServer::start().await;
    let stamp = "Wed, 21 Oct 2015 07:28:00 GMT";

    // HTTP dates contain a comma, which `header` would split on.
    Mock::given(method("GET"))
        .and(path("/news"))
        .and(move |request: &Request| {
            request
                .headers
                .get("If-Modified-Since")
                .and_then(|value| value.to_str().ok())
                == Some(stamp)
        })
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&mock_server)
        .await;

    let validators = Validators {
        etag: None,
        last_modified: Some(stamp.to_string()),
    };
    let outcome = fetcher()
        .fetch(&url(&mock_server, "/news"), &validators)
        .await;

    // No validators on the 304 itself.
    match outcome {
        FetchOutcome::NotModified { validators } => assert!(validators.is_empty()),
        other => panic!("expected not modified, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_404_is_http_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notfound"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let err = expect_failed(
        fetcher()
            .fetch(&url(&mock_server, "/notfound"), &Validators::default())
            .await,
    );

    match &err {
        FetchError::Http { status } => assert_eq!(status.as_u16(), 404),
        other => panic!("expected HTTP 404 error, got {other:?}"),
    }
    assert_eq!(err.kind(), FetchErrorKind::Http);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_fetch_500_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/error"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let err = expect_failed(
        fetcher()
            .fetch(&url(&mock_server, "/error"), &Validators::default())
            .await,
    );
    assert!(matches!(err, FetchError::Http { status } if status.as_u16() == 500));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_follows_redirect() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/redirect"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/final"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(html("<html><body>Final page</body></html>"))
        .mount(&mock_server)
        .await;

    match fetcher()
        .fetch(&url(&mock_server, "/redirect"), &Validators::default())
        .await
    {
        FetchOutcome::Fresh { page, .. } => {
            assert!(page.body_utf8.contains("Final page"));
            assert!(page.url_final.as_str().ends_with("/final"));
        }
        other => panic!("expected fresh page, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_gzip_compression() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let original_content =
        "<html><head><title>Compressed</title></head><body>This content is gzipped!</body></html>";

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(original_content.as_bytes()).unwrap();
    let compressed_data = encoder.finish().unwrap();

    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gzipped"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(compressed_data)
                .insert_header("Content-Type", "text/html; charset=utf-8")
                .insert_header("Content-Encoding", "gzip"),
        )
        .mount(&mock_server)
        .await;

    match fetcher()
        .fetch(&url(&mock_server, "/gzipped"), &Validators::default())
        .await
    {
        FetchOutcome::Fresh { page, .. } => {
            assert!(page.body_utf8.contains("This content is gzipped!"));
        }
        other => panic!("expected fresh page, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_decodes_latin1() {
    let mock_server = MockServer::start().await;

    // "café" in ISO-8859-1
    let mut body = b"<html><body>caf".to_vec();
    body.push(0xE9);
    body.extend_from_slice(b"</body></html>");

    Mock::given(method("GET"))
        .and(path("/latin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .insert_header("Content-Type", "text/html; charset=iso-8859-1"),
        )
        .mount(&mock_server)
        .await;

    match fetcher()
        .fetch(&url(&mock_server, "/latin"), &Validators::default())
        .await
    {
        FetchOutcome::Fresh { page, .. } => assert!(page.body_utf8.contains("café")),
        other => panic!("expected fresh page, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_unsupported_content_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0xFF, 0xD8, 0xFF])
                .insert_header("Content-Type", "image/jpeg"),
        )
        .mount(&mock_server)
        .await;

    let err = expect_failed(
        fetcher()
            .fetch(&url(&mock_server, "/image"), &Validators::default())
            .await,
    );
    assert!(matches!(err, FetchError::UnsupportedContentType(ref ct) if ct == "image/jpeg"));
    assert_eq!(err.kind(), FetchErrorKind::Parse);
}

#[tokio::test]
async fn test_fetch_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html><body>late</body></html>").set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with(HttpConfig {
        request_timeout: Duration::from_millis(200),
        ..HttpConfig::default()
    });
    let err = expect_failed(
        fetcher
            .fetch(&url(&mock_server, "/slow"), &Validators::default())
            .await,
    );
    assert_eq!(err.kind(), FetchErrorKind::Timeout);
    assert!(err.is_transient());
}

//! Integration tests for `HttpClient` retry and conditional-GET behavior.
//!
//! Uses `wiremock` to stand up a local HTTP server for each test so no
//! real network traffic is made.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate, Respond};

use mediascout_scraper::{HttpClient, RequestProfile, ScrapeError};

fn client() -> HttpClient {
    HttpClient::new().expect("failed to build test HttpClient")
}

#[tokio::test]
async fn get_returns_body_on_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let response = client()
        .get(&format!("{}/article", server.uri()), RequestProfile::Html, "test")
        .await
        .expect("expected success");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<html>ok</html>");
}

#[tokio::test]
async fn non_retriable_4xx_fails_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client()
        .get(&format!("{}/missing", server.uri()), RequestProfile::Html, "test")
        .await;

    assert!(
        matches!(result, Err(ScrapeError::Http { status: 404, .. })),
        "expected Http(404), got: {result:?}"
    );
}

/// Responds 500 for the first `failures` requests, then 200.
struct FlakyResponder {
    failures: usize,
    hits: std::sync::atomic::AtomicUsize,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let hit = self.hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if hit < self.failures {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_string("recovered")
        }
    }
}

#[tokio::test]
async fn retries_5xx_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(FlakyResponder {
            failures: 2,
            hits: std::sync::atomic::AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let response = client()
        .get(&format!("{}/flaky", server.uri()), RequestProfile::Api, "test")
        .await
        .expect("expected recovery after retries");

    assert_eq!(response.body, "recovered");
}

#[tokio::test]
async fn exhausted_retries_return_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = client()
        .get(&format!("{}/down", server.uri()), RequestProfile::Api, "test")
        .await;

    assert!(
        matches!(result, Err(ScrapeError::Http { status: 503, .. })),
        "expected Http(503) after 3 attempts, got: {result:?}"
    );
}

#[tokio::test]
async fn rate_limit_with_retry_after_is_honored() {
    let server = MockServer::start().await;

    // First request 429 with Retry-After: 1, second succeeds.
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(FlakyRateLimiter {
            hits: std::sync::atomic::AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let response = client()
        .get(&format!("{}/limited", server.uri()), RequestProfile::Api, "test")
        .await
        .expect("expected success after rate limit");

    assert_eq!(response.body, "after limit");
    // The Retry-After floor is 1 second.
    assert!(
        started.elapsed() >= std::time::Duration::from_secs(1),
        "retry happened before the Retry-After delay: {:?}",
        started.elapsed()
    );
}

struct FlakyRateLimiter {
    hits: std::sync::atomic::AtomicUsize,
}

impl Respond for FlakyRateLimiter {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let hit = self.hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if hit == 0 {
            ResponseTemplate::new(429).insert_header("Retry-After", "1")
        } else {
            ResponseTemplate::new(200).set_body_string("after limit")
        }
    }
}

#[tokio::test]
async fn conditional_get_sends_validators_and_accepts_304() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let conditional = mediascout_scraper::http::Conditional {
        etag: Some("\"v1\"".to_string()),
        last_modified: None,
    };
    let response = client()
        .get_conditional(
            &format!("{}/feed.xml", server.uri()),
            RequestProfile::Rss,
            "test",
            &conditional,
        )
        .await
        .expect("304 is a success");

    assert!(response.not_modified());
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn response_validators_are_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<rss/>")
                .insert_header("ETag", "\"v2\"")
                .insert_header("Last-Modified", "Mon, 01 Jan 2024 12:00:00 GMT"),
        )
        .mount(&server)
        .await;

    let response = client()
        .get(&format!("{}/feed.xml", server.uri()), RequestProfile::Rss, "test")
        .await
        .expect("expected success");

    assert_eq!(response.etag.as_deref(), Some("\"v2\""));
    assert_eq!(
        response.last_modified.as_deref(),
        Some("Mon, 01 Jan 2024 12:00:00 GMT")
    );
}

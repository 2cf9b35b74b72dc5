//! Headered, retry-aware HTTP request engine.
//!
//! Every outbound request goes through one of three profiles (HTML, API,
//! RSS), each with its own timeout and header set. Transient failures
//! (429 and 5xx) are retried with exponential backoff and jitter;
//! `Retry-After` on 429/503 overrides the computed delay. Only GET is
//! exposed, so the idempotent-methods-only retry guard holds by
//! construction.

use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::{Client, StatusCode};

use crate::domain::etld_plus_one;
use crate::error::ScrapeError;
use crate::metrics::{observe_http_error, observe_http_request};

/// Request profile: selects timeout, headers, and the rate-limit lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestProfile {
    Html,
    Api,
    Rss,
}

impl RequestProfile {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RequestProfile::Html => "html",
            RequestProfile::Api => "api",
            RequestProfile::Rss => "rss",
        }
    }

    #[must_use]
    pub fn timeout(self) -> Duration {
        match self {
            RequestProfile::Html => Duration::from_secs(30),
            RequestProfile::Api => Duration::from_secs(10),
            RequestProfile::Rss => Duration::from_secs(20),
        }
    }
}

/// Realistic browser user agents, rotated per request on the HTML profile.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 8_000;
const RETRY_AFTER_MIN_SECS: u64 = 1;
const RETRY_AFTER_MAX_SECS: u64 = 30;

/// A completed response with the headers conditional-GET callers need.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub final_url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl HttpResponse {
    #[must_use]
    pub fn not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED.as_u16()
    }
}

/// Extra headers for a conditional GET.
#[derive(Debug, Clone, Default)]
pub struct Conditional {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Shared request engine, one `reqwest::Client` per profile.
pub struct HttpClient {
    html: Client,
    api: Client,
    rss: Client,
}

impl HttpClient {
    /// Build the per-profile clients.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Transport`] if a client cannot be constructed.
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            html: Self::build_client(RequestProfile::Html)?,
            api: Self::build_client(RequestProfile::Api)?,
            rss: Self::build_client(RequestProfile::Rss)?,
        })
    }

    fn build_client(profile: RequestProfile) -> Result<Client, ScrapeError> {
        let mut headers = HeaderMap::new();
        match profile {
            RequestProfile::Html => {
                headers.insert(
                    ACCEPT,
                    HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    ),
                );
                headers.insert(
                    ACCEPT_LANGUAGE,
                    HeaderValue::from_static("en-US,en;q=0.9,da;q=0.8"),
                );
            }
            RequestProfile::Api => {
                headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
            }
            RequestProfile::Rss => {
                headers.insert(
                    ACCEPT,
                    HeaderValue::from_static(
                        "application/rss+xml, application/atom+xml, text/xml, application/xml",
                    ),
                );
            }
        }

        let client = Client::builder()
            .timeout(profile.timeout())
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .gzip(true)
            .build()?;
        Ok(client)
    }

    fn client(&self, profile: RequestProfile) -> &Client {
        match profile {
            RequestProfile::Html => &self.html,
            RequestProfile::Api => &self.api,
            RequestProfile::Rss => &self.rss,
        }
    }

    /// GET a URL under the given profile, with retries.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::Http`] — non-2xx status after retries
    /// - [`ScrapeError::Timeout`] — request budget exceeded
    /// - [`ScrapeError::Transport`] — network/DNS/TLS failure
    pub async fn get(
        &self,
        url: &str,
        profile: RequestProfile,
        provider: &str,
    ) -> Result<HttpResponse, ScrapeError> {
        self.get_conditional(url, profile, provider, &Conditional::default())
            .await
    }

    /// GET with `If-None-Match` / `If-Modified-Since` support.
    ///
    /// A `304 Not Modified` response is returned as a success with an
    /// empty body — check [`HttpResponse::not_modified`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub async fn get_conditional(
        &self,
        url: &str,
        profile: RequestProfile,
        provider: &str,
        conditional: &Conditional,
    ) -> Result<HttpResponse, ScrapeError> {
        let domain = etld_plus_one(url);
        let started = Instant::now();
        let result = self
            .get_with_retries(url, profile, conditional)
            .await;
        observe_http_request(provider, &domain, started.elapsed().as_secs_f64());

        if let Err(err) = &result {
            tracing::warn!(
                url,
                profile = profile.as_str(),
                provider,
                error = %err,
                "http request failed"
            );
            observe_http_error(provider, err.metric_label());
        }

        result
    }

    async fn get_with_retries(
        &self,
        url: &str,
        profile: RequestProfile,
        conditional: &Conditional,
    ) -> Result<HttpResponse, ScrapeError> {
        let mut attempt = 0u32;

        loop {
            match self.get_once(url, profile, conditional).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !is_retriable(&err) || attempt + 1 >= MAX_ATTEMPTS {
                        return Err(err);
                    }

                    let delay = retry_delay(&err, attempt);
                    tracing::debug!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient http error, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        profile: RequestProfile,
        conditional: &Conditional,
    ) -> Result<HttpResponse, ScrapeError> {
        let mut request = self.client(profile).get(url);

        if profile == RequestProfile::Html {
            let ua = USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())];
            request = request.header(reqwest::header::USER_AGENT, ua);
        } else {
            request = request.header(
                reqwest::header::USER_AGENT,
                "mediascout/0.1 (media monitoring)",
            );
        }
        if let Some(etag) = &conditional.etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &conditional.last_modified {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout {
                    url: url.to_string(),
                }
            } else {
                ScrapeError::Transport(e)
            }
        })?;

        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(HttpResponse {
                status: status.as_u16(),
                body: String::new(),
                final_url: response.url().to_string(),
                etag: None,
                last_modified: None,
            });
        }

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(http_error(status, url, retry_after));
        }

        let final_url = response.url().to_string();
        let etag = header_string(response.headers(), reqwest::header::ETAG);
        let last_modified = header_string(response.headers(), reqwest::header::LAST_MODIFIED);
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout {
                    url: url.to_string(),
                }
            } else {
                ScrapeError::Transport(e)
            }
        })?;

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
            final_url,
            etag,
            last_modified,
        })
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Wraps a non-2xx status, carrying a server-requested retry delay when
/// present on 429/503.
fn http_error(status: StatusCode, url: &str, retry_after_secs: Option<u64>) -> ScrapeError {
    let honors_retry_after =
        status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE;
    ScrapeError::Http {
        status: status.as_u16(),
        url: url.to_string(),
        retry_after_secs: retry_after_secs.filter(|_| honors_retry_after),
    }
}

fn is_retriable(err: &ScrapeError) -> bool {
    match err {
        ScrapeError::Http { status, .. } => *status == 429 || (500..600).contains(status),
        ScrapeError::Transport(_) | ScrapeError::Timeout { .. } => true,
        _ => false,
    }
}

/// Compute the delay before the next attempt: the clamped `Retry-After`
/// when the server sent one, else exponential backoff with jitter.
fn retry_delay(err: &ScrapeError, attempt: u32) -> Duration {
    if let ScrapeError::Http {
        retry_after_secs: Some(secs),
        ..
    } = err
    {
        let clamped = (*secs).clamp(RETRY_AFTER_MIN_SECS, RETRY_AFTER_MAX_SECS);
        return Duration::from_secs(clamped);
    }

    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(10));
    let capped = base.min(BACKOFF_CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_status(status: u16) -> ScrapeError {
        ScrapeError::Http {
            status,
            url: "https://example.com".to_string(),
            retry_after_secs: None,
        }
    }

    fn rate_limited(status: u16, retry_after_secs: u64) -> ScrapeError {
        ScrapeError::Http {
            status,
            url: "https://example.com".to_string(),
            retry_after_secs: Some(retry_after_secs),
        }
    }

    #[test]
    fn retriable_statuses_are_429_and_5xx() {
        assert!(is_retriable(&http_status(429)));
        assert!(is_retriable(&http_status(500)));
        assert!(is_retriable(&http_status(503)));
        assert!(!is_retriable(&http_status(404)));
        assert!(!is_retriable(&http_status(403)));
    }

    #[test]
    fn timeout_and_transport_are_retriable() {
        assert!(is_retriable(&ScrapeError::Timeout {
            url: "https://example.com".to_string(),
        }));
    }

    #[test]
    fn parse_errors_are_not_retriable() {
        assert!(!is_retriable(&ScrapeError::Parse {
            context: "feed".to_string(),
            reason: "bad xml".to_string(),
        }));
    }

    #[test]
    fn backoff_grows_and_stays_capped() {
        // Jitter adds at most 50%, so attempt 0 lands in [500, 750] ms.
        let d0 = retry_delay(&http_status(500), 0);
        assert!(d0 >= Duration::from_millis(500) && d0 <= Duration::from_millis(750));

        // Attempt 10 would be 500ms * 2^10 = 512s uncapped; cap is 8s + jitter.
        let d10 = retry_delay(&http_status(500), 10);
        assert!(d10 <= Duration::from_millis(12_000));
    }

    #[test]
    fn retry_after_is_clamped() {
        let delay = retry_delay(&rate_limited(429, 600), 0);
        assert_eq!(delay, Duration::from_secs(30));

        let delay = retry_delay(&rate_limited(503, 0), 0);
        assert_eq!(delay, Duration::from_secs(1));
    }

    #[test]
    fn profile_timeouts_match_contract() {
        assert_eq!(RequestProfile::Html.timeout(), Duration::from_secs(30));
        assert_eq!(RequestProfile::Api.timeout(), Duration::from_secs(10));
        assert_eq!(RequestProfile::Rss.timeout(), Duration::from_secs(20));
    }
}

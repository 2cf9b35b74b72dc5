//! Search-API provider (SerpAPI-style Google News).
//!
//! One query per keyword, issued in parallel under the rate governor.
//! Entries missing a link or title are discarded.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;

use crate::dates::{parse_date, passes_cutoff};
use crate::error::ScrapeError;
use crate::http::{HttpClient, RequestProfile};
use crate::rate::RateGovernor;
use crate::text::{source_name_from_url, truncate_chars};
use crate::types::{DateConfidence, RawCandidate};

pub const PROVIDER: &str = "serpapi";

const API_DOMAIN: &str = "serpapi.com";

#[derive(Debug, Clone)]
pub struct SerpApiConfig {
    pub api_key: String,
    /// Base URL override for tests; the live endpoint by default.
    pub base_url: String,
    pub lang: String,
    pub region: String,
}

impl SerpApiConfig {
    #[must_use]
    pub fn new(api_key: String, lang: String, region: String) -> Self {
        Self {
            api_key,
            base_url: format!("https://{API_DOMAIN}/search"),
            lang,
            region,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news_results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    title: Option<String>,
    link: Option<String>,
    date: Option<String>,
    snippet: Option<String>,
    description: Option<String>,
}

/// Fetch candidates from the search API, one parallel query per keyword.
///
/// # Errors
///
/// Returns the last error only when every keyword query failed and
/// nothing was collected.
pub async fn scrape_serpapi(
    http: &HttpClient,
    governor: &RateGovernor,
    config: &SerpApiConfig,
    keywords: &[String],
    from_date: DateTime<Utc>,
    run_id: &str,
) -> Result<Vec<RawCandidate>, ScrapeError> {
    if keywords.is_empty() {
        return Ok(Vec::new());
    }

    let queries = keywords.iter().map(|keyword| async move {
        governor.throttle(RequestProfile::Api, API_DOMAIN).await;

        let encoded = utf8_percent_encode(keyword, NON_ALPHANUMERIC).to_string();
        let url = format!(
            "{}?q={}&engine=google_news&hl={}&gl={}&api_key={}",
            config.base_url, encoded, config.lang, config.region, config.api_key
        );

        let response = http.get(&url, RequestProfile::Api, PROVIDER).await?;
        let parsed: SearchResponse =
            serde_json::from_str(&response.body).map_err(|e| ScrapeError::Parse {
                context: format!("serpapi response for '{keyword}'"),
                reason: e.to_string(),
            })?;

        Ok::<_, ScrapeError>((keyword.clone(), parsed.news_results))
    });

    let results = futures::future::join_all(queries).await;

    let mut candidates = Vec::new();
    let mut last_error: Option<ScrapeError> = None;

    for result in results {
        let (keyword, news_results) = match result {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(run_id, error = %e, "search api query failed");
                last_error = Some(e);
                continue;
            }
        };

        for item in news_results {
            let (Some(title), Some(link)) = (item.title, item.link) else {
                continue;
            };

            // Dates arrive like "05/01/2024, 07:00 AM, +0000 UTC".
            let cleaned_date = item
                .date
                .as_deref()
                .map(|d| d.replace(", +0000 UTC", ""));
            let published_at = cleaned_date.as_deref().and_then(parse_date);
            let confidence = if published_at.is_some() {
                DateConfidence::Medium
            } else {
                DateConfidence::None
            };
            if !passes_cutoff(published_at, confidence, false, from_date) {
                continue;
            }

            let teaser = item.snippet.or(item.description).unwrap_or_default();
            candidates.push(RawCandidate {
                title,
                teaser: truncate_chars(&teaser, 600),
                source_name: source_name_from_url(&link),
                url: link,
                published_at,
                date_confidence: confidence,
                provider: PROVIDER,
                matched_keyword: Some(keyword.clone()),
            });
        }
    }

    tracing::info!(run_id, count = candidates.len(), "search api provider finished");

    match last_error {
        Some(error) if candidates.is_empty() => Err(error),
        _ => Ok(candidates),
    }
}

//! News-API provider (GNews-style).
//!
//! Batches keywords into OR-joined queries under a per-request character
//! cap and paginates each batch. Failures mid-run are logged and the
//! partial harvest returned.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;

use crate::dates::{parse_date, passes_cutoff};
use crate::error::ScrapeError;
use crate::http::{HttpClient, RequestProfile};
use crate::rate::RateGovernor;
use crate::text::{source_name_from_url, truncate_chars};
use crate::types::{DateConfidence, RawCandidate};

pub const PROVIDER: &str = "gnews";

const API_DOMAIN: &str = "gnews.io";
/// OR-joined query length cap per request.
const QUERY_CHAR_CAP: usize = 200;
const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct GnewsConfig {
    pub api_key: String,
    /// Base URL override for tests; the live endpoint by default.
    pub base_url: String,
    pub lang: String,
    pub max_pages: u32,
}

impl GnewsConfig {
    #[must_use]
    pub fn new(api_key: String, lang: String) -> Self {
        Self {
            api_key,
            base_url: format!("https://{API_DOMAIN}/api/v4/search"),
            lang,
            max_pages: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

/// Join keywords into OR-queries, starting a new batch whenever the cap
/// would be exceeded. A single over-long keyword still gets its own batch.
fn batch_keywords(keywords: &[String], char_cap: usize) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for keyword in keywords {
        let quoted = format!("\"{keyword}\"");
        let needed = if current.is_empty() {
            quoted.len()
        } else {
            current.len() + " OR ".len() + quoted.len()
        };

        if !current.is_empty() && needed > char_cap {
            batches.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current = quoted;
        } else {
            current.push_str(" OR ");
            current.push_str(&quoted);
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Fetch candidates from the news API.
///
/// # Errors
///
/// Returns the last error only when nothing at all was collected;
/// otherwise partial results are returned as success.
pub async fn scrape_gnews(
    http: &HttpClient,
    governor: &RateGovernor,
    config: &GnewsConfig,
    keywords: &[String],
    from_date: DateTime<Utc>,
    run_id: &str,
) -> Result<Vec<RawCandidate>, ScrapeError> {
    if keywords.is_empty() {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    let mut last_error: Option<ScrapeError> = None;

    for batch in batch_keywords(keywords, QUERY_CHAR_CAP) {
        let encoded = utf8_percent_encode(&batch, NON_ALPHANUMERIC).to_string();

        for page in 1..=config.max_pages {
            governor.throttle(RequestProfile::Api, API_DOMAIN).await;

            let url = format!(
                "{}?q={}&token={}&lang={}&max={}&page={}",
                config.base_url, encoded, config.api_key, config.lang, PAGE_SIZE, page
            );

            let response = match http.get(&url, RequestProfile::Api, PROVIDER).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(run_id, page, error = %e, "news api request failed");
                    last_error = Some(e);
                    break;
                }
            };

            let parsed: SearchResponse = match serde_json::from_str(&response.body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(run_id, error = %e, "news api response unparseable");
                    last_error = Some(ScrapeError::Parse {
                        context: "gnews search response".to_string(),
                        reason: e.to_string(),
                    });
                    break;
                }
            };

            let page_count = parsed.articles.len();
            for article in parsed.articles {
                let Some(url) = article.url else { continue };

                let published_at = article.published_at.as_deref().and_then(parse_date);
                let confidence = if published_at.is_some() {
                    DateConfidence::High
                } else {
                    DateConfidence::None
                };
                if !passes_cutoff(published_at, confidence, false, from_date) {
                    continue;
                }

                candidates.push(RawCandidate {
                    title: article.title.unwrap_or_else(|| "Untitled".to_string()),
                    teaser: truncate_chars(&article.description.unwrap_or_default(), 600),
                    source_name: source_name_from_url(&url),
                    url,
                    published_at,
                    date_confidence: confidence,
                    provider: PROVIDER,
                    matched_keyword: None,
                });
            }

            if page_count < PAGE_SIZE {
                break;
            }
        }
    }

    tracing::info!(run_id, count = candidates.len(), "news api provider finished");

    match last_error {
        Some(error) if candidates.is_empty() => Err(error),
        _ => Ok(candidates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn short_keyword_lists_become_one_batch() {
        let batches = batch_keywords(&kw(&["lego", "rabat"]), 200);
        assert_eq!(batches, vec!["\"lego\" OR \"rabat\""]);
    }

    #[test]
    fn batches_respect_the_character_cap() {
        let keywords = kw(&["alpha", "beta", "gamma", "delta"]);
        let batches = batch_keywords(&keywords, 20);
        assert!(batches.len() > 1, "expected multiple batches, got {batches:?}");
        for batch in &batches {
            assert!(batch.len() <= 20 || !batch.contains(" OR "), "oversized batch: {batch}");
        }
    }

    #[test]
    fn oversized_single_keyword_still_gets_a_batch() {
        let long = "x".repeat(300);
        let batches = batch_keywords(&kw(&[&long]), 200);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn empty_keywords_produce_no_batches() {
        assert!(batch_keywords(&[], 200).is_empty());
    }
}

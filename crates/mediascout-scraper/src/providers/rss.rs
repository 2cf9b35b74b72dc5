//! RSS provider.
//!
//! Combines per-keyword Google News RSS searches with the feeds of
//! recipes whose discovery type is `rss`. Conditional GETs (`ETag` /
//! `If-Modified-Since`) make unchanged feeds nearly free; parse failures
//! are tracked per feed as a quality signal. Feed dates come from the
//! publisher and are treated as authoritative.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::dates::passes_cutoff;
use crate::domain::etld_plus_one;
use crate::error::ScrapeError;
use crate::http::{Conditional, HttpClient, RequestProfile};
use crate::rate::RateGovernor;
use crate::text::{
    compile_keyword_patterns, normalize_title, source_name_from_url, strip_html, truncate_chars,
    KeywordPattern,
};
use crate::types::{DateConfidence, DiscoveryType, RawCandidate, SourceRecipe};

pub const PROVIDER: &str = "rss";

#[derive(Debug, Clone, Default)]
struct FeedCacheEntry {
    etag: Option<String>,
    last_modified: Option<String>,
}

const DEFAULT_SEARCH_BASE: &str = "https://news.google.com/rss/search";

/// RSS provider with process-wide conditional-GET state.
///
/// Shared across runs: the cache is what makes hourly re-polls of
/// unchanged feeds cheap.
pub struct RssProvider {
    search_base: String,
    cache: Mutex<HashMap<String, FeedCacheEntry>>,
    parse_failures: Mutex<HashMap<String, u32>>,
}

impl Default for RssProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RssProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_search_base(DEFAULT_SEARCH_BASE)
    }

    /// Constructor with a custom news-search endpoint, for tests.
    #[must_use]
    pub fn with_search_base(search_base: &str) -> Self {
        Self {
            search_base: search_base.to_string(),
            cache: Mutex::new(HashMap::new()),
            parse_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch candidates from Google News searches and recipe feeds.
    ///
    /// # Errors
    ///
    /// Infallible in practice — individual feed failures are contained
    /// and logged; the signature matches the provider contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn scrape(
        &self,
        http: &HttpClient,
        governor: &RateGovernor,
        recipes: &[SourceRecipe],
        keywords: &[String],
        from_date: DateTime<Utc>,
        run_id: &str,
        lang: &str,
        region: &str,
    ) -> Result<Vec<RawCandidate>, ScrapeError> {
        let patterns = compile_keyword_patterns(keywords);
        let region_upper = region.to_ascii_uppercase();

        // Per-keyword Google News RSS searches; results are attributed to
        // the searched keyword.
        let mut feeds: Vec<(String, Option<String>)> = keywords
            .iter()
            .map(|keyword| {
                let encoded = utf8_percent_encode(keyword, NON_ALPHANUMERIC).to_string();
                let url = format!(
                    "{}?q={encoded}&hl={lang}&gl={region_upper}&ceid={region_upper}:{lang}",
                    self.search_base
                );
                (url, Some(keyword.clone()))
            })
            .collect();

        // Recipe feeds; entries are keyword-filtered after parsing.
        for recipe in recipes {
            if recipe.discovery_type == Some(DiscoveryType::Rss) {
                for feed_url in &recipe.rss_urls {
                    feeds.push((feed_url.clone(), None));
                }
            }
        }

        let mut candidates = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (feed_url, searched_keyword) in feeds {
            governor
                .throttle(RequestProfile::Rss, &etld_plus_one(&feed_url))
                .await;

            let conditional = self.cached_conditional(&feed_url);
            let response = match http
                .get_conditional(&feed_url, RequestProfile::Rss, PROVIDER, &conditional)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(run_id, feed_url, error = %e, "feed fetch failed");
                    continue;
                }
            };

            if response.not_modified() {
                tracing::debug!(run_id, feed_url, "feed unchanged (304)");
                continue;
            }

            self.store_cache(&feed_url, &response.etag, &response.last_modified);

            let feed = match feed_rs::parser::parse(response.body.as_bytes()) {
                Ok(feed) => feed,
                Err(e) => {
                    let failures = self.record_parse_failure(&feed_url);
                    tracing::warn!(
                        run_id,
                        feed_url,
                        failures,
                        error = %e,
                        "feed parse failed"
                    );
                    continue;
                }
            };

            for entry in feed.entries {
                let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                    continue;
                };
                let title = entry.title.as_ref().map(|t| t.content.clone()).unwrap_or_default();
                if title.is_empty() {
                    continue;
                }
                let teaser = entry
                    .summary
                    .as_ref()
                    .map(|s| truncate_chars(&strip_html(&s.content), 600))
                    .unwrap_or_default();

                // Feed-level dedup: same story often appears under multiple
                // guids/links with an identical title.
                let guid = if entry.id.is_empty() {
                    link.clone()
                } else {
                    entry.id.clone()
                };
                if !seen.insert((guid, normalize_title(&title))) {
                    continue;
                }

                let published_at = entry.published.or(entry.updated);
                let confidence = if published_at.is_some() {
                    DateConfidence::High
                } else {
                    DateConfidence::None
                };
                if !passes_cutoff(published_at, confidence, true, from_date) {
                    continue;
                }

                let matched_keyword = match &searched_keyword {
                    Some(keyword) => Some(keyword.clone()),
                    None => {
                        // Recipe feeds carry everything the site publishes;
                        // keep only keyword hits.
                        let text = format!("{title} {teaser}");
                        match first_matching_keyword(&patterns, &text) {
                            Some(keyword) => Some(keyword),
                            None => continue,
                        }
                    }
                };

                candidates.push(RawCandidate {
                    title,
                    teaser,
                    source_name: source_name_from_url(&link),
                    url: link,
                    published_at,
                    date_confidence: confidence,
                    provider: PROVIDER,
                    matched_keyword,
                });
            }
        }

        tracing::info!(run_id, count = candidates.len(), "rss provider finished");
        Ok(candidates)
    }

    fn cached_conditional(&self, feed_url: &str) -> Conditional {
        let cache = self.cache.lock().expect("feed cache poisoned");
        cache
            .get(feed_url)
            .map(|entry| Conditional {
                etag: entry.etag.clone(),
                last_modified: entry.last_modified.clone(),
            })
            .unwrap_or_default()
    }

    fn store_cache(&self, feed_url: &str, etag: &Option<String>, last_modified: &Option<String>) {
        if etag.is_none() && last_modified.is_none() {
            return;
        }
        let mut cache = self.cache.lock().expect("feed cache poisoned");
        cache.insert(
            feed_url.to_string(),
            FeedCacheEntry {
                etag: etag.clone(),
                last_modified: last_modified.clone(),
            },
        );
    }

    fn record_parse_failure(&self, feed_url: &str) -> u32 {
        let mut failures = self.parse_failures.lock().expect("failure map poisoned");
        let count = failures.entry(feed_url.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

fn first_matching_keyword(patterns: &[KeywordPattern], text: &str) -> Option<String> {
    patterns
        .iter()
        .find(|pattern| pattern.matched_terms(text) >= 1)
        .map(|pattern| pattern.keyword.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_roundtrip_stores_and_returns_validators() {
        let provider = RssProvider::new();
        provider.store_cache(
            "https://example.com/feed.xml",
            &Some("\"abc\"".to_string()),
            &Some("Mon, 01 Jan 2024 12:00:00 GMT".to_string()),
        );
        let conditional = provider.cached_conditional("https://example.com/feed.xml");
        assert_eq!(conditional.etag.as_deref(), Some("\"abc\""));
        assert!(conditional.last_modified.is_some());
    }

    #[test]
    fn cache_miss_yields_empty_conditional() {
        let provider = RssProvider::new();
        let conditional = provider.cached_conditional("https://example.com/other.xml");
        assert!(conditional.etag.is_none());
        assert!(conditional.last_modified.is_none());
    }

    #[test]
    fn parse_failures_accumulate_per_feed() {
        let provider = RssProvider::new();
        assert_eq!(provider.record_parse_failure("https://a.com/feed"), 1);
        assert_eq!(provider.record_parse_failure("https://a.com/feed"), 2);
        assert_eq!(provider.record_parse_failure("https://b.com/feed"), 1);
    }

    #[test]
    fn first_matching_keyword_requires_word_boundary() {
        let patterns = compile_keyword_patterns(&["rabat".to_string(), "lego".to_string()]);
        assert_eq!(
            first_matching_keyword(&patterns, "Store rabat hos Netto"),
            Some("rabat".to_string())
        );
        assert_eq!(
            first_matching_keyword(&patterns, "LEGO opens new store"),
            Some("lego".to_string())
        );
        assert_eq!(first_matching_keyword(&patterns, "rabatten stiger"), None);
    }
}

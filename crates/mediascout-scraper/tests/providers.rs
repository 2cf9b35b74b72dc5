//! Integration tests for the providers and the orchestrator's error
//! isolation, all against local `wiremock` servers.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mediascout_scraper::http::HttpClient;
use mediascout_scraper::orchestrator::{fetch_all_mentions, OrchestratorConfig, ScrapeContext};
use mediascout_scraper::providers::{
    scrape_gnews, scrape_serpapi, GnewsConfig, RssProvider, SerpApiConfig,
};
use mediascout_scraper::rate::{RateConfig, RateGovernor};
use mediascout_scraper::types::DateConfidence;

fn http() -> HttpClient {
    HttpClient::new().expect("failed to build HttpClient")
}

fn governor() -> RateGovernor {
    // Generous rates so tests are not paced by the limiter.
    RateGovernor::new(RateConfig {
        html_rps: 100.0,
        api_rps: 100.0,
        rss_rps: 100.0,
        circuit_threshold: 8,
    })
}

fn kw(words: &[&str]) -> Vec<String> {
    words.iter().map(|s| (*s).to_string()).collect()
}

fn recent_iso() -> String {
    (Utc::now() - Duration::hours(1)).to_rfc3339()
}

// ---------------------------------------------------------------------------
// GNews-style provider
// ---------------------------------------------------------------------------

fn gnews_config(server: &MockServer) -> GnewsConfig {
    GnewsConfig {
        api_key: "test-key".to_string(),
        base_url: format!("{}/api/v4/search", server.uri()),
        lang: "da".to_string(),
        max_pages: 3,
    }
}

#[tokio::test]
async fn gnews_maps_articles_to_candidates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
            "totalArticles": 1,
            "articles": [{
                "title": "Store rabat hos Netto",
                "description": "Netto giver stor rabat i denne uge.",
                "url": "https://ex.com/a?utm_source=feed",
                "publishedAt": recent_iso(),
            }]
        })))
        .mount(&server)
        .await;

    let candidates = scrape_gnews(
        &http(),
        &governor(),
        &gnews_config(&server),
        &kw(&["rabat"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await
    .expect("provider should succeed");

    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert_eq!(candidate.title, "Store rabat hos Netto");
    assert_eq!(candidate.provider, "gnews");
    assert_eq!(candidate.source_name, "ex.com");
    assert_eq!(candidate.date_confidence, DateConfidence::High);
    assert!(candidate.published_at.is_some());
}

#[tokio::test]
async fn gnews_skips_articles_outside_the_window() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
            "articles": [{
                "title": "Old story",
                "url": "https://ex.com/old",
                "publishedAt": "2020-01-01T00:00:00Z",
            }]
        })))
        .mount(&server)
        .await;

    let candidates = scrape_gnews(
        &http(),
        &governor(),
        &gnews_config(&server),
        &kw(&["rabat"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await
    .expect("provider should succeed");

    assert!(candidates.is_empty());
}

#[tokio::test]
async fn gnews_propagates_error_only_when_nothing_collected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = scrape_gnews(
        &http(),
        &governor(),
        &gnews_config(&server),
        &kw(&["rabat"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await;

    assert!(result.is_err(), "expected error when nothing collected");
}

// ---------------------------------------------------------------------------
// SerpAPI-style provider
// ---------------------------------------------------------------------------

fn serpapi_config(server: &MockServer) -> SerpApiConfig {
    SerpApiConfig {
        api_key: "test-key".to_string(),
        base_url: format!("{}/search", server.uri()),
        lang: "da".to_string(),
        region: "dk".to_string(),
    }
}

#[tokio::test]
async fn serpapi_discards_entries_missing_link_or_title() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
            "news_results": [
                { "title": "Has both", "link": "https://ex.com/a", "snippet": "text" },
                { "title": "No link" },
                { "link": "https://ex.com/no-title" },
            ]
        })))
        .mount(&server)
        .await;

    let candidates = scrape_serpapi(
        &http(),
        &governor(),
        &serpapi_config(&server),
        &kw(&["rabat"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await
    .expect("provider should succeed");

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].title, "Has both");
    assert_eq!(candidates[0].matched_keyword.as_deref(), Some("rabat"));
}

#[tokio::test]
async fn serpapi_queries_each_keyword() {
    let server = MockServer::start().await;

    for keyword in ["lego", "netto"] {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", keyword))
            .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
                "news_results": [{
                    "title": format!("Story about {keyword}"),
                    "link": format!("https://ex.com/{keyword}"),
                }]
            })))
            .mount(&server)
            .await;
    }

    let candidates = scrape_serpapi(
        &http(),
        &governor(),
        &serpapi_config(&server),
        &kw(&["lego", "netto"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await
    .expect("provider should succeed");

    assert_eq!(candidates.len(), 2);
}

// ---------------------------------------------------------------------------
// RSS provider
// ---------------------------------------------------------------------------

fn rss_body(link: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Feed</title>
    <item>
      <title>Store rabat hos Netto</title>
      <link>{link}</link>
      <guid>item-1</guid>
      <description>Netto giver rabat.</description>
      <pubDate>{}</pubDate>
    </item>
  </channel>
</rss>"#,
        (Utc::now() - Duration::hours(2)).to_rfc2822()
    )
}

#[tokio::test]
async fn rss_recipe_feed_filters_by_keyword() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss_body("https://ex.com/rabat-artikel"))
                .insert_header("ETag", "\"v1\""),
        )
        .mount(&server)
        .await;

    let recipes = vec![mediascout_scraper::types::SourceRecipe {
        domain: "ex.com".to_string(),
        rss_urls: vec![format!("{}/feed.xml", server.uri())],
        discovery_type: Some(mediascout_scraper::types::DiscoveryType::Rss),
        ..Default::default()
    }];

    let provider = RssProvider::with_search_base(&format!("{}/rss/search", server.uri()));
    // No keyword search hits (keywords only match the recipe feed), so
    // only the recipe feed path contributes.
    let candidates = provider
        .scrape(
            &http(),
            &governor(),
            &recipes,
            &kw(&["rabat"]),
            Utc::now() - Duration::days(1),
            "test-run",
            "da",
            "dk",
        )
        .await
        .expect("provider should succeed");

    let from_recipe: Vec<_> = candidates
        .iter()
        .filter(|c| c.url.contains("rabat-artikel"))
        .collect();
    assert_eq!(from_recipe.len(), 1);
    assert_eq!(from_recipe[0].date_confidence, DateConfidence::High);
    assert_eq!(from_recipe[0].matched_keyword.as_deref(), Some("rabat"));
}

#[tokio::test]
async fn rss_second_poll_uses_conditional_get() {
    let server = MockServer::start().await;

    // First poll: 200 with ETag. Second poll: the client must send
    // If-None-Match and accept the 304.
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .and(wiremock::matchers::header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss_body("https://ex.com/rabat-artikel"))
                .insert_header("ETag", "\"v1\""),
        )
        .mount(&server)
        .await;

    let recipes = vec![mediascout_scraper::types::SourceRecipe {
        domain: "ex.com".to_string(),
        rss_urls: vec![format!("{}/feed.xml", server.uri())],
        discovery_type: Some(mediascout_scraper::types::DiscoveryType::Rss),
        ..Default::default()
    }];

    let provider = RssProvider::with_search_base(&format!("{}/rss/search", server.uri()));
    let client = http();
    let gov = governor();
    let from = Utc::now() - Duration::days(1);

    let first = provider
        .scrape(&client, &gov, &recipes, &kw(&["rabat"]), from, "run-1", "da", "dk")
        .await
        .expect("first poll succeeds");
    let second = provider
        .scrape(&client, &gov, &recipes, &kw(&["rabat"]), from, "run-2", "da", "dk")
        .await
        .expect("second poll succeeds");

    let first_recipe_hits = first.iter().filter(|c| c.url.contains("rabat-artikel")).count();
    let second_recipe_hits = second.iter().filter(|c| c.url.contains("rabat-artikel")).count();
    assert_eq!(first_recipe_hits, 1);
    assert_eq!(second_recipe_hits, 0, "unchanged feed must yield nothing");
}

// ---------------------------------------------------------------------------
// Orchestrator: isolation + cross-provider dedup
// ---------------------------------------------------------------------------

fn orchestrator_config(
    gnews: Option<GnewsConfig>,
    serpapi: Option<SerpApiConfig>,
) -> OrchestratorConfig {
    OrchestratorConfig {
        max_keywords_per_run: 50,
        max_total_urls_per_run: 200,
        fuzzy_dedup_enabled: true,
        fuzzy_dedup_threshold: 92,
        fuzzy_dedup_day_window: 2,
        gnews,
        serpapi,
        rss_enabled: false,
        configurable: None,
        search_lang: "da".to_string(),
        search_region: "dk".to_string(),
        allowed_languages: Vec::new(),
    }
}

fn context() -> ScrapeContext {
    ScrapeContext {
        http: Arc::new(http()),
        governor: Arc::new(governor()),
        rss: Arc::new(RssProvider::new()),
        relevance: None,
    }
}

#[tokio::test]
async fn exact_duplicate_across_providers_is_removed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
            "articles": [{
                "title": "Store rabat hos Netto",
                "url": "https://ex.com/a?utm_source=foo",
                "publishedAt": recent_iso(),
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
            "news_results": [{
                "title": "Store rabat hos Netto",
                "link": "https://ex.com/a",
            }]
        })))
        .mount(&server)
        .await;

    let candidates = fetch_all_mentions(
        &context(),
        &orchestrator_config(Some(gnews_config(&server)), Some(serpapi_config(&server))),
        &[],
        &kw(&["rabat"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await;

    assert_eq!(candidates.len(), 1, "expected exactly one surviving candidate");
    assert_eq!(
        mediascout_scraper::text::normalize_url(&candidates[0].url),
        "https://ex.com/a"
    );
}

#[tokio::test]
async fn one_failing_provider_does_not_affect_the_other() {
    let server = MockServer::start().await;

    // GNews-style endpoint consistently 502s; SerpAPI-style works.
    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
            "news_results": [
                { "title": "One", "link": "https://ex.com/one" },
                { "title": "Two", "link": "https://ex.com/two" },
                { "title": "Three", "link": "https://ex.com/three" },
            ]
        })))
        .mount(&server)
        .await;

    let candidates = fetch_all_mentions(
        &context(),
        &orchestrator_config(Some(gnews_config(&server)), Some(serpapi_config(&server))),
        &[],
        &kw(&["rabat"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await;

    assert_eq!(candidates.len(), 3, "the healthy provider's results must survive");
}

#[tokio::test]
async fn url_budget_truncates_candidates() {
    let server = MockServer::start().await;

    let articles: Vec<_> = (0..30)
        .map(|i| {
            json!({
                "title": format!("Distinct story number {i} entirely"),
                "url": format!("https://ex{i}.com/story-{i}"),
                "publishedAt": recent_iso(),
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({ "articles": articles })))
        .mount(&server)
        .await;

    let mut config = orchestrator_config(Some(gnews_config(&server)), None);
    config.max_total_urls_per_run = 10;

    let candidates = fetch_all_mentions(
        &context(),
        &config,
        &[],
        &kw(&["story"]),
        Utc::now() - Duration::days(1),
        "test-run",
    )
    .await;

    assert_eq!(candidates.len(), 10);
}

//! Configurable HTML provider.
//!
//! Works any site that has a recipe: discovers candidate article URLs
//! (site search, sitemap, or feed, per the recipe's discovery type),
//! filters them through an article-URL heuristic, and runs each survivor
//! through the extraction chain under per-domain concurrency limits and
//! the blind-domain circuit breaker. A candidate is kept only when a
//! keyword matches its title or extracted content on a word boundary.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tokio::sync::Semaphore;
use url::Url;

use crate::dates::{parse_date, passes_cutoff};
use crate::domain::{domain_candidates, etld_plus_one, is_same_or_subdomain, normalize_host};
use crate::error::ScrapeError;
use crate::extract::extract;
use crate::http::{HttpClient, RequestProfile};
use crate::metrics::{observe_extraction, observe_guardrail_event};
use crate::rate::RateGovernor;
use crate::text::{compile_keyword_patterns, keyword_match_score, normalize_url, KeywordPattern};
use crate::types::{DiscoveryType, RawCandidate, SourceRecipe};

pub const PROVIDER: &str = "configurable";

const PER_DOMAIN_EXTRACTION_CONCURRENCY: usize = 3;
/// Keyword-term matches needed for a confident keep.
const PRIMARY_MIN_KEYWORD_MATCHES: usize = 2;
/// Relaxed floor used only when nothing clears the primary bar.
const FALLBACK_MIN_KEYWORD_MATCHES: usize = 1;
/// Child sitemaps fetched from one sitemap index.
const MAX_CHILD_SITEMAPS: usize = 3;

#[derive(Debug, Clone)]
pub struct ConfigurableConfig {
    /// URL cap per source domain.
    pub max_articles_per_source: usize,
    /// Global extraction budget for one provider pass.
    pub max_total_urls: usize,
}

impl Default for ConfigurableConfig {
    fn default() -> Self {
        Self {
            max_articles_per_source: 10,
            max_total_urls: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// Article-URL heuristic
// ---------------------------------------------------------------------------

const NON_ARTICLE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".pdf", ".xml", ".rss", ".mp3", ".mp4",
    ".mov", ".avi", ".zip", ".css", ".js", ".json",
];

const NON_ARTICLE_SEGMENTS: &[&str] = &[
    "tag", "tags", "category", "categories", "topics", "live", "services", "service", "contact",
    "about", "faq", "newsletter", "newsletters", "subscribe", "subscription", "privacy",
    "cookies", "video", "podcast", "gallery", "account", "login", "search",
];

fn date_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/20\d{2}/\d{2}/\d{2}/").expect("valid date path regex"))
}

fn article_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:article|art)\d{5,}|/\d{6,}(?:[./-]|$)").expect("valid id regex")
    })
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[a-z0-9]+(?:-[a-z0-9]+){2,}$").expect("valid slug regex")
    })
}

fn is_likely_article_slug(segment: &str) -> bool {
    segment.len() >= 20 && slug_pattern().is_match(segment)
}

/// Heuristic filter for discovered links: keep only URLs that look like
/// article pages on the source's own domain.
#[must_use]
pub fn is_candidate_article_url(url: &str, source_domain: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    if !is_same_or_subdomain(host, source_domain) {
        return false;
    }

    let path = parsed.path().trim_end_matches('/').to_lowercase();
    if path.is_empty() {
        return false;
    }
    if NON_ARTICLE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return false;
    }

    let padded = format!("{path}/");
    let has_date_path = date_path_pattern().is_match(&padded);
    let has_article_id = article_id_pattern().is_match(&path);
    let has_slug_signal = segments.iter().any(|s| is_likely_article_slug(s));
    if !(has_date_path || has_article_id || has_slug_signal) {
        return false;
    }

    // Section-like segments disqualify slug-only signals; a date or id in
    // the path overrides them.
    if segments.iter().any(|s| NON_ARTICLE_SEGMENTS.contains(s)) && !(has_date_path || has_article_id) {
        return false;
    }

    true
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

fn extract_links(html: &str, base_domain: &str) -> Vec<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("a[href]").expect("valid link selector");
    let base = Url::parse(&format!("https://{base_domain}/")).ok();

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| {
            !href.is_empty()
                && !href.starts_with('#')
                && !href.starts_with("mailto:")
                && !href.starts_with("javascript:")
        })
        .filter_map(|href| {
            Url::parse(href)
                .ok()
                .or_else(|| base.as_ref().and_then(|b| b.join(href).ok()))
        })
        .map(|url| url.to_string())
        .collect()
}

async fn discover_site_search(
    http: &HttpClient,
    governor: &RateGovernor,
    recipe: &SourceRecipe,
    keyword: &str,
    run_id: &str,
) -> BTreeSet<String> {
    let Some(pattern) = recipe.search_url_pattern.as_deref() else {
        return BTreeSet::new();
    };
    let encoded = utf8_percent_encode(keyword, NON_ALPHANUMERIC).to_string();
    let search_url = pattern.replace("{keyword}", &encoded);

    governor
        .throttle(RequestProfile::Html, &etld_plus_one(&recipe.domain))
        .await;

    let response = match http.get(&search_url, RequestProfile::Html, PROVIDER).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                run_id,
                domain = %recipe.domain,
                keyword,
                error = %e,
                "site search failed"
            );
            return BTreeSet::new();
        }
    };

    extract_links(&response.body, &recipe.domain)
        .into_iter()
        .filter(|url| is_candidate_article_url(url, &recipe.domain))
        .map(|url| normalize_url(&url))
        .collect()
}

async fn discover_rss(
    http: &HttpClient,
    governor: &RateGovernor,
    recipe: &SourceRecipe,
    from_date: DateTime<Utc>,
    run_id: &str,
) -> BTreeSet<String> {
    let mut urls = BTreeSet::new();

    for feed_url in &recipe.rss_urls {
        governor
            .throttle(RequestProfile::Rss, &etld_plus_one(feed_url))
            .await;

        let response = match http.get(feed_url, RequestProfile::Rss, PROVIDER).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(run_id, feed_url, error = %e, "discovery feed fetch failed");
                continue;
            }
        };

        let feed = match feed_rs::parser::parse(response.body.as_bytes()) {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(run_id, feed_url, error = %e, "discovery feed parse failed");
                continue;
            }
        };

        for entry in feed.entries {
            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };
            if let Some(published) = entry.published.or(entry.updated) {
                if published < from_date {
                    continue;
                }
            }
            let normalized = normalize_url(&link);
            if is_candidate_article_url(&normalized, &recipe.domain) {
                urls.insert(normalized);
            }
        }
    }

    urls
}

/// Parsed subset of one sitemap document.
#[derive(Debug, Default)]
struct SitemapDoc {
    /// `<loc>` + best available date for each `<url>` entry.
    urls: Vec<(String, Option<String>)>,
    /// Child sitemap locations when this is a `<sitemapindex>`.
    children: Vec<String>,
}

/// Event-parse a sitemap or sitemap index. Tolerates unknown elements;
/// recognizes `news:publication_date` and `lastmod` as entry dates.
fn parse_sitemap(xml: &str) -> Result<SitemapDoc, ScrapeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = SitemapDoc::default();
    let mut in_sitemap_entry = false;
    let mut in_url_entry = false;
    let mut current_tag = String::new();
    let mut loc = String::new();
    let mut lastmod: Option<String> = None;
    let mut news_date: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "sitemap" => {
                        in_sitemap_entry = true;
                        loc.clear();
                    }
                    "url" => {
                        in_url_entry = true;
                        loc.clear();
                        lastmod = None;
                        news_date = None;
                    }
                    _ => current_tag = name,
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "sitemap" if in_sitemap_entry => {
                        in_sitemap_entry = false;
                        if !loc.is_empty() {
                            doc.children.push(loc.clone());
                        }
                    }
                    "url" if in_url_entry => {
                        in_url_entry = false;
                        if !loc.is_empty() {
                            doc.urls
                                .push((loc.clone(), news_date.take().or(lastmod.take())));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if in_sitemap_entry || in_url_entry {
                    let text = e.unescape().unwrap_or_default().into_owned();
                    match current_tag.as_str() {
                        "loc" => loc = text.trim().to_string(),
                        "lastmod" => lastmod = Some(text.trim().to_string()),
                        "publication_date" => news_date = Some(text.trim().to_string()),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ScrapeError::Parse {
                    context: "sitemap".to_string(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }

    Ok(doc)
}

fn sitemap_urls_within_window(
    doc: &SitemapDoc,
    domain: &str,
    from_date: DateTime<Utc>,
) -> BTreeSet<String> {
    doc.urls
        .iter()
        .filter(|(_, date_raw)| {
            // Entries with a parseable date older than the window are
            // skipped at discovery time; undated entries pass through.
            date_raw
                .as_deref()
                .and_then(parse_date)
                .is_none_or(|d| d >= from_date)
        })
        .map(|(loc, _)| normalize_url(loc))
        .filter(|url| is_candidate_article_url(url, domain))
        .collect()
}

async fn discover_sitemap(
    http: &HttpClient,
    governor: &RateGovernor,
    recipe: &SourceRecipe,
    from_date: DateTime<Utc>,
    run_id: &str,
) -> BTreeSet<String> {
    let Some(sitemap_url) = recipe.sitemap_url.as_deref() else {
        return BTreeSet::new();
    };

    let mut urls = BTreeSet::new();
    let mut to_fetch = vec![sitemap_url.to_string()];
    let mut fetched = 0usize;

    while let Some(url) = to_fetch.pop() {
        if fetched > MAX_CHILD_SITEMAPS {
            break;
        }
        fetched += 1;

        governor
            .throttle(RequestProfile::Html, &etld_plus_one(&url))
            .await;

        let response = match http.get(&url, RequestProfile::Html, PROVIDER).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(run_id, sitemap = url, error = %e, "sitemap fetch failed");
                continue;
            }
        };

        let doc = match parse_sitemap(&response.body) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(run_id, sitemap = url, error = %e, "sitemap parse failed");
                continue;
            }
        };

        if !doc.children.is_empty() {
            // Index document: prioritise news sitemaps, cap the fan-out.
            let (mut news, mut other): (Vec<String>, Vec<String>) = doc
                .children
                .into_iter()
                .partition(|child| child.to_lowercase().contains("news"));
            news.append(&mut other);
            news.truncate(MAX_CHILD_SITEMAPS);
            // Depth stays at one level: children replace the queue.
            to_fetch = news;
            continue;
        }

        urls.extend(sitemap_urls_within_window(&doc, &recipe.domain, from_date));
    }

    urls
}

// ---------------------------------------------------------------------------
// Provider entry point
// ---------------------------------------------------------------------------

/// Run discovery + extraction across all discoverable recipes.
///
/// # Errors
///
/// Infallible in practice — failures are contained per URL/domain; the
/// signature matches the provider contract.
#[allow(clippy::too_many_arguments)]
pub async fn scrape_configurable(
    http: &HttpClient,
    governor: &RateGovernor,
    recipes: &[SourceRecipe],
    keywords: &[String],
    from_date: DateTime<Utc>,
    run_id: &str,
    config: &ConfigurableConfig,
) -> Result<Vec<RawCandidate>, ScrapeError> {
    let discoverable: Vec<&SourceRecipe> =
        recipes.iter().filter(|r| r.is_discoverable()).collect();
    if discoverable.is_empty() || keywords.is_empty() {
        tracing::debug!(run_id, "no discoverable recipes or keywords");
        return Ok(Vec::new());
    }

    let patterns = compile_keyword_patterns(keywords);
    let recipe_by_domain: HashMap<String, &SourceRecipe> = recipes
        .iter()
        .map(|r| (normalize_host(&r.domain), r))
        .collect();

    // ---- discovery ----------------------------------------------------
    let mut discovered: HashMap<String, BTreeSet<String>> = HashMap::new();
    for recipe in &discoverable {
        let domain = normalize_host(&recipe.domain);
        let urls = match recipe.discovery_type.unwrap_or(DiscoveryType::SiteSearch) {
            DiscoveryType::SiteSearch => {
                let mut urls = BTreeSet::new();
                for keyword in keywords {
                    urls.extend(
                        discover_site_search(http, governor, recipe, keyword, run_id).await,
                    );
                }
                urls
            }
            DiscoveryType::Rss => discover_rss(http, governor, recipe, from_date, run_id).await,
            DiscoveryType::Sitemap => {
                discover_sitemap(http, governor, recipe, from_date, run_id).await
            }
        };
        if !urls.is_empty() {
            tracing::debug!(run_id, domain = %domain, count = urls.len(), "discovered urls");
            discovered.entry(domain).or_default().extend(urls);
        }
    }

    // ---- extraction queue under per-source and global budgets ---------
    let mut queue: Vec<(String, String)> = Vec::new();
    let mut skipped_budget = 0usize;
    for (domain, urls) in &discovered {
        for url in urls.iter().take(config.max_articles_per_source) {
            if queue.len() >= config.max_total_urls {
                skipped_budget += 1;
                continue;
            }
            queue.push((domain.clone(), url.clone()));
        }
    }
    if skipped_budget > 0 {
        tracing::warn!(
            run_id,
            skipped = skipped_budget,
            budget = config.max_total_urls,
            "extraction budget exhausted, skipping urls"
        );
        observe_guardrail_event("max_total_urls_per_run", PROVIDER, "skip", skipped_budget);
    }

    // ---- extraction ----------------------------------------------------
    let domain_permits: Mutex<HashMap<String, Arc<Semaphore>>> = Mutex::new(HashMap::new());
    let global_permits = governor.permits(RequestProfile::Html);

    let tasks = queue.iter().map(|(domain, url)| {
        let patterns = &patterns;
        let recipe_by_domain = &recipe_by_domain;
        let domain_permits = &domain_permits;
        let global_permits = Arc::clone(&global_permits);

        async move {
            let etld1 = etld_plus_one(url);

            if governor.check_circuit(&etld1).is_err() {
                tracing::debug!(run_id, url, domain = %etld1, "skipping url, circuit open");
                observe_extraction(&etld1, "circuit_open_skip", 0);
                return None;
            }

            let domain_permit = {
                let mut permits = domain_permits.lock().expect("permit map poisoned");
                Arc::clone(permits.entry(domain.clone()).or_insert_with(|| {
                    Arc::new(Semaphore::new(PER_DOMAIN_EXTRACTION_CONCURRENCY))
                }))
            };
            let _domain_guard = domain_permit.acquire().await.ok()?;
            let _global_guard = global_permits.acquire().await.ok()?;

            governor.throttle(RequestProfile::Html, &etld1).await;

            extract_single_article(
                http,
                governor,
                url,
                &etld1,
                recipe_by_domain,
                patterns,
                from_date,
                run_id,
            )
            .await
        }
    });

    let results = futures::future::join_all(tasks).await;
    let extracted: Vec<(RawCandidate, usize)> = results.into_iter().flatten().collect();

    // ---- keyword-strength gate -----------------------------------------
    let strong: Vec<&(RawCandidate, usize)> = extracted
        .iter()
        .filter(|(_, matches)| *matches >= PRIMARY_MIN_KEYWORD_MATCHES)
        .collect();

    let candidates: Vec<RawCandidate> = if strong.is_empty() {
        let fallback: Vec<RawCandidate> = extracted
            .iter()
            .filter(|(_, matches)| *matches >= FALLBACK_MIN_KEYWORD_MATCHES)
            .map(|(candidate, _)| candidate.clone())
            .collect();
        if !fallback.is_empty() {
            tracing::warn!(
                run_id,
                count = fallback.len(),
                "no strong keyword matches; keeping partial matches"
            );
        }
        fallback
    } else {
        strong.into_iter().map(|(candidate, _)| candidate.clone()).collect()
    };

    tracing::info!(run_id, count = candidates.len(), "configurable provider finished");
    Ok(candidates)
}

/// Fetch and extract one article URL. Returns the candidate and its
/// keyword-term match count, or `None` when anything disqualifies it.
#[allow(clippy::too_many_arguments)]
async fn extract_single_article(
    http: &HttpClient,
    governor: &RateGovernor,
    url: &str,
    etld1: &str,
    recipe_by_domain: &HashMap<String, &SourceRecipe>,
    patterns: &[KeywordPattern],
    from_date: DateTime<Utc>,
    run_id: &str,
) -> Option<(RawCandidate, usize)> {
    let response = match http.get(url, RequestProfile::Html, PROVIDER).await {
        Ok(response) => response,
        Err(ScrapeError::Http { status: 402, .. }) => {
            tracing::debug!(run_id, url, "paywall blocked (402)");
            observe_extraction(etld1, "paywall", 0);
            return None;
        }
        Err(e) => {
            observe_extraction(etld1, "http_error", 0);
            governor.record_failure(etld1);
            tracing::warn!(run_id, url, error = %e, "article fetch failed");
            return None;
        }
    };

    let final_url = normalize_url(&response.final_url);
    let recipe = lookup_recipe(recipe_by_domain, &final_url);

    let extracted = match extract(&response.body, recipe, &final_url) {
        Ok(extracted) => extracted,
        Err(_) => {
            governor.record_failure(etld1);
            observe_extraction(etld1, "empty_content", 0);
            tracing::debug!(run_id, url = %final_url, "extraction produced no usable content");
            return None;
        }
    };

    governor.record_success(etld1);
    observe_extraction(etld1, "success", extracted.content.chars().count());
    tracing::debug!(
        run_id,
        url = %final_url,
        strategy = extracted.strategy.as_str(),
        score = extracted.quality_score,
        "article extracted"
    );

    let haystack = format!("{} {}", extracted.title, extracted.content);
    let matches = keyword_match_score(patterns, &haystack);
    if matches == 0 {
        tracing::debug!(run_id, url = %final_url, "no keyword match in extracted article");
        return None;
    }
    let matched_keyword = patterns
        .iter()
        .max_by_key(|p| p.matched_terms(&haystack))
        .map(|p| p.keyword.clone());

    if !passes_cutoff(
        extracted.published_at,
        extracted.date_confidence,
        false,
        from_date,
    ) {
        tracing::debug!(run_id, url = %final_url, "article older than run window");
        return None;
    }

    let source_name = recipe
        .map(|r| normalize_host(&r.domain))
        .unwrap_or_else(|| normalize_host(&final_url));

    let candidate = RawCandidate {
        title: extracted.title,
        teaser: extracted.teaser,
        url: final_url,
        published_at: extracted.published_at,
        date_confidence: extracted.date_confidence,
        source_name,
        provider: PROVIDER,
        matched_keyword,
    };
    Some((candidate, matches))
}

/// Recipe lookup with subdomain fallback: most specific domain first.
fn lookup_recipe<'a>(
    recipes: &'a HashMap<String, &'a SourceRecipe>,
    url: &str,
) -> Option<&'a SourceRecipe> {
    domain_candidates(url)
        .into_iter()
        .find_map(|candidate| recipes.get(&candidate).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- article URL heuristic ------------------------------------------

    #[test]
    fn accepts_dated_paths() {
        assert!(is_candidate_article_url(
            "https://example.com/2024/05/01/some-story",
            "example.com"
        ));
    }

    #[test]
    fn accepts_article_ids() {
        assert!(is_candidate_article_url(
            "https://example.com/indland/art7654321/overskrift",
            "example.com"
        ));
        assert!(is_candidate_article_url(
            "https://example.com/nyheder/123456789",
            "example.com"
        ));
    }

    #[test]
    fn accepts_long_hyphenated_slugs() {
        assert!(is_candidate_article_url(
            "https://example.com/news/minister-resigns-after-long-running-scandal",
            "example.com"
        ));
    }

    #[test]
    fn rejects_short_section_paths() {
        assert!(!is_candidate_article_url("https://example.com/sport", "example.com"));
        assert!(!is_candidate_article_url("https://example.com/", "example.com"));
    }

    #[test]
    fn rejects_foreign_domains() {
        assert!(!is_candidate_article_url(
            "https://other.com/2024/05/01/some-story",
            "example.com"
        ));
    }

    #[test]
    fn rejects_asset_extensions() {
        assert!(!is_candidate_article_url(
            "https://example.com/2024/05/01/photo.jpg",
            "example.com"
        ));
    }

    #[test]
    fn rejects_section_segments_without_hard_signals() {
        assert!(!is_candidate_article_url(
            "https://example.com/tag/breaking-news-latest-updates-today",
            "example.com"
        ));
        // A dated path overrides the section blacklist.
        assert!(is_candidate_article_url(
            "https://example.com/tag/2024/05/01/story-title",
            "example.com"
        ));
    }

    #[test]
    fn subdomains_of_the_source_are_accepted() {
        assert!(is_candidate_article_url(
            "https://nyheder.example.com/2024/05/01/story",
            "example.com"
        ));
    }

    // -- link extraction -------------------------------------------------

    #[test]
    fn extract_links_resolves_relative_hrefs() {
        let html = r##"<a href="/2024/05/01/story">x</a>
                      <a href="https://example.com/abs">y</a>
                      <a href="#frag">n</a>
                      <a href="mailto:a@b.c">n</a>"##;
        let links = extract_links(html, "example.com");
        assert!(links.contains(&"https://example.com/2024/05/01/story".to_string()));
        assert!(links.contains(&"https://example.com/abs".to_string()));
        assert_eq!(links.len(), 2);
    }

    // -- sitemap parsing --------------------------------------------------

    #[test]
    fn parses_urlset_with_news_dates() {
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
                    xmlns:news="http://www.google.com/schemas/sitemap-news/0.9">
              <url>
                <loc>https://example.com/2024/05/01/story-one</loc>
                <news:news>
                  <news:publication_date>2024-05-01T10:00:00Z</news:publication_date>
                </news:news>
              </url>
              <url>
                <loc>https://example.com/2024/04/01/story-two</loc>
                <lastmod>2024-04-01</lastmod>
              </url>
            </urlset>"#;
        let doc = parse_sitemap(xml).expect("should parse");
        assert_eq!(doc.urls.len(), 2);
        assert!(doc.children.is_empty());
        assert_eq!(doc.urls[0].1.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn parses_sitemap_index_children() {
        let xml = r#"<?xml version="1.0"?>
            <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://example.com/sitemap-news.xml</loc></sitemap>
              <sitemap><loc>https://example.com/sitemap-archive.xml</loc></sitemap>
            </sitemapindex>"#;
        let doc = parse_sitemap(xml).expect("should parse");
        assert!(doc.urls.is_empty());
        assert_eq!(doc.children.len(), 2);
    }

    #[test]
    fn window_filter_drops_old_dated_entries() {
        let doc = SitemapDoc {
            urls: vec![
                (
                    "https://example.com/2024/05/01/fresh-story".to_string(),
                    Some("2024-05-01T10:00:00Z".to_string()),
                ),
                (
                    "https://example.com/2024/01/01/stale-story".to_string(),
                    Some("2024-01-01T10:00:00Z".to_string()),
                ),
                ("https://example.com/2024/05/02/undated-story".to_string(), None),
            ],
            children: Vec::new(),
        };
        let from = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2024, 4, 1, 0, 0, 0).unwrap();
        let urls = sitemap_urls_within_window(&doc, "example.com", from);
        assert_eq!(urls.len(), 2);
        assert!(!urls.iter().any(|u| u.contains("stale")));
    }

    // -- recipe lookup ----------------------------------------------------

    #[test]
    fn recipe_lookup_walks_subdomains() {
        let recipe = SourceRecipe {
            domain: "example.com".to_string(),
            ..Default::default()
        };
        let mut map: HashMap<String, &SourceRecipe> = HashMap::new();
        map.insert("example.com".to_string(), &recipe);

        assert!(lookup_recipe(&map, "https://nyheder.example.com/a/b").is_some());
        assert!(lookup_recipe(&map, "https://other.com/a").is_none());
    }
}

//! Source recipe analyzer.
//!
//! Derives a domain's extraction recipe from a sample article: probes
//! the bundled generic selectors against the article page, scans the
//! homepage for a search form or search link, and verifies the derived
//! search pattern with a live test query. The caller persists the
//! resulting suggestion (upsert by domain, idempotent).

use scraper::{Html, Selector};
use url::Url;

use crate::domain::normalize_host;
use crate::error::ScrapeError;
use crate::http::{HttpClient, RequestProfile};
use crate::providers::configurable::is_candidate_article_url;
use crate::selectors::{
    GENERIC_CONTENT_SELECTORS, GENERIC_DATE_SELECTORS, GENERIC_TITLE_SELECTORS,
};

const PROVIDER: &str = "analyzer";
/// Minimum text a probed content selector must yield.
const MIN_CONTENT_CHARS: usize = 80;
/// Minimum text for a probed title selector.
const MIN_TITLE_CHARS: usize = 5;

/// Confidence in a derived recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisConfidence {
    Low,
    Medium,
    High,
}

impl AnalysisConfidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisConfidence::Low => "low",
            AnalysisConfidence::Medium => "medium",
            AnalysisConfidence::High => "high",
        }
    }
}

/// A derived recipe suggestion for one domain.
#[derive(Debug, Clone)]
pub struct RecipeSuggestion {
    pub domain: String,
    pub title_selector: Option<String>,
    pub content_selector: Option<String>,
    pub date_selector: Option<String>,
    pub search_url_pattern: Option<String>,
    pub confidence: AnalysisConfidence,
}

/// Analyze a sample article URL and derive a recipe for its domain.
///
/// # Errors
///
/// Returns [`ScrapeError`] when the article page itself cannot be
/// fetched; homepage and verification failures degrade the confidence
/// instead of failing the analysis.
pub async fn analyze_source(
    http: &HttpClient,
    article_url: &str,
) -> Result<RecipeSuggestion, ScrapeError> {
    let domain = normalize_host(article_url);
    let parsed = Url::parse(article_url).map_err(|e| ScrapeError::Parse {
        context: format!("analyzer url {article_url}"),
        reason: e.to_string(),
    })?;
    let root_url = format!(
        "{}://{}/",
        parsed.scheme(),
        parsed.host_str().unwrap_or(&domain)
    );

    let article = http.get(article_url, RequestProfile::Html, PROVIDER).await?;
    let (title_selector, content_selector, date_selector) = probe_selectors(&article.body);

    // Homepage scan is best-effort: a missing pattern only lowers
    // confidence.
    let search_url_pattern = match http.get(&root_url, RequestProfile::Html, PROVIDER).await {
        Ok(homepage) => {
            let pattern = derive_search_pattern(&homepage.body, &root_url);
            match pattern {
                Some(pattern) if verify_search_pattern(http, &pattern, &domain).await => {
                    Some(pattern)
                }
                Some(_) | None => None,
            }
        }
        Err(e) => {
            tracing::warn!(domain = %domain, error = %e, "homepage fetch failed during analysis");
            None
        }
    };

    let found = [&title_selector, &content_selector, &date_selector]
        .iter()
        .filter(|s| s.is_some())
        .count();
    let confidence = match (found, &search_url_pattern) {
        (3, Some(_)) => AnalysisConfidence::High,
        (3, None) | (2, Some(_)) => AnalysisConfidence::Medium,
        _ => AnalysisConfidence::Low,
    };

    Ok(RecipeSuggestion {
        domain,
        title_selector,
        content_selector,
        date_selector,
        search_url_pattern,
        confidence,
    })
}

/// Probe the generic selector lists against an article page and keep the
/// first selector of each kind that yields meaningful text.
fn probe_selectors(html: &str) -> (Option<String>, Option<String>, Option<String>) {
    let document = Html::parse_document(html);

    let title = first_yielding(&document, GENERIC_TITLE_SELECTORS, MIN_TITLE_CHARS);
    let content = first_yielding(&document, GENERIC_CONTENT_SELECTORS, MIN_CONTENT_CHARS);
    let date = GENERIC_DATE_SELECTORS.iter().find_map(|selector| {
        let parsed = Selector::parse(selector).ok()?;
        let element = document.select(&parsed).next()?;
        let has_value = element
            .value()
            .attr("datetime")
            .or_else(|| element.value().attr("content"))
            .map(str::trim)
            .is_some_and(|v| !v.is_empty())
            || !element.text().collect::<String>().trim().is_empty();
        has_value.then(|| (*selector).to_string())
    });

    (title, content, date)
}

fn first_yielding(document: &Html, selectors: &[&str], min_chars: usize) -> Option<String> {
    selectors.iter().find_map(|selector| {
        let parsed = Selector::parse(selector).ok()?;
        let element = document.select(&parsed).next()?;
        let text: String = element.text().collect::<String>();
        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (cleaned.chars().count() >= min_chars).then(|| (*selector).to_string())
    })
}

/// Find a search entry point on the homepage: a GET form with a
/// query-named text input, or a link whose URL carries a query token.
fn derive_search_pattern(html: &str, root_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(root_url).ok()?;

    let form_selector = Selector::parse("form").ok()?;
    let input_selector = Selector::parse("input").ok()?;
    for form in document.select(&form_selector) {
        let method = form.value().attr("method").unwrap_or("get");
        if !method.eq_ignore_ascii_case("get") {
            continue;
        }
        let action = form.value().attr("action").unwrap_or("");
        for input in form.select(&input_selector) {
            let input_type = input.value().attr("type").unwrap_or("text");
            if !matches!(input_type, "text" | "search") {
                continue;
            }
            let Some(name) = input.value().attr("name") else {
                continue;
            };
            if !matches!(name, "q" | "s" | "query" | "search" | "keyword") {
                continue;
            }
            let action_url = base.join(action).ok()?;
            return Some(format!("{action_url}?{name}={{keyword}}"));
        }
    }

    // Fallback: an existing search link reveals the pattern directly.
    let link_selector = Selector::parse("a[href]").ok()?;
    for link in document.select(&link_selector) {
        let href = link.value().attr("href")?;
        let resolved = base.join(href).ok()?;
        let query_key = resolved
            .query_pairs()
            .map(|(k, _)| k.into_owned())
            .find(|k| matches!(k.as_str(), "q" | "s" | "query" | "search"));
        if let Some(key) = query_key {
            if resolved.path().to_lowercase().contains("search")
                || resolved.host_str() == base.host_str()
            {
                let mut pattern = resolved.clone();
                pattern.set_query(None);
                return Some(format!("{pattern}?{key}={{keyword}}"));
            }
        }
    }

    None
}

/// Verify a derived pattern with a live probe: the result page must load
/// and contain at least one article-like link (rejects soft-404s).
async fn verify_search_pattern(http: &HttpClient, pattern: &str, domain: &str) -> bool {
    let probe_url = pattern.replace("{keyword}", "news");
    let Ok(response) = http.get(&probe_url, RequestProfile::Html, PROVIDER).await else {
        return false;
    };

    let document = Html::parse_document(&response.body);
    let Ok(selector) = Selector::parse("a[href]") else {
        return false;
    };
    let base = Url::parse(&format!("https://{domain}/")).ok();

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| {
            Url::parse(href)
                .ok()
                .or_else(|| base.as_ref().and_then(|b| b.join(href).ok()))
        })
        .any(|url| is_candidate_article_url(url.as_str(), domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<html><head><title>T</title></head><body>
        <article>
          <h1 class="article-title">A headline with some length</h1>
          <div class="article-body"><p>Body text that is comfortably longer than the
          eighty character minimum required for a content selector probe to accept it
          as meaningful article content.</p></div>
          <time datetime="2024-05-01T10:00:00Z">1 May</time>
        </article></body></html>"#;

    #[test]
    fn probe_finds_all_three_selectors() {
        let (title, content, date) = probe_selectors(ARTICLE);
        assert_eq!(title.as_deref(), Some("h1.article-title"));
        assert_eq!(content.as_deref(), Some("div.article-body"));
        assert_eq!(date.as_deref(), Some("time[datetime]"));
    }

    #[test]
    fn probe_returns_none_on_empty_page() {
        let (title, content, date) = probe_selectors("<html><body></body></html>");
        assert!(title.is_none());
        assert!(content.is_none());
        assert!(date.is_none());
    }

    #[test]
    fn search_pattern_derived_from_get_form() {
        let html = r#"<html><body>
            <form method="get" action="/search">
              <input type="search" name="q">
            </form></body></html>"#;
        let pattern = derive_search_pattern(html, "https://example.com/");
        assert_eq!(
            pattern.as_deref(),
            Some("https://example.com/search?q={keyword}")
        );
    }

    #[test]
    fn post_forms_are_ignored() {
        let html = r#"<html><body>
            <form method="post" action="/search">
              <input type="search" name="q">
            </form></body></html>"#;
        assert!(derive_search_pattern(html, "https://example.com/").is_none());
    }

    #[test]
    fn search_pattern_derived_from_search_link() {
        let html = r#"<html><body>
            <a href="/search?q=latest">Search</a>
            </body></html>"#;
        let pattern = derive_search_pattern(html, "https://example.com/");
        assert_eq!(
            pattern.as_deref(),
            Some("https://example.com/search?q={keyword}")
        );
    }
}

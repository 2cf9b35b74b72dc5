//! Provider fan-out and candidate post-processing.
//!
//! Runs all enabled providers in parallel with full error isolation,
//! enforces the keyword and URL budgets, applies both dedup stages plus
//! the optional language and relevance filters, and returns candidates
//! in presentation order.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::dedup::{dedup_exact_url, near_deduplicate};
use crate::http::HttpClient;
use crate::language::filter_by_language;
use crate::metrics::{
    observe_duplicates_removed, observe_guardrail_event, observe_provider_run,
};
use crate::providers::{
    scrape_configurable, scrape_gnews, scrape_serpapi, ConfigurableConfig, GnewsConfig,
    RssProvider, SerpApiConfig,
};
use crate::rate::RateGovernor;
use crate::relevance::RelevanceFilter;
use crate::text::clean_keywords;
use crate::types::{RawCandidate, SourceRecipe};

/// Everything the orchestrator needs beyond per-run inputs.
pub struct ScrapeContext {
    pub http: Arc<HttpClient>,
    pub governor: Arc<RateGovernor>,
    pub rss: Arc<RssProvider>,
    pub relevance: Option<Arc<RelevanceFilter>>,
}

/// Per-run orchestration settings, resolved by the caller from global
/// config + brand overrides.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_keywords_per_run: usize,
    pub max_total_urls_per_run: usize,
    pub fuzzy_dedup_enabled: bool,
    pub fuzzy_dedup_threshold: u32,
    pub fuzzy_dedup_day_window: i64,
    /// `None` disables the provider (toggle off or credential missing).
    pub gnews: Option<GnewsConfig>,
    pub serpapi: Option<SerpApiConfig>,
    pub rss_enabled: bool,
    pub configurable: Option<ConfigurableConfig>,
    pub search_lang: String,
    pub search_region: String,
    /// Effective language allow-list for this run; empty disables.
    pub allowed_languages: Vec<String>,
}

/// Clean the keyword list and enforce the per-run cap.
///
/// Returns the usable keywords and the number dropped by the cap.
fn prepare_keywords(keywords: &[String], cap: usize) -> (Vec<String>, usize) {
    let cleaned = clean_keywords(keywords);

    // Case-insensitive dedup, first occurrence wins.
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<String> = cleaned
        .into_iter()
        .filter(|kw| seen.insert(kw.to_lowercase()))
        .collect();

    let dropped = unique.len().saturating_sub(cap);
    unique.truncate(cap);
    (unique, dropped)
}

/// Final presentation order: newest first with dateless candidates last,
/// then higher date confidence, then title for stability.
fn sort_candidates(candidates: &mut [RawCandidate]) {
    candidates.sort_by(|a, b| {
        let date_ord = match (a.published_at, b.published_at) {
            (Some(left), Some(right)) => right.cmp(&left),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        date_ord
            .then_with(|| b.date_confidence.cmp(&a.date_confidence))
            .then_with(|| a.title.cmp(&b.title))
    });
}

fn settle(
    provider: &str,
    started: Instant,
    result: Result<Vec<RawCandidate>, crate::error::ScrapeError>,
    run_id: &str,
) -> Vec<RawCandidate> {
    let duration = started.elapsed().as_secs_f64();
    match result {
        Ok(candidates) => {
            observe_provider_run(provider, "success", duration);
            candidates
        }
        Err(e) => {
            tracing::error!(run_id, provider, error = %e, "provider failed");
            observe_provider_run(provider, "error", duration);
            Vec::new()
        }
    }
}

/// Fetch, deduplicate, filter, and order candidates for one run.
///
/// Provider failures are isolated: a provider that errors contributes
/// nothing but never fails the run.
pub async fn fetch_all_mentions(
    ctx: &ScrapeContext,
    config: &OrchestratorConfig,
    recipes: &[SourceRecipe],
    keywords: &[String],
    from_date: DateTime<Utc>,
    run_id: &str,
) -> Vec<RawCandidate> {
    let (keywords, dropped) = prepare_keywords(keywords, config.max_keywords_per_run);
    if dropped > 0 {
        tracing::warn!(
            run_id,
            dropped,
            cap = config.max_keywords_per_run,
            "keyword budget exceeded, truncating"
        );
        observe_guardrail_event("max_keywords_per_run", "orchestrator", "cap", dropped);
    }
    if keywords.is_empty() {
        tracing::warn!(run_id, "no usable keywords after cleaning");
        return Vec::new();
    }

    tracing::info!(run_id, keywords = keywords.len(), "starting provider fan-out");

    let gnews_task = async {
        match &config.gnews {
            Some(gnews_config) => {
                let started = Instant::now();
                let result = scrape_gnews(
                    &ctx.http,
                    &ctx.governor,
                    gnews_config,
                    &keywords,
                    from_date,
                    run_id,
                )
                .await;
                settle("gnews", started, result, run_id)
            }
            None => Vec::new(),
        }
    };

    let serpapi_task = async {
        match &config.serpapi {
            Some(serpapi_config) => {
                let started = Instant::now();
                let result = scrape_serpapi(
                    &ctx.http,
                    &ctx.governor,
                    serpapi_config,
                    &keywords,
                    from_date,
                    run_id,
                )
                .await;
                settle("serpapi", started, result, run_id)
            }
            None => Vec::new(),
        }
    };

    let rss_task = async {
        if config.rss_enabled {
            let started = Instant::now();
            let result = ctx
                .rss
                .scrape(
                    &ctx.http,
                    &ctx.governor,
                    recipes,
                    &keywords,
                    from_date,
                    run_id,
                    &config.search_lang,
                    &config.search_region,
                )
                .await;
            settle("rss", started, result, run_id)
        } else {
            Vec::new()
        }
    };

    let configurable_task = async {
        match &config.configurable {
            Some(configurable_config) => {
                let started = Instant::now();
                let result = scrape_configurable(
                    &ctx.http,
                    &ctx.governor,
                    recipes,
                    &keywords,
                    from_date,
                    run_id,
                    configurable_config,
                )
                .await;
                settle("configurable", started, result, run_id)
            }
            None => Vec::new(),
        }
    };

    let (gnews, serpapi, rss, configurable) =
        tokio::join!(gnews_task, serpapi_task, rss_task, configurable_task);

    let mut merged: Vec<RawCandidate> = Vec::new();
    for (provider, mut batch) in [
        ("gnews", gnews),
        ("serpapi", serpapi),
        ("rss", rss),
        ("configurable", configurable),
    ] {
        tracing::info!(run_id, provider, count = batch.len(), "provider results merged");
        merged.append(&mut batch);
    }

    // Global candidate budget before the expensive stages.
    if merged.len() > config.max_total_urls_per_run {
        let overflow = merged.len() - config.max_total_urls_per_run;
        merged.truncate(config.max_total_urls_per_run);
        tracing::warn!(
            run_id,
            overflow,
            cap = config.max_total_urls_per_run,
            "candidate budget exceeded, truncating"
        );
        observe_guardrail_event("max_total_urls_per_run", "orchestrator", "cap", overflow);
    }

    let (mut candidates, exact_removed) = dedup_exact_url(merged);
    observe_duplicates_removed("exact_url", exact_removed);

    if config.fuzzy_dedup_enabled {
        let (deduped, fuzzy_removed) = near_deduplicate(
            candidates,
            config.fuzzy_dedup_threshold,
            config.fuzzy_dedup_day_window,
        );
        candidates = deduped;
        observe_duplicates_removed("fuzzy", fuzzy_removed);
    }

    let (kept, language_removed) = filter_by_language(candidates, &config.allowed_languages);
    candidates = kept;
    if language_removed > 0 {
        tracing::info!(run_id, removed = language_removed, "language filter applied");
    }

    if let Some(relevance) = &ctx.relevance {
        let (kept, _) = relevance.filter(candidates, &keywords, run_id).await;
        candidates = kept;
    }

    sort_candidates(&mut candidates);

    tracing::info!(
        run_id,
        count = candidates.len(),
        exact_removed,
        "orchestrator finished"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DateConfidence;
    use chrono::TimeZone;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| (*s).to_string()).collect()
    }

    fn candidate(title: &str, published_day: Option<u32>, confidence: DateConfidence) -> RawCandidate {
        RawCandidate {
            title: title.to_string(),
            teaser: String::new(),
            url: format!("https://example.com/{}", title.replace(' ', "-")),
            published_at: published_day
                .map(|d| Utc.with_ymd_and_hms(2024, 5, d, 12, 0, 0).unwrap()),
            date_confidence: confidence,
            source_name: "example.com".to_string(),
            provider: "gnews",
            matched_keyword: None,
        }
    }

    #[test]
    fn prepare_keywords_cleans_and_dedupes() {
        let (keywords, dropped) =
            prepare_keywords(&kw(&["Lego", "lego", " ", "\"Netto\""]), 50);
        assert_eq!(keywords, vec!["Lego", "Netto"]);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn prepare_keywords_enforces_the_cap() {
        let many: Vec<String> = (0..60).map(|i| format!("keyword{i}")).collect();
        let (keywords, dropped) = prepare_keywords(&many, 50);
        assert_eq!(keywords.len(), 50);
        assert_eq!(dropped, 10);
    }

    #[test]
    fn sort_orders_newest_first_with_dateless_last() {
        let mut candidates = vec![
            candidate("b old", Some(1), DateConfidence::High),
            candidate("a dateless", None, DateConfidence::None),
            candidate("c new", Some(3), DateConfidence::High),
        ];
        sort_candidates(&mut candidates);
        assert_eq!(candidates[0].title, "c new");
        assert_eq!(candidates[1].title, "b old");
        assert_eq!(candidates[2].title, "a dateless");
    }

    #[test]
    fn sort_breaks_date_ties_on_confidence_then_title() {
        let mut candidates = vec![
            candidate("zeta", Some(2), DateConfidence::Medium),
            candidate("alpha", Some(2), DateConfidence::Medium),
            candidate("beta", Some(2), DateConfidence::High),
        ];
        sort_candidates(&mut candidates);
        assert_eq!(candidates[0].title, "beta");
        assert_eq!(candidates[1].title, "alpha");
        assert_eq!(candidates[2].title, "zeta");
    }
}

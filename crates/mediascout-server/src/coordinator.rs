//! Scrape-run coordinator.
//!
//! Owns the full lifecycle of one brand scrape: the DB-backed lock,
//! run-id allocation, query building, the orchestrator call, topic
//! scoring, platform caching, batch persistence, and the cleanup that
//! guarantees lock release on every exit path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use mediascout_core::AppConfig;
use mediascout_db::{
    BrandRow, DbError, KeywordRow, NewMention, NewMentionKeyword, SourceConfigRow, TopicRow,
};
use mediascout_scraper::dedup::{filter_against_historical, HistoricalMention};
use mediascout_scraper::metrics::{
    observe_duplicates_removed, observe_guardrail_event, observe_scrape_run,
};
use mediascout_scraper::orchestrator::{fetch_all_mentions, OrchestratorConfig, ScrapeContext};
use mediascout_scraper::providers::{ConfigurableConfig, GnewsConfig, RssProvider, SerpApiConfig};
use mediascout_scraper::rate::{RateConfig, RateGovernor};
use mediascout_scraper::text::normalize_url;
use mediascout_scraper::types::{DiscoveryType, RawCandidate, SourceRecipe};
use mediascout_scraper::{HttpClient, RelevanceFilter, ScrapeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Api,
    Schedule,
}

impl Trigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Api => "api",
            Trigger::Schedule => "schedule",
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("brand {0} not found")]
    BrandNotFound(i64),

    #[error("scrape already in progress for brand {brand_id}")]
    Locked {
        brand_id: i64,
        started_at: Option<DateTime<Utc>>,
    },

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}

/// A successfully acquired run: the brand lock is held until
/// [`Coordinator::complete_run`] finishes.
#[derive(Debug)]
pub struct RunStart {
    pub run_id: String,
    pub brand: BrandRow,
    pub started_at: DateTime<Utc>,
    pub trigger: Trigger,
}

/// Final outcome of one scrape run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub brand_id: i64,
    pub brand_name: String,
    /// `success`, `no_topics`, `no_keywords`, `no_mentions`, `timeout`, `error`.
    pub status: String,
    pub queries_used: Vec<String>,
    pub mentions_found: usize,
    pub mentions_saved: u64,
}

pub struct Coordinator {
    pool: PgPool,
    config: Arc<AppConfig>,
    ctx: ScrapeContext,
}

impl Coordinator {
    /// Build the coordinator with its process-wide scraping resources.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the HTTP clients cannot be constructed.
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> Result<Self, ScrapeError> {
        let scraping = &config.scraping;
        let governor = RateGovernor::new(RateConfig {
            html_rps: scraping.rate_html_rps,
            api_rps: scraping.rate_api_rps,
            rss_rps: scraping.rate_rss_rps,
            circuit_threshold: scraping.blind_domain_circuit_threshold,
        });
        let relevance = RelevanceFilter::from_config(
            scraping.relevance_api_key.as_deref(),
            &scraping.relevance_model,
        )
        .map(Arc::new);

        let ctx = ScrapeContext {
            http: Arc::new(HttpClient::new()?),
            governor: Arc::new(governor),
            rss: Arc::new(RssProvider::new()),
            relevance,
        };

        Ok(Self { pool, config, ctx })
    }

    #[must_use]
    pub fn http(&self) -> Arc<HttpClient> {
        Arc::clone(&self.ctx.http)
    }

    /// Acquire the brand lock and allocate a run id.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::BrandNotFound`] — unknown or deleted brand
    /// - [`CoordinatorError::Locked`] — another run holds a fresh lock
    /// - [`CoordinatorError::Store`] — the lock update itself failed
    pub async fn begin_run(
        &self,
        brand_id: i64,
        trigger: Trigger,
    ) -> Result<RunStart, CoordinatorError> {
        let brand = mediascout_db::get_brand(&self.pool, brand_id)
            .await?
            .ok_or(CoordinatorError::BrandNotFound(brand_id))?;

        let acquired = mediascout_db::try_acquire_scrape_lock(
            &self.pool,
            brand_id,
            self.config.scraping.lock_stale_minutes,
        )
        .await?;
        if !acquired {
            return Err(CoordinatorError::Locked {
                brand_id,
                started_at: brand.scrape_started_at,
            });
        }

        let run_id = new_run_id(brand_id);
        tracing::info!(
            run_id,
            brand_id,
            brand = %brand.name,
            trigger = trigger.as_str(),
            "scrape run started"
        );

        Ok(RunStart {
            run_id,
            brand,
            started_at: Utc::now(),
            trigger,
        })
    }

    /// Execute a begun run to completion and release the lock.
    ///
    /// Never fails: errors and the run budget produce an error-status
    /// summary, and the lock release runs on every path.
    pub async fn complete_run(&self, start: RunStart) -> RunSummary {
        let clock = Instant::now();
        let budget = Duration::from_secs(self.config.scraping.run_budget_secs);

        let summary = match tokio::time::timeout(budget, self.execute(&start)).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                tracing::error!(run_id = %start.run_id, error = %e, "scrape run failed");
                self.error_summary(&start, "error")
            }
            Err(_) => {
                tracing::warn!(
                    run_id = %start.run_id,
                    budget_secs = budget.as_secs(),
                    "run budget exceeded, aborting in-flight work"
                );
                observe_guardrail_event("run_budget", "coordinator", "timeout", 1);
                self.error_summary(&start, "timeout")
            }
        };

        // Cleanup runs on every exit path, including failure and timeout.
        if let Err(e) = mediascout_db::release_scrape_lock(&self.pool, start.brand.id).await {
            tracing::error!(
                run_id = %start.run_id,
                brand_id = start.brand.id,
                error = %e,
                "failed to release scrape lock"
            );
        }

        observe_scrape_run(&summary.status, clock.elapsed().as_secs_f64());
        tracing::info!(
            run_id = %summary.run_id,
            status = %summary.status,
            found = summary.mentions_found,
            saved = summary.mentions_saved,
            "scrape run finished"
        );
        summary
    }

    /// Full lifecycle: acquire, execute, release.
    ///
    /// # Errors
    ///
    /// Propagates [`CoordinatorError`] from [`Self::begin_run`]; once the
    /// lock is held the run always resolves to a summary.
    pub async fn run_scrape(
        &self,
        brand_id: i64,
        trigger: Trigger,
    ) -> Result<RunSummary, CoordinatorError> {
        let start = self.begin_run(brand_id, trigger).await?;
        Ok(self.complete_run(start).await)
    }

    fn error_summary(&self, start: &RunStart, status: &str) -> RunSummary {
        RunSummary {
            run_id: start.run_id.clone(),
            brand_id: start.brand.id,
            brand_name: start.brand.name.clone(),
            status: status.to_string(),
            queries_used: Vec::new(),
            mentions_found: 0,
            mentions_saved: 0,
        }
    }

    async fn execute(&self, start: &RunStart) -> Result<RunSummary, CoordinatorError> {
        let brand = &start.brand;
        let run_id = &start.run_id;
        let mut summary = self.error_summary(start, "success");

        let topics = mediascout_db::list_active_topics(&self.pool, brand.id).await?;
        if topics.is_empty() {
            tracing::info!(run_id, brand = %brand.name, "no active topics");
            mediascout_db::update_last_scraped(&self.pool, brand.id, start.started_at).await?;
            summary.status = "no_topics".to_string();
            return Ok(summary);
        }

        let topic_ids: Vec<i64> = topics.iter().map(|t| t.id).collect();
        let keywords = mediascout_db::list_keywords_for_topics(&self.pool, &topic_ids).await?;
        let keywords_by_topic = group_keywords(&keywords);

        let queries = build_queries(&topics, &keywords_by_topic, &brand.name);
        if queries.is_empty() {
            tracing::info!(run_id, brand = %brand.name, "no keywords configured");
            mediascout_db::update_last_scraped(&self.pool, brand.id, start.started_at).await?;
            summary.status = "no_keywords".to_string();
            return Ok(summary);
        }
        summary.queries_used = queries.clone();

        let from_date = brand.last_scraped_at.unwrap_or_else(|| {
            start.started_at - chrono::Duration::days(i64::from(brand.initial_lookback_days.max(1)))
        });

        let recipes: Vec<SourceRecipe> = mediascout_db::list_source_configs(&self.pool)
            .await?
            .into_iter()
            .map(to_recipe)
            .collect();

        let orchestrator_config = self.orchestrator_config(brand);
        let mut candidates = fetch_all_mentions(
            &self.ctx,
            &orchestrator_config,
            &recipes,
            &queries,
            from_date,
            run_id,
        )
        .await;
        summary.mentions_found = candidates.len();

        let scraping = &self.config.scraping;
        if scraping.historical_dedup_enabled && !candidates.is_empty() {
            let recent = mediascout_db::list_recent_mentions(
                &self.pool,
                brand.id,
                scraping.historical_dedup_days.max(1),
                scraping.historical_dedup_limit.max(1),
            )
            .await?;
            let historical: Vec<HistoricalMention> = recent
                .into_iter()
                .map(|m| HistoricalMention {
                    title: m.title,
                    teaser: m.teaser,
                    normalized_url: m.normalized_url,
                    published_at: m.published_at,
                })
                .collect();
            let (kept, removed) = filter_against_historical(
                candidates,
                &historical,
                scraping.fuzzy_dedup_threshold,
                scraping.fuzzy_dedup_day_window,
            );
            candidates = kept;
            observe_duplicates_removed("historical_fuzzy", removed);
            if removed > 0 {
                tracing::info!(run_id, removed, "historical near-dedup removed mentions");
            }
        }

        if candidates.is_empty() {
            mediascout_db::update_last_scraped(&self.pool, brand.id, start.started_at).await?;
            summary.status = "no_mentions".to_string();
            return Ok(summary);
        }

        summary.mentions_saved = self
            .persist_candidates(start, &topics, &keywords_by_topic, candidates)
            .await?;

        mediascout_db::update_last_scraped(&self.pool, brand.id, start.started_at).await?;
        Ok(summary)
    }

    /// Score candidates against topics and batch-persist the winners.
    async fn persist_candidates(
        &self,
        start: &RunStart,
        topics: &[TopicRow],
        keywords_by_topic: &HashMap<i64, Vec<KeywordRow>>,
        candidates: Vec<RawCandidate>,
    ) -> Result<u64, CoordinatorError> {
        let run_id = &start.run_id;

        // Platform cache: preload all rows, insert unknown hosts lazily.
        let mut platform_cache: HashMap<String, i64> =
            mediascout_db::list_platforms(&self.pool)
                .await?
                .into_iter()
                .map(|p| (p.name, p.id))
                .collect();

        let mut saved = 0u64;
        let mut keyword_links: Vec<NewMentionKeyword> = Vec::new();
        let mut dropped_unscored = 0usize;

        for candidate in candidates {
            let Some(scored) = best_topic_match(topics, keywords_by_topic, &candidate) else {
                dropped_unscored += 1;
                continue;
            };

            let platform_id = match platform_cache.get(&candidate.source_name) {
                Some(id) => *id,
                None => {
                    let id =
                        mediascout_db::get_or_create_platform(&self.pool, &candidate.source_name)
                            .await?;
                    platform_cache.insert(candidate.source_name.clone(), id);
                    id
                }
            };

            let mention = NewMention {
                brand_id: start.brand.id,
                topic_id: scored.topic_id,
                primary_keyword_id: scored.primary_keyword_id,
                platform_id,
                title: candidate.title.clone(),
                teaser: (!candidate.teaser.is_empty()).then(|| candidate.teaser.clone()),
                normalized_url: normalize_url(&candidate.url),
                raw_url: candidate.url.clone(),
                published_at: candidate.published_at,
                date_confidence: candidate.date_confidence.as_str().to_string(),
                scrape_run_id: run_id.clone(),
            };

            // Historical exact dedup at the store boundary: the unique
            // constraint makes the insert a silent no-op for known pairs.
            if let Some(mention_id) = mediascout_db::insert_mention(&self.pool, &mention).await? {
                saved += 1;
                for link in &scored.keyword_matches {
                    keyword_links.push(NewMentionKeyword {
                        mention_id,
                        keyword_id: link.keyword_id,
                        matched_in: link.matched_in.clone(),
                        score: link.score,
                    });
                }
            }
        }

        if dropped_unscored > 0 {
            tracing::info!(
                run_id,
                dropped = dropped_unscored,
                "candidates matched no topic and were dropped"
            );
        }

        if !keyword_links.is_empty() {
            mediascout_db::insert_mention_keywords(&self.pool, &keyword_links).await?;
        }

        Ok(saved)
    }

    fn orchestrator_config(&self, brand: &BrandRow) -> OrchestratorConfig {
        let scraping = &self.config.scraping;

        let allowed_languages = brand
            .allowed_languages
            .clone()
            .filter(|langs| !langs.is_empty())
            .unwrap_or_else(|| scraping.default_languages.clone());

        OrchestratorConfig {
            max_keywords_per_run: scraping.max_keywords_per_run,
            max_total_urls_per_run: scraping.max_total_urls_per_run,
            fuzzy_dedup_enabled: scraping.fuzzy_dedup_enabled,
            fuzzy_dedup_threshold: scraping.fuzzy_dedup_threshold,
            fuzzy_dedup_day_window: scraping.fuzzy_dedup_day_window,
            gnews: (scraping.provider_gnews_enabled)
                .then(|| scraping.gnews_api_key.clone())
                .flatten()
                .map(|key| GnewsConfig::new(key, scraping.search_lang.clone())),
            serpapi: (scraping.provider_serpapi_enabled)
                .then(|| scraping.serpapi_key.clone())
                .flatten()
                .map(|key| {
                    SerpApiConfig::new(
                        key,
                        scraping.search_lang.clone(),
                        scraping.search_region.clone(),
                    )
                }),
            rss_enabled: scraping.provider_rss_enabled,
            configurable: scraping.provider_configurable_enabled.then(|| {
                ConfigurableConfig {
                    max_total_urls: scraping.max_total_urls_per_run,
                    ..ConfigurableConfig::default()
                }
            }),
            search_lang: scraping.search_lang.clone(),
            search_region: scraping.search_region.clone(),
            allowed_languages,
        }
    }
}

// ---------------------------------------------------------------------------
// Run ids and query building
// ---------------------------------------------------------------------------

fn new_run_id(brand_id: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{brand_id}-{}", &suffix[..8])
}

fn group_keywords(keywords: &[KeywordRow]) -> HashMap<i64, Vec<KeywordRow>> {
    let mut grouped: HashMap<i64, Vec<KeywordRow>> = HashMap::new();
    for keyword in keywords {
        grouped.entry(keyword.topic_id).or_default().push(keyword.clone());
    }
    grouped
}

/// Build one provider query per (topic, keyword).
///
/// A topic's `query_template` substitutes `{brand}`, `{topic}`, and
/// `{keyword}`; without a template the query is `"{topic} {keyword}"`.
/// Duplicate queries across topics collapse to one.
fn build_queries(
    topics: &[TopicRow],
    keywords_by_topic: &HashMap<i64, Vec<KeywordRow>>,
    brand_name: &str,
) -> Vec<String> {
    let mut queries = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for topic in topics {
        let Some(keywords) = keywords_by_topic.get(&topic.id) else {
            continue;
        };
        for keyword in keywords {
            let query = match topic.query_template.as_deref() {
                Some(template) => template
                    .replace("{brand}", brand_name)
                    .replace("{topic}", &topic.name)
                    .replace("{keyword}", &keyword.text)
                    .trim()
                    .to_string(),
                None => format!("{} {}", topic.name, keyword.text).trim().to_string(),
            };
            if !query.is_empty() && seen.insert(query.to_lowercase()) {
                queries.push(query);
            }
        }
    }
    queries
}

// ---------------------------------------------------------------------------
// Topic scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct KeywordMatch {
    keyword_id: i64,
    matched_in: String,
    score: i32,
    keyword_len: usize,
}

#[derive(Debug)]
struct TopicMatch {
    topic_id: i64,
    primary_keyword_id: Option<i64>,
    keyword_matches: Vec<KeywordMatch>,
}

fn phrase_pattern(keyword: &str) -> Option<Regex> {
    let trimmed = keyword.trim();
    if trimmed.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(trimmed))).ok()
}

/// Score one topic against a candidate: title hits weigh 2, teaser hits 1,
/// keywords of 8+ chars get a +1 specificity bonus.
fn score_topic(
    keywords: &[KeywordRow],
    title: &str,
    teaser: &str,
) -> (i32, Vec<KeywordMatch>) {
    let mut total = 0;
    let mut matches = Vec::new();

    for keyword in keywords {
        let Some(pattern) = phrase_pattern(&keyword.text) else {
            continue;
        };
        let in_title = pattern.is_match(title);
        let in_teaser = pattern.is_match(teaser);
        if !in_title && !in_teaser {
            continue;
        }

        let matched_in = match (in_title, in_teaser) {
            (true, true) => "both",
            (true, false) => "title",
            (false, true) => "teaser",
            (false, false) => unreachable!(),
        };
        let mut score = i32::from(in_title) * 2 + i32::from(in_teaser);
        if keyword.text.chars().count() >= 8 {
            score += 1;
        }

        total += score;
        matches.push(KeywordMatch {
            keyword_id: keyword.id,
            matched_in: matched_in.to_string(),
            score,
            keyword_len: keyword.text.chars().count(),
        });
    }

    (total, matches)
}

/// Pick the winning topic for a candidate, or `None` when no topic's
/// keywords appear at all (such candidates are dropped).
///
/// Ties between topics break toward the most recently updated topic.
fn best_topic_match(
    topics: &[TopicRow],
    keywords_by_topic: &HashMap<i64, Vec<KeywordRow>>,
    candidate: &RawCandidate,
) -> Option<TopicMatch> {
    let mut best: Option<(i32, DateTime<Utc>, TopicMatch)> = None;

    for topic in topics {
        let Some(keywords) = keywords_by_topic.get(&topic.id) else {
            continue;
        };
        let (score, matches) = score_topic(keywords, &candidate.title, &candidate.teaser);
        if score == 0 {
            continue;
        }

        let primary_keyword_id = matches
            .iter()
            .max_by_key(|m| (m.score, m.keyword_len))
            .map(|m| m.keyword_id);

        let topic_match = TopicMatch {
            topic_id: topic.id,
            primary_keyword_id,
            keyword_matches: matches,
        };

        let replace = match &best {
            None => true,
            Some((best_score, best_updated, _)) => {
                score > *best_score || (score == *best_score && topic.updated_at > *best_updated)
            }
        };
        if replace {
            best = Some((score, topic.updated_at, topic_match));
        }
    }

    best.map(|(_, _, topic_match)| topic_match)
}

fn to_recipe(row: SourceConfigRow) -> SourceRecipe {
    SourceRecipe {
        domain: row.domain,
        title_selector: row.title_selector,
        content_selector: row.content_selector,
        date_selector: row.date_selector,
        search_url_pattern: row.search_url_pattern,
        rss_urls: row.rss_urls.unwrap_or_default(),
        sitemap_url: row.sitemap_url,
        discovery_type: row.discovery_type.as_deref().and_then(DiscoveryType::parse),
    }
}

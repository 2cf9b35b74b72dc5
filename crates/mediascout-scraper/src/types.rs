//! Core record types shared across the scraping pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence in a parsed publication date.
///
/// Ordering matters: near-duplicate merging keeps the candidate with the
/// higher confidence, and the final sort uses it as a secondary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateConfidence {
    None,
    Low,
    Medium,
    High,
}

impl DateConfidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DateConfidence::None => "none",
            DateConfidence::Low => "low",
            DateConfidence::Medium => "medium",
            DateConfidence::High => "high",
        }
    }
}

/// A transient, in-run article candidate produced by a provider.
///
/// Candidates only live in memory for the duration of one scrape run;
/// survivors of dedup and scoring become persisted mentions.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub title: String,
    pub teaser: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub date_confidence: DateConfidence,
    /// Normalized source hostname (becomes the mention's platform).
    pub source_name: String,
    /// Stable provider tag: `gnews`, `serpapi`, `rss`, `configurable`.
    pub provider: &'static str,
    pub matched_keyword: Option<String>,
}

/// Discovery strategy for a configurable HTML source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryType {
    Rss,
    Sitemap,
    SiteSearch,
}

impl DiscoveryType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rss" => Some(DiscoveryType::Rss),
            "sitemap" => Some(DiscoveryType::Sitemap),
            "site_search" => Some(DiscoveryType::SiteSearch),
            _ => None,
        }
    }
}

/// A per-domain extraction recipe.
///
/// The store keeps these in `source_configs`; the scraper receives them
/// as plain values so it stays free of database concerns.
#[derive(Debug, Clone, Default)]
pub struct SourceRecipe {
    pub domain: String,
    pub title_selector: Option<String>,
    pub content_selector: Option<String>,
    pub date_selector: Option<String>,
    pub search_url_pattern: Option<String>,
    pub rss_urls: Vec<String>,
    pub sitemap_url: Option<String>,
    pub discovery_type: Option<DiscoveryType>,
}

impl SourceRecipe {
    /// A recipe takes part in configurable-HTML discovery only when its
    /// discovery strategy is actually satisfiable.
    #[must_use]
    pub fn is_discoverable(&self) -> bool {
        match self.discovery_type {
            Some(DiscoveryType::Rss) => !self.rss_urls.is_empty(),
            Some(DiscoveryType::Sitemap) => self.sitemap_url.is_some(),
            Some(DiscoveryType::SiteSearch) | None => self.has_search_pattern(),
        }
    }

    #[must_use]
    pub fn has_search_pattern(&self) -> bool {
        self.search_url_pattern
            .as_deref()
            .is_some_and(|p| p.contains("{keyword}"))
    }
}

//! Media-monitoring scraping core.
//!
//! Discovers news articles for a set of keywords across four provider
//! families (news API, search API, RSS feeds, recipe-driven HTML
//! sources), extracts article content with a graded strategy chain,
//! deduplicates across providers, and hands ordered candidates to the
//! caller for topic scoring and persistence.
//!
//! Key components:
//! - [`http::HttpClient`]: profile-headered, retry-aware request engine
//! - [`rate::RateGovernor`]: per-eTLD+1 token buckets + circuit breaker
//! - [`extract`]: recipe → generic → readability-style extraction chain
//! - [`dedup`]: exact-URL and fuzzy near-duplicate stages
//! - [`orchestrator::fetch_all_mentions`]: parallel provider fan-out

pub mod analyzer;
pub mod dates;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod extract;
pub mod http;
pub mod language;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod rate;
pub mod relevance;
pub mod selectors;
pub mod text;
pub mod types;

pub use error::ScrapeError;
pub use http::{HttpClient, RequestProfile};
pub use orchestrator::{fetch_all_mentions, OrchestratorConfig, ScrapeContext};
pub use rate::RateGovernor;
pub use relevance::RelevanceFilter;
pub use types::{DateConfidence, DiscoveryType, RawCandidate, SourceRecipe};

//! Article discovery providers.
//!
//! Four provider families feed the orchestrator: a news API (GNews-style),
//! a search API (SerpAPI-style), RSS feeds, and recipe-driven HTML
//! sources. All share the same contract: given cleaned keywords and a
//! time window, return raw candidates; errors never escape past the
//! orchestrator's isolation wrapper.

pub mod configurable;
pub mod gnews;
pub mod rss;
pub mod serpapi;

pub use configurable::{scrape_configurable, ConfigurableConfig};
pub use gnews::{scrape_gnews, GnewsConfig};
pub use rss::RssProvider;
pub use serpapi::{scrape_serpapi, SerpApiConfig};

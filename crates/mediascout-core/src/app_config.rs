use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Scraping-pipeline settings, grouped so the scraper crate can take
/// them without dragging in server/db configuration.
#[derive(Debug, Clone)]
pub struct ScrapingConfig {
    pub provider_gnews_enabled: bool,
    pub provider_serpapi_enabled: bool,
    pub provider_rss_enabled: bool,
    pub provider_configurable_enabled: bool,

    pub max_keywords_per_run: usize,
    pub max_total_urls_per_run: usize,
    pub blind_domain_circuit_threshold: u32,

    pub rate_html_rps: f64,
    pub rate_api_rps: f64,
    pub rate_rss_rps: f64,

    pub fuzzy_dedup_enabled: bool,
    pub fuzzy_dedup_threshold: u32,
    pub fuzzy_dedup_day_window: i64,

    pub historical_dedup_enabled: bool,
    pub historical_dedup_days: i64,
    pub historical_dedup_limit: i64,

    /// Language filter applied when a brand has no `allowed_languages`.
    /// Empty means no filtering.
    pub default_languages: Vec<String>,

    /// ISO 639-1 language and region hints sent to the search providers.
    pub search_lang: String,
    pub search_region: String,

    /// Hard wall-clock budget for one scrape run.
    pub run_budget_secs: u64,
    /// A brand lock older than this is considered stale and reclaimable.
    pub lock_stale_minutes: i64,

    pub gnews_api_key: Option<String>,
    pub serpapi_key: Option<String>,
    pub relevance_api_key: Option<String>,
    pub relevance_model: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub scraping: ScrapingConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("scraping", &RedactedScraping(&self.scraping))
            .finish()
    }
}

struct RedactedScraping<'a>(&'a ScrapingConfig);

impl std::fmt::Debug for RedactedScraping<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapingConfig")
            .field("provider_gnews_enabled", &self.0.provider_gnews_enabled)
            .field("provider_serpapi_enabled", &self.0.provider_serpapi_enabled)
            .field("provider_rss_enabled", &self.0.provider_rss_enabled)
            .field(
                "provider_configurable_enabled",
                &self.0.provider_configurable_enabled,
            )
            .field("max_keywords_per_run", &self.0.max_keywords_per_run)
            .field("max_total_urls_per_run", &self.0.max_total_urls_per_run)
            .field(
                "blind_domain_circuit_threshold",
                &self.0.blind_domain_circuit_threshold,
            )
            .field("rate_html_rps", &self.0.rate_html_rps)
            .field("rate_api_rps", &self.0.rate_api_rps)
            .field("rate_rss_rps", &self.0.rate_rss_rps)
            .field("fuzzy_dedup_enabled", &self.0.fuzzy_dedup_enabled)
            .field("fuzzy_dedup_threshold", &self.0.fuzzy_dedup_threshold)
            .field("fuzzy_dedup_day_window", &self.0.fuzzy_dedup_day_window)
            .field("historical_dedup_enabled", &self.0.historical_dedup_enabled)
            .field("default_languages", &self.0.default_languages)
            .field("run_budget_secs", &self.0.run_budget_secs)
            .field("lock_stale_minutes", &self.0.lock_stale_minutes)
            .field(
                "gnews_api_key",
                &self.0.gnews_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "serpapi_key",
                &self.0.serpapi_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "relevance_api_key",
                &self.0.relevance_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("relevance_model", &self.0.relevance_model)
            .finish()
    }
}

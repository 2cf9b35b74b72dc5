//! Database operations for the `source_configs` table (per-domain recipes).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row / insert types
// ---------------------------------------------------------------------------

/// A row from the `source_configs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceConfigRow {
    pub id: Uuid,
    pub domain: String,
    pub title_selector: Option<String>,
    pub content_selector: Option<String>,
    pub date_selector: Option<String>,
    pub search_url_pattern: Option<String>,
    pub rss_urls: Option<Vec<String>>,
    pub sitemap_url: Option<String>,
    pub discovery_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating or replacing a source config.
#[derive(Debug, Clone)]
pub struct NewSourceConfig {
    pub domain: String,
    pub title_selector: Option<String>,
    pub content_selector: Option<String>,
    pub date_selector: Option<String>,
    pub search_url_pattern: Option<String>,
    pub rss_urls: Option<Vec<String>>,
    pub sitemap_url: Option<String>,
    pub discovery_type: Option<String>,
}

const CONFIG_COLUMNS: &str = "id, domain, title_selector, content_selector, date_selector, \
     search_url_pattern, rss_urls, sitemap_url, discovery_type, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all source configs, ordered by domain.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_source_configs(pool: &PgPool) -> Result<Vec<SourceConfigRow>, DbError> {
    let rows = sqlx::query_as::<_, SourceConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM source_configs ORDER BY domain"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the config for an exact domain, or `None`.
///
/// Point lookup for single-domain consumers (the admin surface and
/// external config tooling). The scrape pipeline does not call this
/// per URL: it loads `list_source_configs` once per run and performs
/// the subdomain-fallback walk (most specific domain first) against
/// that in-memory set. A caller that does want fallback here walks its
/// candidate domains and calls this per candidate.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_source_config_by_domain(
    pool: &PgPool,
    domain: &str,
) -> Result<Option<SourceConfigRow>, DbError> {
    let row = sqlx::query_as::<_, SourceConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM source_configs WHERE domain = $1"
    ))
    .bind(domain)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Inserts or replaces the config for a domain. Idempotent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_source_config(
    pool: &PgPool,
    config: &NewSourceConfig,
) -> Result<SourceConfigRow, DbError> {
    let row = sqlx::query_as::<_, SourceConfigRow>(&format!(
        "INSERT INTO source_configs \
             (domain, title_selector, content_selector, date_selector, \
              search_url_pattern, rss_urls, sitemap_url, discovery_type) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (domain) DO UPDATE SET \
             title_selector     = EXCLUDED.title_selector, \
             content_selector   = EXCLUDED.content_selector, \
             date_selector      = EXCLUDED.date_selector, \
             search_url_pattern = EXCLUDED.search_url_pattern, \
             rss_urls           = EXCLUDED.rss_urls, \
             sitemap_url        = EXCLUDED.sitemap_url, \
             discovery_type     = EXCLUDED.discovery_type, \
             updated_at         = NOW() \
         RETURNING {CONFIG_COLUMNS}"
    ))
    .bind(&config.domain)
    .bind(&config.title_selector)
    .bind(&config.content_selector)
    .bind(&config.date_selector)
    .bind(&config.search_url_pattern)
    .bind(&config.rss_urls)
    .bind(&config.sitemap_url)
    .bind(&config.discovery_type)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Deletes the config for a domain.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matched, [`DbError::Sqlx`] on
/// query failure.
pub async fn delete_source_config(pool: &PgPool, domain: &str) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM source_configs WHERE domain = $1")
        .bind(domain)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

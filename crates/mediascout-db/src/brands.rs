//! Database operations for the `brands` table, including the scrape lock.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `brands` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandRow {
    pub id: i64,
    pub profile_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub scrape_frequency_hours: i32,
    pub initial_lookback_days: i32,
    pub allowed_languages: Option<Vec<String>>,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub scrape_in_progress: bool,
    pub scrape_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const BRAND_COLUMNS: &str = "id, profile_id, name, is_active, scrape_frequency_hours, \
     initial_lookback_days, allowed_languages, last_scraped_at, \
     scrape_in_progress, scrape_started_at, created_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns a single brand by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_brand(pool: &PgPool, brand_id: i64) -> Result<Option<BrandRow>, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE id = $1"
    ))
    .bind(brand_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns all active brands (`is_active = true`), ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_brands(pool: &PgPool) -> Result<Vec<BrandRow>, DbError> {
    let rows = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE is_active = true ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Attempts to acquire the scrape lock for a brand.
///
/// The conditional update succeeds when the brand is unlocked OR the
/// existing lock is stale (`scrape_started_at` older than
/// `stale_minutes`). Returns `true` when the lock was acquired. The
/// brand row is the single source of truth, so two processes can race
/// this safely — at most one sees an affected row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn try_acquire_scrape_lock(
    pool: &PgPool,
    brand_id: i64,
    stale_minutes: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE brands \
         SET scrape_in_progress = true, scrape_started_at = NOW() \
         WHERE id = $1 \
           AND (scrape_in_progress = false \
                OR scrape_started_at IS NULL \
                OR scrape_started_at < NOW() - ($2 * INTERVAL '1 minute'))",
    )
    .bind(brand_id)
    .bind(stale_minutes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Releases the scrape lock for a brand.
///
/// Returns `true` when a row was updated. Safe to call when the lock is
/// not held — the update is then a no-op on the lock fields.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn release_scrape_lock(pool: &PgPool, brand_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE brands \
         SET scrape_in_progress = false, scrape_started_at = NULL \
         WHERE id = $1",
    )
    .bind(brand_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Sets `last_scraped_at` to the given run start time.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_last_scraped(
    pool: &PgPool,
    brand_id: i64,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE brands SET last_scraped_at = $1 WHERE id = $2")
        .bind(at)
        .bind(brand_id)
        .execute(pool)
        .await?;

    Ok(())
}

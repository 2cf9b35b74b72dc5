//! Database operations for `mentions` and `mention_keywords`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row / insert types
// ---------------------------------------------------------------------------

/// A mention prepared for insertion.
#[derive(Debug, Clone)]
pub struct NewMention {
    pub brand_id: i64,
    pub topic_id: i64,
    pub primary_keyword_id: Option<i64>,
    pub platform_id: i64,
    pub title: String,
    pub teaser: Option<String>,
    pub normalized_url: String,
    pub raw_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub date_confidence: String,
    pub scrape_run_id: String,
}

/// A mention-keyword link prepared for insertion.
#[derive(Debug, Clone)]
pub struct NewMentionKeyword {
    pub mention_id: i64,
    pub keyword_id: i64,
    /// One of `title`, `teaser`, `both`.
    pub matched_in: String,
    pub score: i32,
}

/// A recent mention used for historical near-duplicate comparison.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecentMentionRow {
    pub title: String,
    pub teaser: Option<String>,
    pub normalized_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns `true` if a mention with this `(normalized_url, topic_id)` already exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn mention_exists(
    pool: &PgPool,
    normalized_url: &str,
    topic_id: i64,
) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM mentions WHERE normalized_url = $1 AND topic_id = $2)",
    )
    .bind(normalized_url)
    .bind(topic_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Inserts one mention, skipping silently on the `(normalized_url, topic_id)`
/// unique constraint.
///
/// Returns the new mention id, or `None` when the row already existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_mention(pool: &PgPool, mention: &NewMention) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO mentions \
             (brand_id, topic_id, primary_keyword_id, platform_id, title, teaser, \
              normalized_url, raw_url, published_at, date_confidence, scrape_run_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (normalized_url, topic_id) DO NOTHING \
         RETURNING id",
    )
    .bind(mention.brand_id)
    .bind(mention.topic_id)
    .bind(mention.primary_keyword_id)
    .bind(mention.platform_id)
    .bind(&mention.title)
    .bind(&mention.teaser)
    .bind(&mention.normalized_url)
    .bind(&mention.raw_url)
    .bind(mention.published_at)
    .bind(&mention.date_confidence)
    .bind(&mention.scrape_run_id)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Inserts a batch of mention-keyword links, skipping existing pairs.
///
/// Returns the number of links inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails.
pub async fn insert_mention_keywords(
    pool: &PgPool,
    links: &[NewMentionKeyword],
) -> Result<u64, DbError> {
    let mut inserted = 0u64;

    for link in links {
        let result = sqlx::query(
            "INSERT INTO mention_keywords (mention_id, keyword_id, matched_in, score) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (mention_id, keyword_id) DO NOTHING",
        )
        .bind(link.mention_id)
        .bind(link.keyword_id)
        .bind(&link.matched_in)
        .bind(link.score)
        .execute(pool)
        .await?;

        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Returns a brand's recent mentions for historical near-duplicate filtering.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_mentions(
    pool: &PgPool,
    brand_id: i64,
    days_back: i64,
    limit: i64,
) -> Result<Vec<RecentMentionRow>, DbError> {
    let rows = sqlx::query_as::<_, RecentMentionRow>(
        "SELECT title, teaser, normalized_url, published_at \
         FROM mentions \
         WHERE brand_id = $1 AND discovered_at >= NOW() - ($2 * INTERVAL '1 day') \
         ORDER BY discovered_at DESC \
         LIMIT $3",
    )
    .bind(brand_id)
    .bind(days_back)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

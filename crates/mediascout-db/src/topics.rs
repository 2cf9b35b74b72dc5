//! Database operations for `topics` and `keywords`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `topics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicRow {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
    pub is_active: bool,
    pub query_template: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `keywords` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordRow {
    pub id: i64,
    pub topic_id: i64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all active topics for a brand, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_topics(pool: &PgPool, brand_id: i64) -> Result<Vec<TopicRow>, DbError> {
    let rows = sqlx::query_as::<_, TopicRow>(
        "SELECT id, brand_id, name, is_active, query_template, updated_at \
         FROM topics \
         WHERE brand_id = $1 AND is_active = true \
         ORDER BY id",
    )
    .bind(brand_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns all keywords belonging to the given topics.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_keywords_for_topics(
    pool: &PgPool,
    topic_ids: &[i64],
) -> Result<Vec<KeywordRow>, DbError> {
    if topic_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, KeywordRow>(
        "SELECT id, topic_id, text \
         FROM keywords \
         WHERE topic_id = ANY($1) \
         ORDER BY topic_id, id",
    )
    .bind(topic_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

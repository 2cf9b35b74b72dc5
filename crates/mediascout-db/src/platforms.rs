//! Database operations for the `platforms` table.

use sqlx::PgPool;

use crate::DbError;

/// A row from the `platforms` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlatformRow {
    pub id: i64,
    pub name: String,
}

/// Returns all platforms. Loaded once per run into an in-memory cache.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_platforms(pool: &PgPool) -> Result<Vec<PlatformRow>, DbError> {
    let rows = sqlx::query_as::<_, PlatformRow>("SELECT id, name FROM platforms ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns the platform id for `name`, inserting the row if it is new.
///
/// The upsert form makes concurrent first-insertions of the same name safe:
/// both writers converge on the single existing row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_or_create_platform(pool: &PgPool, name: &str) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO platforms (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

//! Database operations for `titles`, the log of generated product titles.

use chrono::{DateTime, Utc};
use epdb_core::similarity::{KnownTitle, TitleOrigin};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TitleRow {
    pub id: Uuid,
    pub title: String,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Records generated titles. An empty input is a no-op.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_titles(
    pool: &PgPool,
    titles: &[(String, Option<String>)],
) -> Result<Vec<TitleRow>, DbError> {
    let mut conn = pool.acquire().await?;
    insert_title_rows(&mut conn, titles).await
}

pub(crate) async fn insert_title_rows(
    conn: &mut PgConnection,
    titles: &[(String, Option<String>)],
) -> Result<Vec<TitleRow>, DbError> {
    if titles.is_empty() {
        return Ok(Vec::new());
    }
    let texts: Vec<&str> = titles.iter().map(|(t, _)| t.as_str()).collect();
    let cities: Vec<Option<&str>> = titles.iter().map(|(_, c)| c.as_deref()).collect();

    let rows = sqlx::query_as::<_, TitleRow>(
        "INSERT INTO titles (title, city) \
         SELECT * FROM UNNEST($1::text[], $2::text[]) \
         RETURNING id, title, city, created_at",
    )
    .bind(&texts)
    .bind(&cities)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Every title already in use: generated ones plus active product titles.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_known_titles(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT title FROM titles \
         UNION \
         SELECT title FROM ep_data",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Active and backed-up product titles for similarity checks.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn list_title_corpus(pool: &PgPool) -> Result<Vec<KnownTitle>, DbError> {
    let active = sqlx::query_as::<_, (String, String)>("SELECT id, title FROM ep_data")
        .fetch_all(pool)
        .await?;
    let deleted = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, original_data ->> 'title' FROM deleted_items \
         WHERE original_data ->> 'title' IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut corpus = Vec::with_capacity(active.len() + deleted.len());
    corpus.extend(active.into_iter().map(|(id, title)| KnownTitle {
        id,
        title,
        origin: TitleOrigin::Active,
    }));
    corpus.extend(deleted.into_iter().map(|(id, title)| KnownTitle {
        id: id.to_string(),
        title,
        origin: TitleOrigin::Deleted,
    }));
    Ok(corpus)
}

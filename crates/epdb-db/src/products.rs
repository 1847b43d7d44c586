//! Database operations for `ep_data`, the active EP catalog.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use epdb_core::catalog::{prepare_candidate, PRODUCT_COLUMNS};
use epdb_core::ProductKey;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::titles::{insert_title_rows, TitleRow};
use crate::DbError;

const UPSERT_CHUNK: usize = 1000;

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts candidate rows in a single statement and returns the stored rows.
///
/// Each candidate loses `id`, `created_at`, and `updated_at` (see
/// [`prepare_candidate`]); keys that are not `ep_data` columns are ignored.
/// Either every candidate is inserted or none is.
///
/// # Errors
///
/// Returns [`DbError::EmptyBatch`] for an empty input and [`DbError::Sqlx`]
/// when the insert fails (for example a candidate without a `title`).
pub async fn insert_products(
    pool: &PgPool,
    candidates: Vec<Map<String, Value>>,
) -> Result<Vec<Value>, DbError> {
    let mut conn = pool.acquire().await?;
    insert_product_rows(&mut conn, candidates).await
}

/// Inserts replacement products and logs their titles in one transaction.
///
/// A failure in either insert leaves both tables untouched.
///
/// # Errors
///
/// Returns [`DbError::EmptyBatch`] for no candidates and [`DbError::Sqlx`]
/// when either insert or the commit fails.
pub async fn insert_replacements(
    pool: &PgPool,
    candidates: Vec<Map<String, Value>>,
    titles: &[(String, Option<String>)],
) -> Result<(Vec<Value>, Vec<TitleRow>), DbError> {
    let mut tx = pool.begin().await?;
    let products = insert_product_rows(&mut tx, candidates).await?;
    let logged = insert_title_rows(&mut tx, titles).await?;
    tx.commit().await?;
    Ok((products, logged))
}

async fn insert_product_rows(
    conn: &mut PgConnection,
    candidates: Vec<Map<String, Value>>,
) -> Result<Vec<Value>, DbError> {
    if candidates.is_empty() {
        return Err(DbError::EmptyBatch);
    }

    let prepared: Vec<Value> = candidates
        .into_iter()
        .map(|c| Value::Object(prepare_candidate(c)))
        .collect();

    let columns = PRODUCT_COLUMNS.join(", ");
    let sql = format!(
        "INSERT INTO ep_data ({columns}) \
         SELECT {columns} FROM jsonb_populate_recordset(NULL::ep_data, $1) \
         RETURNING row_to_json(ep_data.*)"
    );

    let rows = sqlx::query_scalar::<_, Value>(&sql)
        .bind(Json(Value::Array(prepared)))
        .fetch_all(&mut *conn)
        .await?;

    tracing::info!(inserted = rows.len(), "inserted regenerated products");
    Ok(rows)
}

/// Inserts or replaces sheet rows by `id`, in chunks inside one transaction.
///
/// Stored columns the rows do not carry are overwritten with null; `created_at`
/// is left alone. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::EmptyBatch`] for an empty input and [`DbError::Sqlx`]
/// when a chunk fails, in which case nothing is committed.
pub async fn upsert_products(
    pool: &PgPool,
    rows: &[Map<String, Value>],
) -> Result<u64, DbError> {
    if rows.is_empty() {
        return Err(DbError::EmptyBatch);
    }

    let columns = std::iter::once("id")
        .chain(PRODUCT_COLUMNS.iter().copied())
        .collect::<Vec<_>>()
        .join(", ");
    let updates = PRODUCT_COLUMNS
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO ep_data ({columns}) \
         SELECT {columns} FROM jsonb_populate_recordset(NULL::ep_data, $1) \
         ON CONFLICT (id) DO UPDATE SET {updates}"
    );

    let mut tx = pool.begin().await?;
    let mut written = 0;
    for chunk in rows.chunks(UPSERT_CHUNK) {
        let payload = Value::Array(chunk.iter().cloned().map(Value::Object).collect());
        written += sqlx::query(&sql)
            .bind(Json(payload))
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;

    tracing::info!(written, "upserted imported products");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Identifying columns of every active row, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_keys(pool: &PgPool) -> Result<Vec<ProductKey>, DbError> {
    let rows = sqlx::query_as::<_, (String, Option<String>, String, DateTime<Utc>)>(
        "SELECT id, original_id, title, created_at FROM ep_data \
         ORDER BY created_at DESC, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, original_id, title, created_at)| ProductKey {
            id,
            original_id,
            title: Some(title),
            created_at,
        })
        .collect())
}

/// Every active row as JSON in column order, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_json(pool: &PgPool) -> Result<Vec<Value>, DbError> {
    let rows = sqlx::query_scalar::<_, Value>(
        "SELECT row_to_json(e) FROM ep_data e ORDER BY e.created_at DESC, e.id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Identifiers and original ids that start with `prefix`.
///
/// Used to allocate fresh `{date}_…` product codes without collisions.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_taken_identifiers(
    pool: &PgPool,
    prefix: &str,
) -> Result<HashSet<String>, DbError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT id FROM ep_data WHERE left(id, length($1)) = $1 \
         UNION \
         SELECT original_id FROM ep_data \
         WHERE original_id IS NOT NULL AND left(original_id, length($1)) = $1",
    )
    .bind(prefix)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

//! Moves of active rows into the backup table.
//!
//! Each move runs in its own transaction: the row is locked, snapshotted into
//! `deleted_items`, then deleted. If any statement fails the transaction is
//! dropped and the backup insert is rolled back with it, so an identifier is
//! never present in both tables and never lost from both.

use std::collections::HashMap;

use epdb_core::catalog::value_as_text;
use epdb_core::reconcile::{MoveOutcome, ReconcileSummary, ZERO_CLICK_REASON};
use epdb_core::ParsedClickStats;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::deleted_items::DeletedItemRow;
use crate::DbError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroClickCandidate {
    pub product_id: String,
    pub product_name: String,
    pub ep_data_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroClickPreview {
    pub total_csv_items: usize,
    pub zero_click_items: usize,
    pub invalid_rows: usize,
    pub matched: Vec<ZeroClickCandidate>,
    pub not_found_ids: Vec<String>,
}

/// Moves one active row (matched by `id`, else by `original_id`) into the
/// backup table with `reason`.
///
/// Returns `Ok(None)` when no active row matches. The returned pair is the
/// backup row id and the moved row's title.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is committed
/// in that case.
pub async fn move_to_backup(
    pool: &PgPool,
    product_id: &str,
    reason: &str,
) -> Result<Option<(i64, String)>, DbError> {
    let mut tx = pool.begin().await?;

    let target = sqlx::query_as::<_, (String, String)>(
        "SELECT id, title FROM ep_data \
         WHERE id = $1 OR original_id = $1 \
         ORDER BY (id = $1) DESC, created_at \
         LIMIT 1 \
         FOR UPDATE",
    )
    .bind(product_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((id, title)) = target else {
        tx.rollback().await?;
        return Ok(None);
    };

    let backup_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO deleted_items (original_id, original_data, reason) \
         SELECT e.id, to_jsonb(e), $2 FROM ep_data e WHERE e.id = $1 \
         RETURNING id",
    )
    .bind(&id)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;

    let deleted = sqlx::query("DELETE FROM ep_data WHERE id = $1")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() != 1 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(Some((backup_id, title)))
}

/// Moves each identifier in order, capturing per-item failures instead of
/// aborting the batch.
pub async fn move_zero_click_items(
    pool: &PgPool,
    product_ids: &[String],
    reason: &str,
) -> Vec<(String, MoveOutcome)> {
    let mut outcomes = Vec::with_capacity(product_ids.len());

    for product_id in product_ids {
        let outcome = match move_to_backup(pool, product_id, reason).await {
            Ok(Some((backup_id, title))) => {
                tracing::info!(%product_id, backup_id, "moved product to backup");
                MoveOutcome::Moved { backup_id, title }
            }
            Ok(None) => {
                tracing::debug!(%product_id, "no active product for identifier");
                MoveOutcome::NotFound
            }
            Err(e) => {
                tracing::warn!(%product_id, error = %e, "move to backup failed; rolled back");
                MoveOutcome::Failed(e.to_string())
            }
        };
        outcomes.push((product_id.clone(), outcome));
    }

    outcomes
}

/// Runs a zero-click reconciliation over parsed click statistics.
///
/// Per-row failures are reported in the summary; the run itself cannot fail
/// once parsing has succeeded.
pub async fn reconcile_zero_clicks(pool: &PgPool, parsed: &ParsedClickStats) -> ReconcileSummary {
    let mut summary = ReconcileSummary::from_parsed(parsed);
    let ids: Vec<String> = parsed
        .zero_click_rows()
        .map(|row| row.product_id.clone())
        .collect();

    for (product_id, outcome) in move_zero_click_items(pool, &ids, ZERO_CLICK_REASON).await {
        summary.record(&product_id, outcome);
    }

    tracing::info!(
        total = summary.total_csv_items,
        zero_click = summary.zero_click_items,
        moved = summary.moved_to_delete,
        not_found = summary.not_found_in_ep_data,
        failed = summary.failed_items,
        "zero-click reconciliation finished"
    );
    summary
}

/// Reports which zero-click rows would be moved, without changing anything.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the lookup fails.
pub async fn preview_zero_clicks(
    pool: &PgPool,
    parsed: &ParsedClickStats,
) -> Result<ZeroClickPreview, DbError> {
    let zero_rows: Vec<_> = parsed.zero_click_rows().collect();
    let ids: Vec<String> = zero_rows.iter().map(|r| r.product_id.clone()).collect();

    let found = sqlx::query_as::<_, (String, Option<String>, String)>(
        "SELECT id, original_id, title FROM ep_data \
         WHERE id = ANY($1) OR original_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_key: HashMap<&str, (&str, &str)> = HashMap::new();
    for (id, original_id, title) in &found {
        if let Some(original_id) = original_id {
            by_key
                .entry(original_id.as_str())
                .or_insert((id.as_str(), title.as_str()));
        }
    }
    // Exact id matches take precedence over original_id matches.
    for (id, _, title) in &found {
        by_key.insert(id.as_str(), (id.as_str(), title.as_str()));
    }

    let mut preview = ZeroClickPreview {
        total_csv_items: parsed.rows.len(),
        zero_click_items: zero_rows.len(),
        invalid_rows: parsed.invalid_rows,
        ..ZeroClickPreview::default()
    };
    for row in zero_rows {
        match by_key.get(row.product_id.as_str()) {
            Some((ep_id, title)) => preview.matched.push(ZeroClickCandidate {
                product_id: row.product_id.clone(),
                product_name: row.product_name.clone(),
                ep_data_id: (*ep_id).to_string(),
                title: (*title).to_string(),
            }),
            None => preview.not_found_ids.push(row.product_id.clone()),
        }
    }
    Ok(preview)
}

/// Backs up the submitted rows and deletes them from `ep_data` in one
/// transaction. The submitted JSON is stored as the snapshot.
///
/// Items without an `id` are ignored.
///
/// # Errors
///
/// Returns [`DbError::EmptyBatch`] when no item carries an `id`, and
/// [`DbError::Sqlx`] if either statement fails (nothing is committed).
pub async fn backup_and_delete(
    pool: &PgPool,
    items: &[Map<String, Value>],
    reason: &str,
) -> Result<Vec<DeletedItemRow>, DbError> {
    let with_ids: Vec<(String, Value)> = items
        .iter()
        .filter_map(|item| {
            item.get("id")
                .and_then(value_as_text)
                .filter(|id| !id.is_empty())
                .map(|id| (id, Value::Object(item.clone())))
        })
        .collect();

    if with_ids.is_empty() {
        return Err(DbError::EmptyBatch);
    }

    let ids: Vec<String> = with_ids.iter().map(|(id, _)| id.clone()).collect();
    let snapshots: Vec<Value> = with_ids.into_iter().map(|(_, snapshot)| snapshot).collect();

    let mut tx = pool.begin().await?;

    let backups = sqlx::query_as::<_, DeletedItemRow>(
        "INSERT INTO deleted_items (original_id, original_data, reason) \
         SELECT x ->> 'id', x, $2 FROM jsonb_array_elements($1) AS x \
         RETURNING id, original_id, original_data, reason, created_at",
    )
    .bind(Json(Value::Array(snapshots)))
    .bind(reason)
    .fetch_all(&mut *tx)
    .await?;

    let deleted = sqlx::query("DELETE FROM ep_data WHERE id = ANY($1)")
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        backed_up = backups.len(),
        deleted = deleted.rows_affected(),
        "backed up and deleted active rows"
    );
    Ok(backups)
}

//! Generic table operations behind the admin surface.
//!
//! Every function takes a [`TablePolicy`] already resolved by the caller, so
//! the table and column identifiers interpolated below only ever come from
//! the static registry in `epdb_core::table_policy`.

use epdb_core::table_policy::{value_as_sql_text, ColumnSpec, IdKind, TablePolicy, TABLE_POLICIES};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::credentials::mask_key;
use crate::{escape_like, DbError};

const MAX_PAGE_SIZE: u32 = 500;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parses `asc`/`desc` case-insensitively; anything else is descending.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    const fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrowseQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPage {
    pub rows: Vec<Value>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Identifiers the caller asked to remove.
    pub requested: usize,
    /// Rows that actually existed and were removed.
    pub matched: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncateMethod {
    Truncate,
    DeleteAll,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub count: i64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `id` can possibly name a row of a table keyed by `kind`.
fn id_fits(kind: IdKind, id: &str) -> bool {
    match kind {
        IdKind::Text => !id.is_empty(),
        IdKind::BigInt => id.parse::<i64>().is_ok(),
        IdKind::Uuid => uuid::Uuid::parse_str(id).is_ok(),
    }
}

/// Credential keys never leave the store in clear text through this surface.
fn redact(policy: &TablePolicy, mut row: Value) -> Value {
    if policy.table == "api" {
        if let Some(Value::String(key)) = row.get("api_key") {
            let masked = mask_key(key);
            row["api_key"] = Value::String(masked);
        }
    }
    row
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Updates the allow-listed `updates` on one row and returns the stored row.
///
/// Each value is bound as text and cast to its column's SQL type.
///
/// # Errors
///
/// Returns [`DbError::EmptyBatch`] when `updates` is empty,
/// [`DbError::NotFound`] when no row has `id`, and [`DbError::Sqlx`] when the
/// update fails (for example a value that does not cast).
pub async fn update_row(
    pool: &PgPool,
    policy: &TablePolicy,
    id: &str,
    updates: &[(&ColumnSpec, Value)],
) -> Result<Value, DbError> {
    if updates.is_empty() {
        return Err(DbError::EmptyBatch);
    }
    if !id_fits(policy.id_kind, id) {
        return Err(DbError::NotFound);
    }

    let assignments: Vec<String> = updates
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = (${}::text)::{}", column.name, i + 1, column.sql_type))
        .collect();
    let id_param = updates.len() + 1;
    let sql = format!(
        "UPDATE {table} SET {assignments} \
         WHERE id = (${id_param}::text)::{id_type} \
         RETURNING row_to_json({table}.*)",
        table = policy.table,
        assignments = assignments.join(", "),
        id_type = policy.id_kind.sql_type(),
    );

    let mut query = sqlx::query_scalar::<_, Value>(&sql);
    for (_, value) in updates {
        query = query.bind(value_as_sql_text(value));
    }
    let row = query
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    tracing::info!(table = policy.table, %id, columns = updates.len(), "admin row update");
    Ok(redact(policy, row))
}

/// Deletes the rows named by `ids`. Identifiers that cannot belong to the
/// table's key type are counted as requested but never matched.
///
/// # Errors
///
/// Returns [`DbError::EmptyBatch`] when `ids` is empty and [`DbError::Sqlx`]
/// if the delete fails.
pub async fn delete_rows(
    pool: &PgPool,
    policy: &TablePolicy,
    ids: &[String],
) -> Result<DeleteOutcome, DbError> {
    if ids.is_empty() {
        return Err(DbError::EmptyBatch);
    }

    let usable: Vec<&str> = ids
        .iter()
        .map(String::as_str)
        .filter(|id| id_fits(policy.id_kind, id))
        .collect();

    let matched = if usable.is_empty() {
        0
    } else {
        let sql = format!(
            "DELETE FROM {table} WHERE id = ANY(($1::text[])::{id_type}[])",
            table = policy.table,
            id_type = policy.id_kind.sql_type(),
        );
        sqlx::query(&sql)
            .bind(&usable)
            .execute(pool)
            .await?
            .rows_affected()
    };

    tracing::info!(
        table = policy.table,
        requested = ids.len(),
        matched,
        "admin row delete"
    );
    Ok(DeleteOutcome {
        requested: ids.len(),
        matched,
    })
}

/// Empties a table through the privileged `admin_truncate_table` function,
/// falling back to an unconditional `DELETE` when that call is refused.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] only when the fallback delete also fails.
pub async fn truncate_table(
    pool: &PgPool,
    policy: &TablePolicy,
) -> Result<TruncateMethod, DbError> {
    match sqlx::query("SELECT admin_truncate_table($1)")
        .bind(policy.table)
        .execute(pool)
        .await
    {
        Ok(_) => {
            tracing::info!(table = policy.table, "table truncated");
            Ok(TruncateMethod::Truncate)
        }
        Err(e) => {
            tracing::warn!(
                table = policy.table,
                error = %e,
                "truncate refused; falling back to delete"
            );
            let sql = format!("DELETE FROM {}", policy.table);
            let removed = sqlx::query(&sql).execute(pool).await?.rows_affected();
            tracing::info!(table = policy.table, removed, "table cleared by delete");
            Ok(TruncateMethod::DeleteAll)
        }
    }
}

/// One page of rows, optionally filtered by a case-insensitive substring over
/// the table's searchable columns.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either the page or the count query fails.
pub async fn browse_rows(
    pool: &PgPool,
    policy: &TablePolicy,
    query: &BrowseQuery,
) -> Result<RowPage, DbError> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = i64::from(page - 1) * i64::from(limit);

    let pattern = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(escape_like);

    let filter = policy
        .searchable
        .iter()
        .map(|c| format!("t.{c}::text ILIKE $1 ESCAPE '\\'"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let where_clause = format!("WHERE ($1::text IS NULL OR ({filter}))");

    let sort = policy.sort_column(query.sort_by.as_deref());
    let sql = format!(
        "SELECT row_to_json(t) FROM {table} t {where_clause} \
         ORDER BY t.{sort} {order} NULLS LAST, t.id \
         LIMIT $2 OFFSET $3",
        table = policy.table,
        order = query.sort_order.as_sql(),
    );
    let rows = sqlx::query_scalar::<_, Value>(&sql)
        .bind(pattern.as_deref())
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let count_sql = format!("SELECT COUNT(*) FROM {} t {where_clause}", policy.table);
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind(pattern.as_deref())
        .fetch_one(pool)
        .await?;

    let limit_i64 = i64::from(limit);
    Ok(RowPage {
        rows: rows.into_iter().map(|row| redact(policy, row)).collect(),
        total,
        page,
        limit,
        total_pages: (total + limit_i64 - 1) / limit_i64,
    })
}

/// Row counts of every registered table, in registry order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any count fails.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<TableCount>, DbError> {
    let mut counts = Vec::with_capacity(TABLE_POLICIES.len());
    for policy in &TABLE_POLICIES {
        let sql = format!("SELECT COUNT(*) FROM {}", policy.table);
        let count = sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await?;
        counts.push(TableCount {
            table: policy.table,
            count,
        });
    }
    Ok(counts)
}

//! Database operations for `deleted_items`, the backup of removed products.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `deleted_items` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DeletedItemRow {
    pub id: i64,
    pub original_id: String,
    /// Full snapshot of the active row at the time it was removed.
    pub original_data: Value,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeletedItemRow {
    /// Flattens the backup into one export record: backup columns first,
    /// then the snapshot's own keys.
    #[must_use]
    pub fn flatten(&self) -> serde_json::Map<String, Value> {
        let mut flat = serde_json::Map::new();
        flat.insert("deleted_id".to_string(), Value::from(self.id));
        flat.insert("original_id".to_string(), Value::from(self.original_id.clone()));
        flat.insert(
            "reason".to_string(),
            self.reason.clone().map_or(Value::Null, Value::from),
        );
        flat.insert(
            "deleted_at".to_string(),
            Value::from(self.created_at.to_rfc3339()),
        );
        if let Value::Object(snapshot) = &self.original_data {
            for (key, value) in snapshot {
                if !flat.contains_key(key) {
                    flat.insert(key.clone(), value.clone());
                }
            }
        }
        flat
    }
}

/// All backup rows, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_deleted_items(pool: &PgPool) -> Result<Vec<DeletedItemRow>, DbError> {
    let rows = sqlx::query_as::<_, DeletedItemRow>(
        "SELECT id, original_id, original_data, reason, created_at \
         FROM deleted_items \
         ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_deleted_items(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM deleted_items")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_puts_backup_columns_first_and_keeps_backup_original_id() {
        let row = DeletedItemRow {
            id: 9,
            original_id: "P1".to_string(),
            original_data: json!({ "id": "P1", "title": "Osaka", "original_id": "legacy" }),
            reason: Some("zero clicks".to_string()),
            created_at: Utc::now(),
        };
        let flat = row.flatten();
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(&keys[..4], ["deleted_id", "original_id", "reason", "deleted_at"]);
        assert_eq!(flat["original_id"], "P1");
        assert_eq!(flat["title"], "Osaka");
        assert_eq!(flat["id"], "P1");
    }
}

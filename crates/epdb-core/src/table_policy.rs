//! Declarative allow-list for the administrative table surface.
//!
//! Every generic admin operation (update, delete, truncate, browse) resolves
//! its target through [`policy_for_op`] before any SQL is built. Table and
//! column names that reach SQL text therefore always come from the static
//! entries below, never from the request.

use serde_json::{Map, Value};
use thiserror::Error;

/// SQL type of a table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Text,
    BigInt,
    Uuid,
}

impl IdKind {
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            IdKind::Text => "text",
            IdKind::BigInt => "bigint",
            IdKind::Uuid => "uuid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOp {
    Update,
    Delete,
    Truncate,
    Browse,
}

impl std::fmt::Display for TableOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableOp::Update => write!(f, "update"),
            TableOp::Delete => write!(f, "delete"),
            TableOp::Truncate => write!(f, "truncate"),
            TableOp::Browse => write!(f, "browse"),
        }
    }
}

/// An updatable column and the SQL type its incoming value is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnSpec {
    ColumnSpec { name, sql_type }
}

#[derive(Debug)]
pub struct TablePolicy {
    pub table: &'static str,
    pub id_kind: IdKind,
    pub updatable: &'static [ColumnSpec],
    pub searchable: &'static [&'static str],
    pub sortable: &'static [&'static str],
    pub default_sort: &'static str,
    ops: &'static [TableOp],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("table '{0}' is not allowed")]
    UnknownTable(String),
    #[error("{op} is not allowed on table '{table}'")]
    OperationNotAllowed { table: String, op: TableOp },
}

const ALL_OPS: &[TableOp] = &[
    TableOp::Update,
    TableOp::Delete,
    TableOp::Truncate,
    TableOp::Browse,
];

pub static TABLE_POLICIES: [TablePolicy; 5] = [
    TablePolicy {
        table: "ep_data",
        id_kind: IdKind::Text,
        updatable: &[
            col("original_id", "text"),
            col("title", "text"),
            col("price_pc", "bigint"),
            col("benefit_price", "bigint"),
            col("normal_price", "bigint"),
            col("link", "text"),
            col("mobile_link", "text"),
            col("image_link", "text"),
            col("add_image_link", "text"),
            col("video_url", "text"),
            col("category_name1", "text"),
            col("category_name2", "text"),
            col("category_name3", "text"),
            col("category_name4", "text"),
            col("brand", "text"),
            col("maker", "text"),
            col("origin", "text"),
            col("age_group", "text"),
            col("gender", "text"),
            col("city", "text"),
        ],
        searchable: &["id", "original_id", "title", "city"],
        sortable: &["id", "title", "price_pc", "city", "created_at", "updated_at"],
        default_sort: "created_at",
        ops: ALL_OPS,
    },
    TablePolicy {
        table: "deleted_items",
        id_kind: IdKind::BigInt,
        updatable: &[col("reason", "text")],
        searchable: &["original_id", "reason"],
        sortable: &["id", "original_id", "created_at"],
        default_sort: "created_at",
        ops: ALL_OPS,
    },
    TablePolicy {
        table: "api",
        id_kind: IdKind::BigInt,
        updatable: &[
            col("name", "text"),
            col("description", "text"),
            col("api_key", "text"),
            col("is_active", "boolean"),
        ],
        searchable: &["provider", "name", "description"],
        sortable: &["id", "provider", "name", "usage_count", "created_at"],
        default_sort: "created_at",
        // Credentials are removed individually; never bulk-cleared.
        ops: &[TableOp::Update, TableOp::Delete, TableOp::Browse],
    },
    TablePolicy {
        table: "city_images",
        id_kind: IdKind::BigInt,
        updatable: &[
            col("city", "text"),
            col("image_link", "text"),
            col("is_main_image", "boolean"),
            col("video_url", "text"),
        ],
        searchable: &["city", "image_link"],
        sortable: &["id", "city", "created_at"],
        default_sort: "created_at",
        ops: ALL_OPS,
    },
    TablePolicy {
        table: "titles",
        id_kind: IdKind::Uuid,
        updatable: &[col("title", "text"), col("city", "text")],
        searchable: &["title", "city"],
        sortable: &["title", "city", "created_at"],
        default_sort: "created_at",
        ops: ALL_OPS,
    },
];

/// Looks up a table by name.
#[must_use]
pub fn policy_for(table: &str) -> Option<&'static TablePolicy> {
    TABLE_POLICIES.iter().find(|p| p.table == table)
}

/// Looks up a table and checks that `op` is permitted on it.
///
/// # Errors
///
/// Returns [`PolicyError::UnknownTable`] when the table is not registered and
/// [`PolicyError::OperationNotAllowed`] when the operation is disabled for it.
pub fn policy_for_op(table: &str, op: TableOp) -> Result<&'static TablePolicy, PolicyError> {
    let policy = policy_for(table).ok_or_else(|| PolicyError::UnknownTable(table.to_string()))?;
    if !policy.allows(op) {
        return Err(PolicyError::OperationNotAllowed {
            table: table.to_string(),
            op,
        });
    }
    Ok(policy)
}

impl TablePolicy {
    #[must_use]
    pub fn allows(&self, op: TableOp) -> bool {
        self.ops.contains(&op)
    }

    #[must_use]
    pub fn updatable_column(&self, name: &str) -> Option<&'static ColumnSpec> {
        self.updatable.iter().find(|c| c.name == name)
    }

    /// Keeps only the allow-listed columns of `values`, in request order.
    /// Unknown keys are dropped silently.
    #[must_use]
    pub fn filter_updates(&self, values: &Map<String, Value>) -> Vec<(&'static ColumnSpec, Value)> {
        values
            .iter()
            .filter_map(|(key, value)| {
                self.updatable_column(key)
                    .map(|column| (column, value.clone()))
            })
            .collect()
    }

    /// Returns the requested sort column when it is sortable, else the default.
    #[must_use]
    pub fn sort_column(&self, requested: Option<&str>) -> &'static str {
        requested
            .and_then(|r| self.sortable.iter().find(|c| **c == r).copied())
            .unwrap_or(self.default_sort)
    }
}

/// Renders a JSON value as the text form bound into a `$n::text::<type>` cast.
///
/// `null` becomes SQL `NULL`; nested arrays and objects are sent as JSON text.
#[must_use]
pub fn value_as_sql_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_table_has_a_sortable_default() {
        for policy in &TABLE_POLICIES {
            assert!(
                policy.sortable.contains(&policy.default_sort),
                "{} default sort must be sortable",
                policy.table
            );
        }
    }

    #[test]
    fn unknown_table_is_rejected() {
        let err = policy_for_op("pg_authid", TableOp::Delete).unwrap_err();
        assert_eq!(err, PolicyError::UnknownTable("pg_authid".to_string()));
    }

    #[test]
    fn api_table_cannot_be_truncated() {
        let err = policy_for_op("api", TableOp::Truncate).unwrap_err();
        assert!(matches!(err, PolicyError::OperationNotAllowed { op: TableOp::Truncate, .. }));
        assert!(policy_for_op("api", TableOp::Update).is_ok());
    }

    #[test]
    fn filter_updates_drops_unknown_columns() {
        let policy = policy_for("api").unwrap();
        let values = json!({ "name": "x", "forbidden_field": "y" });
        let kept = policy.filter_updates(values.as_object().unwrap());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0.name, "name");
        assert_eq!(kept[0].1, json!("x"));
    }

    #[test]
    fn api_default_flag_is_not_admin_updatable() {
        // One default per provider is kept by the credentials default route.
        let policy = policy_for("api").unwrap();
        let values = json!({ "is_default": true, "provider": "gemini", "usage_count": 0 });
        assert!(policy.filter_updates(values.as_object().unwrap()).is_empty());
    }

    #[test]
    fn filter_updates_never_admits_primary_key_or_timestamps() {
        let policy = policy_for("ep_data").unwrap();
        let values = json!({ "id": "a", "created_at": "2025-01-01", "updated_at": "2025-01-01" });
        assert!(policy.filter_updates(values.as_object().unwrap()).is_empty());
    }

    #[test]
    fn sort_column_falls_back_to_default() {
        let policy = policy_for("ep_data").unwrap();
        assert_eq!(policy.sort_column(Some("title")), "title");
        assert_eq!(policy.sort_column(Some("title; DROP TABLE ep_data")), "created_at");
        assert_eq!(policy.sort_column(None), "created_at");
    }

    #[test]
    fn value_as_sql_text_covers_json_shapes() {
        assert_eq!(value_as_sql_text(&json!(null)), None);
        assert_eq!(value_as_sql_text(&json!("a")), Some("a".to_string()));
        assert_eq!(value_as_sql_text(&json!(true)), Some("true".to_string()));
        assert_eq!(value_as_sql_text(&json!(12000)), Some("12000".to_string()));
        assert_eq!(value_as_sql_text(&json!({"k": 1})), Some("{\"k\":1}".to_string()));
    }
}

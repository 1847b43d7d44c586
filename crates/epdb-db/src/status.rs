use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::credentials::{mask_key, CredentialRow};
use crate::DbError;

const RECENT_PRODUCTS: i64 = 10;
const RECENT_DELETED: i64 = 10;
const RECENT_CREDENTIALS: i64 = 5;

/// Keyed by table name, as the status page expects.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecentActivity {
    pub ep_data: Vec<Value>,
    pub deleted_items: Vec<Value>,
    pub api: Vec<Value>,
}

/// Newest rows of the main tables for the status page. Credential keys are
/// masked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any query fails.
pub async fn recent_activity(pool: &PgPool) -> Result<RecentActivity, DbError> {
    let ep_data = sqlx::query_scalar::<_, Value>(
        "SELECT row_to_json(e) FROM ep_data e ORDER BY e.created_at DESC LIMIT $1",
    )
    .bind(RECENT_PRODUCTS)
    .fetch_all(pool)
    .await?;

    let deleted_items = sqlx::query_scalar::<_, Value>(
        "SELECT row_to_json(d) FROM deleted_items d ORDER BY d.created_at DESC LIMIT $1",
    )
    .bind(RECENT_DELETED)
    .fetch_all(pool)
    .await?;

    let credentials = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, provider, name, description, api_key, is_active, is_default, \
                usage_count, last_used_at, created_at, updated_at \
         FROM api ORDER BY created_at DESC LIMIT $1",
    )
    .bind(RECENT_CREDENTIALS)
    .fetch_all(pool)
    .await?;

    let api = credentials
        .into_iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id,
                "provider": c.provider,
                "name": c.name,
                "apiKey": mask_key(&c.api_key),
                "isActive": c.is_active,
                "isDefault": c.is_default,
                "usageCount": c.usage_count,
                "lastUsedAt": c.last_used_at,
                "createdAt": c.created_at,
            })
        })
        .collect();

    Ok(RecentActivity {
        ep_data,
        deleted_items,
        api,
    })
}

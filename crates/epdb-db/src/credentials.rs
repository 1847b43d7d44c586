//! Database operations for `api`, the stored text-generation provider keys.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `api` table.
#[derive(Clone, sqlx::FromRow)]
pub struct CredentialRow {
    pub id: i64,
    pub provider: String,
    pub name: String,
    pub description: Option<String>,
    pub api_key: String,
    pub is_active: bool,
    pub is_default: bool,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for CredentialRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRow")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("api_key", &"[redacted]")
            .field("is_active", &self.is_active)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

impl CredentialRow {
    /// Key with all but the first and last four characters hidden.
    #[must_use]
    pub fn masked_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

#[must_use]
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

#[derive(Debug, Clone)]
pub struct NewCredential<'a> {
    pub provider: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub api_key: &'a str,
}

/// Sparse update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
}

const CREDENTIAL_COLUMNS: &str = "id, provider, name, description, api_key, is_active, is_default, \
                                  usage_count, last_used_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_credentials(pool: &PgPool) -> Result<Vec<CredentialRow>, DbError> {
    let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM api ORDER BY provider, created_at DESC");
    let rows = sqlx::query_as::<_, CredentialRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`].
pub async fn get_credential(pool: &PgPool, id: i64) -> Result<CredentialRow, DbError> {
    let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM api WHERE id = $1");
    sqlx::query_as::<_, CredentialRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// The active default credential for `provider`, falling back to the most
/// recently created active one when none is flagged default.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_default_credential(
    pool: &PgPool,
    provider: &str,
) -> Result<Option<CredentialRow>, DbError> {
    let sql = format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM api \
         WHERE provider = $1 AND is_active \
         ORDER BY is_default DESC, created_at DESC \
         LIMIT 1"
    );
    let row = sqlx::query_as::<_, CredentialRow>(&sql)
        .bind(provider)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Creates an active, non-default credential.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including an unknown
/// provider rejected by the table's check constraint).
pub async fn create_credential(
    pool: &PgPool,
    new: &NewCredential<'_>,
) -> Result<CredentialRow, DbError> {
    let sql = format!(
        "INSERT INTO api (provider, name, description, api_key) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {CREDENTIAL_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CredentialRow>(&sql)
        .bind(new.provider)
        .bind(new.name)
        .bind(new.description)
        .bind(new.api_key)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`].
pub async fn update_credential(
    pool: &PgPool,
    id: i64,
    patch: &CredentialPatch,
) -> Result<CredentialRow, DbError> {
    let sql = format!(
        "UPDATE api SET \
             name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             api_key = COALESCE($4, api_key), \
             is_active = COALESCE($5, is_active), \
             is_default = CASE WHEN $5 = false THEN false ELSE is_default END \
         WHERE id = $1 \
         RETURNING {CREDENTIAL_COLUMNS}"
    );
    sqlx::query_as::<_, CredentialRow>(&sql)
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.api_key.as_deref())
        .bind(patch.is_active)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`].
pub async fn delete_credential(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM api WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Makes `id` the only default credential of its provider.
///
/// Clearing the provider's other defaults and setting this one happen in a
/// single transaction. Inactive credentials are reactivated.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`].
pub async fn set_default_credential(pool: &PgPool, id: i64) -> Result<CredentialRow, DbError> {
    let mut tx = pool.begin().await?;

    let provider = sqlx::query_scalar::<_, String>("SELECT provider FROM api WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

    sqlx::query("UPDATE api SET is_default = false WHERE provider = $1 AND id <> $2 AND is_default")
        .bind(&provider)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let sql = format!(
        "UPDATE api SET is_default = true, is_active = true WHERE id = $1 \
         RETURNING {CREDENTIAL_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CredentialRow>(&sql)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(row)
}

/// Bumps `usage_count` and stamps `last_used_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_credential_usage(pool: &PgPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE api SET usage_count = usage_count + 1, last_used_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

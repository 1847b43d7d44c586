use serde::Serialize;
use sqlx::PgPool;

use crate::{escape_like, DbError};

/// Where a candidate title already appears, if anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleDuplicateRow {
    pub title: String,
    pub found_in_ep_data: bool,
    pub found_in_delete: bool,
    pub ep_data_id: Option<String>,
    pub delete_id: Option<i64>,
}

/// Looks for `title` as a case-insensitive substring of active titles and of
/// backed-up snapshot titles. Exact matches win over partial ones. `%` and `_`
/// in `title` match literally.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either lookup fails.
pub async fn find_title_duplicates(
    pool: &PgPool,
    title: &str,
) -> Result<TitleDuplicateRow, DbError> {
    let title = title.trim();
    let pattern = escape_like(title);

    let ep_data_id = sqlx::query_scalar::<_, String>(
        "SELECT id FROM ep_data \
         WHERE title ILIKE $2 ESCAPE '\\' \
         ORDER BY (lower(title) = lower($1)) DESC, created_at DESC \
         LIMIT 1",
    )
    .bind(title)
    .bind(&pattern)
    .fetch_optional(pool)
    .await?;

    let delete_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM deleted_items \
         WHERE original_data ->> 'title' ILIKE $2 ESCAPE '\\' \
         ORDER BY (lower(original_data ->> 'title') = lower($1)) DESC, created_at DESC \
         LIMIT 1",
    )
    .bind(title)
    .bind(&pattern)
    .fetch_optional(pool)
    .await?;

    Ok(TitleDuplicateRow {
        title: title.to_string(),
        found_in_ep_data: ep_data_id.is_some(),
        found_in_delete: delete_id.is_some(),
        ep_data_id,
        delete_id,
    })
}

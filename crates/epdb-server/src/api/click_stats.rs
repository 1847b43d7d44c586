use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use epdb_core::catalog::value_as_text;
use epdb_core::reconcile::ZERO_CLICK_REASON;
use epdb_core::{parse_click_stats, MoveOutcome, MovedItem, ParsedClickStats, ReconcileSummary};
use epdb_db::ZeroClickPreview;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::upload::read_upload;
use super::{map_db_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct MoveRequest {
    pub items: Vec<MoveItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MoveItem {
    pub product_id: Option<Value>,
    pub product_name: Option<Value>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MoveResponse {
    pub moved_count: usize,
    pub total_items: usize,
    pub moved_items: Vec<MovedItem>,
    pub not_found_ids: Vec<String>,
    pub failed_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Parses an uploaded click statistics file and moves every zero-click
/// product into the backup table.
pub(super) async fn reconcile_upload(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ReconcileSummary>>, ApiError> {
    let parsed = read_click_stats(&req_id.0, multipart).await?;
    let summary = epdb_db::reconcile_zero_clicks(&state.pool, &parsed).await;

    if !summary.is_balanced() {
        tracing::warn!(?summary, "reconciliation tally does not add up");
    }
    Ok(Json(ApiResponse::new(req_id.0, summary)))
}

pub(super) async fn preview_upload(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ZeroClickPreview>>, ApiError> {
    let parsed = read_click_stats(&req_id.0, multipart).await?;
    let preview = epdb_db::preview_zero_clicks(&state.pool, &parsed)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, preview)))
}

/// Moves client-selected zero-click items. Items lacking an id or a name are
/// skipped.
pub(super) async fn move_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<MoveRequest>,
) -> Result<Json<ApiResponse<MoveResponse>>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::validation(req_id.0, "items must not be empty"));
    }

    let ids: Vec<String> = body
        .items
        .iter()
        .filter_map(|item| {
            let id = item.product_id.as_ref().and_then(value_as_text)?;
            let name = item.product_name.as_ref().and_then(value_as_text)?;
            (!id.is_empty() && !name.is_empty()).then_some(id)
        })
        .collect();
    let skipped = body.items.len() - ids.len();
    if skipped > 0 {
        tracing::debug!(skipped, "skipping items without product id or name");
    }

    let mut response = MoveResponse {
        total_items: body.items.len(),
        ..MoveResponse::default()
    };
    for (product_id, outcome) in
        epdb_db::move_zero_click_items(&state.pool, &ids, ZERO_CLICK_REASON).await
    {
        match outcome {
            MoveOutcome::Moved { backup_id, title } => response.moved_items.push(MovedItem {
                product_id,
                title,
                backup_id,
            }),
            MoveOutcome::NotFound => response.not_found_ids.push(product_id),
            MoveOutcome::Failed(_) => response.failed_ids.push(product_id),
        }
    }
    response.moved_count = response.moved_items.len();

    Ok(Json(ApiResponse::new(req_id.0, response)))
}

// ---------------------------------------------------------------------------
// Upload helpers
// ---------------------------------------------------------------------------

async fn read_click_stats(
    request_id: &str,
    multipart: Multipart,
) -> Result<ParsedClickStats, ApiError> {
    let bytes = read_upload(request_id, multipart).await?;
    let parsed =
        parse_click_stats(&bytes).map_err(|e| ApiError::validation(request_id, e.to_string()))?;
    tracing::info!(
        rows = parsed.rows.len(),
        invalid = parsed.invalid_rows,
        skipped = parsed.skipped_rows,
        "parsed click statistics upload"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{json_request, multipart_request, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    async fn insert_product(pool: &sqlx::PgPool, id: &str, original_id: Option<&str>, title: &str) {
        sqlx::query("INSERT INTO ep_data (id, original_id, title) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(original_id)
            .bind(title)
            .execute(pool)
            .await
            .expect("insert product");
    }

    async fn active_count(pool: &sqlx::PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM ep_data")
            .fetch_one(pool)
            .await
            .expect("count")
    }

    const CSV: &str = "상품ID,상품명,노출수,클릭수\n\
                       EP-1,오사카 투어,1200,0\n\
                       EP-2,방콕 투어,800,14\n\
                       LEGACY-3,다낭 투어,90,0\n\
                       GHOST,없는 상품,10,0\n";

    #[sqlx::test(migrations = "../../migrations")]
    async fn reconcile_moves_zero_click_rows(pool: sqlx::PgPool) {
        insert_product(&pool, "EP-1", None, "오사카 투어").await;
        insert_product(&pool, "EP-2", None, "방콕 투어").await;
        insert_product(&pool, "EP-3", Some("LEGACY-3"), "다낭 투어").await;

        let (status, json) = send(
            test_app(pool.clone()),
            multipart_request("/api/v1/click-stats/reconcile", "stats.csv", CSV.as_bytes()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["totalCsvItems"], 4);
        assert_eq!(data["zeroClickItems"], 3);
        assert_eq!(data["movedToDelect"], 2);
        assert_eq!(data["notFoundInEpData"], 1);
        assert_eq!(data["totalMovedToDelect"], 3);
        assert_eq!(data["notFoundIds"], json!(["GHOST"]));
        assert_eq!(active_count(&pool).await, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn preview_reports_matches_without_moving(pool: sqlx::PgPool) {
        insert_product(&pool, "EP-1", None, "오사카 투어").await;

        let (status, json) = send(
            test_app(pool.clone()),
            multipart_request("/api/v1/click-stats/preview", "stats.csv", CSV.as_bytes()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["matched"][0]["epDataId"], "EP-1");
        assert_eq!(active_count(&pool).await, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn upload_without_click_column_is_a_validation_error(pool: sqlx::PgPool) {
        let (status, json) = send(
            test_app(pool),
            multipart_request(
                "/api/v1/click-stats/reconcile",
                "stats.csv",
                "상품ID,상품명\nEP-1,투어\n".as_bytes(),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "validation_error");
        assert!(json["error"].as_str().unwrap_or_default().contains("clicks"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn move_skips_items_missing_id_or_name(pool: sqlx::PgPool) {
        insert_product(&pool, "EP-1", None, "오사카 투어").await;
        insert_product(&pool, "EP-2", None, "방콕 투어").await;

        let body = json!({
            "items": [
                { "productId": "EP-1", "productName": "오사카 투어" },
                { "productId": "EP-2" },
                { "productName": "이름만" },
                { "productId": "NOPE", "productName": "없음" }
            ]
        });
        let (status, json) = send(
            test_app(pool.clone()),
            json_request("POST", "/api/v1/click-stats/move", &body),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["movedCount"], 1);
        assert_eq!(json["data"]["totalItems"], 4);
        assert_eq!(json["data"]["movedItems"][0]["productId"], "EP-1");
        assert_eq!(json["data"]["notFoundIds"], json!(["NOPE"]));
        assert_eq!(active_count(&pool).await, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn move_with_no_items_is_rejected(pool: sqlx::PgPool) {
        let (status, json) = send(
            test_app(pool),
            json_request("POST", "/api/v1/click-stats/move", &json!({ "items": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "validation_error");
    }
}

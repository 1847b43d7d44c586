//! Merchant EP spreadsheet uploads: compare against the catalog, or import.

use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use epdb_core::{compare_sheet, normalize_sheet_rows, prepare_import_rows, HeaderStyle, SheetDiff};
use serde::Serialize;
use serde_json::{Map, Value};

use super::upload::read_upload;
use super::{map_db_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ImportResponse {
    pub imported: u64,
    pub skipped: usize,
}

/// Splits an uploaded EP sheet into rows to add, rows already stored, and
/// stored products the sheet no longer lists. Nothing is written.
pub(super) async fn diff_upload(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SheetDiff>>, ApiError> {
    let rows = read_sheet(&req_id.0, multipart).await?;
    let sheet = normalize_sheet_rows(rows, HeaderStyle::Diff);
    let existing = epdb_db::list_product_keys(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let diff = compare_sheet(sheet, existing);
    tracing::info!(
        sheet_rows = diff.excel_count,
        stored = diff.db_count,
        to_add = diff.items_to_add.len(),
        to_remove = diff.items_to_remove.len(),
        unchanged = diff.unchanged_items.len(),
        "compared EP sheet with catalog"
    );
    Ok(Json(ApiResponse::new(req_id.0, diff)))
}

/// Upserts an uploaded EP sheet into the catalog by `id`.
pub(super) async fn import_upload(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ImportResponse>>, ApiError> {
    let rows = read_sheet(&req_id.0, multipart).await?;
    if rows.is_empty() {
        return Err(ApiError::validation(req_id.0, "sheet has no data rows"));
    }

    let batch = prepare_import_rows(normalize_sheet_rows(rows, HeaderStyle::Import));
    if batch.rows.is_empty() {
        return Err(ApiError::validation(
            req_id.0,
            "no row has both a product id and a title",
        ));
    }

    let imported = epdb_db::upsert_products(&state.pool, &batch.rows)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(imported, skipped = batch.skipped, "imported EP sheet");

    Ok(Json(ApiResponse::new(
        req_id.0,
        ImportResponse {
            imported,
            skipped: batch.skipped,
        },
    )))
}

async fn read_sheet(
    request_id: &str,
    multipart: Multipart,
) -> Result<Vec<Map<String, Value>>, ApiError> {
    let bytes = read_upload(request_id, multipart).await?;
    epdb_export::read_first_sheet(&bytes)
        .map_err(|e| ApiError::validation(request_id, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{multipart_request, send, test_app};
    use axum::http::StatusCode;
    use epdb_export::{render_workbook, Sheet};
    use serde_json::{json, Map, Value};

    fn xlsx(rows: Value) -> Vec<u8> {
        let records: Vec<Map<String, Value>> = rows
            .as_array()
            .expect("array")
            .iter()
            .map(|v| v.as_object().cloned().expect("object"))
            .collect();
        render_workbook(&[Sheet {
            name: "EP",
            records: &records,
        }])
        .expect("render workbook")
    }

    async fn insert_product(pool: &sqlx::PgPool, id: &str, original_id: &str, title: &str) {
        sqlx::query("INSERT INTO ep_data (id, original_id, title) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(original_id)
            .bind(title)
            .execute(pool)
            .await
            .expect("insert product");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn diff_matches_by_title_then_code(pool: sqlx::PgPool) {
        insert_product(&pool, "uuid-1", "20250101_A12_Osaka_0001", "오사카 성 투어").await;
        insert_product(&pool, "uuid-2", "20250101_A12_Seoul_0002", "서울 야경").await;
        insert_product(&pool, "uuid-3", "20250101_A12_Busan_0003", "부산 바다").await;

        let bytes = xlsx(json!([
            { "상품ID": "OTHER-CODE", "상품명": "오사카 성 투어!" },
            { "상품ID": "20250101_a12_SEOUL__0002", "상품명": "서울 야경 (개정)" },
            { "상품ID": "20250301_A12_Guam_0001", "상품명": "괌 스노클링" }
        ]));
        let (status, json) = send(
            test_app(pool),
            multipart_request("/api/v1/products/diff", "ep.xlsx", &bytes),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["excelCount"], 3);
        assert_eq!(data["dbCount"], 3);
        assert_eq!(data["unchangedItems"].as_array().expect("unchanged").len(), 2);
        assert_eq!(data["itemsToAdd"][0]["id"], "20250301_A12_Guam_0001");
        assert_eq!(data["whyToAdd"][0]["titleMatch"], false);
        assert_eq!(data["itemsToRemove"][0]["id"], "uuid-3");
        assert_eq!(data["itemsToRemove"].as_array().expect("remove").len(), 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn diff_rejects_non_workbook_upload(pool: sqlx::PgPool) {
        let (status, json) = send(
            test_app(pool),
            multipart_request("/api/v1/products/diff", "ep.csv", b"id,title\nEP-1,x\n"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn import_upserts_rows_through_korean_headers(pool: sqlx::PgPool) {
        insert_product(&pool, "EP-1", "EP-1", "예전 제목").await;

        let bytes = xlsx(json!([
            { "상품ID": "EP-1", "상품명": "새 제목", "PC가격": "45,000", "도시": "Osaka" },
            { "상품ID": "EP-2", "상품명": "방콕 투어", "PC가격": 30000, "도시": "Bangkok" },
            { "상품ID": null, "상품명": "아이디 없음", "PC가격": null, "도시": null }
        ]));
        let (status, json) = send(
            test_app(pool.clone()),
            multipart_request("/api/v1/admin/import-ep", "ep.xlsx", &bytes),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["imported"], 2);
        assert_eq!(json["data"]["skipped"], 1);

        let rows: Vec<(String, String, Option<i64>, Option<String>)> = sqlx::query_as(
            "SELECT id, title, price_pc, city FROM ep_data ORDER BY id",
        )
        .fetch_all(&pool)
        .await
        .expect("rows");
        assert_eq!(
            rows,
            vec![
                (
                    "EP-1".to_string(),
                    "새 제목".to_string(),
                    Some(45000),
                    Some("Osaka".to_string())
                ),
                (
                    "EP-2".to_string(),
                    "방콕 투어".to_string(),
                    Some(30000),
                    Some("Bangkok".to_string())
                ),
            ]
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn import_without_usable_rows_is_rejected(pool: sqlx::PgPool) {
        let bytes = xlsx(json!([{ "상품명": "아이디 없음" }]));
        let (status, json) = send(
            test_app(pool),
            multipart_request("/api/v1/admin/import-ep", "ep.xlsx", &bytes),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "validation_error");
    }
}

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use epdb_export::{attachment_disposition, render_workbook, Sheet, XLSX_CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{into_records, map_db_error, ApiError, AppState};
use crate::middleware::RequestId;

const ALL_DATA_FILENAME: &str = "ep_data_export.xlsx";
const REMOVED_FILENAME: &str = "removed_items.xlsx";

#[derive(Debug, Deserialize)]
pub(super) struct ExportRequest {
    #[serde(default)]
    pub items: Vec<Value>,
}

type Records = Vec<Map<String, Value>>;

/// Downloads the whole catalog: active rows and flattened backups.
pub(super) async fn export_all(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let active: Records = epdb_db::list_products_json(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    let deleted: Records = epdb_db::list_deleted_items(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .iter()
        .map(epdb_db::DeletedItemRow::flatten)
        .collect();

    tracing::info!(
        active = active.len(),
        deleted = deleted.len(),
        "exporting catalog"
    );
    workbook_response(
        &req_id.0,
        vec![("EP_Data", active), ("Deleted_Data", deleted)],
        ALL_DATA_FILENAME,
    )
    .await
}

/// Downloads the submitted records as a single sheet.
pub(super) async fn export_items(
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let records = into_records(&req_id.0, body.items)?;
    workbook_response(&req_id.0, vec![("Removed_Data", records)], REMOVED_FILENAME).await
}

async fn workbook_response(
    request_id: &str,
    sheets: Vec<(&'static str, Records)>,
    filename: &'static str,
) -> Result<Response, ApiError> {
    let rendered = tokio::task::spawn_blocking(move || {
        let sheets: Vec<Sheet<'_>> = sheets
            .iter()
            .map(|(name, records)| Sheet { name, records })
            .collect();
        render_workbook(&sheets)
    })
    .await;

    let bytes = match rendered {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            tracing::error!(error = %e, filename, "workbook rendering failed");
            return Err(ApiError::new(
                request_id,
                "internal_error",
                "export failed",
            ));
        }
        Err(e) => {
            tracing::error!(error = %e, filename, "workbook task panicked");
            return Err(ApiError::new(
                request_id,
                "internal_error",
                "export failed",
            ));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(filename)),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{get_request, json_request, test_app};
    use axum::body::to_bytes;
    use axum::http::{header, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[sqlx::test(migrations = "../../migrations")]
    async fn export_items_returns_xlsx_attachment(pool: sqlx::PgPool) {
        let body = json!({ "items": [ { "id": "EP-1", "title": "오사카", "price_pc": 1000 } ] });
        let response = test_app(pool)
            .oneshot(json_request("POST", "/api/v1/export", &body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"removed_items.xlsx\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(bytes.starts_with(b"PK"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn export_all_works_on_an_empty_catalog(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(get_request("/api/v1/export/all"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"ep_data_export.xlsx\""
        );
    }
}

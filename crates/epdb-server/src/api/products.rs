use axum::{extract::State, Extension, Json};
use epdb_core::reconcile::EP_PROCESSING_REASON;
use epdb_db::DeletedItemRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{into_records, map_db_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct ItemsRequest {
    pub items: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BackupDeleteResponse {
    pub message: String,
    pub backup_data: Vec<DeletedItemRow>,
}

/// Inserts regenerated products in one all-or-nothing statement.
pub(super) async fn bulk_insert(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ItemsRequest>,
) -> Result<Json<ApiResponse<Vec<Value>>>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::validation(req_id.0, "items must not be empty"));
    }
    let records = into_records(&req_id.0, body.items)?;

    let rows = epdb_db::insert_products(&state.pool, records)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, rows)))
}

/// Snapshots the submitted rows into the backup table and removes them from
/// the active catalog in one transaction.
pub(super) async fn backup_delete(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ItemsRequest>,
) -> Result<Json<ApiResponse<BackupDeleteResponse>>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::validation(req_id.0, "items must not be empty"));
    }
    let records = into_records(&req_id.0, body.items)?;

    let backups = epdb_db::backup_and_delete(&state.pool, &records, EP_PROCESSING_REASON)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        BackupDeleteResponse {
            message: format!("{} items backed up and deleted", backups.len()),
            backup_data: backups,
        },
    )))
}

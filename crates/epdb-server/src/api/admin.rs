//! Allow-listed table maintenance: update, delete, truncate, browse, counts.
//!
//! Every handler resolves its table through the policy registry first, so an
//! unknown table or a disabled operation never reaches the store.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use epdb_core::catalog::value_as_text;
use epdb_core::{policy_for_op, TableOp, TablePolicy};
use epdb_db::{BrowseQuery, RowPage, SortOrder, TruncateMethod};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{map_db_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

const DEFAULT_PAGE_SIZE: u32 = 50;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct UpdateRowRequest {
    pub table: String,
    /// String or number, depending on the table's key type.
    pub id: Value,
    pub values: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteRowsRequest {
    pub table: String,
    pub ids: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeleteRowsResponse {
    pub deleted_count: usize,
    pub matched_count: u64,
}

#[derive(Debug, Deserialize)]
pub(super) struct TruncateRequest {
    pub table: String,
}

#[derive(Debug, Serialize)]
pub(super) struct TruncateResponse {
    pub success: bool,
    pub table: &'static str,
    pub method: TruncateMethod,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BrowseParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    #[serde(alias = "sort_by")]
    pub sort_by: Option<String>,
    #[serde(alias = "sort_order")]
    pub sort_order: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_policy(
    request_id: &str,
    table: &str,
    op: TableOp,
) -> Result<&'static TablePolicy, ApiError> {
    policy_for_op(table, op).map_err(|e| ApiError::validation(request_id, e.to_string()))
}

fn id_text(request_id: &str, id: &Value) -> Result<String, ApiError> {
    value_as_text(id)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation(request_id, "id must be a non-empty string or number"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(super) async fn update_row(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<UpdateRowRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let policy = resolve_policy(&req_id.0, &body.table, TableOp::Update)?;
    let id = id_text(&req_id.0, &body.id)?;

    let updates = policy.filter_updates(&body.values);
    if updates.is_empty() {
        return Err(ApiError::validation(
            req_id.0,
            format!("no updatable columns for table '{}' in values", policy.table),
        ));
    }
    let dropped = body.values.len() - updates.len();
    if dropped > 0 {
        tracing::debug!(table = policy.table, dropped, "ignoring non-updatable keys");
    }

    let row = epdb_db::update_row(&state.pool, policy, &id, &updates)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, row)))
}

pub(super) async fn delete_rows(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<DeleteRowsRequest>,
) -> Result<Json<ApiResponse<DeleteRowsResponse>>, ApiError> {
    let policy = resolve_policy(&req_id.0, &body.table, TableOp::Delete)?;
    if body.ids.is_empty() {
        return Err(ApiError::validation(req_id.0, "ids must not be empty"));
    }
    let ids = body
        .ids
        .iter()
        .map(|id| id_text(&req_id.0, id))
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = epdb_db::delete_rows(&state.pool, policy, &ids)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(
        req_id.0,
        DeleteRowsResponse {
            deleted_count: outcome.requested,
            matched_count: outcome.matched,
        },
    )))
}

pub(super) async fn truncate_table(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TruncateRequest>,
) -> Result<Json<ApiResponse<TruncateResponse>>, ApiError> {
    let policy = resolve_policy(&req_id.0, &body.table, TableOp::Truncate)?;
    let method = epdb_db::truncate_table(&state.pool, policy)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(
        req_id.0,
        TruncateResponse {
            success: true,
            table: policy.table,
            method,
        },
    )))
}

pub(super) async fn browse_rows(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(table): Path<String>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<ApiResponse<RowPage>>, ApiError> {
    let policy = resolve_policy(&req_id.0, &table, TableOp::Browse)?;
    let query = BrowseQuery {
        page: params.page.unwrap_or(1),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        search: params.search,
        sort_by: params.sort_by,
        sort_order: SortOrder::parse(params.sort_order.as_deref()),
    };
    let page = epdb_db::browse_rows(&state.pool, policy, &query)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, page)))
}

pub(super) async fn table_counts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Map<String, Value>>>, ApiError> {
    let counts = epdb_db::table_counts(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, counts_map(counts))))
}

pub(super) fn counts_map(counts: Vec<epdb_db::TableCount>) -> Map<String, Value> {
    counts
        .into_iter()
        .map(|c| (c.table.to_string(), Value::from(c.count)))
        .collect()
}

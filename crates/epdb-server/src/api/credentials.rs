use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use epdb_db::{CredentialPatch, CredentialRow, NewCredential};
use epdb_titlegen::Provider;
use serde::{Deserialize, Serialize};

use super::{map_db_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

const PROVIDERS: [Provider; 2] = [Provider::OpenAi, Provider::Gemini];

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A stored credential as returned to clients; the key is always masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CredentialView {
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

impl From<CredentialRow> for CredentialView {
    fn from(row: CredentialRow) -> Self {
        Self {
            api_key: row.masked_key(),
            id: row.id,
            provider: row.provider,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            is_default: row.is_default,
            usage_count: row.usage_count,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateCredentialRequest {
    pub provider: String,
    pub name: String,
    pub description: Option<String>,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateCredentialRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(super) struct DeletedCredential {
    pub id: i64,
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(super) async fn list_credentials(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<CredentialView>>>, ApiError> {
    let rows = epdb_db::list_credentials(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let data = rows.into_iter().map(CredentialView::from).collect();
    Ok(Json(ApiResponse::new(req_id.0, data)))
}

pub(super) async fn create_credential(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateCredentialRequest>,
) -> Result<Json<ApiResponse<CredentialView>>, ApiError> {
    let provider = body.provider.trim().to_ascii_lowercase();
    if !PROVIDERS.iter().any(|p| p.as_str() == provider) {
        return Err(ApiError::validation(
            req_id.0,
            "provider must be 'openai' or 'gemini'",
        ));
    }
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation(req_id.0, "name is required"));
    }
    let api_key = body.api_key.trim();
    if api_key.is_empty() {
        return Err(ApiError::validation(req_id.0, "apiKey is required"));
    }

    let row = epdb_db::create_credential(
        &state.pool,
        &NewCredential {
            provider: &provider,
            name,
            description: body.description.as_deref().map(str::trim),
            api_key,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(id = row.id, %provider, "created credential");
    Ok(Json(ApiResponse::new(req_id.0, row.into())))
}

pub(super) async fn update_credential(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCredentialRequest>,
) -> Result<Json<ApiResponse<CredentialView>>, ApiError> {
    let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string());
    let patch = CredentialPatch {
        name: trimmed(body.name),
        description: trimmed(body.description),
        api_key: trimmed(body.api_key),
        is_active: body.is_active,
    };
    if patch.name.as_deref() == Some("") || patch.api_key.as_deref() == Some("") {
        return Err(ApiError::validation(
            req_id.0,
            "name and apiKey cannot be blank",
        ));
    }

    let row = epdb_db::update_credential(&state.pool, id, &patch)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, row.into())))
}

pub(super) async fn delete_credential(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DeletedCredential>>, ApiError> {
    epdb_db::delete_credential(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(id, "deleted credential");
    Ok(Json(ApiResponse::new(
        req_id.0,
        DeletedCredential { id, deleted: true },
    )))
}

pub(super) async fn set_default_credential(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CredentialView>>, ApiError> {
    let row = epdb_db::set_default_credential(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(id, provider = %row.provider, "set default credential");
    Ok(Json(ApiResponse::new(req_id.0, row.into())))
}

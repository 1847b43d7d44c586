use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use epdb_db::{CredentialRow, DbError, RecentActivity};
use epdb_titlegen::Provider;
use serde::Serialize;
use serde_json::{Map, Value};

use super::admin::counts_map;
use super::{ApiResponse, AppState, GenerationDefaults, DATABASE_UNAVAILABLE};
use crate::middleware::RequestId;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SystemStatus {
    pub connection_status: &'static str,
    pub database: &'static str,
    pub ai_service: AiServiceStatus,
    pub table_counts: Map<String, Value>,
    pub recent_data: RecentActivity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AiServiceStatus {
    pub default_model: String,
    pub openai: ProviderStatus,
    pub gemini: ProviderStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProviderStatus {
    pub configured: bool,
    pub active_credentials: usize,
    pub environment_key: bool,
}

impl AiServiceStatus {
    fn new(defaults: &GenerationDefaults, credentials: &[CredentialRow]) -> Self {
        let provider_status = |provider: Provider| {
            let active_credentials = credentials
                .iter()
                .filter(|c| c.is_active && c.provider == provider.as_str())
                .count();
            let environment_key = defaults.env_key(provider).is_some();
            ProviderStatus {
                configured: active_credentials > 0 || environment_key,
                active_credentials,
                environment_key,
            }
        };
        Self {
            default_model: defaults.model.clone(),
            openai: provider_status(Provider::OpenAi),
            gemini: provider_status(Provider::Gemini),
        }
    }
}

/// Database connectivity, provider key availability, table sizes, and the
/// newest rows. A database failure answers 503 with what is still known.
pub(super) async fn system_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match load_status(&state).await {
        Ok(status) => (StatusCode::OK, Json(ApiResponse::new(req_id.0, status))),
        Err(e) => {
            tracing::warn!(error = %e, "status: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::degraded(
                    req_id.0,
                    DATABASE_UNAVAILABLE,
                    SystemStatus {
                        connection_status: "error",
                        database: "unavailable",
                        ai_service: AiServiceStatus::new(&state.generation, &[]),
                        table_counts: Map::new(),
                        recent_data: RecentActivity::default(),
                    },
                )),
            )
        }
    }
}

async fn load_status(state: &AppState) -> Result<SystemStatus, DbError> {
    let counts = epdb_db::table_counts(&state.pool).await?;
    let recent = epdb_db::recent_activity(&state.pool).await?;
    let credentials = epdb_db::list_credentials(&state.pool).await?;

    Ok(SystemStatus {
        connection_status: "connected",
        database: "ok",
        ai_service: AiServiceStatus::new(&state.generation, &credentials),
        table_counts: counts_map(counts),
        recent_data: recent,
    })
}

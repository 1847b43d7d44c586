mod admin;
mod click_stats;
mod credentials;
mod ep_sheet;
mod export;
mod generation;
mod products;
mod replacements;
mod status;
mod titles;
mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use epdb_core::AppConfig;
use epdb_titlegen::{TitleClient, TitleGenError};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, envelope_rejections, request_id, require_bearer_auth, AuthState,
    RateLimitState, RequestId,
};

pub use generation::GenerationDefaults;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub titles: TitleClient,
    pub generation: GenerationDefaults,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Builds the shared state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TitleGenError`] if the provider HTTP client cannot be built
    /// or a configured base URL does not parse.
    pub fn from_config(pool: PgPool, config: &AppConfig) -> Result<Self, TitleGenError> {
        let titles = TitleClient::with_base_urls(
            config.title_timeout_secs,
            &config.openai_base_url,
            &config.gemini_base_url,
        )?;
        Ok(Self {
            pool,
            titles,
            generation: GenerationDefaults::from_config(config),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    /// Set only on degraded answers that still carry a body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Failure envelope: `{success: false, error, code, meta}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub meta: ResponseMeta,
}

const DATABASE_UNAVAILABLE: &str = "database unavailable";

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: String, data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
            meta: ResponseMeta::new(request_id),
        }
    }

    /// A `success: false` answer that still reports what is known.
    pub(super) fn degraded(request_id: String, error: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: message.into(),
            code: code.into(),
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    pub(super) fn validation(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(request_id, "validation_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "payload_too_large" => StatusCode::PAYLOAD_TOO_LARGE,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &epdb_db::DbError) -> ApiError {
    match error {
        epdb_db::DbError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        epdb_db::DbError::EmptyBatch => {
            ApiError::validation(request_id, "no items to process")
        }
        _ => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

/// Unwraps a list of JSON records, rejecting anything that is not an object.
pub(super) fn into_records(
    request_id: &str,
    items: Vec<serde_json::Value>,
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, ApiError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(ApiError::validation(
                request_id,
                format!("items[{i}] must be an object"),
            )),
        })
        .collect()
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([header::CONTENT_DISPOSITION])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/click-stats/reconcile",
            post(click_stats::reconcile_upload),
        )
        .route(
            "/api/v1/click-stats/preview",
            post(click_stats::preview_upload),
        )
        .route("/api/v1/click-stats/move", post(click_stats::move_items))
        .route(
            "/api/v1/products/backup-delete",
            post(products::backup_delete),
        )
        .route("/api/v1/products/bulk", post(products::bulk_insert))
        .route("/api/v1/products/diff", post(ep_sheet::diff_upload))
        .route(
            "/api/v1/replacements",
            post(replacements::create_replacements),
        )
        .route("/api/v1/titles/generate", post(titles::generate_titles))
        .route(
            "/api/v1/titles/duplicate-check",
            post(titles::duplicate_check),
        )
        .route("/api/v1/titles/similar", post(titles::similar_titles))
        .route("/api/v1/export", post(export::export_items))
        .route("/api/v1/export/all", get(export::export_all))
        .route(
            "/api/v1/admin/rows",
            patch(admin::update_row).delete(admin::delete_rows),
        )
        .route("/api/v1/admin/truncate", post(admin::truncate_table))
        .route("/api/v1/admin/import-ep", post(ep_sheet::import_upload))
        .route("/api/v1/admin/tables/counts", get(admin::table_counts))
        .route(
            "/api/v1/admin/tables/{table}/rows",
            get(admin::browse_rows),
        )
        .route(
            "/api/v1/credentials",
            get(credentials::list_credentials).post(credentials::create_credential),
        )
        .route(
            "/api/v1/credentials/{id}",
            patch(credentials::update_credential).delete(credentials::delete_credential),
        )
        .route(
            "/api/v1/credentials/{id}/default",
            post(credentials::set_default_credential),
        )
        .route("/api/v1/status", get(status::system_status))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id))
                .layer(axum::middleware::from_fn(envelope_rejections)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match epdb_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::new(
                req_id.0,
                HealthData {
                    status: "ok",
                    database: "ok",
                },
            )),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::degraded(
                    req_id.0,
                    DATABASE_UNAVAILABLE,
                    HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                )),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

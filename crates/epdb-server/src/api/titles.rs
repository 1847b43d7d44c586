use axum::{extract::State, Extension, Json};
use epdb_core::similarity::{find_similar, SimilarTitle, DEFAULT_THRESHOLD};
use epdb_db::TitleDuplicateRow;
use epdb_titlegen::{
    generate_batch, GeneratedTitle, TitleRequest, TitleSource, DEFAULT_TITLE_COUNT,
    MAX_TITLE_COUNT,
};
use serde::{Deserialize, Serialize};

use super::generation::{resolve_generation, GenerationOverrides, KeySource};
use super::{map_db_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

const MAX_SIMILARITY_TITLES: usize = 100;

// ---------------------------------------------------------------------------
// Batch generation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateTitlesRequest {
    pub location: String,
    pub product_type: Option<String>,
    pub additional_keywords: Option<String>,
    pub title_count: Option<usize>,
    pub model: Option<String>,
    pub credential_id: Option<i64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub exclude_titles: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateTitlesResponse {
    pub titles: Vec<GeneratedTitle>,
    pub requested: usize,
    pub model: String,
    pub provider: &'static str,
    pub key_source: KeySource,
}

pub(super) async fn generate_titles(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<GenerateTitlesRequest>,
) -> Result<Json<ApiResponse<GenerateTitlesResponse>>, ApiError> {
    let location = body.location.trim();
    if location.is_empty() {
        return Err(ApiError::validation(req_id.0, "location is required"));
    }
    let requested = body.title_count.unwrap_or(DEFAULT_TITLE_COUNT);
    if !(1..=MAX_TITLE_COUNT).contains(&requested) {
        return Err(ApiError::validation(
            req_id.0,
            format!("titleCount must be between 1 and {MAX_TITLE_COUNT}"),
        ));
    }

    let generation = resolve_generation(
        &state,
        &req_id.0,
        &GenerationOverrides {
            model: body.model.as_deref(),
            credential_id: body.credential_id,
            temperature: body.temperature,
            max_tokens: body.max_tokens,
        },
    )
    .await?;

    let request = TitleRequest {
        location: location.to_string(),
        product_type: body.product_type,
        additional_keywords: body.additional_keywords,
        title_count: requested,
        exclude_titles: body.exclude_titles,
    };
    let titles = generate_batch(&state.titles, generation.settings.as_ref(), &request).await;

    if titles.iter().any(|t| t.source == TitleSource::Generated) {
        generation.record_usage(&state).await;
    }

    Ok(Json(ApiResponse::new(
        req_id.0,
        GenerateTitlesResponse {
            titles,
            requested,
            provider: generation.provider.as_str(),
            model: generation.model,
            key_source: generation.key_source,
        },
    )))
}

// ---------------------------------------------------------------------------
// Duplicate and similarity checks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct DuplicateCheckRequest {
    pub title: String,
}

pub(super) async fn duplicate_check(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<DuplicateCheckRequest>,
) -> Result<Json<ApiResponse<TitleDuplicateRow>>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::validation(req_id.0, "title is required"));
    }
    let row = epdb_db::find_title_duplicates(&state.pool, &body.title)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, row)))
}

#[derive(Debug, Deserialize)]
pub(super) struct SimilarTitlesRequest {
    pub titles: Vec<String>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SimilarTitlesItem {
    pub title: String,
    pub has_similar: bool,
    pub matches: Vec<SimilarTitle>,
}

pub(super) async fn similar_titles(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SimilarTitlesRequest>,
) -> Result<Json<ApiResponse<Vec<SimilarTitlesItem>>>, ApiError> {
    let titles: Vec<&str> = body
        .titles
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if titles.is_empty() {
        return Err(ApiError::validation(req_id.0, "titles must not be empty"));
    }
    if titles.len() > MAX_SIMILARITY_TITLES {
        return Err(ApiError::validation(
            req_id.0,
            format!("at most {MAX_SIMILARITY_TITLES} titles per request"),
        ));
    }
    let threshold = body.threshold.unwrap_or(DEFAULT_THRESHOLD);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ApiError::validation(
            req_id.0,
            "threshold must be between 0 and 1",
        ));
    }

    let corpus = epdb_db::list_title_corpus(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let items = titles
        .into_iter()
        .map(|title| {
            let matches = find_similar(title, &corpus, threshold);
            SimilarTitlesItem {
                title: title.to_string(),
                has_similar: !matches.is_empty(),
                matches,
            }
        })
        .collect();
    Ok(Json(ApiResponse::new(req_id.0, items)))
}

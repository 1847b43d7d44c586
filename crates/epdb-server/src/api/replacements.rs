//! Synthesis of replacement products for rows removed from the catalog.

use axum::{extract::State, Extension, Json};
use chrono::{Local, NaiveDate};
use epdb_core::catalog::{source_code, SYSTEM_FIELDS};
use epdb_core::match_city_images;
use epdb_core::replacement::{allocate_original_id, select_images, SourceCode, TitleLedger};
use epdb_titlegen::{city_prompt, TitleOutcome, TitleSource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::generation::{resolve_generation, GenerationOverrides, KeySource};
use super::{into_records, map_db_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReplacementRequest {
    pub items: Vec<Value>,
    pub model: Option<String>,
    pub credential_id: Option<i64>,
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReplacementCandidate {
    pub source_id: Option<String>,
    pub original_id: String,
    pub city: String,
    pub title: String,
    pub title_source: TitleSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub record: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReplacementResponse {
    pub persisted: bool,
    pub model: String,
    pub key_source: KeySource,
    pub candidates: Vec<ReplacementCandidate>,
    /// Stored rows; empty unless `persist` was requested.
    pub inserted: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

pub(super) async fn create_replacements(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ReplacementRequest>,
) -> Result<Json<ApiResponse<ReplacementResponse>>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::validation(req_id.0, "items must not be empty"));
    }
    let removed = into_records(&req_id.0, body.items)?;

    let generation = resolve_generation(
        &state,
        &req_id.0,
        &GenerationOverrides {
            model: body.model.as_deref(),
            credential_id: body.credential_id,
            ..GenerationOverrides::default()
        },
    )
    .await?;

    let today = Local::now().date_naive();
    let images = epdb_db::list_city_images(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let mut ledger = TitleLedger::new(
        epdb_db::list_known_titles(&state.pool)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?,
    );
    let mut taken = epdb_db::list_taken_identifiers(&state.pool, &date_prefix(today))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let mut candidates = Vec::with_capacity(removed.len());
    for row in removed {
        let source_id = source_code(&row);
        let source = SourceCode::parse(source_id.as_deref().unwrap_or_default());
        let original_id = allocate_original_id(today, &source, &mut taken);

        let matched = match_city_images(&images, &source.city);
        let selection = select_images(&matched, &mut rand::rng());

        let outcome = state
            .titles
            .generate_title(
                generation.settings.as_ref(),
                &source.city,
                &city_prompt(&source.city),
            )
            .await;
        let title = ledger.claim(outcome.title());
        let title_source = outcome.source();
        let fallback_reason = match outcome {
            TitleOutcome::Fallback { reason, .. } => Some(reason),
            TitleOutcome::Generated(_) => None,
        };

        let mut record = row;
        for field in SYSTEM_FIELDS {
            record.remove(field);
        }
        record.insert("original_id".to_string(), Value::from(original_id.clone()));
        record.insert("title".to_string(), Value::from(title.clone()));
        record.insert("city".to_string(), Value::from(source.city.clone()));
        record.insert("image_link".to_string(), Value::from(selection.image_link.clone()));
        record.insert(
            "add_image_link".to_string(),
            Value::from(selection.add_image_link()),
        );
        record.insert(
            "video_url".to_string(),
            selection.video_url.map_or(Value::Null, Value::from),
        );

        tracing::debug!(
            source_id = source_id.as_deref().unwrap_or_default(),
            %original_id,
            images = matched.len(),
            ?title_source,
            "built replacement candidate"
        );
        candidates.push(ReplacementCandidate {
            source_id,
            original_id,
            city: source.city,
            title,
            title_source,
            fallback_reason,
            record,
        });
    }

    if candidates
        .iter()
        .any(|c| c.title_source == TitleSource::Generated)
    {
        generation.record_usage(&state).await;
    }

    let inserted = if body.persist {
        persist_candidates(&state, &req_id.0, &candidates).await?
    } else {
        Vec::new()
    };

    tracing::info!(
        candidates = candidates.len(),
        fallbacks = candidates
            .iter()
            .filter(|c| c.title_source == TitleSource::Fallback)
            .count(),
        persisted = body.persist,
        "replacement synthesis finished"
    );

    Ok(Json(ApiResponse::new(
        req_id.0,
        ReplacementResponse {
            persisted: body.persist,
            model: generation.model,
            key_source: generation.key_source,
            candidates,
            inserted,
        },
    )))
}

async fn persist_candidates(
    state: &AppState,
    request_id: &str,
    candidates: &[ReplacementCandidate],
) -> Result<Vec<Value>, ApiError> {
    let records = candidates.iter().map(|c| c.record.clone()).collect();
    let titles: Vec<(String, Option<String>)> = candidates
        .iter()
        .map(|c| (c.title.clone(), Some(c.city.clone())))
        .collect();
    let (inserted, _) = epdb_db::insert_replacements(&state.pool, records, &titles)
        .await
        .map_err(|e| map_db_error(request_id.to_string(), &e))?;

    Ok(inserted)
}

fn date_prefix(date: NaiveDate) -> String {
    format!("{}_", date.format("%Y%m%d"))
}

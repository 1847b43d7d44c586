//! Resolution of the provider key and parameters for a generation request.

use epdb_core::AppConfig;
use epdb_titlegen::{GenerationSettings, Provider};
use serde::Serialize;

use super::{map_db_error, ApiError, AppState};

/// Generation parameters used when a request does not override them.
#[derive(Clone)]
pub struct GenerationDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 100,
            openai_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl std::fmt::Debug for GenerationDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationDefaults")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl GenerationDefaults {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.title_model.clone(),
            temperature: config.title_temperature,
            max_tokens: config.title_max_tokens,
            openai_api_key: config.openai_api_key.clone(),
            gemini_api_key: config.gemini_api_key.clone(),
        }
    }

    pub(super) fn env_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
        }
    }
}

/// Where the key of a resolved request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) enum KeySource {
    Credential,
    DefaultCredential,
    Environment,
    None,
}

#[derive(Debug, Default)]
pub(super) struct GenerationOverrides<'a> {
    pub model: Option<&'a str>,
    pub credential_id: Option<i64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug)]
pub(super) struct ResolvedGeneration {
    pub model: String,
    pub provider: Provider,
    pub settings: Option<GenerationSettings>,
    pub key_source: KeySource,
    credential_id: Option<i64>,
}

/// Picks the key for a request: the explicit credential, then the
/// provider's default credential, then the environment key. With none of
/// them the settings are absent and every title falls back.
pub(super) async fn resolve_generation(
    state: &AppState,
    request_id: &str,
    overrides: &GenerationOverrides<'_>,
) -> Result<ResolvedGeneration, ApiError> {
    let defaults = &state.generation;
    let model = overrides
        .model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(&defaults.model)
        .to_string();
    let provider = Provider::from_model(&model)
        .map_err(|e| ApiError::validation(request_id, e.to_string()))?;

    let temperature = overrides.temperature.unwrap_or(defaults.temperature);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ApiError::validation(
            request_id,
            "temperature must be between 0 and 2",
        ));
    }
    let max_tokens = overrides.max_tokens.unwrap_or(defaults.max_tokens);
    if max_tokens == 0 {
        return Err(ApiError::validation(
            request_id,
            "maxTokens must be positive",
        ));
    }

    let (api_key, credential_id, key_source) = match overrides.credential_id {
        Some(id) => {
            let credential = epdb_db::get_credential(&state.pool, id)
                .await
                .map_err(|e| match e {
                    epdb_db::DbError::NotFound => {
                        ApiError::validation(request_id, format!("credential {id} not found"))
                    }
                    other => map_db_error(request_id.to_string(), &other),
                })?;
            if !credential.is_active {
                return Err(ApiError::validation(
                    request_id,
                    format!("credential {id} is inactive"),
                ));
            }
            if credential.provider != provider.as_str() {
                return Err(ApiError::validation(
                    request_id,
                    format!(
                        "credential {id} is for {}, but model '{model}' needs {provider}",
                        credential.provider
                    ),
                ));
            }
            (Some(credential.api_key), Some(id), KeySource::Credential)
        }
        None => match epdb_db::find_default_credential(&state.pool, provider.as_str())
            .await
            .map_err(|e| map_db_error(request_id.to_string(), &e))?
        {
            Some(credential) => (
                Some(credential.api_key),
                Some(credential.id),
                KeySource::DefaultCredential,
            ),
            None => match defaults.env_key(provider) {
                Some(key) => (Some(key.to_string()), None, KeySource::Environment),
                None => (None, None, KeySource::None),
            },
        },
    };

    let settings = api_key.map(|api_key| GenerationSettings {
        model: model.clone(),
        api_key,
        temperature,
        max_tokens,
    });

    tracing::debug!(%model, %provider, ?key_source, "resolved generation settings");
    Ok(ResolvedGeneration {
        model,
        provider,
        settings,
        key_source,
        credential_id,
    })
}

impl ResolvedGeneration {
    /// Bumps the usage counter of the stored credential that was used, if
    /// any. A failed bump is logged and does not fail the request.
    pub(super) async fn record_usage(&self, state: &AppState) {
        let Some(id) = self.credential_id else {
            return;
        };
        if let Err(e) = epdb_db::record_credential_usage(&state.pool, id).await {
            tracing::warn!(credential_id = id, error = %e, "failed to record credential usage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_state;
    use super::*;

    async fn insert_credential(pool: &sqlx::PgPool, provider: &str, key: &str, active: bool) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO api (provider, name, api_key, is_active) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(provider)
        .bind(format!("{provider} key"))
        .bind(key)
        .bind(active)
        .fetch_one(pool)
        .await
        .expect("insert credential")
    }

    #[test]
    fn defaults_debug_hides_keys() {
        let defaults = GenerationDefaults {
            openai_api_key: Some("sk-live-secret".to_string()),
            ..GenerationDefaults::default()
        };
        assert!(!format!("{defaults:?}").contains("sk-live-secret"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn without_any_key_settings_are_absent(pool: sqlx::PgPool) {
        let state = test_state(pool);
        let resolved = resolve_generation(&state, "r", &GenerationOverrides::default())
            .await
            .expect("resolve");

        assert!(resolved.settings.is_none());
        assert_eq!(resolved.key_source, KeySource::None);
        assert_eq!(resolved.provider, Provider::OpenAi);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn environment_key_is_used_when_no_credential_is_stored(pool: sqlx::PgPool) {
        let mut state = test_state(pool);
        state.generation.gemini_api_key = Some("env-gemini".to_string());

        let resolved = resolve_generation(
            &state,
            "r",
            &GenerationOverrides {
                model: Some("gemini-1.5-flash"),
                ..GenerationOverrides::default()
            },
        )
        .await
        .expect("resolve");

        assert_eq!(resolved.key_source, KeySource::Environment);
        assert_eq!(
            resolved.settings.map(|s| s.api_key).as_deref(),
            Some("env-gemini")
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn stored_default_wins_over_environment(pool: sqlx::PgPool) {
        let id = insert_credential(&pool, "openai", "sk-stored-default", true).await;
        epdb_db::set_default_credential(&pool, id).await.expect("set default");
        let mut state = test_state(pool);
        state.generation.openai_api_key = Some("sk-env".to_string());

        let resolved = resolve_generation(&state, "r", &GenerationOverrides::default())
            .await
            .expect("resolve");

        assert_eq!(resolved.key_source, KeySource::DefaultCredential);
        assert_eq!(
            resolved.settings.as_ref().map(|s| s.api_key.as_str()),
            Some("sk-stored-default")
        );

        resolved.record_usage(&state).await;
        let usage: i64 = sqlx::query_scalar("SELECT usage_count FROM api WHERE id = $1")
            .bind(id)
            .fetch_one(&state.pool)
            .await
            .expect("usage");
        assert_eq!(usage, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn explicit_credential_must_match_model_provider(pool: sqlx::PgPool) {
        let id = insert_credential(&pool, "gemini", "g-key", true).await;
        let state = test_state(pool);

        let err = resolve_generation(
            &state,
            "r",
            &GenerationOverrides {
                model: Some("gpt-4o-mini"),
                credential_id: Some(id),
                ..GenerationOverrides::default()
            },
        )
        .await
        .expect_err("provider mismatch");
        assert_eq!(err.code, "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn inactive_or_missing_credentials_are_rejected(pool: sqlx::PgPool) {
        let id = insert_credential(&pool, "openai", "sk-old", false).await;
        let state = test_state(pool);

        for credential_id in [id, id + 1_000] {
            let err = resolve_generation(
                &state,
                "r",
                &GenerationOverrides {
                    credential_id: Some(credential_id),
                    ..GenerationOverrides::default()
                },
            )
            .await
            .expect_err("unusable credential");
            assert_eq!(err.code, "validation_error");
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_model_prefix_is_a_validation_error(pool: sqlx::PgPool) {
        let state = test_state(pool);
        let err = resolve_generation(
            &state,
            "r",
            &GenerationOverrides {
                model: Some("claude-3"),
                ..GenerationOverrides::default()
            },
        )
        .await
        .expect_err("unsupported model");
        assert_eq!(err.code, "validation_error");
    }
}

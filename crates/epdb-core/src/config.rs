use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can pass a `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("EPDB_ENV", "development"))?;

    let bind_addr = or_default("EPDB_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("EPDB_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("EPDB_LOG_LEVEL", "info");
    let api_keys = parse_key_list(&or_default("EPDB_API_KEYS", ""));

    let db_max_connections = parse_u32("EPDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("EPDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("EPDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    let max_upload_bytes = or_default("EPDB_MAX_UPLOAD_BYTES", "10485760")
        .parse::<usize>()
        .map_err(|e| invalid("EPDB_MAX_UPLOAD_BYTES", e.to_string()))?;

    let openai_api_key = optional("OPENAI_API_KEY");
    let gemini_api_key = optional("GEMINI_API_KEY");
    let openai_base_url = or_default("EPDB_OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL);
    let gemini_base_url = or_default("EPDB_GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL);

    let title_model = or_default("EPDB_TITLE_MODEL", "gpt-4o-mini");
    let title_temperature = or_default("EPDB_TITLE_TEMPERATURE", "0.7")
        .parse::<f32>()
        .map_err(|e| invalid("EPDB_TITLE_TEMPERATURE", e.to_string()))?;
    if !(0.0..=2.0).contains(&title_temperature) {
        return Err(invalid(
            "EPDB_TITLE_TEMPERATURE",
            format!("must be between 0 and 2, got {title_temperature}"),
        ));
    }
    let title_max_tokens = parse_u32("EPDB_TITLE_MAX_TOKENS", "100")?;
    let title_timeout_secs = parse_u64("EPDB_TITLE_TIMEOUT_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        api_keys,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        max_upload_bytes,
        openai_api_key,
        gemini_api_key,
        openai_base_url,
        gemini_base_url,
        title_model,
        title_temperature,
        title_max_tokens,
        title_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "EPDB_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

/// Splits a comma-separated token list, dropping blanks.
#[must_use]
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

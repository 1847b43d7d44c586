//! HTTP client for the OpenAI and Gemini text-generation APIs.
//!
//! [`TitleClient::complete`] surfaces every provider failure as a
//! [`TitleGenError`]. [`TitleClient::generate_title`] is the adapter callers
//! use: it never fails and reports degradation through [`TitleOutcome`].

use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::TitleGenError;
use crate::outcome::{fallback_title, TitleOutcome};
use crate::provider::Provider;
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, Content, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig, PartOut,
};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Per-request generation parameters and the key to authenticate with.
#[derive(Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl std::fmt::Debug for GenerationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSettings")
            .field("model", &self.model)
            .field("api_key", &"[redacted]")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Client for both providers.
///
/// Use [`TitleClient::new`] for production or [`TitleClient::with_base_urls`]
/// to point at a mock server in tests.
#[derive(Debug, Clone)]
pub struct TitleClient {
    client: Client,
    openai_base: Url,
    gemini_base: Url,
}

impl TitleClient {
    /// Creates a client pointed at the public provider endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`TitleGenError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, TitleGenError> {
        Self::with_base_urls(timeout_secs, DEFAULT_OPENAI_BASE_URL, DEFAULT_GEMINI_BASE_URL)
    }

    /// Creates a client with custom base URLs.
    ///
    /// # Errors
    ///
    /// Returns [`TitleGenError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`TitleGenError::InvalidBaseUrl`] if either
    /// base URL does not parse.
    pub fn with_base_urls(
        timeout_secs: u64,
        openai_base_url: &str,
        gemini_base_url: &str,
    ) -> Result<Self, TitleGenError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("epdb/0.1 (catalog-titles)")
            .build()?;

        Ok(Self {
            client,
            openai_base: parse_base(openai_base_url)?,
            gemini_base: parse_base(gemini_base_url)?,
        })
    }

    /// Sends `prompt` to the provider selected by `settings.model` and returns
    /// the trimmed completion.
    ///
    /// # Errors
    ///
    /// - [`TitleGenError::UnsupportedModel`] for an unknown model prefix.
    /// - [`TitleGenError::Http`] on network failure.
    /// - [`TitleGenError::Status`] on a non-2xx response.
    /// - [`TitleGenError::Deserialize`] if the body has an unexpected shape.
    /// - [`TitleGenError::EmptyCompletion`] if no text came back.
    pub async fn complete(
        &self,
        settings: &GenerationSettings,
        prompt: &str,
    ) -> Result<String, TitleGenError> {
        let text = match Provider::from_model(&settings.model)? {
            Provider::OpenAi => self.complete_openai(settings, prompt).await?,
            Provider::Gemini => self.complete_gemini(settings, prompt).await?,
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TitleGenError::EmptyCompletion);
        }
        Ok(trimmed.to_string())
    }

    /// Generates a title for `city`, falling back to a fixed title when no
    /// settings are available or the provider fails.
    pub async fn generate_title(
        &self,
        settings: Option<&GenerationSettings>,
        city: &str,
        prompt: &str,
    ) -> TitleOutcome {
        let Some(settings) = settings else {
            return fallback(city, "no credential".to_string());
        };
        match self.complete(settings, prompt).await {
            Ok(text) => TitleOutcome::Generated(text),
            Err(e) => fallback(city, e.to_string()),
        }
    }

    async fn complete_openai(
        &self,
        settings: &GenerationSettings,
        prompt: &str,
    ) -> Result<String, TitleGenError> {
        let url = join(&self.openai_base, "v1/chat/completions")?;
        let body = ChatRequest {
            model: &settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };
        let request = self
            .client
            .post(url)
            .bearer_auth(&settings.api_key)
            .json(&body);

        let response: ChatResponse = send_json(request, "chat completions").await?;
        response.into_text().ok_or(TitleGenError::EmptyCompletion)
    }

    async fn complete_gemini(
        &self,
        settings: &GenerationSettings,
        prompt: &str,
    ) -> Result<String, TitleGenError> {
        let url = join(
            &self.gemini_base,
            &format!("v1beta/models/{}:generateContent", settings.model),
        )?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![PartOut { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_tokens,
            },
        };
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", &settings.api_key)
            .json(&body);

        let response: GenerateContentResponse = send_json(request, "generateContent").await?;
        response.into_text().ok_or(TitleGenError::EmptyCompletion)
    }
}

fn fallback(city: &str, reason: String) -> TitleOutcome {
    tracing::warn!(%city, %reason, "using fallback title");
    TitleOutcome::Fallback {
        title: fallback_title(city),
        reason,
    }
}

fn parse_base(raw: &str) -> Result<Url, TitleGenError> {
    // Exactly one trailing slash so that `join` appends instead of replacing
    // the last path segment.
    let normalised = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| TitleGenError::InvalidBaseUrl(format!("{raw}: {e}")))
}

fn join(base: &Url, path: &str) -> Result<Url, TitleGenError> {
    base.join(path)
        .map_err(|e| TitleGenError::InvalidBaseUrl(format!("{base}{path}: {e}")))
}

async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    context: &str,
) -> Result<T, TitleGenError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(TitleGenError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    serde_json::from_str(&body).map_err(|e| TitleGenError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_base_normalises_trailing_slash() {
        let base = parse_base("http://localhost:8080/proxy///").expect("valid");
        let url = join(&base, "v1/chat/completions").expect("join");
        assert_eq!(url.as_str(), "http://localhost:8080/proxy/v1/chat/completions");
    }

    #[test]
    fn gemini_path_keeps_model_and_method() {
        let base = parse_base(DEFAULT_GEMINI_BASE_URL).expect("valid");
        let url = join(&base, "v1beta/models/gemini-1.5-flash:generateContent").expect("join");
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn parse_base_rejects_garbage() {
        assert!(matches!(
            parse_base("not a url"),
            Err(TitleGenError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn settings_debug_hides_key() {
        let settings = GenerationSettings {
            model: "gpt-4o-mini".to_string(),
            api_key: "sk-secret".to_string(),
            temperature: 0.7,
            max_tokens: 100,
        };
        assert!(!format!("{settings:?}").contains("sk-secret"));
    }
}

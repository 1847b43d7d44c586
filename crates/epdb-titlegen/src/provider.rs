use crate::error::TitleGenError;

const OPENAI_PREFIXES: &[&str] = &["gpt-", "o1", "o3", "o4", "chatgpt-"];
const GEMINI_PREFIXES: &[&str] = &["gemini-"];

/// Text-generation backend, chosen by model-name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    /// Resolves the provider for `model`.
    ///
    /// # Errors
    ///
    /// Returns [`TitleGenError::UnsupportedModel`] when no known prefix matches.
    pub fn from_model(model: &str) -> Result<Self, TitleGenError> {
        let lower = model.trim().to_ascii_lowercase();
        if OPENAI_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            Ok(Provider::OpenAi)
        } else if GEMINI_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            Ok(Provider::Gemini)
        } else {
            Err(TitleGenError::UnsupportedModel(model.to_string()))
        }
    }

    /// Name stored in the `api.provider` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

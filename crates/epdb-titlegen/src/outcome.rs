use serde::Serialize;

/// Result of asking a provider for a title. Provider failures surface as a
/// [`TitleOutcome::Fallback`] carrying a usable title and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleOutcome {
    Generated(String),
    Fallback { title: String, reason: String },
}

/// Where a title came from, as reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleSource {
    Generated,
    Fallback,
}

impl TitleOutcome {
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            TitleOutcome::Generated(title) | TitleOutcome::Fallback { title, .. } => title,
        }
    }

    #[must_use]
    pub fn into_title(self) -> String {
        match self {
            TitleOutcome::Generated(title) | TitleOutcome::Fallback { title, .. } => title,
        }
    }

    #[must_use]
    pub fn source(&self) -> TitleSource {
        match self {
            TitleOutcome::Generated(_) => TitleSource::Generated,
            TitleOutcome::Fallback { .. } => TitleSource::Fallback,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, TitleOutcome::Fallback { .. })
    }
}

/// Title used when no provider text is available for `city`.
#[must_use]
pub fn fallback_title(city: &str) -> String {
    format!("{} 특별 여행 상품", city.trim())
}

use thiserror::Error;

/// Errors raised while talking to a text-generation provider.
///
/// These never escape [`crate::TitleClient::generate_title`]; they become the
/// reason of a [`crate::TitleOutcome::Fallback`].
#[derive(Debug, Error)]
pub enum TitleGenError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered successfully but without any text.
    #[error("provider returned an empty completion")]
    EmptyCompletion,

    #[error("unsupported model '{0}'")]
    UnsupportedModel(String),

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

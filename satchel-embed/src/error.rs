//! Error types for the embedding provider boundary

/// Result type for provider operations.
///
/// Convenience alias using [`EmbedError`] as the error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding and completion operations.
///
/// A provider failure is always reported through one of these variants;
/// it is never silently replaced with a default (zero) vector, because a
/// zero vector would poison the similarity index.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// No API key available for the configured provider
    #[error("API key is not configured (set the {env_var} environment variable)")]
    MissingApiKey { env_var: String },

    /// Error when provider configuration is invalid
    #[error("Invalid provider configuration: {message}")]
    InvalidConfig { message: String },

    /// Transport-level failure talking to the provider
    #[error("Provider request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status
    #[error("Provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider answered successfully but without the expected payload
    #[error("Provider response was missing {what}")]
    MissingPayload { what: &'static str },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

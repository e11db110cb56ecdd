/// Underlying cause of a failed completion, kept as the `source()` of
/// [`LlmError::CompletionFailed`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("request rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response contained no text")]
    EmptyResponse,

    #[error("AWS request failed: {0}")]
    Sdk(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} provider requires {field}, which is not set")]
    MissingConfig {
        provider: &'static str,
        field: &'static str,
    },

    #[error("{provider} completion failed: {source}")]
    CompletionFailed {
        provider: &'static str,
        #[source]
        source: ProviderError,
    },
}

impl LlmError {
    pub(crate) fn completion(provider: &'static str, source: impl Into<ProviderError>) -> Self {
        Self::CompletionFailed {
            provider,
            source: source.into(),
        }
    }

    /// Name of the backend that produced the error.
    #[must_use]
    pub fn provider(&self) -> &'static str {
        match self {
            Self::MissingConfig { provider, .. } | Self::CompletionFailed { provider, .. } => {
                provider
            }
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::CompletionFailed {
                source: ProviderError::RateLimited,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

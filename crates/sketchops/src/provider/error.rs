use thiserror::Error;

use super::ProviderKind;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} is not configured: {reason}")]
    NotConfigured {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} has not been initialized")]
    NotInitialized { provider: ProviderKind },

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("invalid provider settings: {0}")]
    InvalidSettings(String),

    #[error("HTTP request to {provider} failed: {source}")]
    Http {
        provider: ProviderKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error("failed to parse {provider} response: {reason}")]
    MalformedResponse {
        provider: ProviderKind,
        reason: String,
    },

    #[error("generation timed out after {0}s")]
    Timeout(u64),
}

impl ProviderError {
    /// Wraps a reqwest error with its URL stripped; Gemini carries the API
    /// key in the query string.
    pub(crate) fn http(provider: ProviderKind, source: reqwest::Error) -> Self {
        ProviderError::Http {
            provider,
            source: source.without_url(),
        }
    }
}

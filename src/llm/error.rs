use thiserror::Error;

/// Result type for language model calls.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors raised by the LLM gateway.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider's client cannot be built or the provider cannot be reached.
    ///
    /// This is an operational fault (missing credentials, unknown provider,
    /// unreachable service, timeout), distinct from the model declining to answer.
    #[error("LLM provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// The provider answered, but not with a usable completion.
    #[error("unexpected response from LLM provider: {0}")]
    BadResponse(String),
}

impl LlmError {
    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        LlmError::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Map a transport failure: connection and timeout errors mean the
    /// provider is unavailable, anything else is a bad response.
    pub(crate) fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            LlmError::unavailable(provider, err.to_string())
        } else {
            LlmError::BadResponse(format!("{}: {}", provider, err))
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::ProviderUnavailable { .. })
    }
}

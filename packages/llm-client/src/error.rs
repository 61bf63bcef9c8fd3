//! Error types for the LLM client.

use std::time::Duration;

use thiserror::Error;

use crate::types::Provider;

/// Result type for LLM client operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// LLM client errors.
///
/// `is_retryable` drives the retry policy: timeouts, rate limits, and
/// server-side failures are retried; authentication and parse failures
/// are surfaced immediately.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Configuration error (missing API key, invalid settings)
    #[error("configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, DNS, TLS)
    #[error("network error ({provider}): {message}")]
    Network { provider: Provider, message: String },

    /// Request timed out
    #[error("request timed out ({provider})")]
    Timeout { provider: Provider },

    /// Authentication failed (401/403)
    #[error("authentication failed ({provider}): {message}")]
    Auth { provider: Provider, message: String },

    /// Rate limit exceeded (429)
    #[error("rate limited ({provider})")]
    RateLimited {
        provider: Provider,
        /// Server-advertised wait before retrying, if any
        retry_after: Option<Duration>,
    },

    /// API error (non-2xx response other than the above)
    #[error("API error ({provider}, status {status}): {message}")]
    Api {
        provider: Provider,
        status: u16,
        message: String,
    },

    /// Parse error (unexpected response shape, missing content)
    #[error("parse error ({provider}): {message}")]
    Parse { provider: Provider, message: String },

    /// All retry attempts exhausted
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<LlmError>,
    },
}

impl LlmError {
    /// Whether the retry policy should attempt this request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout { .. } | LlmError::RateLimited { .. } | LlmError::Network { .. } => {
                true
            }
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-advertised retry delay, when one was given.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        let timeout = LlmError::Timeout {
            provider: Provider::OpenAi,
        };
        assert!(timeout.is_retryable());

        let server = LlmError::Api {
            provider: Provider::Anthropic,
            status: 503,
            message: "overloaded".into(),
        };
        assert!(server.is_retryable());

        let bad_request = LlmError::Api {
            provider: Provider::Anthropic,
            status: 400,
            message: "bad request".into(),
        };
        assert!(!bad_request.is_retryable());

        let auth = LlmError::Auth {
            provider: Provider::Gemini,
            message: "invalid key".into(),
        };
        assert!(!auth.is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = LlmError::RateLimited {
            provider: Provider::OpenAi,
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));

        let timeout = LlmError::Timeout {
            provider: Provider::OpenAi,
        };
        assert_eq!(timeout.retry_after(), None);
    }
}

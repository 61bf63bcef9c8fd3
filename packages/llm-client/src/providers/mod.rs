//! Provider adapters.
//!
//! Each adapter implements [`ChatProvider`] and owns the request/response
//! shaping for one vendor API. The adapters are one level deep by design:
//! a tagged [`Provider`](crate::Provider) value plus this single trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse, Provider};

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Capability interface implemented by every provider adapter.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Which provider this adapter speaks to.
    fn provider(&self) -> Provider;

    /// Execute a single chat completion. No retries at this layer.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Validate the API key with a minimal authenticated request.
    async fn validate_key(&self) -> Result<()>;
}

/// Parse a Retry-After header value (delta-seconds form only).
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<std::time::Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(std::time::Duration::from_secs)
}

/// Map a reqwest transport error to an [`LlmError`](crate::LlmError).
pub(crate) fn transport_error(provider: Provider, err: reqwest::Error) -> crate::LlmError {
    if err.is_timeout() {
        crate::LlmError::Timeout { provider }
    } else {
        crate::LlmError::Network {
            provider,
            message: err.to_string(),
        }
    }
}

/// Map a non-success HTTP status plus body to an [`LlmError`](crate::LlmError).
pub(crate) fn status_error(
    provider: Provider,
    status: reqwest::StatusCode,
    headers: &reqwest::header::HeaderMap,
    body: String,
) -> crate::LlmError {
    match status.as_u16() {
        401 | 403 => crate::LlmError::Auth {
            provider,
            message: body,
        },
        429 => crate::LlmError::RateLimited {
            provider,
            retry_after: parse_retry_after(headers),
        },
        code => crate::LlmError::Api {
            provider,
            status: code,
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(
            parse_retry_after(&headers),
            Some(std::time::Duration::from_secs(12))
        );
    }

    #[test]
    fn test_parse_retry_after_absent_or_http_date() {
        let headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_status_error_classification() {
        let headers = HeaderMap::new();

        let auth = status_error(
            Provider::OpenAi,
            reqwest::StatusCode::UNAUTHORIZED,
            &headers,
            "bad key".into(),
        );
        assert!(matches!(auth, crate::LlmError::Auth { .. }));

        let limited = status_error(
            Provider::OpenAi,
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            &headers,
            String::new(),
        );
        assert!(matches!(limited, crate::LlmError::RateLimited { .. }));

        let server = status_error(
            Provider::OpenAi,
            reqwest::StatusCode::BAD_GATEWAY,
            &headers,
            String::new(),
        );
        assert!(server.is_retryable());
    }
}

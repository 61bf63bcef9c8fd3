//! OpenAI chat completions adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{status_error, transport_error, ChatProvider};
use crate::error::{LlmError, Result};
use crate::types::{ChatRequest, ChatResponse, Message, Provider, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for the OpenAI chat completions API.
#[derive(Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new adapter with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    model: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(Provider::OpenAi, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::OpenAi, status, &headers, text));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse {
                provider: Provider::OpenAi,
                message: e.to_string(),
            })?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse {
                provider: Provider::OpenAi,
                message: "response contained no choices".into(),
            })?;

        let usage = wire
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        debug!(
            model = %request.model,
            tokens = usage.total_tokens,
            "openai chat completion"
        );

        Ok(ChatResponse {
            content,
            model: wire.model.unwrap_or_else(|| request.model.clone()),
            provider: Provider::OpenAi,
            usage,
        })
    }

    async fn validate_key(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(Provider::OpenAi, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::OpenAi, status, &headers, text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let provider = OpenAiProvider::new("sk-test").with_base_url("https://proxy.local/v1");
        assert_eq!(provider.base_url, "https://proxy.local/v1");
        assert_eq!(provider.provider(), Provider::OpenAi);
    }

    #[test]
    fn test_wire_request_omits_unset_fields() {
        let request = ChatRequest::new("gpt-4o").message(Message::user("hi"));
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
        assert_eq!(json["model"], "gpt-4o");
    }
}

//! Anthropic messages API adapter.
//!
//! Differences from the OpenAI shape: the system prompt travels in a
//! top-level `system` field, authentication uses `x-api-key`, and the
//! response body nests text in a content-block array.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{status_error, transport_error, ChatProvider};
use crate::error::{LlmError, Result};
use crate::types::{ChatRequest, ChatResponse, Provider, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory on this API.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Adapter for the Anthropic messages API.
#[derive(Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new adapter with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    model: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let messages: Vec<WireMessage<'_>> = request
            .conversation()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: &m.content,
            })
            .collect();

        let body = WireRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system: request.system_prompt(),
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Anthropic, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Anthropic, status, &headers, text));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse {
                provider: Provider::Anthropic,
                message: e.to_string(),
            })?;

        let content: String = wire
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect();

        if content.is_empty() {
            return Err(LlmError::Parse {
                provider: Provider::Anthropic,
                message: "response contained no text blocks".into(),
            });
        }

        let usage = wire
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        debug!(
            model = %request.model,
            tokens = usage.total_tokens,
            "anthropic chat completion"
        );

        Ok(ChatResponse {
            content,
            model: wire.model.unwrap_or_else(|| request.model.clone()),
            provider: Provider::Anthropic,
            usage,
        })
    }

    async fn validate_key(&self) -> Result<()> {
        // Minimal authenticated call: a one-token message against the
        // cheapest model would bill, so use the models listing instead.
        let response = self
            .http
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Anthropic, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Anthropic, status, &headers, text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_system_prompt_is_lifted_out_of_messages() {
        let request = ChatRequest::new("claude-3-5-sonnet-latest")
            .message(Message::system("you are terse"))
            .message(Message::user("hello"));

        let messages: Vec<WireMessage<'_>> = request
            .conversation()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: &m.content,
            })
            .collect();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert_eq!(request.system_prompt(), Some("you are terse"));
    }

    #[test]
    fn test_max_tokens_always_present() {
        let request = ChatRequest::new("claude-3-5-haiku-latest").message(Message::user("hi"));
        let body = WireRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![],
            system: None,
            temperature: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], DEFAULT_MAX_TOKENS);
    }
}

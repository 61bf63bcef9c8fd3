//! Google Gemini generateContent adapter.
//!
//! The API key rides in a query parameter, roles are `user`/`model`, and
//! the system prompt becomes a `systemInstruction` block.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{status_error, transport_error, ChatProvider};
use crate::error::{LlmError, Result};
use crate::types::{ChatRequest, ChatResponse, Provider, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Adapter for the Gemini generateContent API.
#[derive(Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
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
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize)]
struct WirePart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: Option<WireContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let contents: Vec<WireContent> = request
            .conversation()
            .map(|m| WireContent {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![WirePart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let generation_config = if request.max_tokens.is_some() || request.temperature.is_some() {
            Some(WireGenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            })
        } else {
            None
        };

        let body = WireRequest {
            contents,
            system_instruction: request.system_prompt().map(|s| WireContent {
                role: None,
                parts: vec![WirePart {
                    text: s.to_string(),
                }],
            }),
            generation_config,
        };

        let response = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, request.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Gemini, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Gemini, status, &headers, text));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse {
                provider: Provider::Gemini,
                message: e.to_string(),
            })?;

        let content: String = wire
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::Parse {
                provider: Provider::Gemini,
                message: "response contained no candidates".into(),
            });
        }

        let usage = wire
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        debug!(
            model = %request.model,
            tokens = usage.total_tokens,
            "gemini chat completion"
        );

        Ok(ChatResponse {
            content,
            model: request.model.clone(),
            provider: Provider::Gemini,
            usage,
        })
    }

    async fn validate_key(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(Provider::Gemini, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Gemini, status, &headers, text));
        }
        Ok(())
    }
}

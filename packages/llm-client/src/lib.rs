//! Multi-provider LLM chat client
//!
//! A minimal client for the OpenAI, Anthropic, and Gemini chat APIs with
//! no domain-specific logic. Requests either return the full response
//! content or a typed failure; partial content is never surfaced.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_client::{ChatRequest, LlmClient, Message, Provider};
//!
//! let client = LlmClient::builder()
//!     .openai_key(std::env::var("OPENAI_API_KEY")?)
//!     .build()?;
//!
//! let response = client
//!     .chat(
//!         Provider::OpenAi,
//!         ChatRequest::new("gpt-4o")
//!             .message(Message::system("You are a helpful assistant."))
//!             .message(Message::user("Hello!")),
//!     )
//!     .await?;
//! ```
//!
//! Retries are handled here (exponential backoff, Retry-After aware);
//! deciding *which* provider or model to fall back to is the caller's job.

pub mod error;
pub mod providers;
pub mod retry;
pub mod schema;
pub mod types;

pub use error::{LlmError, Result};
pub use providers::{AnthropicProvider, ChatProvider, GeminiProvider, OpenAiProvider};
pub use retry::RetryPolicy;
pub use schema::StructuredOutput;
pub use types::{
    strip_code_blocks, truncate_to_char_boundary, ChatRequest, ChatResponse, Message, Provider,
    Role, Usage,
};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

/// Client over all configured providers.
///
/// Providers are registered at construction; calls name the provider
/// explicitly so the caller controls any fallback chain.
#[derive(Clone)]
pub struct LlmClient {
    providers: HashMap<Provider, Arc<dyn ChatProvider>>,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Start building a client.
    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::default()
    }

    /// Providers configured on this client.
    pub fn configured_providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.providers.keys().copied().collect();
        providers.sort_by_key(|p| Provider::ALL.iter().position(|q| q == p));
        providers
    }

    /// Whether a provider was configured.
    pub fn has_provider(&self, provider: Provider) -> bool {
        self.providers.contains_key(&provider)
    }

    /// Execute a chat request against a specific provider, with retries.
    pub async fn chat(&self, provider: Provider, request: ChatRequest) -> Result<ChatResponse> {
        let adapter = self
            .providers
            .get(&provider)
            .ok_or_else(|| LlmError::Config(format!("provider {provider} is not configured")))?
            .clone();

        debug!(provider = %provider, model = %request.model, "chat request");
        self.retry
            .run(provider.as_str(), || {
                let adapter = adapter.clone();
                let request = request.clone();
                async move { adapter.chat(&request).await }
            })
            .await
    }

    /// Validate API keys for every configured provider.
    ///
    /// Returns per-provider results rather than failing on the first bad
    /// key, so startup can report all problems at once.
    pub async fn validate_keys(&self) -> HashMap<Provider, Result<()>> {
        let mut results = HashMap::new();
        for (provider, adapter) in &self.providers {
            results.insert(*provider, adapter.validate_key().await);
        }
        results
    }
}

/// Builder for [`LlmClient`].
#[derive(Default)]
pub struct LlmClientBuilder {
    openai_key: Option<String>,
    anthropic_key: Option<String>,
    gemini_key: Option<String>,
    retry: Option<RetryPolicy>,
    custom: Vec<Arc<dyn ChatProvider>>,
}

impl LlmClientBuilder {
    /// Configure the OpenAI provider.
    pub fn openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_key = Some(key.into());
        self
    }

    /// Configure the Anthropic provider.
    pub fn anthropic_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_key = Some(key.into());
        self
    }

    /// Configure the Gemini provider.
    pub fn gemini_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_key = Some(key.into());
        self
    }

    /// Override the retry policy.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Register a custom provider adapter (used by tests for mocks).
    pub fn provider(mut self, adapter: Arc<dyn ChatProvider>) -> Self {
        self.custom.push(adapter);
        self
    }

    /// Build the client. Fails if no provider was configured.
    pub fn build(self) -> Result<LlmClient> {
        let mut providers: HashMap<Provider, Arc<dyn ChatProvider>> = HashMap::new();

        if let Some(key) = self.openai_key {
            providers.insert(Provider::OpenAi, Arc::new(OpenAiProvider::new(key)));
        }
        if let Some(key) = self.anthropic_key {
            providers.insert(Provider::Anthropic, Arc::new(AnthropicProvider::new(key)));
        }
        if let Some(key) = self.gemini_key {
            providers.insert(Provider::Gemini, Arc::new(GeminiProvider::new(key)));
        }
        for adapter in self.custom {
            providers.insert(adapter.provider(), adapter);
        }

        if providers.is_empty() {
            return Err(LlmError::Config(
                "no LLM provider configured; supply at least one API key".into(),
            ));
        }

        Ok(LlmClient {
            providers,
            retry: self.retry.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures: AtomicU32,
    }

    #[async_trait]
    impl ChatProvider for FlakyProvider {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                if f > 0 { Some(f - 1) } else { None }
            }).is_ok() {
                return Err(LlmError::Api {
                    provider: Provider::OpenAi,
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            Ok(ChatResponse {
                content: "ok".into(),
                model: request.model.clone(),
                provider: Provider::OpenAi,
                usage: Usage::new(10, 5),
            })
        }

        async fn validate_key(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_build_requires_a_provider() {
        assert!(LlmClient::builder().build().is_err());
    }

    #[test]
    fn test_builder_registers_only_supplied_keys() {
        let client = LlmClient::builder().openai_key("sk-test").build().unwrap();
        assert!(client.has_provider(Provider::OpenAi));
        assert!(!client.has_provider(Provider::Gemini));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_retries_transient_failures() {
        let client = LlmClient::builder()
            .provider(Arc::new(FlakyProvider {
                failures: AtomicU32::new(2),
            }))
            .build()
            .unwrap();

        let response = client
            .chat(Provider::OpenAi, ChatRequest::new("gpt-4o").message(Message::user("hi")))
            .await
            .unwrap();

        assert_eq!(response.content, "ok");
        assert_eq!(response.usage.total_tokens, 15);
    }
}

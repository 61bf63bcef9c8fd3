//! Chat engine: role-resolved model calls with usage accounting.
//!
//! Thin layer over [`LlmClient`]: resolves a [`ModelRole`] to its
//! configured provider and model, executes the call (the client owns
//! retries), and records token usage and cost. Escalation to the fallback
//! role is the analyzer's decision, not this layer's.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::registry::{ModelRegistry, ModelRole, ModelRoles};
use crate::config::Settings;
use crate::error::AnalysisError;
use llm_client::{ChatRequest, ChatResponse, LlmClient, LlmError, Message, Provider};

/// Per-call timeout for analysis requests.
const CHAT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_COMPLETION_TOKENS: u32 = 4096;

/// Aggregated usage for one provider+model pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

/// Usage summary across the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSummary {
    pub total_requests: u64,
    pub total_cost_usd: f64,
    /// keyed by "provider/model"
    pub by_model: HashMap<String, ModelUsage>,
}

/// Role-aware chat engine.
pub struct AnalysisEngine {
    client: LlmClient,
    registry: ModelRegistry,
    roles: ModelRoles,
    usage: Mutex<UsageSummary>,
}

impl AnalysisEngine {
    /// Build the engine from settings: construct the provider client from
    /// the configured API keys and resolve the role assignments.
    pub fn from_settings(settings: &Settings) -> Result<Self, AnalysisError> {
        let mut builder = LlmClient::builder();
        if let Some(key) = &settings.api_keys.openai {
            builder = builder.openai_key(key.clone());
        }
        if let Some(key) = &settings.api_keys.anthropic {
            builder = builder.anthropic_key(key.clone());
        }
        if let Some(key) = &settings.api_keys.gemini {
            builder = builder.gemini_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| AnalysisError::Config(e.to_string()))?;

        Self::with_client(settings, client)
    }

    /// Build with an externally constructed client (tests inject mocks).
    pub fn with_client(settings: &Settings, client: LlmClient) -> Result<Self, AnalysisError> {
        let registry = ModelRegistry::new();
        let roles = ModelRoles::from_settings(settings, &registry)?;
        Ok(Self {
            client,
            registry,
            roles,
            usage: Mutex::new(UsageSummary::default()),
        })
    }

    /// The resolved role table.
    pub fn roles(&self) -> &ModelRoles {
        &self.roles
    }

    /// Execute a chat for a role. Transient retries happen inside the
    /// client; a returned error is terminal for this role.
    pub async fn chat_role(
        &self,
        role: ModelRole,
        system: &str,
        user: &str,
    ) -> Result<ChatResponse, LlmError> {
        let (provider, model) = self.roles.for_role(role).clone();

        let request = ChatRequest::new(&model)
            .message(Message::system(system))
            .message(Message::user(user))
            .max_tokens(MAX_COMPLETION_TOKENS)
            .temperature(0.0)
            .timeout(CHAT_TIMEOUT);

        let result = self.client.chat(provider, request).await;

        match &result {
            Ok(response) => self.record(provider, &response.model, response),
            Err(err) => warn!(role = %role, provider = %provider, model = %model, error = %err, "chat failed"),
        }

        result
    }

    fn record(&self, provider: Provider, model: &str, response: &ChatResponse) {
        let cost = self.registry.calculate_cost(model, &response.usage);
        let mut usage = self.usage.lock().expect("usage lock poisoned");
        usage.total_requests += 1;
        usage.total_cost_usd += cost;

        let entry = usage
            .by_model
            .entry(format!("{provider}/{model}"))
            .or_default();
        entry.requests += 1;
        entry.prompt_tokens += response.usage.prompt_tokens as u64;
        entry.completion_tokens += response.usage.completion_tokens as u64;
        entry.cost_usd += cost;
    }

    /// Snapshot of usage so far.
    pub fn usage_summary(&self) -> UsageSummary {
        self.usage.lock().expect("usage lock poisoned").clone()
    }

    /// Validate every configured provider key, reporting per provider.
    ///
    /// Zero working providers is a configuration error; individual bad
    /// keys are logged and tolerated as long as the role providers work.
    pub async fn validate_providers(&self) -> Result<HashMap<Provider, bool>, AnalysisError> {
        let results = self.client.validate_keys().await;
        let mut summary = HashMap::new();
        let mut any_valid = false;

        for (provider, result) in results {
            let valid = result.is_ok();
            if let Err(e) = &result {
                warn!(provider = %provider, error = %e, "provider key validation failed");
            } else {
                info!(provider = %provider, "provider key validated");
            }
            any_valid |= valid;
            summary.insert(provider, valid);
        }

        if !any_valid {
            return Err(AnalysisError::Config(
                "no configured LLM provider passed key validation".into(),
            ));
        }
        Ok(summary)
    }

    /// Pre-run cost estimate for a page count, using the role models and
    /// average token heuristics.
    pub fn estimate_cost(&self, page_count: usize, include_step2: bool) -> CostEstimate {
        // Rough per-page token shape observed in practice: a summary call
        // sends ~3k prompt tokens, a feature call ~4k, completions ~1k.
        const STEP1_PROMPT: u32 = 3_000;
        const STEP2_PROMPT: u32 = 4_000;
        const COMPLETION: u32 = 1_000;

        let step1_usage = llm_client::Usage::new(STEP1_PROMPT, COMPLETION);
        let step2_usage = llm_client::Usage::new(STEP2_PROMPT, COMPLETION);

        let step1_cost = self
            .registry
            .calculate_cost(&self.roles.step1.1, &step1_usage);
        let step2_cost = if include_step2 {
            self.registry
                .calculate_cost(&self.roles.step2.1, &step2_usage)
        } else {
            0.0
        };

        let per_page = step1_cost + step2_cost;
        CostEstimate {
            page_count,
            estimated_cost_usd: per_page * page_count as f64,
            cost_per_page_usd: per_page,
            estimated_tokens_per_page: STEP1_PROMPT
                + COMPLETION
                + if include_step2 { STEP2_PROMPT + COMPLETION } else { 0 },
        }
    }
}

/// Pre-run cost estimate.
#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub page_count: usize,
    pub estimated_cost_usd: f64,
    pub cost_per_page_usd: f64,
    pub estimated_tokens_per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChat;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn engine_with(chat: Arc<ScriptedChat>) -> AnalysisEngine {
        let settings = Settings::for_tests(PathBuf::from("/tmp"));
        let client = LlmClient::builder().provider(chat).build().unwrap();
        AnalysisEngine::with_client(&settings, client).unwrap()
    }

    #[tokio::test]
    async fn test_chat_role_uses_resolved_model_and_records_usage() {
        let chat = Arc::new(ScriptedChat::new(Provider::OpenAi).respond("{}"));
        let engine = engine_with(chat.clone());

        let response = engine
            .chat_role(ModelRole::Step1, "system", "user")
            .await
            .unwrap();
        // "fast" resolves to gpt-4o-mini
        assert_eq!(response.model, "gpt-4o-mini");

        let usage = engine.usage_summary();
        assert_eq!(usage.total_requests, 1);
        assert!(usage.total_cost_usd > 0.0);
        assert!(usage.by_model.contains_key("openai/gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_estimate_cost_scales_with_pages() {
        let chat = Arc::new(ScriptedChat::new(Provider::OpenAi));
        let engine = engine_with(chat);

        let with_step2 = engine.estimate_cost(10, true);
        let without = engine.estimate_cost(10, false);
        assert!(with_step2.estimated_cost_usd > without.estimated_cost_usd);
        assert!((with_step2.cost_per_page_usd * 10.0 - with_step2.estimated_cost_usd).abs() < 1e-9);
    }
}

//! Static model registry and role resolution.
//!
//! Maps logical names (`fast`, `accurate`, provider shortcuts) and concrete
//! model identifiers to `(provider, model)` pairs with cost metadata. Role
//! resolution happens once at startup; unknown identifiers fail fast with
//! the identifier echoed.

use serde::Serialize;

use crate::config::Settings;
use crate::error::AnalysisError;
use llm_client::{Provider, Usage};

/// The logical roles configuration assigns models to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Step1,
    Step2,
    Fallback,
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelRole::Step1 => f.write_str("STEP1_MODEL"),
            ModelRole::Step2 => f.write_str("STEP2_MODEL"),
            ModelRole::Fallback => f.write_str("FALLBACK_MODEL"),
        }
    }
}

/// Metadata for one registered model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub provider: Provider,
    pub model_id: &'static str,
    pub display_name: &'static str,
    pub context_length: u32,
    pub cost_per_1k_prompt: f64,
    pub cost_per_1k_completion: f64,
}

/// Registered models. The table is deliberately static: adding a model is
/// a code change, not configuration.
const MODELS: &[ModelInfo] = &[
    ModelInfo {
        provider: Provider::OpenAi,
        model_id: "gpt-4o",
        display_name: "GPT-4o",
        context_length: 128_000,
        cost_per_1k_prompt: 0.0025,
        cost_per_1k_completion: 0.01,
    },
    ModelInfo {
        provider: Provider::OpenAi,
        model_id: "gpt-4o-mini",
        display_name: "GPT-4o mini",
        context_length: 128_000,
        cost_per_1k_prompt: 0.00015,
        cost_per_1k_completion: 0.0006,
    },
    ModelInfo {
        provider: Provider::OpenAi,
        model_id: "gpt-4-turbo",
        display_name: "GPT-4 Turbo",
        context_length: 128_000,
        cost_per_1k_prompt: 0.01,
        cost_per_1k_completion: 0.03,
    },
    ModelInfo {
        provider: Provider::Anthropic,
        model_id: "claude-3-5-sonnet-latest",
        display_name: "Claude 3.5 Sonnet",
        context_length: 200_000,
        cost_per_1k_prompt: 0.003,
        cost_per_1k_completion: 0.015,
    },
    ModelInfo {
        provider: Provider::Anthropic,
        model_id: "claude-3-5-haiku-latest",
        display_name: "Claude 3.5 Haiku",
        context_length: 200_000,
        cost_per_1k_prompt: 0.0008,
        cost_per_1k_completion: 0.004,
    },
    ModelInfo {
        provider: Provider::Anthropic,
        model_id: "claude-3-opus-latest",
        display_name: "Claude 3 Opus",
        context_length: 200_000,
        cost_per_1k_prompt: 0.015,
        cost_per_1k_completion: 0.075,
    },
    ModelInfo {
        provider: Provider::Gemini,
        model_id: "gemini-1.5-pro",
        display_name: "Gemini 1.5 Pro",
        context_length: 128_000,
        cost_per_1k_prompt: 0.0025,
        cost_per_1k_completion: 0.0075,
    },
    ModelInfo {
        provider: Provider::Gemini,
        model_id: "gemini-1.5-flash",
        display_name: "Gemini 1.5 Flash",
        context_length: 128_000,
        cost_per_1k_prompt: 0.00015,
        cost_per_1k_completion: 0.0006,
    },
];

/// Logical aliases resolving to concrete model identifiers.
const ALIASES: &[(&str, &str)] = &[
    // Performance tiers
    ("fast", "gpt-4o-mini"),
    ("balanced", "claude-3-5-haiku-latest"),
    ("accurate", "gpt-4o"),
    ("premium", "claude-3-opus-latest"),
    // Cost tiers
    ("cheapest", "gemini-1.5-flash"),
    ("cost-effective", "claude-3-5-haiku-latest"),
    // Provider shortcuts
    ("openai-fast", "gpt-4o-mini"),
    ("openai-best", "gpt-4o"),
    ("anthropic-fast", "claude-3-5-haiku-latest"),
    ("anthropic-best", "claude-3-5-sonnet-latest"),
    ("gemini-fast", "gemini-1.5-flash"),
    ("gemini-best", "gemini-1.5-pro"),
];

/// Static model registry.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    _private: (),
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a logical alias or concrete identifier to `(provider, model)`.
    pub fn resolve(&self, name: &str) -> Result<(Provider, String), AnalysisError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AnalysisError::Config("model name cannot be empty".into()));
        }

        let resolved = ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, target)| *target)
            .unwrap_or(name);

        MODELS
            .iter()
            .find(|m| m.model_id == resolved)
            .map(|m| (m.provider, m.model_id.to_string()))
            .ok_or_else(|| {
                AnalysisError::Config(format!(
                    "unknown model identifier {name:?}; known models: {}",
                    MODELS
                        .iter()
                        .map(|m| m.model_id)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    /// Metadata for a concrete model identifier.
    pub fn info(&self, model_id: &str) -> Option<&'static ModelInfo> {
        MODELS.iter().find(|m| m.model_id == model_id)
    }

    /// Cost in USD for a call against `model_id`.
    pub fn calculate_cost(&self, model_id: &str, usage: &Usage) -> f64 {
        match self.info(model_id) {
            Some(info) => {
                (usage.prompt_tokens as f64 / 1000.0) * info.cost_per_1k_prompt
                    + (usage.completion_tokens as f64 / 1000.0) * info.cost_per_1k_completion
            }
            None => 0.0,
        }
    }

    /// All registered identifiers, for diagnostics.
    pub fn model_ids(&self) -> Vec<&'static str> {
        MODELS.iter().map(|m| m.model_id).collect()
    }
}

/// The three configured role assignments, fully resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRoles {
    pub step1: (Provider, String),
    pub step2: (Provider, String),
    pub fallback: (Provider, String),
}

impl ModelRoles {
    /// Resolve the role assignments in `settings` against the registry.
    ///
    /// Also checks that every role lands on a provider whose API key is
    /// configured, since a role that can never execute is a startup error.
    pub fn from_settings(
        settings: &Settings,
        registry: &ModelRegistry,
    ) -> Result<Self, AnalysisError> {
        let configured = settings.api_keys.configured();

        let resolve_role = |role: ModelRole, name: &str| -> Result<(Provider, String), AnalysisError> {
            let (provider, model) = registry.resolve(name).map_err(|e| {
                AnalysisError::Config(format!("{role}: {e}"))
            })?;
            if !configured.contains(&provider) {
                return Err(AnalysisError::Config(format!(
                    "{role} resolves to {model} on {provider}, but no {provider} API key is configured"
                )));
            }
            Ok((provider, model))
        };

        Ok(Self {
            step1: resolve_role(ModelRole::Step1, &settings.step1_model)?,
            step2: resolve_role(ModelRole::Step2, &settings.step2_model)?,
            fallback: resolve_role(ModelRole::Fallback, &settings.fallback_model)?,
        })
    }

    pub fn for_role(&self, role: ModelRole) -> &(Provider, String) {
        match role {
            ModelRole::Step1 => &self.step1,
            ModelRole::Step2 => &self.step2,
            ModelRole::Fallback => &self.fallback,
        }
    }
}

//! Immutable runtime settings.
//!
//! One record, populated from the environment at startup, validated at
//! construction, never mutated. Missing required variables fail fast with
//! the variable named; model identifiers are resolved against the registry
//! separately so unknown models are echoed back.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use llm_client::Provider;

/// Hard cap on concurrent browser sessions.
pub const MAX_SESSIONS_CAP: usize = 5;

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model identifier for Step 1 (content summary) calls
    pub step1_model: String,

    /// Model identifier for Step 2 (feature analysis) calls
    pub step2_model: String,

    /// Model identifier used when a primary model fails terminally
    pub fallback_model: String,

    /// API keys per provider; at least one is required. Never persisted.
    #[serde(skip)]
    pub api_keys: ApiKeys,

    /// Default chat model per provider, required when its key is set
    pub provider_models: ProviderModels,

    /// Root directory for project artifacts (default: current directory)
    pub output_root: PathBuf,

    /// Timeout for discovery HTTP requests
    pub discovery_timeout: Duration,

    /// Maximum crawl depth during discovery
    pub discovery_max_depth: usize,

    /// Concurrent page workers (clamped to [1, 5])
    pub max_concurrent_pages: usize,

    /// Run browsers headless
    pub headless: bool,
}

/// Provider API keys. Never serialized.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
}

impl ApiKeys {
    /// Providers with a key configured.
    pub fn configured(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.openai.is_some() {
            providers.push(Provider::OpenAi);
        }
        if self.anthropic.is_some() {
            providers.push(Provider::Anthropic);
        }
        if self.gemini.is_some() {
            providers.push(Provider::Gemini);
        }
        providers
    }
}

/// Per-provider default chat model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderModels {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
}

impl ProviderModels {
    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAi => self.openai.as_deref(),
            Provider::Anthropic => self.anthropic.as_deref(),
            Provider::Gemini => self.gemini.as_deref(),
        }
    }
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// Fails with the offending variable named. No filesystem writes happen
    /// before this returns.
    pub fn from_env() -> Result<Self, AnalysisError> {
        let step1_model = require_env("STEP1_MODEL")?;
        let step2_model = require_env("STEP2_MODEL")?;
        let fallback_model = require_env("FALLBACK_MODEL")?;

        let api_keys = ApiKeys {
            openai: optional_env("OPENAI_API_KEY"),
            anthropic: optional_env("ANTHROPIC_API_KEY"),
            gemini: optional_env("GEMINI_API_KEY"),
        };

        if api_keys.configured().is_empty() {
            return Err(AnalysisError::Config(
                "no provider API key set; supply OPENAI_API_KEY, ANTHROPIC_API_KEY, or GEMINI_API_KEY"
                    .into(),
            ));
        }

        // Each configured provider must name its chat model.
        let provider_models = ProviderModels {
            openai: optional_env("OPENAI_CHAT_MODEL"),
            anthropic: optional_env("ANTHROPIC_CHAT_MODEL"),
            gemini: optional_env("GEMINI_CHAT_MODEL"),
        };
        for provider in api_keys.configured() {
            if provider_models.for_provider(provider).is_none() {
                let var = match provider {
                    Provider::OpenAi => "OPENAI_CHAT_MODEL",
                    Provider::Anthropic => "ANTHROPIC_CHAT_MODEL",
                    Provider::Gemini => "GEMINI_CHAT_MODEL",
                };
                return Err(AnalysisError::Config(format!(
                    "{var} must be set when the {provider} API key is provided"
                )));
            }
        }

        let output_root = optional_env("OUTPUT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let discovery_timeout = optional_env("DISCOVERY_TIMEOUT")
            .map(|v| parse_env("DISCOVERY_TIMEOUT", &v))
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let discovery_max_depth = optional_env("DISCOVERY_MAX_DEPTH")
            .map(|v| parse_env("DISCOVERY_MAX_DEPTH", &v))
            .transpose()?
            .unwrap_or(3);

        let max_concurrent_pages = optional_env("MAX_CONCURRENT_PAGES")
            .map(|v| parse_env("MAX_CONCURRENT_PAGES", &v))
            .transpose()?
            .unwrap_or(3usize)
            .clamp(1, MAX_SESSIONS_CAP);

        let headless = optional_env("PLAYWRIGHT_HEADLESS")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            step1_model,
            step2_model,
            fallback_model,
            api_keys,
            provider_models,
            output_root,
            discovery_timeout,
            discovery_max_depth,
            max_concurrent_pages,
            headless,
        })
    }

    /// Build settings directly (used by tests).
    #[allow(clippy::too_many_arguments)]
    pub fn for_tests(output_root: PathBuf) -> Self {
        Self {
            step1_model: "fast".into(),
            step2_model: "accurate".into(),
            fallback_model: "openai-fast".into(),
            api_keys: ApiKeys {
                openai: Some("sk-test".into()),
                anthropic: None,
                gemini: None,
            },
            provider_models: ProviderModels {
                openai: Some("gpt-4o-mini".into()),
                anthropic: None,
                gemini: None,
            },
            output_root,
            discovery_timeout: Duration::from_secs(5),
            discovery_max_depth: 2,
            max_concurrent_pages: 2,
            headless: true,
        }
    }
}

fn require_env(name: &str) -> Result<String, AnalysisError> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AnalysisError::Config(format!("required environment variable {name} is not set")))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AnalysisError> {
    value
        .parse()
        .map_err(|_| AnalysisError::Config(format!("invalid value for {name}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_keys_configured() {
        let keys = ApiKeys {
            openai: Some("sk".into()),
            anthropic: None,
            gemini: Some("g".into()),
        };
        assert_eq!(keys.configured(), vec![Provider::OpenAi, Provider::Gemini]);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        assert!(parse_env::<usize>("MAX_CONCURRENT_PAGES", "not-a-number").is_err());
        assert_eq!(parse_env::<usize>("MAX_CONCURRENT_PAGES", "4").unwrap(), 4);
    }

    #[test]
    fn test_settings_for_tests_are_valid() {
        let settings = Settings::for_tests(PathBuf::from("/tmp"));
        assert!(settings.max_concurrent_pages <= MAX_SESSIONS_CAP);
        assert!(!settings.api_keys.configured().is_empty());
    }
}

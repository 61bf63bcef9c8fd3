//! Two-step page analyzer.
//!
//! Step 1 summarizes the page; Step 2 consumes that summary (in full) and
//! the captured network/interaction evidence to produce the feature
//! analysis. Each step climbs the same ladder: primary model, hardened
//! retry on the primary, then the fallback model. Partial results always
//! survive: a Step 2 failure never discards a good Step 1.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::AnalysisEngine;
use super::models::{
    ContentSummary, FeatureAnalysis, PageResult, Priority, RebuildSpec, StepOutcome,
};
use super::prompts;
use super::registry::ModelRole;
use super::validation::{
    FeaturePayload, ResponseValidator, SummaryPayload, ValidationFailure,
};
use crate::browser::PageSnapshot;
use crate::error::AnalysisStage;

/// Priority bands for rebuild specs.
const PRIORITY_HIGH: f64 = 0.45;
const PRIORITY_MEDIUM: f64 = 0.2;

/// How Step 2 should be handled for a page.
#[derive(Debug, Clone, Default)]
pub enum Step2Mode {
    /// Run it (subject to the confidence gate, when set)
    #[default]
    Run,
    /// Do not run; not an error (mode presets with step2 off)
    Disabled,
    /// Caller explicitly declined this page (interactive mode)
    Declined,
}

/// Per-page analysis options.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub step2: Step2Mode,
    /// Step 1 confidence below this skips Step 2 (mode-dependent)
    pub step2_confidence_gate: Option<f64>,
}

/// Orchestrates the two LLM passes for one page.
pub struct PageAnalyzer {
    engine: Arc<AnalysisEngine>,
    validator: ResponseValidator,
}

impl PageAnalyzer {
    pub fn new(engine: Arc<AnalysisEngine>) -> Self {
        Self {
            engine,
            validator: ResponseValidator::default(),
        }
    }

    /// Override the quality floor.
    pub fn with_validator(mut self, validator: ResponseValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Run both steps for a captured page.
    ///
    /// Never returns an error: failures are recorded in the result's step
    /// outcomes and error list, because a bad page must not abort the
    /// workflow.
    pub async fn analyze_page(
        &self,
        page_id: &str,
        snapshot: &PageSnapshot,
        opts: &AnalyzeOptions,
    ) -> PageResult {
        let started = std::time::Instant::now();
        let mut result = PageResult::empty(page_id, &snapshot.url);

        info!(url = %snapshot.url, "step 1: content summary");
        let summary = match self.run_summary(snapshot).await {
            Ok(summary) => {
                result.step1 = StepOutcome::Completed(summary.clone());
                summary
            }
            Err(failure) => {
                warn!(url = %snapshot.url, error = %failure.reason, "step 1 failed terminally");
                result.record_error(&failure.kind, failure.reason.clone(), failure.attempts);
                result.step1 = StepOutcome::Failed {
                    reason: failure.reason,
                    raw_response: failure.raw_response,
                };
                // Step 2 depends on the summary; nothing more to do.
                result.processing_time_ms = started.elapsed().as_millis() as u64;
                result.completed_at = chrono::Utc::now();
                return result;
            }
        };

        match &opts.step2 {
            Step2Mode::Disabled => {
                result.step2 = StepOutcome::NotRun;
            }
            Step2Mode::Declined => {
                result.step2 = StepOutcome::Skipped {
                    reason: "declined by caller".into(),
                };
            }
            Step2Mode::Run => {
                if let Some(gate) = opts.step2_confidence_gate {
                    if summary.confidence < gate {
                        info!(
                            url = %snapshot.url,
                            confidence = summary.confidence,
                            gate = gate,
                            "skipping step 2: confidence below gate"
                        );
                        result.step2 = StepOutcome::Skipped {
                            reason: format!(
                                "step 1 confidence {:.2} below gate {:.2}",
                                summary.confidence, gate
                            ),
                        };
                        result.processing_time_ms = started.elapsed().as_millis() as u64;
                        result.completed_at = chrono::Utc::now();
                        return result;
                    }
                }

                info!(url = %snapshot.url, "step 2: feature analysis");
                match self.run_features(snapshot, &summary).await {
                    Ok(features) => {
                        result.step2 = StepOutcome::Completed(features);
                    }
                    Err(failure) => {
                        warn!(url = %snapshot.url, error = %failure.reason, "step 2 failed terminally");
                        result.record_error(&failure.kind, failure.reason.clone(), failure.attempts);
                        result.step2 = StepOutcome::Failed {
                            reason: failure.reason,
                            raw_response: failure.raw_response,
                        };
                    }
                }
            }
        }

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        result.completed_at = chrono::Utc::now();
        result
    }

    async fn run_summary(&self, snapshot: &PageSnapshot) -> Result<ContentSummary, StepFailure> {
        let base_prompt = prompts::summary_prompt(snapshot);

        let (payload, quality) = self
            .run_ladder(
                AnalysisStage::Summary,
                prompts::SUMMARY_SYSTEM_PROMPT,
                &base_prompt,
                &prompts::harden_summary_prompt(&base_prompt),
                |content| self.validator.validate_summary(content),
            )
            .await?;

        Ok(summary_from_payload(payload, quality))
    }

    async fn run_features(
        &self,
        snapshot: &PageSnapshot,
        summary: &ContentSummary,
    ) -> Result<FeatureAnalysis, StepFailure> {
        let base_prompt = prompts::feature_prompt(snapshot, summary);

        let (payload, quality) = self
            .run_ladder(
                AnalysisStage::Features,
                prompts::FEATURE_SYSTEM_PROMPT,
                &base_prompt,
                &prompts::harden_feature_prompt(&base_prompt),
                |content| self.validator.validate_features(content),
            )
            .await?;

        Ok(features_from_payload(payload, quality, summary))
    }

    /// The shared retry ladder: primary with the base prompt, primary with
    /// the hardened prompt, fallback model with the hardened prompt.
    async fn run_ladder<T>(
        &self,
        stage: AnalysisStage,
        system: &str,
        base_prompt: &str,
        hardened_prompt: &str,
        validate: impl Fn(&str) -> Result<T, ValidationFailure>,
    ) -> Result<T, StepFailure> {
        let primary_role = match stage {
            AnalysisStage::Summary => ModelRole::Step1,
            AnalysisStage::Features => ModelRole::Step2,
        };

        let rungs = [
            (primary_role, base_prompt),
            (primary_role, hardened_prompt),
            (ModelRole::Fallback, hardened_prompt),
        ];

        let mut attempts = 0u32;
        let mut last_raw: Option<String> = None;
        let mut last_reason = String::new();
        let mut last_kind = "analysis_quality";
        // A primary model whose transport already exhausted its retries is
        // dead for this page; the hardened rung goes straight to fallback.
        let mut primary_dead = false;

        for (role, prompt) in rungs {
            if primary_dead && role == primary_role {
                continue;
            }
            attempts += 1;
            match self.engine.chat_role(role, system, prompt).await {
                Ok(response) => match validate(&response.content) {
                    Ok(validated) => {
                        debug!(stage = %stage, attempts = attempts, "validated on attempt");
                        return Ok(validated);
                    }
                    Err(failure) => {
                        debug!(stage = %stage, role = %role, error = %failure, "validation failed");
                        last_reason = failure.to_string();
                        last_raw = Some(failure.raw);
                        last_kind = "analysis_quality";
                    }
                },
                Err(err) => {
                    last_reason = err.to_string();
                    last_kind = "llm_error";
                    if role == primary_role {
                        primary_dead = true;
                    }
                }
            }
        }

        Err(StepFailure {
            kind: last_kind,
            reason: format!("{stage} failed after {attempts} attempts: {last_reason}"),
            raw_response: last_raw,
            attempts,
        })
    }
}

struct StepFailure {
    kind: &'static str,
    reason: String,
    raw_response: Option<String>,
    attempts: u32,
}

fn summary_from_payload(payload: SummaryPayload, quality: super::models::QualityScore) -> ContentSummary {
    ContentSummary {
        id: format!("summary-{}", Uuid::new_v4()),
        purpose: payload.purpose,
        user_context: payload.user_context,
        business_logic: payload.business_logic,
        navigation_role: payload.navigation_role,
        business_importance: payload.business_importance,
        confidence: payload.confidence,
        workflows: payload.workflows,
        journey_stage: payload.journey_stage,
        keywords: payload.keywords,
        quality,
    }
}

fn features_from_payload(
    payload: FeaturePayload,
    quality: super::models::QualityScore,
    summary: &ContentSummary,
) -> FeatureAnalysis {
    // Keywords that tie a spec back to interactive behavior.
    let interactive_markers: Vec<String> = payload
        .interactive_elements
        .iter()
        .flat_map(|e| [e.selector.to_ascii_lowercase(), e.kind.to_ascii_lowercase()])
        .chain(["form".into(), "button".into(), "input".into(), "click".into()])
        .collect();

    let mut specs: Vec<RebuildSpec> = payload
        .rebuild_specifications
        .into_iter()
        .map(|spec| {
            let complexity = spec.complexity.unwrap_or_default();
            let score = (summary.business_importance
                * payload.confidence
                * complexity.inverse_factor())
            .clamp(0.0, 1.0);

            let haystack =
                format!("{} {}", spec.name, spec.description).to_ascii_lowercase();
            let references_interactive = interactive_markers
                .iter()
                .any(|marker| !marker.is_empty() && haystack.contains(marker.as_str()));

            RebuildSpec {
                name: spec.name,
                description: spec.description,
                complexity,
                dependencies: spec.dependencies,
                priority_score: score,
                priority: priority_band(score),
                references_interactive,
            }
        })
        .collect();

    // Rank: score first, interactive features break ties ahead of purely
    // informational ones, then original emission order (stable sort).
    specs.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.references_interactive.cmp(&a.references_interactive))
    });

    FeatureAnalysis {
        context_ref: summary.id.clone(),
        interactive_elements: payload.interactive_elements,
        functional_capabilities: payload.functional_capabilities,
        api_integrations: payload.api_integrations,
        business_rules: payload.business_rules,
        third_party_integrations: payload.third_party_integrations,
        rebuild_specs: specs,
        overall_confidence: payload.confidence,
        quality,
    }
}

fn priority_band(score: f64) -> Priority {
    if score >= PRIORITY_HIGH {
        Priority::High
    } else if score >= PRIORITY_MEDIUM {
        Priority::Medium
    } else {
        Priority::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::engine::AnalysisEngine;
    use crate::browser::{DomStats, NetworkLog, TechSignals};
    use crate::config::Settings;
    use crate::testing::ScriptedChat;
    use llm_client::{LlmClient, LlmError, Provider};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn snapshot() -> PageSnapshot {
        PageSnapshot {
            url: "https://example.com/login".into(),
            final_url: "https://example.com/login".into(),
            status_code: 200,
            title: "Login".into(),
            html: "<html></html>".into(),
            visible_text: "Sign in to your account".into(),
            meta: HashMap::new(),
            screenshot: None,
            network: NetworkLog::default(),
            dom_stats: DomStats::default(),
            tech_signals: TechSignals::default(),
            interaction_log: None,
            load_time_ms: 100,
            captured_at: chrono::Utc::now(),
        }
    }

    fn good_summary() -> String {
        serde_json::json!({
            "purpose": "Account login page authenticating registered users against the session endpoint",
            "user_context": "Returning customers who need access to their account dashboard and order history",
            "business_logic": "Validates credentials via a POST to the session API, enforces lockout rules, issues a cookie",
            "navigation_role": "Gateway from the public site into the authenticated workflow area",
            "business_importance": 0.85,
            "confidence": 0.9,
            "workflows": ["authentication"],
            "journey_stage": "entry",
            "keywords": ["login", "session"]
        })
        .to_string()
    }

    fn good_features() -> String {
        serde_json::json!({
            "interactive_elements": [
                {"type": "form", "selector": "#login-form", "purpose": "credential entry", "behavior": "POST"}
            ],
            "functional_capabilities": [
                {"name": "login", "description": "Authenticates a user session against the backend API with validation and redirect", "type": "auth"}
            ],
            "api_integrations": [
                {"method": "POST", "endpoint": "/api/session", "purpose": "session creation", "auth": "none"}
            ],
            "business_rules": [
                {"name": "lockout", "description": "Account locks after repeated failures, requiring an email workflow reset", "validation_logic": "failures >= 5"}
            ],
            "third_party_integrations": [],
            "rebuild_specifications": [
                {"name": "Login form", "description": "Rebuild the login form with validation wired to the session endpoint", "complexity": "low", "dependencies": []},
                {"name": "Help text", "description": "Static copy describing the login policy and cookie usage for the session", "complexity": "low", "dependencies": []}
            ],
            "confidence": 0.8
        })
        .to_string()
    }

    fn analyzer_with(chat: ScriptedChat) -> PageAnalyzer {
        let settings = Settings::for_tests(PathBuf::from("/tmp"));
        let client = LlmClient::builder()
            .provider(std::sync::Arc::new(chat))
            .build()
            .unwrap();
        let engine = AnalysisEngine::with_client(&settings, client).unwrap();
        PageAnalyzer::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn test_both_steps_complete() {
        let chat = ScriptedChat::new(Provider::OpenAi)
            .respond(good_summary())
            .respond(good_features());
        let analyzer = analyzer_with(chat);

        let result = analyzer
            .analyze_page("example-com-login", &snapshot(), &AnalyzeOptions::default())
            .await;

        assert!(result.step1.is_completed());
        assert!(result.step2.is_completed());

        // Context-passing contract: features reference the summary id.
        let summary = result.step1.as_completed().unwrap();
        let features = result.step2.as_completed().unwrap();
        assert_eq!(features.context_ref, summary.id);
    }

    #[tokio::test]
    async fn test_rebuild_specs_ranked_interactive_first() {
        let chat = ScriptedChat::new(Provider::OpenAi)
            .respond(good_summary())
            .respond(good_features());
        let analyzer = analyzer_with(chat);

        let result = analyzer
            .analyze_page("p", &snapshot(), &AnalyzeOptions::default())
            .await;
        let features = result.step2.as_completed().unwrap();

        // Both specs share complexity; the form-referencing one must rank
        // first on the interactive tie-break.
        assert_eq!(features.rebuild_specs[0].name, "Login form");
        assert!(features.rebuild_specs[0].references_interactive);
        assert!(features.rebuild_specs[0].priority_score <= 1.0);
    }

    #[tokio::test]
    async fn test_schema_failure_recovers_via_hardened_retry() {
        let chat = ScriptedChat::new(Provider::OpenAi)
            .respond("not json at all")
            .respond(good_summary())
            .respond(good_features());
        let analyzer = analyzer_with(chat);

        let result = analyzer
            .analyze_page("p", &snapshot(), &AnalyzeOptions::default())
            .await;
        assert!(result.step1.is_completed());
    }

    #[tokio::test]
    async fn test_step1_terminal_failure_aborts_step2() {
        let chat = ScriptedChat::new(Provider::OpenAi)
            .respond("garbage")
            .respond("garbage")
            .respond("garbage");
        let analyzer = analyzer_with(chat);

        let result = analyzer
            .analyze_page("p", &snapshot(), &AnalyzeOptions::default())
            .await;

        assert!(matches!(result.step1, StepOutcome::Failed { .. }));
        assert!(matches!(result.step2, StepOutcome::NotRun));
        assert!(!result.errors.is_empty());
        // Raw response preserved for debugging
        match &result.step1 {
            StepOutcome::Failed { raw_response, .. } => {
                assert_eq!(raw_response.as_deref(), Some("garbage"));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_step2_failure_preserves_step1_partial() {
        let chat = ScriptedChat::new(Provider::OpenAi)
            .respond(good_summary())
            .respond("bad")
            .respond("bad")
            .respond("bad");
        let analyzer = analyzer_with(chat);

        let result = analyzer
            .analyze_page("p", &snapshot(), &AnalyzeOptions::default())
            .await;

        assert!(result.step1.is_completed());
        assert!(matches!(result.step2, StepOutcome::Failed { .. }));
        assert!(result.is_partial());
    }

    #[tokio::test]
    async fn test_confidence_gate_skips_step2() {
        let chat = ScriptedChat::new(Provider::OpenAi).respond(good_summary());
        let analyzer = analyzer_with(chat);

        let opts = AnalyzeOptions {
            step2: Step2Mode::Run,
            step2_confidence_gate: Some(0.95),
        };
        let result = analyzer.analyze_page("p", &snapshot(), &opts).await;

        assert!(result.step1.is_completed());
        assert!(matches!(result.step2, StepOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_declined_step2_is_skipped() {
        let chat = ScriptedChat::new(Provider::OpenAi).respond(good_summary());
        let analyzer = analyzer_with(chat);

        let opts = AnalyzeOptions {
            step2: Step2Mode::Declined,
            ..Default::default()
        };
        let result = analyzer.analyze_page("p", &snapshot(), &opts).await;

        match &result.step2 {
            StepOutcome::Skipped { reason } => assert!(reason.contains("declined")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_llm_error_is_terminal_after_ladder() {
        let auth_err = || LlmError::Auth {
            provider: Provider::OpenAi,
            message: "revoked".into(),
        };
        let chat = ScriptedChat::new(Provider::OpenAi)
            .fail(auth_err())
            .fail(auth_err())
            .fail(auth_err());
        let analyzer = analyzer_with(chat);

        let result = analyzer
            .analyze_page("p", &snapshot(), &AnalyzeOptions::default())
            .await;

        assert!(matches!(result.step1, StepOutcome::Failed { .. }));
        assert_eq!(result.errors[0].kind, "llm_error");
    }
}

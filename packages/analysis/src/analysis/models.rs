//! Analysis result models: Step 1 summaries, Step 2 feature analyses, and
//! the per-page result record the workflow persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a page sits in the user journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JourneyStage {
    Entry,
    Middle,
    Conversion,
    Exit,
}

impl JourneyStage {
    /// Selection weight used when ranking pages for analysis.
    pub fn weight(&self) -> f64 {
        match self {
            JourneyStage::Conversion => 1.0,
            JourneyStage::Entry => 0.8,
            JourneyStage::Middle => 0.5,
            JourneyStage::Exit => 0.3,
        }
    }
}

/// Quality breakdown for a validated LLM response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityScore {
    /// Weighted blend of the three components, in [0, 1]
    pub overall: f64,
    pub completeness: f64,
    pub specificity: f64,
    pub depth: f64,
}

/// Step 1 output: what the page is for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSummary {
    /// Stable identifier referenced by the matching feature analysis
    pub id: String,
    pub purpose: String,
    pub user_context: String,
    pub business_logic: String,
    pub navigation_role: String,
    /// How much the page matters to the business, in [0, 1]
    pub business_importance: f64,
    /// Model's confidence in its own summary, in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub workflows: Vec<String>,
    pub journey_stage: JourneyStage,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub quality: QualityScore,
}

/// An interactive element mapped during Step 2.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InteractiveElement {
    /// Element category: form, button, link, control, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub selector: String,
    pub purpose: String,
    #[serde(default)]
    pub behavior: Option<String>,
}

/// A functional capability the page provides.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FunctionalCapability {
    pub name: String,
    pub description: String,
    /// CRUD, search, workflow, state, ...
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// 1-10 technical complexity
    #[serde(default)]
    pub complexity_score: Option<u8>,
}

/// Authentication requirement observed on an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthRequirement {
    #[default]
    None,
    Optional,
    Required,
}

/// An API integration the page depends on.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ApiIntegration {
    pub method: String,
    pub endpoint: String,
    pub purpose: String,
    #[serde(default)]
    pub auth: AuthRequirement,
    #[serde(default)]
    pub data_flow: Option<String>,
}

/// A business rule embedded in the page.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BusinessRule {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub validation_logic: Option<String>,
}

/// An external service the page integrates with.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ThirdPartyIntegration {
    pub service_name: String,
    pub integration_type: String,
    pub purpose: String,
}

/// Rebuild priority band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => f.write_str("high"),
            Priority::Medium => f.write_str("medium"),
            Priority::Low => f.write_str("low"),
        }
    }
}

/// Implementation complexity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl Complexity {
    /// Inverse factor for priority scoring: simpler features rank higher
    /// at equal importance.
    pub fn inverse_factor(&self) -> f64 {
        match self {
            Complexity::Low => 1.0,
            Complexity::Medium => 0.7,
            Complexity::High => 0.4,
        }
    }
}

/// One rebuild-ready specification item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildSpec {
    pub name: String,
    pub description: String,
    pub complexity: Complexity,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Derived score in [0, 1]; see priority assignment in the analyzer
    pub priority_score: f64,
    pub priority: Priority,
    /// Spec covers interactive behavior rather than static content
    #[serde(default)]
    pub references_interactive: bool,
}

/// Step 2 output: the technical map of the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureAnalysis {
    /// Identifier of the [`ContentSummary`] this analysis consumed
    pub context_ref: String,
    #[serde(default)]
    pub interactive_elements: Vec<InteractiveElement>,
    #[serde(default)]
    pub functional_capabilities: Vec<FunctionalCapability>,
    #[serde(default)]
    pub api_integrations: Vec<ApiIntegration>,
    #[serde(default)]
    pub business_rules: Vec<BusinessRule>,
    #[serde(default)]
    pub third_party_integrations: Vec<ThirdPartyIntegration>,
    #[serde(default)]
    pub rebuild_specs: Vec<RebuildSpec>,
    pub overall_confidence: f64,
    pub quality: QualityScore,
}

/// Outcome of one analysis step for a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum StepOutcome<T> {
    /// Step never started (workflow stopped, step disabled, prior failure)
    NotRun,
    Completed(T),
    /// Terminal failure; the raw model response is kept for debugging
    Failed {
        reason: String,
        raw_response: Option<String>,
    },
    /// Deliberately skipped (caller declined, or the confidence gate)
    Skipped { reason: String },
}

impl<T> StepOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed(_))
    }

    pub fn as_completed(&self) -> Option<&T> {
        match self {
            StepOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Short state label for reports and progress events.
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::NotRun => "not_run",
            StepOutcome::Completed(_) => "completed",
            StepOutcome::Failed { .. } => "failed",
            StepOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// An error captured while processing a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: String,
    pub message: String,
    pub retry_count: u32,
}

/// Everything produced for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// `slugify(normalized url)`; names every artifact for this page
    pub page_id: String,
    pub url: String,
    /// Relative path of the persisted snapshot JSON, once stored
    pub snapshot_ref: Option<String>,
    pub step1: StepOutcome<ContentSummary>,
    pub step2: StepOutcome<FeatureAnalysis>,
    #[serde(default)]
    pub errors: Vec<RecordedError>,
    pub processing_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl PageResult {
    /// A result shell for a page that has not produced anything yet.
    pub fn empty(page_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            url: url.into(),
            snapshot_ref: None,
            step1: StepOutcome::NotRun,
            step2: StepOutcome::NotRun,
            errors: Vec::new(),
            processing_time_ms: 0,
            completed_at: Utc::now(),
        }
    }

    /// Fully successful: both steps completed (or step 2 skipped on purpose).
    pub fn is_success(&self) -> bool {
        self.step1.is_completed()
            && matches!(
                self.step2,
                StepOutcome::Completed(_) | StepOutcome::Skipped { .. } | StepOutcome::NotRun
            )
    }

    /// Step 1 succeeded but step 2 failed: worth keeping, flagged partial.
    pub fn is_partial(&self) -> bool {
        self.step1.is_completed() && matches!(self.step2, StepOutcome::Failed { .. })
    }

    pub fn record_error(&mut self, kind: &str, message: impl Into<String>, retry_count: u32) {
        self.errors.push(RecordedError {
            kind: kind.to_string(),
            message: message.into(),
            retry_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_outcome_serde_round_trip() {
        let outcome: StepOutcome<ContentSummary> = StepOutcome::Skipped {
            reason: "caller declined".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("skipped"));

        let back: StepOutcome<ContentSummary> = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, StepOutcome::Skipped { .. }));
    }

    #[test]
    fn test_page_result_partial() {
        let mut result = PageResult::empty("example-com", "https://example.com/");
        result.step1 = StepOutcome::Completed(crate::testing::sample_summary());
        result.step2 = StepOutcome::Failed {
            reason: "quality below threshold".into(),
            raw_response: Some("{}".into()),
        };

        assert!(result.is_partial());
        assert!(!result.is_success());
    }

    #[test]
    fn test_journey_stage_weights_ordered() {
        assert!(JourneyStage::Conversion.weight() > JourneyStage::Entry.weight());
        assert!(JourneyStage::Entry.weight() > JourneyStage::Exit.weight());
    }

    #[test]
    fn test_complexity_inverse_factor() {
        assert!(Complexity::Low.inverse_factor() > Complexity::High.inverse_factor());
    }
}

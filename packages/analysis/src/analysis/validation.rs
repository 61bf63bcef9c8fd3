//! Response validation and quality scoring.
//!
//! Every LLM response passes through here: JSON extraction, schema
//! checking via typed deserialization, numeric clamping, and a quality
//! score blended from completeness, specificity, and technical depth
//! (weights 0.4 / 0.35 / 0.25). A response passes only when parsing,
//! schema, and quality all clear.

use schemars::JsonSchema;
use serde::Deserialize;

use super::models::{
    ApiIntegration, BusinessRule, ContentSummary, FunctionalCapability, InteractiveElement,
    JourneyStage, QualityScore, ThirdPartyIntegration,
};
use llm_client::strip_code_blocks;

/// Default minimum overall quality for a passing response.
pub const DEFAULT_MIN_QUALITY: f64 = 0.5;

const WEIGHT_COMPLETENESS: f64 = 0.4;
const WEIGHT_SPECIFICITY: f64 = 0.35;
const WEIGHT_DEPTH: f64 = 0.25;

/// Free text shorter than this reads as boilerplate.
const MIN_TEXT_LEN: usize = 40;

/// Technical-term count that earns full depth marks.
const DEPTH_TARGET: usize = 6;

/// Phrases that signal a model is padding rather than analyzing.
const BOILERPLATE: &[&str] = &[
    "it depends",
    "as an ai",
    "i cannot",
    "without more information",
    "various features",
    "standard functionality",
    "typical website",
];

/// Markers of concrete technical content.
const TECHNICAL_TERMS: &[&str] = &[
    "api", "endpoint", "selector", "form", "post", "get", "json", "validation", "session",
    "authentication", "query", "database", "workflow", "webhook", "oauth", "cookie", "redirect",
    "javascript", "ajax", "graphql",
];

/// Why a response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailureKind {
    Parse,
    Schema,
    Quality,
}

/// A rejected response, with the raw content kept for the retry ladder.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub kind: ValidationFailureKind,
    pub reason: String,
    pub raw: String,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ValidationFailureKind::Parse => "parse",
            ValidationFailureKind::Schema => "schema",
            ValidationFailureKind::Quality => "quality",
        };
        write!(f, "{kind}: {}", self.reason)
    }
}

/// The shape Step 1 must emit. Mirrors [`ContentSummary`] minus the fields
/// this side computes (id, quality).
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummaryPayload {
    pub purpose: String,
    pub user_context: String,
    pub business_logic: String,
    pub navigation_role: String,
    pub business_importance: f64,
    pub confidence: f64,
    #[serde(default)]
    pub workflows: Vec<String>,
    pub journey_stage: JourneyStage,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The shape Step 2 must emit.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FeaturePayload {
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
    pub rebuild_specifications: Vec<RebuildSpecPayload>,
    pub confidence: f64,
}

/// Rebuild spec as emitted by the model; priority is assigned afterwards.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RebuildSpecPayload {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub complexity: Option<super::models::Complexity>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Validates responses against a quality floor.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    min_quality: f64,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self {
            min_quality: DEFAULT_MIN_QUALITY,
        }
    }
}

impl ResponseValidator {
    pub fn new(min_quality: f64) -> Self {
        Self {
            min_quality: min_quality.clamp(0.0, 1.0),
        }
    }

    pub fn min_quality(&self) -> f64 {
        self.min_quality
    }

    /// Validate a Step 1 response.
    pub fn validate_summary(
        &self,
        content: &str,
    ) -> Result<(SummaryPayload, QualityScore), ValidationFailure> {
        let mut payload: SummaryPayload = self.parse(content)?;
        payload.business_importance = payload.business_importance.clamp(0.0, 1.0);
        payload.confidence = payload.confidence.clamp(0.0, 1.0);

        let quality = self.score_summary(&payload);
        self.check_quality(quality, content)?;
        Ok((payload, quality))
    }

    /// Validate a Step 2 response.
    pub fn validate_features(
        &self,
        content: &str,
    ) -> Result<(FeaturePayload, QualityScore), ValidationFailure> {
        let mut payload: FeaturePayload = self.parse(content)?;
        payload.confidence = payload.confidence.clamp(0.0, 1.0);

        let quality = self.score_features(&payload);
        self.check_quality(quality, content)?;
        Ok((payload, quality))
    }

    fn parse<T: serde::de::DeserializeOwned>(
        &self,
        content: &str,
    ) -> Result<T, ValidationFailure> {
        let cleaned = extract_json(content).ok_or_else(|| ValidationFailure {
            kind: ValidationFailureKind::Parse,
            reason: "no JSON object found in response".into(),
            raw: content.to_string(),
        })?;

        // Distinguish malformed JSON from a wrong shape: the former gets a
        // parse failure, the latter a schema failure.
        let value: serde_json::Value =
            serde_json::from_str(&cleaned).map_err(|e| ValidationFailure {
                kind: ValidationFailureKind::Parse,
                reason: e.to_string(),
                raw: content.to_string(),
            })?;

        serde_json::from_value(value).map_err(|e| ValidationFailure {
            kind: ValidationFailureKind::Schema,
            reason: e.to_string(),
            raw: content.to_string(),
        })
    }

    fn check_quality(
        &self,
        quality: QualityScore,
        raw: &str,
    ) -> Result<(), ValidationFailure> {
        if quality.overall < self.min_quality {
            return Err(ValidationFailure {
                kind: ValidationFailureKind::Quality,
                reason: format!(
                    "quality {:.2} below minimum {:.2}",
                    quality.overall, self.min_quality
                ),
                raw: raw.to_string(),
            });
        }
        Ok(())
    }

    fn score_summary(&self, payload: &SummaryPayload) -> QualityScore {
        let optional_populated = [
            !payload.workflows.is_empty(),
            !payload.keywords.is_empty(),
            payload.business_importance > 0.0,
        ];
        let completeness = fraction(&optional_populated);

        let free_text = [
            payload.purpose.as_str(),
            payload.user_context.as_str(),
            payload.business_logic.as_str(),
            payload.navigation_role.as_str(),
        ];
        let specificity = specificity_score(&free_text);
        let depth = depth_score(&free_text, 0);

        blend(completeness, specificity, depth)
    }

    fn score_features(&self, payload: &FeaturePayload) -> QualityScore {
        let optional_populated = [
            !payload.interactive_elements.is_empty(),
            !payload.functional_capabilities.is_empty(),
            !payload.api_integrations.is_empty(),
            !payload.business_rules.is_empty(),
            !payload.rebuild_specifications.is_empty(),
        ];
        let completeness = fraction(&optional_populated);

        let texts: Vec<&str> = payload
            .functional_capabilities
            .iter()
            .map(|c| c.description.as_str())
            .chain(payload.business_rules.iter().map(|r| r.description.as_str()))
            .chain(
                payload
                    .rebuild_specifications
                    .iter()
                    .map(|s| s.description.as_str()),
            )
            .collect();
        let specificity = specificity_score(&texts);

        // Selectors and endpoints are concrete identifiers: they count
        // toward depth beyond plain terms.
        let concrete = payload.interactive_elements.len() + payload.api_integrations.len();
        let depth = depth_score(&texts, concrete);

        blend(completeness, specificity, depth)
    }
}

fn fraction(flags: &[bool]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    flags.iter().filter(|f| **f).count() as f64 / flags.len() as f64
}

fn blend(completeness: f64, specificity: f64, depth: f64) -> QualityScore {
    let overall = (completeness * WEIGHT_COMPLETENESS
        + specificity * WEIGHT_SPECIFICITY
        + depth * WEIGHT_DEPTH)
        .clamp(0.0, 1.0);
    QualityScore {
        overall,
        completeness,
        specificity,
        depth,
    }
}

/// Average length of free-text fields against the minimum, with a
/// penalty per boilerplate phrase found.
fn specificity_score(texts: &[&str]) -> f64 {
    if texts.is_empty() {
        return 0.0;
    }

    let avg_len =
        texts.iter().map(|t| t.len()).sum::<usize>() as f64 / texts.len() as f64;
    let mut score = (avg_len / MIN_TEXT_LEN as f64).min(1.0);

    let combined = texts.join(" ").to_ascii_lowercase();
    let boilerplate_hits = BOILERPLATE
        .iter()
        .filter(|phrase| combined.contains(*phrase))
        .count();
    score -= boilerplate_hits as f64 * 0.2;

    score.clamp(0.0, 1.0)
}

/// Technical-term and concrete-identifier density against the target.
fn depth_score(texts: &[&str], concrete_identifiers: usize) -> f64 {
    let combined = texts.join(" ").to_ascii_lowercase();
    let term_hits = TECHNICAL_TERMS
        .iter()
        .filter(|term| combined.contains(*term))
        .count();

    ((term_hits + concrete_identifiers) as f64 / DEPTH_TARGET as f64).min(1.0)
}

/// Pull the outermost JSON object out of a model response, tolerating
/// code fences and prose around it.
fn extract_json(content: &str) -> Option<String> {
    let cleaned = strip_code_blocks(content);
    if cleaned.starts_with('{') && cleaned.ends_with('}') {
        return Some(cleaned.to_string());
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end > start {
        Some(cleaned[start..=end].to_string())
    } else {
        None
    }
}

//! Two-step LLM analysis: models, registry, validation, prompts, engine,
//! and the per-page analyzer.

pub mod analyzer;
pub mod engine;
pub mod models;
pub mod prompts;
pub mod registry;
pub mod validation;

pub use analyzer::{AnalyzeOptions, PageAnalyzer, Step2Mode};
pub use engine::{AnalysisEngine, CostEstimate, UsageSummary};
pub use models::{
    ApiIntegration, AuthRequirement, BusinessRule, Complexity, ContentSummary, FeatureAnalysis,
    FunctionalCapability, InteractiveElement, JourneyStage, PageResult, Priority, QualityScore,
    RebuildSpec, RecordedError, StepOutcome, ThirdPartyIntegration,
};
pub use registry::{ModelRegistry, ModelRole, ModelRoles};
pub use validation::{ResponseValidator, ValidationFailure, ValidationFailureKind, DEFAULT_MIN_QUALITY};

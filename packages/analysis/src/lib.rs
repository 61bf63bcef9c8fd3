//! Legacy website analysis library.
//!
//! Turns a seed URL into rebuild-ready documentation through three
//! cooperating subsystems:
//!
//! - **Discovery** ([`discovery`]): robots.txt, sitemaps, and a fallback
//!   crawl produce a normalized, classified URL inventory.
//! - **Capture and analysis** ([`browser`], [`analysis`]): pooled headless
//!   sessions capture each page (DOM, text, network traffic, optional
//!   interactions); a two-step LLM pipeline summarizes the page and maps
//!   its features, with schema validation, quality scoring, and model
//!   fallback on every call.
//! - **Workflow and output** ([`workflow`], [`storage`], [`docs`]): a
//!   checkpointed sequential workflow drives pages through analysis and
//!   emits per-page markdown plus an incrementally updated master report.
//!
//! [`orchestrator::Orchestrator`] composes the whole pipeline behind
//! `analyze_legacy_site` and friends.
//!
//! # Example
//!
//! ```rust,ignore
//! use site_analysis::{Orchestrator, Settings, SiteAnalysisOptions};
//!
//! let settings = Settings::from_env()?;
//! let orchestrator = Orchestrator::new(settings)?;
//! let outcome = orchestrator
//!     .analyze_legacy_site("https://legacy.example.com", &SiteAnalysisOptions::default())
//!     .await?;
//! println!("report at {}", outcome.report_path.display());
//! ```

pub mod analysis;
pub mod browser;
pub mod config;
pub mod discovery;
pub mod docs;
pub mod error;
pub mod orchestrator;
pub mod storage;
pub mod testing;
pub mod urls;
pub mod workflow;

pub use analysis::{
    AnalysisEngine, ContentSummary, FeatureAnalysis, ModelRegistry, ModelRole, ModelRoles,
    PageAnalyzer, PageResult, ResponseValidator, StepOutcome,
};
pub use browser::{
    BrowserEngine, NavigateOptions, PageNavigator, PageSnapshot, SessionPool,
};
pub use config::Settings;
pub use discovery::{DiscoveryPipeline, UrlFilterMode, UrlFilters, UrlInventory};
pub use error::{AnalysisError, PageError};
pub use orchestrator::{
    AnalysisMode, AnalysisOutcome, AnalysisStatus, CostPriority, Orchestrator,
    SiteAnalysisOptions, WorkflowAction,
};
pub use storage::{ArtifactStore, ResourceExposer};
pub use urls::{is_asset, is_internal, normalize, slugify, NormalizedUrl};
pub use workflow::{
    Checkpoint, WorkflowEngine, WorkflowHandle, WorkflowOptions, WorkflowState,
};

//! End-to-end analysis orchestration.
//!
//! Composes discovery, page selection, the browser pool, the two-step
//! analyzer, the workflow engine, and documentation generation into the
//! single `analyze_legacy_site` call, plus the page-list, resume, status,
//! and control entry points.

pub mod selection;

pub use selection::{
    recommend_strategy, select_pages, AnalysisMode, CostPriority, StrategyRecommendation,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::analysis::{
    AnalysisEngine, AnalyzeOptions, CostEstimate, PageAnalyzer, PageResult, Step2Mode,
    UsageSummary,
};
use crate::browser::{
    BrowserBackend, BrowserEngine, CdpBackend, NavigateOptions, PageNavigator, SessionPool,
};
use crate::config::Settings;
use crate::discovery::{DiscoveryPipeline, UrlFilters, UrlInventory};
use crate::docs::DocumentationGenerator;
use crate::error::{AnalysisError, PageError};
use crate::storage::{ArtifactStore, ProjectMetadata, ResultCounts};
use crate::urls::{normalize, NormalizedUrl};
use crate::workflow::{
    Checkpoint, CheckpointManager, PageProcessor, ProgressCounts, WorkflowEngine, WorkflowHandle,
    WorkflowOptions, WorkflowState, WorkflowSummary,
};

/// Options for a full site analysis.
#[derive(Debug, Clone)]
pub struct SiteAnalysisOptions {
    pub analysis_mode: AnalysisMode,
    /// Page budget; defaults to the mode preset. Applied after filtering.
    pub max_pages: Option<usize>,
    /// Defaults to the mode preset.
    pub include_step2: Option<bool>,
    /// Insert confirmation checkpoints (auto-confirmed otherwise)
    pub interactive_mode: bool,
    pub project_id: String,
    pub cost_priority: CostPriority,
    pub filters: UrlFilters,
    /// Keywords that bias page selection (targeted mode)
    pub focus_areas: Vec<String>,
    pub browser_engine: Option<BrowserEngine>,
    pub capture_interactions: bool,
    pub enable_screenshots: bool,
}

impl Default for SiteAnalysisOptions {
    fn default() -> Self {
        Self {
            analysis_mode: AnalysisMode::default(),
            max_pages: None,
            include_step2: None,
            interactive_mode: false,
            project_id: "legacy-analysis".into(),
            cost_priority: CostPriority::default(),
            filters: UrlFilters::default(),
            focus_areas: Vec::new(),
            browser_engine: None,
            capture_interactions: false,
            enable_screenshots: false,
        }
    }
}

/// A point where interactive mode asks before proceeding.
#[derive(Debug)]
pub enum ConfirmPoint<'a> {
    /// Discovery finished; `pages` internal pages found
    Discovery { seed_url: &'a str, pages: usize },
    /// Page selection settled; proceed with these URLs?
    PageSelection { urls: &'a [NormalizedUrl], estimate: &'a CostEstimate },
    /// About to run Step 2 for one page
    Step2Page { url: &'a str },
}

/// Answers interactive-mode checkpoints. Non-interactive runs use
/// [`AutoConfirm`].
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, point: ConfirmPoint<'_>) -> bool;
}

/// Confirms everything.
pub struct AutoConfirm;

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, _point: ConfirmPoint<'_>) -> bool {
        true
    }
}

/// Workflow control actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowAction {
    Pause,
    Resume,
    Stop,
    Skip { url: String },
}

/// Outcome of a full analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub workflow_id: String,
    pub project_id: String,
    pub seed_url: String,
    pub state: WorkflowState,
    pub counts: ProgressCounts,
    pub pages_discovered: usize,
    pub cost_estimate: CostEstimate,
    pub usage: UsageSummary,
    pub report_path: PathBuf,
}

/// Current status of a project's analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStatus {
    pub project_id: String,
    pub counts: ResultCounts,
    pub has_checkpoint: bool,
    pub pending_pages: Vec<String>,
    pub report_path: Option<PathBuf>,
}

/// The high-level orchestrator.
pub struct Orchestrator {
    settings: Settings,
    engine: Arc<AnalysisEngine>,
    backend: Arc<dyn BrowserBackend>,
    confirmer: Arc<dyn Confirmer>,
    workflows: Mutex<HashMap<String, WorkflowHandle>>,
}

impl Orchestrator {
    /// Build with the real CDP backend and auto-confirmation.
    pub fn new(settings: Settings) -> Result<Self, AnalysisError> {
        let engine = Arc::new(AnalysisEngine::from_settings(&settings)?);
        Ok(Self {
            settings,
            engine,
            backend: Arc::new(CdpBackend::new()),
            confirmer: Arc::new(AutoConfirm),
            workflows: Mutex::new(HashMap::new()),
        })
    }

    /// Swap the browser backend (tests, alternative engines).
    pub fn with_backend(mut self, backend: Arc<dyn BrowserBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Swap the chat engine (tests).
    pub fn with_engine(mut self, engine: Arc<AnalysisEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Install an interactive confirmer.
    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Discover a site's URL inventory, with filters applied.
    pub async fn discover_website(
        &self,
        url: &str,
        filters: &UrlFilters,
    ) -> Result<UrlInventory, AnalysisError> {
        let pipeline = DiscoveryPipeline::new(&self.settings)?;
        let inventory = pipeline.discover(url).await?;
        filters.apply(&inventory)
    }

    /// Recommend an analysis strategy for a seed URL.
    pub async fn recommend(&self, url: &str) -> Result<StrategyRecommendation, AnalysisError> {
        let inventory = self.discover_website(url, &UrlFilters::default()).await?;
        Ok(recommend_strategy(&inventory))
    }

    /// Complete site analysis: discovery, selection, execution, synthesis.
    pub async fn analyze_legacy_site(
        &self,
        url: &str,
        opts: &SiteAnalysisOptions,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let seed = normalize(url)?;

        // Phase 1: discovery (filters are part of discovery's contract).
        info!(seed = %seed, mode = ?opts.analysis_mode, "analysis: discovery");
        let inventory = self.discover_website(&seed.url, &opts.filters).await?;
        let pages_discovered = inventory.pages().count();

        if opts.interactive_mode
            && !self
                .confirmer
                .confirm(ConfirmPoint::Discovery {
                    seed_url: &seed.url,
                    pages: pages_discovered,
                })
                .await
        {
            return Err(AnalysisError::Discovery {
                url: seed.url,
                reason: "cancelled at discovery checkpoint".into(),
            });
        }

        // Phase 2: page selection. The budget caps after filtering.
        let max_pages = opts
            .max_pages
            .unwrap_or_else(|| opts.analysis_mode.default_max_pages());
        let selected = select_pages(&inventory, max_pages, &opts.focus_areas);
        let include_step2 = opts
            .include_step2
            .unwrap_or_else(|| opts.analysis_mode.step2_default());

        // Phase 3: cost estimate.
        let estimate = self.engine.estimate_cost(selected.len(), include_step2);
        info!(
            pages = selected.len(),
            cost_usd = estimate.estimated_cost_usd,
            "analysis: selection and estimate"
        );

        if opts.interactive_mode
            && !self
                .confirmer
                .confirm(ConfirmPoint::PageSelection {
                    urls: &selected,
                    estimate: &estimate,
                })
                .await
        {
            return Err(AnalysisError::Discovery {
                url: seed.url,
                reason: "cancelled at page-selection checkpoint".into(),
            });
        }

        // Phase 4: execution.
        let store = Arc::new(
            ArtifactStore::open(&self.settings.output_root, &opts.project_id).await?,
        );
        self.write_initial_metadata(&store, &seed, opts, pages_discovered)
            .await?;

        let summary = self
            .execute(store.clone(), &seed, selected, include_step2, opts, None)
            .await?;

        // Phase 5: synthesis.
        self.synthesize(&store, &seed.url, &opts.project_id, &summary)
            .await?;

        Ok(AnalysisOutcome {
            workflow_id: summary.workflow_id,
            project_id: opts.project_id.clone(),
            seed_url: seed.url,
            state: summary.state,
            counts: summary.counts,
            pages_discovered,
            cost_estimate: estimate,
            usage: self.engine.usage_summary(),
            report_path: store.master_report_path(),
        })
    }

    /// Start a workflow over an explicit URL list (no discovery).
    pub async fn analyze_page_list(
        &self,
        urls: &[String],
        opts: &SiteAnalysisOptions,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if urls.is_empty() {
            return Err(AnalysisError::Config("no URLs supplied".into()));
        }

        let mut pages = Vec::with_capacity(urls.len());
        for url in urls {
            pages.push(normalize(url)?);
        }
        let seed = pages[0].clone();
        let include_step2 = opts
            .include_step2
            .unwrap_or_else(|| opts.analysis_mode.step2_default());
        let estimate = self.engine.estimate_cost(pages.len(), include_step2);

        let store = Arc::new(
            ArtifactStore::open(&self.settings.output_root, &opts.project_id).await?,
        );
        self.write_initial_metadata(&store, &seed, opts, pages.len())
            .await?;

        let page_count = pages.len();
        let summary = self
            .execute(store.clone(), &seed, pages, include_step2, opts, None)
            .await?;
        self.synthesize(&store, &seed.url, &opts.project_id, &summary)
            .await?;

        Ok(AnalysisOutcome {
            workflow_id: summary.workflow_id,
            project_id: opts.project_id.clone(),
            seed_url: seed.url,
            state: summary.state,
            counts: summary.counts,
            pages_discovered: page_count,
            cost_estimate: estimate,
            usage: self.engine.usage_summary(),
            report_path: store.master_report_path(),
        })
    }

    /// Resume a stopped workflow from its checkpoint file.
    ///
    /// Terminal pages are never re-processed; failed pages re-run only
    /// when `retry_failed` is set.
    pub async fn resume_workflow_from_checkpoint(
        &self,
        checkpoint_path: &Path,
        retry_failed: bool,
        opts: &SiteAnalysisOptions,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let checkpoint = CheckpointManager::load_from(checkpoint_path).await?;

        // progress/checkpoint.json sits two levels under the artifact root.
        let root = checkpoint_path
            .parent()
            .and_then(|p| p.parent())
            .ok_or_else(|| {
                AnalysisError::Config(format!(
                    "checkpoint path {} has no artifact root",
                    checkpoint_path.display()
                ))
            })?
            .to_path_buf();
        let store = Arc::new(ArtifactStore::open_at(root).await?);
        let project_id = store
            .project_id()
            .unwrap_or_else(|| opts.project_id.clone());

        let mut pages = Vec::new();
        for url in checkpoint
            .completed_pages
            .iter()
            .chain(checkpoint.skipped_pages.iter())
            .chain(checkpoint.failed_pages.iter())
            .chain(checkpoint.pending_pages.iter())
        {
            pages.push(normalize(url)?);
        }
        if pages.is_empty() {
            return Err(AnalysisError::Config("checkpoint lists no pages".into()));
        }
        let seed = pages[0].clone();

        let include_step2 = opts
            .include_step2
            .unwrap_or_else(|| opts.analysis_mode.step2_default());
        let estimate = self
            .engine
            .estimate_cost(checkpoint.pending_pages.len(), include_step2);

        info!(
            workflow_id = %checkpoint.workflow_id,
            pending = checkpoint.pending_pages.len(),
            completed = checkpoint.completed_pages.len(),
            retry_failed = retry_failed,
            "resuming workflow from checkpoint"
        );

        let mut resume_opts = opts.clone();
        resume_opts.project_id = project_id.clone();
        let page_count = pages.len();

        let summary = self
            .execute_with_resume(
                store.clone(),
                &seed,
                pages,
                include_step2,
                &resume_opts,
                Some(checkpoint),
                retry_failed,
            )
            .await?;
        self.synthesize(&store, &seed.url, &project_id, &summary).await?;

        Ok(AnalysisOutcome {
            workflow_id: summary.workflow_id,
            project_id,
            seed_url: seed.url,
            state: summary.state,
            counts: summary.counts,
            pages_discovered: page_count,
            cost_estimate: estimate,
            usage: self.engine.usage_summary(),
            report_path: store.master_report_path(),
        })
    }

    /// Control a running workflow.
    pub async fn control_workflow(
        &self,
        workflow_id: &str,
        action: WorkflowAction,
    ) -> Result<WorkflowState, AnalysisError> {
        let workflows = self.workflows.lock().await;
        let handle = workflows.get(workflow_id).ok_or_else(|| {
            AnalysisError::Config(format!("no active workflow with id {workflow_id}"))
        })?;

        match action {
            WorkflowAction::Pause => handle.pause(),
            WorkflowAction::Resume => handle.resume(),
            WorkflowAction::Stop => handle.stop(),
            WorkflowAction::Skip { url } => handle.skip(&url).await,
        }
        Ok(handle.state())
    }

    /// Stop every registered workflow (interrupt handling). Cooperative:
    /// callers still await the running analysis future, which settles
    /// after in-flight pages persist.
    pub async fn stop_all(&self) {
        for handle in self.workflows.lock().await.values() {
            handle.stop();
        }
    }

    /// Current counts and pending pages for a project.
    pub async fn get_analysis_status(
        &self,
        project_id: &str,
    ) -> Result<AnalysisStatus, AnalysisError> {
        let store =
            ArtifactStore::open(&self.settings.output_root, project_id).await?;

        let results = store.list_page_results().await.unwrap_or_default();
        let counts = tally(&results);

        let checkpoint = CheckpointManager::load_from(&store.checkpoint_path())
            .await
            .ok();

        Ok(AnalysisStatus {
            project_id: project_id.to_string(),
            counts,
            has_checkpoint: checkpoint.is_some(),
            pending_pages: checkpoint
                .map(|c| c.pending_pages)
                .unwrap_or_default(),
            report_path: store
                .master_report_path()
                .exists()
                .then(|| store.master_report_path()),
        })
    }

    async fn execute(
        &self,
        store: Arc<ArtifactStore>,
        seed: &NormalizedUrl,
        pages: Vec<NormalizedUrl>,
        include_step2: bool,
        opts: &SiteAnalysisOptions,
        checkpoint: Option<Checkpoint>,
    ) -> Result<WorkflowSummary, AnalysisError> {
        self.execute_with_resume(store, seed, pages, include_step2, opts, checkpoint, false)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_with_resume(
        &self,
        store: Arc<ArtifactStore>,
        seed: &NormalizedUrl,
        pages: Vec<NormalizedUrl>,
        include_step2: bool,
        opts: &SiteAnalysisOptions,
        checkpoint: Option<Checkpoint>,
        retry_failed: bool,
    ) -> Result<WorkflowSummary, AnalysisError> {
        let max_concurrent = opts
            .cost_priority
            .max_concurrent()
            .min(self.settings.max_concurrent_pages);
        let workflow_options = WorkflowOptions {
            max_concurrent,
            retry_failed_on_resume: retry_failed,
            ..Default::default()
        };

        let workflow = match checkpoint {
            Some(checkpoint) => {
                WorkflowEngine::resume_from(store.clone(), pages, workflow_options, checkpoint)
            }
            None => WorkflowEngine::new(store.clone(), pages, workflow_options),
        };
        let handle = workflow.handle();
        let workflow_id = handle.workflow_id().to_string();
        self.workflows
            .lock()
            .await
            .insert(workflow_id.clone(), handle);

        let pool = Arc::new(SessionPool::new(
            self.backend.clone(),
            max_concurrent,
            self.settings.headless,
        ));

        let processor = Arc::new(SiteProcessor {
            pool: pool.clone(),
            navigator: PageNavigator::new(),
            analyzer: PageAnalyzer::new(self.engine.clone()),
            store: store.clone(),
            docs: DocumentationGenerator::new(store, seed.url.clone(), opts.project_id.clone()),
            nav_opts: NavigateOptions {
                enable_screenshot: opts.enable_screenshots,
                capture_interactions: opts.capture_interactions,
                ..Default::default()
            },
            step2_enabled: include_step2,
            step2_gate: Some(opts.analysis_mode.step2_confidence_gate()),
            confirmer: self.confirmer.clone(),
            interactive: opts.interactive_mode,
            engine_kind: opts.browser_engine,
        });

        let summary = workflow.run(processor).await;

        pool.shutdown().await;
        self.workflows.lock().await.remove(&workflow_id);
        summary
    }

    async fn write_initial_metadata(
        &self,
        store: &ArtifactStore,
        seed: &NormalizedUrl,
        opts: &SiteAnalysisOptions,
        pages_discovered: usize,
    ) -> Result<(), AnalysisError> {
        let metadata = ProjectMetadata {
            project_id: opts.project_id.clone(),
            seed_url: seed.url.clone(),
            domain: seed.domain.clone(),
            created_at: chrono::Utc::now(),
            settings: serde_json::json!({
                "analysis_mode": opts.analysis_mode,
                "cost_priority": opts.cost_priority,
                "interactive_mode": opts.interactive_mode,
                "pages_discovered": pages_discovered,
            }),
            counts: ResultCounts::default(),
            quality_summary: serde_json::Value::Null,
        };
        store.write_metadata(&metadata).await
    }

    /// Final pass: master report from everything on disk, metadata with
    /// final counts and usage.
    async fn synthesize(
        &self,
        store: &Arc<ArtifactStore>,
        seed_url: &str,
        project_id: &str,
        _summary: &WorkflowSummary,
    ) -> Result<(), AnalysisError> {
        let docs = DocumentationGenerator::new(store.clone(), seed_url, project_id);
        docs.regenerate_master_report().await?;

        let results = store.list_page_results().await?;
        let counts = tally(&results);

        let quality_values: Vec<f64> = results
            .iter()
            .filter_map(|r| r.step2.as_completed().map(|f| f.quality.overall))
            .collect();
        let avg_quality = if quality_values.is_empty() {
            None
        } else {
            Some(quality_values.iter().sum::<f64>() / quality_values.len() as f64)
        };

        // A resumed run may predate the metadata file; start one fresh.
        let mut metadata = match store.read_json::<ProjectMetadata>(&store.metadata_path()).await {
            Ok(metadata) => metadata,
            Err(_) => ProjectMetadata {
                project_id: project_id.to_string(),
                seed_url: seed_url.to_string(),
                domain: normalize(seed_url).map(|u| u.domain).unwrap_or_default(),
                created_at: chrono::Utc::now(),
                settings: serde_json::Value::Null,
                counts: ResultCounts::default(),
                quality_summary: serde_json::Value::Null,
            },
        };
        metadata.counts = counts;
        metadata.quality_summary = serde_json::json!({
            "average_feature_quality": avg_quality,
            "usage": self.engine.usage_summary(),
        });
        store.write_metadata(&metadata).await
    }
}

fn tally(results: &[PageResult]) -> ResultCounts {
    let mut counts = ResultCounts {
        total: results.len(),
        ..Default::default()
    };
    for result in results {
        if result.is_partial() {
            counts.partial += 1;
            counts.completed += 1;
        } else if result.is_success() {
            counts.completed += 1;
        } else {
            counts.failed += 1;
        }
        if matches!(
            result.step2,
            crate::analysis::StepOutcome::Skipped { .. }
        ) {
            counts.skipped += 1;
        }
    }
    counts
}

/// Per-page pipeline: session, capture, analyze, persist, document.
struct SiteProcessor {
    pool: Arc<SessionPool>,
    navigator: PageNavigator,
    analyzer: PageAnalyzer,
    store: Arc<ArtifactStore>,
    docs: DocumentationGenerator,
    nav_opts: NavigateOptions,
    step2_enabled: bool,
    step2_gate: Option<f64>,
    confirmer: Arc<dyn Confirmer>,
    interactive: bool,
    engine_kind: Option<BrowserEngine>,
}

#[async_trait]
impl PageProcessor for SiteProcessor {
    async fn process(&self, url: &NormalizedUrl, page_id: &str) -> Result<PageResult, PageError> {
        // The worker owns exactly one session for the page's lifetime.
        let mut session = self
            .pool
            .acquire(self.engine_kind)
            .await
            .map_err(|e| PageError::BrowserCrash {
                url: url.url.clone(),
                reason: e.to_string(),
            })?;

        let captured = self
            .navigator
            .navigate_and_extract(&mut session, &url.url, &self.nav_opts)
            .await;

        let snapshot = match captured {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.pool.release(session).await;
                return Err(err);
            }
        };

        let snapshot_ref = match self.store.write_snapshot(page_id, &snapshot).await {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(url = %url, error = %e, "snapshot persistence failed, continuing");
                None
            }
        };

        let step2 = if !self.step2_enabled {
            Step2Mode::Disabled
        } else if self.interactive
            && !self
                .confirmer
                .confirm(ConfirmPoint::Step2Page { url: &url.url })
                .await
        {
            Step2Mode::Declined
        } else {
            Step2Mode::Run
        };

        let analyze_opts = AnalyzeOptions {
            step2,
            step2_confidence_gate: self.step2_gate,
        };
        let mut result = self.analyzer.analyze_page(page_id, &snapshot, &analyze_opts).await;
        result.snapshot_ref = snapshot_ref;

        self.pool.release(session).await;

        // Persist and document before the engine announces the terminal
        // state; failures here must not lose the analysis itself.
        if let Err(e) = self.store.write_page_result(&result).await {
            warn!(url = %url, error = %e, "page result persistence failed");
        }
        if let Err(e) = self.docs.on_page_finished(&result).await {
            warn!(url = %url, error = %e, "documentation update failed");
        }

        Ok(result)
    }
}

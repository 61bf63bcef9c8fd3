//! Sequential workflow engine.
//!
//! Takes an ordered page list and drives each page through
//! `queued -> running -> (completed | failed | skipped)` with a bounded
//! worker pool. Control (pause, resume, stop, skip) is cooperative:
//! workers check in at suspension points, in-flight pages always finalize
//! and persist before the workflow settles.
//!
//! Page-scoped failures stay inside their page's result. Checkpoint and
//! artifact I/O failures are a different class: they mean progress can no
//! longer be persisted, so the first one stops dequeuing, lets in-flight
//! pages finish, and aborts the run with that error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::checkpoint::{Checkpoint, CheckpointManager};
use super::progress::{PageState, ProgressCounts, ProgressEmitter, ProgressEvent, WorkflowState};
use crate::analysis::models::{PageResult, StepOutcome};
use crate::error::{AnalysisError, PageError};
use crate::storage::ArtifactStore;
use crate::urls::{slugify, NormalizedUrl};

/// Produces a [`PageResult`] for one URL. The orchestrator's implementation
/// navigates, analyzes, and persists the snapshot; tests substitute mocks.
///
/// `Err` means page infrastructure failed (navigation, browser); the engine
/// applies the per-page retry policy to retryable errors. `Ok` carries
/// whatever the analysis produced, including step failures.
#[async_trait]
pub trait PageProcessor: Send + Sync {
    async fn process(&self, url: &NormalizedUrl, page_id: &str) -> Result<PageResult, PageError>;
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub max_concurrent: usize,
    /// Retries after the first attempt for retryable page errors
    pub max_retries_per_page: u32,
    pub enable_checkpointing: bool,
    /// On resume, re-queue pages the checkpoint lists as failed
    pub retry_failed_on_resume: bool,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retries_per_page: 1,
            enable_checkpointing: true,
            retry_failed_on_resume: false,
        }
    }
}

/// Final accounting for a run.
#[derive(Debug, Clone)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub counts: ProgressCounts,
    pub results: Vec<PageResult>,
}

struct WorkPage {
    url: NormalizedUrl,
    page_id: String,
}

struct Inner {
    workflow_id: String,
    pages: Vec<WorkPage>,
    state_tx: watch::Sender<WorkflowState>,
    page_states: Mutex<HashMap<String, PageState>>,
    skip_requested: Mutex<HashSet<String>>,
    stop_token: CancellationToken,
    progress: ProgressEmitter,
    store: Arc<ArtifactStore>,
    checkpoints: CheckpointManager,
    options: WorkflowOptions,
    results: Mutex<Vec<PageResult>>,
    /// First fatal persistence error (checkpoint or artifact I/O); aborts
    /// the run once in-flight pages have drained.
    fatal: Mutex<Option<AnalysisError>>,
}

/// Control surface handed to callers; exposes progress and control but
/// never the engine internals.
#[derive(Clone)]
pub struct WorkflowHandle {
    inner: Arc<Inner>,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.inner.workflow_id
    }

    pub fn state(&self) -> WorkflowState {
        *self.inner.state_tx.borrow()
    }

    /// Stop dequeuing new pages; in-flight pages finish.
    pub fn pause(&self) {
        self.inner.state_tx.send_if_modified(|state| {
            if *state == WorkflowState::Running {
                *state = WorkflowState::Paused;
                true
            } else {
                false
            }
        });
    }

    /// Resume a paused workflow.
    pub fn resume(&self) {
        self.inner.state_tx.send_if_modified(|state| {
            if *state == WorkflowState::Paused {
                *state = WorkflowState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Stop the workflow. Cooperative: in-flight pages finalize and
    /// persist; the `run` future settles once they have.
    pub fn stop(&self) {
        self.inner.state_tx.send_replace(WorkflowState::Stopped);
        self.inner.stop_token.cancel();
    }

    /// Mark a URL to be skipped instead of processed.
    pub async fn skip(&self, url: &str) {
        self.inner.skip_requested.lock().await.insert(url.to_string());
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.inner.progress.subscribe()
    }

    /// Current counts snapshot.
    pub async fn counts(&self) -> ProgressCounts {
        self.inner.counts().await
    }
}

/// The sequential workflow engine.
pub struct WorkflowEngine {
    inner: Arc<Inner>,
}

impl WorkflowEngine {
    /// Build an engine over an ordered page list.
    pub fn new(store: Arc<ArtifactStore>, pages: Vec<NormalizedUrl>, options: WorkflowOptions) -> Self {
        Self::build(store, pages, options, None)
    }

    /// Build an engine resuming from a checkpoint: pages the checkpoint
    /// marks terminal are pre-settled and never re-processed (failed pages
    /// re-queue only when `retry_failed_on_resume` is set).
    pub fn resume_from(
        store: Arc<ArtifactStore>,
        pages: Vec<NormalizedUrl>,
        options: WorkflowOptions,
        checkpoint: Checkpoint,
    ) -> Self {
        Self::build(store, pages, options, Some(checkpoint))
    }

    fn build(
        store: Arc<ArtifactStore>,
        pages: Vec<NormalizedUrl>,
        options: WorkflowOptions,
        resume: Option<Checkpoint>,
    ) -> Self {
        let workflow_id = resume
            .as_ref()
            .map(|c| c.workflow_id.clone())
            .unwrap_or_else(|| format!("workflow-{}", Uuid::new_v4().simple()));

        let work: Vec<WorkPage> = pages
            .into_iter()
            .map(|url| WorkPage {
                page_id: slugify(&url),
                url,
            })
            .collect();

        let mut initial_states: HashMap<String, PageState> = HashMap::new();
        for page in &work {
            let state = match &resume {
                Some(cp) => {
                    if cp.completed_pages.iter().any(|u| u == &page.url.url) {
                        PageState::Completed
                    } else if cp.skipped_pages.iter().any(|u| u == &page.url.url) {
                        PageState::Skipped
                    } else if cp.failed_pages.iter().any(|u| u == &page.url.url)
                        && !options.retry_failed_on_resume
                    {
                        PageState::Failed
                    } else {
                        PageState::Queued
                    }
                }
                None => PageState::Queued,
            };
            initial_states.insert(page.url.url.clone(), state);
        }

        let (state_tx, _) = watch::channel(WorkflowState::Idle);
        let max_concurrent = options.max_concurrent.clamp(1, crate::config::MAX_SESSIONS_CAP);

        Self {
            inner: Arc::new(Inner {
                progress: ProgressEmitter::new(workflow_id.clone()),
                workflow_id,
                pages: work,
                state_tx,
                page_states: Mutex::new(initial_states),
                skip_requested: Mutex::new(HashSet::new()),
                stop_token: CancellationToken::new(),
                checkpoints: CheckpointManager::new(store.clone(), options.enable_checkpointing),
                store,
                options: WorkflowOptions {
                    max_concurrent,
                    ..options
                },
                results: Mutex::new(Vec::new()),
                fatal: Mutex::new(None),
            }),
        }
    }

    /// The control handle. Clone freely; it only reaches the control and
    /// progress surfaces.
    pub fn handle(&self) -> WorkflowHandle {
        WorkflowHandle {
            inner: self.inner.clone(),
        }
    }

    /// Run the workflow to a settled state.
    pub async fn run(self, processor: Arc<dyn PageProcessor>) -> Result<WorkflowSummary, AnalysisError> {
        let inner = self.inner;
        inner.state_tx.send_replace(WorkflowState::Running);
        info!(
            workflow_id = %inner.workflow_id,
            pages = inner.pages.len(),
            max_concurrent = inner.options.max_concurrent,
            "workflow starting"
        );

        let semaphore = Arc::new(Semaphore::new(inner.options.max_concurrent));
        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut state_rx = inner.state_tx.subscribe();

        for index in 0..inner.pages.len() {
            // Barrier point: honor pause and stop before each dequeue.
            loop {
                let current = *state_rx.borrow();
                if current != WorkflowState::Paused {
                    break;
                }
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
            if inner.stop_token.is_cancelled() {
                break;
            }

            let page = &inner.pages[index];

            // Pages settled by a resume checkpoint are not re-processed.
            if inner.state_of(&page.url.url).await.is_terminal() {
                continue;
            }

            // Skip requests settle without acquiring a worker.
            if inner.skip_requested.lock().await.contains(&page.url.url) {
                inner.settle(&page.url.url, PageState::Skipped).await?;
                continue;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = inner.stop_token.cancelled() => break,
            };
            // A worker may have stopped the run while this dequeue was
            // waiting on its permit.
            if inner.stop_token.is_cancelled() {
                break;
            }

            let inner_ref = inner.clone();
            let processor_ref = processor.clone();
            let url = page.url.clone();
            let page_id = page.page_id.clone();
            join_set.spawn(async move {
                // Held until error handling finishes, so a fatal failure
                // stops the dequeue loop before the slot frees up.
                let _permit = permit;
                if let Err(e) =
                    process_page(inner_ref.clone(), processor_ref, url, page_id).await
                {
                    inner_ref.record_worker_error(e).await;
                }
            });
        }

        // In-flight pages always finalize, stop or not.
        while join_set.join_next().await.is_some() {}

        // Checkpoint and artifact I/O failures are data-integrity class:
        // the run aborts with the error instead of reporting a state.
        if let Some(err) = inner.fatal.lock().await.take() {
            inner.state_tx.send_replace(WorkflowState::Stopped);
            error!(workflow_id = %inner.workflow_id, error = %err, "workflow aborted: progress can no longer be persisted");
            return Err(err);
        }

        let final_state = if inner.stop_token.is_cancelled() {
            WorkflowState::Stopped
        } else {
            WorkflowState::Completed
        };
        inner.state_tx.send_replace(final_state);

        let counts = inner.counts().await;
        info!(
            workflow_id = %inner.workflow_id,
            state = ?final_state,
            completed = counts.completed,
            failed = counts.failed,
            skipped = counts.skipped,
            pending = counts.pending,
            "workflow settled"
        );

        let results = inner.results.lock().await.clone();
        Ok(WorkflowSummary {
            workflow_id: inner.workflow_id.clone(),
            state: final_state,
            counts,
            results,
        })
    }
}

async fn process_page(
    inner: Arc<Inner>,
    processor: Arc<dyn PageProcessor>,
    url: NormalizedUrl,
    page_id: String,
) -> Result<(), AnalysisError> {
    inner.transition(&url.url, PageState::Running).await?;

    let max_attempts = inner.options.max_retries_per_page + 1;
    let mut attempt = 0u32;

    let result = loop {
        attempt += 1;
        match processor.process(&url, &page_id).await {
            Ok(result) => break result,
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(url = %url, attempt = attempt, error = %err, "page failed, retrying with a fresh session");
            }
            Err(err) => {
                let mut result = PageResult::empty(&page_id, &url.url);
                result.record_error(err.kind(), err.to_string(), attempt - 1);
                result.step1 = StepOutcome::Failed {
                    reason: err.to_string(),
                    raw_response: None,
                };
                break result;
            }
        }
    };

    // Persist before announcing: the artifact must exist when the
    // terminal progress event goes out.
    inner.store.write_page_result(&result).await?;

    let terminal = if result.step1.is_completed() {
        PageState::Completed
    } else {
        PageState::Failed
    };

    inner.progress.record_duration(result.processing_time_ms);
    inner.results.lock().await.push(result);
    inner.settle(&url.url, terminal).await
}

impl Inner {
    /// Classify a worker error. Persistence failures (checkpoint,
    /// artifact I/O) are fatal: keep the first one, stop dequeuing, and
    /// let `run` abort once in-flight pages drain. Anything else stays a
    /// warning; the page's own result already captured it.
    async fn record_worker_error(&self, err: AnalysisError) {
        match err {
            AnalysisError::Checkpoint(_) | AnalysisError::Io { .. } => {
                error!(error = %err, "fatal persistence failure in page worker");
                let mut fatal = self.fatal.lock().await;
                if fatal.is_none() {
                    *fatal = Some(err);
                }
                self.state_tx.send_replace(WorkflowState::Stopped);
                self.stop_token.cancel();
            }
            other => warn!(error = %other, "page worker failed to persist state"),
        }
    }

    async fn state_of(&self, url: &str) -> PageState {
        self.page_states
            .lock()
            .await
            .get(url)
            .copied()
            .unwrap_or(PageState::Queued)
    }

    async fn counts(&self) -> ProgressCounts {
        let states = self.page_states.lock().await;
        let mut counts = ProgressCounts::default();
        for state in states.values() {
            match state {
                PageState::Queued => counts.pending += 1,
                PageState::Running => counts.running += 1,
                PageState::Completed => counts.completed += 1,
                PageState::Failed => counts.failed += 1,
                PageState::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Move a page to a non-terminal state and emit the event.
    async fn transition(&self, url: &str, to: PageState) -> Result<(), AnalysisError> {
        let from = {
            let mut states = self.page_states.lock().await;
            let entry = states.entry(url.to_string()).or_insert(PageState::Queued);
            let from = *entry;
            *entry = to;
            from
        };
        let counts = self.counts().await;
        let event = self.progress.emit(url, from, to, counts);
        self.store.append_event(&serde_json::to_value(&event)?).await?;
        Ok(())
    }

    /// Move a page to a terminal state: checkpoint, then announce.
    async fn settle(&self, url: &str, to: PageState) -> Result<(), AnalysisError> {
        debug_assert!(to.is_terminal());
        let from = {
            let mut states = self.page_states.lock().await;
            let entry = states.entry(url.to_string()).or_insert(PageState::Queued);
            let from = *entry;
            *entry = to;
            from
        };

        self.checkpoints.write(&self.build_checkpoint().await).await?;

        let counts = self.counts().await;
        let event = self.progress.emit(url, from, to, counts);
        self.store.append_event(&serde_json::to_value(&event)?).await?;
        Ok(())
    }

    /// Checkpoint assembled from current page states, in queue order.
    async fn build_checkpoint(&self) -> Checkpoint {
        let states = self.page_states.lock().await;
        let mut checkpoint = Checkpoint {
            workflow_id: self.workflow_id.clone(),
            created_at: chrono::Utc::now(),
            completed_pages: Vec::new(),
            pending_pages: Vec::new(),
            failed_pages: Vec::new(),
            skipped_pages: Vec::new(),
            resume_token: self.store.root().display().to_string(),
        };
        for page in &self.pages {
            match states.get(&page.url.url).copied().unwrap_or(PageState::Queued) {
                PageState::Completed => checkpoint.completed_pages.push(page.url.url.clone()),
                PageState::Failed => checkpoint.failed_pages.push(page.url.url.clone()),
                PageState::Skipped => checkpoint.skipped_pages.push(page.url.url.clone()),
                PageState::Queued | PageState::Running => {
                    checkpoint.pending_pages.push(page.url.url.clone())
                }
            }
        }
        checkpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urls::normalize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingProcessor {
        calls: AtomicUsize,
        delay: Duration,
        fail_urls: Vec<String>,
    }

    impl CountingProcessor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(5),
                fail_urls: Vec::new(),
            }
        }

        fn failing_on(mut self, url: &str) -> Self {
            self.fail_urls.push(url.to_string());
            self
        }
    }

    #[async_trait]
    impl PageProcessor for CountingProcessor {
        async fn process(
            &self,
            url: &NormalizedUrl,
            page_id: &str,
        ) -> Result<PageResult, PageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;

            if self.fail_urls.contains(&url.url) {
                return Err(PageError::NavigationTimeout {
                    url: url.url.clone(),
                    timeout_ms: 1,
                });
            }

            let mut result = PageResult::empty(page_id, &url.url);
            result.step1 = StepOutcome::Completed(crate::testing::sample_summary());
            result.processing_time_ms = 5;
            Ok(result)
        }
    }

    fn urls(names: &[&str]) -> Vec<NormalizedUrl> {
        names
            .iter()
            .map(|n| normalize(&format!("https://example.com/{n}")).unwrap())
            .collect()
    }

    async fn store() -> (TempDir, Arc<ArtifactStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::open(dir.path(), "wf-test").await.unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn test_all_pages_complete() {
        let (_dir, store) = store().await;
        let engine = WorkflowEngine::new(store.clone(), urls(&["a", "b", "c"]), WorkflowOptions::default());

        let summary = engine
            .run(Arc::new(CountingProcessor::new()))
            .await
            .unwrap();

        assert_eq!(summary.state, WorkflowState::Completed);
        assert_eq!(summary.counts.completed, 3);
        assert_eq!(summary.counts.total(), 3);

        // Artifacts and checkpoint written
        assert_eq!(store.list_page_results().await.unwrap().len(), 3);
        let checkpoint = CheckpointManager::load_from(&store.checkpoint_path())
            .await
            .unwrap();
        assert_eq!(checkpoint.completed_pages.len(), 3);
        assert!(checkpoint.pending_pages.is_empty());
    }

    #[tokio::test]
    async fn test_retryable_failure_retries_then_fails() {
        let (_dir, store) = store().await;
        let processor = Arc::new(CountingProcessor::new().failing_on("https://example.com/bad"));
        let engine = WorkflowEngine::new(
            store,
            urls(&["bad"]),
            WorkflowOptions {
                max_retries_per_page: 2,
                ..Default::default()
            },
        );

        let summary = engine.run(processor.clone()).await.unwrap();

        assert_eq!(summary.counts.failed, 1);
        // 1 attempt + 2 retries
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(summary.results[0].step1, StepOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_skip_settles_without_processing() {
        let (_dir, store) = store().await;
        let processor = Arc::new(CountingProcessor::new());
        let engine = WorkflowEngine::new(store, urls(&["a", "b"]), WorkflowOptions::default());

        let handle = engine.handle();
        handle.skip("https://example.com/b").await;

        let summary = engine.run(processor.clone()).await.unwrap();

        assert_eq!(summary.counts.completed, 1);
        assert_eq!(summary.counts.skipped, 1);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_preserves_pending_in_checkpoint() {
        let (_dir, store) = store().await;
        let processor = Arc::new(CountingProcessor {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            fail_urls: vec![],
        });
        let engine = WorkflowEngine::new(
            store.clone(),
            urls(&["a", "b", "c", "d"]),
            WorkflowOptions {
                max_concurrent: 1,
                ..Default::default()
            },
        );
        let handle = engine.handle();

        let run = tokio::spawn(engine.run(processor));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop();

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.state, WorkflowState::Stopped);
        // Every page is in exactly one bucket
        assert_eq!(summary.counts.total(), 4);
        assert!(summary.counts.pending > 0);

        let checkpoint = CheckpointManager::load_from(&store.checkpoint_path())
            .await
            .unwrap();
        assert!(!checkpoint.pending_pages.is_empty());
        assert!(!checkpoint.completed_pages.is_empty());
    }

    #[tokio::test]
    async fn test_pause_blocks_dequeue_resume_continues() {
        let (_dir, store) = store().await;
        let processor = Arc::new(CountingProcessor {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(30),
            fail_urls: vec![],
        });
        let engine = WorkflowEngine::new(
            store,
            urls(&["a", "b", "c"]),
            WorkflowOptions {
                max_concurrent: 1,
                ..Default::default()
            },
        );
        let handle = engine.handle();

        let run = tokio::spawn(engine.run(processor.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.pause();
        assert_eq!(handle.state(), WorkflowState::Paused);

        let calls_at_pause = processor.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // No new dequeues while paused (the in-flight page may finish)
        assert!(processor.calls.load(Ordering::SeqCst) <= calls_at_pause + 1);

        handle.resume();
        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.state, WorkflowState::Completed);
        assert_eq!(summary.counts.completed, 3);
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_aborts_run() {
        let (_dir, store) = store().await;

        // A directory squatting on the checkpoint path makes the atomic
        // rename fail on every attempt.
        std::fs::create_dir(store.checkpoint_path()).unwrap();

        let processor = Arc::new(CountingProcessor::new());
        let engine = WorkflowEngine::new(
            store.clone(),
            urls(&["a", "b", "c"]),
            WorkflowOptions {
                max_concurrent: 1,
                ..Default::default()
            },
        );
        let handle = engine.handle();

        let err = engine.run(processor.clone()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Checkpoint(_)));
        assert_eq!(handle.state(), WorkflowState::Stopped);

        // The first page's failure stops dequeuing; the rest never run.
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint_skips_terminal_pages() {
        let (_dir, store) = store().await;
        let processor = Arc::new(CountingProcessor::new());

        let checkpoint = Checkpoint {
            workflow_id: "wf-resume".into(),
            created_at: chrono::Utc::now(),
            completed_pages: vec![
                "https://example.com/a".into(),
                "https://example.com/b".into(),
            ],
            pending_pages: vec![
                "https://example.com/c".into(),
                "https://example.com/d".into(),
            ],
            failed_pages: vec![],
            skipped_pages: vec![],
            resume_token: "t".into(),
        };

        let engine = WorkflowEngine::resume_from(
            store,
            urls(&["a", "b", "c", "d"]),
            WorkflowOptions::default(),
            checkpoint,
        );
        let summary = engine.run(processor.clone()).await.unwrap();

        // Only c and d processed
        assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.counts.completed, 4);
        assert_eq!(summary.workflow_id, "wf-resume");
    }

    #[tokio::test]
    async fn test_resume_requeues_failed_only_on_opt_in() {
        let (_dir, store) = store().await;
        let checkpoint = Checkpoint {
            workflow_id: "wf-x".into(),
            created_at: chrono::Utc::now(),
            completed_pages: vec![],
            pending_pages: vec![],
            failed_pages: vec!["https://example.com/a".into()],
            skipped_pages: vec![],
            resume_token: "t".into(),
        };

        let processor = Arc::new(CountingProcessor::new());
        let engine = WorkflowEngine::resume_from(
            store.clone(),
            urls(&["a"]),
            WorkflowOptions::default(),
            checkpoint.clone(),
        );
        engine.run(processor.clone()).await.unwrap();
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);

        let engine = WorkflowEngine::resume_from(
            store,
            urls(&["a"]),
            WorkflowOptions {
                retry_failed_on_resume: true,
                ..Default::default()
            },
            checkpoint,
        );
        engine.run(processor.clone()).await.unwrap();
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }
}

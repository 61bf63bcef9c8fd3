//! Workflow progress events and ETA tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Smoothing factor for the per-page duration EMA.
const ETA_ALPHA: f64 = 0.3;

/// Per-page lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl PageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PageState::Completed | PageState::Failed | PageState::Skipped
        )
    }
}

/// Workflow-level states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

/// Snapshot of page counts at an instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub skipped: usize,
    pub running: usize,
}

impl ProgressCounts {
    /// Invariant: every queued page is in exactly one bucket.
    pub fn total(&self) -> usize {
        self.completed + self.pending + self.failed + self.skipped + self.running
    }
}

/// Emitted on every page state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: DateTime<Utc>,
    pub workflow_id: String,
    pub page_url: String,
    pub from_state: PageState,
    pub to_state: PageState,
    pub counts: ProgressCounts,
    /// Estimated remaining time; absent until one page has finished
    pub eta_ms: Option<u64>,
}

/// Fan-out progress emitter with an EMA-based ETA.
pub struct ProgressEmitter {
    workflow_id: String,
    sender: broadcast::Sender<ProgressEvent>,
    ema_ms: std::sync::Mutex<Option<f64>>,
}

impl ProgressEmitter {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            workflow_id: workflow_id.into(),
            sender,
            ema_ms: std::sync::Mutex::new(None),
        }
    }

    /// Subscribe to the event stream. Slow receivers lag, never block.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Fold a finished page's duration into the EMA.
    pub fn record_duration(&self, duration_ms: u64) {
        let mut ema = self.ema_ms.lock().expect("ema lock poisoned");
        *ema = Some(match *ema {
            Some(current) => current * (1.0 - ETA_ALPHA) + duration_ms as f64 * ETA_ALPHA,
            None => duration_ms as f64,
        });
    }

    /// Remaining-time estimate for `outstanding` pages.
    pub fn eta_ms(&self, outstanding: usize) -> Option<u64> {
        self.ema_ms
            .lock()
            .expect("ema lock poisoned")
            .map(|ema| (ema * outstanding as f64) as u64)
    }

    /// Build and emit an event; returns it so the caller can persist it.
    pub fn emit(
        &self,
        page_url: &str,
        from_state: PageState,
        to_state: PageState,
        counts: ProgressCounts,
    ) -> ProgressEvent {
        let event = ProgressEvent {
            ts: Utc::now(),
            workflow_id: self.workflow_id.clone(),
            page_url: page_url.to_string(),
            from_state,
            to_state,
            counts,
            eta_ms: self.eta_ms(counts.pending + counts.running),
        };
        // No receivers is fine; events still reach the on-disk log.
        let _ = self.sender.send(event.clone());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_total() {
        let counts = ProgressCounts {
            completed: 2,
            pending: 3,
            failed: 1,
            skipped: 1,
            running: 1,
        };
        assert_eq!(counts.total(), 8);
    }

    #[test]
    fn test_ema_converges_toward_recent_durations() {
        let emitter = ProgressEmitter::new("wf-1");
        assert_eq!(emitter.eta_ms(5), None);

        emitter.record_duration(1000);
        assert_eq!(emitter.eta_ms(2), Some(2000));

        // Pulled toward faster pages
        emitter.record_duration(100);
        let eta = emitter.eta_ms(1).unwrap();
        assert!(eta < 1000);
        assert!(eta > 100);
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let emitter = ProgressEmitter::new("wf-2");
        let mut receiver = emitter.subscribe();

        emitter.emit(
            "https://example.com/",
            PageState::Queued,
            PageState::Running,
            ProgressCounts::default(),
        );

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.workflow_id, "wf-2");
        assert_eq!(event.to_state, PageState::Running);
    }
}

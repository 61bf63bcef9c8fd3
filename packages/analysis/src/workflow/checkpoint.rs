//! Atomic workflow checkpoints.
//!
//! The checkpoint is rewritten after every page reaches a terminal state.
//! Writes are totally ordered by a mutex; the file itself is replaced
//! atomically so a resume never sees a torn checkpoint.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::AnalysisError;
use crate::storage::ArtifactStore;

/// Persisted record of workflow progress sufficient to resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: String,
    pub created_at: DateTime<Utc>,
    pub completed_pages: Vec<String>,
    pub pending_pages: Vec<String>,
    pub failed_pages: Vec<String>,
    #[serde(default)]
    pub skipped_pages: Vec<String>,
    /// Opaque token tying a resume to this run's artifact root
    pub resume_token: String,
}

impl Checkpoint {
    /// Whether a URL already reached a terminal state in this checkpoint.
    pub fn is_terminal(&self, url: &str) -> bool {
        self.completed_pages.iter().any(|u| u == url)
            || self.failed_pages.iter().any(|u| u == url)
            || self.skipped_pages.iter().any(|u| u == url)
    }
}

/// Serializes checkpoint writes against one artifact store.
pub struct CheckpointManager {
    store: Arc<ArtifactStore>,
    lock: Mutex<()>,
    enabled: bool,
}

impl CheckpointManager {
    pub fn new(store: Arc<ArtifactStore>, enabled: bool) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            enabled,
        }
    }

    /// Atomically replace the checkpoint file.
    ///
    /// A checkpoint that cannot be persisted is a data-integrity failure,
    /// so the I/O error is escalated rather than logged away.
    pub async fn write(&self, checkpoint: &Checkpoint) -> Result<(), AnalysisError> {
        if !self.enabled {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        self.store
            .write_json_atomic(&self.store.checkpoint_path(), checkpoint)
            .await
            .map_err(|e| match e {
                AnalysisError::Io { source, .. } => AnalysisError::Checkpoint(source),
                other => other,
            })
    }

    /// Load the checkpoint from this store's standard location.
    pub async fn load(&self) -> Result<Checkpoint, AnalysisError> {
        Self::load_from(&self.store.checkpoint_path()).await
    }

    /// Load a checkpoint from an explicit path (resume entry point).
    pub async fn load_from(path: &Path) -> Result<Checkpoint, AnalysisError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(AnalysisError::Checkpoint)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

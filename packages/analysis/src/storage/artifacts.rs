//! On-disk artifact store.
//!
//! Owns every mutation under the project root. All writes are atomic
//! (write-temp + rename in the same directory); the master report
//! additionally serializes through an advisory lock held only around the
//! rename. Filenames derive from `slugify(url)` so reruns are stable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analysis::models::PageResult;
use crate::browser::PageSnapshot;
use crate::error::AnalysisError;

/// Directory under the project root that holds all artifacts.
const ARTIFACT_DIR: &str = "docs/web_discovery";

/// Run-level counts persisted in the metadata file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResultCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Step 1 succeeded, step 2 failed
    pub partial: usize,
}

/// Project-level metadata, rewritten as the run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_id: String,
    pub seed_url: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
    /// Options the run was started with
    pub settings: serde_json::Value,
    pub counts: ResultCounts,
    /// Usage and average-quality figures
    pub quality_summary: serde_json::Value,
}

/// Artifact store rooted at `<output_root>/<project_id>/docs/web_discovery/`.
pub struct ArtifactStore {
    root: PathBuf,
    /// Serializes master-report writers; the lock file on disk is advisory
    /// for outside observers.
    report_lock: Mutex<()>,
    /// Serializes event-log appends.
    events_lock: Mutex<()>,
}

impl ArtifactStore {
    /// Open (creating directories for) a project's artifact root.
    pub async fn open(output_root: &Path, project_id: &str) -> Result<Self, AnalysisError> {
        let root = output_root.join(project_id).join(ARTIFACT_DIR);
        for sub in ["pages", "progress", "reports"] {
            let dir = root.join(sub);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| AnalysisError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(Self {
            root,
            report_lock: Mutex::new(()),
            events_lock: Mutex::new(()),
        })
    }

    /// Open a store directly at an existing artifact root (resume path).
    pub async fn open_at(root: PathBuf) -> Result<Self, AnalysisError> {
        for sub in ["pages", "progress", "reports"] {
            let dir = root.join(sub);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| AnalysisError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(Self {
            root,
            report_lock: Mutex::new(()),
            events_lock: Mutex::new(()),
        })
    }

    /// The artifact root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project id inferred from the root layout
    /// (`<output_root>/<project_id>/docs/web_discovery`).
    pub fn project_id(&self) -> Option<String> {
        self.root
            .parent()
            .and_then(|docs| docs.parent())
            .and_then(|project| project.file_name())
            .map(|name| name.to_string_lossy().to_string())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("progress/checkpoint.json")
    }

    pub fn master_report_path(&self) -> PathBuf {
        self.root.join("analysis-report.md")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("analysis-metadata.json")
    }

    pub fn page_markdown_path(&self, page_id: &str) -> PathBuf {
        self.root.join(format!("pages/page-{page_id}.md"))
    }

    pub fn page_json_path(&self, page_id: &str) -> PathBuf {
        self.root.join(format!("pages/page-{page_id}.json"))
    }

    pub fn page_screenshot_path(&self, page_id: &str) -> PathBuf {
        self.root.join(format!("pages/page-{page_id}.png"))
    }

    /// Persist the structured result for a page.
    pub async fn write_page_result(&self, result: &PageResult) -> Result<(), AnalysisError> {
        self.write_json_atomic(&self.page_json_path(&result.page_id), result)
            .await
    }

    /// Persist a page's captured snapshot (sans screenshot bytes) next to
    /// its result, returning the relative path for `snapshot_ref`.
    pub async fn write_snapshot(
        &self,
        page_id: &str,
        snapshot: &PageSnapshot,
    ) -> Result<String, AnalysisError> {
        let path = self.root.join(format!("pages/page-{page_id}.snapshot.json"));
        self.write_json_atomic(&path, snapshot).await?;

        if let Some(bytes) = &snapshot.screenshot {
            self.write_bytes_atomic(&self.page_screenshot_path(page_id), bytes)
                .await?;
        }
        Ok(format!("pages/page-{page_id}.snapshot.json"))
    }

    /// Persist a page's rendered markdown.
    pub async fn write_page_markdown(
        &self,
        page_id: &str,
        content: &str,
    ) -> Result<(), AnalysisError> {
        self.write_bytes_atomic(&self.page_markdown_path(page_id), content.as_bytes())
            .await
    }

    /// Replace the master report under the advisory lock.
    ///
    /// The full rewrite happens into a temp file first; the lock is held
    /// only around the publish rename, so readers never see a torn file.
    pub async fn publish_master_report(&self, content: &str) -> Result<(), AnalysisError> {
        let path = self.master_report_path();
        let tmp = self.temp_path(&path);
        write_file(&tmp, content.as_bytes()).await?;

        let _guard = self.report_lock.lock().await;
        let lock_file = self.root.join("analysis-report.md.lock");
        let _ = tokio::fs::write(&lock_file, b"").await;
        let result = rename(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&lock_file).await;
        result
    }

    /// Write project metadata.
    pub async fn write_metadata(&self, metadata: &ProjectMetadata) -> Result<(), AnalysisError> {
        self.write_json_atomic(&self.metadata_path(), metadata).await
    }

    /// Write an auxiliary report under `reports/`.
    pub async fn write_report(&self, name: &str, content: &str) -> Result<(), AnalysisError> {
        let path = self.root.join("reports").join(name);
        self.write_bytes_atomic(&path, content.as_bytes()).await
    }

    /// Append one JSON line to the progress event log.
    pub async fn append_event(&self, event: &serde_json::Value) -> Result<(), AnalysisError> {
        let _guard = self.events_lock.lock().await;
        let path = self.root.join("progress/events.log");
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AnalysisError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AnalysisError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(())
    }

    /// Read back a persisted JSON artifact.
    pub async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, AnalysisError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| AnalysisError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All persisted page results, ordered by page id for determinism.
    pub async fn list_page_results(&self) -> Result<Vec<PageResult>, AnalysisError> {
        let pages_dir = self.root.join("pages");
        let mut results = Vec::new();

        let mut entries =
            tokio::fs::read_dir(&pages_dir)
                .await
                .map_err(|e| AnalysisError::Io {
                    path: pages_dir.display().to_string(),
                    source: e,
                })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| AnalysisError::Io {
            path: pages_dir.display().to_string(),
            source: e,
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("page-")
                && name.ends_with(".json")
                && !name.ends_with(".snapshot.json")
            {
                match self.read_json::<PageResult>(&entry.path()).await {
                    Ok(result) => results.push(result),
                    Err(e) => warn!(file = %name, error = %e, "skipping unreadable page result"),
                }
            }
        }

        results.sort_by(|a, b| a.page_id.cmp(&b.page_id));
        Ok(results)
    }

    /// Generic atomic JSON write, used by the checkpoint manager too.
    pub async fn write_json_atomic<T: Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), AnalysisError> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_bytes_atomic(path, &json).await
    }

    /// Atomic byte write with one retry on transient failure.
    pub async fn write_bytes_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), AnalysisError> {
        match self.try_write_atomic(path, bytes).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(path = %path.display(), error = %first, "atomic write failed, retrying once");
                self.try_write_atomic(path, bytes).await
            }
        }
    }

    async fn try_write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), AnalysisError> {
        let tmp = self.temp_path(path);
        write_file(&tmp, bytes).await?;
        rename(&tmp, path).await
    }

    /// Temp file in the same directory as the target, so rename stays on
    /// one filesystem.
    fn temp_path(&self, target: &Path) -> PathBuf {
        let dir = target.parent().unwrap_or(&self.root);
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".into());
        dir.join(format!(".{name}.tmp-{}", Uuid::new_v4().simple()))
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), AnalysisError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| AnalysisError::Io {
            path: path.display().to_string(),
            source: e,
        })
}

async fn rename(from: &Path, to: &Path) -> Result<(), AnalysisError> {
    let result = tokio::fs::rename(from, to)
        .await
        .map_err(|e| AnalysisError::Io {
            path: to.display().to_string(),
            source: e,
        });
    if result.is_err() {
        let _ = tokio::fs::remove_file(from).await;
    } else {
        debug!(path = %to.display(), "artifact published");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::StepOutcome;
    use tempfile::TempDir;

    async fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path(), "test-project").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_layout_created() {
        let (_dir, store) = store().await;
        assert!(store.root().join("pages").is_dir());
        assert!(store.root().join("progress").is_dir());
        assert!(store.root().join("reports").is_dir());
    }

    #[tokio::test]
    async fn test_page_result_round_trip() {
        let (_dir, store) = store().await;

        let mut result = PageResult::empty("example-com-about", "https://example.com/about");
        result.step2 = StepOutcome::Skipped {
            reason: "disabled".into(),
        };
        store.write_page_result(&result).await.unwrap();

        let listed = store.list_page_results().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].page_id, "example-com-about");
        assert!(matches!(listed[0].step2, StepOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let (_dir, store) = store().await;
        store
            .write_page_markdown("p1", "# Page\n")
            .await
            .unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(store.root().join("pages")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["page-p1.md"]);
    }

    #[tokio::test]
    async fn test_master_report_publish_is_full_replace() {
        let (_dir, store) = store().await;
        store.publish_master_report("# v1\n").await.unwrap();
        store.publish_master_report("# v2\n").await.unwrap();

        let content = tokio::fs::read_to_string(store.master_report_path())
            .await
            .unwrap();
        assert_eq!(content, "# v2\n");
        // Lock file removed after publish
        assert!(!store.root().join("analysis-report.md.lock").exists());
    }

    #[tokio::test]
    async fn test_event_log_appends_json_lines() {
        let (_dir, store) = store().await;
        store
            .append_event(&serde_json::json!({"kind": "a"}))
            .await
            .unwrap();
        store
            .append_event(&serde_json::json!({"kind": "b"}))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(store.root().join("progress/events.log"))
            .await
            .unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"a\""));
    }
}

//! Documentation generation: per-page markdown and the incremental master
//! report.

pub mod pages;
pub mod report;

use std::sync::Arc;

use crate::analysis::models::PageResult;
use crate::error::AnalysisError;
use crate::storage::ArtifactStore;

pub use pages::render_page;
pub use report::render_master_report;

/// Writes page documents and keeps the master report current.
pub struct DocumentationGenerator {
    store: Arc<ArtifactStore>,
    seed_url: String,
    project_id: String,
}

impl DocumentationGenerator {
    pub fn new(store: Arc<ArtifactStore>, seed_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            store,
            seed_url: seed_url.into(),
            project_id: project_id.into(),
        }
    }

    /// Incremental update after one page reaches a terminal state:
    /// (re)write its markdown atomically, then rebuild the master report
    /// from everything on disk and publish it with one rename.
    pub async fn on_page_finished(&self, result: &PageResult) -> Result<(), AnalysisError> {
        let markdown = render_page(result);
        self.store
            .write_page_markdown(&result.page_id, &markdown)
            .await?;
        self.regenerate_master_report().await
    }

    /// Rebuild the master report from the persisted page results.
    pub async fn regenerate_master_report(&self) -> Result<(), AnalysisError> {
        let results = self.store.list_page_results().await?;
        let report = render_master_report(&self.seed_url, &self.project_id, &results);
        self.store.publish_master_report(&report).await
    }
}

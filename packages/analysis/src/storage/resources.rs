//! Read-only URI addressing over persisted artifacts.
//!
//! Scheme: `web_discovery://<project_id>/<relative_path>`. Listing and
//! retrieval only; every write goes through the artifact store.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::AnalysisError;

/// URI scheme prefix.
pub const SCHEME: &str = "web_discovery://";

/// One listed artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceEntry {
    pub uri: String,
    pub relative_path: String,
    pub size_bytes: u64,
    pub mime: &'static str,
}

/// Retrieved artifact content.
#[derive(Debug, Clone)]
pub struct ResourceContent {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Read-only view over one output root.
pub struct ResourceExposer {
    output_root: PathBuf,
}

impl ResourceExposer {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    /// Enumerate all artifacts for a project, sorted by path.
    pub async fn list(&self, project_id: &str) -> Result<Vec<ResourceEntry>, AnalysisError> {
        let root = self
            .output_root
            .join(project_id)
            .join("docs/web_discovery");
        let mut entries = Vec::new();
        collect(&root, &root, project_id, &mut entries).await?;
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(entries)
    }

    /// Fetch one artifact by URI.
    pub async fn get(&self, uri: &str) -> Result<ResourceContent, AnalysisError> {
        let (project_id, relative) = parse_uri(uri)?;

        let root = self
            .output_root
            .join(&project_id)
            .join("docs/web_discovery");
        let path = root.join(&relative);

        // The URI parser rejects traversal, but keep the check close to
        // the filesystem access.
        if !path.starts_with(&root) {
            return Err(AnalysisError::InvalidUrl {
                url: uri.to_string(),
                reason: "path escapes project root".into(),
            });
        }

        let bytes = tokio::fs::read(&path).await.map_err(|e| AnalysisError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Ok(ResourceContent {
            mime: mime_for(&path),
            bytes,
        })
    }
}

fn parse_uri(uri: &str) -> Result<(String, PathBuf), AnalysisError> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| AnalysisError::InvalidUrl {
            url: uri.to_string(),
            reason: format!("expected {SCHEME} scheme"),
        })?;

    let (project_id, relative) = rest.split_once('/').ok_or_else(|| AnalysisError::InvalidUrl {
        url: uri.to_string(),
        reason: "missing relative path".into(),
    })?;

    if project_id.is_empty() || relative.is_empty() {
        return Err(AnalysisError::InvalidUrl {
            url: uri.to_string(),
            reason: "empty project id or path".into(),
        });
    }

    let relative_path = PathBuf::from(relative);
    let traversal = relative_path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if traversal {
        return Err(AnalysisError::InvalidUrl {
            url: uri.to_string(),
            reason: "path traversal rejected".into(),
        });
    }

    Ok((project_id.to_string(), relative_path))
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
}

async fn collect(
    root: &Path,
    dir: &Path,
    project_id: &str,
    out: &mut Vec<ResourceEntry>,
) -> Result<(), AnalysisError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        // A project with no artifacts lists as empty, not as an error.
        Err(_) => return Ok(()),
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| AnalysisError::Io {
        path: dir.display().to_string(),
        source: e,
    })? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| AnalysisError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        if file_type.is_dir() {
            Box::pin(collect(root, &path, project_id, out)).await?;
        } else if file_type.is_file() {
            let name = entry.file_name().to_string_lossy().to_string();
            // Lock and temp files are implementation details.
            if name.ends_with(".lock") || name.starts_with('.') {
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            out.push(ResourceEntry {
                uri: format!("{SCHEME}{project_id}/{relative}"),
                relative_path: relative,
                size_bytes,
                mime: mime_for(&path),
            });
        }
    }
    Ok(())
}

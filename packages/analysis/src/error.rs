//! Typed errors for the analysis library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Page-scoped errors
//! are captured into the page's result and never abort the workflow;
//! configuration, zero-URL discovery, and checkpoint failures are fatal.

use thiserror::Error;

/// Errors that abort the whole run or a top-level operation.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Missing/invalid environment variable or unknown model. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// URL failed normalization. Surfaces to the caller; never retried.
    #[error("invalid URL: {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Robots/sitemap/crawl all failed, or the inventory came back empty.
    #[error("discovery failed for {url}: {reason}")]
    Discovery { url: String, reason: String },

    /// Progress could not be persisted. Data-integrity class, fatal.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[source] std::io::Error),

    /// Artifact write failed after retry. Fatal if repeated.
    #[error("artifact I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Page-scoped failure escalated to the caller (single-page entry points).
    #[error(transparent)]
    Page(#[from] PageError),

    /// JSON (de)serialization of persisted state failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors scoped to a single page. These land in `PageResult::errors`.
#[derive(Debug, Error)]
pub enum PageError {
    /// Navigation did not finish inside the timeout.
    #[error("navigation timed out after {timeout_ms}ms: {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Page responded with HTTP >= 400 or exceeded the redirect budget.
    #[error("navigation failed ({status}): {url}")]
    NavigationFailure { url: String, status: u16 },

    /// The browser session died under the page.
    #[error("browser crashed while processing {url}: {reason}")]
    BrowserCrash { url: String, reason: String },

    /// Facade retries and the fallback model were both exhausted.
    #[error("LLM call failed for {url}: {source}")]
    Llm {
        url: String,
        #[source]
        source: llm_client::LlmError,
    },

    /// Response stayed schema-invalid or under the quality floor after the
    /// hardened retry and the fallback model.
    #[error("analysis quality failure for {url} ({stage}): {reason}")]
    AnalysisQuality {
        url: String,
        stage: AnalysisStage,
        reason: String,
    },
}

impl PageError {
    /// Short machine-readable kind for progress events and artifacts.
    pub fn kind(&self) -> &'static str {
        match self {
            PageError::NavigationTimeout { .. } => "navigation_timeout",
            PageError::NavigationFailure { .. } => "navigation_failure",
            PageError::BrowserCrash { .. } => "browser_crash",
            PageError::Llm { .. } => "llm_error",
            PageError::AnalysisQuality { .. } => "analysis_quality",
        }
    }

    /// Whether the workflow retry policy should re-queue the page.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PageError::NavigationTimeout { .. } | PageError::BrowserCrash { .. }
        )
    }
}

/// Which LLM pass produced a quality failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Summary,
    Features,
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStage::Summary => f.write_str("step1"),
            AnalysisStage::Features => f.write_str("step2"),
        }
    }
}

/// Result alias for top-level operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Result alias for page-scoped operations.
pub type PageResultT<T> = std::result::Result<T, PageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_error_kinds() {
        let err = PageError::NavigationFailure {
            url: "https://example.com/404".into(),
            status: 404,
        };
        assert_eq!(err.kind(), "navigation_failure");
        assert!(!err.is_retryable());

        let crash = PageError::BrowserCrash {
            url: "https://example.com".into(),
            reason: "target closed".into(),
        };
        assert!(crash.is_retryable());
    }
}

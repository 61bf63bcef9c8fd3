//! Headless browser integration: backends, session pool, navigation.

pub mod backend;
pub mod interaction;
pub mod navigator;
pub mod network;
pub mod session;

pub use backend::{BrowserBackend, BrowserHandle, CdpBackend, Navigation, PageHandle};
pub use interaction::{InteractionLog, InteractionPlan, InteractionStep};
pub use navigator::{DomStats, NavigateOptions, PageNavigator, PageSnapshot, TechSignals};
pub use network::{ApiEndpoint, NetworkEvent, NetworkLog, ThirdPartyService};
pub use session::{PoolMetrics, Session, SessionPool};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Browser engines the pool can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserEngine::Chromium),
            "firefox" => Ok(BrowserEngine::Firefox),
            "webkit" => Ok(BrowserEngine::Webkit),
            other => Err(format!("unknown browser engine: {other}")),
        }
    }
}

impl std::fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the browser layer. The navigator maps these into page-scoped
/// errors with URL context.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch {engine}: {reason}")]
    Launch { engine: BrowserEngine, reason: String },

    #[error("engine {engine} requires a configured executable")]
    EngineUnavailable { engine: BrowserEngine },

    #[error("browser session crashed: {0}")]
    Crashed(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("script evaluation failed: {0}")]
    Evaluate(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),
}

/// Result alias for browser operations.
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_parse() {
        assert_eq!(
            "chromium".parse::<BrowserEngine>().unwrap(),
            BrowserEngine::Chromium
        );
        assert_eq!(
            "Firefox".parse::<BrowserEngine>().unwrap(),
            BrowserEngine::Firefox
        );
        assert!("opera".parse::<BrowserEngine>().is_err());
    }
}

//! Page navigation and content capture.
//!
//! Produces the [`PageSnapshot`] the analyzer consumes: final URL and
//! status, DOM text and metadata, network log with derived API views, and
//! optional screenshot and interaction history.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::interaction::{InteractionLog, InteractionPlan};
use super::network::NetworkLog;
use super::session::Session;
use crate::error::{PageError, PageResultT};
use crate::urls::normalize;

/// Redirect budget for a single navigation.
const MAX_REDIRECT_HOPS: usize = 5;

/// Network-idle definition: quiet window and allowed in-flight requests.
const IDLE_QUIET: Duration = Duration::from_millis(500);
const IDLE_MAX_INFLIGHT: usize = 2;

/// Navigation and capture options.
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    /// Per-attempt navigation timeout (default 30s)
    pub timeout_ms: u64,

    /// Retries after the first attempt (default 2; backoff 1s, 2s, 4s)
    pub max_retries: u32,

    /// Wait for network idle after load (default true)
    pub wait_for_network_idle: bool,

    /// Capture a viewport screenshot (default false)
    pub enable_screenshot: bool,

    /// Keep the network log in the snapshot (default true)
    pub capture_network: bool,

    /// Run the safe-interaction plan (default false)
    pub capture_interactions: bool,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 2,
            wait_for_network_idle: true,
            enable_screenshot: false,
            capture_network: true,
            capture_interactions: false,
        }
    }
}

/// Structural counts pulled from the live DOM.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DomStats {
    pub elements: u32,
    pub links: u32,
    pub forms: u32,
    pub inputs: u32,
    pub buttons: u32,
    pub scripts: u32,
    pub images: u32,
}

/// Technology hints detected on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechSignals {
    /// Framework globals seen in the page (react, vue, angular, jquery, ...)
    pub frameworks: Vec<String>,
    /// `meta[name=generator]` content
    pub generator: Option<String>,
    pub has_service_worker: bool,
}

/// Full captured state of a page after navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Normalized URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub title: String,
    pub html: String,
    pub visible_text: String,
    /// Meta tags plus canonical/lang/viewport under reserved keys
    pub meta: HashMap<String, String>,
    /// PNG bytes; persisted separately, never serialized inline
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    pub network: NetworkLog,
    pub dom_stats: DomStats,
    pub tech_signals: TechSignals,
    pub interaction_log: Option<InteractionLog>,
    pub load_time_ms: u64,
    pub captured_at: DateTime<Utc>,
}

impl PageSnapshot {
    /// Hosted domain of the captured page.
    pub fn domain(&self) -> String {
        normalize(&self.url)
            .map(|u| u.domain)
            .unwrap_or_default()
    }
}

/// Everything the extraction script returns in one evaluate round-trip.
#[derive(Debug, Deserialize)]
struct ExtractedDocument {
    title: String,
    visible_text: String,
    #[serde(default)]
    meta: HashMap<String, String>,
    #[serde(default)]
    dom_stats: DomStats,
    #[serde(default)]
    frameworks: Vec<String>,
    generator: Option<String>,
    #[serde(default)]
    has_service_worker: bool,
}

const EXTRACT_SCRIPT: &str = r#"
(() => {
    const meta = {};
    for (const el of document.querySelectorAll('meta[name][content]')) {
        meta[el.getAttribute('name').toLowerCase()] = el.getAttribute('content');
    }
    for (const el of document.querySelectorAll('meta[property][content]')) {
        meta[el.getAttribute('property').toLowerCase()] = el.getAttribute('content');
    }
    const canonical = document.querySelector('link[rel="canonical"]');
    if (canonical) meta['__canonical'] = canonical.href;
    if (document.documentElement.lang) meta['__lang'] = document.documentElement.lang;

    const frameworks = [];
    if (window.React || document.querySelector('[data-reactroot], #__next')) frameworks.push('react');
    if (window.Vue || document.querySelector('[data-v-app], #__nuxt')) frameworks.push('vue');
    if (window.angular || document.querySelector('[ng-app], [ng-version]')) frameworks.push('angular');
    if (window.jQuery) frameworks.push('jquery');
    if (window.Shopify) frameworks.push('shopify');
    if (window.wp || document.querySelector('link[href*="wp-content"]')) frameworks.push('wordpress');

    const generatorEl = document.querySelector('meta[name="generator"]');

    return {
        title: document.title || '',
        visible_text: document.body ? document.body.innerText : '',
        meta: meta,
        dom_stats: {
            elements: document.getElementsByTagName('*').length,
            links: document.querySelectorAll('a[href]').length,
            forms: document.forms.length,
            inputs: document.querySelectorAll('input, select, textarea').length,
            buttons: document.querySelectorAll('button, [role="button"], input[type="submit"]').length,
            scripts: document.scripts.length,
            images: document.images.length,
        },
        frameworks: frameworks,
        generator: generatorEl ? generatorEl.getAttribute('content') : null,
        has_service_worker: 'serviceWorker' in navigator,
    };
})()
"#;

/// Navigates pages and assembles snapshots.
#[derive(Debug, Clone, Default)]
pub struct PageNavigator {
    _private: (),
}

impl PageNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigate to `url` in a fresh page of `session` and capture it.
    ///
    /// Transient failures (timeout, crash, transport) are retried with
    /// 1s/2s/4s backoff up to `max_retries`; HTTP >= 400 fails immediately.
    pub async fn navigate_and_extract(
        &self,
        session: &mut Session,
        url: &str,
        opts: &NavigateOptions,
    ) -> PageResultT<PageSnapshot> {
        // Defensive: callers hand us inventory URLs, but single-page entry
        // points take raw input.
        let normalized = normalize(url).map_err(|_| PageError::NavigationFailure {
            url: url.to_string(),
            status: 0,
        })?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(session, &normalized.url, opts).await {
                Ok(snapshot) => {
                    session.record_page(snapshot.load_time_ms);
                    return Ok(snapshot);
                }
                Err(err) if err.is_retryable() && attempt <= opts.max_retries => {
                    let delay = Duration::from_secs(1u64 << (attempt - 1).min(2));
                    warn!(
                        url = %normalized.url,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "navigation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        session: &Session,
        url: &str,
        opts: &NavigateOptions,
    ) -> PageResultT<PageSnapshot> {
        let timeout = Duration::from_millis(opts.timeout_ms);
        let started = Instant::now();

        let mut page = session.new_page().await.map_err(|e| PageError::BrowserCrash {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let result = self
            .capture(page.as_ref(), url, opts, timeout, started)
            .await;

        // The page is disposed on every path; the session stays leased.
        let _ = page.close().await;
        result
    }

    async fn capture(
        &self,
        page: &dyn super::backend::PageHandle,
        url: &str,
        opts: &NavigateOptions,
        timeout: Duration,
        started: Instant,
    ) -> PageResultT<PageSnapshot> {
        use super::BrowserError;

        let map_nav_err = |e: BrowserError| match e {
            BrowserError::Timeout(_) => PageError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            other => PageError::BrowserCrash {
                url: url.to_string(),
                reason: other.to_string(),
            },
        };

        let navigation = page.navigate(url, timeout).await.map_err(map_nav_err)?;

        if navigation.status >= 400 {
            return Err(PageError::NavigationFailure {
                url: url.to_string(),
                status: navigation.status,
            });
        }
        if navigation.redirect_hops > MAX_REDIRECT_HOPS {
            return Err(PageError::NavigationFailure {
                url: url.to_string(),
                status: 508,
            });
        }

        if opts.wait_for_network_idle {
            page.wait_for_network_idle(IDLE_QUIET, IDLE_MAX_INFLIGHT, timeout)
                .await
                .map_err(map_nav_err)?;
        }

        let load_time_ms = started.elapsed().as_millis() as u64;

        let html = page.html().await.map_err(map_nav_err)?;
        let extracted: ExtractedDocument = page
            .evaluate(EXTRACT_SCRIPT)
            .await
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| BrowserError::Evaluate(e.to_string()))
            })
            .map_err(map_nav_err)?;

        let interaction_log = if opts.capture_interactions {
            let plan = InteractionPlan::from_html(&html);
            if plan.is_worthwhile() {
                match plan.execute(page, &navigation.final_url, timeout).await {
                    Ok(log) if !log.is_empty() => Some(log),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(url = %url, error = %e, "interaction capture failed");
                        None
                    }
                }
            } else {
                None
            }
        } else {
            None
        };

        let screenshot = if opts.enable_screenshot {
            match page.screenshot_png().await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(url = %url, error = %e, "screenshot failed");
                    None
                }
            }
        } else {
            None
        };

        // Drain once at the end so interaction-triggered requests land in
        // the log too.
        let seed_domain = normalize(url).map(|u| u.domain).unwrap_or_default();
        let raw_events = page.drain_network_events();
        let network = if opts.capture_network {
            NetworkLog::classify(raw_events, &seed_domain)
        } else {
            NetworkLog::default()
        };

        debug!(
            url = %url,
            status = navigation.status,
            load_ms = load_time_ms,
            events = network.events.len(),
            "page captured"
        );

        info!(url = %url, final_url = %navigation.final_url, "navigation complete");

        Ok(PageSnapshot {
            url: url.to_string(),
            final_url: navigation.final_url,
            status_code: navigation.status,
            title: extracted.title,
            html,
            visible_text: extracted.visible_text,
            meta: extracted.meta,
            screenshot,
            network,
            dom_stats: extracted.dom_stats,
            tech_signals: TechSignals {
                frameworks: extracted.frameworks,
                generator: extracted.generator,
                has_service_worker: extracted.has_service_worker,
            },
            interaction_log,
            load_time_ms,
            captured_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::session::SessionPool;
    use crate::testing::{MockBackend, MockPageScript};
    use std::sync::Arc;

    async fn session_for(backend: MockBackend) -> (Arc<SessionPool>, Session) {
        let pool = Arc::new(SessionPool::new(Arc::new(backend), 1, true));
        let session = pool.acquire(None).await.unwrap();
        (pool, session)
    }

    #[tokio::test]
    async fn test_happy_path_snapshot() {
        let backend = MockBackend::healthy().with_page(
            MockPageScript::ok("https://example.com/", 200)
                .title("Example")
                .html("<html><body><h1>Example</h1></body></html>"),
        );
        let (_pool, mut session) = session_for(backend).await;

        let navigator = PageNavigator::new();
        let snapshot = navigator
            .navigate_and_extract(&mut session, "https://example.com", &NavigateOptions::default())
            .await
            .unwrap();

        assert_eq!(snapshot.status_code, 200);
        assert_eq!(snapshot.title, "Example");
        assert_eq!(snapshot.url, "https://example.com/");
    }

    #[tokio::test]
    async fn test_http_404_is_navigation_failure() {
        let backend =
            MockBackend::healthy().with_page(MockPageScript::ok("https://example.com/missing", 404));
        let (_pool, mut session) = session_for(backend).await;

        let navigator = PageNavigator::new();
        let err = navigator
            .navigate_and_extract(
                &mut session,
                "https://example.com/missing",
                &NavigateOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PageError::NavigationFailure { status: 404, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_then_fails() {
        let backend = MockBackend::healthy()
            .with_page(MockPageScript::timing_out("https://slow.example.com/"));
        let (_pool, mut session) = session_for(backend).await;

        let navigator = PageNavigator::new();
        let opts = NavigateOptions {
            max_retries: 1,
            ..Default::default()
        };
        let err = navigator
            .navigate_and_extract(&mut session, "https://slow.example.com", &opts)
            .await
            .unwrap_err();

        assert!(matches!(err, PageError::NavigationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_without_navigation() {
        let backend = MockBackend::healthy();
        let (_pool, mut session) = session_for(backend).await;

        let navigator = PageNavigator::new();
        let err = navigator
            .navigate_and_extract(&mut session, "ftp://example.com", &NavigateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PageError::NavigationFailure { status: 0, .. }));
    }
}

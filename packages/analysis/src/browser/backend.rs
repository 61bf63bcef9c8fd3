//! Browser backend abstraction and the CDP implementation.
//!
//! Navigation, extraction, and interaction all go through [`PageHandle`]
//! so the workflow can run against a mock browser in tests. The real
//! backend drives Chromium (or any CDP-speaking executable) through
//! `chromiumoxide`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use chrono::Utc;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::network::NetworkEvent;
use super::{BrowserEngine, BrowserError, BrowserResult};

/// Outcome of a navigation.
#[derive(Debug, Clone)]
pub struct Navigation {
    /// URL after redirects
    pub final_url: String,
    /// HTTP status of the main document
    pub status: u16,
    /// Redirect hops observed for the main document
    pub redirect_hops: usize,
}

/// Launches browsers.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn launch(
        &self,
        engine: BrowserEngine,
        headless: bool,
    ) -> BrowserResult<Box<dyn BrowserHandle>>;
}

/// A running browser that can open pages.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageHandle>>;

    /// False once the underlying process has died.
    fn is_healthy(&self) -> bool;

    async fn close(&mut self) -> BrowserResult<()>;
}

/// A single page/tab with capture hooks attached.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the load event, within `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> BrowserResult<Navigation>;

    /// Wait until at most `max_inflight` requests are outstanding and the
    /// network has been quiet for `quiet`, or until `timeout`.
    async fn wait_for_network_idle(
        &self,
        quiet: Duration,
        max_inflight: usize,
        timeout: Duration,
    ) -> BrowserResult<()>;

    /// Full serialized HTML of the current document.
    async fn html(&self) -> BrowserResult<String>;

    /// Evaluate a script, returning its JSON value.
    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;

    /// PNG screenshot of the viewport.
    async fn screenshot_png(&self) -> BrowserResult<Vec<u8>>;

    async fn click(&self, selector: &str) -> BrowserResult<()>;

    async fn focus(&self, selector: &str) -> BrowserResult<()>;

    async fn hover(&self, selector: &str) -> BrowserResult<()>;

    /// Network events captured so far (clears the buffer).
    fn drain_network_events(&self) -> Vec<NetworkEvent>;

    /// URL the page currently shows.
    async fn current_url(&self) -> BrowserResult<String>;

    async fn close(&mut self) -> BrowserResult<()>;
}

/// Backend that launches CDP-speaking browsers via `chromiumoxide`.
///
/// Chromium launches out of the box; Firefox and WebKit need an executable
/// with CDP support configured per engine.
#[derive(Default)]
pub struct CdpBackend {
    executables: HashMap<BrowserEngine, std::path::PathBuf>,
}

impl CdpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executable for a non-default engine.
    pub fn with_executable(
        mut self,
        engine: BrowserEngine,
        path: impl Into<std::path::PathBuf>,
    ) -> Self {
        self.executables.insert(engine, path.into());
        self
    }
}

#[async_trait]
impl BrowserBackend for CdpBackend {
    async fn launch(
        &self,
        engine: BrowserEngine,
        headless: bool,
    ) -> BrowserResult<Box<dyn BrowserHandle>> {
        let mut builder = BrowserConfig::builder().no_sandbox().window_size(1280, 900);

        if !headless {
            builder = builder.with_head();
        }

        match self.executables.get(&engine) {
            Some(path) => builder = builder.chrome_executable(path),
            None if engine != BrowserEngine::Chromium => {
                return Err(BrowserError::EngineUnavailable { engine });
            }
            None => {}
        }

        let config = builder.build().map_err(|reason| BrowserError::Launch {
            engine,
            reason,
        })?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch {
                engine,
                reason: e.to_string(),
            })?;

        let alive = Arc::new(AtomicBool::new(true));
        let alive_flag = alive.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            alive_flag.store(false, Ordering::SeqCst);
        });

        debug!(engine = %engine, headless = headless, "browser launched");

        Ok(Box::new(CdpBrowser {
            browser: Some(browser),
            handler_task: Some(handler_task),
            alive,
        }))
    }
}

struct CdpBrowser {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserHandle for CdpBrowser {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageHandle>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| BrowserError::Crashed("browser already closed".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Crashed(e.to_string()))?;

        let recorder = Recorder::attach(&page).await?;
        Ok(Box::new(CdpPage { page, recorder }))
    }

    fn is_healthy(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "browser close failed");
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared capture state fed by the CDP event listeners.
#[derive(Default)]
struct RecorderState {
    events: Vec<NetworkEvent>,
    /// request_id -> (index into events, started_at)
    pending: HashMap<String, (usize, Instant)>,
    inflight: usize,
    last_activity: Option<Instant>,
    document_status: Option<u16>,
    document_redirects: usize,
}

struct Recorder {
    state: Arc<Mutex<RecorderState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Recorder {
    async fn attach(page: &Page) -> BrowserResult<Self> {
        page.execute(EnableParams::default())
            .await
            .map_err(|e| BrowserError::Crashed(e.to_string()))?;

        let state = Arc::new(Mutex::new(RecorderState::default()));
        let mut tasks = Vec::new();

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| BrowserError::Crashed(e.to_string()))?;
        let req_state = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let mut state = match req_state.lock() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                let is_document = format!("{:?}", event.r#type).contains("Document");
                if is_document && event.redirect_response.is_some() {
                    state.document_redirects += 1;
                }
                let index = state.events.len();
                state.events.push(NetworkEvent {
                    ts: Utc::now(),
                    method: event.request.method.clone(),
                    url: event.request.url.clone(),
                    status: None,
                    resource_type: Some(format!("{:?}", event.r#type)),
                    mime_type: None,
                    req_headers: headers_to_map(serde_json::to_value(&event.request.headers).ok()),
                    resp_headers: HashMap::new(),
                    req_body: event.request.post_data_entries.as_ref().map(|entries| {
                        entries
                            .iter()
                            .filter_map(|entry| entry.bytes.as_ref().map(|b| AsRef::<str>::as_ref(b).to_string()))
                            .collect::<Vec<_>>()
                            .join("")
                    }),
                    resp_size: None,
                    timing_ms: None,
                    is_third_party: false,
                });
                state
                    .pending
                    .insert(format!("{:?}", event.request_id), (index, Instant::now()));
                state.inflight += 1;
                state.last_activity = Some(Instant::now());
            }
        }));

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| BrowserError::Crashed(e.to_string()))?;
        let resp_state = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let mut state = match resp_state.lock() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                let key = format!("{:?}", event.request_id);
                if let Some((index, started_at)) = state.pending.remove(&key) {
                    let elapsed = started_at.elapsed().as_secs_f64() * 1000.0;
                    if let Some(entry) = state.events.get_mut(index) {
                        entry.status = u16::try_from(event.response.status).ok();
                        entry.mime_type = Some(event.response.mime_type.clone());
                        entry.resp_headers =
                            headers_to_map(serde_json::to_value(&event.response.headers).ok());
                        entry.resp_size = Some(event.response.encoded_data_length.max(0.0) as u64);
                        entry.timing_ms = Some(elapsed);
                    }
                    state.inflight = state.inflight.saturating_sub(1);
                }
                if format!("{:?}", event.r#type).contains("Document")
                    && state.document_status.is_none()
                {
                    state.document_status = u16::try_from(event.response.status).ok();
                }
                state.last_activity = Some(Instant::now());
            }
        }));

        let mut failures = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| BrowserError::Crashed(e.to_string()))?;
        let fail_state = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = failures.next().await {
                let mut state = match fail_state.lock() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                let key = format!("{:?}", event.request_id);
                if state.pending.remove(&key).is_some() {
                    state.inflight = state.inflight.saturating_sub(1);
                }
                state.last_activity = Some(Instant::now());
            }
        }));

        Ok(Self { state, tasks })
    }

    fn reset_document_tracking(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.document_status = None;
            state.document_redirects = 0;
        }
    }

    fn document_status(&self) -> Option<u16> {
        self.state.lock().ok().and_then(|s| s.document_status)
    }

    fn document_redirects(&self) -> usize {
        self.state
            .lock()
            .ok()
            .map(|s| s.document_redirects)
            .unwrap_or(0)
    }

    fn snapshot_idle(&self) -> (usize, Option<Instant>) {
        match self.state.lock() {
            Ok(state) => (state.inflight, state.last_activity),
            Err(_) => (0, None),
        }
    }

    fn drain(&self) -> Vec<NetworkEvent> {
        match self.state.lock() {
            Ok(mut state) => {
                state.pending.clear();
                std::mem::take(&mut state.events)
            }
            Err(_) => Vec::new(),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Flatten a CDP headers object into a string map.
fn headers_to_map(value: Option<serde_json::Value>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(value) = value else { return map };

    // CDP serializes headers as either an object or a wrapper around one.
    let object = match &value {
        serde_json::Value::Object(obj) => Some(obj),
        _ => None,
    };
    let Some(object) = object else { return map };

    for (key, val) in object {
        match val {
            serde_json::Value::String(s) => {
                map.insert(key.to_ascii_lowercase(), s.clone());
            }
            serde_json::Value::Object(inner) => {
                for (k, v) in inner {
                    if let serde_json::Value::String(s) = v {
                        map.insert(k.to_ascii_lowercase(), s.clone());
                    }
                }
            }
            _ => {}
        }
    }
    map
}

struct CdpPage {
    page: Page,
    recorder: Recorder,
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> BrowserResult<Navigation> {
        self.recorder.reset_document_tracking();

        let goto = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            Ok::<(), BrowserError>(())
        };

        tokio::time::timeout(timeout, goto)
            .await
            .map_err(|_| BrowserError::Timeout(timeout))??;

        let final_url = self
            .current_url()
            .await
            .unwrap_or_else(|_| url.to_string());
        // Status comes off the wire; a page served from cache without a
        // document response is treated as 200.
        let status = self.recorder.document_status().unwrap_or(200);

        Ok(Navigation {
            final_url,
            status,
            redirect_hops: self.recorder.document_redirects(),
        })
    }

    async fn wait_for_network_idle(
        &self,
        quiet: Duration,
        max_inflight: usize,
        timeout: Duration,
    ) -> BrowserResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let (inflight, last_activity) = self.recorder.snapshot_idle();
            let quiet_for = last_activity
                .map(|t| t.elapsed())
                .unwrap_or(quiet);
            if inflight <= max_inflight && quiet_for >= quiet {
                return Ok(());
            }
            if Instant::now() >= deadline {
                // Busy pages that never settle are not an error; capture
                // proceeds with what arrived.
                debug!(inflight = inflight, "network idle wait expired");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn html(&self) -> BrowserResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;
        result
            .into_value::<serde_json::Value>()
            .map_err(|e| BrowserError::Evaluate(e.to_string()))
    }

    async fn screenshot_png(&self) -> BrowserResult<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;
        Ok(())
    }

    async fn focus(&self, selector: &str) -> BrowserResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element
            .focus()
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;
        Ok(())
    }

    async fn hover(&self, selector: &str) -> BrowserResult<()> {
        // Synthetic hover keeps this working across engines without mouse
        // positioning support.
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.dispatchEvent(new MouseEvent('mouseover', {{bubbles: true}}));
                el.dispatchEvent(new MouseEvent('mouseenter', {{bubbles: true}}));
                return true;
            }})()"#,
            selector = serde_json::to_string(selector).unwrap_or_default(),
        );
        let found = self.evaluate(&script).await?;
        if found.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    fn drain_network_events(&self) -> Vec<NetworkEvent> {
        self.recorder.drain()
    }

    async fn current_url(&self) -> BrowserResult<String> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?
            .ok_or_else(|| BrowserError::Navigation("page has no URL".into()))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        let _ = self.page.clone().close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_to_map_flat_object() {
        let value = serde_json::json!({"Content-Type": "application/json", "X-N": 5});
        let map = headers_to_map(Some(value));
        assert_eq!(map.get("content-type").map(String::as_str), Some("application/json"));
        assert!(!map.contains_key("x-n"));
    }

    #[test]
    fn test_headers_to_map_none() {
        assert!(headers_to_map(None).is_empty());
    }

    #[test]
    fn test_engine_without_executable_is_unavailable() {
        let backend = CdpBackend::new();
        let err = futures::executor::block_on(
            backend.launch(BrowserEngine::Firefox, true),
        );
        assert!(matches!(
            err,
            Err(BrowserError::EngineUnavailable { engine: BrowserEngine::Firefox })
        ));
    }
}

//! Mock implementations for tests.
//!
//! `MockBackend` stands in for the browser layer and `ScriptedChat` for
//! the LLM layer, so workflow and analyzer tests run hermetically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::backend::{BrowserBackend, BrowserHandle, Navigation, PageHandle};
use crate::browser::network::NetworkEvent;
use crate::browser::{BrowserEngine, BrowserError, BrowserResult};
use llm_client::{ChatProvider, ChatRequest, ChatResponse, LlmError, Provider, Usage};

/// Scripted behavior for one URL in a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockPageScript {
    pub url: String,
    pub status: u16,
    pub title: String,
    pub html: String,
    pub final_url: Option<String>,
    pub times_out: bool,
    pub network_events: Vec<NetworkEvent>,
}

impl MockPageScript {
    /// A page that loads successfully with the given status.
    pub fn ok(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            title: String::new(),
            html: "<html><body></body></html>".into(),
            final_url: None,
            times_out: false,
            network_events: Vec::new(),
        }
    }

    /// A page whose navigation always times out.
    pub fn timing_out(url: impl Into<String>) -> Self {
        Self {
            times_out: true,
            ..Self::ok(url, 200)
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    pub fn network_event(mut self, event: NetworkEvent) -> Self {
        self.network_events.push(event);
        self
    }
}

/// Browser backend serving scripted pages.
#[derive(Clone, Default)]
pub struct MockBackend {
    pages: Arc<Mutex<Vec<MockPageScript>>>,
    healthy: bool,
}

impl MockBackend {
    /// Backend whose browsers stay healthy.
    pub fn healthy() -> Self {
        Self {
            pages: Arc::new(Mutex::new(Vec::new())),
            healthy: true,
        }
    }

    /// Backend whose browsers report unhealthy immediately after launch.
    pub fn crashing_after_launch() -> Self {
        Self {
            pages: Arc::new(Mutex::new(Vec::new())),
            healthy: false,
        }
    }

    /// Register a scripted page.
    pub fn with_page(self, script: MockPageScript) -> Self {
        self.pages.lock().unwrap().push(script);
        self
    }

    fn script_for(&self, url: &str) -> Option<MockPageScript> {
        let pages = self.pages.lock().unwrap();
        pages
            .iter()
            .find(|p| p.url == url)
            .or_else(|| {
                pages
                    .iter()
                    .find(|p| url.starts_with(p.url.trim_end_matches('/')))
            })
            .cloned()
    }
}

#[async_trait]
impl BrowserBackend for MockBackend {
    async fn launch(
        &self,
        _engine: BrowserEngine,
        _headless: bool,
    ) -> BrowserResult<Box<dyn BrowserHandle>> {
        Ok(Box::new(MockBrowser {
            backend: self.clone(),
            alive: Arc::new(AtomicBool::new(self.healthy)),
        }))
    }
}

struct MockBrowser {
    backend: MockBackend,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageHandle>> {
        Ok(Box::new(MockPage {
            backend: self.backend.clone(),
            current: Mutex::new(None),
            drained: Mutex::new(false),
        }))
    }

    fn is_healthy(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MockPage {
    backend: MockBackend,
    current: Mutex<Option<MockPageScript>>,
    drained: Mutex<bool>,
}

#[async_trait]
impl PageHandle for MockPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> BrowserResult<Navigation> {
        let script = self
            .backend
            .script_for(url)
            .unwrap_or_else(|| MockPageScript::ok(url, 200));

        if script.times_out {
            return Err(BrowserError::Timeout(timeout));
        }

        let final_url = script.final_url.clone().unwrap_or_else(|| url.to_string());
        let status = script.status;
        *self.current.lock().unwrap() = Some(script);
        *self.drained.lock().unwrap() = false;

        Ok(Navigation {
            final_url,
            status,
            redirect_hops: 0,
        })
    }

    async fn wait_for_network_idle(
        &self,
        _quiet: Duration,
        _max_inflight: usize,
        _timeout: Duration,
    ) -> BrowserResult<()> {
        Ok(())
    }

    async fn html(&self) -> BrowserResult<String> {
        Ok(self
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.html.clone())
            .unwrap_or_default())
    }

    async fn evaluate(&self, _script: &str) -> BrowserResult<serde_json::Value> {
        let current = self.current.lock().unwrap();
        let script = current.as_ref();
        let title = script.map(|s| s.title.clone()).unwrap_or_default();
        let text = script
            .map(|s| strip_tags(&s.html))
            .unwrap_or_default();

        Ok(serde_json::json!({
            "title": title,
            "visible_text": text,
            "meta": {},
            "dom_stats": {
                "elements": 10, "links": 2, "forms": 0, "inputs": 0,
                "buttons": 1, "scripts": 1, "images": 0,
            },
            "frameworks": [],
            "generator": null,
            "has_service_worker": false,
        }))
    }

    async fn screenshot_png(&self) -> BrowserResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn click(&self, _selector: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn focus(&self, _selector: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn hover(&self, _selector: &str) -> BrowserResult<()> {
        Ok(())
    }

    fn drain_network_events(&self) -> Vec<NetworkEvent> {
        let mut drained = self.drained.lock().unwrap();
        if *drained {
            return Vec::new();
        }
        *drained = true;
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.network_events.clone())
            .unwrap_or_default()
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.final_url.clone().unwrap_or_else(|| s.url.clone()))
            .unwrap_or_else(|| "about:blank".into()))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        Ok(())
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A representative completed content summary for tests.
pub fn sample_summary() -> crate::analysis::models::ContentSummary {
    use crate::analysis::models::{ContentSummary, JourneyStage, QualityScore};
    ContentSummary {
        id: "summary-1".into(),
        purpose: "Product checkout".into(),
        user_context: "Authenticated shoppers".into(),
        business_logic: "Cart validation and payment capture".into(),
        navigation_role: "Conversion endpoint".into(),
        business_importance: 0.9,
        confidence: 0.8,
        workflows: vec!["checkout".into()],
        journey_stage: JourneyStage::Conversion,
        keywords: vec!["cart".into(), "payment".into()],
        quality: QualityScore {
            overall: 0.8,
            completeness: 0.9,
            specificity: 0.7,
            depth: 0.8,
        },
    }
}

/// Chat provider that replays a scripted queue of responses.
pub struct ScriptedChat {
    provider: Provider,
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    pub calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response.
    pub fn respond(self, content: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(content.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: LlmError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Number of chat calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn chat(&self, request: &ChatRequest) -> llm_client::Result<ChatResponse> {
        self.calls.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(ChatResponse {
                content,
                model: request.model.clone(),
                provider: self.provider,
                usage: Usage::new(100, 50),
            }),
            Some(Err(err)) => Err(err),
            None => Err(LlmError::Api {
                provider: self.provider,
                status: 400,
                message: "scripted responses exhausted".into(),
            }),
        }
    }

    async fn validate_key(&self) -> llm_client::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[tokio::test]
    async fn test_scripted_chat_replays_in_order() {
        let chat = ScriptedChat::new(Provider::OpenAi)
            .respond("first")
            .respond("second");

        let request = ChatRequest::new("gpt-4o");
        assert_eq!(chat.chat(&request).await.unwrap().content, "first");
        assert_eq!(chat.chat(&request).await.unwrap().content, "second");
        assert!(chat.chat(&request).await.is_err());
        assert_eq!(chat.call_count(), 3);
    }
}

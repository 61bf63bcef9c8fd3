//! Bounded safe-interaction capture.
//!
//! Opt-in page probing: hover, focus, and click a handful of elements to
//! shake loose lazy-loaded content and API calls. Destructive controls are
//! never touched, and a navigation caused by a click is rolled back by
//! re-navigating to the captured page.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::PageHandle;
use super::BrowserResult;

/// Maximum steps in one interaction plan.
const MAX_STEPS: usize = 5;
const MIN_STEPS: usize = 3;

/// Keywords that mark an element (or its form) as off limits.
const DENY_KEYWORDS: &[&str] = &["delete", "remove", "cancel", "logout"];

/// What a step does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Hover,
    Focus,
    Click,
}

/// One planned interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionStep {
    pub kind: InteractionKind,
    pub selector: String,
    /// Visible text or label of the target, for the analyst
    pub label: String,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub step: InteractionStep,
    pub succeeded: bool,
    /// Click navigated away and the page was reloaded
    pub caused_navigation: bool,
    pub error: Option<String>,
}

/// Executed interaction history for a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionLog {
    pub records: Vec<InteractionRecord>,
}

impl InteractionLog {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A bounded, deny-listed interaction plan derived from page HTML.
#[derive(Debug, Clone)]
pub struct InteractionPlan {
    pub steps: Vec<InteractionStep>,
}

impl InteractionPlan {
    /// Build a plan from the page's HTML.
    ///
    /// Candidates in order: nav links (hover), text inputs (focus),
    /// non-destructive buttons (click). Capped at 5 steps.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut steps: Vec<InteractionStep> = Vec::new();

        let nav_links = Selector::parse("nav a[href], header a[href]").expect("static selector");
        for (i, link) in document.select(&nav_links).enumerate().take(2) {
            let label = element_text(&link);
            if is_denied(&label) {
                continue;
            }
            steps.push(InteractionStep {
                kind: InteractionKind::Hover,
                selector: format!("nav a:nth-of-type({})", i + 1),
                label,
            });
        }

        let inputs = Selector::parse(
            "input[type=text], input[type=search], input[type=email], input:not([type])",
        )
        .expect("static selector");
        if let Some(input) = document.select(&inputs).next() {
            let label = input
                .value()
                .attr("name")
                .or_else(|| input.value().attr("placeholder"))
                .unwrap_or("input")
                .to_string();
            let selector = match input.value().attr("name") {
                Some(name) => format!("input[name=\"{name}\"]"),
                None => "input".to_string(),
            };
            if !is_denied(&label) {
                steps.push(InteractionStep {
                    kind: InteractionKind::Focus,
                    selector,
                    label,
                });
            }
        }

        let buttons = Selector::parse("button, [role=button]").expect("static selector");
        for button in document.select(&buttons) {
            if steps.len() >= MAX_STEPS {
                break;
            }
            let label = element_text(&button);
            if label.is_empty() || is_denied(&label) || in_denied_form(&button) {
                continue;
            }
            let selector = match button.value().attr("id") {
                Some(id) => format!("#{id}"),
                None => continue,
            };
            steps.push(InteractionStep {
                kind: InteractionKind::Click,
                selector,
                label,
            });
        }

        steps.truncate(MAX_STEPS);
        Self { steps }
    }

    /// Whether the plan has enough substance to be worth executing.
    pub fn is_worthwhile(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Execute the plan against a live page.
    ///
    /// Individual step failures are recorded and skipped. A click that
    /// changes the page URL triggers a re-navigation to `page_url` so
    /// later steps (and extraction) see the original document.
    pub async fn execute(
        &self,
        page: &dyn PageHandle,
        page_url: &str,
        step_timeout: std::time::Duration,
    ) -> BrowserResult<InteractionLog> {
        let mut log = InteractionLog::default();

        for step in self.steps.iter().take(MAX_STEPS.max(MIN_STEPS)) {
            let result = match step.kind {
                InteractionKind::Hover => page.hover(&step.selector).await,
                InteractionKind::Focus => page.focus(&step.selector).await,
                InteractionKind::Click => page.click(&step.selector).await,
            };

            let mut caused_navigation = false;
            if result.is_ok() && step.kind == InteractionKind::Click {
                if let Ok(current) = page.current_url().await {
                    if current != page_url {
                        debug!(from = %page_url, to = %current, "interaction navigated, rolling back");
                        caused_navigation = true;
                        if let Err(e) = page.navigate(page_url, step_timeout).await {
                            warn!(error = %e, "rollback navigation failed, stopping plan");
                            log.records.push(InteractionRecord {
                                step: step.clone(),
                                succeeded: true,
                                caused_navigation,
                                error: Some(format!("rollback failed: {e}")),
                            });
                            break;
                        }
                    }
                }
            }

            log.records.push(InteractionRecord {
                succeeded: result.is_ok(),
                caused_navigation,
                error: result.err().map(|e| e.to_string()),
                step: step.clone(),
            });
        }

        Ok(log)
    }
}

fn element_text(element: &scraper::ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_denied(label: &str) -> bool {
    let lower = label.to_ascii_lowercase();
    DENY_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Whether the element sits inside a form whose text trips the deny list.
fn in_denied_form(element: &scraper::ElementRef<'_>) -> bool {
    let mut current = element.parent();
    while let Some(node) = current {
        if let Some(el) = scraper::ElementRef::wrap(node) {
            if el.value().name() == "form" {
                return is_denied(&element_text(&el));
            }
        }
        current = node.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_skips_destructive_buttons() {
        let html = r#"
            <html><body>
                <button id="save">Save draft</button>
                <button id="del">Delete account</button>
                <button id="out">Logout</button>
            </body></html>
        "#;

        let plan = InteractionPlan::from_html(html);
        let selectors: Vec<&str> = plan.steps.iter().map(|s| s.selector.as_str()).collect();
        assert!(selectors.contains(&"#save"));
        assert!(!selectors.contains(&"#del"));
        assert!(!selectors.contains(&"#out"));
    }

    #[test]
    fn test_plan_skips_buttons_in_destructive_forms() {
        let html = r#"
            <html><body>
                <form><p>Cancel subscription</p><button id="go">Continue</button></form>
            </body></html>
        "#;

        let plan = InteractionPlan::from_html(html);
        assert!(plan.steps.iter().all(|s| s.selector != "#go"));
    }

    #[test]
    fn test_plan_is_bounded() {
        let buttons: String = (0..20)
            .map(|i| format!("<button id=\"b{i}\">Action {i}</button>"))
            .collect();
        let html = format!("<html><body><nav><a href='/a'>A</a><a href='/b'>B</a></nav>{buttons}</body></html>");

        let plan = InteractionPlan::from_html(&html);
        assert!(plan.steps.len() <= 5);
    }

    #[test]
    fn test_plan_includes_nav_hover_and_input_focus() {
        let html = r#"
            <html><body>
                <nav><a href="/products">Products</a></nav>
                <input type="search" name="q" placeholder="Search">
            </body></html>
        "#;

        let plan = InteractionPlan::from_html(html);
        assert!(plan
            .steps
            .iter()
            .any(|s| s.kind == InteractionKind::Hover));
        assert!(plan
            .steps
            .iter()
            .any(|s| s.kind == InteractionKind::Focus && s.selector == "input[name=\"q\"]"));
    }

    #[test]
    fn test_empty_page_not_worthwhile() {
        let plan = InteractionPlan::from_html("<html><body><p>text only</p></body></html>");
        assert!(!plan.is_worthwhile());
    }
}

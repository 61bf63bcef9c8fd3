//! Prompt construction for the two analysis passes.
//!
//! Step 1 sees the captured page; Step 2 sees the page plus the full Step 1
//! summary as a context block. Hardened variants restate the JSON schema
//! verbatim for the retry after a schema or quality failure.

use super::models::ContentSummary;
use super::validation::{FeaturePayload, SummaryPayload};
use crate::browser::PageSnapshot;
use llm_client::{truncate_to_char_boundary, StructuredOutput};

/// Visible text beyond this is truncated before prompting.
const MAX_VISIBLE_TEXT: usize = 8_000;

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You are an expert software architect specializing in reverse-engineering and documenting \
legacy web applications for modernization. Analyze the provided page capture and produce a \
structured summary of the page's purpose, audience, business logic, navigation role, and \
user-journey position.

Return ONLY a JSON object with these fields:
- purpose: primary business function of the page
- user_context: target users and their journey context
- business_logic: core business rules and workflows embedded in the page
- navigation_role: the page's role in overall site navigation
- business_importance: number 0.0-1.0, how critical the page is to the business
- confidence: number 0.0-1.0, your confidence in this summary
- workflows: array of workflow names the page participates in
- journey_stage: one of \"entry\", \"middle\", \"conversion\", \"exit\"
- keywords: array of content keywords

Be factual and specific. No markdown, no commentary outside the JSON object.";

pub const FEATURE_SYSTEM_PROMPT: &str = "\
You are a technical lead analyzing legacy web applications for rebuild planning. Map every \
aspect of the page: interactive elements with CSS selectors, functional capabilities, API \
integrations, business rules, third-party services, and rebuild specifications.

Return ONLY a JSON object with these fields:
- interactive_elements: [{type, selector, purpose, behavior}]
- functional_capabilities: [{name, description, type, complexity_score (1-10)}]
- api_integrations: [{method, endpoint, purpose, auth (\"none\"|\"optional\"|\"required\"), data_flow}]
- business_rules: [{name, description, validation_logic}]
- third_party_integrations: [{service_name, integration_type, purpose}]
- rebuild_specifications: [{name, description, complexity (\"low\"|\"medium\"|\"high\"), dependencies}]
- confidence: number 0.0-1.0

Ground every claim in the provided artifacts. Use real selectors and endpoints you can see. \
No markdown, no commentary outside the JSON object.";

/// User prompt for Step 1.
pub fn summary_prompt(snapshot: &PageSnapshot) -> String {
    let text = truncate_to_char_boundary(&snapshot.visible_text, MAX_VISIBLE_TEXT);
    let truncated_note = if snapshot.visible_text.len() > MAX_VISIBLE_TEXT {
        "\n... (content truncated)"
    } else {
        ""
    };

    let meta_block: String = snapshot
        .meta
        .iter()
        .filter(|(k, _)| !k.starts_with("__"))
        .map(|(k, v)| format!("  {k}: {v}\n"))
        .collect();

    format!(
        "Analyze the web page at: {url}\n\
         Final URL after redirects: {final_url}\n\
         Title: {title}\n\n\
         META TAGS:\n{meta}\n\
         DOM SHAPE: {elements} elements, {links} links, {forms} forms, {inputs} inputs, \
         {buttons} buttons, {scripts} scripts\n\
         DETECTED TECHNOLOGY: {tech}\n\n\
         VISIBLE TEXT:\n{text}{truncated_note}",
        url = snapshot.url,
        final_url = snapshot.final_url,
        title = snapshot.title,
        meta = if meta_block.is_empty() { "  (none)\n".to_string() } else { meta_block },
        elements = snapshot.dom_stats.elements,
        links = snapshot.dom_stats.links,
        forms = snapshot.dom_stats.forms,
        inputs = snapshot.dom_stats.inputs,
        buttons = snapshot.dom_stats.buttons,
        scripts = snapshot.dom_stats.scripts,
        tech = if snapshot.tech_signals.frameworks.is_empty() {
            "none detected".to_string()
        } else {
            snapshot.tech_signals.frameworks.join(", ")
        },
        text = text,
        truncated_note = truncated_note,
    )
}

/// User prompt for Step 2. Carries the full Step 1 summary, including the
/// business-importance and journey-stage signals, plus the observed API
/// endpoints and any interaction history.
pub fn feature_prompt(snapshot: &PageSnapshot, summary: &ContentSummary) -> String {
    let context_block = format!(
        "PAGE CONTEXT (from content summary {id}):\n\
         Purpose: {purpose}\n\
         User Context: {user_context}\n\
         Business Logic: {business_logic}\n\
         Navigation Role: {navigation_role}\n\
         Business Importance: {importance:.2}\n\
         Journey Stage: {stage:?}\n\
         Workflows: {workflows}\n",
        id = summary.id,
        purpose = summary.purpose,
        user_context = summary.user_context,
        business_logic = summary.business_logic,
        navigation_role = summary.navigation_role,
        importance = summary.business_importance,
        stage = summary.journey_stage,
        workflows = if summary.workflows.is_empty() {
            "(none)".to_string()
        } else {
            summary.workflows.join(", ")
        },
    );

    let endpoints = snapshot.network.api_endpoints();
    let network_block: String = if endpoints.is_empty() {
        "  (no API traffic captured)\n".to_string()
    } else {
        endpoints
            .iter()
            .map(|e| {
                format!(
                    "  {} {} (status: {}{})\n",
                    e.method,
                    e.url,
                    e.status.map(|s| s.to_string()).unwrap_or_else(|| "?".into()),
                    if e.is_third_party { ", third-party" } else { "" },
                )
            })
            .collect()
    };

    let interaction_block: String = match &snapshot.interaction_log {
        Some(log) if !log.is_empty() => log
            .records
            .iter()
            .map(|r| {
                format!(
                    "  {:?} {} ({}) -> {}\n",
                    r.step.kind,
                    r.step.selector,
                    r.step.label,
                    if r.succeeded { "ok" } else { "failed" },
                )
            })
            .collect(),
        _ => "  (no interactions captured)\n".to_string(),
    };

    let text = truncate_to_char_boundary(&snapshot.visible_text, MAX_VISIBLE_TEXT / 2);

    format!(
        "Analyze this page for rebuild planning.\n\n\
         URL: {url}\n\n\
         {context}\n\
         OBSERVED API TRAFFIC:\n{network}\n\
         INTERACTIONS PERFORMED:\n{interactions}\n\
         DOM SHAPE: {forms} forms, {inputs} inputs, {buttons} buttons\n\n\
         PAGE TEXT (excerpt):\n{text}",
        url = snapshot.url,
        context = context_block,
        network = network_block,
        interactions = interaction_block,
        forms = snapshot.dom_stats.forms,
        inputs = snapshot.dom_stats.inputs,
        buttons = snapshot.dom_stats.buttons,
        text = text,
    )
}

/// Append a verbatim schema restatement for the hardened retry.
pub fn harden_summary_prompt(base: &str) -> String {
    harden(base, &SummaryPayload::output_schema())
}

/// Append a verbatim schema restatement for the hardened retry.
pub fn harden_feature_prompt(base: &str) -> String {
    harden(base, &FeaturePayload::output_schema())
}

fn harden(base: &str, schema: &serde_json::Value) -> String {
    format!(
        "{base}\n\n\
         IMPORTANT: Your previous response was rejected. Respond with a single JSON object \
         that validates against this exact JSON schema, with no surrounding text:\n{schema}",
        base = base,
        schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".into()),
    )
}

//! Per-page markdown rendering.

use crate::analysis::models::{FeatureAnalysis, PageResult, StepOutcome};

/// Render the markdown document for one analyzed page.
///
/// Deterministic for a given result: no clocks, no randomness, so
/// re-rendering the same artifact produces identical bytes.
pub fn render_page(result: &PageResult) -> String {
    let mut out = String::new();

    out.push_str("---\n");
    out.push_str(&format!("page_id: {}\n", result.page_id));
    out.push_str(&format!("url: {}\n", result.url));
    out.push_str(&format!("step1: {}\n", result.step1.label()));
    out.push_str(&format!("step2: {}\n", result.step2.label()));
    out.push_str(&format!("processing_time_ms: {}\n", result.processing_time_ms));
    out.push_str("---\n\n");

    out.push_str(&format!("# Page Analysis: {}\n\n", result.url));

    match &result.step1 {
        StepOutcome::Completed(summary) => {
            out.push_str("## Content Summary\n\n");
            out.push_str(&format!("- **Purpose**: {}\n", summary.purpose));
            out.push_str(&format!("- **Users**: {}\n", summary.user_context));
            out.push_str(&format!("- **Business logic**: {}\n", summary.business_logic));
            out.push_str(&format!("- **Navigation role**: {}\n", summary.navigation_role));
            out.push_str(&format!(
                "- **Journey stage**: {:?}\n",
                summary.journey_stage
            ));
            out.push_str(&format!(
                "- **Business importance**: {:.2}\n",
                summary.business_importance
            ));
            out.push_str(&format!("- **Confidence**: {:.2}\n", summary.confidence));
            if !summary.workflows.is_empty() {
                out.push_str(&format!(
                    "- **Workflows**: {}\n",
                    summary.workflows.join(", ")
                ));
            }
            if !summary.keywords.is_empty() {
                out.push_str(&format!("- **Keywords**: {}\n", summary.keywords.join(", ")));
            }
            out.push('\n');
        }
        StepOutcome::Failed { reason, .. } => {
            out.push_str("## Content Summary\n\n");
            out.push_str(&format!("Analysis failed: {reason}\n\n"));
        }
        _ => {}
    }

    match &result.step2 {
        StepOutcome::Completed(features) => render_features(&mut out, features),
        StepOutcome::Failed { reason, .. } => {
            out.push_str("## Feature Analysis\n\n");
            out.push_str(&format!(
                "Feature analysis failed: {reason}\n\nThe content summary above is preserved as a partial result.\n\n"
            ));
        }
        StepOutcome::Skipped { reason } => {
            out.push_str("## Feature Analysis\n\n");
            out.push_str(&format!("Skipped: {reason}\n\n"));
        }
        StepOutcome::NotRun => {}
    }

    // Quality block for whichever steps produced scores.
    let mut quality_rows = Vec::new();
    if let StepOutcome::Completed(summary) = &result.step1 {
        quality_rows.push(("Content summary", summary.quality));
    }
    if let StepOutcome::Completed(features) = &result.step2 {
        quality_rows.push(("Feature analysis", features.quality));
    }
    if !quality_rows.is_empty() {
        out.push_str("## Quality Metrics\n\n");
        out.push_str("| Step | Overall | Completeness | Specificity | Depth |\n");
        out.push_str("|---|---|---|---|---|\n");
        for (label, q) in quality_rows {
            out.push_str(&format!(
                "| {} | {:.2} | {:.2} | {:.2} | {:.2} |\n",
                label, q.overall, q.completeness, q.specificity, q.depth
            ));
        }
        out.push('\n');
    }

    if !result.errors.is_empty() {
        out.push_str("## Errors\n\n");
        for error in &result.errors {
            out.push_str(&format!(
                "- `{}` (retries: {}): {}\n",
                error.kind, error.retry_count, error.message
            ));
        }
        out.push('\n');
    }

    out
}

fn render_features(out: &mut String, features: &FeatureAnalysis) {
    out.push_str("## Feature Analysis\n\n");
    out.push_str(&format!(
        "Overall confidence: {:.2}\n\n",
        features.overall_confidence
    ));

    if !features.interactive_elements.is_empty() {
        out.push_str("### Interactive Elements\n\n");
        out.push_str("| Type | Selector | Purpose |\n|---|---|---|\n");
        for element in &features.interactive_elements {
            out.push_str(&format!(
                "| {} | `{}` | {} |\n",
                element.kind, element.selector, element.purpose
            ));
        }
        out.push('\n');
    }

    if !features.functional_capabilities.is_empty() {
        out.push_str("### Functional Capabilities\n\n");
        out.push_str("| Name | Description | Complexity |\n|---|---|---|\n");
        for capability in &features.functional_capabilities {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                capability.name,
                capability.description,
                capability
                    .complexity_score
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".into())
            ));
        }
        out.push('\n');
    }

    if !features.api_integrations.is_empty() {
        out.push_str("### API Integrations\n\n");
        out.push_str("| Method | Endpoint | Purpose | Auth |\n|---|---|---|---|\n");
        for api in &features.api_integrations {
            out.push_str(&format!(
                "| {} | `{}` | {} | {:?} |\n",
                api.method, api.endpoint, api.purpose, api.auth
            ));
        }
        out.push('\n');
    }

    if !features.business_rules.is_empty() {
        out.push_str("### Business Rules\n\n");
        out.push_str("| Rule | Description |\n|---|---|\n");
        for rule in &features.business_rules {
            out.push_str(&format!("| {} | {} |\n", rule.name, rule.description));
        }
        out.push('\n');
    }

    if !features.third_party_integrations.is_empty() {
        out.push_str("### Third-Party Services\n\n");
        for service in &features.third_party_integrations {
            out.push_str(&format!(
                "- **{}** ({}): {}\n",
                service.service_name, service.integration_type, service.purpose
            ));
        }
        out.push('\n');
    }

    if !features.rebuild_specs.is_empty() {
        out.push_str("### Rebuild Specifications\n\n");
        out.push_str("| Priority | Name | Complexity | Description |\n|---|---|---|---|\n");
        for spec in &features.rebuild_specs {
            out.push_str(&format!(
                "| {} | {} | {:?} | {} |\n",
                spec.priority, spec.name, spec.complexity, spec.description
            ));
        }
        out.push('\n');
    }
}

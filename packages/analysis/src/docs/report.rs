//! Master report generation.
//!
//! The report is always rebuilt in full from the on-disk per-page results
//! and published with one atomic rename, so it reflects the latest
//! terminal state of every page and regenerating from the same artifacts
//! is byte-identical.

use std::collections::BTreeMap;

use crate::analysis::models::{PageResult, StepOutcome};

/// Render the master report from the full set of page results.
///
/// `results` must already be in a stable order (the store lists them
/// sorted by page id).
pub fn render_master_report(seed_url: &str, project_id: &str, results: &[PageResult]) -> String {
    let mut out = String::new();

    let completed: Vec<&PageResult> = results.iter().filter(|r| r.is_success()).collect();
    let partial: Vec<&PageResult> = results.iter().filter(|r| r.is_partial()).collect();
    let failed: Vec<&PageResult> = results
        .iter()
        .filter(|r| !r.step1.is_completed())
        .collect();

    out.push_str(&format!("# Site Analysis Report: {seed_url}\n\n"));
    out.push_str(&format!("Project: `{project_id}`\n\n"));

    // Executive summary
    out.push_str("## Executive Summary\n\n");
    out.push_str(&format!("- Pages analyzed: {}\n", results.len()));
    out.push_str(&format!("- Fully completed: {}\n", completed.len()));
    out.push_str(&format!("- Partial (summary only): {}\n", partial.len()));
    out.push_str(&format!("- Failed: {}\n", failed.len()));

    let confidences: Vec<f64> = results
        .iter()
        .filter_map(|r| r.step1.as_completed().map(|s| s.confidence))
        .collect();
    if !confidences.is_empty() {
        let avg = confidences.iter().sum::<f64>() / confidences.len() as f64;
        out.push_str(&format!("- Average summary confidence: {avg:.2}\n"));
    }
    let qualities: Vec<f64> = results
        .iter()
        .filter_map(|r| r.step2.as_completed().map(|f| f.quality.overall))
        .collect();
    if !qualities.is_empty() {
        let avg = qualities.iter().sum::<f64>() / qualities.len() as f64;
        out.push_str(&format!("- Average feature-analysis quality: {avg:.2}\n"));
    }
    out.push('\n');

    // Table of contents regenerated from the per-page artifacts
    out.push_str("## Pages\n\n");
    for result in results {
        out.push_str(&format!(
            "- [{url}](pages/page-{id}.md) — step1: {s1}, step2: {s2}\n",
            url = result.url,
            id = result.page_id,
            s1 = result.step1.label(),
            s2 = result.step2.label(),
        ));
    }
    out.push('\n');

    render_api_summary(&mut out, results);
    render_business_logic(&mut out, results);
    render_rebuild_specs(&mut out, results);

    if !partial.is_empty() {
        out.push_str("## Partial Results\n\n");
        out.push_str("Step 1 succeeded but feature analysis failed for these pages; their summaries are preserved:\n\n");
        for result in &partial {
            let reason = match &result.step2 {
                StepOutcome::Failed { reason, .. } => reason.as_str(),
                _ => "unknown",
            };
            out.push_str(&format!("- [{}](pages/page-{}.md) — {}\n", result.url, result.page_id, reason));
        }
        out.push('\n');
    }

    if !failed.is_empty() {
        out.push_str("## Failed Pages\n\n");
        for result in &failed {
            let kinds: Vec<&str> = result.errors.iter().map(|e| e.kind.as_str()).collect();
            out.push_str(&format!(
                "- {} — {}\n",
                result.url,
                if kinds.is_empty() {
                    "analysis failed".to_string()
                } else {
                    kinds.join(", ")
                },
            ));
        }
        out.push('\n');
    }

    out
}

/// API integrations across all pages, grouped by method.
fn render_api_summary(out: &mut String, results: &[PageResult]) {
    let mut by_method: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for result in results {
        if let Some(features) = result.step2.as_completed() {
            for api in &features.api_integrations {
                by_method
                    .entry(api.method.to_ascii_uppercase())
                    .or_default()
                    .entry(api.endpoint.clone())
                    .or_default()
                    .push(result.url.clone());
            }
        }
    }
    if by_method.is_empty() {
        return;
    }

    out.push_str("## API Integration Summary\n\n");
    for (method, endpoints) in by_method {
        out.push_str(&format!("### {method}\n\n"));
        for (endpoint, pages) in endpoints {
            out.push_str(&format!("- `{}` (used by {} page(s))\n", endpoint, pages.len()));
        }
        out.push('\n');
    }
}

/// Deduplicated workflow list with supporting business rules.
fn render_business_logic(out: &mut String, results: &[PageResult]) {
    let mut workflows: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut rules: BTreeMap<String, String> = BTreeMap::new();

    for result in results {
        if let Some(summary) = result.step1.as_completed() {
            for workflow in &summary.workflows {
                workflows
                    .entry(workflow.to_ascii_lowercase())
                    .or_default()
                    .push(result.url.clone());
            }
        }
        if let Some(features) = result.step2.as_completed() {
            for rule in &features.business_rules {
                rules
                    .entry(rule.name.clone())
                    .or_insert_with(|| rule.description.clone());
            }
        }
    }

    if workflows.is_empty() && rules.is_empty() {
        return;
    }

    out.push_str("## Business Logic\n\n");
    if !workflows.is_empty() {
        out.push_str("### Workflows\n\n");
        for (workflow, pages) in workflows {
            out.push_str(&format!("- **{}** ({} page(s))\n", workflow, pages.len()));
        }
        out.push('\n');
    }
    if !rules.is_empty() {
        out.push_str("### Business Rules\n\n");
        for (name, description) in rules {
            out.push_str(&format!("- **{name}**: {description}\n"));
        }
        out.push('\n');
    }
}

/// All rebuild specs across pages, ranked by priority score.
fn render_rebuild_specs(out: &mut String, results: &[PageResult]) {
    let mut specs: Vec<(&PageResult, &crate::analysis::models::RebuildSpec)> = Vec::new();
    for result in results {
        if let Some(features) = result.step2.as_completed() {
            for spec in &features.rebuild_specs {
                specs.push((result, spec));
            }
        }
    }
    if specs.is_empty() {
        return;
    }

    specs.sort_by(|a, b| {
        b.1.priority_score
            .partial_cmp(&a.1.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.page_id.cmp(&b.0.page_id))
            .then_with(|| a.1.name.cmp(&b.1.name))
    });

    out.push_str("## Technical Specifications\n\n");
    out.push_str("Rebuild specifications across all pages, highest priority first:\n\n");
    out.push_str("| Priority | Spec | Page | Complexity |\n|---|---|---|---|\n");
    for (result, spec) in specs {
        out.push_str(&format!(
            "| {} | {} | [{}](pages/page-{}.md) | {:?} |\n",
            spec.priority, spec.name, result.url, result.page_id, spec.complexity
        ));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::{
        ApiIntegration, AuthRequirement, FeatureAnalysis, QualityScore,
    };
    use crate::testing::sample_summary;

    fn features() -> FeatureAnalysis {
        FeatureAnalysis {
            context_ref: "summary-1".into(),
            interactive_elements: vec![],
            functional_capabilities: vec![],
            api_integrations: vec![ApiIntegration {
                method: "post".into(),
                endpoint: "/api/orders".into(),
                purpose: "order creation".into(),
                auth: AuthRequirement::Required,
                data_flow: None,
            }],
            business_rules: vec![],
            third_party_integrations: vec![],
            rebuild_specs: vec![],
            overall_confidence: 0.8,
            quality: QualityScore::default(),
        }
    }

    fn completed_result(id: &str) -> PageResult {
        let mut result = PageResult::empty(id, &format!("https://example.com/{id}"));
        result.step1 = StepOutcome::Completed(sample_summary());
        result.step2 = StepOutcome::Completed(features());
        result
    }

    #[test]
    fn test_report_regeneration_is_byte_identical() {
        let results = vec![completed_result("a"), completed_result("b")];
        let first = render_master_report("https://example.com", "proj", &results);
        let second = render_master_report("https://example.com", "proj", &results);
        assert_eq!(first, second);
    }

    #[test]
    fn test_report_sections() {
        let mut partial = completed_result("pricing");
        partial.step2 = StepOutcome::Failed {
            reason: "quality below minimum".into(),
            raw_response: None,
        };

        let results = vec![completed_result("home"), partial];
        let report = render_master_report("https://example.com", "proj", &results);

        assert!(report.contains("## Executive Summary"));
        assert!(report.contains("- Pages analyzed: 2"));
        assert!(report.contains("## Partial Results"));
        assert!(report.contains("pages/page-pricing.md"));
        assert!(report.contains("### POST"));
        assert!(report.contains("`/api/orders`"));
        assert!(report.contains("**checkout**"));
    }

    #[test]
    fn test_failed_pages_listed_with_error_kind() {
        let mut failed = PageResult::empty("broken", "https://example.com/broken");
        failed.step1 = StepOutcome::Failed {
            reason: "navigation failed (404)".into(),
            raw_response: None,
        };
        failed.record_error("navigation_failure", "navigation failed (404)", 0);

        let report = render_master_report("https://example.com", "proj", &[failed]);
        assert!(report.contains("## Failed Pages"));
        assert!(report.contains("navigation_failure"));
    }
}

//! Terminal output helpers.

use site_analysis::discovery::UrlInventory;
use site_analysis::AnalysisOutcome;

/// Print the closing summary for a finished analysis run.
pub fn print_outcome(outcome: &AnalysisOutcome) {
    println!();
    println!("Analysis {:?} for {}", outcome.state, outcome.seed_url);
    println!("  workflow:   {}", outcome.workflow_id);
    println!("  project:    {}", outcome.project_id);
    println!(
        "  pages:      {} completed, {} failed, {} skipped, {} pending",
        outcome.counts.completed,
        outcome.counts.failed,
        outcome.counts.skipped,
        outcome.counts.pending
    );
    println!(
        "  cost:       ${:.4} estimated, ${:.4} actual ({} requests)",
        outcome.cost_estimate.estimated_cost_usd,
        outcome.usage.total_cost_usd,
        outcome.usage.total_requests
    );
    println!("  report:     {}", outcome.report_path.display());
}

/// Print a discovered inventory as a table.
pub fn print_inventory(inventory: &UrlInventory) {
    let (pages, assets, external) = inventory.counts();
    println!(
        "Discovered {} URLs for {} ({} pages, {} assets, {} external)",
        inventory.entries.len(),
        inventory.seed,
        pages,
        assets,
        external
    );
    println!();
    for entry in inventory.pages() {
        println!(
            "  [{source:?}] {url} (complexity {complexity}){title}",
            source = entry.source,
            url = entry.normalized.url,
            complexity = entry.complexity_estimate,
            title = entry
                .title
                .as_deref()
                .map(|t| format!(" — {t}"))
                .unwrap_or_default(),
        );
    }
}

//! Analysis-mode presets and priority page selection.

use serde::{Deserialize, Serialize};

use crate::discovery::{DiscoveredUrl, UrlInventory};
use crate::urls::NormalizedUrl;

/// Analysis depth presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Quick,
    #[default]
    Recommended,
    Comprehensive,
    Targeted,
}

impl AnalysisMode {
    /// Page budget when the caller does not supply one.
    pub fn default_max_pages(&self) -> usize {
        match self {
            AnalysisMode::Quick => 10,
            AnalysisMode::Recommended => 20,
            AnalysisMode::Comprehensive => 50,
            AnalysisMode::Targeted => 15,
        }
    }

    /// Whether Step 2 runs unless the caller overrides.
    pub fn step2_default(&self) -> bool {
        !matches!(self, AnalysisMode::Quick)
    }

    /// Step 1 confidence required before Step 2 is attempted.
    pub fn step2_confidence_gate(&self) -> f64 {
        match self {
            AnalysisMode::Quick => 0.6,
            AnalysisMode::Recommended => 0.75,
            AnalysisMode::Comprehensive => 0.85,
            AnalysisMode::Targeted => 0.8,
        }
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(AnalysisMode::Quick),
            "recommended" => Ok(AnalysisMode::Recommended),
            "comprehensive" => Ok(AnalysisMode::Comprehensive),
            "targeted" => Ok(AnalysisMode::Targeted),
            other => Err(format!("unknown analysis mode: {other}")),
        }
    }
}

/// Cost/speed trade-off presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPriority {
    Speed,
    #[default]
    Balanced,
    CostEfficient,
}

impl CostPriority {
    /// Concurrent browser sessions for this priority.
    pub fn max_concurrent(&self) -> usize {
        match self {
            CostPriority::Speed => 5,
            CostPriority::Balanced => 3,
            CostPriority::CostEfficient => 1,
        }
    }
}

impl std::str::FromStr for CostPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "speed" => Ok(CostPriority::Speed),
            "balanced" => Ok(CostPriority::Balanced),
            "cost_efficient" | "cost-efficient" => Ok(CostPriority::CostEfficient),
            other => Err(format!("unknown cost priority: {other}")),
        }
    }
}

/// Well-known application paths that get selected ahead of the generic
/// score.
const PRIORITY_PATHS: &[&str] = &[
    "/", "/login", "/dashboard", "/admin", "/search", "/checkout", "/contact", "/about",
];

// Priority-score weights. The blend is fixed; ordering must be
// deterministic run to run.
const WEIGHT_JOURNEY: f64 = 0.4;
const WEIGHT_COMPLEXITY: f64 = 0.25;
const WEIGHT_ROOT_CLOSENESS: f64 = 0.2;
const WEIGHT_FOCUS: f64 = 0.15;

/// Rank the inventory's internal pages and take the top `max_pages`.
///
/// `max_pages` caps the selection after any caller filters have already
/// been applied to the inventory. Ties resolve by discovery order.
pub fn select_pages(
    inventory: &UrlInventory,
    max_pages: usize,
    focus_areas: &[String],
) -> Vec<NormalizedUrl> {
    let mut scored: Vec<(usize, f64, &DiscoveredUrl)> = inventory
        .pages()
        .enumerate()
        .map(|(index, entry)| (index, page_score(entry, focus_areas), entry))
        .collect();

    // Stable by construction: score descending, discovery order ascending.
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    scored
        .into_iter()
        .take(max_pages)
        .map(|(_, _, entry)| entry.normalized.clone())
        .collect()
}

/// Deterministic priority score for one discovered page.
pub fn page_score(entry: &DiscoveredUrl, focus_areas: &[String]) -> f64 {
    let path = entry.normalized.path.to_ascii_lowercase();

    let journey = journey_weight(&path);
    let complexity = f64::from(entry.complexity_estimate) / 10.0;

    let depth = path.split('/').filter(|s| !s.is_empty()).count();
    let root_closeness = 1.0 / (1.0 + depth as f64);

    let focus = if focus_areas.is_empty() {
        0.0
    } else {
        let haystack = format!(
            "{} {} {}",
            path,
            entry.title.as_deref().unwrap_or(""),
            entry.description.as_deref().unwrap_or("")
        )
        .to_ascii_lowercase();
        let hits = focus_areas
            .iter()
            .filter(|area| haystack.contains(&area.to_ascii_lowercase()))
            .count();
        (hits as f64 / focus_areas.len() as f64).min(1.0)
    };

    let mut score = WEIGHT_JOURNEY * journey
        + WEIGHT_COMPLEXITY * complexity
        + WEIGHT_ROOT_CLOSENESS * root_closeness
        + WEIGHT_FOCUS * focus;

    // Well-known application paths jump the queue.
    if PRIORITY_PATHS.iter().any(|p| path == *p || (*p != "/" && path.starts_with(p))) {
        score += 1.0;
    }

    score
}

/// URL-shape heuristic for journey stage before any analysis has run.
fn journey_weight(path: &str) -> f64 {
    const CONVERSION: &[&str] = &["checkout", "cart", "signup", "register", "subscribe", "donate", "buy"];
    const ENTRY: &[&str] = &["login", "home", "index", "welcome"];
    const EXIT: &[&str] = &["logout", "thank", "goodbye", "unsubscribe"];

    if path == "/" {
        return 0.8;
    }
    if CONVERSION.iter().any(|k| path.contains(k)) {
        return 1.0;
    }
    if EXIT.iter().any(|k| path.contains(k)) {
        return 0.3;
    }
    if ENTRY.iter().any(|k| path.contains(k)) {
        return 0.8;
    }
    0.5
}

/// Strategy recommendation derived from inventory size alone.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRecommendation {
    pub mode: AnalysisMode,
    pub cost_priority: CostPriority,
    pub max_pages: usize,
    pub reasoning: String,
}

/// Pick mode, cost priority, and page budget from the inventory.
pub fn recommend_strategy(inventory: &UrlInventory) -> StrategyRecommendation {
    let total = inventory.pages().count();

    let (mode, cost_priority, max_pages) = if total <= 10 {
        (AnalysisMode::Comprehensive, CostPriority::Balanced, total.max(1))
    } else if total <= 30 {
        (AnalysisMode::Recommended, CostPriority::Balanced, 20)
    } else {
        (AnalysisMode::Recommended, CostPriority::CostEfficient, 25)
    };

    StrategyRecommendation {
        mode,
        cost_priority,
        max_pages,
        reasoning: format!("selected from {total} discovered pages"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::pipeline::UrlSource;
    use crate::urls::{is_asset, normalize};

    fn inventory(urls: &[&str]) -> UrlInventory {
        let seed = normalize("https://example.com/").unwrap();
        let entries = urls
            .iter()
            .map(|u| {
                let normalized = normalize(u).unwrap();
                DiscoveredUrl {
                    internal: true,
                    is_asset: is_asset(&normalized),
                    complexity_estimate: 3,
                    title: None,
                    description: None,
                    depth: 0,
                    source: UrlSource::Sitemap,
                    normalized,
                }
            })
            .collect();
        UrlInventory {
            seed,
            entries,
            robots_disallow: vec![],
        }
    }

    #[test]
    fn test_priority_paths_selected_first() {
        let inv = inventory(&[
            "https://example.com/blog/post-1",
            "https://example.com/blog/post-2",
            "https://example.com/checkout",
            "https://example.com/",
        ]);

        let selected = select_pages(&inv, 2, &[]);
        let paths: Vec<&str> = selected.iter().map(|u| u.path.as_str()).collect();
        assert!(paths.contains(&"/checkout"));
        assert!(paths.contains(&"/"));
    }

    #[test]
    fn test_max_pages_caps_selection() {
        let inv = inventory(&[
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c",
        ]);
        assert_eq!(select_pages(&inv, 2, &[]).len(), 2);
        assert_eq!(select_pages(&inv, 10, &[]).len(), 3);
    }

    #[test]
    fn test_focus_areas_shift_ordering() {
        let inv = inventory(&[
            "https://example.com/articles/one",
            "https://example.com/pricing/plans",
        ]);

        let selected = select_pages(&inv, 1, &["pricing".into()]);
        assert_eq!(selected[0].path, "/pricing/plans");
    }

    #[test]
    fn test_ties_resolve_by_discovery_order() {
        let inv = inventory(&[
            "https://example.com/one",
            "https://example.com/two",
            "https://example.com/six",
        ]);

        let first = select_pages(&inv, 3, &[]);
        let second = select_pages(&inv, 3, &[]);
        assert_eq!(first, second);
        // Equal scores keep inventory order
        assert_eq!(first[0].path, "/one");
    }

    #[test]
    fn test_mode_presets() {
        assert_eq!(AnalysisMode::Quick.default_max_pages(), 10);
        assert!(!AnalysisMode::Quick.step2_default());
        assert!(AnalysisMode::Recommended.step2_default());
        assert_eq!(AnalysisMode::Comprehensive.default_max_pages(), 50);
        assert!((AnalysisMode::Targeted.step2_confidence_gate() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_recommend_strategy_by_size() {
        let small = inventory(&["https://example.com/a"]);
        let rec = recommend_strategy(&small);
        assert_eq!(rec.mode, AnalysisMode::Comprehensive);

        let urls: Vec<String> = (0..40)
            .map(|i| format!("https://example.com/page-{i}"))
            .collect();
        let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let large = inventory(&url_refs);
        let rec = recommend_strategy(&large);
        assert_eq!(rec.cost_priority, CostPriority::CostEfficient);
        assert_eq!(rec.max_pages, 25);
    }
}

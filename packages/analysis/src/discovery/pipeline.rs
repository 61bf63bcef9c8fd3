//! Discovery pipeline: seed URL to ranked, classified URL inventory.
//!
//! Sources compose in a fixed order: robots.txt, sitemaps (well-known
//! locations plus any robots listed), then a breadth-first crawl when the
//! sitemaps came back thin. First-seen order is preserved throughout.

use std::collections::HashSet;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::crawler::{crawl, extract_title_and_description, CrawlConfig};
use super::robots::{analyze_robots, RobotsInfo, USER_AGENT};
use super::sitemap::fetch_sitemaps;
use crate::config::Settings;
use crate::error::AnalysisError;
use crate::urls::{is_asset, is_internal, normalize, NormalizedUrl};

/// Crawl kicks in when the sitemaps produced fewer pages than this.
const MIN_SITEMAP_PAGES: usize = 3;

/// Where an inventory entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UrlSource {
    Seed,
    Sitemap,
    RobotsSitemap,
    Crawl,
}

/// One discovered URL with its classification and cheap metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub normalized: NormalizedUrl,
    pub source: UrlSource,
    pub depth: usize,
    pub internal: bool,
    pub is_asset: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    /// 1-10, from path depth, query parameters, and asset hints
    pub complexity_estimate: u8,
}

/// Ordered, deduplicated set of discovered URLs.
///
/// The seed host is the authority for the `internal` flag on every entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlInventory {
    pub seed: NormalizedUrl,
    pub entries: Vec<DiscoveredUrl>,
    /// Disallow patterns observed in robots.txt (informational)
    pub robots_disallow: Vec<String>,
}

impl UrlInventory {
    /// Internal, non-asset pages: the analysis candidates.
    pub fn pages(&self) -> impl Iterator<Item = &DiscoveredUrl> {
        self.entries.iter().filter(|e| e.internal && !e.is_asset)
    }

    /// Entry count grouped as (internal pages, internal assets, external).
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut pages = 0;
        let mut assets = 0;
        let mut external = 0;
        for entry in &self.entries {
            if !entry.internal {
                external += 1;
            } else if entry.is_asset {
                assets += 1;
            } else {
                pages += 1;
            }
        }
        (pages, assets, external)
    }
}

/// Which list wins when both include and exclude patterns are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlFilterMode {
    /// Keep only URLs matching the include patterns
    Include,
    /// Drop URLs matching the exclude patterns
    #[default]
    Exclude,
}

/// Caller-supplied glob filters, applied after discovery and before page
/// selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlFilters {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub mode: UrlFilterMode,
}

impl UrlFilters {
    pub fn is_empty(&self) -> bool {
        self.include_patterns.is_empty() && self.exclude_patterns.is_empty()
    }

    /// Apply the filters to an inventory, preserving order.
    pub fn apply(&self, inventory: &UrlInventory) -> Result<UrlInventory, AnalysisError> {
        if self.is_empty() {
            return Ok(inventory.clone());
        }

        let include = build_globset(&self.include_patterns)?;
        let exclude = build_globset(&self.exclude_patterns)?;

        let entries = inventory
            .entries
            .iter()
            .filter(|entry| {
                let candidate = filter_target(&entry.normalized);
                match self.mode {
                    UrlFilterMode::Include => match &include {
                        Some(set) => set.is_match(&candidate),
                        // Include mode with no include list keeps everything
                        // not excluded.
                        None => !matches(&exclude, &candidate),
                    },
                    UrlFilterMode::Exclude => {
                        if matches(&exclude, &candidate) {
                            false
                        } else if let Some(set) = &include {
                            set.is_match(&candidate)
                        } else {
                            true
                        }
                    }
                }
            })
            .cloned()
            .collect();

        Ok(UrlInventory {
            seed: inventory.seed.clone(),
            entries,
            robots_disallow: inventory.robots_disallow.clone(),
        })
    }
}

fn matches(set: &Option<GlobSet>, candidate: &str) -> bool {
    set.as_ref().map(|s| s.is_match(candidate)).unwrap_or(false)
}

/// Globs match against path plus query, e.g. `/admin/*` or `*.pdf`.
fn filter_target(url: &NormalizedUrl) -> String {
    match url.url.split_once('?') {
        Some((_, query)) => format!("{}?{}", url.path, query),
        None => url.path.clone(),
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, AnalysisError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            AnalysisError::Config(format!("invalid URL filter pattern {pattern:?}: {e}"))
        })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| AnalysisError::Config(format!("invalid URL filter set: {e}")))?;
    Ok(Some(set))
}

/// Discovers the URL inventory for a seed.
pub struct DiscoveryPipeline {
    client: reqwest::Client,
    crawl_config: CrawlConfig,
}

impl DiscoveryPipeline {
    /// Build a pipeline from settings.
    pub fn new(settings: &Settings) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.discovery_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AnalysisError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            crawl_config: CrawlConfig {
                max_depth: settings.discovery_max_depth,
                ..Default::default()
            },
        })
    }

    /// Override the crawl limits.
    pub fn with_crawl_config(mut self, config: CrawlConfig) -> Self {
        self.crawl_config = config;
        self
    }

    /// Run discovery for a raw seed URL.
    ///
    /// Individual source failures degrade (warn and continue). The seed is
    /// probed once and joins the inventory only when it responds; a run
    /// that ends with zero reachable pages is an
    /// [`AnalysisError::Discovery`].
    pub async fn discover(&self, seed_url: &str) -> Result<UrlInventory, AnalysisError> {
        let seed = normalize(seed_url)?;
        let site_root = format!("{}://{}", seed.scheme, seed.host);

        info!(seed = %seed, "discovery starting");

        let robots = analyze_robots(&self.client, &site_root).await;

        // One probe settles seed reachability and yields its title and
        // description for the inventory heuristics.
        let seed_page = self.fetch_seed(&seed).await;

        // Well-known sitemap location first, then anything robots.txt lists.
        let mut sitemap_sources: Vec<(String, UrlSource)> =
            vec![(format!("{site_root}/sitemap.xml"), UrlSource::Sitemap)];
        for url in &robots.sitemap_urls {
            sitemap_sources.push((url.clone(), UrlSource::RobotsSitemap));
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut entries: Vec<DiscoveredUrl> = Vec::new();

        // A responding seed leads the inventory.
        match &seed_page {
            Some((title, description)) => push_entry(
                &mut entries,
                &mut seen,
                &seed,
                seed.clone(),
                UrlSource::Seed,
                0,
                title.clone(),
                description.clone(),
            ),
            None => {
                warn!(seed = %seed, "seed did not respond; relying on sitemap entries");
            }
        }

        for (sitemap_url, source) in sitemap_sources {
            let urls = fetch_sitemaps(&self.client, &[sitemap_url]).await;
            for url in urls {
                push_entry(&mut entries, &mut seen, &seed, url, source, 0, None, None);
            }
        }

        let sitemap_pages = entries
            .iter()
            .filter(|e| e.internal && !e.is_asset)
            .count();

        if sitemap_pages < MIN_SITEMAP_PAGES {
            if robots.disallows_all() && self.crawl_config.respect_disallow {
                warn!(seed = %seed, "robots.txt disallows crawling; inventory limited to sitemap entries");
            } else if seed_page.is_none() {
                warn!(seed = %seed, "skipping crawl: seed is unreachable");
            } else {
                info!(
                    sitemap_pages = sitemap_pages,
                    "sitemap yield below threshold, crawling"
                );
                let crawled = crawl(&self.client, &seed, &robots, &self.crawl_config).await;
                for page in crawled {
                    push_entry(
                        &mut entries,
                        &mut seen,
                        &seed,
                        page.url,
                        UrlSource::Crawl,
                        page.depth,
                        page.title,
                        page.description,
                    );
                }
            }
        }

        let inventory = UrlInventory {
            seed: seed.clone(),
            robots_disallow: robots.disallow_patterns.clone(),
            entries,
        };

        let (pages, assets, external) = inventory.counts();
        info!(
            seed = %seed,
            pages = pages,
            assets = assets,
            external = external,
            "discovery complete"
        );

        if inventory.pages().next().is_none() {
            let reason = if seed_page.is_none() {
                "seed is unreachable and no URLs were found via sitemap or crawl"
            } else {
                "no reachable pages found via sitemap or crawl"
            };
            return Err(AnalysisError::Discovery {
                url: seed.url,
                reason: reason.into(),
            });
        }

        Ok(inventory)
    }

    /// Probe the seed itself. `None` means unreachable (transport failure
    /// or a non-success status); `Some` carries the title/description
    /// heuristics pulled from its markup.
    async fn fetch_seed(
        &self,
        seed: &NormalizedUrl,
    ) -> Option<(Option<String>, Option<String>)> {
        match self.client.get(&seed.url).send().await {
            Ok(response) if response.status().is_success() => {
                let html = response.text().await.unwrap_or_default();
                Some(extract_title_and_description(&html))
            }
            Ok(response) => {
                warn!(seed = %seed, status = %response.status(), "seed probe returned non-success");
                None
            }
            Err(e) => {
                warn!(seed = %seed, error = %e, "seed probe failed");
                None
            }
        }
    }

    /// The robots info for a seed, exposed for status/diagnostic calls.
    pub async fn robots(&self, seed_url: &str) -> Result<RobotsInfo, AnalysisError> {
        let seed = normalize(seed_url)?;
        let site_root = format!("{}://{}", seed.scheme, seed.host);
        Ok(analyze_robots(&self.client, &site_root).await)
    }
}

#[allow(clippy::too_many_arguments)]
fn push_entry(
    entries: &mut Vec<DiscoveredUrl>,
    seen: &mut HashSet<String>,
    seed: &NormalizedUrl,
    url: NormalizedUrl,
    source: UrlSource,
    depth: usize,
    title: Option<String>,
    description: Option<String>,
) {
    if !seen.insert(url.url.clone()) {
        return;
    }
    let internal = is_internal(&url, &seed.domain);
    let asset = is_asset(&url);
    let complexity = complexity_estimate(&url);
    entries.push(DiscoveredUrl {
        normalized: url,
        source,
        depth,
        internal,
        is_asset: asset,
        title,
        description,
        complexity_estimate: complexity,
    });
}

/// Cheap 1-10 complexity estimate from URL shape alone.
pub(crate) fn complexity_estimate(url: &NormalizedUrl) -> u8 {
    let path_depth = url.path.split('/').filter(|s| !s.is_empty()).count();
    let query_params = url
        .url
        .split_once('?')
        .map(|(_, q)| q.split('&').filter(|p| !p.is_empty()).count())
        .unwrap_or(0);
    let asset_penalty = if is_asset(url) { 0 } else { 1 };

    let score = 1 + path_depth.min(4) + (query_params * 2).min(4) + asset_penalty;
    score.min(10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> DiscoveredUrl {
        let normalized = normalize(url).unwrap();
        DiscoveredUrl {
            internal: true,
            is_asset: is_asset(&normalized),
            complexity_estimate: complexity_estimate(&normalized),
            normalized,
            source: UrlSource::Sitemap,
            depth: 0,
            title: None,
            description: None,
        }
    }

    fn inventory(urls: &[&str]) -> UrlInventory {
        UrlInventory {
            seed: normalize("https://example.com/").unwrap(),
            entries: urls.iter().map(|u| entry(u)).collect(),
            robots_disallow: vec![],
        }
    }

    #[test]
    fn test_complexity_estimate_bounds() {
        let simple = normalize("https://example.com/").unwrap();
        assert_eq!(complexity_estimate(&simple), 2);

        let deep = normalize("https://example.com/a/b/c/d/e/f?x=1&y=2&z=3").unwrap();
        let score = complexity_estimate(&deep);
        assert!(score >= 8 && score <= 10);
    }

    #[test]
    fn test_exclude_filter() {
        let inv = inventory(&[
            "https://example.com/",
            "https://example.com/admin/users",
            "https://example.com/docs/guide.pdf",
            "https://example.com/about",
        ]);

        let filters = UrlFilters {
            exclude_patterns: vec!["/admin/*".into(), "*.pdf".into()],
            mode: UrlFilterMode::Exclude,
            ..Default::default()
        };

        let filtered = filters.apply(&inv).unwrap();
        let urls: Vec<&str> = filtered
            .entries
            .iter()
            .map(|e| e.normalized.url.as_str())
            .collect();
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/about"]);
    }

    #[test]
    fn test_include_filter() {
        let inv = inventory(&[
            "https://example.com/",
            "https://example.com/blog/post-1",
            "https://example.com/about",
        ]);

        let filters = UrlFilters {
            include_patterns: vec!["/blog/*".into()],
            mode: UrlFilterMode::Include,
            ..Default::default()
        };

        let filtered = filters.apply(&inv).unwrap();
        assert_eq!(filtered.entries.len(), 1);
        assert_eq!(filtered.entries[0].normalized.path, "/blog/post-1");
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let filters = UrlFilters {
            exclude_patterns: vec!["[invalid".into()],
            ..Default::default()
        };
        assert!(matches!(
            filters.apply(&inventory(&["https://example.com/"])),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn test_inventory_counts() {
        let mut inv = inventory(&[
            "https://example.com/",
            "https://example.com/logo.png",
            "https://example.com/about",
        ]);
        inv.entries.push(DiscoveredUrl {
            internal: false,
            ..entry("https://cdn.example.net/lib.js")
        });

        let (pages, assets, external) = inv.counts();
        assert_eq!((pages, assets, external), (2, 1, 1));
        assert_eq!(inv.pages().count(), 2);
    }
}

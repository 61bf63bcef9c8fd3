//! Breadth-first same-domain crawler.
//!
//! Used when sitemaps come back thin: starts at the seed, follows
//! same-domain links, skips assets, strips fragments, dedupes, and stops
//! at the page or depth budget.

use std::collections::{HashSet, VecDeque};

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::robots::RobotsInfo;
use crate::urls::{is_asset, is_internal, normalize, NormalizedUrl};

/// Crawl limits and behavior.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum link depth from the seed (0 = seed only)
    pub max_depth: usize,

    /// Stop after this many pages have been collected
    pub max_pages: usize,

    /// Honor robots.txt disallow rules
    pub respect_disallow: bool,

    /// Delay between requests in milliseconds
    pub rate_limit_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            respect_disallow: true,
            rate_limit_ms: 100,
        }
    }
}

/// A crawled page: its URL plus the cheap metadata discovery wants.
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: NormalizedUrl,
    pub depth: usize,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Crawl breadth-first from `seed`, returning pages in first-seen order.
///
/// Fetch failures on individual pages are logged and skipped; only a seed
/// that yields nothing at all is the caller's problem.
pub async fn crawl(
    client: &reqwest::Client,
    seed: &NormalizedUrl,
    robots: &RobotsInfo,
    config: &CrawlConfig,
) -> Vec<CrawledPage> {
    let root_domain = seed.domain.clone();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(NormalizedUrl, usize)> = VecDeque::new();
    let mut pages: Vec<CrawledPage> = Vec::new();

    queue.push_back((seed.clone(), 0));

    while let Some((url, depth)) = queue.pop_front() {
        if pages.len() >= config.max_pages {
            info!(max_pages = config.max_pages, "crawl page budget reached");
            break;
        }
        if depth > config.max_depth || !visited.insert(url.url.clone()) {
            continue;
        }
        if config.respect_disallow && !robots.is_allowed(&url.path) {
            debug!(url = %url, "robots.txt disallows, skipping");
            continue;
        }

        let html = match fetch_page(client, &url).await {
            Some(html) => html,
            None => continue,
        };

        let (title, description) = extract_title_and_description(&html);
        let links = if depth < config.max_depth {
            extract_links(&url.parsed(), &html)
        } else {
            Vec::new()
        };

        debug!(url = %url, depth = depth, links = links.len(), "crawled page");

        pages.push(CrawledPage {
            url,
            depth,
            title,
            description,
        });

        for link in links {
            let Ok(normalized) = normalize(&link) else {
                continue;
            };
            if !is_internal(&normalized, &root_domain) || is_asset(&normalized) {
                continue;
            }
            if !visited.contains(&normalized.url) {
                queue.push_back((normalized, depth + 1));
            }
        }

        let delay = robots
            .crawl_delay
            .map(|d| d.as_millis() as u64)
            .unwrap_or(config.rate_limit_ms);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
    }

    pages
}

async fn fetch_page(client: &reqwest::Client, url: &NormalizedUrl) -> Option<String> {
    match client.get(&url.url).send().await {
        Ok(response) if response.status().is_success() => {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !content_type.is_empty() && !content_type.contains("html") {
                debug!(url = %url, content_type = %content_type, "skipping non-HTML response");
                return None;
            }
            response.text().await.ok()
        }
        Ok(response) => {
            debug!(url = %url, status = %response.status(), "crawl fetch non-success");
            None
        }
        Err(e) => {
            warn!(url = %url, error = %e, "crawl fetch failed");
            None
        }
    }
}

/// Extract `<a href>` targets, resolved against the page URL.
pub(crate) fn extract_links(base: &Url, html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| {
            !href.starts_with('#')
                && !href.starts_with("javascript:")
                && !href.starts_with("mailto:")
                && !href.starts_with("tel:")
        })
        .filter_map(|href| base.join(href).ok())
        .map(|mut resolved| {
            resolved.set_fragment(None);
            resolved.to_string()
        })
        .collect()
}

/// Pull the `<title>` and meta description out of a page.
pub(crate) fn extract_title_and_description(html: &str) -> (Option<String>, Option<String>) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let description = Selector::parse(r#"meta[name="description"]"#)
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    (title, description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_resolves_and_filters() {
        let base = Url::parse("https://example.com/page").unwrap();
        let html = r##"
            <a href="/about">About</a>
            <a href="https://example.com/contact#form">Contact</a>
            <a href="#section">Anchor</a>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:x@example.com">Mail</a>
        "##;

        let links = extract_links(&base, html);

        assert!(links.contains(&"https://example.com/about".to_string()));
        assert!(links.contains(&"https://example.com/contact".to_string()));
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_extract_title_and_description() {
        let html = r#"<html><head>
            <title> Welcome </title>
            <meta name="description" content="A fine site">
        </head><body></body></html>"#;

        let (title, description) = extract_title_and_description(html);
        assert_eq!(title.as_deref(), Some("Welcome"));
        assert_eq!(description.as_deref(), Some("A fine site"));
    }

    #[test]
    fn test_extract_title_absent() {
        let (title, description) = extract_title_and_description("<html><body>hi</body></html>");
        assert!(title.is_none());
        assert!(description.is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config = CrawlConfig::default();
        assert!(config.respect_disallow);
        assert_eq!(config.max_depth, 3);
    }
}

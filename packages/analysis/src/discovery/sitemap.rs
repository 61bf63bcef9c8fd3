//! Sitemap fetching.
//!
//! Handles plain urlsets and sitemap indexes (recursively, with a depth
//! guard). `lastmod`, `priority`, and `changefreq` are ignored; only the
//! `<loc>` entries matter for building the inventory.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, warn};

use crate::urls::{normalize, NormalizedUrl};

/// Recursion guard for nested sitemap indexes.
const MAX_INDEX_DEPTH: usize = 3;

/// Per-run guard against absurd sitemaps.
const MAX_SITEMAP_URLS: usize = 10_000;

/// Fetch the given sitemap URLs (plus any indexes they point at) and
/// return the normalized page URLs, deduplicated in first-seen order.
pub async fn fetch_sitemaps(client: &reqwest::Client, sitemap_urls: &[String]) -> Vec<NormalizedUrl> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut pages: Vec<NormalizedUrl> = Vec::new();

    for url in sitemap_urls {
        fetch_one(client, url, 0, &mut seen, &mut pages).await;
        if pages.len() >= MAX_SITEMAP_URLS {
            warn!(limit = MAX_SITEMAP_URLS, "sitemap URL cap reached, truncating");
            break;
        }
    }

    pages
}

async fn fetch_one(
    client: &reqwest::Client,
    sitemap_url: &str,
    depth: usize,
    seen: &mut HashSet<String>,
    pages: &mut Vec<NormalizedUrl>,
) {
    if depth > MAX_INDEX_DEPTH {
        warn!(url = %sitemap_url, "sitemap index nesting too deep, skipping");
        return;
    }

    let body = match client.get(sitemap_url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %sitemap_url, error = %e, "failed to read sitemap body");
                return;
            }
        },
        Ok(response) => {
            debug!(url = %sitemap_url, status = %response.status(), "sitemap fetch non-success");
            return;
        }
        Err(e) => {
            warn!(url = %sitemap_url, error = %e, "sitemap fetch failed");
            return;
        }
    };

    let locs = extract_locs(&body);
    if is_sitemap_index(&body) {
        debug!(url = %sitemap_url, children = locs.len(), "sitemap index");
        for child in locs {
            if pages.len() >= MAX_SITEMAP_URLS {
                return;
            }
            Box::pin(fetch_one(client, &child, depth + 1, seen, pages)).await;
        }
        return;
    }

    for loc in locs {
        if pages.len() >= MAX_SITEMAP_URLS {
            return;
        }
        match normalize(&loc) {
            Ok(url) => {
                if seen.insert(url.url.clone()) {
                    pages.push(url);
                }
            }
            Err(_) => debug!(loc = %loc, "skipping malformed sitemap entry"),
        }
    }
}

/// Whether the document is a `<sitemapindex>` rather than a `<urlset>`.
fn is_sitemap_index(body: &str) -> bool {
    body.contains("<sitemapindex")
}

/// Pull every `<loc>` value out of a sitemap document.
///
/// Regex extraction is deliberate: sitemaps in the wild are frequently
/// malformed XML, and `<loc>` is the only element we need.
pub(crate) fn extract_locs(body: &str) -> Vec<String> {
    let pattern = Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").expect("static regex");
    pattern
        .captures_iter(body)
        .filter_map(|cap| cap.get(1))
        .map(|m| decode_xml_entities(m.as_str().trim()))
        .filter(|s| !s.is_empty())
        .collect()
}

fn decode_xml_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_locs_urlset() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc> https://example.com/about </loc></url>
</urlset>"#;

        let locs = extract_locs(body);
        assert_eq!(
            locs,
            vec!["https://example.com/", "https://example.com/about"]
        );
    }

    #[test]
    fn test_extract_locs_decodes_entities() {
        let body = "<urlset><url><loc>https://example.com/search?q=a&amp;b=2</loc></url></urlset>";
        assert_eq!(extract_locs(body), vec!["https://example.com/search?q=a&b=2"]);
    }

    #[test]
    fn test_is_sitemap_index() {
        assert!(is_sitemap_index(
            "<sitemapindex><sitemap><loc>https://example.com/s1.xml</loc></sitemap></sitemapindex>"
        ));
        assert!(!is_sitemap_index("<urlset></urlset>"));
    }

    #[test]
    fn test_extract_locs_tolerates_malformed_xml() {
        let body = "<urlset><url><loc>https://example.com/a</loc><url></urlset";
        assert_eq!(extract_locs(body), vec!["https://example.com/a"]);
    }
}

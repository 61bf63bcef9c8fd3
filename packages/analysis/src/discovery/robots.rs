//! robots.txt fetching and parsing.
//!
//! A missing or unreadable robots.txt is not an error: discovery proceeds
//! with an empty rule set and no sitemap hints.

use std::time::Duration;

use tracing::debug;

/// User-agent string sent by all discovery requests.
pub const USER_AGENT: &str = "SiteAnalysisBot/0.3";

/// Parsed robots.txt content relevant to discovery.
#[derive(Debug, Clone, Default)]
pub struct RobotsInfo {
    /// Disallowed path prefixes for our user-agent (or `*`)
    pub disallow_patterns: Vec<String>,

    /// Allowed path prefixes (override disallow)
    allow_patterns: Vec<String>,

    /// Sitemap URLs listed anywhere in the file
    pub sitemap_urls: Vec<String>,

    /// Crawl delay, if one applies to us
    pub crawl_delay: Option<Duration>,
}

impl RobotsInfo {
    /// Parse robots.txt content, keeping the record group that applies to
    /// our user-agent (falling back to `*`).
    pub fn parse(content: &str) -> Self {
        let mut wildcard = GroupRules::default();
        let mut specific = GroupRules::default();
        let mut sitemap_urls = Vec::new();

        let mut current_agents: Vec<String> = Vec::new();
        let mut current = GroupRules::default();
        let mut in_group_body = false;

        let mut flush =
            |agents: &[String], rules: &mut GroupRules, wildcard: &mut GroupRules, specific: &mut GroupRules| {
                for agent in agents {
                    if agent.as_str() == "*" {
                        wildcard.merge(rules);
                    } else if USER_AGENT.to_ascii_lowercase().contains(agent.as_str()) {
                        specific.merge(rules);
                    }
                }
                *rules = GroupRules::default();
            };

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if in_group_body {
                        flush(&current_agents, &mut current, &mut wildcard, &mut specific);
                        current_agents.clear();
                        in_group_body = false;
                    }
                    current_agents.push(value.to_ascii_lowercase());
                }
                "disallow" => {
                    in_group_body = true;
                    if !value.is_empty() {
                        current.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    in_group_body = true;
                    if !value.is_empty() {
                        current.allow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    in_group_body = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        current.crawl_delay = Some(delay);
                    }
                }
                "sitemap" => {
                    sitemap_urls.push(value.to_string());
                }
                _ => {}
            }
        }
        flush(&current_agents, &mut current, &mut wildcard, &mut specific);

        // A group naming us specifically takes precedence over `*`.
        let chosen = if specific.is_empty() { wildcard } else { specific };

        Self {
            disallow_patterns: chosen.disallow,
            allow_patterns: chosen.allow,
            sitemap_urls,
            crawl_delay: chosen.crawl_delay.map(Duration::from_secs_f64),
        }
    }

    /// Whether a path may be fetched under these rules.
    ///
    /// Allow prefixes override disallow prefixes.
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.allow_patterns.iter().any(|p| path.starts_with(p)) {
            return true;
        }
        !self
            .disallow_patterns
            .iter()
            .any(|p| p == "/" || path.starts_with(p.as_str()))
    }

    /// Whether the rules block everything.
    pub fn disallows_all(&self) -> bool {
        !self.is_allowed("/")
    }
}

#[derive(Debug, Clone, Default)]
struct GroupRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl GroupRules {
    fn merge(&mut self, other: &GroupRules) {
        self.disallow.extend(other.disallow.iter().cloned());
        self.allow.extend(other.allow.iter().cloned());
        if self.crawl_delay.is_none() {
            self.crawl_delay = other.crawl_delay;
        }
    }

    fn is_empty(&self) -> bool {
        self.disallow.is_empty() && self.allow.is_empty() && self.crawl_delay.is_none()
    }
}

/// Fetch and parse robots.txt for a site root.
///
/// Any fetch failure (404, network error, non-success status) yields the
/// empty default: crawling proceeds unrestricted.
pub async fn analyze_robots(client: &reqwest::Client, site_root: &str) -> RobotsInfo {
    let url = format!("{}/robots.txt", site_root.trim_end_matches('/'));

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(content) => {
                let info = RobotsInfo::parse(&content);
                debug!(
                    url = %url,
                    disallow = info.disallow_patterns.len(),
                    sitemaps = info.sitemap_urls.len(),
                    "parsed robots.txt"
                );
                info
            }
            Err(_) => RobotsInfo::default(),
        },
        _ => {
            debug!(url = %url, "no robots.txt, allowing all");
            RobotsInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Disallow: /admin/
Allow: /public/
Crawl-delay: 2

Sitemap: https://example.com/sitemap.xml
        "#;

        let robots = RobotsInfo::parse(content);

        assert!(robots.is_allowed("/public/page"));
        assert!(!robots.is_allowed("/private/page"));
        assert!(!robots.is_allowed("/admin/"));
        assert!(robots.is_allowed("/other/page"));
        assert_eq!(robots.crawl_delay, Some(Duration::from_secs(2)));
        assert_eq!(robots.sitemap_urls, vec!["https://example.com/sitemap.xml"]);
    }

    #[test]
    fn test_specific_agent_overrides_wildcard() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: siteanalysisbot
Allow: /
        "#;

        let robots = RobotsInfo::parse(content);
        assert!(robots.is_allowed("/page"));
    }

    #[test]
    fn test_disallow_all() {
        let robots = RobotsInfo::parse("User-agent: *\nDisallow: /\n");
        assert!(robots.disallows_all());
        assert!(!robots.is_allowed("/anything"));
    }

    #[test]
    fn test_empty_robots_allows_all() {
        let robots = RobotsInfo::parse("");
        assert!(robots.is_allowed("/any/path"));
        assert!(robots.crawl_delay.is_none());
        assert!(robots.sitemap_urls.is_empty());
    }

    #[test]
    fn test_comments_and_multiple_agents_per_group() {
        let content = r#"
# main group
User-agent: otherbot
User-agent: *
Disallow: /tmp/   # trailing comment
        "#;

        let robots = RobotsInfo::parse(content);
        assert!(!robots.is_allowed("/tmp/file"));
        assert!(robots.is_allowed("/home"));
    }
}

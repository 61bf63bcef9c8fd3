//! URL normalization, classification, and slug derivation.
//!
//! Every URL entering the system passes through [`normalize`] exactly once;
//! downstream code works with [`NormalizedUrl`] and compares by its `url`
//! string, which is canonical.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::AnalysisError;

/// File suffixes treated as static assets.
const ASSET_SUFFIXES: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf", "map", "pdf",
];

/// Two-label public suffixes that need three labels for a registrable domain.
///
/// Not exhaustive; covers the suffixes that show up in practice for the
/// sites this tool targets.
const TWO_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.jp", "co.nz", "co.in",
    "com.br", "com.mx", "co.za",
];

/// A URL in canonical form.
///
/// Invariant: `url == scheme + "://" + host + path + query` with the
/// fragment stripped and scheme/host lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedUrl {
    /// Canonical string form
    pub url: String,

    /// "http" or "https"
    pub scheme: String,

    /// Lowercased host
    pub host: String,

    /// Path component ("/" minimum)
    pub path: String,

    /// Registrable domain of the host
    pub domain: String,
}

impl NormalizedUrl {
    /// Parsed `url::Url` view of this URL.
    pub fn parsed(&self) -> Url {
        // The canonical string round-trips by construction.
        Url::parse(&self.url).expect("normalized URL must re-parse")
    }
}

impl std::fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Normalize a raw URL.
///
/// Requires an http/https scheme and a non-empty host. The fragment is
/// always stripped, the query preserved, and percent-encoding left alone.
pub fn normalize(raw: &str) -> Result<NormalizedUrl, AnalysisError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| AnalysisError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(AnalysisError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme: {scheme}"),
        });
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AnalysisError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        })?
        .to_ascii_lowercase();

    let host_with_port = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.clone(),
    };

    let path = if parsed.path().is_empty() {
        "/".to_string()
    } else {
        parsed.path().to_string()
    };

    let query = parsed
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    let url = format!("{scheme}://{host_with_port}{path}{query}");

    Ok(NormalizedUrl {
        url,
        scheme,
        host: host_with_port,
        domain: registrable_domain(&host),
        path,
    })
}

/// Registrable (public-suffix-aware) base domain of a host.
///
/// IP addresses and single-label hosts are returned unchanged.
pub fn registrable_domain(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let take = if TWO_LABEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len() - take.min(labels.len())..].join(".")
}

/// Whether a URL belongs to the seed's registrable domain.
pub fn is_internal(url: &NormalizedUrl, root_domain: &str) -> bool {
    url.domain == root_domain.to_ascii_lowercase()
}

/// Whether a URL points at a static asset, by suffix.
pub fn is_asset(url: &NormalizedUrl) -> bool {
    let path = url.path.to_ascii_lowercase();
    match path.rsplit_once('.') {
        Some((_, ext)) => ASSET_SUFFIXES.contains(&ext),
        None => false,
    }
}

/// Maximum slug length before the hash suffix is forced.
const SLUG_MAX_LEN: usize = 120;

/// Derive a filesystem-safe identifier for a URL.
///
/// Built from `host + path`; slugs longer than 120 characters, and any URL
/// carrying a query string, get a 6-character suffix of a stable hash of
/// the full URL so distinct URLs never collide.
pub fn slugify(url: &NormalizedUrl) -> String {
    let base = format!("{}{}", url.host, url.path);
    let mut slug = String::with_capacity(base.len());
    let mut last_dash = true;

    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let mut slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        slug.push_str("page");
    }

    let needs_hash = slug.len() > SLUG_MAX_LEN || url.url.contains('?');
    if needs_hash {
        slug.truncate(SLUG_MAX_LEN.saturating_sub(7));
        let slug_trimmed = slug.trim_end_matches('-');
        return format!("{}-{}", slug_trimmed, stable_hash(&url.url));
    }
    slug
}

/// First 6 hex characters of the SHA-256 of the input.
fn stable_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    hex[..6].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_canonical_form() {
        let url = normalize("HTTPS://Example.COM/About?ref=nav#team").unwrap();
        assert_eq!(url.url, "https://example.com/About?ref=nav");
        assert_eq!(url.scheme, "https");
        assert_eq!(url.host, "example.com");
        assert_eq!(url.path, "/About");
        assert_eq!(url.domain, "example.com");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize("https://Example.com/a/b?x=1#frag").unwrap();
        let twice = normalize(&once.url).unwrap();
        assert_eq!(once.url, twice.url);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize("ftp://example.com/file").is_err());
        assert!(normalize("not a url").is_err());
        assert!(normalize("https:///missing-host").is_err());
    }

    #[test]
    fn test_normalize_empty_path_becomes_slash() {
        let url = normalize("https://example.com").unwrap();
        assert_eq!(url.path, "/");
        assert_eq!(url.url, "https://example.com/");
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
        assert_eq!(registrable_domain("192.168.1.1"), "192.168.1.1");
    }

    #[test]
    fn test_is_internal_uses_registrable_domain() {
        let url = normalize("https://shop.example.com/cart").unwrap();
        assert!(is_internal(&url, "example.com"));
        assert!(!is_internal(&url, "other.com"));
    }

    #[test]
    fn test_is_asset() {
        let css = normalize("https://example.com/styles/main.css").unwrap();
        assert!(is_asset(&css));

        let page = normalize("https://example.com/about").unwrap();
        assert!(!is_asset(&page));

        let woff = normalize("https://example.com/font.WOFF2").unwrap();
        assert!(is_asset(&woff));
    }

    #[test]
    fn test_slugify_basic() {
        let url = normalize("https://example.com/about/team").unwrap();
        assert_eq!(slugify(&url), "example-com-about-team");
    }

    #[test]
    fn test_slugify_is_deterministic() {
        let a = normalize("https://example.com/products?id=1").unwrap();
        let b = normalize("https://example.com/products?id=1").unwrap();
        assert_eq!(slugify(&a), slugify(&b));
    }

    #[test]
    fn test_slugify_distinguishes_queries() {
        let a = normalize("https://example.com/products?id=1").unwrap();
        let b = normalize("https://example.com/products?id=2").unwrap();
        assert_ne!(slugify(&a), slugify(&b));
    }

    #[test]
    fn test_slugify_length_cap() {
        let long_path = format!("https://example.com/{}", "segment/".repeat(40));
        let url = normalize(&long_path).unwrap();
        let slug = slugify(&url);
        assert!(slug.len() <= 120);
        // Hash suffix keeps long URLs unique
        assert!(slug.rsplit('-').next().unwrap().len() == 6);
    }
}

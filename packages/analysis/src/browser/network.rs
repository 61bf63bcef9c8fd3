//! Network traffic capture model.
//!
//! Raw events come off the CDP wire via the page handle; this module owns
//! classification (third-party, API-shaped) and the derived views the
//! analyzer consumes.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::urls::registrable_domain;

/// Extensions excluded from the API-endpoint view.
const STATIC_SUFFIXES: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf", "map", "webp",
];

/// One observed request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvent {
    /// When the request was observed
    pub ts: DateTime<Utc>,
    pub method: String,
    pub url: String,
    /// Response status; absent when the request never completed
    pub status: Option<u16>,
    /// CDP resource type (document, xhr, fetch, script, ...)
    pub resource_type: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub req_headers: HashMap<String, String>,
    #[serde(default)]
    pub resp_headers: HashMap<String, String>,
    pub req_body: Option<String>,
    /// Encoded response size in bytes
    pub resp_size: Option<u64>,
    /// Request-to-response wall time
    pub timing_ms: Option<f64>,
    /// Registrable domain differs from the seed's
    pub is_third_party: bool,
}

impl NetworkEvent {
    /// Host of the request URL, when parseable.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }

    fn has_static_suffix(&self) -> bool {
        let path = self.path().to_ascii_lowercase();
        match path.rsplit_once('.') {
            Some((_, ext)) => STATIC_SUFFIXES.contains(&ext),
            None => false,
        }
    }

    /// Whether this event looks like an API call: JSON/XML content type,
    /// an API-shaped path, or an XHR/fetch that is not a static asset.
    pub fn is_api_like(&self) -> bool {
        if self.has_static_suffix() {
            return false;
        }

        if let Some(mime) = &self.mime_type {
            if mime.contains("json") || mime.contains("xml") {
                return true;
            }
        }

        let api_path = Regex::new(r"/api/|/graphql|/v\d+/").expect("static regex");
        if api_path.is_match(&self.path()) {
            return true;
        }

        matches!(
            self.resource_type.as_deref(),
            Some("XHR") | Some("Fetch") | Some("xhr") | Some("fetch")
        )
    }
}

/// An API endpoint observed during capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub mime_type: Option<String>,
    pub is_third_party: bool,
}

/// A third-party service grouped by registrable domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdPartyService {
    pub domain: String,
    pub request_count: usize,
    pub example_url: String,
}

/// Ordered capture of all network events for one page load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkLog {
    pub events: Vec<NetworkEvent>,
}

impl NetworkLog {
    /// Wrap raw events and stamp the third-party flag against the seed
    /// domain.
    pub fn classify(mut events: Vec<NetworkEvent>, seed_domain: &str) -> Self {
        for event in &mut events {
            event.is_third_party = event
                .host()
                .map(|h| registrable_domain(&h) != seed_domain)
                .unwrap_or(false);
        }
        Self { events }
    }

    /// Events that look like API traffic, static assets filtered out.
    pub fn api_endpoints(&self) -> Vec<ApiEndpoint> {
        self.events
            .iter()
            .filter(|e| e.is_api_like())
            .map(|e| ApiEndpoint {
                method: e.method.clone(),
                url: e.url.clone(),
                status: e.status,
                mime_type: e.mime_type.clone(),
                is_third_party: e.is_third_party,
            })
            .collect()
    }

    /// Third-party traffic grouped by registrable domain.
    pub fn third_parties(&self) -> Vec<ThirdPartyService> {
        let mut grouped: BTreeMap<String, (usize, String)> = BTreeMap::new();
        for event in self.events.iter().filter(|e| e.is_third_party) {
            let Some(host) = event.host() else { continue };
            let domain = registrable_domain(&host);
            let entry = grouped.entry(domain).or_insert((0, event.url.clone()));
            entry.0 += 1;
        }
        grouped
            .into_iter()
            .map(|(domain, (request_count, example_url))| ThirdPartyService {
                domain,
                request_count,
                example_url,
            })
            .collect()
    }

    /// Total bytes transferred, where sizes were reported.
    pub fn total_bytes(&self) -> u64 {
        self.events.iter().filter_map(|e| e.resp_size).sum()
    }
}

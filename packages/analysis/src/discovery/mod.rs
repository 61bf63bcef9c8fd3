//! URL inventory discovery: robots.txt, sitemaps, and fallback crawl.

pub mod crawler;
pub mod pipeline;
pub mod robots;
pub mod sitemap;

pub use crawler::{CrawlConfig, CrawledPage};
pub use pipeline::{
    DiscoveredUrl, DiscoveryPipeline, UrlFilterMode, UrlFilters, UrlInventory, UrlSource,
};
pub use robots::{analyze_robots, RobotsInfo};
pub use sitemap::fetch_sitemaps;

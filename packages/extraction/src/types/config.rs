//! Configuration types for crawling.

use serde::{Deserialize, Serialize};

/// Configuration for crawl operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Starting URL to crawl
    pub url: String,

    /// Maximum number of pages to crawl
    pub max_pages: usize,

    /// Maximum depth to crawl (0 = only starting page)
    pub max_depth: usize,

    /// Delay between requests in milliseconds
    pub rate_limit_ms: u64,

    /// Respect robots.txt
    pub respect_robots: bool,

    /// Follow links to subdomains
    pub follow_subdomains: bool,

    /// URL patterns to include (regex)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL patterns to exclude (regex)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_pages: 100,
            max_depth: 3,
            rate_limit_ms: 1000,
            respect_robots: true,
            follow_subdomains: false,
            include_patterns: vec![],
            exclude_patterns: vec![],
        }
    }
}

impl CrawlConfig {
    /// Create a new crawl config for a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set maximum pages.
    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    /// Set maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set rate limit.
    pub fn with_rate_limit_ms(mut self, ms: u64) -> Self {
        self.rate_limit_ms = ms;
        self
    }

    /// Disable robots.txt respect.
    pub fn ignore_robots(mut self) -> Self {
        self.respect_robots = false;
        self
    }

    /// Enable subdomain following.
    pub fn with_subdomains(mut self) -> Self {
        self.follow_subdomains = true;
        self
    }

    /// Add an include pattern.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }
}

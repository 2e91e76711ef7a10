//! # Extraction Library
//!
//! Domain-agnostic web-fetch and SSRF-protected crawling primitives, shared
//! by every higher-level crate in this workspace. This crate knows nothing
//! about contacts, jobs, or mining modes — it only knows how to safely fetch
//! a URL, crawl a site breadth-first, and (optionally, behind the `openai`
//! feature) ask a language model a structured-extraction question.
//!
//! ## Modules
//!
//! - [`traits`] - Core trait abstractions (`AI`, `Crawler`)
//! - [`types`] - `CrawlConfig`, `CrawledPage`, `PageRef`
//! - [`crawlers`] - Crawler implementations (HTTP, rate-limited, robots, Tavily, informed)
//! - [`security`] - SSRF protection, URL validation, credential redaction
//! - [`error`] - The three-tier error taxonomy (`SecurityError` / `CrawlError` / `ExtractionError`)
//! - [`testing`] - Mock implementations for testing

pub mod crawlers;
pub mod error;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

pub use error::{CrawlError, ExtractionError, SecurityError};
pub use traits::{ai::AI, crawler::Crawler};
pub use types::{
    config::CrawlConfig,
    page::{CachedPage, CrawledPage, PageRef},
};

pub use crawlers::{
    fetch_robots_txt, HttpCrawler, InformedCrawler, MockSearchService, QueryGenerator,
    RateLimitedCrawler, RobotsTxt, SearchService, TavilyCrawler, TavilySearchService,
    UrlValidator, ValidatedCrawler,
};

pub use testing::{MockAI, MockCrawler, TestScenario};

#[cfg(feature = "openai")]
pub use ai::OpenAI;

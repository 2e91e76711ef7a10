//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction library
//! without making real AI or network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{CrawlError, CrawlResult, Result};
use crate::traits::{ai::AI, crawler::Crawler};
use crate::types::{config::CrawlConfig, page::CrawledPage};

/// A mock AI implementation for testing.
///
/// Returns deterministic, configurable responses. Useful for testing
/// extraction logic without making real LLM calls.
#[derive(Default)]
pub struct MockAI {
    /// Predefined completions by (system, user) prompt pair
    completions: Arc<RwLock<HashMap<(String, String), String>>>,

    /// Predefined structured responses keyed by the system prompt
    structured: Arc<RwLock<HashMap<String, serde_json::Value>>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockAICall>>>,
}

/// Record of a call made to the mock AI.
#[derive(Debug, Clone)]
pub enum MockAICall {
    Complete { system: String, user: String },
    ExtractStructured { system: String, content_len: usize },
}

impl MockAI {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined completion for an exact (system, user) pair.
    pub fn with_completion(
        self,
        system: impl Into<String>,
        user: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.completions
            .write()
            .unwrap()
            .insert((system.into(), user.into()), response.into());
        self
    }

    /// Add a predefined structured response for a given system prompt.
    pub fn with_structured(self, system: impl Into<String>, response: serde_json::Value) -> Self {
        self.structured
            .write()
            .unwrap()
            .insert(system.into(), response);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockAICall> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl AI for MockAI {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls.write().unwrap().push(MockAICall::Complete {
            system: system.to_string(),
            user: user.to_string(),
        });

        Ok(self
            .completions
            .read()
            .unwrap()
            .get(&(system.to_string(), user.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn extract_structured(
        &self,
        system: &str,
        content: &str,
        _schema: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.calls
            .write()
            .unwrap()
            .push(MockAICall::ExtractStructured {
                system: system.to_string(),
                content_len: content.len(),
            });

        Ok(self
            .structured
            .read()
            .unwrap()
            .get(system)
            .cloned()
            .unwrap_or(serde_json::json!({})))
    }
}

/// A mock crawler for testing.
///
/// Returns predefined pages without making network requests.
#[derive(Default)]
pub struct MockCrawler {
    /// Predefined pages by URL
    pages: Arc<RwLock<HashMap<String, CrawledPage>>>,

    /// URLs that should fail
    fail_urls: Arc<RwLock<Vec<String>>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockCrawlerCall>>>,
}

/// Record of a call made to the mock crawler.
#[derive(Debug, Clone)]
pub enum MockCrawlerCall {
    Crawl { url: String, max_pages: usize },
    Fetch { url: String },
}

impl MockCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined page.
    pub fn with_page(self, page: CrawledPage) -> Self {
        self.pages.write().unwrap().insert(page.url.clone(), page);
        self
    }

    /// Add multiple predefined pages.
    pub fn with_pages(self, pages: impl IntoIterator<Item = CrawledPage>) -> Self {
        let mut store = self.pages.write().unwrap();
        for page in pages {
            store.insert(page.url.clone(), page);
        }
        drop(store);
        self
    }

    /// Mark a URL as failing.
    pub fn fail_url(self, url: impl Into<String>) -> Self {
        self.fail_urls.write().unwrap().push(url.into());
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCrawlerCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Crawler for MockCrawler {
    async fn crawl(&self, config: &CrawlConfig) -> CrawlResult<Vec<CrawledPage>> {
        self.calls.write().unwrap().push(MockCrawlerCall::Crawl {
            url: config.url.clone(),
            max_pages: config.max_pages,
        });

        if self.fail_urls.read().unwrap().contains(&config.url) {
            return Err(CrawlError::Http(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Mock connection refused",
            ))));
        }

        let pages: Vec<_> = self
            .pages
            .read()
            .unwrap()
            .values()
            .filter(|p| p.url.starts_with(&config.url))
            .take(config.max_pages)
            .cloned()
            .collect();

        Ok(pages)
    }

    async fn fetch(&self, url: &str) -> CrawlResult<CrawledPage> {
        self.calls
            .write()
            .unwrap()
            .push(MockCrawlerCall::Fetch { url: url.to_string() });

        if self.fail_urls.read().unwrap().contains(&url.to_string()) {
            return Err(CrawlError::Http(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Mock connection refused",
            ))));
        }

        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| CrawlError::InvalidUrl { url: url.to_string() })
    }
}

/// Builder for creating test scenarios.
pub struct TestScenario {
    ai: MockAI,
    crawler: MockCrawler,
}

impl TestScenario {
    pub fn new() -> Self {
        Self {
            ai: MockAI::new(),
            crawler: MockCrawler::new(),
        }
    }

    /// Add a site with pages.
    pub fn with_site(mut self, site_url: &str, pages: Vec<(&str, &str)>) -> Self {
        for (path, content) in pages {
            let url = format!("{}{}", site_url, path);
            let page = CrawledPage::new(&url, content).with_title(path);
            self.crawler = self.crawler.with_page(page);
        }
        self
    }

    pub fn ai(self) -> MockAI {
        self.ai
    }

    pub fn crawler(self) -> MockCrawler {
        self.crawler
    }

    pub fn build(self) -> (MockAI, MockCrawler) {
        (self.ai, self.crawler)
    }
}

impl Default for TestScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_ai_complete() {
        let ai = MockAI::new().with_completion("sys", "hello", "world");

        let result = ai.complete("sys", "hello").await.unwrap();
        assert_eq!(result, "world");

        let calls = ai.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], MockAICall::Complete { .. }));
    }

    #[tokio::test]
    async fn test_mock_ai_structured() {
        let ai = MockAI::new().with_structured("sys", serde_json::json!({"email": "a@b.com"}));
        let result = ai
            .extract_structured("sys", "some content", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["email"], "a@b.com");
    }

    #[tokio::test]
    async fn test_mock_crawler_fetch() {
        let crawler = MockCrawler::new()
            .with_page(CrawledPage::new("https://example.com/page1", "Content 1"))
            .with_page(CrawledPage::new("https://example.com/page2", "Content 2"));

        let page = crawler.fetch("https://example.com/page1").await.unwrap();
        assert_eq!(page.content, "Content 1");

        let result = crawler.fetch("https://example.com/missing").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_crawler_fail_url() {
        let crawler = MockCrawler::new()
            .with_page(CrawledPage::new("https://example.com/page1", "Content"))
            .fail_url("https://fail.com");

        let result = crawler.fetch("https://fail.com").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_test_scenario() {
        let (_ai, crawler) = TestScenario::new()
            .with_site(
                "https://example.org",
                vec![("/", "Home page content"), ("/contact", "Contact info")],
            )
            .build();

        let page = crawler.fetch("https://example.org/contact").await.unwrap();
        assert!(page.content.contains("Contact"));
    }
}

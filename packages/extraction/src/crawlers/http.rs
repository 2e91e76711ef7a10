//! Plain HTTP crawler: BFS link-following with no JavaScript rendering.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::error::{CrawlError, CrawlResult};
use crate::traits::crawler::Crawler;
use crate::types::{config::CrawlConfig, page::CrawledPage};

/// Direct HTTP crawler. Fetches pages with `reqwest` and extracts links
/// with a small regex pass rather than a full HTML parser, following the
/// same "good enough, don't pull in a DOM crate" tradeoff the rest of this
/// stack makes for markdown conversion.
pub struct HttpCrawler {
    client: Client,
    user_agent: String,
}

impl HttpCrawler {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
            user_agent: "Mozilla/5.0 (compatible; MiningBot/1.0)".to_string(),
        }
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    fn extract_links(&self, base: &url::Url, html: &str) -> Vec<url::Url> {
        static HREF_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        let re = HREF_RE.get_or_init(|| {
            regex::Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("valid regex")
        });

        let mut links = Vec::new();
        for cap in re.captures_iter(html) {
            let href = &cap[1];
            if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
                continue;
            }
            if let Ok(joined) = base.join(href) {
                links.push(joined);
            }
        }
        links
    }
}

impl Default for HttpCrawler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn fetch(&self, url: &str) -> CrawlResult<CrawledPage> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| CrawlError::Http(Box::new(e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CrawlError::RateLimitExceeded);
        }

        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::Http(Box::new(e)))?;

        let mut page = CrawledPage::new(final_url, body);
        page.status_code = status.as_u16();
        page.headers = headers;
        Ok(page)
    }

    async fn crawl(&self, config: &CrawlConfig) -> CrawlResult<Vec<CrawledPage>> {
        let start = url::Url::parse(&config.url)
            .map_err(|_| CrawlError::InvalidUrl { url: config.url.clone() })?;
        let start_host = start.host_str().map(|h| h.to_string());

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(url::Url, usize)> = VecDeque::new();
        queue.push_back((start, 0));

        let mut pages = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if pages.len() >= config.max_pages {
                break;
            }
            let key = current.as_str().to_string();
            if visited.contains(&key) {
                continue;
            }
            visited.insert(key);

            let page = match self.fetch(current.as_str()).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(url = %current, error = %e, "crawl fetch failed");
                    continue;
                }
            };

            if depth < config.max_depth {
                if let Ok(page_url) = url::Url::parse(&page.url) {
                    for link in self.extract_links(&page_url, &page.content) {
                        if let Some(host) = &start_host {
                            let same_site = link.host_str() == Some(host.as_str())
                                || (config.follow_subdomains
                                    && link
                                        .host_str()
                                        .map(|h| h.ends_with(host.as_str()))
                                        .unwrap_or(false));
                            if !same_site {
                                continue;
                            }
                        }
                        if !visited.contains(link.as_str()) {
                            queue.push_back((link, depth + 1));
                        }
                    }
                }
            }

            pages.push(page);

            if config.rate_limit_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.rate_limit_ms)).await;
            }
        }

        Ok(pages)
    }
}

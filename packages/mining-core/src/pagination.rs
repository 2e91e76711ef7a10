//! PaginationHandler (spec §4.5): drives a non-self-paginating miner
//! across successive pages, stopping on a content-repeat or a run of
//! empty pages rather than walking off the end of a site forever.
//! Self-paginating miners (`Capabilities::own_pagination`) never reach
//! this handler — the execution plan collapses them to one step
//! (`execution_plan.rs`) precisely to keep that guarantee structural.

use sha2::{Digest, Sha256};

use crate::adapter::ExtractorAdapter;
use crate::error::{MiningError, Result};
use crate::extractor::{Capabilities, MiningContext};
use crate::router::Decision;
use crate::scout::PaginationType;

/// Used when a `Report` doesn't name an explicit page count and the miner
/// doesn't self-paginate — walks at most this many pages before giving up
/// (spec §9 Open Question, resolved as an intentional safety fallback
/// rather than unbounded crawling).
pub const DEFAULT_MAX_PAGES: u32 = 5;

/// Two consecutive pages whose content hash matches end the crawl — the
/// site looped back or started serving the same "no more results" page.
const DUPLICATE_STOP_THRESHOLD: u32 = 2;
/// Three consecutive pages with zero contacts end the crawl even when
/// content keeps changing (e.g. a footer timestamp defeats the hash).
const EMPTY_STOP_THRESHOLD: u32 = 3;
/// Default politeness delay between page fetches.
pub const DEFAULT_PAGE_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

fn content_hash(contacts: &[crate::domain::UnifiedContact]) -> String {
    let mut hasher = Sha256::new();
    for c in contacts {
        hasher.update(c.email.as_deref().unwrap_or(""));
        hasher.update(c.contact_name.as_deref().unwrap_or(""));
    }
    hex::encode(hasher.finalize())
}

/// Build the URL for page `n` (1-indexed) of a numbered-pagination site.
/// Appends/overwrites a `page` query parameter; callers needing a
/// site-specific parameter name should pre-resolve it into the decision's
/// hints before calling `mine_all_pages` (not yet wired — numbered
/// pagination is the only scheme this handler paginates itself today;
/// next/load-more/infinite schemes are left to miners with their own
/// pagination support).
fn page_url(base: &str, page: u32) -> Result<String> {
    let mut url = url::Url::parse(base).map_err(|e| MiningError::Config(e.to_string()))?;
    url.query_pairs_mut().append_pair("page", &page.to_string());
    Ok(url.to_string())
}

pub struct PaginationHandler {
    max_pages: u32,
    page_delay: std::time::Duration,
}

impl PaginationHandler {
    pub fn new(max_pages: Option<u32>) -> Self {
        Self {
            max_pages: max_pages.unwrap_or(DEFAULT_MAX_PAGES),
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Clamp a site's detected page count to the safety ceiling, falling
    /// back to `DEFAULT_MAX_PAGES` when the site doesn't expose one.
    pub fn total_pages(&self, detected: Option<u32>) -> u32 {
        detected.map(|d| d.min(self.max_pages)).unwrap_or(self.max_pages)
    }

    /// Whether this handler should paginate at all for the given
    /// decision/capabilities — guardrail against double-paginating a
    /// self-paginating miner (spec §4.5).
    pub fn should_paginate(&self, decision: &Decision, capabilities: &Capabilities) -> bool {
        !capabilities.own_pagination && decision.pagination_type != PaginationType::None
    }

    /// Walk pages 1..=total_pages through `adapter`, stopping early on a
    /// content-hash repeat or a run of empty pages. Returns every page's
    /// contacts concatenated (deduplication is the aggregator's job, not
    /// this handler's).
    pub async fn mine_all_pages(
        &self,
        adapter: &ExtractorAdapter<'_>,
        base_ctx: &MiningContext,
        detected_pages: Option<u32>,
    ) -> Result<Vec<crate::domain::UnifiedContact>> {
        let total = self.total_pages(detected_pages);
        let mut all_contacts = Vec::new();
        let mut last_hash: Option<String> = None;
        let mut duplicate_run = 0u32;
        let mut empty_run = 0u32;

        for page in 1..=total {
            let url = page_url(&base_ctx.url, page)?;
            let ctx = MiningContext {
                job_id: base_ctx.job_id,
                tenant_id: base_ctx.tenant_id.clone(),
                url,
                config: base_ctx.config.clone(),
            };

            let result = adapter.mine(&ctx).await;
            if !result.status.is_ok() && page > 1 {
                break;
            }

            if result.contacts.is_empty() {
                empty_run += 1;
                if empty_run >= EMPTY_STOP_THRESHOLD {
                    tracing::debug!(page, "stopping pagination: empty-page run");
                    break;
                }
            } else {
                empty_run = 0;
            }

            let hash = content_hash(&result.contacts);
            if last_hash.as_deref() == Some(hash.as_str()) {
                duplicate_run += 1;
                if duplicate_run >= DUPLICATE_STOP_THRESHOLD {
                    tracing::debug!(page, "stopping pagination: duplicate content");
                    break;
                }
            } else {
                duplicate_run = 0;
            }
            last_hash = Some(hash);

            all_contacts.extend(result.contacts);

            if page < total {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        Ok(all_contacts)
    }
}

impl Default for PaginationHandler {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_falls_back_to_default_when_undetected() {
        let handler = PaginationHandler::new(None);
        assert_eq!(handler.total_pages(None), DEFAULT_MAX_PAGES);
    }

    #[test]
    fn total_pages_clamps_detected_count_to_ceiling() {
        let handler = PaginationHandler::new(Some(3));
        assert_eq!(handler.total_pages(Some(50)), 3);
        assert_eq!(handler.total_pages(Some(1)), 1);
    }

    #[test]
    fn page_url_appends_page_param() {
        let url = page_url("https://example.com/team", 2).unwrap();
        assert!(url.contains("page=2"));
    }

    #[test]
    fn should_paginate_skips_self_paginating_miners() {
        let handler = PaginationHandler::default();
        let decision = Decision {
            primary_miner: "playwrightMiner".to_string(),
            use_cache: true,
            fallback_chain: vec![],
            hints: serde_json::Value::Null,
            pagination_type: PaginationType::Numbered,
            reason: "test".to_string(),
        };
        let caps = Capabilities {
            use_cache: true,
            supports_pagination: true,
            own_pagination: true,
            cost_per_request: 0.001,
            default_confidence: 50.0,
        };
        assert!(!handler.should_paginate(&decision, &caps));
    }
}

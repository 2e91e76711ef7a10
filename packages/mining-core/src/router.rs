//! SmartRouter (spec §4.2): turns a `Scout` `Report` into a `Decision` —
//! the primary miner to try plus an ordered fallback chain — by priority
//! rather than by hardcoding a single miner per page type. Capabilities
//! are data (`extractor::Capabilities`), so the router never downcasts a
//! miner to ask what it can do.

use serde_json::Value;

use crate::scout::{PaginationType, Report};

/// Lower number = tried first. Mirrors the teacher's preference for cheap,
/// deterministic miners before anything that burns an AI-extraction budget.
const MINER_PRIORITY: &[(&str, u8)] = &[
    ("httpBasicMiner", 1),
    ("playwrightTableMiner", 2),
    ("playwrightMiner", 3),
    ("aiMiner", 4),
    ("websiteScraperMiner", 5),
    ("documentMiner", 6),
];

fn miner_priority(name: &str) -> u8 {
    MINER_PRIORITY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, p)| *p)
        .unwrap_or(u8::MAX)
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub primary_miner: String,
    pub use_cache: bool,
    /// Remaining miners to try, in priority order, if `primary_miner` and
    /// everything before it in the chain comes back blocked/empty/errored.
    pub fallback_chain: Vec<String>,
    pub hints: Value,
    pub pagination_type: PaginationType,
    pub reason: String,
}

#[derive(Default)]
pub struct SmartRouter;

impl SmartRouter {
    pub fn new() -> Self {
        Self
    }

    /// Build a routing decision from a scout report. The fallback chain is
    /// every known miner with lower priority (higher rank number) than the
    /// primary, in priority order — not just "the next one" — so a caller
    /// that exhausts several in a row can keep walking the chain.
    pub fn route(&self, report: &Report) -> Decision {
        let primary = report.recommendation.miner.clone();
        let primary_priority = miner_priority(&primary);

        let mut fallback_chain: Vec<(String, u8)> = MINER_PRIORITY
            .iter()
            .filter(|(name, priority)| *name != primary && *priority > primary_priority)
            .map(|(name, priority)| (name.to_string(), *priority))
            .collect();
        fallback_chain.sort_by_key(|(_, p)| *p);

        Decision {
            primary_miner: primary,
            use_cache: report.recommendation.use_cache,
            fallback_chain: fallback_chain.into_iter().map(|(n, _)| n).collect(),
            hints: Value::Null,
            pagination_type: report.pagination_type,
            reason: report.recommendation.reason.clone(),
        }
    }

    /// The next miner to try that isn't already in `exhausted`, or `None`
    /// once the chain runs dry.
    pub fn get_next_fallback(&self, decision: &Decision, exhausted: &[String]) -> Option<String> {
        decision
            .fallback_chain
            .iter()
            .find(|m| !exhausted.iter().any(|e| e == *m))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scout::{PageType, Recommendation};

    fn report(miner: &str) -> Report {
        Report {
            page_type: PageType::Unknown,
            pagination_type: PaginationType::None,
            email_count: 0,
            detail_link_count: 0,
            has_table: false,
            has_dynamic_indicators: false,
            recommendation: Recommendation {
                miner: miner.to_string(),
                use_cache: true,
                reason: "test".to_string(),
                own_pagination: false,
            },
            analysis_time_ms: 0,
        }
    }

    #[test]
    fn fallback_chain_excludes_primary_and_higher_priority_miners() {
        let router = SmartRouter::new();
        let decision = router.route(&report("playwrightTableMiner"));
        assert!(!decision.fallback_chain.contains(&"playwrightTableMiner".to_string()));
        assert!(!decision.fallback_chain.contains(&"httpBasicMiner".to_string()));
        assert_eq!(decision.fallback_chain.first().unwrap(), "playwrightMiner");
    }

    #[test]
    fn get_next_fallback_skips_exhausted_miners() {
        let router = SmartRouter::new();
        let decision = router.route(&report("httpBasicMiner"));
        let exhausted = vec!["playwrightTableMiner".to_string(), "playwrightMiner".to_string()];
        assert_eq!(router.get_next_fallback(&decision, &exhausted), Some("aiMiner".to_string()));
    }

    #[test]
    fn unknown_primary_yields_empty_chain() {
        let router = SmartRouter::new();
        let decision = router.route(&report("customMiner"));
        assert!(decision.fallback_chain.is_empty());
    }
}

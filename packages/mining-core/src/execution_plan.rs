//! ExecutionPlanBuilder (spec §4.3): turns a `SmartRouter` `Decision` into
//! an ordered list of `(miner, normalizer, reason)` steps the orchestrator
//! walks until one yields `Ok` contacts. Self-paginating extractors
//! (`Capabilities::own_pagination`) collapse to a single step — wrapping
//! them in a fallback chain would duplicate the pagination they already
//! do internally.

use crate::extractor::Capabilities;
use crate::router::Decision;

/// The normalizer variant a step should run its raw output through. Only
/// one exists today (`Standard`); kept as an enum because the router
/// already distinguishes document-viewer pages, whose raw text needs the
/// `DocumentTextNormalizer`'s chunking instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerKind {
    Standard,
    Document,
}

#[derive(Debug, Clone)]
pub struct ExecutionStep {
    pub miner: String,
    pub normalizer: NormalizerKind,
    pub reason: String,
}

#[derive(Default)]
pub struct ExecutionPlanBuilder;

impl ExecutionPlanBuilder {
    pub fn new() -> Self {
        Self
    }

    /// `capabilities_of` looks up a miner's `Capabilities` by name; the
    /// builder never owns a registry of extractors, matching the "pass an
    /// explicit dependency" style used elsewhere (spec §9).
    pub fn build(
        &self,
        decision: &Decision,
        capabilities_of: impl Fn(&str) -> Option<Capabilities>,
    ) -> Vec<ExecutionStep> {
        let normalizer_for = |miner: &str| {
            if miner == "documentMiner" {
                NormalizerKind::Document
            } else {
                NormalizerKind::Standard
            }
        };

        let primary_step = ExecutionStep {
            miner: decision.primary_miner.clone(),
            normalizer: normalizer_for(&decision.primary_miner),
            reason: decision.reason.clone(),
        };

        let primary_self_paginates = capabilities_of(&decision.primary_miner)
            .map(|c| c.own_pagination)
            .unwrap_or(false);

        if primary_self_paginates {
            return vec![primary_step];
        }

        let mut steps = vec![primary_step];
        for miner in &decision.fallback_chain {
            steps.push(ExecutionStep {
                miner: miner.clone(),
                normalizer: normalizer_for(miner),
                reason: format!("fallback after {} exhausted", decision.primary_miner),
            });
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scout::{PageType, PaginationType, Recommendation, Report};
    use crate::router::SmartRouter;

    fn decision(miner: &str) -> Decision {
        SmartRouter::new().route(&Report {
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
        })
    }

    fn caps(own_pagination: bool) -> Capabilities {
        Capabilities {
            use_cache: true,
            supports_pagination: true,
            own_pagination,
            cost_per_request: 0.0,
            default_confidence: 50.0,
        }
    }

    #[test]
    fn self_paginating_primary_yields_single_step() {
        let builder = ExecutionPlanBuilder::new();
        let d = decision("httpBasicMiner");
        let steps = builder.build(&d, |_| Some(caps(true)));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].miner, "httpBasicMiner");
    }

    #[test]
    fn non_self_paginating_primary_gets_fallback_chain() {
        let builder = ExecutionPlanBuilder::new();
        let d = decision("httpBasicMiner");
        let steps = builder.build(&d, |_| Some(caps(false)));
        assert!(steps.len() > 1);
        assert_eq!(steps[0].miner, "httpBasicMiner");
    }

    #[test]
    fn document_miner_uses_document_normalizer() {
        let builder = ExecutionPlanBuilder::new();
        let d = decision("documentMiner");
        let steps = builder.build(&d, |_| Some(caps(true)));
        assert_eq!(steps[0].normalizer, NormalizerKind::Document);
    }
}

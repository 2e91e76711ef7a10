//! ExtractorAdapter (spec §4.2, §9): decorates a `dyn Extractor` with cost
//! accounting, circuit-breaker gating, and evidence-driven confidence/
//! hallucination filtering — none of which the extractor itself knows
//! about. Grounded on `extraction::traits::crawler::ValidatedCrawler`'s
//! "wrap, don't modify" decorator pattern.

use url::Url;

use crate::circuit_breaker::CircuitBreaker;
use crate::cost_tracker::{CostTracker, Operation};
use crate::error::ExtractorStatus;
use crate::extractor::{Extractor, MiningContext, MinerResult};
use crate::hallucination;

fn operation_for_miner(name: &str) -> Operation {
    match name {
        "aiMiner" => Operation::AiExtraction,
        "playwrightMiner" | "playwrightTableMiner" => Operation::BrowserPage,
        "websiteScraperMiner" | "documentMiner" => Operation::DeepCrawlPage,
        _ => Operation::Http,
    }
}

fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

pub struct ExtractorAdapter<'a> {
    inner: &'a dyn Extractor,
    cost_tracker: &'a CostTracker,
    circuit_breaker: &'a CircuitBreaker,
}

impl<'a> ExtractorAdapter<'a> {
    pub fn new(
        inner: &'a dyn Extractor,
        cost_tracker: &'a CostTracker,
        circuit_breaker: &'a CircuitBreaker,
    ) -> Self {
        Self { inner, cost_tracker, circuit_breaker }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Run the wrapped extractor with budget and circuit-breaker checks up
    /// front, then adjust confidence and reject hallucination-suspect
    /// contacts in the result before handing it back — the extractor never
    /// sees either concern.
    pub async fn mine(&self, ctx: &MiningContext) -> MinerResult {
        let domain = domain_of(&ctx.url);

        let check = self.circuit_breaker.check(&domain);
        if !check.allowed {
            return MinerResult::empty(
                self.inner.name(),
                ExtractorStatus::Blocked {
                    reason: format!("circuit open for {domain}"),
                },
            );
        }

        let op = operation_for_miner(self.inner.name());
        if let Err(denied) = self.cost_tracker.can_proceed(&ctx.tenant_id, ctx.job_id, op, &ctx.url) {
            return MinerResult::empty(self.inner.name(), ExtractorStatus::CostLimit { reason: denied.0 });
        }

        let mut result = self.inner.mine(ctx).await;
        self.cost_tracker.record_cost(&ctx.tenant_id, ctx.job_id, op, &ctx.url);

        match &result.status {
            ExtractorStatus::Ok => self.circuit_breaker.record_success(&domain),
            ExtractorStatus::Blocked { reason } | ExtractorStatus::Error { reason } => {
                self.circuit_breaker.record_failure(&domain, reason.clone());
            }
            _ => {}
        }

        result.contacts = result
            .contacts
            .into_iter()
            .filter_map(|mut contact| {
                let ceiling = contact.confidence_ceiling();
                contact.confidence = hallucination::adjust_confidence(&contact).min(ceiling);
                let verdict = hallucination::detect_hallucination(&contact);
                if verdict.rejected {
                    tracing::debug!(
                        miner = self.inner.name(),
                        score = verdict.score,
                        reasons = ?verdict.reasons,
                        "rejected contact as hallucination-suspect"
                    );
                    None
                } else {
                    Some(contact)
                }
            })
            .collect();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitConfig, CostConfig};
    use crate::domain::{ContactSource, EmailType};
    use crate::extractor::Capabilities;
    use crate::ids::JobId;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StubExtractor {
        status: ExtractorStatus,
        confidence: f32,
        phone: Option<String>,
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        fn name(&self) -> &str {
            "httpBasicMiner"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                use_cache: true,
                supports_pagination: false,
                own_pagination: false,
                cost_per_request: 0.0001,
                default_confidence: 50.0,
            }
        }

        async fn mine(&self, ctx: &MiningContext) -> MinerResult {
            let mut result = MinerResult::empty(self.name(), self.status.clone());
            result.contacts.push(crate::domain::UnifiedContact {
                email: Some("a@acme.com".to_string()),
                additional_emails: vec![],
                contact_name: Some("Ada Lovelace".to_string()),
                job_title: None,
                company_name: None,
                website: None,
                country: None,
                city: None,
                address: None,
                phone: self.phone.clone(),
                source: ContactSource::TableExtractor,
                source_url: ctx.url.clone(),
                confidence: self.confidence,
                evidence: vec![],
                email_type: EmailType::Unknown,
                extracted_at: Utc::now(),
            });
            result
        }
    }

    fn ctx() -> MiningContext {
        MiningContext {
            job_id: JobId::new(),
            tenant_id: "tenant-1".to_string(),
            url: "https://acme.com/team".to_string(),
            config: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn passes_through_clean_contacts() {
        let cost = CostTracker::new(CostConfig::default());
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        let extractor = StubExtractor { status: ExtractorStatus::Ok, confidence: 60.0, phone: None };
        let adapter = ExtractorAdapter::new(&extractor, &cost, &circuit);
        let result = adapter.mine(&ctx()).await;
        assert_eq!(result.contacts.len(), 1);
    }

    #[tokio::test]
    async fn filters_hallucination_suspect_contacts() {
        let cost = CostTracker::new(CostConfig::default());
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        let extractor = StubExtractor {
            status: ExtractorStatus::Ok,
            confidence: 60.0,
            phone: Some("11111".to_string()),
        };
        let adapter = ExtractorAdapter::new(&extractor, &cost, &circuit);
        let result = adapter.mine(&ctx()).await;
        assert!(result.contacts.is_empty());
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_before_invoking_extractor() {
        let cost = CostTracker::new(CostConfig::default());
        let circuit = CircuitBreaker::new(CircuitConfig { failure_threshold: 1, ..CircuitConfig::default() });
        circuit.record_failure("acme.com", "boom");
        let extractor = StubExtractor { status: ExtractorStatus::Ok, confidence: 60.0, phone: None };
        let adapter = ExtractorAdapter::new(&extractor, &cost, &circuit);
        let result = adapter.mine(&ctx()).await;
        assert!(matches!(result.status, ExtractorStatus::Blocked { .. }));
    }
}

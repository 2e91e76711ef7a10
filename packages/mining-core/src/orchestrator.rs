//! FlowOrchestrator (spec §4.4, §9): drives a job through Flow 1 (single-page
//! triage + primary extraction) and, when warranted, Flow 2 (deep crawl of
//! the website URLs Flow 1 turned up). State transitions are modeled as a
//! single `seesaw::Machine` (`JobMachine`) per the design note "model as a
//! single state machine `JobState`" — only the pure transition table lives
//! in the machine; the actual I/O (extractor calls, persistence, TTL store)
//! is driven by `FlowOrchestrator` itself, which owns its dependencies
//! explicitly rather than through a process-global singleton (spec §9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use seesaw::{Command, ExecutionMode, Machine};
use tokio::sync::Semaphore;

use crate::adapter::ExtractorAdapter;
use crate::aggregator;
use crate::circuit_breaker::CircuitBreaker;
use crate::cost_tracker::CostTracker;
use crate::domain::{
    AffiliationSourceType, ContactSource, Job, JobStats, JobStatus, ResultRow, ResultRowStatus,
    TempFlow1Payload, UnifiedContact, VerificationStatus,
};
use crate::error::{ExtractorStatus, Result};
use crate::event_bus::{BusMessage, EventBus};
use crate::execution_plan::ExecutionPlanBuilder;
use crate::extractor::{Extractor, MiningContext};
use crate::ids::{AffiliationId, JobId, PersonId};
use crate::pagination::PaginationHandler;
use crate::persistence::MiningStore;
use crate::router::SmartRouter;
use crate::ttl_store::TtlStore;

/// TTL a Flow-1 payload survives in the store waiting for Flow 2 to pick
/// it up (spec §3 `TempFlow1Payload`: "default TTL 10 minutes").
const FLOW1_PAYLOAD_TTL: std::time::Duration = std::time::Duration::from_secs(10 * 60);

fn flow1_payload_key(job_id: JobId) -> String {
    format!("flow1_payload:{job_id}")
}

/// Maximum number of Flow-2 jobs (deep crawls) running at once, across the
/// whole process. Flow 2 fans out to many pages per job; an unbounded
/// number of concurrent jobs would let one tenant starve the rest of the
/// cost/circuit-breaker budgets, which are themselves process-wide.
const MAX_CONCURRENT_FLOW2: usize = 2;

/// Flow 1 is considered high-yield enough to warrant Flow 2 when it found
/// fewer than this many validated contacts and surfaced candidate website
/// URLs to chase down (spec §4.4 rule "website_urls present & contacts<10").
const FLOW2_MIN_CONTACT_THRESHOLD: usize = 10;

/// Above this many contacts, Flow 2's per-website deep crawl risks
/// out-of-memory growth — the decision table either skips Flow 2 outright
/// or caps it (spec §4.4, §8 scenario 4).
const FLOW2_OOM_CONTACT_THRESHOLD: usize = 500;
/// At or above this enrichment rate, a >500-contact job is judged
/// well-enough enriched already that deep-crawling is not worth the OOM risk.
const FLOW2_OOM_ENRICHMENT_THRESHOLD: f32 = 0.50;
/// Website cap applied to the capped (>500 contacts, <50% enriched) run.
const FLOW2_OOM_MAX_WEBSITES: usize = 50;
/// Below this enrichment rate Flow 2 always runs, regardless of contact
/// count, because the job is starved for detail pages worth chasing.
const FLOW2_LOW_ENRICHMENT_THRESHOLD: f32 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Flow1Running,
    Flow1Complete,
    Flow2Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub enum JobEvent {
    Flow1Started,
    Flow1Completed {
        contact_count: usize,
        website_url_count: usize,
        enrichment_rate: f32,
        flow2_disabled: bool,
    },
    Flow2Started,
    Flow2Completed,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub enum JobCommand {
    RunFlow2 { max_websites: Option<usize>, reason: String },
    MarkCompleted { flow2_skip_reason: Option<String> },
    MarkFailed { reason: String },
}

impl Command for JobCommand {
    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Inline
    }
}

/// Flow-2 go/no-go verdict, decided independently of job phase so it can be
/// unit-tested as a pure function of Flow 1's output (spec §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum Flow2Decision {
    Skip { reason: String },
    Run { max_websites: Option<usize>, reason: String },
}

/// The ordered decision table from spec §4.4: first matching rule wins.
pub fn decide_flow2(
    contact_count: usize,
    website_url_count: usize,
    enrichment_rate: f32,
    flow2_disabled: bool,
) -> Flow2Decision {
    if flow2_disabled {
        return Flow2Decision::Skip { reason: "flow2 disabled in job config".to_string() };
    }
    if contact_count > FLOW2_OOM_CONTACT_THRESHOLD && enrichment_rate >= FLOW2_OOM_ENRICHMENT_THRESHOLD {
        return Flow2Decision::Skip {
            reason: format!(
                "oom protection: {contact_count} contacts already {:.0}% enriched",
                enrichment_rate * 100.0
            ),
        };
    }
    if contact_count > FLOW2_OOM_CONTACT_THRESHOLD {
        return Flow2Decision::Run {
            max_websites: Some(FLOW2_OOM_MAX_WEBSITES),
            reason: format!(
                "oom protection: {contact_count} contacts, capping deep crawl to {FLOW2_OOM_MAX_WEBSITES} websites at concurrency 1"
            ),
        };
    }
    if enrichment_rate < FLOW2_LOW_ENRICHMENT_THRESHOLD {
        return Flow2Decision::Run {
            max_websites: None,
            reason: format!("enrichment rate {enrichment_rate:.2} below {FLOW2_LOW_ENRICHMENT_THRESHOLD:.2} threshold"),
        };
    }
    if website_url_count > 0 && contact_count < FLOW2_MIN_CONTACT_THRESHOLD {
        return Flow2Decision::Run {
            max_websites: None,
            reason: format!("only {contact_count} contacts found, {website_url_count} website urls to chase"),
        };
    }
    Flow2Decision::Skip { reason: "no flow2 criteria met".to_string() }
}

/// Per-job pure state machine (spec §9). `decide` never touches the
/// network or the database — `FlowOrchestrator` interprets the emitted
/// `JobCommand` and performs the actual work.
pub struct JobMachine {
    pub phase: JobPhase,
}

impl JobMachine {
    pub fn new() -> Self {
        Self { phase: JobPhase::Pending }
    }
}

impl Default for JobMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for JobMachine {
    type Event = JobEvent;
    type Command = JobCommand;

    fn decide(&mut self, event: &JobEvent) -> Option<JobCommand> {
        match event {
            JobEvent::Flow1Started => {
                self.phase = JobPhase::Flow1Running;
                None
            }
            JobEvent::Flow1Completed { contact_count, website_url_count, enrichment_rate, flow2_disabled } => {
                self.phase = JobPhase::Flow1Complete;
                match decide_flow2(*contact_count, *website_url_count, *enrichment_rate, *flow2_disabled) {
                    Flow2Decision::Run { max_websites, reason } => Some(JobCommand::RunFlow2 { max_websites, reason }),
                    Flow2Decision::Skip { reason } => Some(JobCommand::MarkCompleted { flow2_skip_reason: Some(reason) }),
                }
            }
            JobEvent::Flow2Started => {
                self.phase = JobPhase::Flow2Running;
                None
            }
            JobEvent::Flow2Completed => {
                self.phase = JobPhase::Completed;
                Some(JobCommand::MarkCompleted { flow2_skip_reason: None })
            }
            JobEvent::Failed { reason } => {
                self.phase = JobPhase::Failed;
                Some(JobCommand::MarkFailed { reason: reason.clone() })
            }
        }
    }
}

pub struct FlowOrchestrator {
    store: Arc<MiningStore>,
    ttl_store: Arc<dyn TtlStore>,
    cost_tracker: Arc<CostTracker>,
    circuit_breaker: Arc<CircuitBreaker>,
    event_bus: Arc<EventBus>,
    extractors: HashMap<String, Arc<dyn Extractor>>,
    crawler: Arc<dyn extraction::Crawler>,
    flow2_limiter: Arc<Semaphore>,
    worker_id: String,
}

impl FlowOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<MiningStore>,
        ttl_store: Arc<dyn TtlStore>,
        cost_tracker: Arc<CostTracker>,
        circuit_breaker: Arc<CircuitBreaker>,
        event_bus: Arc<EventBus>,
        extractors: HashMap<String, Arc<dyn Extractor>>,
        crawler: Arc<dyn extraction::Crawler>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ttl_store,
            cost_tracker,
            circuit_breaker,
            event_bus,
            extractors,
            crawler,
            flow2_limiter: Arc::new(Semaphore::new(MAX_CONCURRENT_FLOW2)),
            worker_id: worker_id.into(),
        }
    }

    fn publish(&self, job_id: JobId, channel: &str, payload: serde_json::Value) {
        let _ = self.event_bus.publish(BusMessage::new(channel, job_id, payload));
    }

    /// Flow 1: triage the seed URL, run the recommended miner (paginating it
    /// when the triage calls for it), validate/filter, and decide whether
    /// the job is done or needs Flow 2.
    pub async fn run_flow1(&self, job: &Job) -> Result<()> {
        let mut machine = JobMachine::new();
        let _ = machine.decide(&JobEvent::Flow1Started);
        self.store.update_job_status(job.id, JobStatus::Running).await?;
        self.publish(job.id, "job.flow1.started", serde_json::json!({"job_id": job.id.0}));

        let started = Instant::now();
        if !self.extractors.contains_key("httpBasicMiner") {
            return self.fail(job, "no httpBasicMiner registered for page triage").await;
        }

        let report = crate::scout::analyze(self.crawler.as_ref(), &job.input_url, started).await;
        let router = SmartRouter::new();
        let decision = router.route(&report);

        let plan_builder = ExecutionPlanBuilder::new();
        let steps = plan_builder.build(&decision, |name| {
            self.extractors.get(name).map(|e| e.capabilities())
        });

        let ctx = MiningContext {
            job_id: job.id,
            tenant_id: job.tenant_id.clone(),
            url: job.input_url.clone(),
            config: job.config.clone(),
        };

        let pagination_handler = PaginationHandler::default();
        let mut contacts = Vec::new();
        let mut miner_stats = HashMap::new();
        let mut statuses: Vec<ExtractorStatus> = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let Some(extractor) = self.extractors.get(&step.miner) else { continue };
            let adapter = ExtractorAdapter::new(extractor.as_ref(), &self.cost_tracker, &self.circuit_breaker);

            // Only the primary step (i == 0) is ever paginated — fallback
            // and enrichment steps run against the seed page only (spec §4.5).
            let (step_contacts, status) = if i == 0
                && pagination_handler.should_paginate(&decision, &extractor.capabilities())
            {
                match pagination_handler.mine_all_pages(&adapter, &ctx, None).await {
                    Ok(found) if found.is_empty() => {
                        (found, ExtractorStatus::Empty { reason: "no contacts across paginated run".to_string() })
                    }
                    Ok(found) => (found, ExtractorStatus::Ok),
                    Err(err) => (Vec::new(), ExtractorStatus::from_mining_error(&err)),
                }
            } else {
                let result = adapter.mine(&ctx).await;
                (result.contacts, result.status)
            };

            miner_stats.insert(step.miner.clone(), serde_json::to_value(&status).unwrap_or_default());
            statuses.push(status.clone());
            if status.is_ok() && !step_contacts.is_empty() {
                contacts.extend(step_contacts);
                break;
            }
        }

        let website_urls = aggregator::extract_website_urls(&contacts);
        let summary = aggregator::summarize(&contacts);
        let flow2_disabled = job
            .config
            .get("flow2_disabled")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        // Block detection (spec §4.4 step 6, §7): no contacts and either an
        // extractor was explicitly blocked, or every extractor we tried failed.
        let block_detected = contacts.is_empty()
            && (statuses.iter().any(ExtractorStatus::is_blocked)
                || (!statuses.is_empty() && statuses.iter().all(|s| !s.is_ok())));

        let payload = TempFlow1Payload {
            job_id: job.id,
            contacts: contacts.clone(),
            website_urls: website_urls.clone(),
            miner_stats: miner_stats.clone(),
            enrichment_rate: summary.enrichment_rate,
            saved_at: chrono::Utc::now(),
        };
        let encoded = serde_json::to_vec(&payload)?;

        let mut stats = JobStats {
            contact_count: contacts.len(),
            emails_found: contacts.iter().filter(|c| c.email.is_some()).count(),
            enrichment_rate: summary.enrichment_rate,
            block_detected,
            errors: vec![format!("flow1 analysis took {}ms", started.elapsed().as_millis())],
            miner_stats,
            flow2_skip_reason: None,
        };

        // Spec §4.4 step 4 / §4.8 step 4: if the TTL store is unavailable,
        // fall back to a direct aggregate write (no Flow 2) instead of
        // failing the whole job over a transient cache outage.
        if let Err(err) = self.ttl_store.set(&flow1_payload_key(job.id), encoded, FLOW1_PAYLOAD_TTL).await {
            tracing::warn!(job_id = %job.id, %err, "ttl store unavailable, falling back to aggregate_simple");
            stats.flow2_skip_reason = Some("ttl store unavailable: aggregated directly, flow2 skipped".to_string());
            self.store.update_job_stats(job.id, &stats).await?;
            return self.finalize(job, contacts).await;
        }

        self.store.update_job_stats(job.id, &stats).await?;

        let command = machine.decide(&JobEvent::Flow1Completed {
            contact_count: contacts.len(),
            website_url_count: website_urls.len(),
            enrichment_rate: summary.enrichment_rate,
            flow2_disabled,
        });

        match command {
            Some(JobCommand::RunFlow2 { max_websites, reason }) => {
                self.publish(job.id, "job.flow1.completed", serde_json::json!({"next": "flow2", "reason": reason}));
                self.run_flow2(job, max_websites).await
            }
            Some(JobCommand::MarkCompleted { flow2_skip_reason }) => {
                if let Some(reason) = flow2_skip_reason {
                    stats.flow2_skip_reason = Some(reason);
                    self.store.update_job_stats(job.id, &stats).await?;
                }
                self.finalize(job, contacts).await
            }
            _ => self.finalize(job, contacts).await,
        }
    }

    /// Flow 2: pulls the Flow-1 payload back out of the TTL store and
    /// deep-crawls the website URLs it collected, merging everything
    /// through the same deterministic-merge rule the aggregator uses for
    /// paginated results within a single miner. `max_websites` caps the
    /// crawl under the OOM-protection rule of spec §4.4 (one URL at a time
    /// regardless, so that rule's "concurrency 1" already holds).
    pub async fn run_flow2(&self, job: &Job, max_websites: Option<usize>) -> Result<()> {
        let _permit = self.flow2_limiter.acquire().await.map_err(|_| {
            crate::error::MiningError::Fatal("flow2 semaphore closed".into())
        })?;

        self.publish(job.id, "job.flow2.started", serde_json::json!({"job_id": job.id.0}));

        let raw = self
            .ttl_store
            .get(&flow1_payload_key(job.id))
            .await?
            .ok_or(crate::error::MiningError::Flow1NotFound(job.id.0))?;
        let payload: crate::domain::TempFlow1Payload = serde_json::from_slice(&raw)?;

        let Some(deep_crawl) = self.extractors.get("websiteScraperMiner").cloned() else {
            return self.finalize(job, payload.contacts).await;
        };

        let urls: &[String] = match max_websites {
            Some(cap) if payload.website_urls.len() > cap => {
                tracing::warn!(job_id = %job.id, cap, total = payload.website_urls.len(), "capping flow2 website crawl");
                &payload.website_urls[..cap]
            }
            _ => &payload.website_urls,
        };

        let mut per_url_contacts = Vec::new();
        for url in urls {
            let ctx = MiningContext {
                job_id: job.id,
                tenant_id: job.tenant_id.clone(),
                url: url.clone(),
                config: job.config.clone(),
            };
            let adapter = ExtractorAdapter::new(deep_crawl.as_ref(), &self.cost_tracker, &self.circuit_breaker);
            let result = adapter.mine(&ctx).await;
            per_url_contacts.push(result.contacts);
        }
        per_url_contacts.push(payload.contacts);

        let merged = aggregator::deterministic_merge(per_url_contacts);
        self.publish(job.id, "job.flow2.completed", serde_json::json!({"contact_count": merged.len()}));
        self.finalize(job, merged).await
    }

    /// Validate, persist, and (when enabled) canonically aggregate the
    /// final contact set in one transaction, then mark the job completed.
    /// Spec §4.9: "single transaction per aggregate, roll back on
    /// exception" — an early `?` return drops `tx` without committing,
    /// which rolls back every write this aggregate made.
    async fn finalize(&self, job: &Job, contacts: Vec<UnifiedContact>) -> Result<()> {
        let mut tx = self.store.pool().begin().await?;

        for contact in contacts {
            let validated = crate::validator::validate(contact);
            if validated.rejected {
                continue;
            }
            let contact = validated.cleaned;

            let row = ResultRow {
                id: crate::ids::ResultRowId::new(),
                job_id: job.id,
                tenant_id: job.tenant_id.clone(),
                source_url: contact.source_url.clone(),
                company_name: contact.company_name.clone(),
                contact_name: contact.contact_name.clone(),
                job_title: contact.job_title.clone(),
                emails: contact
                    .email
                    .iter()
                    .cloned()
                    .chain(contact.additional_emails.iter().cloned())
                    .collect(),
                phone: contact.phone.clone(),
                country: contact.country.clone(),
                city: contact.city.clone(),
                address: contact.address.clone(),
                website: contact.website.clone(),
                confidence: contact.confidence.clamp(0.0, 100.0) as u8,
                status: ResultRowStatus::New,
                verification_status: VerificationStatus::Unverified,
                raw: serde_json::to_value(&contact).unwrap_or(serde_json::Value::Null),
                created_at: contact.extracted_at,
                updated_at: contact.extracted_at,
            };
            self.store.upsert_result_row_with(&mut *tx, &row).await?;

            if let Some(email) = &contact.email {
                self.aggregate_canonical_with(&mut tx, job, &contact, email).await?;
            }
        }

        tx.commit().await?;

        self.store.update_job_status(job.id, JobStatus::Completed).await?;
        self.publish(job.id, "job.completed", serde_json::json!({"job_id": job.id.0}));
        Ok(())
    }

    async fn aggregate_canonical_with(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job: &Job,
        contact: &UnifiedContact,
        email: &str,
    ) -> Result<()> {
        let person = self.store.upsert_person_with(&mut **tx, &job.tenant_id, email, None, None).await?;
        let affiliation = crate::domain::Affiliation {
            id: AffiliationId::new(),
            tenant_id: job.tenant_id.clone(),
            person_id: PersonId::from_uuid(person.id.0),
            company_name: contact.company_name.clone(),
            position: contact.job_title.clone(),
            country_code: contact.country.as_deref().and_then(crate::countries::to_iso2).map(|s| s.to_string()),
            city: contact.city.clone(),
            website: contact.website.clone(),
            phone: contact.phone.clone(),
            source_type: match contact.source {
                ContactSource::Manual => AffiliationSourceType::Manual,
                _ => AffiliationSourceType::Job,
            },
            source_ref: job.id.to_string(),
            confidence: contact.confidence,
            raw: serde_json::Value::Null,
        };
        self.store.upsert_affiliation_with(&mut **tx, &affiliation).await?;
        Ok(())
    }

    async fn fail(&self, job: &Job, reason: &str) -> Result<()> {
        let mut machine = JobMachine::new();
        let _ = machine.decide(&JobEvent::Failed { reason: reason.to_string() });
        self.store.update_job_status(job.id, JobStatus::Failed).await?;
        self.publish(job.id, "job.failed", serde_json::json!({"reason": reason}));
        tracing::warn!(job_id = %job.id, worker = %self.worker_id, reason, "mining job failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow1_completed(contact_count: usize, website_url_count: usize, enrichment_rate: f32) -> JobEvent {
        JobEvent::Flow1Completed { contact_count, website_url_count, enrichment_rate, flow2_disabled: false }
    }

    #[test]
    fn flow1_below_threshold_with_urls_triggers_flow2() {
        let mut machine = JobMachine::new();
        let cmd = machine.decide(&flow1_completed(1, 2, 0.8));
        assert!(matches!(cmd, Some(JobCommand::RunFlow2 { .. })));
        assert_eq!(machine.phase, JobPhase::Flow1Complete);
    }

    #[test]
    fn flow1_above_threshold_completes_directly() {
        let mut machine = JobMachine::new();
        let cmd = machine.decide(&flow1_completed(10, 5, 0.8));
        assert!(matches!(cmd, Some(JobCommand::MarkCompleted { .. })));
    }

    #[test]
    fn no_candidate_urls_skips_flow2_even_if_few_contacts() {
        let mut machine = JobMachine::new();
        let cmd = machine.decide(&flow1_completed(0, 0, 0.8));
        assert!(matches!(cmd, Some(JobCommand::MarkCompleted { .. })));
    }

    #[test]
    fn failure_transitions_to_failed_phase() {
        let mut machine = JobMachine::new();
        machine.decide(&JobEvent::Failed { reason: "boom".to_string() });
        assert_eq!(machine.phase, JobPhase::Failed);
    }

    #[test]
    fn flow2_disabled_in_config_always_skips() {
        let decision = decide_flow2(1, 5, 0.1, true);
        assert!(matches!(decision, Flow2Decision::Skip { .. }));
    }

    /// Spec §8 scenario 4: 700 contacts, 60% enrichment -> skip with an
    /// OOM/contact-count reason, no Flow 2.
    #[test]
    fn oom_protection_skips_flow2_when_well_enriched() {
        let decision = decide_flow2(700, 40, 0.60, false);
        match decision {
            Flow2Decision::Skip { reason } => {
                assert!(reason.contains("oom"), "reason should mention oom: {reason}");
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn oom_protection_caps_flow2_when_poorly_enriched() {
        let decision = decide_flow2(700, 80, 0.30, false);
        match decision {
            Flow2Decision::Run { max_websites, reason } => {
                assert_eq!(max_websites, Some(FLOW2_OOM_MAX_WEBSITES));
                assert!(reason.contains("oom"));
            }
            other => panic!("expected capped run, got {other:?}"),
        }
    }

    #[test]
    fn low_enrichment_always_runs_flow2_regardless_of_contact_count() {
        let decision = decide_flow2(200, 3, 0.10, false);
        assert!(matches!(decision, Flow2Decision::Run { max_websites: None, .. }));
    }

    #[test]
    fn few_contacts_with_website_urls_runs_uncapped_flow2() {
        let decision = decide_flow2(2, 4, 0.75, false);
        assert!(matches!(decision, Flow2Decision::Run { max_websites: None, .. }));
    }

    #[test]
    fn many_contacts_with_no_urls_skips_flow2() {
        let decision = decide_flow2(50, 0, 0.75, false);
        assert!(matches!(decision, Flow2Decision::Skip { .. }));
    }
}

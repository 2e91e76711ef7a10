//! CostTracker (spec §4.12): per-operation unit costs, per-URL/per-job/
//! per-tenant-monthly budgets, and per-URL retry counters. Process-scoped
//! and lock-free via `dashmap`, matching the "counters: in-process lock
//! or CAS" shared-resource policy in spec §5.

use chrono::{Datelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::CostConfig;
use crate::ids::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AiExtraction,
    BrowserPage,
    Http,
    DeepCrawlPage,
}

impl Operation {
    fn unit_cost(self, cfg: &CostConfig) -> f64 {
        match self {
            Operation::AiExtraction => cfg.ai_extraction_cost,
            Operation::BrowserPage => cfg.browser_page_cost,
            Operation::Http => cfg.http_cost,
            Operation::DeepCrawlPage => cfg.deep_crawl_page_cost,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct JobLedger {
    total: f64,
    per_url: std::collections::HashMap<String, f64>,
    per_operation: std::collections::HashMap<String, f64>,
    retries_per_url: std::collections::HashMap<String, u32>,
}

#[derive(Debug, Clone)]
struct TenantLedger {
    month: u32,
    year: i32,
    total: f64,
}

/// A `can_proceed` check failed; carries the human-readable reason the
/// caller surfaces as a `COST_LIMIT` extractor status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denied(pub String);

pub struct CostTracker {
    config: CostConfig,
    jobs: DashMap<JobId, JobLedger>,
    tenants: DashMap<String, TenantLedger>,
}

impl CostTracker {
    pub fn new(config: CostConfig) -> Self {
        Self {
            config,
            jobs: DashMap::new(),
            tenants: DashMap::new(),
        }
    }

    /// Whether an operation against `url` for `job_id` may proceed, given
    /// budgets tracked so far. Returns `Ok(())` if allowed, `Err(Denied)`
    /// with a reason otherwise. Never mutates state — call `record_cost`
    /// separately once the operation actually runs.
    pub fn can_proceed(
        &self,
        tenant_id: &str,
        job_id: JobId,
        op: Operation,
        url: &str,
    ) -> Result<(), Denied> {
        let unit = op.unit_cost(&self.config);

        if let Some(job) = self.jobs.get(&job_id) {
            if job.total + unit > self.config.per_job_limit {
                return Err(Denied(format!(
                    "per-job limit ${:.2} would be exceeded",
                    self.config.per_job_limit
                )));
            }
            let url_total = job.per_url.get(url).copied().unwrap_or(0.0);
            if url_total + unit > self.config.per_url_limit {
                return Err(Denied(format!(
                    "per-URL limit ${:.2} would be exceeded for {url}",
                    self.config.per_url_limit
                )));
            }
            let retries = job.retries_per_url.get(url).copied().unwrap_or(0);
            if retries >= self.config.max_retries_per_url {
                return Err(Denied(format!(
                    "max retries ({}) exhausted for {url}",
                    self.config.max_retries_per_url
                )));
            }
        }

        self.reset_tenant_if_new_month(tenant_id);
        if let Some(tenant) = self.tenants.get(tenant_id) {
            if tenant.total + unit > self.config.per_tenant_monthly_limit {
                return Err(Denied(format!(
                    "per-tenant monthly limit ${:.2} would be exceeded",
                    self.config.per_tenant_monthly_limit
                )));
            }
        }

        Ok(())
    }

    pub fn record_cost(&self, tenant_id: &str, job_id: JobId, op: Operation, url: &str) {
        let unit = op.unit_cost(&self.config);

        let mut job = self.jobs.entry(job_id).or_default();
        job.total += unit;
        *job.per_url.entry(url.to_string()).or_insert(0.0) += unit;
        *job
            .per_operation
            .entry(format!("{op:?}"))
            .or_insert(0.0) += unit;

        self.reset_tenant_if_new_month(tenant_id);
        let now = Utc::now();
        self.tenants
            .entry(tenant_id.to_string())
            .and_modify(|t| t.total += unit)
            .or_insert(TenantLedger {
                month: now.month(),
                year: now.year(),
                total: unit,
            });
    }

    pub fn record_retry(&self, job_id: JobId, url: &str) {
        let mut job = self.jobs.entry(job_id).or_default();
        *job.retries_per_url.entry(url.to_string()).or_insert(0) += 1;
    }

    pub fn job_total(&self, job_id: JobId) -> f64 {
        self.jobs.get(&job_id).map(|j| j.total).unwrap_or(0.0)
    }

    fn reset_tenant_if_new_month(&self, tenant_id: &str) {
        let now = Utc::now();
        if let Some(mut tenant) = self.tenants.get_mut(tenant_id) {
            if tenant.month != now.month() || tenant.year != now.year() {
                tenant.month = now.month();
                tenant.year = now.year();
                tenant.total = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_job_limit_denies_once_exceeded() {
        let cfg = CostConfig {
            per_job_limit: 0.02,
            ai_extraction_cost: 0.01,
            ..CostConfig::default()
        };
        let tracker = CostTracker::new(cfg);
        let job = JobId::new();
        tracker.record_cost("t1", job, Operation::AiExtraction, "https://x.com");
        tracker.record_cost("t1", job, Operation::AiExtraction, "https://x.com");
        assert!(tracker
            .can_proceed("t1", job, Operation::AiExtraction, "https://x.com")
            .is_err());
    }

    #[test]
    fn max_retries_denies_further_attempts() {
        let cfg = CostConfig { max_retries_per_url: 1, ..CostConfig::default() };
        let tracker = CostTracker::new(cfg);
        let job = JobId::new();
        tracker.record_retry(job, "https://x.com");
        let result = tracker.can_proceed("t1", job, Operation::Http, "https://x.com");
        assert!(result.is_err());
    }

    #[test]
    fn unrelated_jobs_have_independent_budgets() {
        let tracker = CostTracker::new(CostConfig::default());
        let job_a = JobId::new();
        let job_b = JobId::new();
        tracker.record_cost("t1", job_a, Operation::AiExtraction, "https://a.com");
        assert_eq!(tracker.job_total(job_b), 0.0);
    }
}

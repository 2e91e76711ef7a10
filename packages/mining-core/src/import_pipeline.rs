//! ImportPipeline (spec §4.11): copies a job's result rows into
//! tenant-scoped prospect records (and, unless disabled, the canonical
//! person/affiliation graph) in bounded batches, tracking progress the
//! caller can poll rather than blocking the triggering request.
//!
//! Each row is processed inside its own `SAVEPOINT` within a single batch
//! transaction (spec §9: "express as a scoped nested transaction
//! abstraction"). `sqlx::Transaction::begin` already issues a `SAVEPOINT`/
//! `RELEASE SAVEPOINT`/`ROLLBACK TO SAVEPOINT` when called on an existing
//! transaction, so no bespoke savepoint counter is needed.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::config::{AggregationMode, MiningConfig};
use crate::domain::{
    Affiliation, AffiliationSourceType, ImportProgress, ImportStatus, ListMember, Prospect,
    ResultRow,
};
use crate::error::{MiningError, Result};
use crate::ids::{AffiliationId, JobId, ListId, PersonId, ProspectId};
use crate::persistence::MiningStore;

/// Rows processed per database round-trip batch (spec §4.11).
const BATCH_SIZE: i64 = 200;
/// An import started less than this long ago is treated as still running;
/// a second `start_import` call within the window is rejected rather than
/// racing a duplicate background loop against the first.
const STALENESS_WINDOW: chrono::Duration = chrono::Duration::minutes(5);

/// `start_import` request payload, per spec §6's `{tags[], create_list,
/// list_name}` body.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub tags: Vec<String>,
    pub create_list: bool,
    pub list_name: Option<String>,
}

/// Result of [`ImportPipeline::preflight`], handed to
/// [`ImportPipeline::run_import`] once the caller has returned its `202`.
#[derive(Debug, Clone)]
pub struct PreflightOutcome {
    pub tenant_id: String,
    pub tags: Vec<String>,
    pub list_id: Option<ListId>,
    pub importable_count: i64,
}

pub struct ImportPipeline {
    store: Arc<MiningStore>,
    config: Arc<MiningConfig>,
}

/// First `@`-containing string in a row's `emails` (spec §4.11): not
/// necessarily `emails[0]` if upstream ever stores a non-email alias first.
fn primary_email(row: &ResultRow) -> Option<&str> {
    row.emails.iter().find(|e| e.contains('@')).map(|s| s.as_str())
}

impl ImportPipeline {
    pub fn new(store: Arc<MiningStore>, config: Arc<MiningConfig>) -> Self {
        Self { store, config }
    }

    /// Synchronous preflight (spec §4.11): job ownership is the caller's
    /// job; this checks for a concurrent non-stale import, reserves the
    /// list name if one was requested, and flips the job to
    /// `import_status = processing` before returning. Everything here must
    /// complete before the HTTP handler's `202` response, so a duplicate
    /// list name or a racing import is rejected synchronously rather than
    /// surfacing only via polling.
    pub async fn preflight(&self, job_id: JobId, request: &ImportRequest) -> Result<PreflightOutcome> {
        let job = self.store.get_job(job_id).await?;

        if let Some(ImportStatus::Processing) = job.import_status {
            let started_recently = job
                .import_progress
                .as_ref()
                .and_then(|p| p.started_at)
                .map(|t| Utc::now().signed_duration_since(t) < STALENESS_WINDOW)
                .unwrap_or(true);
            if started_recently {
                return Err(MiningError::ImportInProgress(job_id.0));
            }
        }

        let list_id = if request.create_list {
            let name = request
                .list_name
                .as_deref()
                .ok_or_else(|| MiningError::Config("create_list requires list_name".to_string()))?;
            Some(self.store.create_list(&job.tenant_id, name).await?.id)
        } else {
            None
        };

        let importable = self.store.import_preview_counts(job_id).await?.importable;

        self.store.update_import_status(job_id, ImportStatus::Processing).await?;
        self.store
            .update_import_progress(job_id, &ImportProgress { started_at: Some(Utc::now()), ..Default::default() })
            .await?;

        Ok(PreflightOutcome {
            tenant_id: job.tenant_id,
            tags: request.tags.clone(),
            list_id,
            importable_count: importable,
        })
    }

    /// Runs the background batch loop from an already-preflighted outcome.
    /// Intended to be `tokio::spawn`ed by the caller right after
    /// [`Self::preflight`] returns successfully.
    pub async fn run_import(&self, job_id: JobId, outcome: PreflightOutcome) {
        let result = self.run(job_id, outcome.tenant_id, outcome.tags, outcome.list_id).await;
        if let Err(e) = result {
            tracing::warn!(job_id = %job_id, error = %e, "import pipeline failed");
            let mut progress = self
                .store
                .get_job(job_id)
                .await
                .ok()
                .and_then(|j| j.import_progress)
                .unwrap_or_default();
            progress.failed_at = Some(Utc::now());
            progress.push_error(format!("fatal: {e}"));
            let _ = self.store.update_import_progress(job_id, &progress).await;
            let _ = self.store.update_import_status(job_id, ImportStatus::Failed).await;
        }
    }

    async fn run(
        &self,
        job_id: JobId,
        tenant_id: String,
        tags: Vec<String>,
        list_id: Option<ListId>,
    ) -> Result<()> {
        let mut progress = ImportProgress { started_at: Some(Utc::now()), ..Default::default() };

        loop {
            let rows = self.store.fetch_importable_batch(job_id, BATCH_SIZE).await?;
            if rows.is_empty() {
                break;
            }

            match self.run_batch(&tenant_id, &tags, list_id, &rows, &mut progress).await {
                Ok(()) => {}
                Err(e) => {
                    // Batch-level failure (e.g. the commit itself): the whole
                    // batch rolls back, so every row in it is still `status
                    // != imported` and counts as skipped for this pass.
                    tracing::warn!(job_id = %job_id, error = %e, "import batch rolled back");
                    progress.skipped += rows.len();
                    progress.push_error(format!("batch failed: {e}"));
                }
            }

            self.store.update_import_progress(job_id, &progress).await?;
            if rows.len() < BATCH_SIZE as usize {
                break;
            }
        }

        if let Some(list_id) = list_id {
            progress.list_member_count = Some(self.store.count_list_members(list_id).await? as usize);
        }

        self.store.update_import_status(job_id, ImportStatus::Completed).await?;
        self.store.update_import_progress(job_id, &progress).await?;
        Ok(())
    }

    /// One batch transaction: intra-batch dedup by lower(primary email),
    /// lock-order sort, then a `SAVEPOINT` per row so a single bad row
    /// never aborts the rest of the batch (spec §4.11 step 2, §8).
    async fn run_batch(
        &self,
        tenant_id: &str,
        tags: &[String],
        list_id: Option<ListId>,
        rows: &[ResultRow],
        progress: &mut ImportProgress,
    ) -> Result<()> {
        let mut tx = self.store.pool().begin().await?;

        let mut seen_emails: HashSet<String> = HashSet::new();
        let mut surviving: Vec<(&ResultRow, &str)> = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(email) = primary_email(row) else {
                self.store.mark_result_row_imported_with(&mut *tx, row.id).await?;
                progress.skipped += 1;
                continue;
            };
            let key = email.to_lowercase();
            if !seen_emails.insert(key) {
                self.store.mark_result_row_imported_with(&mut *tx, row.id).await?;
                progress.duplicates += 1;
                continue;
            }
            surviving.push((row, email));
        }

        // Sort by email for a consistent lock order across concurrent
        // imports touching the same prospects (spec §5).
        surviving.sort_by(|(_, a), (_, b)| a.cmp(b));

        for (row, email) in surviving {
            let mut savepoint = tx.begin().await?;
            match self.import_row(&mut savepoint, tenant_id, row, email, tags, list_id).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    progress.imported += 1;
                }
                Err(e) => {
                    savepoint.rollback().await.ok();
                    progress.skipped += 1;
                    progress.push_error(format!("{email}: {e}"));
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Dual-write: the legacy flat prospect record plus, unless canonical
    /// aggregation is disabled or running in shadow mode, the canonical
    /// person/affiliation graph for the same row (spec §4.11, §4.10).
    /// Runs entirely against the row's savepoint so a failure anywhere in
    /// here rolls back only this row.
    async fn import_row(
        &self,
        savepoint: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        tenant_id: &str,
        row: &ResultRow,
        email: &str,
        tags: &[String],
        list_id: Option<ListId>,
    ) -> Result<()> {
        let prospect = Prospect {
            id: ProspectId::new(),
            tenant_id: tenant_id.to_string(),
            email: email.to_lowercase(),
            contact_name: row.contact_name.clone(),
            company_name: row.company_name.clone(),
            tags: tags.to_vec(),
            created_at: Utc::now(),
        };
        let prospect = self.store.upsert_prospect_with(&mut **savepoint, &prospect).await?;

        if let Some(list_id) = list_id {
            let member = ListMember {
                list_id,
                prospect_id: prospect.id,
                tenant_id: tenant_id.to_string(),
                created_at: Utc::now(),
            };
            self.store.insert_list_member_with(&mut **savepoint, &member).await?;
        }

        if !self.config.canonical_aggregation_disabled
            && self.config.canonical_aggregation_mode != AggregationMode::Shadow
        {
            let person = self
                .store
                .upsert_person_with(&mut **savepoint, tenant_id, email, None, None)
                .await?;
            let affiliation = Affiliation {
                id: AffiliationId::new(),
                tenant_id: tenant_id.to_string(),
                person_id: PersonId::from_uuid(person.id.0),
                company_name: row.company_name.clone(),
                position: row.job_title.clone(),
                country_code: row.country.clone(),
                city: row.city.clone(),
                website: row.website.clone(),
                phone: row.phone.clone(),
                source_type: AffiliationSourceType::Import,
                source_ref: row.job_id.to_string(),
                confidence: row.confidence as f32,
                raw: serde_json::Value::Null,
            };
            self.store.upsert_affiliation_with(&mut **savepoint, &affiliation).await?;
        } else if self.config.shadow_verbose_logging {
            tracing::debug!(email, "shadow mode: would upsert canonical person/affiliation");
        }

        self.store.mark_result_row_imported_with(&mut **savepoint, row.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResultRowStatus, VerificationStatus};
    use crate::ids::ResultRowId;

    fn row(emails: Vec<&str>) -> ResultRow {
        ResultRow {
            id: ResultRowId::new(),
            job_id: JobId::new(),
            tenant_id: "tenant-1".into(),
            source_url: "https://example.com".into(),
            company_name: None,
            contact_name: None,
            job_title: None,
            emails: emails.into_iter().map(str::to_string).collect(),
            phone: None,
            country: None,
            city: None,
            address: None,
            website: None,
            confidence: 50,
            status: ResultRowStatus::New,
            verification_status: VerificationStatus::Unverified,
            raw: serde_json::Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn import_progress_bounds_recent_errors_to_ten() {
        let mut progress = ImportProgress::default();
        for i in 0..15 {
            progress.push_error(format!("err-{i}"));
        }
        assert_eq!(progress.recent_errors.len(), 10);
        assert_eq!(progress.recent_errors[0], "err-5");
    }

    #[test]
    fn primary_email_is_first_at_containing_string() {
        let r = row(vec!["not-an-email", "ada@acme.com", "extra@acme.com"]);
        assert_eq!(primary_email(&r), Some("ada@acme.com"));
    }

    #[test]
    fn primary_email_none_when_no_email_like_entry() {
        let r = row(vec!["no-at-sign"]);
        assert_eq!(primary_email(&r), None);
    }
}

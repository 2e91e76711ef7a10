//! The mining data model (spec §3): `Job`, `ResultRow`, the in-memory
//! `UnifiedContact` aggregate, normalizer output, and the canonical
//! `Person`/`Affiliation` persistence shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::ids::{AffiliationId, JobId, ListId, PersonId, ProspectId, ResultRowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProgress {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub duplicates: usize,
    /// Bounded trailing list of per-row errors, last 10 (spec §7).
    pub recent_errors: Vec<String>,
    /// Set once the import finishes, only when a list was created
    /// (spec §4.11 step 3).
    pub list_member_count: Option<usize>,
    pub failed_at: Option<DateTime<Utc>>,
    /// When this import run began; staleness (spec §4.11 preflight: "no
    /// concurrent non-stale import") is judged against this, not
    /// `Job::completed_at`.
    pub started_at: Option<DateTime<Utc>>,
}

impl ImportProgress {
    pub fn push_error(&mut self, err: impl Into<String>) {
        self.recent_errors.push(err.into());
        if self.recent_errors.len() > 10 {
            self.recent_errors.remove(0);
        }
    }
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self {
            total: 0,
            imported: 0,
            skipped: 0,
            duplicates: 0,
            recent_errors: Vec::new(),
            list_member_count: None,
            failed_at: None,
            started_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStats {
    pub contact_count: usize,
    pub emails_found: usize,
    pub enrichment_rate: f32,
    pub block_detected: bool,
    pub errors: Vec<String>,
    pub miner_stats: HashMap<String, Value>,
    /// Why Flow 2 ran or was skipped (spec §4.4) — `None` until Flow 1
    /// reaches the decision point.
    #[serde(default)]
    pub flow2_skip_reason: Option<String>,
}

impl Default for JobStats {
    fn default() -> Self {
        Self {
            contact_count: 0,
            emails_found: 0,
            enrichment_rate: 0.0,
            block_detected: false,
            errors: Vec::new(),
            miner_stats: HashMap::new(),
            flow2_skip_reason: None,
        }
    }
}

/// A mining job: the unit of work owned by a tenant (spec §3).
///
/// `status` is written only by the `FlowOrchestrator`; `import_status`/
/// `import_progress` are written only by the `ImportPipeline`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: String,
    pub input_url: String,
    pub config: Value,
    pub status: JobStatus,
    pub import_status: Option<ImportStatus>,
    pub import_progress: Option<ImportProgress>,
    pub stats: JobStats,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(tenant_id: impl Into<String>, input_url: impl Into<String>, config: Value) -> Self {
        Self {
            id: JobId::new(),
            tenant_id: tenant_id.into(),
            input_url: input_url.into(),
            config,
            status: JobStatus::Pending,
            import_status: None,
            import_progress: None,
            stats: JobStats::default(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultRowStatus {
    New,
    Imported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Valid,
    Invalid,
    Risky,
}

/// The canonical per-extracted-contact row attached to a job (spec §3).
///
/// Invariant enforced by callers (`ResultAggregator`, not this type): a row
/// with non-empty `emails` is never overwritten by a profile-only row, and
/// `confidence` uses MAX on conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: ResultRowId,
    pub job_id: JobId,
    pub tenant_id: String,
    pub source_url: String,
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub job_title: Option<String>,
    pub emails: Vec<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    /// Clamped to `0..=100`.
    pub confidence: u8,
    pub status: ResultRowStatus,
    pub verification_status: VerificationStatus,
    pub raw: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResultRow {
    pub fn is_profile_only(&self) -> bool {
        self.emails.is_empty()
    }
}

/// Where a `UnifiedContact` came from. Named extractors as a closed set
/// rather than a free string, since the router (§4.2) dispatches on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    TableExtractor,
    SpaNetworkExtractor,
    AiExtractor,
    DeepCrawlExtractor,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    Personal,
    Generic,
    Role,
    Unknown,
}

/// Evidence proving where a field was extracted from (spec GLOSSARY);
/// drives confidence boosts in the `Validator` and rejections in the
/// `HallucinationFilter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Evidence {
    DomSelector { selector: String },
    RegexMatch { pattern: String, matched_text: String },
    StructuredData { schema: String },
    AiReasoning { explanation: String },
}

/// The in-memory aggregate contacts are merged into (spec §3).
///
/// Identity: `email.lower()` if present, otherwise
/// `(contact_name.lower_trim(), source_url.lower())`. A profile-only
/// identity must never collide with an email-keyed one — callers key
/// maps accordingly rather than this type enforcing it structurally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedContact {
    pub email: Option<String>,
    pub additional_emails: Vec<String>,
    pub contact_name: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub source: ContactSource,
    pub source_url: String,
    pub confidence: f32,
    pub evidence: Vec<Evidence>,
    pub email_type: EmailType,
    pub extracted_at: DateTime<Utc>,
}

impl UnifiedContact {
    /// Lowercase email key, or `None` for a profile-only contact.
    pub fn email_key(&self) -> Option<String> {
        self.email.as_ref().map(|e| e.to_lowercase())
    }

    /// Profile-only identity key: `(name, source_url)`, both lowercased
    /// with internal whitespace collapsed so `"Ada Lovelace"` and
    /// `" ada  lovelace "` dedup to the same identity. Only meaningful
    /// when `email_key()` is `None`.
    pub fn profile_key(&self) -> (String, String) {
        let name = self
            .contact_name
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        (name, self.source_url.to_lowercase())
    }

    pub fn is_profile_only(&self) -> bool {
        self.email.is_none()
    }

    /// Confidence ceiling per spec §3: 25 for profile-only contacts, 40
    /// for AI-sourced contacts lacking evidence, else uncapped (still
    /// clamped to 0..=100 by the validator).
    pub fn confidence_ceiling(&self) -> f32 {
        if self.is_profile_only() {
            25.0
        } else if self.source == ContactSource::AiExtractor && self.evidence.is_empty() {
            40.0
        } else {
            100.0
        }
    }
}

/// A field-level affiliation hint attached to a normalizer candidate
/// (spec §3). The normalizer must not invent confidence here — it only
/// passes through miner-provided hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateAffiliation {
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub confidence: Option<f32>,
}

/// Normalizer output (spec §3): one candidate per validated email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedContactCandidate {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub affiliations: Vec<CandidateAffiliation>,
    pub extraction_meta: Value,
}

/// Canonical person record (spec §3). Created/updated only by canonical
/// aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub tenant_id: String,
    /// Unique per-tenant, case-insensitively.
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffiliationSourceType {
    Job,
    Manual,
    Import,
}

/// Canonical affiliation record (spec §3). Additive only: enrichment
/// fills NULLs and upgrades confidence via MAX, never overwrites a
/// non-NULL field. Unique on `(tenant_id, person_id, lower(company_name))`
/// when `company_name` is non-null; NULL-company rows accumulate
/// unconstrained (spec §9 Open Question, resolved as intentional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affiliation {
    pub id: AffiliationId,
    pub tenant_id: String,
    pub person_id: PersonId,
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub source_type: AffiliationSourceType,
    pub source_ref: String,
    pub confidence: f32,
    pub raw: Value,
}

impl Affiliation {
    /// Additive merge: fills NULLs from `other`, takes `max` confidence.
    /// Never overwrites an existing non-NULL field.
    pub fn merge_from(&mut self, other: &Affiliation) {
        macro_rules! fill {
            ($field:ident) => {
                if self.$field.is_none() {
                    self.$field = other.$field.clone();
                }
            };
        }
        fill!(position);
        fill!(country_code);
        fill!(city);
        fill!(website);
        fill!(phone);
        self.confidence = self.confidence.max(other.confidence);
    }
}

/// Background prospect record produced by the import pipeline (spec §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prospect {
    pub id: ProspectId,
    pub tenant_id: String,
    pub email: String,
    pub contact_name: Option<String>,
    pub company_name: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactList {
    pub id: ListId,
    pub tenant_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Join row between a `ContactList` and a `Prospect` (spec §4.11's
/// "optional list membership"). Uniqueness on `(list_id, prospect_id)` so a
/// retried import row never double-joins a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMember {
    pub list_id: ListId,
    pub prospect_id: ProspectId,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
}

/// Preflight counts for `GET .../import-preview` (spec §6): how many of a
/// job's result rows would actually move on `import-all`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImportPreviewCounts {
    pub total_results: i64,
    pub with_email: i64,
    pub importable: i64,
    pub already_imported: i64,
    pub without_email: i64,
}

/// TTL-bound Flow-1 output blob, keyed by `job_id` (spec §3). Default TTL
/// 10 minutes, extendable via `TtlStore::extend_ttl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempFlow1Payload {
    pub job_id: JobId,
    pub contacts: Vec<UnifiedContact>,
    pub website_urls: Vec<String>,
    pub miner_stats: HashMap<String, Value>,
    pub enrichment_rate: f32,
    pub saved_at: DateTime<Utc>,
}

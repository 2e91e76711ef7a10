//! The `Extractor` trait (spec GLOSSARY "miner") and its supporting
//! types: a single interface for every site-scraper/AI/browser extractor
//! instead of inheritance-based polymorphism (spec §9). Capabilities are
//! data, not trait specialization, so the `SmartRouter`/`ExecutionPlanBuilder`
//! can reason about a miner without downcasting it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::{ContactSource, UnifiedContact};
use crate::error::ExtractorStatus;

/// Data describing what a miner can and can't do, consulted by the
/// router/plan builder (spec §9: "Capabilities are data, not inheritance").
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub use_cache: bool,
    pub supports_pagination: bool,
    /// The miner paginates itself; the orchestrator must not wrap it in
    /// `PaginationHandler` (spec §4.3, §4.5 guardrail).
    pub own_pagination: bool,
    pub cost_per_request: f64,
    pub default_confidence: f32,
}

/// A job's immutable inputs as seen by an extractor: the URL to mine and
/// whatever job-level config it needs (mining mode, preferred miner hint,
/// tenant id for evidence tagging).
#[derive(Debug, Clone)]
pub struct MiningContext {
    pub job_id: crate::ids::JobId,
    pub tenant_id: String,
    pub url: String,
    pub config: Value,
}

/// What a single extractor invocation returns: a status-carrying result
/// (spec §7) plus whatever contacts it found and raw per-miner stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerResult {
    pub miner_name: String,
    pub status: ExtractorStatus,
    pub contacts: Vec<UnifiedContact>,
    pub raw_output: Value,
    pub stats: HashMap<String, Value>,
}

impl MinerResult {
    pub fn empty(miner_name: impl Into<String>, status: ExtractorStatus) -> Self {
        Self {
            miner_name: miner_name.into(),
            status,
            contacts: Vec::new(),
            raw_output: Value::Null,
            stats: HashMap::new(),
        }
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> Capabilities;
    async fn mine(&self, ctx: &MiningContext) -> MinerResult;
}

/// A per-extractor descriptor mapping arbitrary raw-output field names to
/// the canonical contact fields, produced once from a sample record
/// rather than inspected ad hoc by the normalizer (spec §9: "tagged sum
/// type for extractor outputs... formalize it as `FieldMap`").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMap {
    pub email: Option<String>,
    pub company: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

impl FieldMap {
    /// Look up the raw value for a canonical field, using the mapped key
    /// if known. Returns `None` for unmapped fields rather than guessing.
    pub fn get<'a>(&self, raw: &'a Value, field: &str) -> Option<&'a Value> {
        let key = match field {
            "email" => self.email.as_deref(),
            "company" => self.company.as_deref(),
            "name" => self.name.as_deref(),
            "title" => self.title.as_deref(),
            "phone" => self.phone.as_deref(),
            "website" => self.website.as_deref(),
            "country" => self.country.as_deref(),
            "city" => self.city.as_deref(),
            _ => None,
        }?;
        raw.get(key)
    }

    /// Build a field map from a sample record by matching canonical field
    /// names (and a few common synonyms) against its top-level keys.
    pub fn infer_from_sample(sample: &Value) -> Self {
        let Value::Object(map) = sample else {
            return Self::default();
        };
        let find = |candidates: &[&str]| -> Option<String> {
            candidates
                .iter()
                .find(|c| map.contains_key(**c))
                .map(|c| c.to_string())
        };
        Self {
            email: find(&["email", "e_mail", "contact_email"]),
            company: find(&["company", "company_name", "organization"]),
            name: find(&["name", "contact_name", "full_name"]),
            title: find(&["title", "job_title", "position"]),
            phone: find(&["phone", "phone_number", "tel"]),
            website: find(&["website", "url", "site"]),
            country: find(&["country", "country_code"]),
            city: find(&["city", "town"]),
        }
    }
}

/// Contact source tag for a given miner name, used by the aggregator's
/// evidence trail. Named miners (spec §4.2 priority table) map onto the
/// closed `ContactSource` set; unknown names fall back to `Manual`.
pub fn source_for_miner(miner_name: &str) -> ContactSource {
    match miner_name {
        "httpBasicMiner" | "playwrightTableMiner" => ContactSource::TableExtractor,
        "spaNetworkMiner" => ContactSource::SpaNetworkExtractor,
        "aiMiner" => ContactSource::AiExtractor,
        "playwrightMiner" | "websiteScraperMiner" | "documentMiner" | "directoryMiner" => {
            ContactSource::DeepCrawlExtractor
        }
        _ => ContactSource::Manual,
    }
}

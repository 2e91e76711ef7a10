//! The contact-mining engine: page triage, extraction routing, field
//! normalization, validation, pagination, and persistence for a single
//! mining job.
//!
//! `mining-core` owns everything between "a job with a seed URL exists"
//! and "rows land in the relational contact tables." It depends on
//! `extraction` for web-fetch/SSRF primitives and the `AI` trait, and on
//! `seesaw` for the event-sourced command plumbing that drives a job's
//! state machine. It knows nothing about HTTP routing or auth — that's
//! `server`'s job.

pub mod aggregator;
pub mod circuit_breaker;
pub mod config;
pub mod countries;
pub mod cost_tracker;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod extractor;
pub mod hallucination;
pub mod html_cache;
pub mod ids;
pub mod normalizer;
pub mod scout;
pub mod ttl_store;
pub mod validator;

pub mod adapter;
pub mod document_normalizer;
pub mod execution_plan;
pub mod import_pipeline;
pub mod orchestrator;
pub mod pagination;
pub mod persistence;
pub mod router;

pub use adapter::ExtractorAdapter;
pub use aggregator::{merge_contacts, AggregationSummary};
pub use circuit_breaker::CircuitBreaker;
pub use config::MiningConfig;
pub use cost_tracker::CostTracker;
pub use document_normalizer::normalize_document;
pub use error::{ExtractorStatus, MiningError, Result};
pub use event_bus::EventBus;
pub use execution_plan::{ExecutionPlanBuilder, ExecutionStep};
pub use extractor::{Extractor, MiningContext, MinerResult};
pub use hallucination::HallucinationFilter;
pub use html_cache::HtmlCache;
pub use ids::{AffiliationId, JobId, ListId, PersonId, ProspectId, ResultRowId};
pub use import_pipeline::ImportPipeline;
pub use orchestrator::FlowOrchestrator;
pub use pagination::PaginationHandler;
pub use persistence::MiningStore;
pub use router::{Decision, SmartRouter};
pub use scout::{analyze as scout_analyze, Report as ScoutReport};
pub use ttl_store::{InMemoryTtlStore, TtlStore};
pub use validator::{validate, ValidationResult};

//! Application state shared across every mining route: the Postgres-backed
//! store, the orchestrator that drives jobs through Flow 1/Flow 2, the
//! background import pipeline, and the resolved runtime config.

use std::collections::HashMap;
use std::sync::Arc;

use mining_core::{
    CircuitBreaker, CostTracker, EventBus, Extractor, FlowOrchestrator, ImportPipeline,
    MiningConfig, MiningStore,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub store: Arc<MiningStore>,
    pub orchestrator: Arc<FlowOrchestrator>,
    pub import_pipeline: Arc<ImportPipeline>,
    pub config: Arc<MiningConfig>,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        config: Arc<MiningConfig>,
        extractors: HashMap<String, Arc<dyn Extractor>>,
    ) -> Self {
        let store = Arc::new(MiningStore::new(db_pool.clone()));
        let ttl_store: Arc<dyn mining_core::TtlStore> = Arc::new(mining_core::InMemoryTtlStore::new());
        let cost_tracker = Arc::new(CostTracker::new(config.cost));
        let circuit_breaker = Arc::new(CircuitBreaker::new(config.circuit));
        let event_bus = Arc::new(EventBus::new());

        let crawler: Arc<dyn extraction::Crawler> = Arc::new(extraction::HttpCrawler::new());

        let orchestrator = Arc::new(FlowOrchestrator::new(
            store.clone(),
            ttl_store,
            cost_tracker,
            circuit_breaker,
            event_bus,
            extractors,
            crawler,
            config.worker_id.clone(),
        ));
        let import_pipeline = Arc::new(ImportPipeline::new(store.clone(), config.clone()));

        Self { db_pool, store, orchestrator, import_pipeline, config }
    }
}

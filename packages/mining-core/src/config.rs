//! Runtime configuration for the mining engine, loaded from environment
//! variables once at process startup (teacher pattern: `dotenvy` loads a
//! `.env` file in `server::main`, then every crate reads `std::env::var`
//! directly — no config-file format, no hierarchical merge).

use extraction::security::SecretString;

use crate::error::{MiningError, Result};

/// Per-operation unit costs and per-scope budgets for the `CostTracker`
/// (spec §4.12). Expressed in USD as `f64` because the source tracks
/// fractional-cent costs (`$0.0001` per HTTP fetch) and compares against
/// dollar ceilings; nothing here is money moved, only a soft throttle.
#[derive(Debug, Clone, Copy)]
pub struct CostConfig {
    pub ai_extraction_cost: f64,
    pub browser_page_cost: f64,
    pub http_cost: f64,
    pub deep_crawl_page_cost: f64,
    pub per_url_limit: f64,
    pub per_job_limit: f64,
    pub per_tenant_monthly_limit: f64,
    pub max_retries_per_url: u32,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            ai_extraction_cost: 0.01,
            browser_page_cost: 0.001,
            http_cost: 0.0001,
            deep_crawl_page_cost: 0.005,
            per_url_limit: 0.10,
            per_job_limit: 2.00,
            per_tenant_monthly_limit: 50.0,
            max_retries_per_url: 3,
        }
    }
}

/// Circuit-breaker thresholds (spec §4.12). Durations are stored in seconds
/// so they can be compared against `chrono::Duration` without pulling in a
/// humantime crate the teacher never used.
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub recovery_seconds: i64,
    pub half_open_success_threshold: u32,
    pub cleanup_inactive_seconds: i64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_seconds: 30 * 60,
            half_open_success_threshold: 2,
            cleanup_inactive_seconds: 24 * 60 * 60,
        }
    }
}

/// Every environment variable the CORE reads, per spec §6. Loaded once via
/// [`MiningConfig::from_env`] and handed to `FlowOrchestrator` as part of
/// its dependency container (§9: "pass an explicit dependency container
/// rather than relying on process-global lazy initialization").
#[derive(Clone)]
pub struct MiningConfig {
    /// Connection string for the TTL store (Redis-shaped, but the engine
    /// only depends on the `TtlStore` trait — see `ttl_store.rs`).
    pub ttl_store_url: String,
    /// Disables canonical aggregation (persons + affiliations upsert)
    /// entirely when set, regardless of shadow/persist mode.
    pub canonical_aggregation_disabled: bool,
    /// When canonical aggregation runs, whether it writes (`persist`) or
    /// only logs what it would have written (`shadow`).
    pub canonical_aggregation_mode: AggregationMode,
    /// Tagged onto events published by this worker (EventBus `source`).
    pub worker_id: String,
    /// Shared bearer token accepted by `POST /jobs/:id/results` in lieu of
    /// tenant-scoped auth, for manual/offline miners.
    pub manual_miner_token: SecretString,
    /// Signing secret for tenant-auth JWTs validated at the server boundary.
    pub jwt_secret: SecretString,
    /// Extra `debug!`-level logging while in shadow mode, off by default
    /// since it's chatty enough to drown normal operation.
    pub shadow_verbose_logging: bool,

    pub cost: CostConfig,
    pub circuit: CircuitConfig,
}

/// Whether canonical aggregation persists its writes or only logs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    Shadow,
    Persist,
}

impl MiningConfig {
    /// Load every field from the process environment. Fails closed: a
    /// missing required variable is a `Config` error, not a silent default,
    /// because the manual-miner token and JWT secret guard real auth paths.
    pub fn from_env() -> Result<Self> {
        let ttl_store_url = env_var("MINING_TTL_STORE_URL")?;
        let worker_id = std::env::var("MINING_WORKER_ID")
            .unwrap_or_else(|_| "mining-core".to_string());
        let manual_miner_token = SecretString::new(env_var("MINING_MANUAL_MINER_TOKEN")?);
        let jwt_secret = SecretString::new(env_var("MINING_JWT_SECRET")?);

        let canonical_aggregation_disabled = bool_var("MINING_DISABLE_CANONICAL_AGGREGATION");
        let canonical_aggregation_mode = if bool_var("MINING_CANONICAL_AGGREGATION_SHADOW") {
            AggregationMode::Shadow
        } else {
            AggregationMode::Persist
        };
        let shadow_verbose_logging = bool_var("MINING_SHADOW_VERBOSE_LOGGING");

        Ok(Self {
            ttl_store_url,
            canonical_aggregation_disabled,
            canonical_aggregation_mode,
            worker_id,
            manual_miner_token,
            jwt_secret,
            shadow_verbose_logging,
            cost: CostConfig::default(),
            circuit: CircuitConfig::default(),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| MiningError::Config(format!("missing required env var {key}")))
}

fn bool_var(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}

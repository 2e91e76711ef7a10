//! Typed errors for the mining engine.
//!
//! Mirrors the taxonomy the extraction library uses: `thiserror` variants
//! here, `anyhow` only at the server boundary.

use thiserror::Error;

/// Top-level error for mining-core operations.
#[derive(Debug, Error)]
pub enum MiningError {
    /// Transient I/O: HTTP/network timeouts, DB disconnects, TTL-store
    /// disconnects. Retried at the extractor boundary up to the per-URL cap.
    #[error("transient error: {0}")]
    Transient(String),

    /// HTTP 401/403/429, captcha markers, "access denied" body indicators.
    #[error("blocked: {0}")]
    Blocked(String),

    /// Malformed JSON from an SPA API, empty extraction, schema drift.
    #[error("empty or malformed content: {0}")]
    HardContent(String),

    /// Cost or retry limit exceeded. Never retried.
    #[error("budget exceeded: {0}")]
    Budget(String),

    /// Database constraint violation inside an aggregate transaction.
    #[error("fatal: {0}")]
    Fatal(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("extraction error: {0}")]
    Extraction(#[from] extraction::error::ExtractionError),

    #[error("crawl error: {0}")]
    Crawl(#[from] extraction::error::CrawlError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("result row not found: {0}")]
    ResultRowNotFound(uuid::Uuid),

    #[error("flow1 payload not found for job: {0}")]
    Flow1NotFound(uuid::Uuid),

    #[error("config error: {0}")]
    Config(String),

    #[error("import already in progress for job: {0}")]
    ImportInProgress(uuid::Uuid),

    #[error("list name already in use: {0}")]
    DuplicateListName(String),

    #[error("row has no eligible email: {0}")]
    NoEligibleEmail(uuid::Uuid),
}

pub type Result<T> = std::result::Result<T, MiningError>;

/// Status-carrying result an extractor adapter returns for a single mine
/// attempt. Extractor-level errors never propagate as `Err` past the
/// adapter boundary — they are absorbed and expressed here.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractorStatus {
    Ok,
    Blocked { reason: String },
    Empty { reason: String },
    CostLimit { reason: String },
    Error { reason: String },
}

impl ExtractorStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExtractorStatus::Ok)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, ExtractorStatus::Blocked { .. })
    }

    pub fn from_mining_error(err: &MiningError) -> Self {
        match err {
            MiningError::Blocked(reason) => ExtractorStatus::Blocked {
                reason: reason.clone(),
            },
            MiningError::HardContent(reason) => ExtractorStatus::Empty {
                reason: reason.clone(),
            },
            MiningError::Budget(reason) => ExtractorStatus::CostLimit {
                reason: reason.clone(),
            },
            other => ExtractorStatus::Error {
                reason: other.to_string(),
            },
        }
    }
}

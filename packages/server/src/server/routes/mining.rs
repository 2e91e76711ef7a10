//! HTTP surface for the mining engine (spec §6): submit/list/patch/delete
//! result rows, and kick off/preview the background import.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::app_state::AppState;
use crate::common::pagination::PageParams;
use crate::server::middleware::jwt_auth::TenantAuth;
use mining_core::domain::{ContactSource, EmailType, ResultRow, ResultRowStatus, UnifiedContact, VerificationStatus};
use mining_core::ids::{JobId, ResultRowId};
use mining_core::persistence::{ResultRowFilter, ResultRowPatch};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Mining(#[from] mining_core::MiningError),
    #[error("{0}")]
    BadRequest(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::Mining(mining_core::MiningError::JobNotFound(_))
            | ApiError::Mining(mining_core::MiningError::ResultRowNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Mining(mining_core::MiningError::DuplicateListName(_))
            | ApiError::Mining(mining_core::MiningError::ImportInProgress(_)) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitResultRequest {
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
}

/// `POST /api/mining/jobs/:id/results` — manual/offline ingest of a single
/// contact row for a job, bypassing the extraction pipeline entirely.
pub async fn submit_result(
    State(state): State<AppState>,
    auth: TenantAuth,
    Path(job_id): Path<uuid::Uuid>,
    Json(body): Json<SubmitResultRequest>,
) -> Result<(StatusCode, Json<ResultRow>), ApiError> {
    let job_id = JobId::from_uuid(job_id);
    let job = state.store.get_job(job_id).await?;
    if job.tenant_id != auth.tenant_id {
        return Err(ApiError::BadRequest("job does not belong to tenant".to_string()));
    }

    let contact = UnifiedContact {
        email: body.emails.first().cloned(),
        additional_emails: body.emails.into_iter().skip(1).collect(),
        contact_name: body.contact_name,
        job_title: body.job_title,
        company_name: body.company_name,
        website: body.website,
        country: body.country,
        city: body.city,
        address: body.address,
        phone: body.phone,
        source: ContactSource::Manual,
        source_url: body.source_url,
        confidence: 25.0,
        evidence: vec![],
        email_type: EmailType::Unknown,
        extracted_at: chrono::Utc::now(),
    };
    let validated = mining_core::validate(contact);
    if validated.rejected {
        return Err(ApiError::BadRequest("contact failed garbage validation".to_string()));
    }
    let contact = validated.cleaned;

    let row = ResultRow {
        id: ResultRowId::new(),
        job_id,
        tenant_id: job.tenant_id,
        source_url: contact.source_url,
        company_name: contact.company_name,
        contact_name: contact.contact_name,
        job_title: contact.job_title,
        emails: contact.email.into_iter().chain(contact.additional_emails).collect(),
        phone: contact.phone,
        country: contact.country,
        city: contact.city,
        address: contact.address,
        website: contact.website,
        confidence: contact.confidence.clamp(0.0, 100.0) as u8,
        status: ResultRowStatus::New,
        verification_status: VerificationStatus::Unverified,
        raw: Value::Null,
        created_at: contact.extracted_at,
        updated_at: contact.extracted_at,
    };
    state.store.upsert_result_row(&row).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Debug, Deserialize)]
pub struct ListResultsQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub has_email: Option<bool>,
    pub status: Option<String>,
    pub verification_status: Option<String>,
    pub country: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResultsResponse {
    pub rows: Vec<ResultRow>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// `GET /api/mining/jobs/:id/results` (spec §6: page/limit clamped 1..=500,
/// default 50, plus has_email/status/verification_status/country/search).
pub async fn list_results(
    State(state): State<AppState>,
    auth: TenantAuth,
    Path(job_id): Path<uuid::Uuid>,
    Query(query): Query<ListResultsQuery>,
) -> Result<Json<ListResultsResponse>, ApiError> {
    let job_id = JobId::from_uuid(job_id);
    let job = state.store.get_job(job_id).await?;
    if job.tenant_id != auth.tenant_id {
        return Err(ApiError::BadRequest("job does not belong to tenant".to_string()));
    }

    let (page, limit) = query.page.normalized();
    let filter = ResultRowFilter {
        has_email: query.has_email,
        status: query.status.as_deref().and_then(parse_status),
        verification_status: query.verification_status.as_deref().and_then(parse_verification),
        country: query.country,
        search: query.search,
    };
    let (rows, total) = state.store.list_result_rows(job_id, &filter, page, limit).await?;
    Ok(Json(ListResultsResponse { rows, total, page, limit }))
}

fn parse_status(s: &str) -> Option<ResultRowStatus> {
    match s {
        "new" => Some(ResultRowStatus::New),
        "imported" => Some(ResultRowStatus::Imported),
        _ => None,
    }
}

fn parse_verification(s: &str) -> Option<VerificationStatus> {
    match s {
        "unverified" => Some(VerificationStatus::Unverified),
        "valid" => Some(VerificationStatus::Valid),
        "invalid" => Some(VerificationStatus::Invalid),
        "risky" => Some(VerificationStatus::Risky),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRequestBody {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub create_list: bool,
    pub list_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportAcceptedResponse {
    pub status: &'static str,
    pub job_id: uuid::Uuid,
    pub total_to_import: i64,
    pub tags_applied: Vec<String>,
    pub list_created: Option<uuid::Uuid>,
}

/// `POST /api/mining/jobs/:id/import-all` — preflight-checks, then kicks off
/// the background import and returns immediately (spec §6, §4.11: 202
/// Accepted with `{status, job_id, total_to_import, tags_applied,
/// list_created?}`).
pub async fn import_all(
    State(state): State<AppState>,
    auth: TenantAuth,
    Path(job_id): Path<uuid::Uuid>,
    Json(body): Json<ImportRequestBody>,
) -> Result<(StatusCode, Json<ImportAcceptedResponse>), ApiError> {
    let job_id = JobId::from_uuid(job_id);
    let job = state.store.get_job(job_id).await?;
    if job.tenant_id != auth.tenant_id {
        return Err(ApiError::BadRequest("job does not belong to tenant".to_string()));
    }
    if body.create_list && body.list_name.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(ApiError::BadRequest("create_list requires a non-empty list_name".to_string()));
    }

    let request = mining_core::import_pipeline::ImportRequest {
        tags: body.tags.clone(),
        create_list: body.create_list,
        list_name: body.list_name.clone(),
    };

    // Preflight (job ownership, staleness, list-name reservation) runs
    // synchronously so it's reflected in this response; only the batch
    // loop itself is backgrounded.
    let outcome = state.import_pipeline.preflight(job_id, &request).await?;
    let total_to_import = outcome.importable_count;
    let list_created = outcome.list_id;

    let pipeline = state.import_pipeline.clone();
    tokio::spawn(async move {
        pipeline.run_import(job_id, outcome).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportAcceptedResponse {
            status: "processing",
            job_id: job_id.0,
            total_to_import,
            tags_applied: body.tags,
            list_created: list_created.map(|id| id.0),
        }),
    ))
}

/// `GET /api/mining/jobs/:id/import-preview` — preflight counts (spec §6):
/// `total_results`, `with_email`, `importable`, `already_imported`,
/// `without_email`.
pub async fn import_preview(
    State(state): State<AppState>,
    auth: TenantAuth,
    Path(job_id): Path<uuid::Uuid>,
) -> Result<Json<mining_core::domain::ImportPreviewCounts>, ApiError> {
    let job_id = JobId::from_uuid(job_id);
    let job = state.store.get_job(job_id).await?;
    if job.tenant_id != auth.tenant_id {
        return Err(ApiError::BadRequest("job does not belong to tenant".to_string()));
    }
    Ok(Json(state.store.import_preview_counts(job_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PatchResultRequest {
    pub contact_name: Option<Option<String>>,
    pub company_name: Option<Option<String>>,
    pub job_title: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub verification_status: Option<String>,
}

/// `PATCH /api/mining/results/:id` — operator corrections to a single row.
pub async fn update_result(
    State(state): State<AppState>,
    _auth: TenantAuth,
    Path(result_id): Path<uuid::Uuid>,
    Json(body): Json<PatchResultRequest>,
) -> Result<Json<ResultRow>, ApiError> {
    let patch = ResultRowPatch {
        contact_name: body.contact_name,
        company_name: body.company_name,
        job_title: body.job_title,
        phone: body.phone,
        verification_status: body.verification_status.as_deref().and_then(parse_verification),
    };
    let row = state
        .store
        .update_result_row(ResultRowId::from_uuid(result_id), &patch)
        .await?;
    Ok(Json(row))
}

/// `DELETE /api/mining/results/:id`.
pub async fn delete_result(
    State(state): State<AppState>,
    _auth: TenantAuth,
    Path(result_id): Path<uuid::Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_result_row(ResultRowId::from_uuid(result_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use leadlens_core::{RunSnapshot, ScanSubject};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TriggerScanRequest {
    pub case_id: String,
    pub company_name: String,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub employee_count: Option<u32>,
    #[serde(default)]
    pub budget_hint: Option<String>,
}

impl From<TriggerScanRequest> for ScanSubject {
    fn from(req: TriggerScanRequest) -> Self {
        Self {
            case_id: req.case_id,
            company_name: req.company_name,
            website_url: req.website_url,
            industry: req.industry,
            employee_count: req.employee_count,
            budget_hint: req.budget_hint,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[utoipa::path(
    post,
    path = "/api/scans",
    request_body = TriggerScanRequest,
    responses(
        (status = 201, description = "Scan run created", body = RunSnapshot),
        (status = 400, description = "Invalid subject"),
        (status = 409, description = "An active run already exists for the subject"),
    ),
    tag = "scans"
)]
pub async fn trigger_scan(
    State(state): State<AppState>,
    Json(request): Json<TriggerScanRequest>,
) -> Result<(StatusCode, Json<RunSnapshot>), AppError> {
    let run = state.service.trigger(request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(RunSnapshot::from_run(&run, None)),
    ))
}

#[utoipa::path(
    get,
    path = "/api/scans",
    responses(
        (status = 200, description = "Recent scan runs", body = Vec<RunSnapshot>),
    ),
    tag = "scans"
)]
pub async fn list_scans(
    State(state): State<AppState>,
) -> Result<Json<Vec<RunSnapshot>>, AppError> {
    let runs = state.service.list(50).await?;
    Ok(Json(
        runs.iter().map(|r| RunSnapshot::from_run(r, None)).collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/scans/{id}",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run snapshot", body = RunSnapshot),
        (status = 404, description = "Run not found"),
    ),
    tag = "scans"
)]
pub async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSnapshot>, AppError> {
    Ok(Json(state.service.snapshot(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/scans/{id}/answer",
    params(("id" = Uuid, Path, description = "Run ID")),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Answer accepted, run resumed", body = OkResponse),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Run is not waiting for input"),
    ),
    tag = "scans"
)]
pub async fn answer_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<OkResponse>, AppError> {
    state.service.answer(id, request.answer).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[utoipa::path(
    post,
    path = "/api/scans/{id}/cancel",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run cancelled", body = OkResponse),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Run already terminal"),
    ),
    tag = "scans"
)]
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, AppError> {
    state.service.cancel(id).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[utoipa::path(
    delete,
    path = "/api/scans/{id}",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run deleted (cancelled first if active)", body = DeleteResponse),
    ),
    tag = "scans"
)]
pub async fn delete_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state.service.delete(id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

//! HTTP handlers for print jobs.

use crate::{
    AppState,
    api::models::{
        pagination::{PageOf, Pagination},
        print_jobs::{PrintJobCreate, PrintJobResponse},
    },
    auth::CurrentStudent,
    errors::{Error, Result},
    types::PrintJobId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Settle a print job
#[utoipa::path(
    post,
    path = "/print-jobs",
    tag = "print_jobs",
    summary = "Submit a print job",
    description = "Prices the document and debits the student's page balance. The job is created only if the debit succeeds.",
    request_body = PrintJobCreate,
    responses(
        (status = 201, description = "Print job created and balance debited", body = PrintJobResponse),
        (status = 400, description = "Invalid copies or a page range selecting no pages"),
        (status = 401, description = "Missing or invalid student header"),
        (status = 402, description = "Insufficient balance; the body carries `required` and `available`"),
        (status = 404, description = "Document not found"),
        (status = 422, description = "Document could not be converted or counted"),
    ),
)]
#[tracing::instrument(skip_all)]
pub async fn create_print_job(
    State(state): State<AppState>,
    student: CurrentStudent,
    Json(data): Json<PrintJobCreate>,
) -> Result<(StatusCode, Json<PrintJobResponse>)> {
    let job = state.settlement.settle_print_job(data.into_request(student.id)).await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

/// List the caller's print jobs
#[utoipa::path(
    get,
    path = "/print-jobs",
    tag = "print_jobs",
    summary = "List print jobs",
    description = "The caller's print jobs, newest first.",
    params(Pagination),
    responses(
        (status = 200, description = "Print jobs", body = PageOf<PrintJobResponse>),
        (status = 401, description = "Missing or invalid student header"),
    ),
)]
#[tracing::instrument(skip_all)]
pub async fn list_print_jobs(
    State(state): State<AppState>,
    student: CurrentStudent,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PageOf<PrintJobResponse>>> {
    let (skip, limit) = pagination.params();
    let jobs = state.storage.list_print_jobs(student.id, skip, limit).await?;
    Ok(Json(PageOf::new(jobs.into_iter().map(Into::into).collect(), skip, limit)))
}

/// Get one of the caller's print jobs
#[utoipa::path(
    get,
    path = "/print-jobs/{id}",
    tag = "print_jobs",
    summary = "Get print job",
    params(("id" = String, Path, description = "Print job ID")),
    responses(
        (status = 200, description = "Print job", body = PrintJobResponse),
        (status = 401, description = "Missing or invalid student header"),
        (status = 404, description = "Print job not found"),
    ),
)]
#[tracing::instrument(skip_all)]
pub async fn get_print_job(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path(id): Path<PrintJobId>,
) -> Result<Json<PrintJobResponse>> {
    match state.storage.get_print_job(id).await? {
        Some(job) if job.student_id == student.id => Ok(Json(job.into())),
        _ => Err(Error::NotFound {
            resource: "Print job".to_string(),
            id: id.to_string(),
        }),
    }
}

/// Cancel a pending print job
#[utoipa::path(
    post,
    path = "/print-jobs/{id}/cancel",
    tag = "print_jobs",
    summary = "Cancel print job",
    description = "Cancels a PENDING print job and refunds its cost to the balance.",
    params(("id" = String, Path, description = "Print job ID")),
    responses(
        (status = 200, description = "Print job cancelled and refunded", body = PrintJobResponse),
        (status = 401, description = "Missing or invalid student header"),
        (status = 404, description = "Print job not found"),
        (status = 409, description = "Print job is no longer pending"),
    ),
)]
#[tracing::instrument(skip_all)]
pub async fn cancel_print_job(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path(id): Path<PrintJobId>,
) -> Result<Json<PrintJobResponse>> {
    let job = state.storage.cancel_print_job(student.id, id).await?;
    Ok(Json(job.into()))
}

//! Request status endpoint.

use actix_web::{HttpResponse, get, web};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorResponse};
use crate::models::RequestStatusRecord;
use crate::services::IngestPipeline;

/// Get the status of an ingestion request.
///
/// Error details are included for operators; unknown ids answer 404.
#[utoipa::path(
    get,
    path = "/api/v1/status/{id}",
    tag = "Ingest",
    params(
        ("id" = Uuid, Path, description = "Request id returned by the intake endpoint")
    ),
    responses(
        (status = 200, description = "Current status", body = RequestStatusRecord),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Unknown request", body = ErrorResponse)
    )
)]
#[get("/status/{id}")]
pub async fn get_status(
    path: web::Path<String>,
    pipeline: web::Data<IngestPipeline>,
) -> AppResult<HttpResponse> {
    let request_id = Uuid::parse_str(&path.into_inner())?;

    let record = pipeline
        .status()
        .get(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Request {}", request_id)))?;

    Ok(HttpResponse::Ok().json(record))
}

/// Configure status routes.
pub fn configure_status_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_status);
}

//! Package intake endpoint.
//!
//! POST /api/v1/send/{flag}
//! Content-Type: multipart/form-data, field `File` = encrypted `.zip`

use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{HttpResponse, post, web};
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{AppError, AppResult, ErrorResponse, IngestError};
use crate::models::{
    DuplicatePackageResponse, IngestAcceptedResponse, IngestMode, RequestStatus,
};
use crate::services::{IngestOutcome, IngestPipeline};

/// Multipart field carrying the encrypted archive.
pub const FILE_FIELD: &str = "File";

const DUPLICATE_MESSAGE: &str = "File already exists!";

/// Admission and size limits shared by all intake requests.
pub struct IntakeLimits {
    pub max_upload_size: usize,
    pub permits: Arc<Semaphore>,
}

impl IntakeLimits {
    pub fn new(max_upload_size: usize, max_concurrent_ingests: usize) -> Self {
        Self {
            max_upload_size,
            permits: Arc::new(Semaphore::new(max_concurrent_ingests)),
        }
    }
}

/// Ingest an encrypted package.
#[utoipa::path(
    post,
    path = "/api/v1/send/{flag}",
    tag = "Ingest",
    params(
        ("flag" = String, Path, description = "Processing mode: `normal` or `newVersion`")
    ),
    request_body(
        content_type = "multipart/form-data",
        description = "Field `File`: AES-256-GCM encrypted zip archive (nonce prefixed)"
    ),
    responses(
        (status = 202, description = "Package accepted, assets uploading", body = IngestAcceptedResponse),
        (status = 200, description = "Package already ingested", body = DuplicatePackageResponse),
        (status = 400, description = "Invalid upload", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 422, description = "Decryption failed", body = ErrorResponse),
        (status = 500, description = "Persistence or storage failure", body = ErrorResponse),
        (status = 501, description = "Mode not implemented", body = ErrorResponse),
        (status = 503, description = "Too many concurrent ingestions", body = ErrorResponse)
    )
)]
#[post("/send/{flag}")]
pub async fn send_package(
    path: web::Path<String>,
    mut payload: Multipart,
    pipeline: web::Data<IngestPipeline>,
    limits: web::Data<IntakeLimits>,
) -> AppResult<HttpResponse> {
    let flag = path.into_inner();
    let mode = IngestMode::parse(&flag);

    if mode == Some(IngestMode::NewVersion) {
        return Err(AppError::NotImplemented(
            "newVersion processing is not available yet".to_string(),
        ));
    }

    // Acquire permit before a request id exists (bounds memory held by bodies)
    let _permit = limits.permits.try_acquire().map_err(|_| {
        warn!("Ingestion rejected: too many concurrent requests");
        AppError::ServiceUnavailable(
            "Too many concurrent ingestions. Please try again later.".to_string(),
        )
    })?;

    let request_id = pipeline.open_request().await?;

    if mode.is_none() {
        return Err(pipeline
            .reject(request_id, IngestError::InvalidMode(flag))
            .await
            .into());
    }

    let (file_name, body) = match read_upload(&mut payload, limits.max_upload_size).await {
        Ok(upload) => upload,
        Err(error) => return Err(pipeline.reject(request_id, error).await.into()),
    };

    match pipeline.ingest(request_id, &file_name, body).await? {
        IngestOutcome::Accepted {
            request_id,
            package_name,
            entries,
            files,
            ..
        } => Ok(HttpResponse::Accepted().json(IngestAcceptedResponse {
            request_id,
            package_name,
            entries,
            files,
            status: RequestStatus::Running,
        })),
        IngestOutcome::Duplicate {
            request_id,
            package_name,
        } => Ok(HttpResponse::Ok().json(DuplicatePackageResponse {
            request_id,
            package_name,
            message: DUPLICATE_MESSAGE.to_string(),
        })),
    }
}

/// Read the `File` field into memory, enforcing the size limit while streaming.
async fn read_upload(
    payload: &mut Multipart,
    max_upload_size: usize,
) -> Result<(String, Vec<u8>), IngestError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| {
            warn!("Unreadable multipart body: {}", e);
            IngestError::MissingFile
        })?;

        let (name, file_name) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().map(str::to_string),
                cd.get_filename().map(str::to_string),
            ),
            None => (None, None),
        };

        if name.as_deref() != Some(FILE_FIELD) {
            // Drain unrelated fields
            while let Some(chunk) = field.next().await {
                if chunk.is_err() {
                    break;
                }
            }
            continue;
        }

        let mut body = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| {
                warn!("Upload stream interrupted: {}", e);
                IngestError::MissingFile
            })?;
            if body.len() + chunk.len() > max_upload_size {
                return Err(IngestError::PayloadTooLarge {
                    limit: max_upload_size,
                });
            }
            body.extend_from_slice(&chunk);
        }

        return Ok((file_name.unwrap_or_default(), body));
    }

    Err(IngestError::MissingFile)
}

/// Configure intake routes.
pub fn configure_ingest_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(send_package);
}

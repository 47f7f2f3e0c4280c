//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Package Ingest Server",
        version = "0.1.0",
        description = "Ingestion service for encrypted asset packages: decrypts and extracts uploads, persists their manifest and uploads assets to object storage"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Ingest endpoints
        api::ingest::send_package,
        api::status::get_status,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Ingest
            models::IngestAcceptedResponse,
            models::DuplicatePackageResponse,
            models::RequestStatus,
            models::RequestStatusRecord,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Ingest", description = "Package intake and request status")
    )
)]
pub struct ApiDoc;

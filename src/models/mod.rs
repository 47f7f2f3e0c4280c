//! Domain models for the ingestion service.

pub mod ingest;
pub mod manifest;
pub mod request_status;

// Re-export commonly used types
pub use ingest::{CompletionNotice, DuplicatePackageResponse, IngestAcceptedResponse, IngestMode};
pub use manifest::{ManifestEntry, ManifestField};
pub use request_status::{RequestStatus, RequestStatusRecord};

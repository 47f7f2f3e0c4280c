//! Intake request and response DTOs.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::RequestStatus;

/// Processing mode selected by the `{flag}` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Normal,
    /// Reserved for re-ingesting a package as a new version.
    NewVersion,
}

impl IngestMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "newVersion" => Some(Self::NewVersion),
            _ => None,
        }
    }
}

/// Response after a package was accepted; uploads continue in the background.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestAcceptedResponse {
    pub request_id: Uuid,
    pub package_name: String,
    /// Number of persisted manifest entries.
    pub entries: usize,
    /// Number of asset files queued for upload.
    pub files: usize,
    pub status: RequestStatus,
}

/// Response for a package that was already ingested.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DuplicatePackageResponse {
    pub request_id: Uuid,
    pub package_name: String,
    pub message: String,
}

/// Payload sent downstream once every asset of a request is uploaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotice {
    pub request_id: Uuid,
    pub package_name: String,
    pub vendor: String,
}

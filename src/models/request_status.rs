//! Request status models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of one ingestion request.
///
/// `Running` is entered at intake; `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Running,
    Completed,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Only `Running` may move, and only to a terminal state.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(self, Self::Running) && next.is_terminal()
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable, pollable projection of an ingestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RequestStatusRecord {
    pub id: Uuid,
    pub status: RequestStatus,
    /// Stable error code, set only in `error` state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Operator-facing detail, set only in `error` state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// True when the request ended as a duplicate submission.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestStatusRecord {
    pub fn running(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: RequestStatus::Running,
            error_code: None,
            error_detail: None,
            duplicate: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn completed(&self, duplicate: bool) -> Self {
        Self {
            status: RequestStatus::Completed,
            duplicate,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn failed(&self, code: &str, detail: String) -> Self {
        Self {
            status: RequestStatus::Error,
            error_code: Some(code.to_string()),
            error_detail: Some(detail),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

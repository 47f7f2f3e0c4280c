//! Request status tracking.
//!
//! Each request is `running` from intake until it reaches `completed` or
//! `error`; terminal records are never rewritten.

use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use crate::db::PersistenceGateway;
use crate::error::{AppResult, IngestError};
use crate::models::{RequestStatus, RequestStatusRecord};

/// Persisted state machine keyed by request id.
#[derive(Clone)]
pub struct StatusTracker {
    gateway: Arc<dyn PersistenceGateway>,
}

impl StatusTracker {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Record a new request as running.
    pub async fn begin(&self, request_id: Uuid) -> AppResult<RequestStatusRecord> {
        let record = RequestStatusRecord::running(request_id);
        self.gateway.upsert_status(&record).await?;
        Ok(record)
    }

    /// Move to `completed`. Returns false if the record was already terminal.
    pub async fn complete(&self, request_id: Uuid, duplicate: bool) -> AppResult<bool> {
        self.transition(request_id, RequestStatus::Completed, |record| {
            record.completed(duplicate)
        })
        .await
    }

    /// Move to `error`, keeping the code and detail for operators.
    pub async fn fail(&self, request_id: Uuid, err: &IngestError) -> AppResult<bool> {
        error!(
            request_id = %request_id,
            code = err.code(),
            detail = %err,
            "Ingestion request failed"
        );
        self.transition(request_id, RequestStatus::Error, |record| {
            record.failed(err.code(), err.to_string())
        })
        .await
    }

    pub async fn get(&self, request_id: Uuid) -> AppResult<Option<RequestStatusRecord>> {
        self.gateway.get_status(request_id).await
    }

    async fn transition<F>(&self, request_id: Uuid, next: RequestStatus, apply: F) -> AppResult<bool>
    where
        F: FnOnce(&RequestStatusRecord) -> RequestStatusRecord,
    {
        // A missing record means `begin` never persisted; record the outcome anyway
        let current = self
            .gateway
            .get_status(request_id)
            .await?
            .unwrap_or_else(|| RequestStatusRecord::running(request_id));

        if !current.status.can_transition_to(next) {
            warn!(
                request_id = %request_id,
                from = %current.status,
                to = %next,
                "Refusing status transition out of a terminal state"
            );
            return Ok(false);
        }

        self.gateway.upsert_status(&apply(&current)).await?;
        Ok(true)
    }
}

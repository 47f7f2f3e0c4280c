//! Persistence gateway consumed by the ingestion pipeline.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ManifestEntry, ManifestField, RequestStatusRecord};

use super::DbPool;

/// Document store operations the pipeline depends on.
#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Find every stored entry whose `field` equals `value`.
    async fn find_manifests(
        &self,
        field: ManifestField,
        value: &str,
    ) -> AppResult<Vec<ManifestEntry>>;

    /// Insert all entries atomically; either every entry persists or none does.
    async fn insert_manifests(&self, entries: &[ManifestEntry]) -> AppResult<usize>;

    /// Delete every stored entry whose `field` equals `value`; returns the count.
    async fn delete_manifests(&self, field: ManifestField, value: &str) -> AppResult<u64>;

    /// Insert or replace the record keyed by its id.
    async fn upsert_status(&self, record: &RequestStatusRecord) -> AppResult<()>;

    async fn get_status(&self, id: Uuid) -> AppResult<Option<RequestStatusRecord>>;

    /// Verify the store is reachable.
    async fn ping(&self) -> AppResult<()>;
}

#[async_trait]
impl PersistenceGateway for DbPool {
    async fn find_manifests(
        &self,
        field: ManifestField,
        value: &str,
    ) -> AppResult<Vec<ManifestEntry>> {
        self.find_manifest_entries(field, value).await
    }

    async fn insert_manifests(&self, entries: &[ManifestEntry]) -> AppResult<usize> {
        self.insert_manifest_entries(entries).await
    }

    async fn delete_manifests(&self, field: ManifestField, value: &str) -> AppResult<u64> {
        self.delete_manifest_entries(field, value).await
    }

    async fn upsert_status(&self, record: &RequestStatusRecord) -> AppResult<()> {
        self.upsert_request_status(record).await
    }

    async fn get_status(&self, id: Uuid) -> AppResult<Option<RequestStatusRecord>> {
        self.get_request_status(id).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.connection()
            .ping()
            .await
            .map_err(|e| crate::error::AppError::Database(format!("Ping failed: {}", e)))
    }
}

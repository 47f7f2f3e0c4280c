//! Ingestion pipeline.
//!
//! Intake runs decryption, extraction, manifest transformation, duplicate
//! detection and persistence in the caller's task. Uploads then continue in a
//! background task that owns the dispatcher's task group and the completion
//! coordinator. Every failure is recorded against the request id before the
//! caller sees it, and the working directory is removed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IngestSettings;
use crate::db::PersistenceGateway;
use crate::error::{AppError, AppResult, IngestError};
use crate::models::ManifestField;
use crate::services::archive::{self, ExtractedArchive};
use crate::services::completion::{CompletionCoordinator, CompletionJob};
use crate::services::decryption;
use crate::services::dispatcher::{UploadDispatcher, WorkItem};
use crate::services::manifest::{self, TransformContext};
use crate::services::notifier::CompletionNotifier;
use crate::services::status::StatusTracker;
use crate::services::storage::ObjectStore;

/// Accepted upload extension.
const UPLOAD_EXTENSION: &str = "zip";

/// Successful intake result.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Entries persisted; uploads run in the background.
    Accepted {
        request_id: Uuid,
        package_name: String,
        entries: usize,
        files: usize,
        /// Background upload task; dropping it detaches the task
        uploads: JoinHandle<()>,
    },
    /// The package was ingested before; nothing was stored.
    Duplicate {
        request_id: Uuid,
        package_name: String,
    },
}

/// A failed request, already recorded in its status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub request_id: Uuid,
    pub error: IngestError,
}

impl From<IngestFailure> for AppError {
    fn from(failure: IngestFailure) -> Self {
        AppError::Ingest {
            request_id: failure.request_id,
            source: failure.error,
        }
    }
}

/// Wires the pipeline stages to their collaborators.
pub struct IngestPipeline {
    settings: Arc<IngestSettings>,
    gateway: Arc<dyn PersistenceGateway>,
    tracker: StatusTracker,
    dispatcher: UploadDispatcher,
    coordinator: Arc<CompletionCoordinator>,
}

impl IngestPipeline {
    pub fn new(
        settings: IngestSettings,
        gateway: Arc<dyn PersistenceGateway>,
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        let tracker = StatusTracker::new(Arc::clone(&gateway));
        let dispatcher = UploadDispatcher::new(
            store,
            settings.upload_workers,
            settings.queue_capacity,
            Duration::from_secs(settings.upload_timeout_secs),
        );
        let coordinator = Arc::new(CompletionCoordinator::new(
            tracker.clone(),
            Arc::clone(&gateway),
            notifier,
            settings.vendor.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            gateway,
            tracker,
            dispatcher,
            coordinator,
        }
    }

    pub fn status(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Allocate a request id and record it as running.
    pub async fn open_request(&self) -> AppResult<Uuid> {
        let request_id = Uuid::new_v4();
        self.tracker.begin(request_id).await?;
        Ok(request_id)
    }

    /// Record a failure that happened before the payload reached the pipeline.
    pub async fn reject(&self, request_id: Uuid, error: IngestError) -> IngestFailure {
        if let Err(e) = self.tracker.fail(request_id, &error).await {
            warn!(request_id = %request_id, "Failed to record failure: {}", e);
        }
        IngestFailure { request_id, error }
    }

    /// Open a request and ingest `payload` under it.
    pub async fn submit(
        &self,
        upload_name: &str,
        payload: Vec<u8>,
    ) -> Result<IngestOutcome, AppError> {
        let request_id = self.open_request().await?;
        Ok(self.ingest(request_id, upload_name, payload).await?)
    }

    /// Run an opened request through intake and start its uploads.
    pub async fn ingest(
        &self,
        request_id: Uuid,
        upload_name: &str,
        payload: Vec<u8>,
    ) -> Result<IngestOutcome, IngestFailure> {
        info!(
            request_id = %request_id,
            file = %upload_name,
            bytes = payload.len(),
            "Ingesting package"
        );

        match self.process(request_id, upload_name, payload).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                let work_dir = self.settings.request_dir(&request_id);
                if let Err(e) = archive::remove_work_dir(&work_dir).await {
                    warn!(request_id = %request_id, "Failed to remove working directory: {}", e);
                }
                Err(self.reject(request_id, error).await)
            }
        }
    }

    async fn process(
        &self,
        request_id: Uuid,
        upload_name: &str,
        payload: Vec<u8>,
    ) -> Result<IngestOutcome, IngestError> {
        let is_zip = Path::new(upload_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(UPLOAD_EXTENSION));
        if !is_zip {
            return Err(IngestError::InvalidExtension(upload_name.to_string()));
        }

        let package_name = manifest::package_name(upload_name);
        let extracted = self.unpack(request_id, payload).await?;

        let manifest_bytes = tokio::fs::read(&extracted.manifest_path).await?;
        let entries = manifest::parse_manifest(&manifest_bytes)?;
        let entries = manifest::transform_entries(
            entries,
            &TransformContext {
                request_id,
                package_name: &package_name,
                vendor: &self.settings.vendor,
                user: &self.settings.user,
                image_files: &extracted.image_files,
                preset_names: &extracted.preset_names,
            },
        )?;

        let existing = self
            .gateway
            .find_manifests(ManifestField::ParentPackageName, &package_name)
            .await?;
        if !existing.is_empty() {
            archive::remove_work_dir(&extracted.root).await?;
            self.tracker.complete(request_id, true).await?;
            info!(
                request_id = %request_id,
                package = %package_name,
                "Package already ingested, treating as duplicate"
            );
            return Ok(IngestOutcome::Duplicate {
                request_id,
                package_name,
            });
        }

        let persisted = self.gateway.insert_manifests(&entries).await?;

        let items = extracted.assets;
        let job = CompletionJob {
            request_id,
            package_name: package_name.clone(),
            work_dir: extracted.root,
            total: items.len(),
        };
        info!(
            request_id = %request_id,
            package = %package_name,
            entries = persisted,
            files = job.total,
            "Manifest persisted, uploading assets"
        );

        let files = job.total;
        let uploads = self.spawn_uploads(job, items);

        Ok(IngestOutcome::Accepted {
            request_id,
            package_name,
            entries: persisted,
            files,
            uploads,
        })
    }

    /// Decrypt and extract off the async runtime.
    async fn unpack(&self, request_id: Uuid, payload: Vec<u8>) -> Result<ExtractedArchive, IngestError> {
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || {
            let archive_bytes = decryption::decrypt(&payload, &settings.encryption_key)?;
            archive::extract_archive(&archive_bytes, request_id, &settings)
        })
        .await
        .map_err(|e| IngestError::FileSystem(format!("extraction task failed: {}", e)))?
    }

    fn spawn_uploads(&self, job: CompletionJob, items: Vec<WorkItem>) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let coordinator = Arc::clone(&self.coordinator);
        let deadline = Duration::from_secs(self.settings.dispatch_timeout_secs);

        tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            let outcomes = dispatcher.spawn(items, job.request_id, &mut tasks);
            coordinator.run(job, outcomes, tasks, deadline).await;
        })
    }
}

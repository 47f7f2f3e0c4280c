//! Upload dispatcher.
//!
//! One producer task feeds the work items of a request into a bounded queue;
//! W worker tasks drain it and push each file to the object store. Closing the
//! queue is the only end-of-input signal. Every consumed item yields exactly
//! one `UploadOutcome`, failures included, so the coordinator can count.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::storage::{AssetCategory, ObjectStore};

/// Result of uploading one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Transferred; carries the storage location
    Uploaded { file: String, location: String },
    /// Content-addressed object already present; nothing transferred
    Deduplicated { file: String },
    /// Upload failed or timed out; already logged
    Failed { file: String },
}

impl UploadOutcome {
    /// Location string: the storage URL, the existing file name for a
    /// deduplicated asset, or empty for a failure.
    pub fn location(&self) -> &str {
        match self {
            Self::Uploaded { location, .. } => location,
            Self::Deduplicated { file } => file,
            Self::Failed { .. } => "",
        }
    }
}

/// One extracted asset and the category its archive group assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    pub category: AssetCategory,
}

/// Bounded worker pool pushing asset files to object storage.
#[derive(Clone)]
pub struct UploadDispatcher {
    store: Arc<dyn ObjectStore>,
    workers: usize,
    queue_capacity: usize,
    upload_timeout: Duration,
}

impl UploadDispatcher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        workers: usize,
        queue_capacity: usize,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
            upload_timeout,
        }
    }

    /// Spawn the producer and workers into `tasks` and return the outcome stream.
    ///
    /// The stream ends once every worker has exited.
    pub fn spawn(
        &self,
        items: Vec<WorkItem>,
        request_id: Uuid,
        tasks: &mut JoinSet<()>,
    ) -> mpsc::Receiver<UploadOutcome> {
        let (job_tx, job_rx) = mpsc::channel::<WorkItem>(self.queue_capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel::<UploadOutcome>(self.queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));

        tasks.spawn(async move {
            for item in items {
                // Blocks while the queue is full
                if job_tx.send(item).await.is_err() {
                    break;
                }
            }
            // Dropping the sender closes the queue
        });

        for worker in 0..self.workers {
            let job_rx = Arc::clone(&job_rx);
            let outcome_tx = outcome_tx.clone();
            let store = Arc::clone(&self.store);
            let upload_timeout = self.upload_timeout;

            tasks.spawn(async move {
                loop {
                    let next = { job_rx.lock().await.recv().await };
                    let Some(item) = next else {
                        debug!(request_id = %request_id, worker, "Queue drained, worker exiting");
                        break;
                    };

                    let outcome = upload_file(store.as_ref(), &item, upload_timeout, request_id).await;
                    if outcome_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            });
        }

        outcome_rx
    }
}

/// Upload one file under the per-upload deadline. Never fails; errors become `Failed`.
async fn upload_file(
    store: &dyn ObjectStore,
    item: &WorkItem,
    upload_timeout: Duration,
    request_id: Uuid,
) -> UploadOutcome {
    let file = item
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let upload = transfer(store, &item.path, item.category, &file, request_id);
    match tokio::time::timeout(upload_timeout, upload).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(reason)) => {
            warn!(request_id = %request_id, file = %file, "Upload failed: {}", reason);
            UploadOutcome::Failed { file }
        }
        Err(_) => {
            warn!(
                request_id = %request_id,
                file = %file,
                "Upload timed out after {}s",
                upload_timeout.as_secs()
            );
            UploadOutcome::Failed { file }
        }
    }
}

async fn transfer(
    store: &dyn ObjectStore,
    path: &Path,
    category: AssetCategory,
    file: &str,
    request_id: Uuid,
) -> Result<UploadOutcome, String> {
    let key = category.key_for(file);

    if category == AssetCategory::Unrecognized {
        warn!(request_id = %request_id, key = %key, "Unrecognized asset type, uploading to separate prefix");
    }

    // Only content-addressed names make an existing object equivalent
    if category == AssetCategory::Auxiliary {
        match store.object_exists(&key).await {
            Ok(true) => {
                debug!(request_id = %request_id, key = %key, "Preset already stored, skipping upload");
                return Ok(UploadOutcome::Deduplicated {
                    file: file.to_string(),
                });
            }
            Ok(false) => {}
            // Fall through to a regular upload
            Err(e) => warn!(request_id = %request_id, key = %key, "Existence check failed: {}", e),
        }
    }

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| format!("could not read {}: {}", path.display(), e))?;

    let location = store
        .put_object(&key, data)
        .await
        .map_err(|e| e.to_string())?;

    debug!(request_id = %request_id, key = %key, "Asset uploaded");
    Ok(UploadOutcome::Uploaded {
        file: file.to_string(),
        location,
    })
}

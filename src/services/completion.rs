//! Completion coordinator.
//!
//! Sole reader of a request's outcome stream. Once the number of outcomes
//! reaches the precomputed total it removes the working directory, marks the
//! request completed and notifies downstream. The count can only reach the
//! total once, so finalization runs at most once per request.
//!
//! An aborted request also withdraws its manifest entries, so a resubmission
//! is not mistaken for a duplicate of a package whose assets never arrived.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::PersistenceGateway;
use crate::error::IngestError;
use crate::models::{CompletionNotice, ManifestField};
use crate::services::archive;
use crate::services::dispatcher::UploadOutcome;
use crate::services::notifier::CompletionNotifier;
use crate::services::status::StatusTracker;

/// Background upload job of one accepted request.
#[derive(Debug, Clone)]
pub struct CompletionJob {
    pub request_id: Uuid,
    pub package_name: String,
    pub work_dir: PathBuf,
    /// Number of asset files handed to the dispatcher
    pub total: usize,
}

/// Tally of observed outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub deduplicated: usize,
    pub failed: usize,
}

impl UploadSummary {
    pub fn observed(&self) -> usize {
        self.uploaded + self.deduplicated + self.failed
    }

    fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded { .. } => self.uploaded += 1,
            UploadOutcome::Deduplicated { .. } => self.deduplicated += 1,
            UploadOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Count outcomes until `total` is reached.
///
/// The stream closing early means the workers died without reporting.
pub async fn await_outcomes(
    outcomes: &mut mpsc::Receiver<UploadOutcome>,
    total: usize,
) -> Result<UploadSummary, IngestError> {
    let mut summary = UploadSummary::default();

    while summary.observed() < total {
        match outcomes.recv().await {
            Some(outcome) => summary.record(&outcome),
            None => {
                return Err(IngestError::IncompleteUpload {
                    observed: summary.observed(),
                    expected: total,
                });
            }
        }
    }

    Ok(summary)
}

/// Finalizes requests once their uploads are accounted for.
pub struct CompletionCoordinator {
    tracker: StatusTracker,
    gateway: Arc<dyn PersistenceGateway>,
    notifier: Arc<dyn CompletionNotifier>,
    vendor: String,
}

impl CompletionCoordinator {
    pub fn new(
        tracker: StatusTracker,
        gateway: Arc<dyn PersistenceGateway>,
        notifier: Arc<dyn CompletionNotifier>,
        vendor: String,
    ) -> Self {
        Self {
            tracker,
            gateway,
            notifier,
            vendor,
        }
    }

    /// Drive one request's uploads to a terminal status.
    ///
    /// `tasks` holds the producer and workers; none of them outlive this call.
    pub async fn run(
        &self,
        job: CompletionJob,
        mut outcomes: mpsc::Receiver<UploadOutcome>,
        mut tasks: JoinSet<()>,
        deadline: Duration,
    ) {
        let counted =
            match tokio::time::timeout(deadline, await_outcomes(&mut outcomes, job.total)).await {
                Ok(result) => result,
                Err(_) => Err(IngestError::UploadTimeout(deadline.as_secs())),
            };

        match counted {
            Ok(summary) => {
                // Queue is closed and drained, so workers are already exiting
                while let Some(joined) = tasks.join_next().await {
                    if let Err(e) = joined {
                        warn!(request_id = %job.request_id, "Upload task ended abnormally: {}", e);
                    }
                }
                self.finalize(&job, summary).await;
            }
            Err(err) => {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                self.abort(&job, err).await;
            }
        }
    }

    async fn finalize(&self, job: &CompletionJob, summary: UploadSummary) {
        self.remove_work_dir(job).await;

        match self.tracker.complete(job.request_id, false).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(request_id = %job.request_id, "Failed to record completion: {}", e);
                return;
            }
        }

        info!(
            request_id = %job.request_id,
            package = %job.package_name,
            uploaded = summary.uploaded,
            deduplicated = summary.deduplicated,
            failed = summary.failed,
            "Request completed"
        );

        let notice = CompletionNotice {
            request_id: job.request_id,
            package_name: job.package_name.clone(),
            vendor: self.vendor.clone(),
        };
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(request_id = %job.request_id, "Completion webhook not delivered: {}", e);
        }
    }

    async fn abort(&self, job: &CompletionJob, err: IngestError) {
        self.remove_work_dir(job).await;

        let request_id = job.request_id.to_string();
        match self
            .gateway
            .delete_manifests(ManifestField::UniversalUuid, &request_id)
            .await
        {
            Ok(removed) => info!(
                request_id = %job.request_id,
                removed,
                "Withdrew manifest entries of aborted request"
            ),
            Err(e) => warn!(
                request_id = %job.request_id,
                "Failed to withdraw manifest entries: {}",
                e
            ),
        }

        if let Err(e) = self.tracker.fail(job.request_id, &err).await {
            warn!(request_id = %job.request_id, "Failed to record upload failure: {}", e);
        }
    }

    async fn remove_work_dir(&self, job: &CompletionJob) {
        if let Err(e) = archive::remove_work_dir(&job.work_dir).await {
            warn!(
                request_id = %job.request_id,
                "Failed to remove working directory {}: {}",
                job.work_dir.display(),
                e
            );
        }
    }
}

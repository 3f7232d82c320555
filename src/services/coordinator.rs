use std::sync::Arc;

use crate::models::job::{Artifact, JobId, JobStatus, QueuedJob};
use crate::services::content::ContentStore;
use crate::services::queue::{JobQueue, QueueError};
use crate::services::result_store::{ResultStore, StoreError};

/// Bridges request handlers and the worker pool: mints job ids, dispatches
/// work, and hands finished artifacts out exactly once.
pub struct ArtifactCoordinator {
    queue: Arc<dyn JobQueue>,
    results: ResultStore,
    content: Arc<dyn ContentStore>,
    surface_failures: bool,
}

impl ArtifactCoordinator {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        results: ResultStore,
        content: Arc<dyn ContentStore>,
        surface_failures: bool,
    ) -> Self {
        Self {
            queue,
            results,
            content,
            surface_failures,
        }
    }

    /// Dispatch a generation job and return its id without waiting for it.
    pub async fn start(&self, content_id: i64) -> Result<JobId, ArtifactError> {
        let job_id = JobId::new();
        let job = QueuedJob::generate_artifact(content_id, job_id.clone());
        self.queue
            .enqueue(&job)
            .await
            .map_err(ArtifactError::BrokerUnavailable)?;

        metrics::counter!("artifact_jobs_total").increment(1);
        tracing::info!(job_id = %job_id, content_id, "Artifact job dispatched");
        Ok(job_id)
    }

    /// Current status of a job.
    ///
    /// A job whose worker failed reports `Failed` only when failure surfacing
    /// is enabled; otherwise it is indistinguishable from one still running.
    pub async fn check(&self, job_id: &JobId) -> Result<JobStatus, ArtifactError> {
        if self.results.has_artifact(job_id).await? {
            return Ok(JobStatus::Ready);
        }
        if self.surface_failures {
            if let Some(record) = self.results.get_failure(job_id).await? {
                return Ok(JobStatus::Failed {
                    message: record.message,
                });
            }
        }
        Ok(JobStatus::Processing)
    }

    /// Claim a finished artifact. The first caller gets the bytes; every
    /// later call, and any call after expiry, gets `NotFound`.
    pub async fn retrieve(&self, job_id: &JobId, content_id: i64) -> Result<Artifact, ArtifactError> {
        let bytes = self
            .results
            .take_artifact(job_id)
            .await?
            .ok_or(ArtifactError::NotFound)?;

        // The bytes are already claimed, so a title lookup problem only
        // degrades the filename.
        let title = match self.content.get_by_id(content_id).await {
            Ok(Some(blog)) => blog.title,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, content_id, "Blog vanished before download");
                content_id.to_string()
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, content_id, error = %e, "Title lookup failed");
                content_id.to_string()
            }
        };

        metrics::counter!("artifact_downloads_total").increment(1);
        tracing::info!(job_id = %job_id, content_id, size_bytes = bytes.len(), "Artifact claimed");

        Ok(Artifact {
            filename: format!("{title}.pdf"),
            title,
            bytes,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact expired or missing")]
    NotFound,

    #[error("job broker unavailable: {0}")]
    BrokerUnavailable(QueueError),

    #[error("result store error: {0}")]
    Store(#[from] StoreError),
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::models::job::{FailureRecord, JobId, JobName, QueuedJob};
use crate::services::content::{ContentError, ContentStore};
use crate::services::pdf::{PdfRenderer, RenderError};
use crate::services::queue::{JobQueue, QueueError};
use crate::services::result_store::{ResultStore, StoreError};

/// Outcome of one job, as reported on the worker's own result channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success {
        content_id: i64,
        title: String,
        task_id: JobId,
        size_bytes: usize,
    },
    Error {
        message: String,
        task_id: JobId,
    },
}

/// Executes artifact jobs. Built from explicitly injected collaborators so a
/// worker process never depends on the web server's state.
#[derive(Clone)]
pub struct ArtifactWorker {
    content: Arc<dyn ContentStore>,
    results: ResultStore,
    renderer: Arc<PdfRenderer>,
    ttl: Duration,
    timeout: Duration,
}

impl ArtifactWorker {
    pub fn new(
        content: Arc<dyn ContentStore>,
        results: ResultStore,
        renderer: PdfRenderer,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            content,
            results,
            renderer: Arc::new(renderer),
            ttl,
            timeout,
        }
    }

    /// Render the post and park the PDF under the job's key.
    ///
    /// The artifact is written with a single `SET` after rendering finished,
    /// so a failure at any earlier point leaves nothing behind. Running the
    /// same job twice overwrites the key with an equivalent document.
    pub async fn generate(&self, content_id: i64, job_id: &JobId) -> Result<JobOutcome, WorkerError> {
        // A zero budget has already elapsed; `timeout` would still poll the
        // render once and could let it finish.
        if self.timeout.is_zero() {
            return Err(WorkerError::Timeout(self.timeout));
        }

        let (title, bytes) = tokio::time::timeout(self.timeout, self.render(content_id))
            .await
            .map_err(|_| WorkerError::Timeout(self.timeout))??;

        self.results.put_artifact(job_id, &bytes, self.ttl).await?;

        Ok(JobOutcome::Success {
            content_id,
            title,
            task_id: job_id.clone(),
            size_bytes: bytes.len(),
        })
    }

    async fn render(&self, content_id: i64) -> Result<(String, Vec<u8>), WorkerError> {
        let blog = self
            .content
            .get_by_id(content_id)
            .await?
            .ok_or(WorkerError::ContentNotFound(content_id))?;

        let renderer = Arc::clone(&self.renderer);
        let title = blog.title.clone();
        let bytes = tokio::task::spawn_blocking(move || renderer.render(&blog))
            .await
            .map_err(|e| WorkerError::Panicked(e.to_string()))??;
        Ok((title, bytes))
    }

    /// Run a dequeued job to completion, containing every failure.
    ///
    /// Errors are logged, counted, and recorded as a failure record; they
    /// never propagate to the caller.
    pub async fn run(&self, job: &QueuedJob) -> JobOutcome {
        let job_id = job.job_id().clone();
        let content_id = job.content_id();
        let started = Instant::now();

        let result = match job.job_name {
            JobName::GenerateArtifact => self.generate(content_id, &job_id).await,
        };
        let elapsed = started.elapsed();
        metrics::histogram!("artifact_generation_seconds").record(elapsed.as_secs_f64());

        match result {
            Ok(outcome) => {
                metrics::counter!("artifact_jobs_completed").increment(1);
                if let JobOutcome::Success { size_bytes, .. } = &outcome {
                    tracing::info!(
                        job_id = %job_id,
                        content_id,
                        size_bytes,
                        duration_ms = elapsed.as_millis() as u64,
                        "Artifact generated"
                    );
                }
                outcome
            }
            Err(e) => {
                metrics::counter!("artifact_jobs_failed").increment(1);
                tracing::error!(
                    job_id = %job_id,
                    content_id,
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Artifact generation failed"
                );

                let message = format!("PDF generation failed: {e}");
                let record = FailureRecord::new(job_id.clone(), message.clone());
                if let Err(store_err) = self.results.put_failure(&record, self.ttl).await {
                    tracing::error!(
                        job_id = %job_id,
                        error = %store_err,
                        "Failed to record job failure"
                    );
                }

                JobOutcome::Error {
                    message,
                    task_id: job_id,
                }
            }
        }
    }
}

/// Pull and execute the next job.
/// Returns Ok(true) if a job was processed, Ok(false) if the queue was empty.
pub async fn process_next_job(
    queue: &dyn JobQueue,
    worker: &ArtifactWorker,
) -> Result<bool, QueueError> {
    let delivery = match queue.dequeue().await {
        Ok(Some(delivery)) => delivery,
        Ok(None) => return Ok(false),
        Err(QueueError::Poison { payload, source }) => {
            tracing::warn!(payload = %payload, error = %source, "Dropped undecodable job");
            return Ok(true);
        }
        Err(e) => return Err(e),
    };

    let job = &delivery.job;
    tracing::info!(
        job_id = %job.job_id(),
        content_id = job.content_id(),
        job_name = %job.job_name,
        "Processing job"
    );

    worker.run(job).await;
    queue.complete(&delivery).await?;

    if let Ok(depth) = queue.depth().await {
        metrics::gauge!("artifact_queue_depth").set(depth as f64);
    }
    Ok(true)
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("blog {0} does not exist")]
    ContentNotFound(i64),

    #[error("content store error: {0}")]
    Content(#[from] ContentError),

    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("result store error: {0}")]
    Store(#[from] StoreError),

    #[error("job exceeded {0:?} time limit")]
    Timeout(Duration),

    #[error("render task panicked: {0}")]
    Panicked(String),
}

use std::sync::Arc;

use crate::services::{
    content::ContentStore, coordinator::ArtifactCoordinator, queue::JobQueue,
    result_store::ResultStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub content: Arc<dyn ContentStore>,
    pub results: ResultStore,
    pub queue: Arc<dyn JobQueue>,
    pub artifacts: Arc<ArtifactCoordinator>,
}

impl AppState {
    pub fn new(
        content: Arc<dyn ContentStore>,
        results: ResultStore,
        queue: Arc<dyn JobQueue>,
        surface_job_failures: bool,
    ) -> Self {
        let artifacts = ArtifactCoordinator::new(
            Arc::clone(&queue),
            results.clone(),
            Arc::clone(&content),
            surface_job_failures,
        );
        Self {
            content,
            results,
            queue,
            artifacts: Arc::new(artifacts),
        }
    }
}

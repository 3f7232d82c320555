use serde::Serialize;

use crate::models::job::JobStatus;

/// Response after dispatching an artifact job.
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: String,
    pub task_id: String,
}

/// Response for polling an artifact job.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    #[serde(flatten)]
    pub status: JobStatus,
}

/// Error body for requests that could not be served.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

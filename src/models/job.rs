use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Opaque identifier of one artifact job.
///
/// Backed by a random v4 UUID (122 bits of entropy) and rendered as 32
/// lowercase hex characters. Parsing rejects anything that is not a UUID so
/// that job ids can be spliced into store keys safely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| InvalidJobId(s.to_string()))
    }
}

impl TryFrom<String> for JobId {
    type Error = InvalidJobId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid job id: {0:?}")]
pub struct InvalidJobId(pub String);

/// Names of the units of work the worker knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobName {
    GenerateArtifact,
}

/// Message placed on the queue by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_name: JobName,
    /// `[content_id, job_id]`
    pub args: (i64, JobId),
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn generate_artifact(content_id: i64, job_id: JobId) -> Self {
        Self {
            job_name: JobName::GenerateArtifact,
            args: (content_id, job_id),
            created_at: Utc::now(),
        }
    }

    pub fn content_id(&self) -> i64 {
        self.args.0
    }

    pub fn job_id(&self) -> &JobId {
        &self.args.1
    }
}

/// Derived status reported to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Ready,
    Failed { message: String },
}

/// Failure record the worker leaves behind when a job cannot complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub status: String,
    pub message: String,
    pub job_id: JobId,
}

impl FailureRecord {
    pub fn new(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            job_id,
        }
    }
}

/// A claimed artifact ready to be streamed to the client.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub title: String,
    pub filename: String,
}

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Ignored by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Upper bound on pooled database connections in the server
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Redis connection string for the job queue and result store
    pub redis_url: String,

    /// How long an unclaimed artifact stays downloadable
    #[serde(default = "default_artifact_ttl_secs")]
    pub artifact_ttl_secs: u64,

    /// Hard limit on a single generation job; must be positive
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// How long a worker's claim on its in-flight jobs survives without a
    /// heartbeat before another worker may requeue them
    #[serde(default = "default_queue_lease_secs")]
    pub queue_lease_secs: u64,

    /// Directory searched first for a TrueType font
    #[serde(default = "default_font_dir")]
    pub font_dir: PathBuf,

    /// Fall back to well-known platform fonts when the font directory has none
    #[serde(default = "default_true")]
    pub use_system_fonts: bool,

    /// Report worker failures as `failed` instead of `processing`
    #[serde(default = "default_true")]
    pub surface_job_failures: bool,

    /// Number of concurrent consumers in one worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Sleep between polls of an empty queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Connection attempts against the broker before giving up at startup
    #[serde(default = "default_broker_connect_attempts")]
    pub broker_connect_attempts: u32,

    /// Address for the worker's own Prometheus listener; unset disables it
    #[serde(default)]
    pub worker_metrics_addr: Option<SocketAddr>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_max_connections() -> u32 {
    10
}

fn default_artifact_ttl_secs() -> u64 {
    600
}

fn default_job_timeout_secs() -> u64 {
    120
}

fn default_queue_lease_secs() -> u64 {
    30
}

fn default_font_dir() -> PathBuf {
    PathBuf::from("static/fonts")
}

fn default_true() -> bool {
    true
}

fn default_worker_concurrency() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_broker_connect_attempts() -> u32 {
    5
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "JOB_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if self.queue_lease_secs == 0 {
            return Err(ConfigError::Invalid(
                "QUEUE_LEASE_SECS must be at least 1".to_string(),
            ));
        }
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn queue_lease(&self) -> Duration {
        Duration::from_secs(self.queue_lease_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/blog".to_string()),
            ("REDIS_URL".to_string(), "redis://127.0.0.1/".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.artifact_ttl(), Duration::from_secs(600));
        assert_eq!(config.job_timeout(), Duration::from_secs(120));
        assert_eq!(config.font_dir, PathBuf::from("static/fonts"));
        assert!(config.use_system_fonts);
        assert!(config.surface_job_failures);
        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.worker_metrics_addr, None);
        assert_eq!(config.queue_lease(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/blog".to_string()),
            ("REDIS_URL".to_string(), "redis://127.0.0.1/".to_string()),
            ("ARTIFACT_TTL_SECS".to_string(), "30".to_string()),
            ("SURFACE_JOB_FAILURES".to_string(), "false".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();

        assert_eq!(config.artifact_ttl_secs, 30);
        assert!(!config.surface_job_failures);
    }

    #[test]
    fn test_missing_required() {
        let vars: Vec<(String, String)> = vec![];
        assert!(envy::from_iter::<_, AppConfig>(vars).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/blog".to_string()),
            ("REDIS_URL".to_string(), "redis://127.0.0.1/".to_string()),
            ("JOB_TIMEOUT_SECS".to_string(), "0".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("JOB_TIMEOUT_SECS")));
    }

    #[test]
    fn test_zero_lease_and_concurrency_rejected() {
        let base = || {
            vec![
                ("DATABASE_URL".to_string(), "postgres://localhost/blog".to_string()),
                ("REDIS_URL".to_string(), "redis://127.0.0.1/".to_string()),
            ]
        };

        let mut vars = base();
        vars.push(("QUEUE_LEASE_SECS".to_string(), "0".to_string()));
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert!(config.validate().is_err());

        let mut vars = base();
        vars.push(("WORKER_CONCURRENCY".to_string(), "0".to_string()));
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert!(config.validate().is_err());
    }
}

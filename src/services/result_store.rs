use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::job::{FailureRecord, JobId};

/// Key/value storage with per-key expiry.
///
/// Every operation touches a single key and must be atomic on that key.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Read and delete in one step.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis implementation of [`ExpiringStore`].
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(StoreError::Redis)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::Redis)
    }
}

#[async_trait]
impl ExpiringStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(StoreError::Redis)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(StoreError::Redis)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        conn.exists(key).await.map_err(StoreError::Redis)
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("GETDEL")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(StoreError::Redis)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }
}

/// Typed view over an [`ExpiringStore`] holding job results.
///
/// Key layout:
/// - `artifact:{job_id}` raw artifact bytes, removed on first read
/// - `artifact:{job_id}:failure` JSON [`FailureRecord`]
#[derive(Clone)]
pub struct ResultStore {
    inner: Arc<dyn ExpiringStore>,
}

impl ResultStore {
    pub fn new(inner: Arc<dyn ExpiringStore>) -> Self {
        Self { inner }
    }

    pub fn artifact_key(job_id: &JobId) -> String {
        format!("artifact:{job_id}")
    }

    pub fn failure_key(job_id: &JobId) -> String {
        format!("artifact:{job_id}:failure")
    }

    pub async fn put_artifact(
        &self,
        job_id: &JobId,
        bytes: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.inner
            .set_ex(&Self::artifact_key(job_id), bytes, ttl)
            .await
    }

    pub async fn has_artifact(&self, job_id: &JobId) -> Result<bool, StoreError> {
        self.inner.exists(&Self::artifact_key(job_id)).await
    }

    /// Claim the artifact. Only one caller ever receives the bytes.
    pub async fn take_artifact(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.take(&Self::artifact_key(job_id)).await
    }

    pub async fn put_failure(
        &self,
        record: &FailureRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(record)?;
        self.inner
            .set_ex(&Self::failure_key(&record.job_id), &payload, ttl)
            .await
    }

    pub async fn get_failure(&self, job_id: &JobId) -> Result<Option<FailureRecord>, StoreError> {
        match self.inner.get(&Self::failure_key(job_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed stored record: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryStore;

    fn store() -> ResultStore {
        ResultStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_key_layout() {
        let job_id: JobId = "a1b2c3d4e5f60718293a4b5c6d7e8f90".parse().unwrap();
        assert_eq!(
            ResultStore::artifact_key(&job_id),
            "artifact:a1b2c3d4e5f60718293a4b5c6d7e8f90"
        );
        assert_eq!(
            ResultStore::failure_key(&job_id),
            "artifact:a1b2c3d4e5f60718293a4b5c6d7e8f90:failure"
        );
    }

    #[tokio::test]
    async fn test_take_is_one_shot() {
        let store = store();
        let job_id = JobId::new();
        store
            .put_artifact(&job_id, b"%PDF", Duration::from_secs(600))
            .await
            .unwrap();

        assert!(store.has_artifact(&job_id).await.unwrap());
        assert_eq!(store.take_artifact(&job_id).await.unwrap(), Some(b"%PDF".to_vec()));
        assert_eq!(store.take_artifact(&job_id).await.unwrap(), None);
        assert!(!store.has_artifact(&job_id).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_artifact_expires_after_ttl() {
        let store = store();
        let job_id = JobId::new();
        let ttl = Duration::from_secs(600);
        store.put_artifact(&job_id, b"%PDF", ttl).await.unwrap();

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        assert!(store.has_artifact(&job_id).await.unwrap());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!store.has_artifact(&job_id).await.unwrap());
        assert_eq!(store.take_artifact(&job_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_record_round_trip() {
        let store = store();
        let job_id = JobId::new();
        assert_eq!(store.get_failure(&job_id).await.unwrap(), None);

        let record = FailureRecord::new(job_id.clone(), "blog 999 does not exist");
        store
            .put_failure(&record, Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(store.get_failure(&job_id).await.unwrap(), Some(record));
        // A failure never counts as an artifact.
        assert!(!store.has_artifact(&job_id).await.unwrap());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::models::job::QueuedJob;

const QUEUE_KEY: &str = "blogpress:jobs";
const CONSUMERS_KEY: &str = "blogpress:consumers";
const CONNECT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// A job handed to one consumer, together with the exact payload it was
/// stored as so it can be acknowledged byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub job: QueuedJob,
    payload: String,
}

impl Delivery {
    pub fn new(job: QueuedJob, payload: String) -> Self {
        Self { job, payload }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Dispatch channel between request handlers and workers.
///
/// Delivery is at-least-once. Each consumer parks the jobs it dequeued in
/// its own processing list and holds a lease on that list, kept alive by
/// [`JobQueue::heartbeat`]. [`JobQueue::recover_in_flight`] only requeues
/// jobs whose holder's lease has lapsed, so a live consumer never has its
/// work handed to someone else.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job without waiting for it to run.
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Take the next job, moving it to this consumer's processing list.
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a dequeued job.
    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Renew this consumer's lease on its in-flight jobs.
    async fn heartbeat(&self) -> Result<(), QueueError>;

    /// Requeue jobs held by consumers whose lease expired.
    async fn recover_in_flight(&self) -> Result<usize, QueueError>;

    /// Current number of pending jobs.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}

/// Redis-list-backed job queue.
///
/// Every handle is a distinct consumer: `blogpress:processing:{id}` holds
/// its in-flight payloads and `blogpress:lease:{id}` expires when it stops
/// heartbeating. Known consumer ids are tracked in `blogpress:consumers`.
pub struct RedisJobQueue {
    client: redis::Client,
    consumer_id: String,
    lease: Duration,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            consumer_id: Uuid::new_v4().simple().to_string(),
            lease: DEFAULT_LEASE,
        })
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Open the queue and wait for the broker to answer, backing off
    /// exponentially between attempts.
    pub async fn connect_with_retry(redis_url: &str, attempts: u32) -> Result<Self, QueueError> {
        let queue = Self::new(redis_url)?;
        let mut delay = CONNECT_BASE_DELAY;
        let mut attempt = 1;

        loop {
            match queue.ping().await {
                Ok(()) => return Ok(queue),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Broker unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    fn processing_key(consumer_id: &str) -> String {
        format!("blogpress:processing:{consumer_id}")
    }

    fn lease_key(consumer_id: &str) -> String {
        format!("blogpress:lease:{consumer_id}")
    }

    async fn renew(&self, conn: &mut redis::aio::MultiplexedConnection) -> Result<(), QueueError> {
        conn.sadd::<_, _, ()>(CONSUMERS_KEY, &self.consumer_id)
            .await
            .map_err(QueueError::Redis)?;
        conn.set_ex::<_, _, ()>(
            Self::lease_key(&self.consumer_id),
            1,
            self.lease.as_secs().max(1),
        )
        .await
        .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        // The lease must exist before the job lands in our list.
        self.renew(&mut conn).await?;

        let processing = Self::processing_key(&self.consumer_id);
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, &processing)
            .await
            .map_err(QueueError::Redis)?;

        let Some(payload) = result else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(job) => Ok(Some(Delivery::new(job, payload))),
            Err(e) => {
                // Poison message: drop it so it is not redelivered forever.
                conn.lrem::<_, _, ()>(&processing, 1, &payload)
                    .await
                    .map_err(QueueError::Redis)?;
                Err(QueueError::Poison {
                    payload,
                    source: e,
                })
            }
        }
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(Self::processing_key(&self.consumer_id), 1, delivery.payload())
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        self.renew(&mut conn).await
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        let consumers: Vec<String> = conn
            .smembers(CONSUMERS_KEY)
            .await
            .map_err(QueueError::Redis)?;

        let mut recovered = 0;
        for consumer in consumers {
            if consumer == self.consumer_id {
                continue;
            }
            let alive: bool = conn
                .exists(Self::lease_key(&consumer))
                .await
                .map_err(QueueError::Redis)?;
            if alive {
                continue;
            }

            // RPOPLPUSH moves each payload atomically, so concurrent
            // recoverers never requeue the same entry twice.
            let processing = Self::processing_key(&consumer);
            loop {
                let moved: Option<String> = conn
                    .rpoplpush(&processing, QUEUE_KEY)
                    .await
                    .map_err(QueueError::Redis)?;
                if moved.is_none() {
                    break;
                }
                recovered += 1;
            }
            conn.srem::<_, _, ()>(CONSUMERS_KEY, &consumer)
                .await
                .map_err(QueueError::Redis)?;
            tracing::info!(consumer = %consumer, "Released expired consumer");
        }
        Ok(recovered)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Undecodable job payload {payload:?}: {source}")]
    Poison {
        payload: String,
        source: serde_json::Error,
    },

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

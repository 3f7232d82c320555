//! In-process implementations of the store and queue seams.
//!
//! They follow the same contracts as the Redis and Postgres backends and
//! are used to exercise the job lifecycle without external services.
//! Expiry is measured with `tokio::time::Instant`, so tests can drive it
//! with a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::models::blog::{BlogContent, BlogQuery, Comment, Page};
use crate::models::job::QueuedJob;
use crate::services::content::{ContentError, ContentStore};
use crate::services::queue::{Delivery, JobQueue, QueueError, DEFAULT_LEASE};
use crate::services::result_store::{ExpiringStore, StoreError};

/// Expiring key/value map.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|(_, deadline)| *deadline > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let deadline = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_vec(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some((_, deadline)) => *deadline <= Instant::now(),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.remove(key) {
            Some((value, deadline)) if deadline > Instant::now() => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
struct Broker {
    pending: VecDeque<String>,
    processing: HashMap<u64, Vec<String>>,
    leases: HashMap<u64, Instant>,
}

/// FIFO queue with per-consumer processing lists and leases, mirroring the
/// Redis layout. Handles made with [`MemoryJobQueue::consumer`] share one
/// broker, the way separate worker processes share one Redis.
pub struct MemoryJobQueue {
    broker: Arc<Mutex<Broker>>,
    available: Arc<AtomicBool>,
    next_consumer: Arc<AtomicU64>,
    consumer: u64,
    lease: Duration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self {
            broker: Arc::new(Mutex::new(Broker::default())),
            available: Arc::new(AtomicBool::new(true)),
            next_consumer: Arc::new(AtomicU64::new(1)),
            consumer: 0,
            lease: DEFAULT_LEASE,
        }
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Another consumer on the same broker.
    pub fn consumer(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            available: Arc::clone(&self.available),
            next_consumer: Arc::clone(&self.next_consumer),
            consumer: self.next_consumer.fetch_add(1, Ordering::SeqCst),
            lease: self.lease,
        }
    }

    /// Simulate the broker going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drop this consumer's lease as if its process had died.
    pub async fn abandon_lease(&self) {
        self.broker.lock().await.leases.remove(&self.consumer);
    }

    /// Jobs dequeued but not yet completed, across all consumers.
    pub async fn in_flight(&self) -> usize {
        self.broker.lock().await.processing.values().map(Vec::len).sum()
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable("broker unreachable".to_string()))
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.check_available()?;
        let payload = serde_json::to_string(job)?;
        self.broker.lock().await.pending.push_back(payload);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        self.check_available()?;
        let mut broker = self.broker.lock().await;
        broker.leases.insert(self.consumer, Instant::now() + self.lease);
        let Some(payload) = broker.pending.pop_front() else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(job) => {
                broker
                    .processing
                    .entry(self.consumer)
                    .or_default()
                    .push(payload.clone());
                Ok(Some(Delivery::new(job, payload)))
            }
            Err(e) => Err(QueueError::Poison { payload, source: e }),
        }
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.check_available()?;
        let mut broker = self.broker.lock().await;
        if let Some(list) = broker.processing.get_mut(&self.consumer) {
            if let Some(pos) = list.iter().position(|p| p == delivery.payload()) {
                list.remove(pos);
            }
        }
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), QueueError> {
        self.check_available()?;
        self.broker
            .lock()
            .await
            .leases
            .insert(self.consumer, Instant::now() + self.lease);
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        self.check_available()?;
        let now = Instant::now();
        let mut guard = self.broker.lock().await;
        let broker = &mut *guard;

        let expired: Vec<u64> = broker
            .processing
            .keys()
            .copied()
            .filter(|id| *id != self.consumer)
            .filter(|id| broker.leases.get(id).map_or(true, |deadline| *deadline <= now))
            .collect();

        let mut recovered = 0;
        for id in expired {
            if let Some(list) = broker.processing.remove(&id) {
                recovered += list.len();
                broker.pending.extend(list);
            }
            broker.leases.remove(&id);
        }
        Ok(recovered)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        self.check_available()?;
        Ok(self.broker.lock().await.pending.len() as u64)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check_available()
    }
}

/// Content store over a map of posts and a list of comments.
#[derive(Default)]
pub struct MemoryContentStore {
    blogs: RwLock<HashMap<i64, BlogContent>>,
    comments: RwLock<Vec<Comment>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, blog: BlogContent) {
        self.blogs.write().await.insert(blog.id, blog);
    }

    pub async fn remove(&self, content_id: i64) {
        self.blogs.write().await.remove(&content_id);
        self.comments
            .write()
            .await
            .retain(|c| c.blog_id != content_id);
    }

    pub async fn insert_comment(&self, comment: Comment) {
        self.comments.write().await.push(comment);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_by_id(&self, content_id: i64) -> Result<Option<BlogContent>, ContentError> {
        Ok(self.blogs.read().await.get(&content_id).cloned())
    }

    async fn list(&self, query: &BlogQuery) -> Result<Page<BlogContent>, ContentError> {
        let search = query.search();
        let mut matching: Vec<BlogContent> = self
            .blogs
            .read()
            .await
            .values()
            .filter(|b| search.map_or(true, |q| b.title.contains(q) || b.tag.contains(q)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(Page::slice(matching, query.page()))
    }

    async fn comments(&self, blog_id: i64, page: u32) -> Result<Page<Comment>, ContentError> {
        let mut thread: Vec<Comment> = self
            .comments
            .read()
            .await
            .iter()
            .filter(|c| c.blog_id == blog_id)
            .cloned()
            .collect();
        thread.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(Page::slice(thread, page))
    }

    async fn ping(&self) -> Result<(), ContentError> {
        Ok(())
    }
}

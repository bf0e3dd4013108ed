//! Per-topic conversation logs.
//!
//! A log is an append-only, ordered sequence of [`Message`]s keyed by
//! [`TopicId`]. Logs are created lazily on first append and are independent
//! of one another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use socialflow_shared::{Message, Result, RetentionPolicy, TopicId};
use socialflow_storage::Storage;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// Append-only message log per topic.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append `message` to the end of the topic's log, creating it if needed.
    async fn append(&self, topic: &TopicId, message: &Message) -> Result<()>;

    /// Messages in insertion order. Unknown topics yield an empty log.
    async fn list(&self, topic: &TopicId) -> Result<Vec<Message>>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

struct TopicLog {
    messages: Vec<Message>,
    last_touched: Instant,
}

/// Process-local store with explicit retention.
///
/// Retention acts on whole topic logs: a log idle for longer than the TTL reads
/// as empty and is swept on the next append; when `max_topics` logs exist, the
/// first append to a new topic evicts the least recently appended log.
///
/// With [`with_turn_locks`](Self::with_turn_locks), a topic whose turn lock is
/// held is never chosen for eviction. If every log has an open turn the store
/// grows past `max_topics` until one closes.
pub struct InMemoryConversationStore {
    logs: RwLock<HashMap<TopicId, TopicLog>>,
    retention: RetentionPolicy,
    turn_locks: Option<Arc<TopicLocks>>,
}

impl InMemoryConversationStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            retention,
            turn_locks: None,
        }
    }

    /// Protect topics with an open turn in `locks` from capacity eviction.
    pub fn with_turn_locks(mut self, locks: Arc<TopicLocks>) -> Self {
        self.turn_locks = Some(locks);
        self
    }

    fn has_open_turn(&self, topic: &TopicId) -> bool {
        self.turn_locks
            .as_ref()
            .is_some_and(|locks| locks.is_held(topic))
    }

    /// Number of topic logs currently held (expired ones included until swept).
    pub async fn topic_count(&self) -> usize {
        self.logs.read().await.len()
    }

    fn is_expired(&self, log: &TopicLog, now: Instant) -> bool {
        self.retention
            .ttl
            .is_some_and(|ttl| now.duration_since(log.last_touched) >= ttl)
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, topic: &TopicId, message: &Message) -> Result<()> {
        let now = Instant::now();
        let mut logs = self.logs.write().await;

        if self.retention.ttl.is_some() {
            let before = logs.len();
            logs.retain(|_, log| !self.is_expired(log, now));
            if logs.len() < before {
                debug!(expired = before - logs.len(), "swept idle topic logs");
            }
        }

        if let Some(max) = self.retention.max_topics {
            if !logs.contains_key(topic) && logs.len() >= max {
                let oldest = logs
                    .iter()
                    .filter(|(id, _)| !self.has_open_turn(id))
                    .min_by_key(|(_, log)| log.last_touched)
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(oldest) => {
                        logs.remove(&oldest);
                        debug!(topic = %oldest, "evicted least recently used topic log");
                    }
                    None => debug!(
                        topics = logs.len(),
                        "every topic log has an open turn, keeping all"
                    ),
                }
            }
        }

        let log = logs.entry(topic.clone()).or_insert_with(|| TopicLog {
            messages: Vec::new(),
            last_touched: now,
        });
        log.messages.push(message.clone());
        log.last_touched = now;
        Ok(())
    }

    async fn list(&self, topic: &TopicId) -> Result<Vec<Message>> {
        let logs = self.logs.read().await;
        Ok(match logs.get(topic) {
            Some(log) if !self.is_expired(log, Instant::now()) => log.messages.clone(),
            _ => Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Database-backed store
// ---------------------------------------------------------------------------

#[async_trait]
impl ConversationStore for Storage {
    async fn append(&self, topic: &TopicId, message: &Message) -> Result<()> {
        self.append_message(topic, message).await
    }

    async fn list(&self, topic: &TopicId) -> Result<Vec<Message>> {
        self.list_messages(topic).await
    }
}

// ---------------------------------------------------------------------------
// Topic locks
// ---------------------------------------------------------------------------

/// Prune idle lock entries once the map grows past this size.
const LOCK_PRUNE_THRESHOLD: usize = 256;

/// One FIFO async mutex per topic.
///
/// Holding the guard serializes a whole read-assemble-append turn, so turns on
/// the same topic never interleave and run in arrival order. Different topics
/// never contend.
#[derive(Default)]
pub struct TopicLocks {
    locks: Mutex<HashMap<TopicId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TopicLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `topic`.
    pub async fn acquire(&self, topic: &TopicId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(topic.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Whether a turn currently holds (or is about to be handed) `topic`.
    pub fn is_held(&self, topic: &TopicId) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(topic)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

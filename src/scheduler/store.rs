//! List + hash storage backing the job queue.
//!
//! The queue only needs four primitives: push to the head of a list, pop from
//! its tail, and set/read fields of a hash. [`RedisQueueStore`] maps them to
//! LPUSH/RPOP/HSET/HGETALL, each of which is atomic on the server, so no
//! in-process locking is needed. [`MemoryQueueStore`] provides the same
//! semantics in-process for tests and single-binary runs.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::queue::QueueError;

/// Storage primitives used by [`super::JobQueue`].
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Push `value` onto the head of `list`.
    async fn push_front(&self, list: &str, value: &str) -> Result<(), QueueError>;

    /// Pop the tail of `list`, or `None` if it is empty.
    async fn pop_back(&self, list: &str) -> Result<Option<String>, QueueError>;

    /// Number of entries in `list`.
    async fn list_len(&self, list: &str) -> Result<usize, QueueError>;

    /// Set several fields of the hash at `key`, creating it if needed.
    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), QueueError>;

    /// All fields of the hash at `key`; empty when the key does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, QueueError>;
}

/// Redis-backed queue storage.
#[derive(Clone)]
pub struct RedisQueueStore {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
}

impl RedisQueueStore {
    /// Connect to Redis at `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push_front(&self, list: &str, value: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(list, value).await?;
        Ok(())
    }

    async fn pop_back(&self, list: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.rpop(list, None).await?;
        Ok(value)
    }

    async fn list_len(&self, list: &str) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(list).await?;
        Ok(len)
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), QueueError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.redis.clone();
        conn.hset_multiple::<_, _, _, ()>(key, fields).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, QueueError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }
}

/// In-process queue storage with the same semantics as Redis.
#[derive(Default)]
pub struct MemoryQueueStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push_front(&self, list: &str, value: &str) -> Result<(), QueueError> {
        self.lists
            .lock()
            .await
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn pop_back(&self, list: &str) -> Result<Option<String>, QueueError> {
        Ok(self
            .lists
            .lock()
            .await
            .get_mut(list)
            .and_then(VecDeque::pop_back))
    }

    async fn list_len(&self, list: &str) -> Result<usize, QueueError> {
        Ok(self.lists.lock().await.get(list).map_or(0, VecDeque::len))
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), QueueError> {
        let mut hashes = self.hashes.lock().await;
        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, QueueError> {
        Ok(self
            .hashes
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_list_is_fifo_across_ends() {
        let store = MemoryQueueStore::new();
        store.push_front("q", "a").await.unwrap();
        store.push_front("q", "b").await.unwrap();
        assert_eq!(store.list_len("q").await.unwrap(), 2);

        assert_eq!(store.pop_back("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop_back("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.pop_back("q").await.unwrap(), None);
        assert_eq!(store.pop_back("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_hash_merges_fields() {
        let store = MemoryQueueStore::new();
        store
            .hash_set("h", &[("a", "1".to_string()), ("b", "2".to_string())])
            .await
            .unwrap();
        store.hash_set("h", &[("b", "3".to_string())]).await.unwrap();

        let fields = store.hash_get_all("h").await.unwrap();
        assert_eq!(fields.get("a").map(String::as_str), Some("1"));
        assert_eq!(fields.get("b").map(String::as_str), Some("3"));
        assert!(store.hash_get_all("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redis_connect_invalid_url() {
        let result = RedisQueueStore::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(QueueError::ConnectionFailed(_))));
    }
}

//! Queue store abstraction for ingress, egress, and dead-letter queues.
//!
//! Provides a trait-based seam over the queue primitives so the engine can be
//! tested without a running Redis. The production implementation maps `push`
//! to LPUSH and `blocking_pop_any` to BLPOP across every configured key; the
//! pop is the single atomic coordination point between competing workers.

use std::{future::Future, pin::Pin, time::Duration};

use redis::{aio::ConnectionManager, AsyncCommands};

use crate::{
    error::Result,
    models::RecordId,
};

/// Queue primitives required by the processing engine.
///
/// One uniform `push` serves egress forwarding, dead-letter routing, and the
/// shutdown requeue path. Pushes go to the head of the queue and pops come
/// off the head, so a record forwarded through a single hop keeps its place
/// relative to its neighbours.
pub trait QueueStore: Send + Sync + 'static {
    /// Pushes a record identifier onto the head of a queue.
    fn push<'a>(
        &'a self,
        queue: &'a str,
        id: &'a RecordId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Blocks until any of the given queues yields an identifier, or the
    /// timeout elapses.
    ///
    /// Returns the originating queue name together with the identifier so
    /// the caller can resolve the owning chain (and requeue on shutdown).
    /// `Ok(None)` on timeout is not an error; the consumer loop simply runs
    /// another iteration.
    fn blocking_pop_any<'a>(
        &'a self,
        queues: &'a [String],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(String, RecordId)>>> + Send + 'a>>;

    /// Current depth of a queue. Used by tests and operational logging.
    fn len<'a>(
        &'a self,
        queue: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>;
}

/// Production queue store backed by Redis lists.
///
/// Uses a multiplexed connection manager that reconnects transparently, so
/// one store handle can be shared by every worker in the pool.
#[derive(Clone)]
pub struct RedisQueueStore {
    manager: ConnectionManager,
}

impl RedisQueueStore {
    /// Connects to Redis at the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the initial connection
    /// cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

impl QueueStore for RedisQueueStore {
    fn push<'a>(
        &'a self,
        queue: &'a str,
        id: &'a RecordId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let mut conn = self.manager.clone();
        Box::pin(async move {
            let _: () = conn.lpush(queue, id.as_str()).await?;
            Ok(())
        })
    }

    fn blocking_pop_any<'a>(
        &'a self,
        queues: &'a [String],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(String, RecordId)>>> + Send + 'a>> {
        let mut conn = self.manager.clone();
        Box::pin(async move {
            // BLPOP with a zero timeout would block forever; the engine
            // always passes a bounded timeout so shutdown stays responsive.
            let popped: Option<(String, String)> =
                conn.blpop(queues, timeout.as_secs_f64()).await?;
            Ok(popped.map(|(queue, id)| (queue, RecordId::new(id))))
        })
    }

    fn len<'a>(
        &'a self,
        queue: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
        let mut conn = self.manager.clone();
        Box::pin(async move {
            let depth: usize = conn.llen(queue).await?;
            Ok(depth)
        })
    }
}

pub mod mock {
    //! In-memory queue store for testing.
    //!
    //! Deterministic, dependency-free stand-in for the Redis store. Supports
    //! injecting push failures per queue to exercise the wrap-up isolation
    //! paths.

    use std::{
        collections::{HashMap, HashSet, VecDeque},
        future::Future,
        pin::Pin,
        sync::Arc,
        time::Duration,
    };

    use tokio::{sync::RwLock, time::Instant};

    use super::QueueStore;
    use crate::{
        error::{CoreError, Result},
        models::RecordId,
    };

    const POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// In-memory queue store with head-push/head-pop semantics matching the
    /// Redis implementation.
    #[derive(Clone, Default)]
    pub struct InMemoryQueueStore {
        queues: Arc<RwLock<HashMap<String, VecDeque<RecordId>>>>,
        failing_pushes: Arc<RwLock<HashSet<String>>>,
    }

    impl InMemoryQueueStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent push to the given queue fail.
        pub async fn fail_pushes_to(&self, queue: &str) {
            self.failing_pushes.write().await.insert(queue.to_string());
        }

        /// Returns the current contents of a queue, head first.
        pub async fn contents(&self, queue: &str) -> Vec<RecordId> {
            self.queues
                .read()
                .await
                .get(queue)
                .map(|items| items.iter().cloned().collect())
                .unwrap_or_default()
        }

        /// Returns the current depth of a queue.
        pub async fn depth(&self, queue: &str) -> usize {
            self.queues.read().await.get(queue).map_or(0, VecDeque::len)
        }

        async fn try_pop(&self, queues: &[String]) -> Option<(String, RecordId)> {
            let mut map = self.queues.write().await;
            for queue in queues {
                if let Some(id) = map.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Some((queue.clone(), id));
                }
            }
            None
        }
    }

    impl QueueStore for InMemoryQueueStore {
        fn push<'a>(
            &'a self,
            queue: &'a str,
            id: &'a RecordId,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async move {
                if self.failing_pushes.read().await.contains(queue) {
                    return Err(CoreError::Queue(format!("injected push failure for {queue}")));
                }
                self.queues
                    .write()
                    .await
                    .entry(queue.to_string())
                    .or_default()
                    .push_front(id.clone());
                Ok(())
            })
        }

        fn blocking_pop_any<'a>(
            &'a self,
            queues: &'a [String],
            timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<Option<(String, RecordId)>>> + Send + 'a>>
        {
            Box::pin(async move {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(popped) = self.try_pop(queues).await {
                        return Ok(Some(popped));
                    }
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            })
        }

        fn len<'a>(
            &'a self,
            queue: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
            Box::pin(async move { Ok(self.depth(queue).await) })
        }
    }
}

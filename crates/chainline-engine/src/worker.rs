//! Chain processing engine with competing-consumer workers.
//!
//! The engine orchestrates record processing using a pool of async workers
//! that block on a pop across every configured ingress queue and run each
//! popped record through its queue's chain. The queue store's atomic pop is
//! the only coordination point between workers.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chainline_core::{ChainConfig, ConfigSource, LinkOptions, QueueStore, RecordId};
use tokio::{sync::RwLock, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    dlq::DeadLetterRouter,
    error::Result,
    executor::ChainExecutor,
    link::LinkRegistry,
    resolver::{ChainResolver, RouteMap},
    storage::StorageRegistry,
    worker_pool::WorkerPool,
};

/// Configuration for the chain processing engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,

    /// Bounded blocking-pop timeout. Also the upper bound on how long a
    /// shutdown signal can go unobserved by an idle worker.
    pub pop_timeout: Duration,

    /// Run storage backends concurrently during wrap-up.
    pub parallel_storage: bool,

    /// Maximum time to wait for workers to finish their in-flight pass.
    pub shutdown_timeout: Duration,

    /// Backoff after a failed chain configuration reload.
    pub reload_backoff: Duration,

    /// Explicit per-link invocation options, merged over each link's
    /// defaults key by key.
    pub link_options: HashMap<String, LinkOptions>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            pop_timeout: Duration::from_secs(crate::DEFAULT_POP_TIMEOUT_SECONDS),
            parallel_storage: false,
            shutdown_timeout: Duration::from_secs(crate::DEFAULT_SHUTDOWN_TIMEOUT_SECONDS),
            reload_backoff: Duration::from_secs(5),
            link_options: HashMap::new(),
        }
    }
}

/// Statistics for engine monitoring.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Number of active workers.
    pub active_workers: usize,
    /// Records that completed a chain pass, including halted ones.
    pub records_processed: u64,
    /// Records whose chain pass failed fatally.
    pub records_failed: u64,
    /// Failed records successfully pushed onto their DLQ.
    pub records_dead_lettered: u64,
    /// Individual storage backend save failures.
    pub storage_failures: u64,
    /// Records currently inside a chain pass.
    pub in_flight: u64,
}

/// Shared services every worker needs: the queue store, the two registries,
/// and the chain configuration source.
pub struct EngineContext {
    /// Queue store backing ingress, egress, and dead-letter queues.
    pub queues: Arc<dyn QueueStore>,
    /// Link implementations resolvable by name.
    pub links: Arc<LinkRegistry>,
    /// Storage backends resolvable by name.
    pub storages: Arc<StorageRegistry>,
    /// Source of chain configuration snapshots, re-read every iteration.
    pub chains: Arc<dyn ConfigSource>,
}

impl EngineContext {
    /// Bundles the shared services for worker construction.
    pub fn new(
        queues: Arc<dyn QueueStore>,
        links: Arc<LinkRegistry>,
        storages: Arc<StorageRegistry>,
        chains: Arc<dyn ConfigSource>,
    ) -> Self {
        Self { queues, links, storages, chains }
    }
}

/// Main engine coordinating chain processing workers.
pub struct Engine {
    context: Arc<EngineContext>,
    config: EngineConfig,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_pool: Option<WorkerPool>,
}

impl Engine {
    /// Creates a new engine over the given context.
    ///
    /// A zero worker count is clamped to one: an engine with no workers
    /// would consume nothing and look healthy doing it.
    pub fn new(context: EngineContext, mut config: EngineConfig) -> Self {
        if config.worker_count == 0 {
            warn!("worker_count of 0 clamped to 1");
            config.worker_count = 1;
        }

        Self {
            context: Arc::new(context),
            config,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            cancellation_token: CancellationToken::new(),
            worker_pool: None,
        }
    }

    /// Starts the engine with the configured worker pool.
    ///
    /// Returns immediately after spawning workers. Use `shutdown()` to stop
    /// gracefully, or drop the engine to cancel workers immediately.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            worker_count = self.config.worker_count,
            pop_timeout_secs = self.config.pop_timeout.as_secs(),
            parallel_storage = self.config.parallel_storage,
            "starting chain processing engine"
        );

        let mut worker_pool = WorkerPool::new(
            self.context.clone(),
            self.config.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
        );

        worker_pool.spawn_workers().await?;
        self.worker_pool = Some(worker_pool);

        info!("engine started");
        Ok(())
    }

    /// Gracefully shuts down the engine.
    ///
    /// Signals all workers to stop and waits for in-flight chain passes to
    /// complete. Workers only observe the signal at the idle boundary, so
    /// shutdown can take up to one pop timeout plus the longest in-flight
    /// pass, bounded by the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutdownTimeout` if workers do not finish in
    /// time, or `EngineError::WorkerPanic` if a worker task panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down chain processing engine");

        if let Some(worker_pool) = self.worker_pool.take() {
            worker_pool.shutdown_graceful(self.config.shutdown_timeout).await
        } else {
            info!("engine was not started, shutdown completed immediately");
            Ok(())
        }
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Token cancelled when shutdown begins.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Runs a single record through a chain without going near a queue pop.
    ///
    /// Intended for tests and administrative replay tooling; production
    /// traffic flows through the worker loop.
    ///
    /// # Errors
    ///
    /// Returns the chain pass error; the record is not dead-lettered.
    pub async fn process_one(&self, chain: &ChainConfig, record_id: RecordId) -> Result<()> {
        let executor = ChainExecutor::new(
            self.context.links.clone(),
            self.context.storages.clone(),
            self.context.queues.clone(),
            self.config.link_options.clone(),
            self.config.parallel_storage,
            self.stats.clone(),
        );
        executor.process(chain, record_id).await
    }
}

/// Individual worker competing for records across all ingress queues.
pub struct Worker {
    id: usize,
    context: Arc<EngineContext>,
    config: EngineConfig,
    executor: ChainExecutor,
    dlq: DeadLetterRouter,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
}

impl Worker {
    /// Creates a new worker with the given id and shared context.
    pub fn new(
        id: usize,
        context: Arc<EngineContext>,
        config: EngineConfig,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let executor = ChainExecutor::new(
            context.links.clone(),
            context.storages.clone(),
            context.queues.clone(),
            config.link_options.clone(),
            config.parallel_storage,
            stats.clone(),
        );
        let dlq = DeadLetterRouter::new(context.queues.clone());

        Self { id, context, config, executor, dlq, stats, cancellation_token }
    }

    /// Main worker loop: resolve routes, pop, process, repeat until
    /// cancelled.
    ///
    /// Cancellation is only observed between records. A record popped while
    /// shutdown was already signalled is pushed back onto its originating
    /// queue instead of being processed, preserving at-least-once semantics
    /// without abandoning an in-flight pop.
    pub async fn run(&self) -> Result<()> {
        info!(worker_id = self.id, "worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(worker_id = self.id, "worker received shutdown signal");
                break;
            }

            // Fresh routing table every iteration; this is what makes chain
            // configuration hot-reloadable without any reload signal.
            let routes = match self.resolve_routes().await {
                Ok(routes) => routes,
                Err(error) => {
                    error!(
                        worker_id = self.id,
                        error = %error,
                        "chain configuration unusable, backing off"
                    );
                    tokio::select! {
                        () = sleep(self.config.reload_backoff) => continue,
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            };

            if routes.is_empty() {
                debug!(worker_id = self.id, "no enabled chains, idling");
                tokio::select! {
                    () = sleep(self.config.pop_timeout) => continue,
                    () = self.cancellation_token.cancelled() => break,
                }
            }

            let mut queues: Vec<String> = routes.keys().cloned().collect();
            queues.sort_unstable();

            // The pop future is never raced against cancellation: abandoning
            // it after the store has already handed over a record would lose
            // that record.
            let popped = match self.context.queues.blocking_pop_any(&queues, self.config.pop_timeout).await
            {
                Ok(popped) => popped,
                Err(error) => {
                    error!(
                        worker_id = self.id,
                        error = %error,
                        "blocking pop failed, backing off"
                    );
                    tokio::select! {
                        () = sleep(self.config.reload_backoff) => continue,
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            };

            let Some((queue, record_id)) = popped else {
                continue;
            };

            if self.cancellation_token.is_cancelled() {
                self.requeue(&queue, &record_id).await;
                break;
            }

            match routes.get(&queue) {
                Some(chain) => self.process_record(chain, &queue, record_id).await,
                None => {
                    // Cannot happen for a queue taken from the route map, but
                    // the pop is irreversible so the record must go somewhere.
                    error!(
                        worker_id = self.id,
                        queue = %queue,
                        record_id = %record_id,
                        "popped from a queue with no chain"
                    );
                    self.dead_letter(&queue, &record_id).await;
                },
            }
        }

        info!(worker_id = self.id, "worker stopped");
        Ok(())
    }

    /// Loads a fresh configuration snapshot and builds the routing table.
    async fn resolve_routes(&self) -> Result<RouteMap> {
        let snapshot = self.context.chains.load().await?;
        ChainResolver::resolve(&snapshot)
    }

    /// Runs one popped record through its chain, dead-lettering on fatal
    /// failure.
    async fn process_record(&self, chain: &ChainConfig, queue: &str, record_id: RecordId) {
        {
            let mut stats = self.stats.write().await;
            stats.in_flight += 1;
        }

        let result = self.executor.process(chain, record_id.clone()).await;

        {
            let mut stats = self.stats.write().await;
            stats.in_flight -= 1;
        }

        match result {
            Ok(()) => {
                let mut stats = self.stats.write().await;
                stats.records_processed += 1;
            },
            Err(error) => {
                error!(
                    worker_id = self.id,
                    chain = %chain.name,
                    queue = %queue,
                    record_id = %record_id,
                    error = %error,
                    "chain pass failed, dead-lettering record"
                );
                {
                    let mut stats = self.stats.write().await;
                    stats.records_failed += 1;
                }
                self.dead_letter(queue, &record_id).await;
            },
        }
    }

    /// Pushes a fatally failed record onto its ingress queue's DLQ.
    async fn dead_letter(&self, queue: &str, record_id: &RecordId) {
        match self.dlq.route(queue, record_id).await {
            Ok(()) => {
                let mut stats = self.stats.write().await;
                stats.records_dead_lettered += 1;
            },
            Err(error) => {
                error!(
                    worker_id = self.id,
                    queue = %queue,
                    record_id = %record_id,
                    error = %error,
                    "record lost: dead-letter push failed after irreversible pop"
                );
            },
        }
    }

    /// Pushes a record popped during shutdown back onto its origin queue.
    async fn requeue(&self, queue: &str, record_id: &RecordId) {
        match self.context.queues.push(queue, record_id).await {
            Ok(()) => {
                info!(
                    worker_id = self.id,
                    queue = %queue,
                    record_id = %record_id,
                    "requeued record popped during shutdown"
                );
            },
            Err(error) => {
                error!(
                    worker_id = self.id,
                    queue = %queue,
                    record_id = %record_id,
                    error = %error,
                    "record lost: requeue failed during shutdown"
                );
            },
        }
    }
}

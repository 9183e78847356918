//! Chain executor: the sequential link loop and the wrap-up fan-out.
//!
//! One executor instance is owned by each worker. Execution of a chain pass
//! is strictly sequential over the declared link order; the only concurrency
//! here is the optional storage fan-out during wrap-up, bounded to the
//! number of configured backends.

use std::{collections::HashMap, sync::Arc, time::Instant};

use chainline_core::{merge_options, ChainConfig, LinkOptions, QueueStore, RecordId};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    error::{EngineError, Result},
    link::{Link, LinkRegistry, LinkResult},
    storage::{StorageBackend, StorageRegistry},
    worker::EngineStats,
};

/// Runs one record through one chain: link loop, timing, wrap-up.
pub struct ChainExecutor {
    links: Arc<LinkRegistry>,
    storages: Arc<StorageRegistry>,
    queues: Arc<dyn QueueStore>,
    link_options: HashMap<String, LinkOptions>,
    parallel_storage: bool,
    stats: Arc<RwLock<EngineStats>>,
}

impl ChainExecutor {
    /// Creates an executor over shared registries and the queue store.
    pub fn new(
        links: Arc<LinkRegistry>,
        storages: Arc<StorageRegistry>,
        queues: Arc<dyn QueueStore>,
        link_options: HashMap<String, LinkOptions>,
        parallel_storage: bool,
        stats: Arc<RwLock<EngineStats>>,
    ) -> Self {
        Self { links, storages, queues, link_options, parallel_storage, stats }
    }

    /// Processes one record through the given chain.
    ///
    /// Links run strictly in declared order. `Continue` replaces the working
    /// id, `Halt` stops the loop early, and an error propagates without
    /// running wrap-up so the caller can dead-letter the record. On normal
    /// completion wrap-up always runs, even for an empty link list.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any link executes if the chain
    /// references an unresolvable link name, or the failing link's error.
    pub async fn process(&self, chain: &ChainConfig, record_id: RecordId) -> Result<()> {
        let started = Instant::now();

        // Resolve every link up front: a chain referencing an unknown name
        // must fail before any link runs, never partway through.
        let resolved: Vec<(String, Arc<dyn Link>)> = chain
            .links
            .iter()
            .map(|name| self.links.resolve(name).map(|link| (name.clone(), link)))
            .collect::<Result<_>>()?;

        if let Some(timeout) = chain.timeout() {
            debug!(
                chain = %chain.name,
                timeout_secs = timeout.as_secs(),
                "chain timeout is advisory and not enforced"
            );
        }

        let mut current = record_id;
        for (name, link) in &resolved {
            let merged = self.merged_options(name, link.as_ref());
            let link_started = Instant::now();

            let result = link
                .invoke(&current, name, &merged)
                .await
                .map_err(|e| EngineError::link_failed(name.clone(), e.to_string()))?;

            let elapsed_ms = link_started.elapsed().as_millis() as u64;
            match result {
                LinkResult::Continue(next) => {
                    debug!(
                        chain = %chain.name,
                        link = %name,
                        record_id = %next,
                        elapsed_ms,
                        "link completed"
                    );
                    current = next;
                },
                LinkResult::Halt => {
                    debug!(
                        chain = %chain.name,
                        link = %name,
                        record_id = %current,
                        elapsed_ms,
                        "link halted chain"
                    );
                    break;
                },
            }
        }

        self.wrap_up(chain, &current).await;

        info!(
            chain = %chain.name,
            record_id = %current,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chain completed"
        );
        Ok(())
    }

    /// Egress forwarding and storage fan-out.
    ///
    /// Never fails: by this point the record has been accepted into the
    /// pipeline and must not be lost or reprocessed because a downstream
    /// sink is unhealthy. Every failure is caught, logged with enough
    /// context to act on, and isolated from its siblings.
    async fn wrap_up(&self, chain: &ChainConfig, record_id: &RecordId) {
        for queue in &chain.egress_lists {
            if let Err(e) = self.queues.push(queue, record_id).await {
                warn!(
                    chain = %chain.name,
                    queue = %queue,
                    record_id = %record_id,
                    error = %e,
                    "egress push failed"
                );
            }
        }

        let mut backends: Vec<(String, Arc<dyn StorageBackend>, LinkOptions)> =
            Vec::with_capacity(chain.storages.len());
        for name in &chain.storages {
            match self.storages.resolve(name) {
                Ok(backend) => {
                    let options = self.explicit_options(name);
                    backends.push((name.clone(), backend, options));
                },
                Err(e) => {
                    error!(
                        chain = %chain.name,
                        backend = %name,
                        record_id = %record_id,
                        error = %e,
                        "storage backend not registered"
                    );
                    self.stats.write().await.storage_failures += 1;
                },
            }
        }

        if self.parallel_storage && backends.len() >= 2 {
            let saves = backends.iter().map(|(name, backend, options)| async move {
                (name.as_str(), backend.save(record_id, options).await)
            });
            for (name, result) in join_all(saves).await {
                self.record_save_outcome(chain, name, record_id, result).await;
            }
        } else {
            for (name, backend, options) in &backends {
                let result = backend.save(record_id, options).await;
                self.record_save_outcome(chain, name, record_id, result).await;
            }
        }
    }

    async fn record_save_outcome(
        &self,
        chain: &ChainConfig,
        backend: &str,
        record_id: &RecordId,
        result: Result<()>,
    ) {
        match result {
            Ok(()) => {
                debug!(
                    chain = %chain.name,
                    backend = %backend,
                    record_id = %record_id,
                    "storage save completed"
                );
            },
            Err(e) => {
                warn!(
                    chain = %chain.name,
                    backend = %backend,
                    record_id = %record_id,
                    error = %e,
                    "storage save failed"
                );
                self.stats.write().await.storage_failures += 1;
            },
        }
    }

    fn merged_options(&self, link_name: &str, link: &dyn Link) -> LinkOptions {
        let defaults = link.default_options();
        let explicit = self.explicit_options(link_name);
        merge_options(&defaults, &explicit)
    }

    fn explicit_options(&self, name: &str) -> LinkOptions {
        self.link_options.get(name).cloned().unwrap_or_default()
    }
}

//! Worker pool management with structured concurrency.
//!
//! Provides lifecycle management and graceful shutdown for supervised chain
//! processing worker tasks.

use std::{sync::Arc, time::Duration};

use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{EngineError, Result},
    worker::{EngineConfig, EngineContext, EngineStats, Worker},
};

/// Worker pool that manages chain processing tasks with supervision.
///
/// All workers share one cancellation token and can be collectively shut
/// down within a deadline.
pub struct WorkerPool {
    context: Arc<EngineContext>,
    config: EngineConfig,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool with the given configuration.
    pub fn new(
        context: Arc<EngineContext>,
        config: EngineConfig,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { context, config, stats, cancellation_token, worker_handles: Vec::new() }
    }

    /// Spawn all configured workers and begin processing.
    ///
    /// Workers run until cancellation is requested via the cancellation
    /// token. Returns immediately after spawning all workers.
    ///
    /// # Errors
    ///
    /// Currently never returns error but signature allows for future
    /// validation.
    pub async fn spawn_workers(&mut self) -> Result<()> {
        info!(worker_count = self.config.worker_count, "spawning workers");

        {
            let mut stats = self.stats.write().await;
            stats.active_workers = self.config.worker_count;
        }

        for worker_id in 0..self.config.worker_count {
            let worker = Worker::new(
                worker_id,
                self.context.clone(),
                self.config.clone(),
                self.stats.clone(),
                self.cancellation_token.clone(),
            );

            let handle = tokio::spawn(async move {
                let result = worker.run().await;

                if let Err(ref error) = result {
                    error!(
                        worker_id,
                        error = %error,
                        "worker terminated with error"
                    );
                }

                result
            });

            self.worker_handles.push(handle);
        }

        info!(spawned_workers = self.worker_handles.len(), "all workers spawned");

        Ok(())
    }

    /// Gracefully shutdown all workers, waiting for in-flight chain passes
    /// to complete.
    ///
    /// Signals cancellation to all workers and waits for them to finish
    /// within the timeout. Workers only observe the signal at the idle
    /// boundary, so the timeout must comfortably exceed the pop timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the shutdown timeout is exceeded or a worker task
    /// panicked.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_seconds = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let shutdown_future = async {
            let mut results = Vec::new();

            for (worker_id, handle) in
                std::mem::take(&mut self.worker_handles).into_iter().enumerate()
            {
                match handle.await {
                    Ok(worker_result) => {
                        if let Err(error) = worker_result {
                            warn!(
                                worker_id,
                                error = %error,
                                "worker completed with error during shutdown"
                            );
                        }
                        results.push(Ok(()));
                    },
                    Err(join_error) => {
                        error!(
                            worker_id,
                            error = %join_error,
                            "worker task panicked during shutdown"
                        );
                        results.push(Err(EngineError::WorkerPanic {
                            worker_id,
                            error: format!("{join_error}"),
                        }));
                    },
                }
            }

            {
                let mut stats = self.stats.write().await;
                stats.active_workers = 0;
            }

            results
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(results) => {
                let error_count = results.iter().filter(|r| r.is_err()).count();
                if error_count > 0 {
                    warn!(
                        error_count,
                        total_workers = results.len(),
                        "some workers completed with errors during shutdown"
                    );
                }
                if let Some(result) = results.into_iter().find(std::result::Result::is_err) {
                    return result;
                }
                info!("worker pool shutdown completed");
                Ok(())
            },
            Err(_timeout) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "worker shutdown timed out, some workers may still be running"
                );
                Err(EngineError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Check if any workers are still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|h| !h.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.worker_handles.is_empty() {
            let active_count = self.worker_handles.iter().filter(|h| !h.is_finished()).count();

            if active_count > 0 && !self.cancellation_token.is_cancelled() {
                error!(
                    active_workers = active_count,
                    "WorkerPool dropped with active workers, forcing cancellation to prevent orphaned tasks"
                );

                self.cancellation_token.cancel();

                warn!(
                    "WorkerPool was not shut down gracefully. Call shutdown_graceful() before dropping to ensure clean shutdown."
                );
            }
        }
    }
}

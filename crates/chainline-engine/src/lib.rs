//! Chain processing engine with at-least-once delivery guarantees.
//!
//! This crate implements the core pipeline that pops conversation record
//! identifiers from ingress queues, runs them through a configured chain of
//! links, and fans the result out to egress queues and storage backends.
//!
//! # Architecture
//!
//! The engine uses a competing-consumers model where multiple async workers
//! block on a pop across every configured ingress queue; the queue store's
//! atomic pop is the only cross-worker coordination point. Each worker
//! handles the complete processing lifecycle:
//!
//! 1. **Reload** - Re-resolve the ingress-to-chain routing table
//! 2. **Pop** - Bounded blocking pop across all ingress queues
//! 3. **Execute** - Run the chain's links sequentially with halt semantics
//! 4. **Wrap-up** - Forward to egress queues and save to storage backends
//!
//! # Key Features
//!
//! - **At-least-once delivery** - A record popped during shutdown is pushed
//!   back onto its originating queue before the worker exits
//! - **Dead-letter routing** - A fatal link error sends the record id to a
//!   deterministic per-ingress-queue DLQ instead of losing it
//! - **Partial-failure isolation** - One storage backend or egress queue
//!   failing never blocks its siblings
//! - **Graceful shutdown** - Workers finish the in-flight chain pass before
//!   exit; shutdown is only observed at the idle boundary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chainline_core::{ChainSnapshot, StaticSource, RedisQueueStore};
//! use chainline_engine::{Engine, EngineConfig, EngineContext, LinkRegistry, StorageRegistry};
//!
//! # async fn example() -> chainline_engine::Result<()> {
//! let queues = Arc::new(RedisQueueStore::connect("redis://127.0.0.1").await.unwrap());
//! let ctx = EngineContext::new(
//!     queues,
//!     Arc::new(LinkRegistry::new()),
//!     Arc::new(StorageRegistry::new()),
//!     Arc::new(StaticSource::new(ChainSnapshot::empty())),
//! );
//!
//! let mut engine = Engine::new(ctx, EngineConfig::default());
//! engine.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod dlq;
pub mod error;
pub mod executor;
pub mod link;
pub mod resolver;
pub mod storage;
mod worker;
pub mod worker_pool;

// Re-export main public API
pub use dlq::{dlq_name, DeadLetterRouter};
pub use error::{EngineError, Result};
pub use executor::ChainExecutor;
pub use link::{Link, LinkRegistry, LinkResult};
pub use resolver::{ChainResolver, RouteMap};
pub use storage::{StorageBackend, StorageRegistry};
pub use worker::{Engine, EngineConfig, EngineContext, EngineStats, Worker};

/// Default number of concurrent workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default bounded blocking-pop timeout in seconds.
pub const DEFAULT_POP_TIMEOUT_SECONDS: u64 = 15;

/// Default graceful-shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

//! Core domain types for the chainline processing engine.
//!
//! Provides the opaque record identifier, the chain configuration model, the
//! queue store abstraction, and error handling shared by every other crate.
//! Record payloads never pass through this code; the engine only threads
//! identifiers between queues, links, and storage backends.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod models;
pub mod queue;

pub use config::{ConfigSource, StaticSource, SwappableSource};
pub use error::{CoreError, Result};
pub use models::{merge_options, ChainConfig, ChainSnapshot, LinkOptions, RecordId};
pub use queue::{QueueStore, RedisQueueStore};

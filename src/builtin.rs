//! Built-in links and storage backends.
//!
//! Deployments extend the service by registering their own implementations
//! next to these before starting the engine. The trace pair is also handy
//! for smoke-testing a new chain table end to end.

use std::{future::Future, pin::Pin, sync::Arc};

use chainline_core::{LinkOptions, RecordId};
use chainline_engine::{Link, LinkRegistry, LinkResult, StorageBackend, StorageRegistry};
use tracing::info;

/// Link that logs every invocation and passes the record through.
pub struct TraceLink;

impl Link for TraceLink {
    fn invoke<'a>(
        &'a self,
        record_id: &'a RecordId,
        link_name: &'a str,
        options: &'a LinkOptions,
    ) -> Pin<Box<dyn Future<Output = chainline_engine::Result<LinkResult>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                link = %link_name,
                record_id = %record_id,
                options = %serde_json::Value::Object(options.clone()),
                "trace link invoked"
            );
            Ok(LinkResult::Continue(record_id.clone()))
        })
    }
}

/// Storage backend that logs every save and discards the record.
pub struct TraceStorage;

impl StorageBackend for TraceStorage {
    fn save<'a>(
        &'a self,
        record_id: &'a RecordId,
        options: &'a LinkOptions,
    ) -> Pin<Box<dyn Future<Output = chainline_engine::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                record_id = %record_id,
                options = %serde_json::Value::Object(options.clone()),
                "trace storage invoked"
            );
            Ok(())
        })
    }
}

/// Builds the link registry with all built-in links.
pub fn default_links() -> LinkRegistry {
    let mut registry = LinkRegistry::new();
    registry.register("trace", Arc::new(TraceLink));
    registry
}

/// Builds the storage registry with all built-in backends.
pub fn default_storages() -> StorageRegistry {
    let mut registry = StorageRegistry::new();
    registry.register("trace", Arc::new(TraceStorage));
    registry
}

//! Chain configuration sources.
//!
//! Workers call `ConfigSource::load` at the top of every loop iteration and
//! consume the returned immutable snapshot for that iteration only. This is
//! the whole hot-reload mechanism: no reload signal, no shared mutable
//! state, staleness bounded by one iteration.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::RwLock;

use crate::{error::Result, models::ChainSnapshot};

/// Supplies the chain configuration snapshot for one loop iteration.
pub trait ConfigSource: Send + Sync + 'static {
    /// Loads a fresh snapshot of all chain definitions.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<ChainSnapshot>> + Send + '_>>;
}

/// Config source returning the same snapshot forever.
///
/// Suits embedded deployments with a fixed chain table, and most tests.
pub struct StaticSource {
    snapshot: ChainSnapshot,
}

impl StaticSource {
    /// Creates a source that always returns the given snapshot.
    pub fn new(snapshot: ChainSnapshot) -> Self {
        Self { snapshot }
    }
}

impl ConfigSource for StaticSource {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<ChainSnapshot>> + Send + '_>> {
        let snapshot = self.snapshot.clone();
        Box::pin(async move { Ok(snapshot) })
    }
}

/// Config source whose snapshot can be replaced at runtime.
///
/// Lets tests exercise the per-iteration reload behaviour: swap the snapshot
/// while workers are running and the next iteration observes it.
#[derive(Clone)]
pub struct SwappableSource {
    snapshot: Arc<RwLock<ChainSnapshot>>,
}

impl SwappableSource {
    /// Creates a source with an initial snapshot.
    pub fn new(snapshot: ChainSnapshot) -> Self {
        Self { snapshot: Arc::new(RwLock::new(snapshot)) }
    }

    /// Replaces the snapshot returned by subsequent `load` calls.
    pub async fn swap(&self, snapshot: ChainSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

impl ConfigSource for SwappableSource {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<ChainSnapshot>> + Send + '_>> {
        Box::pin(async move { Ok(self.snapshot.read().await.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChainConfig;

    fn chain(name: &str) -> ChainConfig {
        ChainConfig {
            name: name.to_string(),
            links: vec![],
            storages: vec![],
            ingress_lists: vec![format!("{name}-in")],
            egress_lists: vec![],
            enabled: true,
            timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn static_source_returns_same_snapshot() {
        let source = StaticSource::new(ChainSnapshot::new(vec![chain("a")]));

        let first = source.load().await.unwrap();
        let second = source.load().await.unwrap();
        assert_eq!(first.chains(), second.chains());
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn swappable_source_serves_replacement_on_next_load() {
        let source = SwappableSource::new(ChainSnapshot::empty());
        assert!(source.load().await.unwrap().is_empty());

        source.swap(ChainSnapshot::new(vec![chain("b")])).await;

        let snapshot = source.load().await.unwrap();
        assert_eq!(snapshot.chains()[0].name, "b");
    }
}

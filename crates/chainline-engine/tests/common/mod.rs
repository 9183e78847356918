//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use chainline_core::{
    queue::mock::InMemoryQueueStore, ChainConfig, LinkOptions, QueueStore, RecordId,
};
use chainline_engine::{EngineError, Link, LinkResult};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Invocation journal shared between scripted links: (link name, record id).
pub type Journal = Arc<RwLock<Vec<(String, String)>>>;

pub fn journal() -> Journal {
    Arc::default()
}

/// What a scripted link does when invoked.
pub enum LinkBehavior {
    /// Continue with the input id unchanged.
    Continue,
    /// Continue with a substituted id.
    ContinueWith(&'static str),
    /// Halt the chain pass.
    Halt,
    /// Fail the chain pass with the given message.
    Fail(&'static str),
}

/// Link that records every invocation in a shared journal and then follows
/// its scripted behavior.
pub struct ScriptedLink {
    behavior: LinkBehavior,
    journal: Journal,
}

impl ScriptedLink {
    pub fn new(behavior: LinkBehavior, journal: Journal) -> Arc<Self> {
        Arc::new(Self { behavior, journal })
    }
}

impl Link for ScriptedLink {
    fn invoke<'a>(
        &'a self,
        record_id: &'a RecordId,
        link_name: &'a str,
        _options: &'a LinkOptions,
    ) -> Pin<Box<dyn Future<Output = chainline_engine::Result<LinkResult>> + Send + 'a>> {
        Box::pin(async move {
            self.journal.write().await.push((link_name.to_string(), record_id.to_string()));
            match &self.behavior {
                LinkBehavior::Continue => Ok(LinkResult::Continue(record_id.clone())),
                LinkBehavior::ContinueWith(next) => Ok(LinkResult::Continue(RecordId::new(*next))),
                LinkBehavior::Halt => Ok(LinkResult::Halt),
                LinkBehavior::Fail(message) => Err(EngineError::link_failed(link_name, *message)),
            }
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// Builds an enabled chain definition.
pub fn chain(
    name: &str,
    links: &[&str],
    ingress: &[&str],
    egress: &[&str],
    storages: &[&str],
) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        links: strings(links),
        storages: strings(storages),
        ingress_lists: strings(ingress),
        egress_lists: strings(egress),
        enabled: true,
        timeout_seconds: None,
    }
}

/// Queue store wrapper that cancels a token the moment a pop succeeds.
///
/// Simulates a shutdown signal arriving while a worker is blocked inside a
/// pop, to exercise the requeue path deterministically.
pub struct CancelOnPopQueue {
    inner: InMemoryQueueStore,
    token: CancellationToken,
}

impl CancelOnPopQueue {
    pub fn new(inner: InMemoryQueueStore, token: CancellationToken) -> Self {
        Self { inner, token }
    }
}

impl QueueStore for CancelOnPopQueue {
    fn push<'a>(
        &'a self,
        queue: &'a str,
        id: &'a RecordId,
    ) -> Pin<Box<dyn Future<Output = chainline_core::Result<()>> + Send + 'a>> {
        self.inner.push(queue, id)
    }

    fn blocking_pop_any<'a>(
        &'a self,
        queues: &'a [String],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = chainline_core::Result<Option<(String, RecordId)>>> + Send + 'a>>
    {
        Box::pin(async move {
            let popped = self.inner.blocking_pop_any(queues, timeout).await?;
            if popped.is_some() {
                self.token.cancel();
            }
            Ok(popped)
        })
    }

    fn len<'a>(
        &'a self,
        queue: &'a str,
    ) -> Pin<Box<dyn Future<Output = chainline_core::Result<usize>> + Send + 'a>> {
        self.inner.len(queue)
    }
}

/// Polls `probe` until it returns true or the deadline elapses.
pub async fn wait_until<F, Fut>(deadline: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = tokio::time::Instant::now();
    loop {
        if probe().await {
            return true;
        }
        if started.elapsed() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

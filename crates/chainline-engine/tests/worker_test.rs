//! Integration tests for the worker loop and engine lifecycle.
//!
//! Covers dead-letter routing on fatal failure, requeue-on-shutdown,
//! exactly-once distribution across competing workers, hot chain reload,
//! and the paused state on ambiguous configuration.

mod common;

use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::Result;
use chainline_core::{
    queue::mock::InMemoryQueueStore, ChainSnapshot, QueueStore, RecordId, StaticSource,
    SwappableSource,
};
use chainline_engine::{
    Engine, EngineConfig, EngineContext, EngineStats, LinkRegistry, StorageRegistry, Worker,
};
use common::{chain, journal, wait_until, CancelOnPopQueue, LinkBehavior, ScriptedLink};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

fn fast_config(worker_count: usize) -> EngineConfig {
    EngineConfig {
        worker_count,
        pop_timeout: Duration::from_millis(50),
        shutdown_timeout: Duration::from_secs(5),
        reload_backoff: Duration::from_millis(50),
        ..Default::default()
    }
}

#[tokio::test]
async fn fatal_link_dead_letters_the_record_exactly_once() -> Result<()> {
    let store = Arc::new(InMemoryQueueStore::new());
    let journal = journal();

    let mut links = LinkRegistry::new();
    links.register("explode", ScriptedLink::new(LinkBehavior::Fail("boom"), journal.clone()));

    let snapshot = ChainSnapshot::new(vec![chain(
        "default",
        &["explode"],
        &["inbound"],
        &["out"],
        &[],
    )]);
    let context = EngineContext::new(
        store.clone(),
        Arc::new(links),
        Arc::new(StorageRegistry::new()),
        Arc::new(StaticSource::new(snapshot)),
    );

    let id = RecordId::new("rec-1");
    store.push("inbound", &id).await?;

    let mut engine = Engine::new(context, fast_config(1));
    engine.start().await?;

    let dead_lettered = wait_until(Duration::from_secs(3), || async {
        engine.stats().await.records_dead_lettered == 1
    })
    .await;
    assert!(dead_lettered, "record should have been dead-lettered");

    let stats = engine.stats().await;
    engine.shutdown().await?;

    assert_eq!(stats.records_failed, 1);
    assert_eq!(store.contents("dlq:inbound").await, vec![id]);
    assert_eq!(store.depth("inbound").await, 0);
    assert_eq!(store.depth("out").await, 0, "failed pass must not reach egress");
    Ok(())
}

#[tokio::test]
async fn record_popped_during_shutdown_is_requeued_unprocessed() -> Result<()> {
    let inner = InMemoryQueueStore::new();
    let token = CancellationToken::new();
    let store = Arc::new(CancelOnPopQueue::new(inner.clone(), token.clone()));
    let journal = journal();

    let mut links = LinkRegistry::new();
    links.register("tap", ScriptedLink::new(LinkBehavior::Continue, journal.clone()));

    let snapshot =
        ChainSnapshot::new(vec![chain("default", &["tap"], &["inbound"], &["out"], &[])]);
    let context = Arc::new(EngineContext::new(
        store,
        Arc::new(links),
        Arc::new(StorageRegistry::new()),
        Arc::new(StaticSource::new(snapshot)),
    ));

    let id = RecordId::new("rec-1");
    inner.push("inbound", &id).await?;

    let stats = Arc::new(RwLock::new(EngineStats::default()));
    let worker = Worker::new(0, context, fast_config(1), stats, token);
    worker.run().await?;

    assert!(journal.read().await.is_empty(), "popped record must not be processed");
    assert_eq!(inner.contents("inbound").await, vec![id]);
    assert_eq!(inner.depth("out").await, 0);
    Ok(())
}

#[tokio::test]
async fn competing_workers_process_each_record_exactly_once() -> Result<()> {
    let store = Arc::new(InMemoryQueueStore::new());
    let journal = journal();

    let mut links = LinkRegistry::new();
    links.register("tap", ScriptedLink::new(LinkBehavior::Continue, journal.clone()));

    let snapshot =
        ChainSnapshot::new(vec![chain("default", &["tap"], &["inbound"], &["out"], &[])]);
    let context = EngineContext::new(
        store.clone(),
        Arc::new(links),
        Arc::new(StorageRegistry::new()),
        Arc::new(StaticSource::new(snapshot)),
    );

    let total = 100u64;
    for i in 0..total {
        store.push("inbound", &RecordId::new(format!("rec-{i}"))).await?;
    }

    let mut engine = Engine::new(context, fast_config(4));
    engine.start().await?;

    let drained = wait_until(Duration::from_secs(5), || async {
        engine.stats().await.records_processed == total
    })
    .await;
    assert!(drained, "all records should have been processed");
    engine.shutdown().await?;

    assert_eq!(store.depth("inbound").await, 0);
    assert_eq!(store.depth("out").await, total as usize);

    let entries = journal.read().await.clone();
    assert_eq!(entries.len(), total as usize);
    let distinct: HashSet<String> = entries.iter().map(|(_, id)| id.clone()).collect();
    assert_eq!(distinct.len(), total as usize, "no record may be processed twice");
    Ok(())
}

#[tokio::test]
async fn chain_edits_take_effect_between_records() -> Result<()> {
    let store = Arc::new(InMemoryQueueStore::new());
    let journal = journal();

    let mut links = LinkRegistry::new();
    links.register("before", ScriptedLink::new(LinkBehavior::Continue, journal.clone()));
    links.register("after", ScriptedLink::new(LinkBehavior::Continue, journal.clone()));

    let source = Arc::new(SwappableSource::new(ChainSnapshot::new(vec![chain(
        "default",
        &["before"],
        &["inbound"],
        &[],
        &[],
    )])));
    let context = EngineContext::new(
        store.clone(),
        Arc::new(links),
        Arc::new(StorageRegistry::new()),
        source.clone(),
    );

    let mut engine = Engine::new(context, fast_config(1));
    engine.start().await?;

    store.push("inbound", &RecordId::new("rec-1")).await?;
    let first = wait_until(Duration::from_secs(3), || async {
        engine.stats().await.records_processed == 1
    })
    .await;
    assert!(first, "first record should process under the original chain");

    source
        .swap(ChainSnapshot::new(vec![chain("default", &["after"], &["inbound"], &[], &[])]))
        .await;

    store.push("inbound", &RecordId::new("rec-2")).await?;
    let second = wait_until(Duration::from_secs(3), || async {
        engine.stats().await.records_processed == 2
    })
    .await;
    assert!(second, "second record should process under the swapped chain");
    engine.shutdown().await?;

    let entries = journal.read().await.clone();
    assert_eq!(entries[0], ("before".to_string(), "rec-1".to_string()));
    assert_eq!(entries[1], ("after".to_string(), "rec-2".to_string()));
    Ok(())
}

#[tokio::test]
async fn ambiguous_routes_pause_consumption_without_losing_records() -> Result<()> {
    let store = Arc::new(InMemoryQueueStore::new());
    let journal = journal();

    let mut links = LinkRegistry::new();
    links.register("tap", ScriptedLink::new(LinkBehavior::Continue, journal.clone()));

    // Two enabled chains claim the same ingress queue.
    let snapshot = ChainSnapshot::new(vec![
        chain("chain-a", &["tap"], &["contested"], &[], &[]),
        chain("chain-b", &["tap"], &["contested"], &[], &[]),
    ]);
    let context = EngineContext::new(
        store.clone(),
        Arc::new(links),
        Arc::new(StorageRegistry::new()),
        Arc::new(StaticSource::new(snapshot)),
    );

    store.push("contested", &RecordId::new("rec-1")).await?;

    let mut engine = Engine::new(context, fast_config(1));
    engine.start().await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let stats = engine.stats().await;
    engine.shutdown().await?;

    // Paused, not dead: nothing consumed, nothing dead-lettered.
    assert_eq!(stats.records_processed, 0);
    assert_eq!(stats.records_dead_lettered, 0);
    assert_eq!(store.depth("contested").await, 1);
    assert_eq!(store.depth("dlq:contested").await, 0);
    Ok(())
}

//! Chainline conversation record processing service.
//!
//! Main entry point. Initializes the queue store, registries, and engine,
//! then waits for a shutdown signal and drains the worker pool gracefully.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chainline_core::{LinkOptions, RedisQueueStore};
use chainline_engine::{Engine, EngineContext};
use tracing::{info, warn};

mod builtin;
mod chains;
mod config;

use chains::YamlFileSource;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting chainline record processing service");

    let config = Config::load()?;
    info!(
        redis_url = %config.redis_url_masked(),
        chains_file = %config.chains_file,
        worker_count = config.worker_count,
        parallel_storage = config.parallel_storage_enabled(),
        "Configuration loaded"
    );

    let queues = connect_queue_store(&config).await?;
    info!("Queue store connection established");

    let chain_source = YamlFileSource::new(&config.chains_file);
    let link_options = load_link_options(&chain_source).await;

    let context = EngineContext::new(
        Arc::new(queues),
        Arc::new(builtin::default_links()),
        Arc::new(builtin::default_storages()),
        Arc::new(chain_source),
    );

    let mut engine = Engine::new(context, config.to_engine_config(link_options));
    engine.start().await?;
    info!("Chainline is consuming records");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    engine.shutdown().await?;
    info!("Chainline shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,chainline=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Connects to the queue store with retry logic.
async fn connect_queue_store(config: &Config) -> Result<RedisQueueStore> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match RedisQueueStore::connect(&config.redis_url).await {
            Ok(store) => return Ok(store),
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Queue store connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to connect to queue store after retries");
            },
        }
    }
}

/// Reads the per-link options from the chain file at startup.
///
/// A broken or missing chain file is not fatal here: workers keep reloading
/// it every iteration and recover once it is fixed. Only the link options
/// would stay empty until a restart.
async fn load_link_options(
    source: &YamlFileSource,
) -> HashMap<String, LinkOptions> {
    match source.read().await {
        Ok(file) => {
            info!(
                chains = file.chains.len(),
                links_with_options = file.link_options.len(),
                "Chain file loaded"
            );
            file.link_options
        },
        Err(e) => {
            warn!(error = %e, "Chain file unreadable at startup, continuing without link options");
            HashMap::new()
        },
    }
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

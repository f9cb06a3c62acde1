//! visor-cache - fetch interception host
//!
//! Installs and activates the configured cache generation, routes every URL
//! given on the command line through the engine, then persists the cache.
//! A failed install is logged and the previously saved cache keeps serving.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visor_cache::cache::StorageSnapshot;
use visor_cache::config::log_dir;
use visor_cache::{
    CacheStorage, Config, EngineHandle, EventLoop, FetchInterceptionEngine, Interception, Request,
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_dir = log_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "visor-cache.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visor_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    // Load configuration
    let config = Config::load_or_default()?;

    // Restore persisted generations
    let snapshot_path = config.cache.snapshot_file();
    let storage = match &snapshot_path {
        Some(path) => CacheStorage::from_snapshot(StorageSnapshot::load(path)?),
        None => CacheStorage::new(),
    };

    let skip_waiting = config.lifecycle.skip_waiting;
    let engine = Arc::new(
        FetchInterceptionEngine::builder(config)
            .storage(storage)
            .build()?,
    );

    let event_loop = EventLoop::new(Arc::clone(&engine));
    let handle = event_loop.handle();
    let task = event_loop.start();

    let outcome = serve(&handle, skip_waiting).await;

    // Always stop the loop and persist, whatever happened above
    if let Err(e) = handle.shutdown() {
        tracing::error!("Failed to stop event loop: {}", e);
    }
    if let Err(e) = task.await {
        tracing::error!("Event loop task failed: {}", e);
    }

    let saved = match snapshot_path {
        Some(path) => engine.storage().snapshot().await.save(&path),
        None => Ok(()),
    };

    outcome.and(saved)
}

/// Bring the engine up and route every URL given on the command line.
async fn serve(handle: &EngineHandle, skip_waiting: bool) -> Result<()> {
    handle.start_up(skip_waiting).await?;

    for url in std::env::args().skip(1) {
        let request = match Request::get(&url) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", url, e);
                continue;
            }
        };

        match handle.fetch(request).await {
            Ok(Interception::Respond(response)) => {
                println!("{} {} ({} bytes)", response.status, url, response.body.len());
            }
            Ok(Interception::Passthrough) => println!("--- {} (not intercepted)", url),
            Err(e) => println!("ERR {} ({})", url, e),
        }
    }

    Ok(())
}

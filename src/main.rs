//! Form Cache - maintenance process for the persistent form cache
//!
//! Opens the durable cache, keeps expired entries swept, and persists on exit.

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use form_cache::{CacheService, Config};

/// Main entry point for the form cache process.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the file store, hydrate the table and sweep it once
/// 4. Start background expiry cleanup task
/// 5. Wait for SIGINT/SIGTERM, then stop the task and persist
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "form_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting form cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, default_ttl={}s, cleanup_interval={}s, data_dir={}",
        config.max_entries,
        config.default_ttl,
        config.cleanup_interval,
        config.data_dir.display()
    );

    let service = CacheService::start(&config).context("failed to open cache storage")?;
    {
        let cache = service.cache();
        let stats = cache.read().await.get_stats();
        info!(
            "Cache ready: {} entries, {} bytes",
            stats.total_entries, stats.total_size
        );
    }

    shutdown_signal().await?;

    service.shutdown().await;
    info!("Form cache shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
    Ok(())
}

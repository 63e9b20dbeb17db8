//! shiftgate - TCP gateway for the shift scheduling backend
//!
//! Accepts framed JSON requests from clients, answers them from the data
//! store, and forwards schedule generation to the external compute engine.

use shiftgate_server::{
    register_defaults, Config, DownstreamProxy, MemoryStore, ProtocolRouter, Server, ServerConfig,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if SHIFTGATE_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("SHIFTGATE_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting shiftgate server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  Max frame size: {} bytes", config.frame.max_frame_size());
    tracing::info!(
        "  Compute engine: {} (connect {}s, read {}s)",
        config.downstream.addr,
        config.downstream.connect_timeout_secs,
        config.downstream.read_timeout_secs
    );
    match config.downstream.diagnostics_path() {
        Some(path) => tracing::info!("  Downstream diagnostics: {}", path.display()),
        None => tracing::info!("  Downstream diagnostics: disabled"),
    }

    // Data store
    let store = match &config.storage.seed_file {
        Some(path) => {
            let store = MemoryStore::from_seed_file(path)?;
            tracing::info!("  Data store: in-memory, seeded from {}", path.display());
            store
        }
        None => {
            tracing::warn!("  Data store: in-memory, empty (no seed file configured)");
            MemoryStore::default()
        }
    };

    // Router with the built-in handlers
    let downstream = DownstreamProxy::new(&config.downstream, config.frame.max_frame_size());
    let mut router = ProtocolRouter::new(downstream);
    register_defaults(&mut router);
    tracing::info!("  Protocols: {}", router.protocols().join(", "));

    let server = Arc::new(Server::new(
        ServerConfig::from(&config),
        Arc::new(router),
        Arc::new(store),
    ));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    let stats = server.stats();
    tracing::info!(
        "Server stopped ({} connections, {} requests, {} errors)",
        stats.connections_total.load(std::sync::atomic::Ordering::Relaxed),
        stats.requests_total.load(std::sync::atomic::Ordering::Relaxed),
        stats.errors_total.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}

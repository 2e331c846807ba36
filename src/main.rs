//! slpd - SLPv2 service responder
//!
//! Answers Service Type and Service requests for the services listed in a
//! static definitions file.

use slpd_server::{
    load_services_or_empty, run_metrics_server, Config, InterfaceProvider, Metrics,
    RequestHandler, Server, ServerConfig, StaticInterfaces, SystemInterfaces,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if SLPD_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("SLPD_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting slpd");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Services file: {}", config.services.file.display());

    // Loaded once; shared read-only by every request from here on.
    let services = Arc::new(load_services_or_empty(&config.services.file));
    if services.is_empty() {
        tracing::warn!("No services registered; all lookups will fail with INTERNAL_ERROR");
    } else {
        for entry in services.iter() {
            tracing::info!(
                "  Service: {} ({}, port {})",
                entry.key(),
                entry.service_type,
                entry.port
            );
        }
    }

    let static_addresses = config.interfaces.static_addresses()?;
    let interfaces: Arc<dyn InterfaceProvider> = if static_addresses.is_empty() {
        tracing::info!("  Addresses: enumerated from interfaces");
        Arc::new(SystemInterfaces::with_exclude(
            config.interfaces.exclude.iter().cloned(),
        ))
    } else {
        tracing::info!("  Addresses: {:?}", static_addresses);
        Arc::new(StaticInterfaces::new(static_addresses))
    };

    let mut server_config = ServerConfig::from(&config.network);
    let (metrics_shutdown_tx, _) = broadcast::channel(1);
    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());
        let addr = config.metrics.bind_addr;
        let shutdown_rx = metrics_shutdown_tx.subscribe();
        tracing::info!("  Metrics: enabled ({})", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown_rx).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };

    let handler = RequestHandler::new(services, interfaces);
    let server = Arc::new(Server::bind(server_config, handler).await?);

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
        let _ = metrics_shutdown_tx.send(());
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

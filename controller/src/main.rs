//! Grapevine Controller
//!
//! Headless fleet controller: registers the agents named in the environment,
//! monitors them, and performs a coordinated shutdown on Ctrl+C or SIGTERM.

use grapevine_controller::config::Config;
use grapevine_controller::registry::FleetRegistry;
use grapevine_controller::telemetry::{EventSink, TelemetryEvent, UdpEventSink};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env();
    config.validate()?;
    info!("Configuration loaded: {:?}", config);

    let sink: Arc<dyn EventSink> = Arc::new(UdpEventSink::bind(config.sink.addr()?).await?);
    let registry = FleetRegistry::with_agents(&config, Arc::clone(&sink), &config.fleet.agents)
        .await?;

    if registry.is_empty().await {
        warn!("No agents configured, set GRAPEVINE_AGENTS to a comma-separated list");
    }
    if let Some(first) = config.fleet.agents.first() {
        registry.select_current(*first).await?;
    }

    info!(
        agents = registry.len().await,
        collector = %config.sink.addr()?,
        "Controller running"
    );
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let signal = shutdown_signal().await;
    sink.emit(TelemetryEvent::signal(signal)).await;

    let report = registry
        .safe_exit("Interrupt signal detected, terminating program.")
        .await;
    info!(?report, "Controller shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
            "SIGINT"
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
            "SIGTERM"
        },
    }
}

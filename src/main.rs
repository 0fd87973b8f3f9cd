//! Entry point: loads configuration, starts the configured server fleet,
//! binds the HTTP listener, and waits for a termination signal (§4.7–§4.9).

use mcp_bridge::confirmation::ConfirmationLedger;
use mcp_bridge::{config, http, BridgeConfig, Registry};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bridge_config = BridgeConfig::load();
    let registry = Registry::new();
    let confirmation = std::sync::Arc::new(ConfirmationLedger::new());

    for (id, spec) in bridge_config.servers {
        if let Err(err) = registry.start(id.clone(), spec) {
            error!(server = %id, error = %err, "failed to start configured server");
        }
    }

    let addr = config::bind_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, error = %err, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    info!(%addr, "listening");

    let router = http::build_router(registry.clone(), confirmation);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");

    registry.stop_all().await;
    info!("all servers stopped, exiting");
}

/// Resolves once `SIGTERM` or `SIGINT` is received, letting `axum::serve`
/// stop accepting new connections before the registry tears children down
/// (§4.9).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, stopping servers");
}

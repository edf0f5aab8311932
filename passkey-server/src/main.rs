//! Passkey Server - REST API for WebAuthn credential registration
//!
//! Exposes passkey-core's registration ceremony via HTTP endpoints:
//! - POST /register/start - Issue a challenge and creation options
//! - POST /register/finish - Validate the authenticator response and store the credential

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use passkey_server::{create_router, AppState, Config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How often expired challenges are swept from memory.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_server=debug,passkey_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "Configuration loaded");

    let state = AppState::from_config(&config)
        .await
        .context("failed to initialize application state")?;

    let challenges = state.challenges.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = challenges.cleanup_expired();
            if removed > 0 {
                tracing::debug!(removed, "Expired challenges removed");
            }
        }
    });

    let app = create_router(state, &config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

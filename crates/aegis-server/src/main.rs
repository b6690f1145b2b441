//! Aegis server entry point.
//!
//! Loads configuration from the environment, connects to storage with a
//! retry loop, then serves the HTTP API with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use aegis_core::PolicyCompiler;
use aegis_storage::{create_manager, Manager, StorageError};

use aegis_server::config::ServerConfig;
use aegis_server::routes;
use aegis_server::schemas::Schemas;
use aegis_server::state::AppState;

/// Delay between storage connection attempts at startup.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("configuration")?;

    // Initialize structured logging. RUST_LOG wins over LOG_LEVEL.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    let schemas = Schemas::load().context("embedded schemas")?;
    let compiler = PolicyCompiler::new();
    let manager = connect_with_retry(&config.dsn, compiler.clone()).await?;

    let state = Arc::new(AppState {
        manager,
        compiler,
        schemas,
    });

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "aegis listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("aegis stopped");
    Ok(())
}

/// Connect to storage, retrying connection-level failures every
/// [`CONNECT_RETRY_DELAY`]. DSN parse and scheme errors are permanent and
/// fail startup immediately.
async fn connect_with_retry(
    dsn: &str,
    compiler: PolicyCompiler,
) -> anyhow::Result<Arc<dyn Manager>> {
    loop {
        debug!("trying to connect to storage");
        match create_manager(dsn, compiler.clone()).await {
            Ok(manager) => {
                debug!("connected");
                return Ok(manager);
            }
            Err(err @ (StorageError::InvalidDsn { .. } | StorageError::UnsupportedScheme { .. })) => {
                return Err(err).context("storage DSN");
            }
            Err(err) => {
                warn!(
                    error = %err,
                    retry_secs = CONNECT_RETRY_DELAY.as_secs(),
                    "storage connection failed, retrying"
                );
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}

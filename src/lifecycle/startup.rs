//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the gateway or an internal service from validated config
//! - Bind the listener and serve until a termination signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::http::server::{HttpServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::services::{ServiceKind, ServiceServer};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run_gateway(config: GatewayConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstreams = config.upstreams.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Starting gateway"
    );

    let server = HttpServer::new(config)?;
    let listener = bind(&server.config().listener.bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    let rx = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { signals::trigger_on_signal(&shutdown).await }
    });

    server.run(listener, rx).await.map_err(StartupError::Serve)
}

/// Run one internal service until SIGINT/SIGTERM. `bind_override` replaces
/// the configured address.
pub async fn run_service(
    kind: ServiceKind,
    config: GatewayConfig,
    bind_override: Option<String>,
) -> Result<(), StartupError> {
    let address = bind_override.unwrap_or_else(|| kind.bind_address(&config).to_string());
    tracing::info!(
        service = kind.name(),
        bind_address = %address,
        fallback = ?config.internal.fallback,
        "Starting internal service"
    );

    let server = ServiceServer::new(kind, &config)?;
    let listener = bind(&address).await?;

    let shutdown = Arc::new(Shutdown::new());
    let rx = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { signals::trigger_on_signal(&shutdown).await }
    });

    server.run(listener, rx).await.map_err(StartupError::Serve)
}

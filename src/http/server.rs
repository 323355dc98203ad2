//! Gateway HTTP server.
//!
//! # Responsibilities
//! - Create Axum Router with the local endpoints and the proxy fallback
//! - Wire up middleware (request ID, tracing, timeout, body limit, edge auth)
//! - Bind server to listener with graceful shutdown
//!
//! # Layer order (outermost first)
//! ```text
//! RequestIdLayer → TraceLayer(RequestSpan) → RequestBodyLimitLayer
//!     → TimeoutLayer → edge_auth → handler | proxy
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::edge::{edge_auth, EdgeAuth};
use crate::auth::roles::UnknownRole;
use crate::auth::token::{TokenCodec, TokenError};
use crate::config::GatewayConfig;
use crate::http::proxy::Dispatcher;
use crate::http::request::{RequestIdLayer, RequestSpan};
use crate::http::response::ApiResponse;
use crate::resilience::{RetryPolicy, Timeouts};
use crate::routing::router::{RouteError, ServiceRouter};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("invalid edge role rule: {0}")]
    RoleRule(#[from] UnknownRole),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub edge: Arc<EdgeAuth>,
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create the gateway from a validated configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let codec = Arc::new(TokenCodec::new(config.auth.secret.as_bytes())?);
        let edge = Arc::new(EdgeAuth::new(codec, &config.gateway)?);

        let dispatcher = Arc::new(Dispatcher::new(
            ServiceRouter::from_config(&config.upstreams)?,
            RetryPolicy::from_config(&config.retries),
            Timeouts::from(&config.timeouts),
            config.limits.max_body_bytes,
        ));

        let state = GatewayState { edge, dispatcher };
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: GatewayState) -> Router {
        let timeouts = Timeouts::from(&config.timeouts);
        let edge_layer = middleware::from_fn_with_state(state.edge.clone(), edge_auth);

        Router::new()
            .route("/health", get(health))
            .route("/", get(service_info))
            .fallback(proxy_handler)
            .with_state(state)
            // Innermost, so it sees the plain `Request<Body>`.
            .layer(edge_layer)
            .layer(
                ServiceBuilder::new()
                    .layer(RequestIdLayer)
                    .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
                    .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
                    .layer(TimeoutLayer::new(timeouts.request)),
            )
    }

    /// The router with every layer applied, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    services: Vec<String>,
}

async fn service_info(State(state): State<GatewayState>) -> ApiResponse<ServiceInfo> {
    ApiResponse::ok(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        services: state
            .dispatcher
            .router()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

async fn proxy_handler(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    match state.dispatcher.dispatch(request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

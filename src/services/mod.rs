//! Internal services behind the gateway.
//!
//! # Data Flow
//! ```text
//! forwarded request (x-user-*, x-request-id)
//!     → RequestIdLayer (keeps the gateway's id)
//!     → TraceLayer(RequestSpan)
//!     → internal_auth (CallerIdentity: propagated | token | anonymous;
//!       register and login always fall back to anonymous)
//!     → users.rs | orders.rs handlers (role gate, ownership)
//!     → store.rs (UserStore / ProjectStore)
//! ```
//!
//! # Design Decisions
//! - Each service re-authenticates on its own; it never assumes the gateway
//!   already did
//! - `/health` sits outside internal auth so probes work under `deny`

pub mod orders;
pub mod store;
pub mod users;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::internal::InternalAuth;
use crate::auth::token::TokenCodec;
use crate::config::validation::MAX_TOKEN_TTL_SECS;
use crate::config::GatewayConfig;
use crate::http::request::{RequestIdLayer, RequestSpan};
use crate::http::server::ServerError;
use crate::services::orders::OrdersState;
use crate::services::store::{InMemoryProjectStore, InMemoryUserStore, ProjectStore, UserStore};
use crate::services::users::UsersState;

/// Which internal service to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceKind {
    Users,
    Orders,
}

impl ServiceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Orders => "orders",
        }
    }

    /// Configured bind address for this service.
    pub fn bind_address<'a>(&self, config: &'a GatewayConfig) -> &'a str {
        match self {
            Self::Users => &config.services.users_bind,
            Self::Orders => &config.services.orders_bind,
        }
    }
}

/// Storage handed to a service.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub projects: Arc<dyn ProjectStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserStore::new()),
            projects: Arc::new(InMemoryProjectStore::new()),
        }
    }
}

/// HTTP server for one internal service.
pub struct ServiceServer {
    kind: ServiceKind,
    router: Router,
}

impl ServiceServer {
    pub fn new(kind: ServiceKind, config: &GatewayConfig) -> Result<Self, ServerError> {
        Self::with_stores(kind, config, Stores::in_memory())
    }

    pub fn with_stores(
        kind: ServiceKind,
        config: &GatewayConfig,
        stores: Stores,
    ) -> Result<Self, ServerError> {
        let codec = Arc::new(TokenCodec::new(config.auth.secret.as_bytes())?);
        let internal = Arc::new(InternalAuth::new(codec.clone(), config.internal.fallback));

        let domain = match kind {
            ServiceKind::Users => users::router(
                UsersState {
                    store: stores.users,
                    codec,
                    token_ttl: token_ttl(config.auth.token_ttl_secs),
                },
                internal,
            ),
            ServiceKind::Orders => orders::router(
                OrdersState {
                    store: stores.projects,
                },
                internal,
            ),
        };

        let router = domain
            .route("/health", get(move || health(kind)))
            .layer(
                ServiceBuilder::new()
                    .layer(RequestIdLayer)
                    .layer(TraceLayer::new_for_http().make_span_with(RequestSpan)),
            );

        Ok(Self { kind, router })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the service until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(service = self.kind.name(), address = %addr, "Service listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(service = self.kind.name(), "Service stopped");
        Ok(())
    }
}

fn token_ttl(secs: u64) -> chrono::Duration {
    // Bounded so `iat + ttl` cannot overflow.
    chrono::Duration::seconds(secs.min(MAX_TOKEN_TTL_SECS) as i64)
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
}

async fn health(kind: ServiceKind) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        service: kind.name(),
    })
}

//! Shared utilities for integration tests.
//!
//! Every server binds `127.0.0.1:0` so tests can run in parallel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, Uri},
    Json, Router,
};
use chrono::Duration;
use identity_gateway::auth::claims::IdentityClaims;
use identity_gateway::auth::roles::{Role, RoleSet};
use identity_gateway::auth::token::TokenCodec;
use identity_gateway::config::schema::UpstreamConfig;
use identity_gateway::{GatewayConfig, HttpServer, ServiceKind, ServiceServer, Shutdown};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

pub const SECRET: &str = "integration-secret-0123456789abcdef";

/// Base config with the test secret and no upstreams.
pub fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.secret = SECRET.to_string();
    config.upstreams.clear();
    config
}

pub fn upstream(name: &str, prefix: &str, target: SocketAddr) -> UpstreamConfig {
    UpstreamConfig {
        name: name.to_string(),
        prefix: prefix.to_string(),
        target: format!("http://{}", target),
        rewrite: None,
    }
}

pub fn codec() -> TokenCodec {
    TokenCodec::new(SECRET.as_bytes()).unwrap()
}

pub fn claims(id: &str, roles: &[Role]) -> IdentityClaims {
    IdentityClaims::new(
        id,
        format!("{}@example.com", id),
        RoleSet::new(roles.iter().copied()),
    )
}

pub fn token_for(claims: &IdentityClaims) -> String {
    codec().issue(claims, Duration::hours(1)).unwrap()
}

pub fn expired_token_for(claims: &IdentityClaims) -> String {
    codec()
        .issue_at(claims, chrono::Utc::now() - Duration::hours(2), Duration::hours(1))
        .unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Run a gateway on an ephemeral port.
pub async fn spawn_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// Run an internal service on an ephemeral port.
pub async fn spawn_service(kind: ServiceKind, config: &GatewayConfig) -> (SocketAddr, Shutdown) {
    let server = ServiceServer::new(kind, config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// Upstream that answers with what it received: method, path, query,
/// headers and body.
pub async fn start_echo_upstream() -> SocketAddr {
    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
        let headers: serde_json::Map<String, Value> = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    Value::String(value.to_str().unwrap_or_default().to_string()),
                )
            })
            .collect();

        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "headers": headers,
            "body": String::from_utf8_lossy(&body),
        }))
    }

    let app = Router::new().fallback(echo);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Upstream that accepts connections, reads the request and never answers.
/// Returns its address and a counter of accepted connections.
pub async fn start_silent_upstream() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                // Hold the connection open until the peer goes away.
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });

    (addr, accepted)
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

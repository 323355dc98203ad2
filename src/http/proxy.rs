//! Reverse dispatch to internal services.
//!
//! # Responsibilities
//! - Pick the upstream by longest path prefix and rewrite the path
//! - Strip hop-by-hop headers and any client-supplied identity
//! - Attach identity and correlation headers for authenticated callers
//! - Relay the upstream response unmodified, body streamed
//! - Map connect failures to 502 and response timeouts to 504
//!
//! # Design Decisions
//! - The request body is buffered only when a retry is possible
//!   (idempotent method, retries enabled); otherwise it is streamed once
//! - Dropping the dispatch future (client went away) drops the upstream call

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::auth::claims::IdentityClaims;
use crate::auth::propagation;
use crate::http::request::{RequestId, RequestIdExt, X_REQUEST_ID};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::resilience::retries::is_retryable;
use crate::resilience::timeouts::with_deadline;
use crate::resilience::{RetryPolicy, Timeouts};
use crate::routing::matcher::normalize_path;
use crate::routing::router::ServiceRouter;

pub type HttpClient = Client<HttpConnector, Body>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client: SocketAddr) {
    let ip = client.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, ip),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Hand the upstream response back with its body streamed through.
fn relay(response: Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    remove_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// Forwards gateway requests to the matching internal service.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: HttpClient,
    router: ServiceRouter,
    retry: RetryPolicy,
    timeouts: Timeouts,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        router: ServiceRouter,
        retry: RetryPolicy,
        timeouts: Timeouts,
        max_body_bytes: usize,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeouts.connect));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            router,
            retry,
            timeouts,
            max_body_bytes,
        }
    }

    pub fn router(&self) -> &ServiceRouter {
        &self.router
    }

    /// Forward one request. Identity headers are attached only when the edge
    /// stored [`IdentityClaims`] on the request.
    pub async fn dispatch(&self, request: Request<Body>) -> Result<Response<Body>, ApiError> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = normalize_path(request.uri().path());

        let Some(route) = self.router.match_path(&path) else {
            tracing::info!(path = %path, "No upstream matched");
            metrics::record_request(method.as_str(), 404, "none", start);
            return Err(ApiError::NotFound(format!("No service handles '{}'", path)));
        };
        let service = route.name();

        let uri = route
            .upstream_uri(&path, request.uri().query())
            .map_err(|e| ApiError::internal(format!("bad upstream uri for '{}': {}", service, e)))?;

        let request_id = request
            .request_id()
            .cloned()
            .unwrap_or_else(|| RequestId::tag(request.headers()));
        let claims = request.extensions().get::<IdentityClaims>().cloned();
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        let (parts, body) = request.into_parts();

        let mut headers = parts.headers;
        remove_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        match &claims {
            Some(claims) => propagation::inject(&mut headers, claims, &request_id)
                .map_err(|e| ApiError::internal(format!("cannot propagate identity: {}", e)))?,
            None => {
                propagation::strip(&mut headers);
                headers.insert(X_REQUEST_ID, request_id.header_value());
            }
        }
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut headers, addr);
        }

        let max_attempts = self.retry.max_attempts_for(&method);
        let (buffered, mut streamed): (Option<Bytes>, Option<Body>) = if max_attempts > 1 {
            let bytes = axum::body::to_bytes(body, self.max_body_bytes)
                .await
                .map_err(|e| ApiError::validation(format!("Unreadable request body: {}", e)))?;
            (Some(bytes), None)
        } else {
            (None, Some(body))
        };

        tracing::debug!(
            service = %service,
            upstream = %uri,
            authenticated = claims.is_some(),
            "Dispatching request"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;

            let body = match (&buffered, streamed.take()) {
                (Some(bytes), _) => Body::from(bytes.clone()),
                (None, Some(body)) => body,
                (None, None) => Body::empty(),
            };

            let mut upstream_req = Request::new(body);
            *upstream_req.method_mut() = method.clone();
            *upstream_req.uri_mut() = uri.clone();
            *upstream_req.headers_mut() = headers.clone();

            match with_deadline(self.timeouts.upstream, self.client.request(upstream_req)).await {
                Ok(Ok(response)) => {
                    let status = response.status();
                    metrics::record_request(method.as_str(), status.as_u16(), service, start);
                    tracing::debug!(service = %service, status = %status, "Upstream responded");

                    return Ok(relay(response));
                }
                Ok(Err(err)) => {
                    let connect = err.is_connect();
                    if attempt < max_attempts && is_retryable(&method, connect) {
                        let delay = self.retry.backoff(attempt);
                        tracing::info!(
                            service = %service,
                            attempt,
                            delay = ?delay,
                            error = %err,
                            "Retrying after connection failure"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let kind = if connect { "connect" } else { "request" };
                    tracing::error!(service = %service, attempt, error = %err, "Upstream error");
                    metrics::record_upstream_error(service, kind);
                    metrics::record_request(method.as_str(), 502, service, start);
                    return Err(ApiError::UpstreamUnavailable {
                        service: service.to_string(),
                        reason: err.to_string(),
                        timed_out: false,
                    });
                }
                Err(elapsed) => {
                    tracing::error!(service = %service, attempt, error = %elapsed, "Upstream timed out");
                    metrics::record_upstream_error(service, "timeout");
                    metrics::record_request(method.as_str(), 504, service, start);
                    return Err(ApiError::UpstreamUnavailable {
                        service: service.to_string(),
                        reason: elapsed.to_string(),
                        timed_out: true,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        remove_hop_by_hop(&mut headers);

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-trace-hop").is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert!(headers.get(header::ACCEPT).is_some());
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.7:5000".parse().unwrap());
        assert_eq!(headers.get(&X_FORWARDED_FOR).unwrap(), "10.0.0.7");

        append_forwarded_for(&mut headers, "10.0.0.8:5000".parse().unwrap());
        assert_eq!(headers.get(&X_FORWARDED_FOR).unwrap(), "10.0.0.7, 10.0.0.8");
    }
}

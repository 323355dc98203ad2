//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, auth failures, upstream errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency by service
//! - `gateway_auth_failures_total` (counter): edge rejections by reason
//! - `gateway_upstream_errors_total` (counter): dispatch failures by service, kind
//! - `internal_identity_source_total` (counter): how internal services
//!   resolved the caller (propagated, token, anonymous)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests and the
//!   internal services pay nothing when the exporter is off
//! - Labels are low-cardinality: never user ids or raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_upstream_error(service: &str, kind: &'static str) {
    counter!(
        "gateway_upstream_errors_total",
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_identity_source(source: &'static str) {
    counter!("internal_identity_source_total", "source" => source).increment(1);
}

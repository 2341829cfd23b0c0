//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, outcome
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_credential_mints_total` (counter): mints by provider, outcome
//! - `proxy_credential_cache_hits_total` (counter): tokens served from cache
//! - `proxy_upstream_responses_total` (counter): backend answers by status, body kind
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! embedders need not call [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_credential(provider: &'static str, outcome: &'static str) {
    counter!("proxy_credential_mints_total", "provider" => provider, "outcome" => outcome)
        .increment(1);
}

pub fn record_credential_cache_hit(provider: &'static str) {
    counter!("proxy_credential_cache_hits_total", "provider" => provider).increment(1);
}

pub fn record_upstream(status: u16, binary: bool) {
    let body = if binary { "binary" } else { "text" };
    counter!("proxy_upstream_responses_total", "status" => status.to_string(), "body" => body)
        .increment(1);
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by method, status, backend
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_upstream_calls_total` (counter): per backend, by outcome
//! - `gateway_backend_alive` (gauge): 1=alive, 0=dead
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_breaker_transitions_total` (counter): by breaker, from, to
//! - `gateway_admission_denied_total` (counter)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::BreakerState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// `backend` is `"none"` when no backend was reached.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_outcome(backend: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_upstream_calls_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_backend_liveness(address: &str, alive: bool) {
    metrics::gauge!("gateway_backend_alive", "backend" => address.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}

pub fn set_breaker_state(name: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::Open => 1.0,
        BreakerState::HalfOpen => 2.0,
    };
    metrics::gauge!("gateway_breaker_state", "breaker" => name.to_string()).set(value);
}

pub fn record_breaker_transition(name: &str, from: BreakerState, to: BreakerState) {
    metrics::counter!(
        "gateway_breaker_transitions_total",
        "breaker" => name.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    set_breaker_state(name, to);
}

pub fn record_admission_denied() {
    metrics::counter!("gateway_admission_denied_total").increment(1);
}

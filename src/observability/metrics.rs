//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by task and status
//! - `proxy_request_duration_seconds` (histogram): handler latency by task
//! - `proxy_access_denied_total` (counter): requests rejected by allow/deny rules
//! - `proxy_route_miss_total` (counter): requests with no matching location

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_request(task: &'static str, status: u16, start: Instant) {
    counter!("proxy_requests_total", "task" => task, "status" => status.to_string()).increment(1);
    histogram!("proxy_request_duration_seconds", "task" => task).record(start.elapsed().as_secs_f64());
}

pub fn record_access_denied() {
    counter!("proxy_access_denied_total").increment(1);
}

pub fn record_route_miss() {
    counter!("proxy_route_miss_total").increment(1);
}

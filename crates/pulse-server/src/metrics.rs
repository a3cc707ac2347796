//! Metrics collection and export for Pulse.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::net::SocketAddr;
use tenvis_pulse_routes::{LoggerHook, RouteError, TracingLogger};
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "pulse_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "pulse_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "pulse_connections_rejected_total";
    pub const FRAMES_TOTAL: &str = "pulse_frames_total";
    pub const FRAMES_BYTES: &str = "pulse_frames_bytes";
    pub const FRAME_LATENCY_SECONDS: &str = "pulse_frame_latency_seconds";
    pub const EVENTS_TOTAL: &str = "pulse_events_total";
    pub const EVENT_ERRORS_TOTAL: &str = "pulse_event_errors_total";
    pub const ERRORS_TOTAL: &str = "pulse_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused by middleware or limits"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of frames processed");
    metrics::describe_histogram!(
        names::FRAME_LATENCY_SECONDS,
        "Inbound frame handling latency in seconds"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Routed events by outcome");
    metrics::describe_counter!(
        names::EVENT_ERRORS_TOTAL,
        "Failed routed events by error kind and stage"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of transport errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a refused connection.
pub fn record_rejection(reason: &'static str) {
    counter!(names::CONNECTIONS_REJECTED, "reason" => reason).increment(1);
}

/// Record a frame.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAMES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record inbound frame handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::FRAME_LATENCY_SECONDS).record(seconds);
}

/// Record a transport error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Logger hook counting route outcomes, then logging through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct MetricsLogger {
    inner: TracingLogger,
}

impl MetricsLogger {
    /// Create a metrics logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerHook for MetricsLogger {
    fn log(&self, event: &str, payload: &Value, error: Option<&RouteError>, elapsed: &str) {
        let outcome = if error.is_some() { "error" } else { "ok" };
        counter!(names::EVENTS_TOTAL, "event" => event.to_string(), "outcome" => outcome)
            .increment(1);
        if let Some(err) = error {
            let stage = if err.is_guard_failure() { "guard" } else { "work" };
            counter!(
                names::EVENT_ERRORS_TOTAL,
                "event" => event.to_string(),
                "kind" => err.kind(),
                "stage" => stage
            )
            .increment(1);
        }
        self.inner.log(event, payload, error, elapsed);
    }
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

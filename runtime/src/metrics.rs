//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the core components:
//! - Eventstore push/query operations
//! - Projection worker throughput and lag
//! - Circuit breaker state
//! - Retry attempts
//!
//! # Example
//!
//! ```rust,no_run
//! use iam_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start().await?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Initialize metrics and start the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns error if metrics exporter cannot be installed or server cannot bind.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this will fail
    /// with `MetricsError::Install`. In production, ensure this is only called once.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        // Register all metric descriptions
        register_metrics();

        // Build and install the Prometheus exporter
        let builder = PrometheusBuilder::new()
            // Configure histogram buckets for latency measurements
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        // Try to install the recorder
        // In tests, this may fail if a recorder is already installed
        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    // In tests, multiple MetricsServer instances may be created
                    // We'll allow this but warn about it
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Eventstore metrics
    describe_counter!(
        "eventstore_events_appended_total",
        "Total number of events appended to the eventstore"
    );
    describe_counter!(
        "eventstore_events_queried_total",
        "Total number of events returned by query()/events_after_position()"
    );
    describe_counter!(
        "eventstore_concurrency_conflicts_total",
        "Total number of push() calls that failed with concurrency_conflict"
    );
    describe_histogram!(
        "eventstore_push_duration_seconds",
        "Time taken to append a command batch"
    );
    describe_histogram!(
        "eventstore_query_duration_seconds",
        "Time taken to execute a filtered query"
    );

    // Command layer metrics
    describe_counter!(
        "command_handled_total",
        "Total number of commands processed, labelled by command id"
    );
    describe_counter!(
        "command_errors_total",
        "Total number of commands that returned a typed error"
    );
    describe_histogram!(
        "command_duration_seconds",
        "Time taken to execute a command end to end"
    );

    // Projection metrics
    describe_counter!(
        "projection_events_applied_total",
        "Total number of events applied by a projection worker"
    );
    describe_counter!(
        "projection_failures_total",
        "Total number of reducer failures observed by a projection worker"
    );
    describe_gauge!(
        "projection_lag_events",
        "Difference between the eventstore tip position and a projection's checkpoint position"
    );
    describe_histogram!(
        "projection_tick_duration_seconds",
        "Time taken to execute one fetch-apply-advance cycle"
    );

    // Circuit breaker metrics
    describe_gauge!(
        "circuit_breaker_state",
        "Current circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "circuit_breaker_calls_total",
        "Total number of calls through circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_successes_total",
        "Total number of successful calls"
    );
    describe_counter!(
        "circuit_breaker_failures_total",
        "Total number of failed calls"
    );
    describe_counter!(
        "circuit_breaker_rejections_total",
        "Total number of rejected calls (circuit open)"
    );

    // Retry metrics
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!(
        "retry_successes_total",
        "Total number of successful retries"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of retry attempts that exhausted max retries"
    );
}

/// Eventstore metrics recorder.
pub struct EventStoreMetrics;

impl EventStoreMetrics {
    /// Record a `push` operation.
    pub fn record_push(events: usize, duration: Duration) {
        counter!("eventstore_events_appended_total").increment(events as u64);
        histogram!("eventstore_push_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a `query`/`events_after_position` operation.
    pub fn record_query(events: usize, duration: Duration) {
        counter!("eventstore_events_queried_total").increment(events as u64);
        histogram!("eventstore_query_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a `concurrency_conflict` failure.
    pub fn record_concurrency_conflict() {
        counter!("eventstore_concurrency_conflicts_total").increment(1);
    }
}

/// Command layer metrics recorder.
pub struct CommandMetrics;

impl CommandMetrics {
    /// Record a command execution.
    pub fn record_command(duration: Duration) {
        counter!("command_handled_total").increment(1);
        histogram!("command_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a command error.
    pub fn record_error() {
        counter!("command_errors_total").increment(1);
    }
}

/// Projection worker metrics recorder.
pub struct ProjectionMetrics;

impl ProjectionMetrics {
    /// Record a batch of applied events.
    pub fn record_applied(count: usize, duration: Duration) {
        counter!("projection_events_applied_total").increment(count as u64);
        histogram!("projection_tick_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a reducer failure.
    pub fn record_failure() {
        counter!("projection_failures_total").increment(1);
    }

    /// Record current lag behind the eventstore tip.
    pub fn record_lag(lag: u64) {
        gauge!("projection_lag_events").set(lag as f64);
    }
}

/// Circuit breaker metrics recorder.
pub struct CircuitBreakerMetrics;

impl CircuitBreakerMetrics {
    /// Record circuit breaker state.
    ///
    /// 0 = Closed, 1 = `HalfOpen`, 2 = Open
    pub fn record_state(state: f64) {
        gauge!("circuit_breaker_state").set(state);
    }

    /// Record a call attempt.
    pub fn record_call() {
        counter!("circuit_breaker_calls_total").increment(1);
    }

    /// Record a successful call.
    pub fn record_success() {
        counter!("circuit_breaker_successes_total").increment(1);
    }

    /// Record a failed call.
    pub fn record_failure() {
        counter!("circuit_breaker_failures_total").increment(1);
    }

    /// Record a rejected call (circuit open).
    pub fn record_rejection() {
        counter!("circuit_breaker_rejections_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

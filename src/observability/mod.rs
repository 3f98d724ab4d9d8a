//! Observability module for the oracle gateway.
//!
//! Provides logging and metrics. Metric helpers are no-ops until a recorder
//! is installed by [`run_metrics_server`], so library code and tests can call
//! them unconditionally.

use crate::config::ObservabilityConfig;
use crate::error::{OracleError, Result};
use crate::shutdown::ShutdownCoordinator;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| OracleError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| OracleError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Run the Prometheus metrics server until shutdown.
pub async fn run_metrics_server(
    config: ObservabilityConfig,
    shutdown: ShutdownCoordinator,
) -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| OracleError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();

    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    );

    let listener = TcpListener::bind(config.metrics_addr).await?;
    info!(addr = %config.metrics_addr, "Metrics server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await
        .map_err(|e| OracleError::Network(e.to_string()))?;

    Ok(())
}

/// Register standard metrics.
fn register_metrics() {
    gauge!("oracle_admission_in_flight").set(0.0);
    counter!("oracle_admission_rejected_total").absolute(0);
    counter!("oracle_admission_timeouts_total").absolute(0);
    counter!("oracle_verify_requests_total").absolute(0);
    counter!("oracle_scoring_errors_total").absolute(0);
}

/// Record the outcome of a `POST /verify` request.
pub fn record_verify_request(outcome: &'static str, status: u16) {
    counter!(
        "oracle_verify_requests_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Update the in-flight admission gauge.
pub fn set_admission_in_flight(in_flight: usize) {
    gauge!("oracle_admission_in_flight").set(in_flight as f64);
}

/// Record a request refused for lack of capacity.
pub fn record_admission_rejected() {
    counter!("oracle_admission_rejected_total").increment(1);
}

/// Record a request abandoned at its deadline.
pub fn record_admission_timeout() {
    counter!("oracle_admission_timeouts_total").increment(1);
}

/// Record one scoring call.
pub fn record_scoring(backend: &str, elapsed: Duration, ok: bool) {
    histogram!("oracle_scoring_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
    if !ok {
        counter!("oracle_scoring_errors_total", "backend" => backend.to_string()).increment(1);
    }
}

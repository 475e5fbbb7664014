//! Process-wide logging and metrics setup shared by the binaries

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{register_metrics, LATENCY_BUCKETS};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `observability.log_level` when set.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    // A second init (tests, embedded use) keeps the first subscriber
    let _ = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Serve Prometheus metrics on `0.0.0.0:{metrics_port}` and describe every
/// metric. Port 0 disables the exporter.
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    let port = config.metrics_port;
    if port == 0 {
        tracing::info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", config.service_name.clone())
        .set_buckets(LATENCY_BUCKETS)
        .and_then(|builder| builder.install())
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to install metrics exporter: {}", e),
        })?;

    register_metrics();
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

use axum::{routing::get, Router};
use futures::future::ready;
use health::HealthRegistry;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tracing::error;

use crate::config::Config;

pub async fn index() -> &'static str {
    "news ingest service"
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const BUCKETS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 50.0, 100.0, 250.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .unwrap()
        .install_recorder()
        .unwrap()
}

/// Serve the liveness probes and the prometheus scrape endpoint for the
/// lifetime of the process.
pub fn start_probe_server(config: &Config, liveness: HealthRegistry) -> JoinHandle<()> {
    let recorder_handle = setup_metrics_recorder();
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/metrics", get(move || ready(recorder_handle.render())));

    let bind = format!("{}:{}", config.host, config.port);
    tokio::task::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&bind).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("failed to bind probe server to {}: {}", bind, e);
                return;
            }
        };
        if let Err(e) = axum::serve(listener, router).await {
            error!("probe server exited: {}", e);
        }
    })
}

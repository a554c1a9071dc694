//! HTTP endpoint exposing the Prometheus registry

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;

use super::encode_metrics;

/// Build the router serving `GET /metrics`
pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve the metrics endpoint until `shutdown_signal` resolves
pub async fn serve(
    addr: SocketAddr,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Serving metrics");

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Metrics server shutdown complete");
    Ok(())
}

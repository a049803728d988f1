// Metrics side listener for the relay
//
// Serves /metrics and /health on the metrics port, bound to the same host
// as the relay listener. Kept off the relay router, which answers every
// non-webhook path with 405.

use crate::config::Config;
use crate::metrics;
use crate::registry::Registry;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Routes served by the metrics listener, reading from `registry`
pub fn metrics_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .with_state(registry)
}

/// Bind `listen.host:metrics.port` and serve the metrics routes
///
/// Registers the relay metrics first; a second call in the same process
/// fails on that step.
pub async fn run(config: &Config, registry: Arc<Registry>) -> Result<()> {
    metrics::init().context("Failed to register relay metrics")?;

    let addr = format!("{}:{}", config.listen.host, config.metrics.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener {}", addr))?;

    info!(service = %addr, "metrics listening...");
    axum::serve(listener, metrics_router(registry))
        .await
        .context("Metrics server error")
}

async fn handle_metrics(State(registry): State<Arc<Registry>>) -> Response {
    // Refreshed on every scrape
    metrics::REGISTERED_WEBHOOKS.set(registry.len().await as i64);

    match metrics::gather_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            error!(error = %e, "failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Registry and delivery summary, one `key value` pair per line
async fn handle_health(State(registry): State<Arc<Registry>>) -> String {
    format!(
        "registered_webhooks {}\ndeliveries_in_flight {}\n",
        registry.len().await,
        metrics::DELIVERIES_IN_FLIGHT.get()
    )
}

// Prometheus metrics for the webhook relay
//
// Exposed on the /metrics endpoint of the metrics server:
// - Inbound requests by method and outcome (counter)
// - Delivery outcomes (counter)
// - Deliveries currently in flight (gauge)
// - Registered webhook names (gauge)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Front end
    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webhooker_requests_total", "Inbound requests by method and outcome"),
        &["method", "outcome"]
    ).expect("Failed to create requests total metric");

    // Deliveries
    pub static ref DELIVERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webhooker_deliveries_total", "Finished delivery attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create deliveries total metric");

    pub static ref DELIVERIES_IN_FLIGHT: IntGauge = IntGauge::new(
        "webhooker_deliveries_in_flight",
        "Delivery attempts that have not reached a terminal state"
    ).expect("Failed to create deliveries in flight metric");

    // Registry
    pub static ref REGISTERED_WEBHOOKS: IntGauge = IntGauge::new(
        "webhooker_registered_webhooks",
        "Number of registered webhook names"
    ).expect("Failed to create registered webhooks metric");
}

/// Register all relay metrics - must be called once at startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DELIVERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DELIVERIES_IN_FLIGHT.clone()))?;
    REGISTRY.register(Box::new(REGISTERED_WEBHOOKS.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

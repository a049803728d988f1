// Helpers shared by the integration tests

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use webhooker::config::Config;
use webhooker::server::relay_router;
use webhooker::{Dispatcher, Registry};
use wiremock::{MockServer, Request};

/// Serve the relay for `config_yaml` on an ephemeral port, returning its base URL
pub async fn start_relay(config_yaml: &str) -> String {
    let config = Config::from_yaml(config_yaml).unwrap();
    let registry = Arc::new(Registry::new());
    config.register_webhooks(&registry).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = relay_router(Dispatcher::new(registry));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Poll `server` until it has seen `expected` requests or five seconds pass
pub async fn wait_for_requests(server: &MockServer, expected: usize) -> Vec<Request> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= expected || Instant::now() >= deadline {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

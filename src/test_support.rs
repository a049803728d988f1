// Shared helpers for unit tests

use std::time::Duration;
use tokio::time::Instant;
use wiremock::{MockServer, Request};

/// Poll `server` until it has seen `expected` requests or five seconds pass
///
/// Deliveries are detached, so tests observe them from the target side.
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

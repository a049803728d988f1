// Webhook dispatcher - fan-out of inbound payloads to registered targets
//
// Handles:
// - Resolving a webhook name against the registry
// - Launching one detached delivery task per target
// - Single-attempt POST forwarding with the inbound body and headers
//
// Delivery tasks are never joined. Their outcome is logged and counted,
// never reported back to the request that launched them, and a task may
// still be running after the caller already received its response.

use crate::metrics;
use crate::registry::{Registry, TargetEndpoint};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use url::Url;
use uuid::Uuid;

/// Result of dispatching an inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Name is registered; one delivery task was launched per target
    Accepted(usize),
    /// Name was never registered; nothing was launched
    NotFound,
}

/// Stages a single delivery moves through
///
/// `ResponseRead` and `Failed` are terminal. There is exactly one attempt per
/// target per inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Init,
    UrlParsed,
    RequestBuilt,
    Sent,
    ResponseRead,
    Failed,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryState::Init => "init",
            DeliveryState::UrlParsed => "url_parsed",
            DeliveryState::RequestBuilt => "request_built",
            DeliveryState::Sent => "sent",
            DeliveryState::ResponseRead => "response_read",
            DeliveryState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Reasons a delivery ends in [`DeliveryState::Failed`]
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to create request: {0}")]
    Build(#[source] reqwest::Error),

    #[error("failed to perform client request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to read response body (status {status}): {source}")]
    Body {
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },
}

impl DeliveryError {
    /// Last state reached before the failure
    pub fn reached(&self) -> DeliveryState {
        match self {
            DeliveryError::InvalidUrl { .. } => DeliveryState::Init,
            DeliveryError::Build(_) => DeliveryState::UrlParsed,
            DeliveryError::Transport(_) => DeliveryState::RequestBuilt,
            DeliveryError::Body { .. } => DeliveryState::Sent,
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            DeliveryError::InvalidUrl { .. } => "invalid_url",
            _ => "failed",
        }
    }
}

/// What a target answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: StatusCode,
    pub body_bytes: usize,
}

/// Resolves webhook names and fans payloads out to their targets
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    client: reqwest::Client,
}

impl Dispatcher {
    /// Create a dispatcher over `registry` with a default HTTP client
    ///
    /// The client applies no request timeout and uses the platform trust store.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_client(registry, reqwest::Client::new())
    }

    /// Create a dispatcher with a caller-supplied HTTP client
    pub fn with_client(registry: Arc<Registry>, client: reqwest::Client) -> Self {
        Self { registry, client }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolve `name` and launch one detached delivery per target
    ///
    /// Returns as soon as every task is spawned; it never waits on a target,
    /// even when there are none.
    pub async fn dispatch(&self, name: &str, body: Bytes, headers: &HeaderMap) -> DispatchOutcome {
        let Some(targets) = self.registry.get(name).await else {
            return DispatchOutcome::NotFound;
        };

        let delivery_id = Uuid::new_v4();
        debug!(
            webhook = name,
            %delivery_id,
            count = targets.len(),
            body_bytes = body.len(),
            "dispatching webhook"
        );

        for target in targets.iter() {
            let span = info_span!(
                "delivery",
                webhook = name,
                %delivery_id,
                target = %target,
                host = field::Empty,
            );
            let client = self.client.clone();
            let target = target.clone();
            let headers = forwarded_headers(headers);
            let body = body.clone();

            // Detached: the handle is dropped on purpose
            tokio::spawn(run_delivery(client, target, headers, body).instrument(span));
        }

        DispatchOutcome::Accepted(targets.len())
    }
}

/// Build an independent copy of the inbound headers for one delivery
///
/// `host`, `content-length` and `transfer-encoding` are dropped; the client
/// derives them from the target URL and the body.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);
    headers
}

/// Perform a single POST of `body` to `target` and drain the response
pub async fn deliver(
    client: &reqwest::Client,
    target: &TargetEndpoint,
    headers: HeaderMap,
    body: Bytes,
) -> Result<DeliveryReport, DeliveryError> {
    let url = Url::parse(target.as_str()).map_err(|source| DeliveryError::InvalidUrl {
        url: target.to_string(),
        source,
    })?;
    if let Some(host) = url.host_str() {
        Span::current().record("host", host);
    }

    let request = client
        .post(url)
        .headers(headers)
        .body(body)
        .build()
        .map_err(DeliveryError::Build)?;

    let response = client
        .execute(request)
        .await
        .map_err(DeliveryError::Transport)?;
    let status = response.status();

    // Drained even though the contents are unused
    let body = response
        .bytes()
        .await
        .map_err(|source| DeliveryError::Body { status, source })?;

    Ok(DeliveryReport {
        status,
        body_bytes: body.len(),
    })
}

async fn run_delivery(
    client: reqwest::Client,
    target: TargetEndpoint,
    headers: HeaderMap,
    body: Bytes,
) {
    metrics::DELIVERIES_IN_FLIGHT.inc();
    let result = deliver(&client, &target, headers, body).await;
    metrics::DELIVERIES_IN_FLIGHT.dec();

    match result {
        Ok(report) => {
            metrics::DELIVERIES_TOTAL
                .with_label_values(&["delivered"])
                .inc();
            info!(
                status = %report.status,
                body_bytes = report.body_bytes,
                state = %DeliveryState::ResponseRead,
                "target responded"
            );
        }
        Err(err @ DeliveryError::InvalidUrl { .. }) => {
            metrics::DELIVERIES_TOTAL
                .with_label_values(&[err.metric_label()])
                .inc();
            error!(error = %err, state = %DeliveryState::Failed, "invalid target URL");
        }
        Err(err) => {
            metrics::DELIVERIES_TOTAL
                .with_label_values(&[err.metric_label()])
                .inc();
            warn!(
                error = %err,
                reached = %err.reached(),
                state = %DeliveryState::Failed,
                "delivery failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WebhookName;
    use crate::test_support::wait_for_requests;
    use reqwest::header::HeaderValue;
    use std::time::Duration;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn inbound_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-event", HeaderValue::from_static("order.created"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert(HOST, HeaderValue::from_static("relay.internal"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("8"));
        headers
    }

    async fn registry_with(entries: &[(&str, Vec<String>)]) -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        for (name, targets) in entries {
            registry
                .set(
                    WebhookName::new(*name).unwrap(),
                    targets.iter().map(|t| TargetEndpoint::from(t.as_str())).collect(),
                    false,
                )
                .await
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_forwarded_headers_is_independent_copy() {
        let original = inbound_headers();
        let mut copy = forwarded_headers(&original);
        copy.insert("x-routed", HeaderValue::from_static("yes"));
        copy.remove("x-event");

        assert!(original.get("x-routed").is_none());
        assert_eq!(original.get("x-event").unwrap(), "order.created");
        assert_eq!(original.get(HOST).unwrap(), "relay.internal");

        let fresh = forwarded_headers(&original);
        assert_eq!(fresh.get("x-event").unwrap(), "order.created");
        assert_eq!(fresh.get("content-type").unwrap(), "application/json");
        assert!(fresh.get(HOST).is_none());
        assert!(fresh.get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_delivery_error_reached_state() {
        let err = DeliveryError::InvalidUrl {
            url: "nope".to_string(),
            source: Url::parse("nope").unwrap_err(),
        };
        assert_eq!(err.reached(), DeliveryState::Init);
        assert_eq!(err.metric_label(), "invalid_url");
        assert!(err.to_string().starts_with("invalid URL 'nope'"));
    }

    #[tokio::test]
    async fn test_deliver_forwards_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-event", "order.created"))
            .and(body_bytes(br#"{"id":1}"#.to_vec()))
            .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
            .expect(1)
            .mount(&server)
            .await;

        let target = TargetEndpoint::new(format!("{}/hook", server.uri()));
        let report = deliver(
            &reqwest::Client::new(),
            &target,
            forwarded_headers(&inbound_headers()),
            Bytes::from_static(br#"{"id":1}"#),
        )
        .await
        .unwrap();

        assert_eq!(report.status, StatusCode::ACCEPTED);
        assert_eq!(report.body_bytes, "queued".len());
    }

    #[tokio::test]
    async fn test_deliver_non_success_status_is_still_read() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let target = TargetEndpoint::new(server.uri());
        let report = deliver(&reqwest::Client::new(), &target, HeaderMap::new(), Bytes::new())
            .await
            .unwrap();
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(report.body_bytes, 4);
    }

    #[tokio::test]
    async fn test_deliver_invalid_url() {
        let target = TargetEndpoint::from("not a url");
        let err = deliver(&reqwest::Client::new(), &target, HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_deliver_unreachable_host() {
        let target = TargetEndpoint::from("http://127.0.0.1:1/hook");
        let err = deliver(&reqwest::Client::new(), &target, HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
        assert_eq!(err.reached(), DeliveryState::RequestBuilt);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_name() {
        let dispatcher = Dispatcher::new(registry_with(&[]).await);
        let outcome = dispatcher
            .dispatch("unknown", Bytes::from_static(b"{}"), &HeaderMap::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_dispatch_registered_without_targets() {
        let dispatcher = Dispatcher::new(registry_with(&[("billing", vec![])]).await);
        let outcome = dispatcher
            .dispatch("billing", Bytes::from_static(b"{}"), &HeaderMap::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted(0));
    }

    #[tokio::test]
    async fn test_dispatch_fans_out_to_every_target() {
        let servers = vec![
            MockServer::start().await,
            MockServer::start().await,
            MockServer::start().await,
        ];
        for server in &servers {
            Mock::given(method("POST"))
                .and(path("/hook"))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(server)
                .await;
        }

        let targets: Vec<String> = servers.iter().map(|s| format!("{}/hook", s.uri())).collect();
        let dispatcher = Dispatcher::new(registry_with(&[("orders", targets)]).await);

        let outcome = dispatcher
            .dispatch("orders", Bytes::from_static(br#"{"id":1}"#), &inbound_headers())
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted(3));

        for server in &servers {
            let received = wait_for_requests(server, 1).await;
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].body, br#"{"id":1}"#.to_vec());
            assert_eq!(received[0].headers.get("x-event").unwrap(), "order.created");
            assert_eq!(
                received[0].headers.get("content-type").unwrap(),
                "application/json"
            );
        }
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_targets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new(registry_with(&[("orders", vec![server.uri()])]).await);
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.dispatch("orders", Bytes::from_static(b"slow"), &HeaderMap::new()),
        )
        .await
        .expect("dispatch waited on a target");
        assert_eq!(outcome, DispatchOutcome::Accepted(1));
    }

    #[tokio::test]
    async fn test_dispatch_isolates_failing_targets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let targets = vec![
            "not a url".to_string(),
            "http://127.0.0.1:1/down".to_string(),
            format!("{}/ok", server.uri()),
        ];
        let dispatcher = Dispatcher::new(registry_with(&[("orders", targets)]).await);

        let outcome = dispatcher
            .dispatch("orders", Bytes::from_static(b"payload"), &HeaderMap::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted(3));

        let received = wait_for_requests(&server, 1).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, b"payload".to_vec());
    }

    #[tokio::test]
    async fn test_dispatch_leaves_caller_headers_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new(registry_with(&[("orders", vec![server.uri()])]).await);
        let headers = inbound_headers();
        dispatcher
            .dispatch("orders", Bytes::from_static(b"x"), &headers)
            .await;

        wait_for_requests(&server, 1).await;
        assert_eq!(headers, inbound_headers());
    }
}

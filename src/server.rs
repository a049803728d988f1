// Relay front end - HTTP surface of the webhook relay
//
// Routes:
// - GET  /{name}  always 404, logged with the registration status
// - POST /{name}  404 when unknown, 500 when the body cannot be read,
//                 otherwise 200 once deliveries are launched
// - anything else 405
//
// Every connection is served on the multi-threaded runtime; plain HTTP goes
// through axum::serve, HTTPS through a rustls acceptor loop.

use crate::config::Config;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::metrics::REQUESTS_TOTAL;
use crate::tls::TlsConfig;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Build the relay router over `dispatcher`
///
/// The inbound body is not size-limited; only a failed read is rejected.
pub fn relay_router(dispatcher: Dispatcher) -> Router {
    let webhook = get(handle_get).post(handle_post).fallback(handle_default);

    Router::new()
        .route("/{*name}", webhook)
        .fallback(handle_root)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Bind the configured address and serve until the listener fails
pub async fn run(config: &Config, dispatcher: Dispatcher) -> Result<()> {
    let app = relay_router(dispatcher);
    let addr = config.listen_addr();

    let tls = if config.ssl() {
        let tls = TlsConfig::from_pem_files(&config.listen.ssl.crt, &config.listen.ssl.key)
            .context("Failed to load TLS certificate and key")?;
        Some(tls)
    } else {
        None
    };

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    match tls {
        Some(tls) => {
            info!(service = %addr, scheme = "https", "listening...");
            serve_tls(listener, app, tls).await
        }
        None => {
            info!(service = %addr, scheme = "http", "listening...");
            axum::serve(listener, app).await.context("Relay server error")
        }
    }
}

/// Accept TLS connections on `listener` and serve `app` on each
pub async fn serve_tls(listener: TcpListener, app: Router, tls: TlsConfig) -> Result<()> {
    let acceptor = TlsAcceptor::from(tls.server_config);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let app = app.clone();

        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let builder = auto::Builder::new(TokioExecutor::new());
            let service = TowerToHyperService::new(app);
            if let Err(e) = builder
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, error = %e, "error serving connection");
            }
        });
    }
}

/// Status response whose body is the canonical reason phrase
fn respond(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

/// Webhook name carried by the request path, percent-decoded
///
/// `None` when the path does not decode to UTF-8; such a name can never be
/// registered.
fn webhook_name(uri: &Uri) -> Option<String> {
    let raw = uri.path().strip_prefix('/').unwrap_or(uri.path());
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}

async fn handle_get(State(dispatcher): State<Dispatcher>, uri: Uri) -> Response {
    let found = match webhook_name(&uri) {
        Some(name) => dispatcher.registry().get(&name).await.map(|t| (name, t.len())),
        None => None,
    };
    match found {
        Some((name, count)) => info!(name = %name, found = true, count, "GET"),
        None => warn!(path = %uri.path(), found = false, "GET"),
    }

    // Every GET is answered as not found, registered or not
    REQUESTS_TOTAL.with_label_values(&["GET", "rejected"]).inc();
    respond(StatusCode::NOT_FOUND)
}

async fn handle_post(
    State(dispatcher): State<Dispatcher>,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let Some(name) = webhook_name(&uri) else {
        return not_found(uri.path());
    };

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            // An unknown name still wins over an unreadable body
            if dispatcher.registry().get(&name).await.is_none() {
                return not_found(&name);
            }
            error!(name = %name, error = %rejection, "failed to read incoming request body");
            REQUESTS_TOTAL.with_label_values(&["POST", "unreadable"]).inc();
            return respond(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match dispatcher.dispatch(&name, body, &headers).await {
        DispatchOutcome::Accepted(count) => {
            info!(name = %name, count, "POST");
            REQUESTS_TOTAL.with_label_values(&["POST", "accepted"]).inc();
            respond(StatusCode::OK)
        }
        DispatchOutcome::NotFound => not_found(&name),
    }
}

fn not_found(name: &str) -> Response {
    info!(name = %name, "name not found");
    REQUESTS_TOTAL.with_label_values(&["POST", "not_found"]).inc();
    respond(StatusCode::NOT_FOUND)
}

/// Requests to `/` carry an empty name, which can never be registered
async fn handle_root(method: Method) -> Response {
    match method {
        Method::GET | Method::HEAD => {
            warn!(name = "", found = false, "GET");
            REQUESTS_TOTAL.with_label_values(&["GET", "rejected"]).inc();
            respond(StatusCode::NOT_FOUND)
        }
        Method::POST => not_found(""),
        _ => handle_default(method).await,
    }
}

async fn handle_default(method: Method) -> Response {
    info!(%method, "default");
    REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), "not_allowed"])
        .inc();
    respond(StatusCode::METHOD_NOT_ALLOWED)
}

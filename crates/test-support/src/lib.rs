//! In-process HTTP fixtures shared by the workspace test suites.
//!
//! Nothing here talks to the network: every server binds `127.0.0.1:0` and is torn down with a
//! graceful-shutdown signal.

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// 1x1 transparent PNG served by the echo server under `/image`.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

pub struct TestServer {
    pub base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    /// Signal graceful shutdown and wait for the server task.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task panicked or the server itself failed.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle
            .await
            .context("server task join")?
            .context("server result")
    }
}

/// Serve `app` on an ephemeral localhost port.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn spawn_router(app: Router) -> anyhow::Result<TestServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await.context("bind")?;
    let addr = listener.local_addr().context("local_addr")?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let handle = tokio::spawn(async move { server.await });
    Ok(TestServer {
        base_url: format!("http://{addr}"),
        shutdown_tx: Some(shutdown_tx),
        handle,
    })
}

/// Echo server: every request is answered with a JSON description of itself.
///
/// ```json
/// {"method": "GET", "path": "/pets/42", "query": "", "headers": {...}, "body": "", "contentType": null}
/// ```
///
/// Two paths behave differently: `/status/{code}/...` answers with that status (body is still
/// the echo), and `/image` answers with [`TINY_PNG`] as `image/png`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn spawn_echo_server() -> anyhow::Result<TestServer> {
    let app = Router::new()
        .route("/", any(echo_handler))
        .route("/{*path}", any(echo_handler));
    spawn_router(app).await
}

async fn echo_handler(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    if uri.path() == "/image" {
        return ([(header::CONTENT_TYPE, "image/png")], TINY_PNG).into_response();
    }

    let mut header_map = Map::new();
    for (name, value) in &headers {
        if let Ok(v) = value.to_str() {
            header_map.insert(name.as_str().to_string(), json!(v));
        }
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let echoed = json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query().unwrap_or(""),
        "headers": Value::Object(header_map),
        "body": String::from_utf8_lossy(&body),
        "contentType": content_type,
    });

    let status = uri
        .path()
        .strip_prefix("/status/")
        .and_then(|rest| rest.split('/').next())
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    (status, axum::Json(echoed)).into_response()
}

/// A canned OAuth2 token endpoint mounted at `/token`.
pub struct TokenEndpoint {
    pub server: TestServer,
    hits: Arc<AtomicUsize>,
}

impl TokenEndpoint {
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/token", self.server.base_url)
    }

    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Spawn a client-credentials token endpoint.
///
/// Each successful request returns `access_token = "token-<n>"` (n counts requests from 1) and
/// the given `expires_in`. Requests without `grant_type=client_credentials` get a 400.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn spawn_token_endpoint(expires_in: u64) -> anyhow::Result<TokenEndpoint> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/token",
        post(move |body: Bytes| {
            let counter = Arc::clone(&counter);
            async move {
                let form = String::from_utf8_lossy(&body);
                if !form.split('&').any(|p| p == "grant_type=client_credentials") {
                    return (
                        StatusCode::BAD_REQUEST,
                        axum::Json(json!({"error": "unsupported_grant_type"})),
                    )
                        .into_response();
                }
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                axum::Json(json!({
                    "access_token": format!("token-{n}"),
                    "token_type": "Bearer",
                    "expires_in": expires_in,
                }))
                .into_response()
            }
        }),
    );
    let server = spawn_router(app).await?;
    Ok(TokenEndpoint { server, hits })
}

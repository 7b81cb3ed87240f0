//! Mock secret store for E2E tests
//!
//! Serves canned responses per `(method, path)` route, records every request
//! it receives, and can delay responses or drop connections outright to
//! exercise the client's retry and timeout handling.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use vaultkv::Url;

const UNROUTED_BODY: &str = r#"{"errors":[]}"#;

/// A recorded HTTP request for test assertions
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    /// Request path without query
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body parsed as JSON, `Null` when it is not JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Clone)]
struct Route {
    status: StatusCode,
    body: Vec<u8>,
    delay: Duration,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            body: b"{}".to_vec(),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct State {
    requests: RwLock<Vec<RecordedRequest>>,
    routes: RwLock<HashMap<(String, String), Route>>,
    drops_pending: AtomicUsize,
    dropped: AtomicUsize,
}

impl State {
    /// Consume one pending drop, if any
    fn take_drop(&self) -> bool {
        self.drops_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn route(&self, method: &str, path: &str) -> Option<Route> {
        self.routes
            .read()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

/// A mock KV v2 store listening on an ephemeral local port
///
/// Connections are never kept alive, so every client attempt is a fresh accept.
pub struct MockVault {
    addr: SocketAddr,
    state: Arc<State>,
}

impl MockVault {
    /// Start a mock store on an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock vault");
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                if accept_state.take_drop() {
                    accept_state.dropped.fetch_add(1, Ordering::SeqCst);
                    drop(stream);
                    continue;
                }

                let state = accept_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(handle(&state, req).await) }
                    });

                    let _ = http1::Builder::new()
                        .keep_alive(false)
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to hand to the client, e.g. `http://127.0.0.1:41234/`
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    /// Serve `status` and `body` for `method path`, replacing any earlier route
    pub fn respond(&self, method: &str, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        let mut routes = self.state.routes.write();
        let route = routes
            .entry((method.to_uppercase(), path.to_string()))
            .or_default();
        route.status = StatusCode::from_u16(status).unwrap();
        route.body = body.into();
    }

    pub fn respond_json(&self, method: &str, path: &str, status: u16, body: &serde_json::Value) {
        self.respond(method, path, status, body.to_string());
    }

    /// Hold every response on `method path` for `delay` before answering
    pub fn delay(&self, method: &str, path: &str, delay: Duration) {
        self.state
            .routes
            .write()
            .entry((method.to_uppercase(), path.to_string()))
            .or_default()
            .delay = delay;
    }

    /// Close the next `count` accepted connections without reading them
    pub fn drop_connections(&self, count: usize) {
        self.state.drops_pending.store(count, Ordering::SeqCst);
    }

    /// Connections closed by [`MockVault::drop_connections`] so far
    pub fn dropped_connections(&self) -> usize {
        self.state.dropped.load(Ordering::SeqCst)
    }

    /// All recorded requests in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.read().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.state
            .requests
            .read()
            .iter()
            .filter(|r| r.method.eq_ignore_ascii_case(method) && r.path == path)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.requests.write().clear();
    }
}

async fn handle(state: &State, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let body = req
        .into_body()
        .collect()
        .await
        .map(|b| b.to_bytes().to_vec())
        .unwrap_or_default();

    // Recorded on arrival so delayed requests are visible while in flight
    state.requests.write().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        headers,
        body,
    });

    let (status, body) = match state.route(&method, &path) {
        Some(route) => {
            if !route.delay.is_zero() {
                tokio::time::sleep(route.delay).await;
            }
            (route.status, route.body)
        }
        None => (StatusCode::NOT_FOUND, UNROUTED_BODY.as_bytes().to_vec()),
    };

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

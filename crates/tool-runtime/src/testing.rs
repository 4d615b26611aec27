//! In-process mock of the EMI backend for tests.
//!
//! Every request is recorded with its method, path, content type and JSON
//! body. The reply is
//! chosen by [`Mode`] and applies to every path.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use tokio::task::JoinHandle;

use emi_core::BackendConfig;

use crate::backend::BackendClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 200 with [`MockBackend::ECHO_BODY`].
    Ok,
    /// 500 with [`MockBackend::FAIL_BODY`].
    Fail,
    /// 200 with an empty body.
    Empty,
    /// 200 with an HTML body.
    Html,
    /// 200 JSON after [`MockBackend::SLOW_DELAY`].
    Slow,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// `Content-Type` header, if one was sent.
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    mode: Mode,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct MockBackend {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub const ECHO_BODY: &'static str =
        r#"{"emi":8722.47,"total_interest":4669.64,"total_payment":104669.64}"#;
    pub const FAIL_BODY: &'static str = "calculation engine exploded";
    pub const SLOW_DELAY: Duration = Duration::from_secs(5);

    pub async fn start() -> Self {
        Self::with_mode(Mode::Ok).await
    }

    pub async fn with_mode(mode: Mode) -> Self {
        let state = MockState {
            mode,
            requests: Arc::default(),
        };
        let requests = state.requests.clone();
        let app = Router::new().fallback(respond).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    /// Base URL in the same shape as the production default (`.../api`).
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Backend client pointed at this mock with the production timeout.
    pub fn client(&self) -> Arc<BackendClient> {
        Arc::new(
            BackendClient::new(BackendConfig::new(self.base_url())).expect("build backend client"),
        )
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A base URL nothing is listening on.
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway listener");
    let addr = listener.local_addr().expect("throwaway address");
    drop(listener);
    format!("http://{addr}/api")
}

async fn respond(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Ok(mut recorded) = state.requests.lock() {
        recorded.push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            content_type,
            body,
        });
    }

    match state.mode {
        Mode::Ok => json_ok(),
        Mode::Fail => {
            (StatusCode::INTERNAL_SERVER_ERROR, MockBackend::FAIL_BODY).into_response()
        }
        Mode::Empty => StatusCode::OK.into_response(),
        Mode::Html => (StatusCode::OK, "<html>oops</html>").into_response(),
        Mode::Slow => {
            tokio::time::sleep(MockBackend::SLOW_DELAY).await;
            json_ok()
        }
    }
}

fn json_ok() -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        MockBackend::ECHO_BODY,
    )
        .into_response()
}

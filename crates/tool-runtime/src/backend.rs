//! HTTP client for the EMI REST backend.
//!
//! Every tool call maps to exactly one POST here. Failures are sorted into
//! three kinds so callers can tell a down backend from a rejecting one from
//! a broken one. Nothing is retried.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use emi_core::BackendConfig;

/// Backend routes, relative to the configured base URL.
pub mod endpoints {
    pub const CALCULATE_EMI: &str = "/emi/calculate";
    pub const SCHEDULE: &str = "/emi/schedule";
    pub const COMPARE: &str = "/emi/compare";
    pub const PREPAYMENT: &str = "/emi/prepayment";
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Connection refused, DNS failure, or the request timeout elapsed.
    #[error("EMI backend unavailable: {0}")]
    Unavailable(String),
    /// The backend answered with a non-2xx status.
    #[error("EMI backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// 2xx response whose body is not valid JSON.
    #[error("malformed response from EMI backend: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Stable machine-readable tag for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Unavailable(_) => "backend_unavailable",
            BackendError::Status { .. } => "backend_error",
            BackendError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// A successful backend reply: the body exactly as received plus its parsed form.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub raw: String,
    pub body: Value,
}

/// Thin wrapper over `reqwest::Client` bound to one backend configuration.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// POST `body` as JSON to `endpoint` and return the parsed JSON reply.
    pub async fn post_json<B>(&self, endpoint: &str, body: &B) -> Result<BackendResponse, BackendError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.config.endpoint_url(endpoint);
        debug!(url = %url, "EMI backend request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "EMI backend unreachable");
                BackendError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "EMI backend returned error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().await.map_err(|e| {
            warn!(url = %url, error = %e, "failed reading EMI backend response");
            BackendError::Unavailable(e.to_string())
        })?;

        let body: Value = serde_json::from_str(&raw).map_err(|e| {
            warn!(url = %url, error = %e, "EMI backend response is not JSON");
            BackendError::MalformedResponse(e.to_string())
        })?;

        Ok(BackendResponse { raw, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unreachable_base_url, MockBackend, Mode};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_post_returns_body_verbatim() {
        let backend = MockBackend::start().await;
        let client = BackendClient::new(BackendConfig::new(backend.base_url())).unwrap();

        let response = client
            .post_json(endpoints::CALCULATE_EMI, &serde_json::json!({"principal": 100000.0}))
            .await
            .unwrap();

        assert_eq!(response.raw, MockBackend::ECHO_BODY);
        assert_eq!(response.body["emi"], 8722.47);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/api/emi/calculate");
        assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(requests[0].body["principal"], 100000.0);
    }

    #[tokio::test]
    async fn test_http_500_is_status_error() {
        let backend = MockBackend::with_mode(Mode::Fail).await;
        let client = BackendClient::new(BackendConfig::new(backend.base_url())).unwrap();

        let err = client
            .post_json(endpoints::COMPARE, &serde_json::json!({}))
            .await
            .unwrap_err();

        match err {
            BackendError::Status { status, ref body } => {
                assert_eq!(status, 500);
                assert_eq!(body, MockBackend::FAIL_BODY);
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert_eq!(err.kind(), "backend_error");
    }

    #[tokio::test]
    async fn test_empty_body_is_malformed() {
        let backend = MockBackend::with_mode(Mode::Empty).await;
        let client = BackendClient::new(BackendConfig::new(backend.base_url())).unwrap();

        let err = client
            .post_json(endpoints::CALCULATE_EMI, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
        assert_eq!(err.kind(), "malformed_response");
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let backend = MockBackend::with_mode(Mode::Html).await;
        let client = BackendClient::new(BackendConfig::new(backend.base_url())).unwrap();

        let err = client
            .post_json(endpoints::PREPAYMENT, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let base_url = unreachable_base_url().await;
        let client = BackendClient::new(BackendConfig::new(base_url)).unwrap();

        let err = client
            .post_json(endpoints::SCHEDULE, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert_eq!(err.kind(), "backend_unavailable");
    }

    #[tokio::test]
    async fn test_slow_backend_hits_timeout() {
        let backend = MockBackend::with_mode(Mode::Slow).await;
        let config =
            BackendConfig::new(backend.base_url()).with_request_timeout(Duration::from_millis(200));
        let client = BackendClient::new(config).unwrap();

        let started = Instant::now();
        let err = client
            .post_json(endpoints::SCHEDULE, &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(started.elapsed() < MockBackend::SLOW_DELAY);
    }

    #[test]
    fn test_client_keeps_its_config() {
        let client =
            BackendClient::new(BackendConfig::new("http://emi.example.com/api/")).unwrap();
        assert_eq!(client.config().base_url, "http://emi.example.com/api");
        assert_eq!(client.config().request_timeout, Duration::from_secs(10));
    }
}

use std::env;
use std::time::Duration;

use tracing::debug;

/// Environment variable holding the EMI backend base URL.
pub const BASE_URL_ENV: &str = "EMI_API_BASE_URL";

/// Backend used when `EMI_API_BASE_URL` is unset or empty.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Every backend call is bounded by this timeout. Not configurable at runtime.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Name advertised to MCP clients during `initialize`.
pub const SERVER_NAME: &str = "emi-calculator-server";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Top-level config ──────────────────────────────────────────

/// Process-wide configuration, built once at startup and passed down
/// explicitly. Nothing re-reads the environment after this is constructed.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_name: String,
    pub backend: BackendConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self::from_base_url(env_opt(BASE_URL_ENV))
    }

    /// Build config from an explicit base URL; `None` or an empty string
    /// falls back to [`DEFAULT_BASE_URL`].
    pub fn from_base_url(base_url: Option<String>) -> Self {
        let backend = BackendConfig::new(
            base_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        );
        debug!(base_url = %backend.base_url, "resolved backend config");
        Self {
            server_name: SERVER_NAME.to_string(),
            backend,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_base_url(None)
    }
}

// ── Backend ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL without a trailing slash, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self {
            base_url,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the request timeout. Used by tests to keep timeout cases fast.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL for a backend endpoint such as `/emi/calculate`.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }
}

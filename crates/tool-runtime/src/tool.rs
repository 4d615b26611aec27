use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{BackendError, BackendResponse};

/// Describes a tool's interface for MCP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "calculate_emi")
    pub name: String,
    /// Human-readable description shown to the client
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// Result of executing a tool, sent back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Result text. For backend-backed tools this is the response body as received.
    pub content: String,
    /// Parsed form of `content` when it is a JSON object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether this result represents an error
    pub is_error: bool,
}

impl From<BackendResponse> for ToolResult {
    fn from(response: BackendResponse) -> Self {
        let structured_content = response.body.is_object().then_some(response.body);
        Self {
            content: response.raw,
            structured_content,
            is_error: false,
        }
    }
}

/// All tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value) -> Result<ToolResult, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{source}")]
    Backend {
        #[source]
        source: BackendError,
        /// The JSON body that was sent.
        payload: Value,
    },
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidInput(_) => "invalid_input",
            ToolError::Backend { source, .. } => source.kind(),
        }
    }

    /// JSON report returned to the caller as the text of a failed tool result.
    ///
    /// Backend failures echo the request body under `payload`; HTTP errors
    /// also carry `status` and `body`.
    pub fn to_payload(&self) -> Value {
        let mut report = json!({
            "error": self.kind(),
            "details": self.to_string(),
        });
        if let ToolError::Backend { source, payload } = self {
            if let BackendError::Status { status, body } = source {
                report["status"] = json!(status);
                report["body"] = json!(body);
            }
            report["payload"] = payload.clone();
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_from_object_response() {
        let raw = r#"{"emi": 1234.5,  "currency":"INR"}"#;
        let result = ToolResult::from(BackendResponse {
            raw: raw.to_string(),
            body: serde_json::from_str(raw).unwrap(),
        });
        assert_eq!(result.content, raw);
        assert_eq!(result.structured_content.unwrap()["currency"], "INR");
        assert!(!result.is_error);
    }

    #[test]
    fn test_tool_result_from_array_response_has_no_structured_content() {
        let raw = "[1, 2, 3]";
        let result = ToolResult::from(BackendResponse {
            raw: raw.to_string(),
            body: serde_json::from_str(raw).unwrap(),
        });
        assert_eq!(result.content, raw);
        assert!(result.structured_content.is_none());
    }

    #[test]
    fn test_status_error_payload_carries_status_and_body() {
        let err = ToolError::Backend {
            source: BackendError::Status {
                status: 422,
                body: r#"{"detail":"tenure must be positive"}"#.to_string(),
            },
            payload: json!({"principal": 1000.0, "interestRate": 8.5, "tenure": 0}),
        };
        let report = err.to_payload();
        assert_eq!(report["error"], "backend_error");
        assert_eq!(report["status"], 422);
        assert_eq!(report["body"], r#"{"detail":"tenure must be positive"}"#);
        assert_eq!(report["payload"]["tenure"], 0);
    }

    #[test]
    fn test_unavailable_payload() {
        let err = ToolError::Backend {
            source: BackendError::Unavailable("connection refused".to_string()),
            payload: json!({"scenarios": []}),
        };
        let report = err.to_payload();
        assert_eq!(report["error"], "backend_unavailable");
        assert!(report["details"].as_str().unwrap().contains("connection refused"));
        assert!(report.get("status").is_none());
        assert_eq!(report["payload"], json!({"scenarios": []}));
    }

    #[test]
    fn test_invalid_input_payload() {
        let err = ToolError::InvalidInput("missing field `tenure`".to_string());
        let report = err.to_payload();
        assert_eq!(report["error"], "invalid_input");
        assert!(report.get("payload").is_none());
    }
}

//! Error types for the MCP crate.

use crate::types::{error_codes, JsonRpcError};

/// Errors that can occur during MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Failed to parse JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// An inbound line was not valid UTF-8.
    #[error("Parse error: message is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Transport I/O error.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The message is JSON but not a valid JSON-RPC request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requested method is not supported.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters for a method.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The requested tool was not found in the registry.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The task running a tool call died before producing a result.
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),
}

impl McpError {
    /// Convert to a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let code = match self {
            McpError::JsonParse(_) | McpError::Utf8(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::ToolNotFound(_) => error_codes::INVALID_PARAMS,
            _ => error_codes::INTERNAL_ERROR,
        };
        JsonRpcError {
            code,
            message: self.to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes() {
        let parse = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        assert_eq!(McpError::JsonParse(parse).to_rpc_error().code, -32700);
        let utf8 = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        assert_eq!(McpError::Utf8(utf8).to_rpc_error().code, error_codes::PARSE_ERROR);
        assert_eq!(
            McpError::ToolNotFound("nope".into()).to_rpc_error().code,
            error_codes::INVALID_PARAMS
        );
        assert_eq!(
            McpError::ToolExecution("panicked".into()).to_rpc_error().code,
            error_codes::INTERNAL_ERROR
        );
    }
}

//! MCP server implementation.
//!
//! Wraps a `ToolRegistry` and exposes its tools over the MCP protocol.
//! Protocol methods are answered inline; each `tools/call` runs as its own
//! task so a slow backend never blocks `ping`, `tools/list`, or a
//! cancellation aimed at the slow call itself.
//!
//! JSON-RPC batches are answered with one array once every member has
//! finished. Batched tool calls cannot be cancelled individually.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{AbortHandle, Id as TaskId, JoinError, JoinHandle, JoinSet};

use emi_tool_runtime::{Tool, ToolRegistry};

use crate::error::McpError;
use crate::transport::McpTransport;
use crate::types::*;

/// MCP server that bridges a `ToolRegistry` to MCP clients.
pub struct McpServer {
    registry: ToolRegistry,
    server_name: String,
    server_version: String,
}

/// What is written back for one inbound line.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Reply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// One member of a batch, in arrival order.
enum BatchSlot {
    Ready(JsonRpcResponse),
    Running(RpcId, JoinHandle<JsonRpcResponse>),
}

/// Outcome of routing one request.
enum Dispatch {
    /// Answer immediately.
    Respond(JsonRpcResponse),
    /// Run a tool; the response comes later.
    Call {
        id: RpcId,
        name: String,
        tool: Arc<dyn Tool>,
        arguments: Value,
    },
}

impl McpServer {
    /// Create a new MCP server wrapping the given tool registry.
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            server_name: "emi-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Set the server name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Run the server loop, reading from and writing to the transport.
    ///
    /// Processes JSON-RPC messages until the transport is closed, then lets
    /// in-flight tool calls finish and writes their responses before returning.
    pub async fn run<T: McpTransport>(&mut self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(server = %self.server_name, tools = self.registry.len(), "MCP server starting");

        let mut calls: JoinSet<Reply> = JoinSet::new();
        let mut in_flight = InFlight::default();
        let mut open = true;

        while open || !calls.is_empty() {
            tokio::select! {
                received = transport.receive(), if open => {
                    match received {
                        Ok(Some(line)) => {
                            tracing::debug!(message = %line, "Received message");
                            if let Some(reply) = self.handle_line(&line, &mut calls, &mut in_flight) {
                                send_reply(transport, &reply).await?;
                            }
                        }
                        Ok(None) => {
                            tracing::info!(pending = calls.len(), "Transport closed, shutting down");
                            open = false;
                        }
                        Err(err @ McpError::Utf8(_)) => {
                            tracing::warn!(error = %err, "Undecodable message");
                            let reply = Reply::Single(error_response(RpcId::Null, err));
                            send_reply(transport, &reply).await?;
                        }
                        Err(err) => return Err(err),
                    }
                }
                Some(joined) = calls.join_next_with_id() => {
                    if let Some(reply) = in_flight.finish(joined) {
                        send_reply(transport, &reply).await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request and produce a response.
    ///
    /// Tool calls are awaited inline here; `run` spawns them instead.
    pub async fn handle_request(&mut self, request: &JsonRpcRequest) -> JsonRpcResponse {
        match self.dispatch(request) {
            Dispatch::Respond(response) => response,
            Dispatch::Call {
                id,
                name,
                tool,
                arguments,
            } => execute_call(id, name, tool, arguments).await,
        }
    }

    fn handle_line(
        &mut self,
        line: &str,
        calls: &mut JoinSet<Reply>,
        in_flight: &mut InFlight,
    ) -> Option<Reply> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse JSON");
                return Some(Reply::Single(error_response(RpcId::Null, McpError::JsonParse(e))));
            }
        };

        match raw {
            Value::Array(items) => self.handle_batch(items, calls, in_flight),
            raw => self.handle_message(raw, calls, in_flight).map(Reply::Single),
        }
    }

    fn handle_message(
        &mut self,
        raw: Value,
        calls: &mut JoinSet<Reply>,
        in_flight: &mut InFlight,
    ) -> Option<JsonRpcResponse> {
        match self.route(raw, in_flight)? {
            Dispatch::Respond(response) => Some(response),
            Dispatch::Call {
                id,
                name,
                tool,
                arguments,
            } => {
                if in_flight.contains(&id) {
                    return Some(error_response(
                        id,
                        McpError::InvalidRequest("request id already in flight".to_string()),
                    ));
                }
                let call = execute_call(id.clone(), name, tool, arguments);
                let handle = calls.spawn(async move { Reply::Single(call.await) });
                in_flight.track(id, handle);
                None
            }
        }
    }

    /// Route every member now; tool calls run concurrently and the array is
    /// written when the last one finishes. A batch of notifications gets no
    /// reply at all.
    fn handle_batch(
        &mut self,
        items: Vec<Value>,
        calls: &mut JoinSet<Reply>,
        in_flight: &mut InFlight,
    ) -> Option<Reply> {
        if items.is_empty() {
            return Some(Reply::Single(error_response(
                RpcId::Null,
                McpError::InvalidRequest("empty batch".to_string()),
            )));
        }
        tracing::debug!(size = items.len(), "Handling batch");

        let mut slots = Vec::with_capacity(items.len());
        for raw in items {
            match self.route(raw, in_flight) {
                None => {}
                Some(Dispatch::Respond(response)) => slots.push(BatchSlot::Ready(response)),
                Some(Dispatch::Call {
                    id,
                    name,
                    tool,
                    arguments,
                }) => {
                    let handle = tokio::spawn(execute_call(id.clone(), name, tool, arguments));
                    slots.push(BatchSlot::Running(id, handle));
                }
            }
        }

        if slots.is_empty() {
            return None;
        }
        calls.spawn(collect_batch(slots));
        None
    }

    /// Turn one JSON-RPC message into a dispatch. Notifications are handled
    /// here and yield `None`.
    fn route(&mut self, raw: Value, in_flight: &mut InFlight) -> Option<Dispatch> {
        if !raw.is_object() {
            return Some(Dispatch::Respond(error_response(
                RpcId::Null,
                McpError::InvalidRequest("expected a JSON-RPC object".to_string()),
            )));
        }

        // Distinguish requests (have "id") from notifications (no "id").
        if raw.get("id").is_none() {
            match serde_json::from_value::<JsonRpcNotification>(raw) {
                Ok(notif) => self.handle_notification(&notif, in_flight),
                Err(e) => tracing::debug!(error = %e, "Ignoring malformed notification"),
            }
            return None;
        }

        let fallback_id = raw
            .get("id")
            .and_then(|id| serde_json::from_value::<RpcId>(id.clone()).ok())
            .unwrap_or(RpcId::Null);

        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse JSON-RPC request");
                return Some(Dispatch::Respond(error_response(
                    fallback_id,
                    McpError::InvalidRequest(e.to_string()),
                )));
            }
        };

        if request.id == RpcId::Null {
            return Some(Dispatch::Respond(error_response(
                RpcId::Null,
                McpError::InvalidRequest("request id must not be null".to_string()),
            )));
        }

        Some(self.dispatch(&request))
    }

    fn dispatch(&self, request: &JsonRpcRequest) -> Dispatch {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => Dispatch::Respond(self.handle_initialize(id, &request.params)),
            "ping" => Dispatch::Respond(JsonRpcResponse::success(id, serde_json::json!({}))),
            "tools/list" => Dispatch::Respond(self.handle_list_tools(id)),
            "tools/call" => match self.prepare_call(&request.params) {
                Ok((name, tool, arguments)) => Dispatch::Call {
                    id,
                    name,
                    tool,
                    arguments,
                },
                Err(err) => Dispatch::Respond(error_response(id, err)),
            },
            method => {
                tracing::warn!(method = %method, "Unknown method");
                Dispatch::Respond(error_response(id, McpError::MethodNotFound(method.to_string())))
            }
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification, in_flight: &mut InFlight) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("Client confirmed initialization");
            }
            "notifications/cancelled" => {
                let params = notif
                    .params
                    .clone()
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                let Some(params) = params else {
                    tracing::debug!("Cancellation without a usable requestId");
                    return;
                };
                if in_flight.cancel(&params.request_id) {
                    tracing::info!(
                        request_id = ?params.request_id,
                        reason = params.reason.as_deref().unwrap_or(""),
                        "Cancelled in-flight tool call"
                    );
                } else {
                    tracing::debug!(request_id = ?params.request_id, "Nothing to cancel");
                }
            }
            method => {
                tracing::debug!(method = %method, "Unknown notification, ignoring");
            }
        }
    }

    fn handle_initialize(&self, id: RpcId, params: &Option<Value>) -> JsonRpcResponse {
        let params = params
            .clone()
            .and_then(|p| serde_json::from_value::<InitializeParams>(p).ok());
        let requested = params.as_ref().map(|p| p.protocol_version.as_str());
        let protocol_version = negotiate_protocol_version(requested);

        tracing::info!(
            client = params
                .as_ref()
                .and_then(|p| p.client_info.as_ref())
                .map(|c| c.name.as_str())
                .unwrap_or("unknown"),
            requested = requested.unwrap_or("none"),
            protocol_version,
            "Handling initialize"
        );

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: Some(self.server_version.clone()),
            },
        };

        to_response(id, &result)
    }

    fn handle_list_tools(&self, id: RpcId) -> JsonRpcResponse {
        tracing::debug!("Handling tools/list");

        let tools: Vec<ToolInfo> = self.registry.list().into_iter().map(ToolInfo::from).collect();
        to_response(id, &ListToolsResult { tools })
    }

    fn prepare_call(
        &self,
        params: &Option<Value>,
    ) -> Result<(String, Arc<dyn Tool>, Value), McpError> {
        let params = params
            .clone()
            .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?;

        let call_params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| McpError::InvalidParams(e.to_string()))?;

        tracing::debug!(tool = %call_params.name, "Handling tools/call");

        let tool = self
            .registry
            .get(&call_params.name)
            .ok_or_else(|| McpError::ToolNotFound(call_params.name.clone()))?;

        let arguments = match call_params.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        Ok((call_params.name, tool, arguments))
    }
}

async fn execute_call(
    id: RpcId,
    name: String,
    tool: Arc<dyn Tool>,
    arguments: Value,
) -> JsonRpcResponse {
    let result = match tool.execute(arguments).await {
        Ok(tool_result) => CallToolResult::from(tool_result),
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, kind = e.kind(), "Tool call failed");
            CallToolResult::failure(e.to_payload().to_string())
        }
    };
    to_response(id, &result)
}

async fn collect_batch(slots: Vec<BatchSlot>) -> Reply {
    let mut responses = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            BatchSlot::Ready(response) => responses.push(response),
            BatchSlot::Running(id, handle) => match handle.await {
                Ok(response) => responses.push(response),
                Err(err) => {
                    tracing::error!(request_id = ?id, error = %err, "Batched tool call panicked");
                    responses.push(error_response(
                        id,
                        McpError::ToolExecution("tool call panicked".to_string()),
                    ));
                }
            },
        }
    }
    Reply::Batch(responses)
}

async fn send_reply<T: McpTransport>(transport: &mut T, reply: &Reply) -> Result<(), McpError> {
    let json = serde_json::to_string(reply)?;
    tracing::debug!(response = %json, "Sending response");
    transport.send(&json).await
}

fn to_response<S: Serialize>(id: RpcId, result: &S) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(val) => JsonRpcResponse::success(id, val),
        Err(e) => error_response(id, McpError::JsonParse(e)),
    }
}

fn error_response(id: RpcId, err: McpError) -> JsonRpcResponse {
    JsonRpcResponse::error(id, err.to_rpc_error().code, err.to_string())
}

/// Tool calls that have been spawned but not yet answered.
#[derive(Default)]
struct InFlight {
    by_request: HashMap<RpcId, AbortHandle>,
    by_task: HashMap<TaskId, RpcId>,
}

impl InFlight {
    fn contains(&self, id: &RpcId) -> bool {
        self.by_request.contains_key(id)
    }

    fn track(&mut self, id: RpcId, handle: AbortHandle) {
        self.by_task.insert(handle.id(), id.clone());
        self.by_request.insert(id, handle);
    }

    /// Abort the call for `id`. Its response, if it still arrives, is dropped.
    fn cancel(&mut self, id: &RpcId) -> bool {
        match self.by_request.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Release the request slot only if it still belongs to `task`.
    fn release(&mut self, id: &RpcId, task: TaskId) -> bool {
        match self.by_request.get(id) {
            Some(handle) if handle.id() == task => {
                self.by_request.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Turn a finished task into the reply to write, if any.
    ///
    /// Batch tasks are never tracked and always answer.
    fn finish(&mut self, joined: Result<(TaskId, Reply), JoinError>) -> Option<Reply> {
        match joined {
            Ok((task, reply)) => match self.by_task.remove(&task) {
                // Cancelled after completing but before being joined.
                Some(id) => self.release(&id, task).then_some(reply),
                None => Some(reply),
            },
            Err(err) => {
                let task = err.id();
                let Some(id) = self.by_task.remove(&task) else {
                    tracing::error!(error = %err, "Batch task failed");
                    return None;
                };
                if err.is_cancelled() || !self.release(&id, task) {
                    return None;
                }
                tracing::error!(request_id = ?id, error = %err, "Tool call task panicked");
                Some(Reply::Single(error_response(
                    id,
                    McpError::ToolExecution("tool call panicked".to_string()),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emi_tool_runtime::register_emi_tools;
    use emi_tool_runtime::testing::{MockBackend, Mode};

    async fn test_server(mode: Mode) -> (McpServer, MockBackend) {
        let backend = MockBackend::with_mode(mode).await;
        let mut registry = ToolRegistry::new();
        register_emi_tools(&mut registry, backend.client()).unwrap();
        (McpServer::new(registry).with_name("emi-test"), backend)
    }

    fn call(id: i64, name: &str, arguments: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(
            RpcId::Number(id),
            "tools/call",
            Some(serde_json::json!({"name": name, "arguments": arguments})),
        )
    }

    #[tokio::test]
    async fn test_handle_initialize() {
        let (mut server, _backend) = test_server(Mode::Ok).await;
        let req = JsonRpcRequest::new(
            RpcId::Number(1),
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client"}
            })),
        );

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let result: InitializeResult =
            serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.protocol_version, "2024-11-05");
        assert_eq!(result.server_info.name, "emi-test");
        assert!(result.capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_handle_ping() {
        let (mut server, _backend) = test_server(Mode::Ok).await;
        let resp = server
            .handle_request(&JsonRpcRequest::new(RpcId::String("p".into()), "ping", None))
            .await;
        assert_eq!(resp.result, Some(serde_json::json!({})));
    }

    #[tokio::test]
    async fn test_handle_list_tools() {
        let (mut server, _backend) = test_server(Mode::Ok).await;
        let req = JsonRpcRequest::new(RpcId::Number(2), "tools/list", None);

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let result: ListToolsResult =
            serde_json::from_value(resp.result.unwrap()).unwrap();
        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "calculate_emi",
                "calculate_schedule",
                "compare_loans",
                "calculate_with_prepayment"
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_call_tool() {
        let (mut server, backend) = test_server(Mode::Ok).await;
        let req = call(
            3,
            "calculate_emi",
            serde_json::json!({"principal": 100000, "interestRate": 8.5, "tenure": 12}),
        );

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let result: CallToolResult =
            serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(!result.is_error);
        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, MockBackend::ECHO_BODY),
        }
        assert_eq!(result.structured_content.unwrap()["emi"], 8722.47);
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_call_without_arguments_is_invalid_input() {
        let (mut server, backend) = test_server(Mode::Ok).await;
        let req = JsonRpcRequest::new(
            RpcId::Number(4),
            "tools/call",
            Some(serde_json::json!({"name": "calculate_emi"})),
        );

        let resp = server.handle_request(&req).await;
        let result: CallToolResult =
            serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(result.is_error);
        match &result.content[0] {
            ToolContent::Text { text } => {
                let payload: Value = serde_json::from_str(text).unwrap();
                assert_eq!(payload["error"], "invalid_input");
            }
        }
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_handle_call_tool_not_found() {
        let (mut server, _backend) = test_server(Mode::Ok).await;
        let resp = server
            .handle_request(&call(5, "nonexistent", serde_json::json!({})))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_handle_call_missing_params() {
        let (mut server, _backend) = test_server(Mode::Ok).await;
        let resp = server
            .handle_request(&JsonRpcRequest::new(RpcId::Number(6), "tools/call", None))
            .await;
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_handle_unknown_method() {
        let (mut server, _backend) = test_server(Mode::Ok).await;
        let req = JsonRpcRequest::new(RpcId::Number(7), "resources/list", None);

        let resp = server.handle_request(&req).await;
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_backend_failure_is_tool_error_not_rpc_error() {
        let (mut server, _backend) = test_server(Mode::Fail).await;
        let resp = server
            .handle_request(&call(
                8,
                "calculate_schedule",
                serde_json::json!({"principal": 1, "interestRate": 1, "tenure": 1}),
            ))
            .await;

        assert!(resp.error.is_none());
        let result: CallToolResult =
            serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(result.is_error);
        match &result.content[0] {
            ToolContent::Text { text } => {
                let payload: Value = serde_json::from_str(text).unwrap();
                assert_eq!(payload["error"], "backend_error");
                assert_eq!(payload["status"], 500);
                assert_eq!(payload["body"], MockBackend::FAIL_BODY);
            }
        }
    }
}

//! MCP tool surface.
//!
//! Transport-agnostic JSON-RPC dispatch. Transports (stdio, HTTP, SSE
//! sessions) hand raw payloads to [`McpServer::handle_message`] and write
//! back whatever it returns. All transports share one server, and through
//! it one [`LogStore`](crate::store::LogStore).
//!
//! Supported methods:
//! - `initialize`
//! - `ping`
//! - `tools/list`
//! - `tools/call` (`get_logs`, `search_logs`)
//!
//! Notifications are accepted and never answered.

pub mod protocol;
pub mod tools;

use serde_json::{json, Value};
use std::sync::Arc;

use crate::query::QueryEngine;
use crate::store::LogStore;
use protocol::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST, LATEST_PROTOCOL_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use tools::LogTools;

pub use protocol::JsonRpcError;
pub use tools::ToolError;

/// Name reported in `initialize`.
pub const SERVER_NAME: &str = "server-watch-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared JSON-RPC handler for every transport.
#[derive(Clone)]
pub struct McpServer {
    tools: LogTools,
}

impl McpServer {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self {
            tools: LogTools::new(QueryEngine::new(store)),
        }
    }

    /// Handle one raw payload (a request, a notification or a batch).
    ///
    /// Returns the serialized response, or `None` when nothing should be
    /// sent back.
    pub fn handle_message(&self, payload: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Failed to parse JSON-RPC payload: {e}");
                let resp =
                    JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {e}"));
                return serde_json::to_string(&resp).ok();
            }
        };

        let reply = match value {
            Value::Array(items) if items.is_empty() => serde_json::to_string(
                &JsonRpcResponse::error(Value::Null, INVALID_REQUEST, "Invalid request: empty batch"),
            ),
            Value::Array(items) => {
                let responses: Vec<JsonRpcResponse> = items
                    .into_iter()
                    .filter_map(|item| self.handle_value(item))
                    .collect();
                if responses.is_empty() {
                    return None;
                }
                serde_json::to_string(&responses)
            }
            single => serde_json::to_string(&self.handle_value(single)?),
        };

        match reply {
            Ok(text) => Some(text),
            Err(e) => {
                log::error!("Failed to serialize JSON-RPC response: {e}");
                None
            }
        }
    }

    fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(req) => self.handle_request(&req),
            Err(e) => Some(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                format!("Invalid request: {e}"),
            )),
        }
    }

    /// Dispatch a parsed request. Notifications yield `None`.
    pub fn handle_request(&self, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        if req.is_notification() {
            log::debug!("MCP notification: {}", req.method);
            return None;
        }
        let id = req.id.clone().unwrap_or(Value::Null);
        log::debug!("MCP request: {}", req.method);

        let response = match req.method.as_str() {
            "initialize" => {
                let version = req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str)
                    .unwrap_or(LATEST_PROTOCOL_VERSION);
                JsonRpcResponse::ok(
                    id,
                    json!({
                        "protocolVersion": version,
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
                    }),
                )
            }
            "ping" => JsonRpcResponse::ok(id, json!({})),
            "tools/list" => JsonRpcResponse::ok(id, json!({ "tools": tools::tool_definitions() })),
            "tools/call" => self.call_tool(id, req.params.as_ref()),
            other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
        };
        Some(response)
    }

    fn call_tool(&self, id: Value, params: Option<&Value>) -> JsonRpcResponse {
        let Some(params) = params.and_then(Value::as_object) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };
        let args = params.get("arguments").and_then(Value::as_object);

        match self.tools.call(name, args) {
            Ok(result) => JsonRpcResponse::ok(id, result),
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

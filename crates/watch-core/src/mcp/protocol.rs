//! JSON-RPC 2.0 message types used by the MCP tool surface.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version offered when the client does not request one.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// `None` only when the member is absent; `"id": null` is `Some(Null)`.
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    /// Requests without an id member expect no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_id_is_notification() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .unwrap();
        assert!(req.is_notification());
        assert!(req.params.is_none());
    }

    #[test]
    fn request_with_id() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})).unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.id, Some(json!(7)));
    }

    #[test]
    fn null_id_is_still_a_request() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": null, "method": "ping"}))
                .unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.id, Some(Value::Null));
    }

    #[test]
    fn ok_response_omits_error() {
        let json = serde_json::to_value(JsonRpcResponse::ok(json!(1), json!({}))).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "result": {}, "id": 1}));
    }

    #[test]
    fn error_response_omits_result() {
        let resp = JsonRpcResponse::error(json!("a"), METHOD_NOT_FOUND, "nope");
        let json = serde_json::to_value(resp).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "error": {"code": -32601, "message": "nope"}, "id": "a"})
        );
    }
}

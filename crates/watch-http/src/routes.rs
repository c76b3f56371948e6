//! HTTP route handlers for MCP requests.
//!
//! `POST /mcp` is the stateless transport: one JSON-RPC payload in, one
//! response out. `POST /messages` feeds a legacy SSE session; its response
//! travels back over that session's event stream.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::SharedState;

/// Query string for POST /messages
#[derive(Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Handler for POST /mcp
///
/// Notifications are acknowledged with 202 and no body.
pub async fn mcp_handler(State(state): State<Arc<SharedState>>, body: String) -> Response {
    match state.mcp.handle_message(&body) {
        Some(reply) => json_reply(reply),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Handler for GET/DELETE /mcp
///
/// The stateless transport has no server-initiated stream and no sessions.
pub async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// Handler for POST /messages?sessionId=...
pub async fn messages_handler(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    if !state.sessions.contains(&query.session_id) {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    }

    if let Some(reply) = state.mcp.handle_message(&body) {
        if !state.sessions.send(&query.session_id, reply) {
            return (StatusCode::NOT_FOUND, "Session not found").into_response();
        }
    }
    StatusCode::ACCEPTED.into_response()
}

/// Handler for GET /health
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn json_reply(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

// ============================================================================
// TESTS
// ============================================================================

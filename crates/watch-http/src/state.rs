//! Shared state for the HTTP server.
//!
//! Wraps the MCP server and the legacy SSE session registry.

use std::sync::Arc;
use watch_core::store::LogStore;
use watch_core::McpServer;

use crate::sse::SessionRegistry;

/// Shared state available to all HTTP handlers.
pub struct SharedState {
    /// JSON-RPC dispatcher shared with every other transport.
    pub mcp: McpServer,
    /// Open legacy SSE sessions.
    pub sessions: SessionRegistry,
}

impl SharedState {
    pub fn new(mcp: McpServer) -> Self {
        Self {
            mcp,
            sessions: SessionRegistry::new(),
        }
    }

    /// Convenience constructor for a server reading `store`.
    pub fn for_store(store: Arc<LogStore>) -> Self {
        Self::new(McpServer::new(store))
    }
}

//! # watch-core
//!
//! Core logic for server-watch, an MCP server that runs a command and lets
//! remote callers read its output.
//!
//! This crate is transport-agnostic and is used by:
//! - the stdio transport in the daemon
//! - the HTTP transport (`watch-http`)
//!
//! ## Key Concepts
//!
//! - **LogStore**: bounded ring buffer of captured lines, shared by everyone
//! - **ProcessSupervisor**: the only writer; owns the child process
//! - **QueryEngine**: read-only views (recent lines, substring search)
//! - **McpServer**: JSON-RPC dispatch for the `get_logs` / `search_logs` tools

pub mod config;
pub mod lines;
pub mod mcp;
pub mod query;
pub mod store;
pub mod supervisor;

// Re-export commonly used types
pub use config::{ConfigError, WatchConfig};
pub use mcp::McpServer;
pub use query::{QueryEngine, RenderOptions, StreamFilter};
pub use store::{LogEntry, LogStore, Origin};
pub use supervisor::{ChildState, ProcessSupervisor, SpawnFailure, SupervisorConfig, SupervisorHandle};

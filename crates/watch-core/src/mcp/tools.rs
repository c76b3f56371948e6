//! The `get_logs` and `search_logs` tools.
//!
//! Arguments arrive as loosely-typed JSON. They are coerced here (numeric
//! strings, float limits, `"true"`/`"false"`) before reaching the
//! [`QueryEngine`], which only ever sees valid values.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::query::{self, QueryEngine, RenderOptions, StreamFilter, DEFAULT_LIMIT};

pub const GET_LOGS: &str = "get_logs";
pub const SEARCH_LOGS: &str = "search_logs";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

/// Arguments for `get_logs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLogsArgs {
    pub limit: i64,
    pub stream: StreamFilter,
    pub include_timestamps: bool,
}

impl Default for GetLogsArgs {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            stream: StreamFilter::Both,
            include_timestamps: false,
        }
    }
}

impl GetLogsArgs {
    pub fn from_arguments(args: Option<&Map<String, Value>>) -> Result<Self, ToolError> {
        let mut parsed = Self::default();
        let Some(args) = args else {
            return Ok(parsed);
        };

        if let Some(limit) = present(args, "limit") {
            parsed.limit = coerce_int("limit", limit)?;
        }
        if let Some(stream) = present(args, "stream") {
            let raw = stream.as_str().ok_or_else(|| ToolError::InvalidArgument {
                name: "stream",
                reason: format!("expected a string, got {stream}"),
            })?;
            parsed.stream =
                raw.parse::<StreamFilter>()
                    .map_err(|e| ToolError::InvalidArgument {
                        name: "stream",
                        reason: e.to_string(),
                    })?;
        }
        if let Some(flag) = present(args, "include_timestamps") {
            parsed.include_timestamps = coerce_bool("include_timestamps", flag)?;
        }
        Ok(parsed)
    }
}

/// Arguments for `search_logs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLogsArgs {
    pub query: String,
    pub include_timestamps: bool,
}

impl SearchLogsArgs {
    pub fn from_arguments(args: Option<&Map<String, Value>>) -> Result<Self, ToolError> {
        let args = args.ok_or(ToolError::MissingArgument("query"))?;
        let query = match present(args, "query") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(ToolError::InvalidArgument {
                    name: "query",
                    reason: format!("expected a string, got {other}"),
                })
            }
            None => return Err(ToolError::MissingArgument("query")),
        };
        let include_timestamps = match present(args, "include_timestamps") {
            Some(flag) => coerce_bool("include_timestamps", flag)?,
            None => false,
        };
        Ok(Self {
            query,
            include_timestamps,
        })
    }
}

/// Binds tool names to [`QueryEngine`] calls.
#[derive(Clone)]
pub struct LogTools {
    engine: QueryEngine,
}

impl LogTools {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    /// Invoke a tool by name, returning an MCP `CallToolResult`.
    pub fn call(&self, name: &str, args: Option<&Map<String, Value>>) -> Result<Value, ToolError> {
        let text = match name {
            GET_LOGS => self.get_logs(&GetLogsArgs::from_arguments(args)?),
            SEARCH_LOGS => self.search_logs(&SearchLogsArgs::from_arguments(args)?),
            _ => return Err(ToolError::UnknownTool(name.to_string())),
        };
        Ok(text_result(text))
    }

    pub fn get_logs(&self, args: &GetLogsArgs) -> String {
        let entries = self.engine.recent_logs(args.limit, args.stream);
        if entries.is_empty() {
            return "No logs available".to_string();
        }
        query::render(
            &entries,
            RenderOptions {
                include_timestamps: args.include_timestamps,
            },
        )
    }

    pub fn search_logs(&self, args: &SearchLogsArgs) -> String {
        let entries = self.engine.search_logs(&args.query);
        if entries.is_empty() {
            return format!("No logs matching \"{}\"", args.query);
        }
        query::render(
            &entries,
            RenderOptions {
                include_timestamps: args.include_timestamps,
            },
        )
    }
}

/// Tool definitions for `tools/list`.
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": GET_LOGS,
            "description": "Get the most recent log lines captured from the watched process",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of lines to return",
                        "default": DEFAULT_LIMIT
                    },
                    "stream": {
                        "type": "string",
                        "enum": ["stdout", "stderr", "both"],
                        "description": "Which output stream to read",
                        "default": "both"
                    },
                    "include_timestamps": {
                        "type": "boolean",
                        "description": "Prefix each line with its capture time",
                        "default": false
                    }
                }
            }
        },
        {
            "name": SEARCH_LOGS,
            "description": "Search captured log lines for a case-insensitive substring",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Text to search for"
                    },
                    "include_timestamps": {
                        "type": "boolean",
                        "description": "Prefix each line with its capture time",
                        "default": false
                    }
                },
                "required": ["query"]
            }
        }
    ])
}

fn text_result(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

/// A missing key and an explicit `null` both mean "use the default".
fn present<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

fn coerce_int(name: &'static str, value: &Value) -> Result<i64, ToolError> {
    let invalid = || ToolError::InvalidArgument {
        name,
        reason: format!("expected a number, got {value}"),
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

fn coerce_bool(name: &'static str, value: &Value) -> Result<bool, ToolError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(ToolError::InvalidArgument {
            name,
            reason: format!("expected a boolean, got {value}"),
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Read-only queries over the log store.
//!
//! Every call takes a fresh [`LogStore::snapshot`] and works on that copy,
//! so results are consistent even while the supervisor keeps appending.
//! Queries cannot fail.

use chrono::SecondsFormat;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::store::{LogEntry, LogStore, Origin};

/// Number of entries returned by `get_logs` when no limit is given.
pub const DEFAULT_LIMIT: i64 = 100;

/// Marker prefixed to stderr lines when rendering.
const STDERR_MARKER: &str = "ERR: ";

/// Which streams a recent-logs query should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFilter {
    Stdout,
    Stderr,
    #[default]
    Both,
}

impl StreamFilter {
    pub fn matches(&self, origin: Origin) -> bool {
        match self {
            StreamFilter::Stdout => origin == Origin::Stdout,
            StreamFilter::Stderr => origin == Origin::Stderr,
            StreamFilter::Both => true,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown stream '{0}' (expected stdout, stderr or both)")]
pub struct UnknownStream(pub String);

impl FromStr for StreamFilter {
    type Err = UnknownStream;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(StreamFilter::Stdout),
            "stderr" => Ok(StreamFilter::Stderr),
            "both" => Ok(StreamFilter::Both),
            _ => Err(UnknownStream(s.to_string())),
        }
    }
}

/// Formatting options for [`render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub include_timestamps: bool,
}

/// Stateless query front-end for a shared [`LogStore`].
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<LogStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    /// The most recent `limit` entries matching `filter`, oldest first.
    ///
    /// Negative limits are treated as zero.
    pub fn recent_logs(&self, limit: i64, filter: StreamFilter) -> Vec<LogEntry> {
        recent(self.store.snapshot(), limit, filter)
    }

    /// All entries whose content contains `query`, ignoring case.
    ///
    /// An empty query matches every entry.
    pub fn search_logs(&self, query: &str) -> Vec<LogEntry> {
        search(self.store.snapshot(), query)
    }
}

fn recent(entries: Vec<LogEntry>, limit: i64, filter: StreamFilter) -> Vec<LogEntry> {
    let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
    let mut matching: Vec<LogEntry> = entries
        .into_iter()
        .filter(|e| filter.matches(e.origin))
        .collect();
    let skip = matching.len().saturating_sub(limit);
    matching.drain(..skip);
    matching
}

fn search(entries: Vec<LogEntry>, query: &str) -> Vec<LogEntry> {
    let needle = query.to_lowercase();
    entries
        .into_iter()
        .filter(|e| e.content.to_lowercase().contains(&needle))
        .collect()
}

/// Render entries as newline-joined text.
///
/// Each line is optionally prefixed with `[<ISO-8601 timestamp>] `; stderr
/// lines carry an `ERR: ` marker.
pub fn render(entries: &[LogEntry], options: RenderOptions) -> String {
    entries
        .iter()
        .map(|entry| render_entry(entry, options))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_entry(entry: &LogEntry, options: RenderOptions) -> String {
    let mut line = String::with_capacity(entry.content.len() + 32);
    if options.include_timestamps {
        line.push('[');
        line.push_str(&entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true));
        line.push_str("] ");
    }
    if entry.origin == Origin::Stderr {
        line.push_str(STDERR_MARKER);
    }
    line.push_str(&entry.content);
    line
}

// ============================================================================
// TESTS
// ============================================================================

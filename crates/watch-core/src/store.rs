//! Bounded, time-ordered store of captured output lines.
//!
//! The store is a fixed-capacity ring buffer. The supervisor is the only
//! writer; query handlers read through [`LogStore::snapshot`], which copies
//! the current contents so a query never observes a half-applied append.
//!
//! # Example
//!
//! ```rust
//! use watch_core::store::{LogStore, Origin};
//!
//! let store = LogStore::new(2);
//! store.append(Origin::Stdout, "first\n");
//! store.append(Origin::Stderr, "second\n");
//! store.append(Origin::Stdout, "third\n");
//!
//! let entries = store.snapshot();
//! assert_eq!(entries.len(), 2);
//! assert_eq!(entries[0].content, "second");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of entries kept before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Which of the child's output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Stdout,
    Stderr,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Stdout => "stdout",
            Origin::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single captured line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Capture time, millisecond resolution.
    pub timestamp: DateTime<Utc>,
    pub origin: Origin,
    /// Line content without its terminator.
    pub content: String,
}

struct Ring {
    entries: VecDeque<LogEntry>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Fixed-capacity ring buffer of [`LogEntry`] values.
///
/// Appending past capacity evicts exactly one entry from the head. Entries
/// are never reordered or rewritten.
pub struct LogStore {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl LogStore {
    /// Create a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                last_timestamp: None,
            }),
        }
    }

    /// Append a line captured from `origin`.
    ///
    /// Trailing line terminators are stripped and whitespace-only content is
    /// discarded. Returns `true` if an entry was stored.
    pub fn append(&self, origin: Origin, content: &str) -> bool {
        self.append_at(origin, content, now_millis())
    }

    pub(crate) fn append_at(&self, origin: Origin, content: &str, now: DateTime<Utc>) -> bool {
        let content = content.trim_end_matches(['\r', '\n']);
        if content.trim().is_empty() {
            return false;
        }

        let mut ring = self.lock();

        // Wall clocks can step backwards; capture order must not.
        let timestamp = match ring.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        ring.last_timestamp = Some(timestamp);

        ring.entries.push_back(LogEntry {
            timestamp,
            origin,
            content: content.to_string(),
        });
        if ring.entries.len() > self.capacity {
            ring.entries.pop_front();
        }
        true
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panicking reader must not take the query surface down with it.
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

// ============================================================================
// TESTS
// ============================================================================

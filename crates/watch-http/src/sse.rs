//! Legacy HTTP+SSE transport.
//!
//! Clients open `GET /sse` and keep it open. The first event (`endpoint`)
//! tells them where to POST requests: `/messages?sessionId=<id>`. Responses
//! to those requests are pushed back on the SSE stream as `message` events.
//! A session lives exactly as long as its SSE connection.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::SharedState;

/// Path clients POST session messages to.
pub const MESSAGES_PATH: &str = "/messages";

/// Open SSE sessions keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session and return its id and outgoing message queue.
    pub fn open(&self) -> (String, mpsc::UnboundedReceiver<String>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id.clone(), tx);
        (id, rx)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Queue a message for a session. Returns `false` if the session is gone.
    pub fn send(&self, id: &str, message: String) -> bool {
        let mut sessions = self.lock();
        let delivered = match sessions.get(id) {
            Some(tx) => tx.send(message).is_ok(),
            None => return false,
        };
        if !delivered {
            sessions.remove(id);
        }
        delivered
    }

    pub fn close(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<String>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the session when its SSE stream is dropped.
struct SessionGuard {
    id: String,
    state: Arc<SharedState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.sessions.close(&self.id);
        log::debug!("SSE session {} closed", self.id);
    }
}

/// Handler for GET /sse
pub async fn sse_handler(
    State(state): State<Arc<SharedState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.sessions.open();
    log::debug!("SSE session {id} opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{MESSAGES_PATH}?sessionId={id}"));

    let guard = SessionGuard { id, state };
    let messages = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let message = rx.recv().await?;
        let event = Event::default().event("message").data(message);
        Some((Ok(event), (rx, guard)))
    });

    Sse::new(stream::once(async move { Ok(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_registers_session() {
        let registry = SessionRegistry::new();
        let (id, _rx) = registry.open();
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn send_reaches_receiver() {
        let registry = SessionRegistry::new();
        let (id, mut rx) = registry.open();
        assert!(registry.send(&id, "hello".to_string()));
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[test]
    fn send_to_unknown_session_fails() {
        let registry = SessionRegistry::new();
        assert!(!registry.send("missing", "hello".to_string()));
    }

    #[test]
    fn send_to_dropped_receiver_closes_session() {
        let registry = SessionRegistry::new();
        let (id, rx) = registry.open();
        drop(rx);
        assert!(!registry.send(&id, "hello".to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn close_removes_session() {
        let registry = SessionRegistry::new();
        let (id, _rx) = registry.open();
        registry.close(&id);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn session_ids_are_unique() {
        let registry = SessionRegistry::new();
        let (a, _ra) = registry.open();
        let (b, _rb) = registry.open();
        assert_ne!(a, b);
    }
}

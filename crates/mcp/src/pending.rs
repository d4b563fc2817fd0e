use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Result, TransportError};
use crate::protocol::{JsonRpcError, JsonRpcResponse};

type Outcome = std::result::Result<Value, JsonRpcError>;

#[derive(Default)]
struct State {
    waiters: HashMap<String, oneshot::Sender<Outcome>>,
    closed: bool,
}

/// In-flight requests keyed by JSON-RPC id.
///
/// An entry leaves the map exactly once: on its response, on timeout
/// (`remove`), or when the process goes away (`close_all`).
#[derive(Clone, Default)]
pub(crate) struct PendingRequests {
    state: Arc<Mutex<State>>,
}

impl PendingRequests {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, id: &str) -> Result<oneshot::Receiver<Outcome>> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let (sender, receiver) = oneshot::channel();
        state.waiters.insert(id.to_string(), sender);
        Ok(receiver)
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        self.lock().waiters.remove(id).is_some()
    }

    /// Route one stdout line to its waiter. Lines that are not JSON, carry no
    /// id, carry a `method`, or match nothing outstanding are dropped.
    pub(crate) fn dispatch_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        let Ok(response) = serde_json::from_str::<JsonRpcResponse>(line) else {
            tracing::trace!(line, "Ignoring non-JSON line from MCP process");
            return false;
        };
        if !response.is_response() {
            tracing::trace!(line, "Ignoring request from MCP process");
            return false;
        }
        let Some(id) = response.id_key() else {
            return false;
        };
        let Some(sender) = self.lock().waiters.remove(&id) else {
            return false;
        };
        // The caller may have given up already.
        sender.send(response.into_outcome()).is_ok()
    }

    /// Fail every outstanding request and refuse new ones.
    pub(crate) fn close_all(&self) {
        let mut state = self.lock();
        state.closed = true;
        // Dropping the senders wakes each receiver with a RecvError.
        state.waiters.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_resolves_matching_waiter() {
        let pending = PendingRequests::default();
        let rx = pending.register("a").unwrap();

        assert!(pending.dispatch_line(r#"{"jsonrpc":"2.0","id":"a","result":{"n":1}}"#));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"n": 1}));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_numeric_ids_match_string_keys() {
        let pending = PendingRequests::default();
        let rx = pending.register("42").unwrap();

        assert!(pending.dispatch_line(r#"{"jsonrpc":"2.0","id":42,"result":null}"#));
        assert_eq!(rx.await.unwrap().unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_error_response_reaches_waiter() {
        let pending = PendingRequests::default();
        let rx = pending.register("a").unwrap();

        pending.dispatch_line(r#"{"jsonrpc":"2.0","id":"a","error":{"code":1,"message":"bad"}}"#);
        let error = rx.await.unwrap().unwrap_err();
        assert_eq!(error.message, "bad");
    }

    #[test]
    fn test_malformed_and_unknown_lines_are_ignored() {
        let pending = PendingRequests::default();
        let _rx = pending.register("a").unwrap();

        assert!(!pending.dispatch_line("npm WARN something"));
        assert!(!pending.dispatch_line("{not json"));
        assert!(!pending.dispatch_line(""));
        assert!(!pending.dispatch_line(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#));
        assert!(!pending.dispatch_line(r#"{"jsonrpc":"2.0","id":"zzz","result":1}"#));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_peer_requests_do_not_resolve_waiters() {
        let pending = PendingRequests::default();
        let rx = pending.register("a").unwrap();

        assert!(!pending.dispatch_line(r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#));
        assert_eq!(pending.len(), 1);

        assert!(pending.dispatch_line(r#"{"jsonrpc":"2.0","id":"a"}"#));
        let error = rx.await.unwrap().unwrap_err();
        assert_eq!(error.code, crate::protocol::MALFORMED_RESPONSE_CODE);
    }

    #[test]
    fn test_remove_and_late_response() {
        let pending = PendingRequests::default();
        let _rx = pending.register("a").unwrap();

        assert!(pending.remove("a"));
        assert!(!pending.remove("a"));
        assert!(!pending.dispatch_line(r#"{"jsonrpc":"2.0","id":"a","result":1}"#));
    }

    #[tokio::test]
    async fn test_close_all_fails_waiters_and_rejects_new() {
        let pending = PendingRequests::default();
        let rx1 = pending.register("a").unwrap();
        let rx2 = pending.register("b").unwrap();

        pending.close_all();

        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
        assert!(matches!(pending.register("c"), Err(TransportError::Closed)));
    }
}

// SPDX-License-Identifier: MIT
//!
//! The pending-request engine ("single-owner socket, shared pending table").
//! A `tool_call` send inserts an entry; a matching
//! `tool_result`, a timer fire, or a socket drop removes it — always
//! "remove before resolve" so a timer and a late result racing each other
//! can never both settle the same call.
//!
//! Grounded on the cancel-channel-per-session shape in
//! `sven-node::control::service::ControlService`, generalized from one
//! channel per session to one `oneshot` per in-flight tool call.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use viyv_protocol::{ErrorCode, RequestId, ToolError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const WAIT_FOR_GRACE: Duration = Duration::from_millis(5000);

/// How long a tool call may run before the engine resolves it with `TIMEOUT`.
///
/// `wait_for` gets `input.timeout + 5s` when `input.timeout` is a finite
/// number (matching scenario S3: `timeout:100` → ~5.1s); every other
/// tool gets the 30s default.
pub fn deadline_for(tool: &str, input: &serde_json::Value) -> Duration {
    if tool == "wait_for" {
        if let Some(ms) = input.get("timeout").and_then(serde_json::Value::as_f64) {
            if ms.is_finite() && ms >= 0.0 {
                return Duration::from_millis(ms as u64) + WAIT_FOR_GRACE;
            }
        }
    }
    DEFAULT_TIMEOUT
}

type Resolution = Result<serde_json::Value, ToolError>;

#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<RequestId, oneshot::Sender<Resolution>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly sent tool call, returning the receiver its caller
    /// awaits (racing it against [`deadline_for`] via `tokio::time::timeout`).
    pub async fn insert(&self, id: RequestId) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(id, tx);
        rx
    }

    /// Resolve an inbound `tool_result`. A no-op if the entry is already
    /// gone (timed out, or the socket dropped and failed it already) — this
    /// is the "late result is dropped without side effects" case.
    pub async fn resolve(&self, id: RequestId, result: Resolution) {
        if let Some(tx) = self.inner.lock().await.remove(&id) {
            let _ = tx.send(result);
        }
    }

    /// Drop an entry without resolving it — used when the timer fires first,
    /// so a result that arrives afterward finds nothing to match.
    pub async fn remove(&self, id: &RequestId) {
        self.inner.lock().await.remove(id);
    }

    /// Fail every still-pending call, e.g. on extension-socket loss.
    pub async fn fail_all(&self, code: ErrorCode, message: &str) {
        let mut map = self.inner.lock().await;
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(ToolError::new(code, message)));
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wait_for_uses_input_timeout_plus_grace() {
        let d = deadline_for("wait_for", &json!({"timeout": 100}));
        assert_eq!(d, Duration::from_millis(5100));
    }

    #[test]
    fn wait_for_without_numeric_timeout_falls_back_to_default() {
        let d = deadline_for("wait_for", &json!({}));
        assert_eq!(d, DEFAULT_TIMEOUT);
    }

    #[test]
    fn other_tools_always_use_default() {
        let d = deadline_for("navigate", &json!({"timeout": 1}));
        assert_eq!(d, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn resolve_after_remove_is_a_silent_no_op() {
        let pending = PendingRequests::new();
        let id = RequestId::new();
        let rx = pending.insert(id).await;
        pending.remove(&id).await;
        pending.resolve(id, Ok(json!("late"))).await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn fail_all_resolves_every_entry_with_given_code() {
        let pending = PendingRequests::new();
        let rx1 = pending.insert(RequestId::new()).await;
        let rx2 = pending.insert(RequestId::new()).await;
        pending.fail_all(ErrorCode::ExtensionNotConnected, "gone").await;
        assert_eq!(rx1.await.unwrap().unwrap_err().code, ErrorCode::ExtensionNotConnected);
        assert_eq!(rx2.await.unwrap().unwrap_err().code, ErrorCode::ExtensionNotConnected);
        assert_eq!(pending.len().await, 0);
    }
}

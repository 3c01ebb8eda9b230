//! Session lifecycle: configuration, the state machine, and the handle
//! used to drive it from outside the handler task.

use std::sync::Arc;

use bfnet_protocol::PROTOCOL_VERSION;
use bfnet_transport::ConnectionId;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What a write does once the session is no longer open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedWritePolicy {
    /// Silently drop the bytes and report success.
    #[default]
    Discard,
    /// Return [`SessionError::Closed`](crate::SessionError::Closed).
    Reject,
}

/// Per-session behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Version written into every outgoing header. Incoming versions are
    /// carried but not checked.
    pub protocol_version: i16,

    /// Behaviour of `write()` after close.
    pub closed_write_policy: ClosedWritePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            closed_write_policy: ClosedWritePolicy::Discard,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle of one connection.
///
/// ```text
///   Open ──(EOF / reset / bad header / close())──→ Closing ──(teardown)──→ Closed
/// ```
///
/// - **Open**: bytes are decoded and queued as they arrive.
/// - **Closing**: the transport is being (or has been) closed. Packets
///   already queued can still be read.
/// - **Closed**: the queue is replaced by a sentinel. Reads return `None`
///   immediately and writes follow the [`ClosedWritePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable control handle for a session.
///
/// The lifecycle manager keeps one to learn when the connection starts
/// closing and to tear the session down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionHandle {
    pub fn new(id: ConnectionId) -> Self {
        let (tx, _rx) = watch::channel(SessionState::Open);
        Self {
            id,
            state: Arc::new(tx),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Starts closing the connection. Returns `false` if it was not open.
    pub fn close(&self) -> bool {
        let changed = self.state.send_if_modified(|s| {
            if *s == SessionState::Open {
                *s = SessionState::Closing;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(conn_id = %self.id, "session closing");
        }
        changed
    }

    /// Moves the session to `Closed`, unblocking any pending read.
    pub fn teardown(&self) {
        let changed = self.state.send_if_modified(|s| {
            let was = *s;
            *s = SessionState::Closed;
            was != SessionState::Closed
        });
        if changed {
            tracing::debug!(conn_id = %self.id, "session torn down");
        }
    }

    pub fn subscribe(&self) -> StateWatch {
        StateWatch {
            rx: self.state.subscribe(),
        }
    }

    /// Resolves once the session has left `Open`.
    pub async fn closing(&self) -> SessionState {
        self.subscribe()
            .wait_until(|s| s != SessionState::Open)
            .await
    }

    /// Resolves once the session is `Closed`.
    pub async fn closed(&self) {
        self.subscribe()
            .wait_until(|s| s == SessionState::Closed)
            .await;
    }
}

/// Receiving side of the state channel.
#[derive(Debug, Clone)]
pub struct StateWatch {
    rx: watch::Receiver<SessionState>,
}

impl StateWatch {
    pub fn current(&self) -> SessionState {
        *self.rx.borrow()
    }

    /// Waits until `pred` holds and returns the state that satisfied it.
    ///
    /// If every handle is gone the session can never change again and is
    /// reported as `Closed`.
    pub async fn wait_until(&mut self, pred: impl Fn(SessionState) -> bool) -> SessionState {
        loop {
            let current = *self.rx.borrow_and_update();
            if pred(current) {
                return current;
            }
            if self.rx.changed().await.is_err() {
                return SessionState::Closed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.protocol_version, 1);
        assert_eq!(cfg.closed_write_policy, ClosedWritePolicy::Discard);
    }

    #[test]
    fn test_config_deserialises_with_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{ "closed_write_policy": "reject" }"#).unwrap();
        assert_eq!(cfg.closed_write_policy, ClosedWritePolicy::Reject);
        assert_eq!(cfg.protocol_version, 1);
    }

    #[test]
    fn test_state_transitions() {
        let h = SessionHandle::new(ConnectionId::new(1));
        assert_eq!(h.state(), SessionState::Open);
        assert!(h.close());
        assert_eq!(h.state(), SessionState::Closing);
        assert!(!h.close(), "close is not repeatable");
        h.teardown();
        assert_eq!(h.state(), SessionState::Closed);
        assert!(!h.close());
    }

    #[test]
    fn test_teardown_from_open() {
        let h = SessionHandle::new(ConnectionId::new(1));
        h.teardown();
        assert_eq!(h.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_closing_resolves_after_close() {
        let h = SessionHandle::new(ConnectionId::new(1));
        let waiter = {
            let h = h.clone();
            tokio::spawn(async move { h.closing().await })
        };
        tokio::task::yield_now().await;
        h.close();
        assert_eq!(waiter.await.unwrap(), SessionState::Closing);
    }

    #[tokio::test]
    async fn test_closed_resolves_after_teardown() {
        let h = SessionHandle::new(ConnectionId::new(1));
        let waiter = {
            let h = h.clone();
            tokio::spawn(async move { h.closed().await })
        };
        h.close();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        h.teardown();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_reports_closed_when_handles_dropped() {
        let h = SessionHandle::new(ConnectionId::new(1));
        let mut w = h.subscribe();
        drop(h);
        assert_eq!(
            w.wait_until(|s| s == SessionState::Closed).await,
            SessionState::Closed
        );
    }
}

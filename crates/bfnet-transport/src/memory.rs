//! In-process connection pair backed by unbounded channels.
//!
//! Each `send` on one side shows up as exactly one read event on the
//! other side, which makes frame-per-read behaviour deterministic in
//! tests without a socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, TransportError};

/// Server-facing half of an in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    close_count: Arc<AtomicUsize>,
}

/// Remote half of an in-process connection, driven by the test or embedder.
pub struct MemoryPeer {
    id: ConnectionId,
    to_server: Option<mpsc::UnboundedSender<Vec<u8>>>,
    from_server: mpsc::UnboundedReceiver<Vec<u8>>,
    close_count: Arc<AtomicUsize>,
}

impl MemoryConnection {
    /// Creates a connected pair.
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();
        let close_count = Arc::new(AtomicUsize::new(0));
        let id = ConnectionId::next();

        let conn = MemoryConnection {
            id,
            inbound: Mutex::new(inbound),
            outbound: Mutex::new(Some(outbound)),
            close_count: Arc::clone(&close_count),
        };
        let peer = MemoryPeer {
            id,
            to_server: Some(to_server),
            from_server,
            close_count,
        };
        (conn, peer)
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let outbound = self.outbound.lock().await;
        match outbound.as_ref() {
            Some(tx) => tx
                .send(data.to_vec())
                .map_err(|_| TransportError::ConnectionClosed(self.id)),
            None => Err(TransportError::ConnectionClosed(self.id)),
        }
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender ends the peer's stream.
        self.outbound.lock().await.take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

impl MemoryPeer {
    /// Id shared with the server-side half.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Delivers one read event to the server side.
    ///
    /// Returns `false` if the peer already hung up or the server half is gone.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        match &self.to_server {
            Some(tx) => tx.send(data.into()).is_ok(),
            None => false,
        }
    }

    /// Waits for the next chunk written by the server side.
    ///
    /// Returns `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_server.recv().await
    }

    /// Signals end-of-stream to the server side.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }

    /// How many times the server half has been closed.
    pub fn server_close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_send_is_one_read_event() {
        let (conn, peer) = MemoryConnection::pair();
        assert!(peer.send(b"one".to_vec()));
        assert!(peer.send(b"two".to_vec()));

        assert_eq!(conn.recv().await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(conn.recv().await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_hang_up_is_eof() {
        let (conn, mut peer) = MemoryConnection::pair();
        peer.hang_up();
        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(!peer.send(b"late".to_vec()));
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream_and_counts() {
        let (conn, mut peer) = MemoryConnection::pair();
        conn.send(b"bye").await.unwrap();
        conn.close().await.unwrap();

        assert_eq!(peer.recv().await, Some(b"bye".to_vec()));
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.server_close_count(), 1);

        let err = conn.send(b"after").await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }
}

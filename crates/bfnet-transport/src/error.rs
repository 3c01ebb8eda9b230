use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was already closed when an operation was attempted.
    #[error("{0} is closed")]
    ConnectionClosed(ConnectionId),

    /// Writing bytes to the peer failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading bytes from the peer failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Opening a client connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The listener address could not be determined.
    #[error("local address unavailable: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// The transport was shut down and accepts no more connections.
    #[error("transport shut down")]
    Shutdown,
}

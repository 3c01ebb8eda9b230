//! Error types for the session layer.

use bfnet_protocol::AutopackError;
use bfnet_transport::ConnectionId;

/// Errors surfaced to code that writes through a session.
///
/// Transport and header failures never show up here: the session handles
/// them by closing the connection, and readers observe end-of-stream.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session is no longer open and the configured policy rejects
    /// writes after close.
    #[error("{0} is closed")]
    Closed(ConnectionId),

    /// The packet could not be encoded. Nothing was sent.
    #[error("encode failed: {0}")]
    Encode(#[from] AutopackError),
}

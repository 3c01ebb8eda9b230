//! Unified error type for the bfnet framework.

use bfnet_protocol::{ProtocolError, SchemaError};
use bfnet_session::SessionError;
use bfnet_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `bfnet` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BfnetError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (header, payload, encode, schema).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (closed write, encode).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Work handed to the blocking pool panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),

    /// The log filter directive is not valid.
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    /// A global tracing subscriber was already installed.
    #[error(transparent)]
    LogInit(#[from] tracing_subscriber::util::TryInitError),
}

impl From<SchemaError> for BfnetError {
    fn from(err: SchemaError) -> Self {
        Self::Protocol(err.into())
    }
}

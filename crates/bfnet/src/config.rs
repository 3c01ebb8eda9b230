//! Server configuration.

use std::time::Duration;

use bfnet_session::SessionConfig;
use bfnet_transport::DEFAULT_READ_BUFFER;
use serde::{Deserialize, Serialize};

use crate::BfnetError;

/// Settings for one server instance.
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```json
/// { "bind_addr": "0.0.0.0:7000", "session": { "closed_write_policy": "reject" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: String,

    /// Upper bound on one read event, in bytes.
    pub read_buffer: usize,

    /// How long a handler may keep draining after its connection starts
    /// closing, before the session is torn down. Torn-down handlers get
    /// the same grace again before they are aborted.
    pub drain_grace_ms: u64,

    /// `tracing` filter used by [`init_tracing`](crate::init_tracing)
    /// when `RUST_LOG` is unset.
    pub log_filter: String,

    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7070".to_string(),
            read_buffer: DEFAULT_READ_BUFFER,
            drain_grace_ms: 1_000,
            log_filter: "info".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, BfnetError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

//! Plain TCP transport.

use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Default size of a single socket read (64 KiB).
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    read_buffer: usize,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            read_buffer: DEFAULT_READ_BUFFER,
        })
    }

    /// Sets the maximum number of bytes returned by one `recv()`.
    pub fn with_read_buffer(mut self, size: usize) -> Self {
        self.read_buffer = size.max(1);
        self
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = TcpConnection::from_stream(stream, Some(addr), self.read_buffer);
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::LocalAddr)
    }
}

/// A single TCP connection.
///
/// The socket is split so a pending `recv()` never blocks a `send()`.
pub struct TcpConnection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    read_buffer: usize,
    reader: Mutex<Reader>,
    writer: Mutex<OwnedWriteHalf>,
}

/// Read half plus the buffer reused by every `recv()`.
struct Reader {
    half: OwnedReadHalf,
    buf: BytesMut,
}

impl TcpConnection {
    /// Wraps an already connected stream.
    pub fn from_stream(
        stream: TcpStream,
        peer: Option<SocketAddr>,
        read_buffer: usize,
    ) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let (half, writer) = stream.into_split();
        let read_buffer = read_buffer.max(1);
        Self {
            id: ConnectionId::next(),
            peer,
            read_buffer,
            reader: Mutex::new(Reader {
                half,
                buf: BytesMut::with_capacity(read_buffer),
            }),
            writer: Mutex::new(writer),
        }
    }

    /// Opens a client connection to `addr`.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let peer = stream.peer_addr().ok();
        Ok(Self::from_stream(stream, peer, DEFAULT_READ_BUFFER))
    }
}

impl Connection for TcpConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut reader = self.reader.lock().await;
        let Reader { half, buf } = &mut *reader;
        buf.clear();
        buf.reserve(self.read_buffer);
        let n = half
            .read_buf(&mut (&mut *buf).limit(self.read_buffer))
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..n].to_vec()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

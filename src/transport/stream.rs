//! [`Transport`] over tokio reader/writer halves.
//!
//! Reads go through a `BufReader` so that `poll_readable` can wait for input
//! with `fill_buf` (cancel-safe, consumes nothing) under a timeout.
//!
//! # Example
//!
//! ```
//! use arraybridge::transport::{in_memory_pair, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> arraybridge::error::Result<()> {
//! let (mut left, mut right) = in_memory_pair(1024);
//! left.write_all(b"ping").await?;
//!
//! let mut buf = [0u8; 4];
//! right.read_exact(&mut buf).await?;
//! assert_eq!(&buf, b"ping");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
    ReadHalf, WriteHalf,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use super::Transport;
use crate::error::{BridgeError, Result};

/// Read buffer size for stream transports.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Transport over a split reader/writer pair.
pub struct StreamTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
    closed: bool,
}

/// Transport over a TCP connection.
pub type TcpTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

/// Transport over an in-memory duplex pipe.
pub type MemoryTransport = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a reader and a writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, reader),
            writer,
            closed: false,
        }
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl TcpTransport {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).await?;
        Ok(())
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(BridgeError::ConnectionClosed);
        }
        self.writer.write_all(buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        match tokio::time::timeout(timeout, self.reader.fill_buf()).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(BridgeError::Io(e)),
            Err(_elapsed) => Ok(false),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Connect to a peer listening on `host:port`.
///
/// Every address `host` resolves to is tried in turn (IPv6 and IPv4).
pub async fn connect_tcp(host: &str, port: u16) -> Result<TcpTransport> {
    let stream = TcpStream::connect((host, port)).await?;
    tracing::debug!("Connected to {}:{}", host, port);
    TcpTransport::from_tcp(stream)
}

/// Listening TCP socket for a single peer.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind to an ephemeral port on localhost.
    pub async fn bind_local() -> Result<Self> {
        Self::bind("127.0.0.1", 0).await
    }

    /// Bind to `host:port` (port 0 picks a free port).
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        Ok(Self { listener })
    }

    /// The port actually bound, to hand to the peer launcher.
    pub fn port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept one connection.
    pub async fn accept(&self) -> Result<TcpTransport> {
        let (stream, addr) = self.listener.accept().await?;
        tracing::debug!("Accepted peer connection from {}", addr);
        TcpTransport::from_tcp(stream)
    }
}

/// Create two connected in-memory transports.
///
/// `capacity` bounds the bytes buffered in each direction.
pub fn in_memory_pair(capacity: usize) -> (MemoryTransport, MemoryTransport) {
    let (a, b) = tokio::io::duplex(capacity);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    (
        StreamTransport::new(a_read, a_write),
        StreamTransport::new(b_read, b_write),
    )
}

//! Transport module - the bidirectional byte channel under a session.
//!
//! A [`Transport`] is anything that can read exact byte counts, write whole
//! buffers, report whether input is waiting, and close. [`StreamTransport`]
//! implements it over any tokio reader/writer pair:
//! - TCP sockets ([`connect_tcp`], [`TcpAcceptor`])
//! - Unix Domain Sockets ([`PipeListener`], [`connect_unix`])
//! - in-memory duplex pipes ([`in_memory_pair`]), mainly for tests

#[cfg(unix)]
mod pipe;
mod stream;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

#[cfg(unix)]
pub use pipe::{connect_unix, generate_pipe_path, PipeListener, UnixTransport};
pub use stream::{
    connect_tcp, in_memory_pair, MemoryTransport, StreamTransport, TcpAcceptor, TcpTransport,
};

/// Byte channel used by a session.
///
/// Implementations must be ordered and reliable. `poll_readable` must not
/// consume input: data seen by a poll is still returned by the next read.
#[async_trait]
pub trait Transport: Send {
    /// Fill `buf` completely or fail. A stream that ends early yields
    /// `io::ErrorKind::UnexpectedEof`.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` and flush it.
    async fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for input. Returns `true` if a read would not
    /// block (including end of stream).
    async fn poll_readable(&mut self, timeout: Duration) -> Result<bool>;

    /// Shut down the write side. Further writes fail.
    async fn close(&mut self) -> Result<()>;
}

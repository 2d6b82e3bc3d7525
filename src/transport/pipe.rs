//! Unix Domain Socket endpoints.
//!
//! The launcher side binds a [`PipeListener`] at a path it hands to the peer;
//! the worker side dials it with [`connect_unix`].
//!
//! # Example
//!
//! ```ignore
//! use arraybridge::transport::{generate_pipe_path, PipeListener};
//!
//! let path = generate_pipe_path();
//! let listener = PipeListener::bind(&path).await?;
//! let transport = listener.accept().await?;
//! ```

use std::path::Path;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};

use super::StreamTransport;
use crate::error::Result;

/// Transport over a Unix Domain Socket.
pub type UnixTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

/// Generate a unique socket path for this process.
///
/// Format: `/tmp/arraybridge-{pid}-{random}.sock`
pub fn generate_pipe_path() -> String {
    format!("/tmp/arraybridge-{}-{:x}.sock", std::process::id(), rand_u64())
}

/// Simple random u64 using system time and process ID.
fn rand_u64() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let pid = std::process::id() as u64;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    nanos.wrapping_mul(0x517cc1b727220a95) ^ pid ^ seq.rotate_left(32)
}

/// Unix Domain Socket listener accepting one peer at a time.
pub struct PipeListener {
    listener: UnixListener,
    path: String,
}

impl PipeListener {
    /// Bind to a Unix socket path.
    ///
    /// Removes any existing socket file at the path before binding.
    pub async fn bind(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;

        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<UnixTransport> {
        let (stream, _addr) = self.listener.accept().await?;
        tracing::debug!("Accepted peer on {}", self.path);
        Ok(into_transport(stream))
    }

    /// Get the socket path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Connect to a socket bound by the controlling side.
pub async fn connect_unix(path: &str) -> Result<UnixTransport> {
    let stream = UnixStream::connect(path).await?;
    tracing::debug!("Connected to {}", path);
    Ok(into_transport(stream))
}

fn into_transport(stream: UnixStream) -> UnixTransport {
    let (reader, writer) = stream.into_split();
    StreamTransport::new(reader, writer)
}

//! Interrupt signalling.
//!
//! An [`InterruptHandle`] is the only piece of a session shared across
//! tasks. Triggering it sets a flag and wakes the session if it is waiting
//! for a frame; the session then forwards the interrupt to the peer through
//! a [`PeerInterrupter`]. If the session is busy running a request instead,
//! the interpreter sees the flag at its next statement or call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::Result;

/// Clonable handle that interrupts a session.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an interrupt. Safe to call from any task or thread.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Check for a pending interrupt without consuming it.
    pub fn is_pending(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Resolves after the next [`trigger`](Self::trigger).
    ///
    /// May also resolve for a trigger that was already consumed; callers
    /// re-check with [`take`](Self::take).
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Delivers an interrupt to the peer process.
pub trait PeerInterrupter: Send + Sync {
    fn interrupt(&self, pid: u32) -> Result<()>;
}

/// Sends SIGINT to the peer.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalInterrupter;

#[cfg(unix)]
impl PeerInterrupter for SignalInterrupter {
    fn interrupt(&self, pid: u32) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(pid).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid pid {}", pid))
        })?;
        kill(Pid::from_raw(pid), Signal::SIGINT).map_err(std::io::Error::from)?;
        Ok(())
    }
}

/// Interrupter used when none is configured explicitly.
pub(crate) fn default_interrupter() -> Option<Box<dyn PeerInterrupter>> {
    #[cfg(unix)]
    {
        Some(Box::new(SignalInterrupter))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

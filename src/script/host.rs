//! The seam between the interpreter and whatever runs it.
//!
//! A [`Host`] owns the global [`Environment`], the object store and the
//! link to the peer. The session is the real host; [`Detached`] runs
//! scripts with no peer at all.

use std::collections::HashMap;

use async_trait::async_trait;

use super::value::HostValue;
use crate::error::{BridgeError, Result};
use crate::session::PeerDialect;
use crate::store::ObjectStore;
use crate::value::Value;

/// Name the session handle is bound to in every environment.
pub const PEER_NAME: &str = "APL";

/// Persistent global namespace of a session.
#[derive(Debug, Clone)]
pub struct Environment {
    globals: HashMap<String, HostValue>,
    operand_slots: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Fresh environment with only the session handle defined.
    pub fn new() -> Self {
        let mut globals = HashMap::new();
        globals.insert(PEER_NAME.to_string(), HostValue::Peer);
        Self {
            globals,
            operand_slots: 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.globals.get(name)
    }

    /// Bind a global, replacing any previous binding.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<HostValue>) {
        self.globals.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<HostValue> {
        self.globals.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Number for the next set of operator operands stored on the peer.
    pub(crate) fn next_operand_slot(&mut self) -> usize {
        let slot = self.operand_slots;
        self.operand_slots += 1;
        slot
    }
}

/// Services the interpreter needs from its runner.
#[async_trait]
pub trait Host: Send {
    fn env(&mut self) -> &mut Environment;

    fn store(&mut self) -> &mut ObjectStore;

    fn dialect(&self) -> &PeerDialect;

    /// Process id announced by the peer, if any.
    fn peer_pid(&self) -> Option<u32>;

    /// Consume a pending local interrupt.
    fn take_interrupt(&mut self) -> bool;

    /// Ask the peer to interrupt whatever it is doing.
    fn interrupt_peer(&mut self);

    /// Output of the `print` builtin.
    fn print(&mut self, line: &str) {
        println!("{}", line);
    }

    /// Evaluate `code` on the peer with `args` bound to its argument vector.
    async fn peer_eval(&mut self, code: &str, args: Vec<Value>) -> Result<Value>;

    /// Printable form of a peer expression.
    async fn peer_repr(&mut self, code: &str) -> Result<String>;

    /// Run statements on the peer.
    async fn peer_exec(&mut self, code: &str) -> Result<String>;
}

/// A host without a peer, for running scripts locally.
///
/// Peer operations fail; `print` output is collected in `output`.
#[derive(Debug, Default)]
pub struct Detached {
    pub env: Environment,
    pub store: ObjectStore,
    pub dialect: PeerDialect,
    pub output: Vec<String>,
    pub interrupted: bool,
}

impl Detached {
    pub fn new() -> Self {
        Self::default()
    }
}

fn no_peer() -> BridgeError {
    BridgeError::Runtime("RuntimeError: no peer is connected".into())
}

#[async_trait]
impl Host for Detached {
    fn env(&mut self) -> &mut Environment {
        &mut self.env
    }

    fn store(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    fn dialect(&self) -> &PeerDialect {
        &self.dialect
    }

    fn peer_pid(&self) -> Option<u32> {
        None
    }

    fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupted)
    }

    fn interrupt_peer(&mut self) {}

    fn print(&mut self, line: &str) {
        self.output.push(line.to_string());
    }

    async fn peer_eval(&mut self, _code: &str, _args: Vec<Value>) -> Result<Value> {
        Err(no_peer())
    }

    async fn peer_repr(&mut self, _code: &str) -> Result<String> {
        Err(no_peer())
    }

    async fn peer_exec(&mut self, _code: &str) -> Result<String> {
        Err(no_peer())
    }
}

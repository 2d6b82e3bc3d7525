//! Session - one end of a bridge connection.
//!
//! A [`Session`] owns a transport, the script [`Environment`] and the
//! [`ObjectStore`]. It serves requests from the peer ([`Session::run`]) and
//! makes requests of its own ([`Session::eval`] and friends). While one of
//! its own requests is outstanding it keeps serving incoming requests, so
//! the two sides can call into each other to any depth.
//!
//! Lifecycle:
//! 1. Build with [`SessionBuilder::new`]
//! 2. [`Session::start`] announces our PID (if sign-on is enabled)
//! 3. Serve with [`Session::run`] and/or issue calls
//! 4. [`Session::stop`] (or a STOP from the peer) ends the session
//!
//! # Example
//!
//! ```no_run
//! use arraybridge::session::SessionBuilder;
//! use arraybridge::transport::connect_tcp;
//!
//! # #[tokio::main]
//! # async fn main() -> arraybridge::error::Result<()> {
//! let transport = connect_tcp("127.0.0.1", 4000).await?;
//! let mut session = SessionBuilder::new().sign_on(true).build(transport);
//! session.start().await?;
//! session.run().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatch;
mod interrupt;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, warn};

pub use config::{PeerDialect, SessionBuilder, SessionConfig, DEFAULT_POLL_INTERVAL};
#[cfg(unix)]
pub use interrupt::SignalInterrupter;
pub use interrupt::{InterruptHandle, PeerInterrupter};

use crate::error::{BridgeError, Result};
use crate::protocol::{read_frame, write_frame, Message, MessageType};
use crate::script::{Environment, Host, HostValue, RemoteObject};
use crate::store::ObjectStore;
use crate::transport::Transport;
use crate::value::{from_host_element, json, text_value, to_host_value, Array, Value};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built, nothing sent yet.
    Init,
    /// Exchanging messages.
    Running,
    /// STOP exchanged or the transport failed. Terminal.
    Stopped,
}

/// One end of a bridge connection.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    env: Environment,
    store: ObjectStore,
    interrupt: InterruptHandle,
    interrupter: Option<Box<dyn PeerInterrupter>>,
    peer_pid: Option<u32>,
}

impl<T: Transport> Session<T> {
    /// Session with the default configuration.
    pub fn new(transport: T) -> Self {
        SessionBuilder::new().build(transport)
    }

    pub(crate) fn with_config(
        transport: T,
        config: SessionConfig,
        interrupter: Option<Box<dyn PeerInterrupter>>,
    ) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Init,
            env: Environment::new(),
            store: ObjectStore::new(),
            interrupt: InterruptHandle::new(),
            interrupter,
            peer_pid: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == SessionState::Stopped
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for interrupting this session from another task.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Enter Running; announces our PID if sign-on is configured.
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Stopped => return Err(BridgeError::Stopped),
            SessionState::Running => return Ok(()),
            SessionState::Init => {}
        }
        self.state = SessionState::Running;
        if self.config.sign_on {
            let pid = std::process::id().to_string();
            debug!("Signing on with PID {}", pid);
            self.send(MessageType::Pid, pid.as_bytes()).await?;
        }
        Ok(())
    }

    /// Serve peer requests until STOP or the connection ends.
    ///
    /// A peer that simply disconnects is not an error.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        while !self.is_stopped() {
            let message = match self.next_message(false).await {
                Ok(message) => message,
                Err(BridgeError::ConnectionClosed) => {
                    debug!("Peer closed the connection");
                    return Ok(());
                }
                Err(e) => {
                    error!("Session loop error: {}", e);
                    return Err(e);
                }
            };
            match self.dispatch(message).await {
                Ok(()) => {}
                Err(BridgeError::Stopped) | Err(BridgeError::ConnectionClosed) => return Ok(()),
                Err(e) => {
                    error!("Session loop error: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Wait for the peer's PID announcement and record it.
    pub async fn await_peer_pid(&mut self) -> Result<u32> {
        let message = self.expect(MessageType::Pid).await?;
        if message.is_error() {
            return Err(BridgeError::remote(&message.payload));
        }
        let text = message.text();
        let pid = text.trim().parse::<u32>().map_err(|_| {
            BridgeError::MalformedMessage(format!("PID message does not hold a process id: {:?}", text))
        })?;
        debug!("Peer PID is {}", pid);
        self.peer_pid = Some(pid);
        Ok(pid)
    }

    /// Evaluate `code` on the peer with `args` as its argument vector.
    ///
    /// Multi-line code is joined into one line with `⋄` separators.
    pub async fn eval(&mut self, code: &str, args: Vec<Value>) -> Result<Value> {
        let code = normalize_code(code);
        debug!(code = %code, args = args.len(), "eval on peer");
        let request = Value::Array(Array::vector(vec![
            text_value(&code, false),
            Value::Array(Array::vector(args)),
        ]));
        let payload = json::encode(&request)?;
        let reply = self
            .request(MessageType::Eval, &payload, MessageType::EvalRet)
            .await?;
        json::decode(&reply.payload)
    }

    /// Like [`eval`](Self::eval), converting arguments and result to host
    /// values.
    pub async fn eval_host(&mut self, code: &str, args: Vec<HostValue>) -> Result<HostValue> {
        let values = args
            .iter()
            .map(|arg| from_host_element(arg, Some(&mut self.store)))
            .collect::<Result<Vec<_>>>()?;
        let result = self.eval(code, values).await?;
        to_host_value(&result, &self.store)
    }

    /// Printable form of a peer expression.
    pub async fn repr(&mut self, code: &str) -> Result<String> {
        let reply = self
            .request(MessageType::Repr, code.as_bytes(), MessageType::ReprRet)
            .await?;
        Ok(reply.text())
    }

    /// Run statements on the peer; returns the text of its OK reply.
    pub async fn exec(&mut self, code: &str) -> Result<String> {
        let reply = self
            .request(MessageType::Exec, code.as_bytes(), MessageType::Ok)
            .await?;
        Ok(reply.text())
    }

    /// Send OK with `payload` and wait for the echo.
    pub async fn ping(&mut self, payload: &[u8]) -> Result<Bytes> {
        let reply = self
            .request(MessageType::Ok, payload, MessageType::Ok)
            .await?;
        Ok(reply.payload)
    }

    /// Have the peer decode and re-encode `value`.
    pub async fn debug_roundtrip(&mut self, value: &Value) -> Result<Value> {
        let payload = json::encode(value)?;
        let reply = self
            .request(
                MessageType::DebugRoundTrip,
                &payload,
                MessageType::DebugRoundTrip,
            )
            .await?;
        json::decode(&reply.payload)
    }

    /// Ask the peer to drop one of its stored objects.
    pub async fn release_remote(&mut self, remote: &RemoteObject) -> Result<()> {
        debug!(id = %remote.id, "releasing remote object");
        let code = self.config.dialect.release_expr();
        self.eval(&code, vec![text_value(&remote.id, false)]).await?;
        Ok(())
    }

    /// Send STOP, wait for the acknowledgement and enter Stopped.
    pub async fn stop(&mut self) -> Result<()> {
        if self.is_stopped() {
            return Ok(());
        }
        let reply = self
            .request(MessageType::Stop, b"STOP", MessageType::Stop)
            .await;
        self.state = SessionState::Stopped;
        if let Err(e) = self.transport.close().await {
            debug!("Closing transport after STOP failed: {}", e);
        }
        match reply {
            Ok(_) | Err(BridgeError::Stopped) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Send a request and wait for its reply. ERROR becomes [`BridgeError::Remote`].
    async fn request(
        &mut self,
        kind: MessageType,
        payload: &[u8],
        reply: MessageType,
    ) -> Result<Message> {
        self.send(kind, payload).await?;
        let message = self.expect(reply).await?;
        if message.is_error() {
            let err = BridgeError::remote(&message.payload);
            debug!("{} request failed: {}", kind, err);
            return Err(err);
        }
        Ok(message)
    }

    /// Wait for a message of kind `reply` (or ERROR), serving any other
    /// incoming request in the meantime.
    pub async fn expect(&mut self, reply: MessageType) -> Result<Message> {
        loop {
            if self.is_stopped() {
                return Err(BridgeError::Stopped);
            }
            let message = self.next_message(true).await?;
            if message.kind == reply || message.is_error() {
                return Ok(message);
            }
            self.dispatch(message).await?;
        }
    }

    /// Read the next frame. A local interrupt that arrives meanwhile is
    /// forwarded to the peer when `waiting` on one of our own calls and
    /// dropped otherwise.
    async fn next_message(&mut self, waiting: bool) -> Result<Message> {
        loop {
            let polled = tokio::select! {
                _ = self.interrupt.notified() => None,
                ready = self.transport.poll_readable(self.config.poll_interval) => Some(ready),
            };
            match polled {
                None => {
                    if !self.interrupt.take() {
                        continue;
                    }
                    if waiting {
                        self.forward_interrupt();
                    } else {
                        debug!("Interrupt ignored: no call outstanding");
                    }
                }
                Some(Ok(true)) => break,
                Some(Ok(false)) => {}
                Some(Err(e)) => return Err(self.fail(e)),
            }
        }

        match read_frame(&mut self.transport, self.config.max_payload_size).await {
            Ok(frame) => Ok(Message::from(frame)),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub(crate) async fn send(&mut self, kind: MessageType, payload: &[u8]) -> Result<()> {
        if self.is_stopped() {
            return Err(BridgeError::Stopped);
        }
        debug!("Sending {} ({} bytes)", kind, payload.len());
        match write_frame(&mut self.transport, kind.as_u8(), payload).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Record a transport failure; the stream cannot be trusted afterwards.
    fn fail(&mut self, err: BridgeError) -> BridgeError {
        if err.is_fatal() {
            if !matches!(err, BridgeError::ConnectionClosed) {
                error!("Transport failure: {}", err);
            }
            self.state = SessionState::Stopped;
        }
        err
    }

    fn forward_interrupt(&mut self) {
        match (self.peer_pid, &self.interrupter) {
            (Some(pid), Some(interrupter)) => {
                warn!("Forwarding interrupt to peer process {}", pid);
                if let Err(e) = interrupter.interrupt(pid) {
                    warn!("Could not interrupt peer: {}", e);
                }
            }
            (None, _) => warn!("Interrupt dropped: peer PID unknown"),
            (_, None) => warn!("Interrupt dropped: no interrupter configured"),
        }
    }
}

/// Join multi-line code into a single `⋄`-separated line.
fn normalize_code(code: &str) -> String {
    code.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("⋄")
        .replace("{⋄", "{")
        .replace("⋄}", "}")
        .replace("(⋄", "(")
        .replace("⋄)", ")")
}

#[async_trait]
impl<T: Transport> Host for Session<T> {
    fn env(&mut self) -> &mut Environment {
        &mut self.env
    }

    fn store(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    fn dialect(&self) -> &PeerDialect {
        &self.config.dialect
    }

    fn peer_pid(&self) -> Option<u32> {
        self.peer_pid
    }

    fn take_interrupt(&mut self) -> bool {
        self.interrupt.take()
    }

    fn interrupt_peer(&mut self) {
        self.forward_interrupt();
    }

    async fn peer_eval(&mut self, code: &str, args: Vec<Value>) -> Result<Value> {
        self.eval(code, args).await
    }

    async fn peer_repr(&mut self, code: &str) -> Result<String> {
        self.repr(code).await
    }

    async fn peer_exec(&mut self, code: &str) -> Result<String> {
        self.exec(code).await
    }
}

//! # arraybridge
//!
//! Reentrant IPC bridge between this process and a peer array-language
//! interpreter.
//!
//! Both sides exchange length-prefixed frames over a byte stream. Values
//! travel as JSON: multidimensional arrays with a shape vector, namespaces,
//! and references to objects that stay behind in the process that owns them.
//!
//! ## Architecture
//!
//! - **Transport** ([`transport`]): TCP, Unix sockets or in-memory pipes
//! - **Protocol** ([`protocol`]): 5-byte header (tag + big-endian length)
//! - **Values** ([`value`]): the array model, its JSON form, host conversion
//! - **Script** ([`script`]): the expression language requests are written in
//! - **Session** ([`session`]): dispatch loop and outbound calls. A call to
//!   the peer keeps serving the peer's own requests until the answer arrives,
//!   so the two sides can call each other recursively.
//!
//! ## Example
//!
//! ```no_run
//! use arraybridge::{SessionBuilder, Value};
//! use arraybridge::transport::connect_tcp;
//!
//! #[tokio::main]
//! async fn main() -> arraybridge::Result<()> {
//!     let transport = connect_tcp("127.0.0.1", 4000).await?;
//!     let mut session = SessionBuilder::new().build(transport);
//!     session.start().await?;
//!     session.await_peer_pid().await?;
//!
//!     // the peer binds the argument vector to ∆
//!     let doubled = session.eval("2×⊃∆", vec![Value::from(21i64)]).await?;
//!     println!("{:?}", doubled);
//!
//!     session.stop().await
//! }
//! ```

pub mod error;
pub mod evaluator;
pub mod protocol;
pub mod script;
pub mod session;
pub mod store;
pub mod transport;
pub mod value;

pub use error::{BridgeError, Result};
pub use script::{Host, HostObject, HostValue};
pub use session::{InterruptHandle, Session, SessionBuilder};
pub use store::ObjectStore;
pub use value::{Array, Value};

//! Host script - the small language peer snippets are written in.
//!
//! A dynamically typed, Python-flavoured expression language:
//! - literals: numbers, imaginary numbers, strings, `True`/`False`/`None`,
//!   lists, tuples (as lists) and dicts
//! - arithmetic, comparison, membership and boolean operators
//! - calls, indexing, slicing and attribute access
//! - `name = expr` statements separated by newlines or `;`
//!
//! Every environment binds `APL` to the session handle, through which a
//! script can call back into the peer while a request is being served.
//!
//! # Example
//!
//! ```
//! use arraybridge::script::{eval_source, exec_source, Detached, HostValue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> arraybridge::error::Result<()> {
//! let mut host = Detached::new();
//! exec_source(&mut host, "base = 2; exponent = 8").await?;
//! assert_eq!(
//!     eval_source(&mut host, "base ** exponent").await?,
//!     HostValue::Int(256)
//! );
//! # Ok(())
//! # }
//! ```

mod builtins;
mod host;
mod interp;
mod lexer;
mod ops;
mod parser;
mod value;

pub use builtins::BUILTINS;
pub use host::{Detached, Environment, Host, PEER_NAME};
pub use interp::{eval_source, exec_source, BoxFuture, Interpreter};
pub use parser::{parse_expr, parse_program, Expr, Program, Stmt};
pub use value::{HostObject, HostObjectRef, HostValue, PeerFunction, PeerOperator, RemoteObject};

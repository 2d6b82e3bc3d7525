//! Session configuration and builder.

use std::time::Duration;

use super::interrupt::{default_interrupter, PeerInterrupter};
use super::Session;
use crate::error::{BridgeError, Result};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::transport::Transport;

/// Default interval between readability polls while waiting for a frame.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Operators whose derived functions use the product templates.
const PRODUCT_OPERATORS: [&str; 2] = [".", "∘."];

/// Expression templates used to manipulate the peer's objects.
///
/// `{id}`, `{name}`, `{fn}`, `{n}`, `{role}`, `{aa}`, `{op}` and `{ww}` are
/// replaced literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDialect {
    /// Attribute or operation of a peer object: `{id}`, `{name}`.
    pub access: String,
    /// Monadic function assigning its argument to attribute `{name}` of
    /// peer object `{id}`.
    pub assign_attr: String,
    /// Peer function that drops one of its stored objects.
    pub release: String,
    /// Apply `{fn}` to the single element of the argument vector.
    pub monadic: String,
    /// Apply `{fn}` between the two elements of the argument vector.
    pub dyadic: String,
    /// Fix the script whose lines are the argument vector.
    pub fix: String,
    /// Peer name holding operand `{role}` of derivation `{n}`.
    pub operand: String,
    /// Bind `{name}` to the single element of the argument vector.
    pub store_value: String,
    /// Bind `{name}` to function `{fn}`.
    pub store_fn: String,
    /// Operator `{op}` with left operand `{aa}`.
    pub derived_monadic: String,
    /// Operator `{op}` with operands `{aa}` and `{ww}`.
    pub derived_dyadic: String,
    /// Outer product with `{aa}`, for the product operators.
    pub outer_product: String,
    /// Inner product of `{aa}` and `{ww}`, for the product operators.
    pub inner_product: String,
}

impl Default for PeerDialect {
    fn default() -> Self {
        Self {
            access: "(py.⍙Access'{id}').{name}".into(),
            assign_attr: "{(py.⍙Access'{id}').{name} ← ⍵}".into(),
            release: "py.⍙Release".into(),
            monadic: "({fn})⊃∆".into(),
            dyadic: "(⊃∆)({fn})2⊃∆".into(),
            fix: "2⎕FIX ∆".into(),
            operand: "___op{n}_{role}".into(),
            store_value: "{name} ← ⊃∆".into(),
            store_fn: "{name} ← {fn}⋄⍬".into(),
            derived_monadic: "(({aa})({op}))".into(),
            derived_dyadic: "(({aa}){op}({ww}))".into(),
            outer_product: "(∘.({aa}))".into(),
            inner_product: "(({aa}).({ww}))".into(),
        }
    }
}

impl PeerDialect {
    /// Expression naming member `name` of peer object `id`.
    pub fn access_expr(&self, id: &str, name: &str) -> String {
        self.access.replace("{id}", id).replace("{name}", name)
    }

    /// Expression applying `function` to `argc` arguments.
    pub fn call_expr(&self, function: &str, argc: usize) -> Result<String> {
        match argc {
            0 => Ok(function.to_string()),
            1 => Ok(self.monadic.replace("{fn}", function)),
            2 => Ok(self.dyadic.replace("{fn}", function)),
            _ => Err(BridgeError::Runtime(
                "Function must be niladic, monadic or dyadic.".into(),
            )),
        }
    }

    /// Expression releasing the object whose id is the single argument.
    pub fn release_expr(&self) -> String {
        self.monadic.replace("{fn}", &self.release)
    }

    /// Expression assigning the single argument to member `name` of peer
    /// object `id`.
    pub fn assign_attr_expr(&self, id: &str, name: &str) -> String {
        let setter = self.assign_attr.replace("{id}", id).replace("{name}", name);
        self.monadic.replace("{fn}", &setter)
    }

    pub fn operand_name(&self, slot: usize, role: &str) -> String {
        self.operand
            .replace("{n}", &slot.to_string())
            .replace("{role}", role)
    }

    pub fn store_value_expr(&self, name: &str) -> String {
        self.store_value.replace("{name}", name)
    }

    pub fn store_fn_expr(&self, name: &str, function: &str) -> String {
        self.store_fn.replace("{name}", name).replace("{fn}", function)
    }

    /// Function derived from operator `op` and the stored operands.
    pub fn derived_expr(&self, op: &str, aa: &str, ww: Option<&str>) -> String {
        let product = PRODUCT_OPERATORS.contains(&op);
        let template = match (ww, product) {
            (None, false) => &self.derived_monadic,
            (None, true) => &self.outer_product,
            (Some(_), false) => &self.derived_dyadic,
            (Some(_), true) => &self.inner_product,
        };
        template
            .replace("{aa}", aa)
            .replace("{ww}", ww.unwrap_or_default())
            .replace("{op}", op)
    }
}

/// Tunables of a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Announce our process id when the session starts.
    pub sign_on: bool,
    /// How long each readability poll waits before checking for interrupts.
    pub poll_interval: Duration,
    /// Largest payload accepted from the peer.
    pub max_payload_size: u32,
    /// Peer-side expression templates.
    pub dialect: PeerDialect,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sign_on: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            dialect: PeerDialect::default(),
        }
    }
}

/// Builder for configuring and creating a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    interrupter: Option<Box<dyn PeerInterrupter>>,
}

impl SessionBuilder {
    /// Create a new session builder.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            interrupter: default_interrupter(),
        }
    }

    /// Send our PID when the session starts.
    ///
    /// Default: true
    pub fn sign_on(mut self, sign_on: bool) -> Self {
        self.config.sign_on = sign_on;
        self
    }

    /// Set the readability poll interval.
    ///
    /// Default: 100 ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the maximum accepted payload size.
    ///
    /// Default: 1 GiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Replace the peer expression templates.
    pub fn dialect(mut self, dialect: PeerDialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    /// Set how interrupts are delivered to the peer process.
    pub fn interrupter(mut self, interrupter: impl PeerInterrupter + 'static) -> Self {
        self.interrupter = Some(Box::new(interrupter));
        self
    }

    /// Never forward interrupts to the peer.
    pub fn without_interrupter(mut self) -> Self {
        self.interrupter = None;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Build a session over `transport`. Nothing is sent until
    /// [`Session::start`].
    pub fn build<T: Transport>(self, transport: T) -> Session<T> {
        Session::with_config(transport, self.config, self.interrupter)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.sign_on);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = SessionBuilder::new()
            .sign_on(false)
            .poll_interval(Duration::from_millis(5))
            .max_payload_size(1024)
            .without_interrupter();
        assert!(!builder.config().sign_on);
        assert_eq!(builder.config().poll_interval, Duration::from_millis(5));
        assert_eq!(builder.config().max_payload_size, 1024);
    }

    #[test]
    fn test_dialect_access() {
        let dialect = PeerDialect::default();
        assert_eq!(dialect.access_expr("17", "Size"), "(py.⍙Access'17').Size");
    }

    #[test]
    fn test_dialect_calls() {
        let dialect = PeerDialect::default();
        assert_eq!(dialect.call_expr("⍳", 0).unwrap(), "⍳");
        assert_eq!(dialect.call_expr("⍳", 1).unwrap(), "(⍳)⊃∆");
        assert_eq!(dialect.call_expr("+", 2).unwrap(), "(⊃∆)(+)2⊃∆");
        assert!(dialect.call_expr("+", 3).is_err());
        assert_eq!(dialect.release_expr(), "(py.⍙Release)⊃∆");
    }

    #[test]
    fn test_dialect_assign_attr() {
        let dialect = PeerDialect::default();
        assert_eq!(
            dialect.assign_attr_expr("17", "Size"),
            "({(py.⍙Access'17').Size ← ⍵})⊃∆"
        );
    }

    #[test]
    fn test_dialect_operands() {
        let dialect = PeerDialect::default();
        let aa = dialect.operand_name(3, "aa");
        assert_eq!(aa, "___op3_aa");
        assert_eq!(dialect.store_value_expr(&aa), "___op3_aa ← ⊃∆");
        assert_eq!(dialect.store_fn_expr(&aa, "+"), "___op3_aa ← +⋄⍬");
    }

    #[test]
    fn test_dialect_derived_functions() {
        let dialect = PeerDialect::default();
        assert_eq!(dialect.derived_expr("/", "a", None), "((a)(/))");
        assert_eq!(dialect.derived_expr("⍤", "a", Some("w")), "((a)⍤(w))");
        assert_eq!(dialect.derived_expr("∘.", "a", None), "(∘.(a))");
        assert_eq!(dialect.derived_expr(".", "a", None), "(∘.(a))");
        assert_eq!(dialect.derived_expr(".", "a", Some("w")), "((a).(w))");
        assert_eq!(dialect.derived_expr("∘.", "a", Some("w")), "((a).(w))");
    }
}

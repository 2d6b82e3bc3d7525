//! Runtime values of the host script.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::value::{fmt_float, json, Complex, Value};

/// Shared handle to a host object.
pub type HostObjectRef = Arc<dyn HostObject>;

/// An object implemented in Rust and exposed to scripts.
///
/// Host objects are what the object store tracks: when one is sent to the
/// peer it travels as an object reference carrying `attributes()` and
/// `operations()`.
pub trait HostObject: Send + Sync + fmt::Debug {
    /// Class name shown to the peer and by `type()`.
    fn type_name(&self) -> &str;

    fn attributes(&self) -> Vec<String> {
        Vec::new()
    }

    fn operations(&self) -> Vec<String> {
        Vec::new()
    }

    /// Attribute lookup.
    fn get(&self, name: &str) -> Option<HostValue> {
        let _ = name;
        None
    }

    /// Attribute assignment; attributes are read-only unless overridden.
    fn set(&self, name: &str, value: HostValue) -> Result<()> {
        let _ = value;
        Err(BridgeError::Runtime(format!(
            "AttributeError: '{}' object attribute '{}' is read-only",
            self.type_name(),
            name
        )))
    }

    /// Method call.
    fn call(&self, method: &str, args: Vec<HostValue>) -> Result<HostValue> {
        let _ = args;
        Err(BridgeError::Runtime(format!(
            "AttributeError: '{}' object has no attribute '{}'",
            self.type_name(),
            method
        )))
    }

    /// All elements, for objects that are plain sequences.
    fn elements(&self) -> Option<Vec<HostValue>> {
        None
    }

    /// Length, for objects that support positional access through `item`.
    fn len(&self) -> Option<usize> {
        None
    }

    fn item(&self, index: usize) -> Option<HostValue> {
        let _ = index;
        None
    }
}

/// Proxy for an object living in the peer's store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub id: String,
    pub class: Option<String>,
    pub attributes: Vec<String>,
    pub operations: Vec<String>,
}

/// A peer function created with `APL.fn(code)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerFunction {
    pub code: String,
    /// Keep results as raw values instead of converting them.
    pub raw: bool,
    /// Derived from a [`PeerOperator`]; needs at least one argument.
    pub derived: bool,
}

impl PeerFunction {
    pub fn new(code: impl Into<String>, raw: bool) -> Self {
        Self {
            code: code.into(),
            raw,
            derived: false,
        }
    }
}

/// A peer operator created with `APL.op(code)`. Calling it with operands
/// yields a derived [`PeerFunction`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeerOperator {
    pub code: String,
}

/// A host script value.
#[derive(Clone, Debug)]
pub enum HostValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Str(String),
    List(Vec<HostValue>),
    Dict(BTreeMap<String, HostValue>),
    /// A wire value kept as-is.
    Raw(Value),
    Object(HostObjectRef),
    Remote(Arc<RemoteObject>),
    Builtin(&'static str),
    /// The session handle, bound to `APL`.
    Peer,
    PeerFn(Arc<PeerFunction>),
    PeerOp(Arc<PeerOperator>),
}

impl HostValue {
    pub fn str(s: impl Into<String>) -> Self {
        HostValue::Str(s.into())
    }

    pub fn object(obj: impl HostObject + 'static) -> Self {
        HostValue::Object(Arc::new(obj))
    }

    pub fn type_name(&self) -> String {
        match self {
            HostValue::None => "NoneType".into(),
            HostValue::Bool(_) => "bool".into(),
            HostValue::Int(_) => "int".into(),
            HostValue::Float(_) => "float".into(),
            HostValue::Complex(_) => "complex".into(),
            HostValue::Str(_) => "str".into(),
            HostValue::List(_) => "list".into(),
            HostValue::Dict(_) => "dict".into(),
            HostValue::Raw(_) => "raw".into(),
            HostValue::Object(obj) => obj.type_name().to_string(),
            HostValue::Remote(r) => r.class.clone().unwrap_or_else(|| "remote".into()),
            HostValue::Builtin(_) => "builtin_function".into(),
            HostValue::Peer => "peer".into(),
            HostValue::PeerFn(_) => "peer_function".into(),
            HostValue::PeerOp(_) => "peer_operator".into(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            HostValue::None => false,
            HostValue::Bool(b) => *b,
            HostValue::Int(i) => *i != 0,
            HostValue::Float(f) => *f != 0.0,
            HostValue::Complex(c) => c.real != 0.0 || c.imag != 0.0,
            HostValue::Str(s) => !s.is_empty(),
            HostValue::List(items) => !items.is_empty(),
            HostValue::Dict(entries) => !entries.is_empty(),
            HostValue::Raw(Value::Array(a)) => !a.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by arithmetic and comparisons; booleans count as ints.
    pub(crate) fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Bool(b) => Some(i64::from(*b)),
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub(crate) fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Printable representation, as `repr()` shows it.
    pub fn repr(&self) -> String {
        match self {
            HostValue::None => "None".into(),
            HostValue::Bool(true) => "True".into(),
            HostValue::Bool(false) => "False".into(),
            HostValue::Int(i) => i.to_string(),
            HostValue::Float(f) => fmt_float(*f),
            HostValue::Complex(c) => c.to_string(),
            HostValue::Str(s) => quote(s),
            HostValue::List(items) => {
                let parts: Vec<String> = items.iter().map(HostValue::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            HostValue::Dict(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            HostValue::Raw(v) => match json::encode(v) {
                Ok(bytes) => format!("raw({})", String::from_utf8_lossy(&bytes)),
                Err(_) => "raw(?)".into(),
            },
            HostValue::Object(obj) => format!("<{} object>", obj.type_name()),
            HostValue::Remote(r) => format!(
                "<remote {} {}>",
                r.class.as_deref().unwrap_or("object"),
                r.id
            ),
            HostValue::Builtin(name) => format!("<built-in function {}>", name),
            HostValue::Peer => "<peer>".into(),
            HostValue::PeerFn(f) => format!("<peer function {}>", f.code),
            HostValue::PeerOp(op) => format!("<peer operator {}>", op.code),
        }
    }

    /// Text as `str()` and `print` show it.
    pub fn to_display(&self) -> String {
        match self {
            HostValue::Str(s) => s.clone(),
            other => other.repr(),
        }
    }
}

/// Quote a string the way `repr` does: single quotes unless the text
/// contains a single quote and no double quote.
fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (None, None) | (Peer, Peer) => true,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            (Raw(a), Raw(b)) => a == b,
            (Complex(a), Complex(b)) => a == b,
            (Complex(c), n) | (n, Complex(c)) => {
                c.imag == 0.0 && n.as_float().is_some_and(|f| f == c.real)
            }
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            (Remote(a), Remote(b)) => a.id == b.id,
            (Builtin(a), Builtin(b)) => a == b,
            (PeerFn(a), PeerFn(b)) => a == b,
            (PeerOp(a), PeerOp(b)) => a == b,
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a.as_float(), b.as_float()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                },
            },
        }
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::Str(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::Str(v)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(v: Vec<HostValue>) -> Self {
        HostValue::List(v)
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Array;

    #[test]
    fn test_repr() {
        let v = HostValue::List(vec![
            HostValue::Int(1),
            HostValue::Float(2.0),
            HostValue::str("it's"),
            HostValue::None,
            HostValue::Bool(true),
        ]);
        assert_eq!(v.repr(), r#"[1, 2.0, "it's", None, True]"#);
        assert_eq!(HostValue::str("a\nb").repr(), r"'a\nb'");
    }

    #[test]
    fn test_dict_repr_sorted_keys() {
        let mut d = BTreeMap::new();
        d.insert("b".to_string(), HostValue::Int(2));
        d.insert("a".to_string(), HostValue::Int(1));
        assert_eq!(HostValue::Dict(d).repr(), "{'a': 1, 'b': 2}");
    }

    #[test]
    fn test_raw_repr_is_wire_json() {
        let v = HostValue::Raw(Value::Array(Array::scalar(5i64)));
        assert_eq!(v.repr(), r#"raw({"r":[],"d":[5],"t":0})"#);
    }

    #[test]
    fn test_numeric_equality_across_types() {
        assert_eq!(HostValue::Int(1), HostValue::Float(1.0));
        assert_eq!(HostValue::Bool(true), HostValue::Int(1));
        assert_ne!(HostValue::Int(1), HostValue::str("1"));
        assert_eq!(
            HostValue::Complex(Complex::new(2.0, 0.0)),
            HostValue::Int(2)
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!HostValue::None.truthy());
        assert!(!HostValue::str("").truthy());
        assert!(HostValue::List(vec![HostValue::None]).truthy());
        assert!(!HostValue::Float(0.0).truthy());
    }

    #[derive(Debug)]
    struct Counter;

    impl HostObject for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }
    }

    #[test]
    fn test_object_identity_equality() {
        let a = HostValue::object(Counter);
        let b = HostValue::object(Counter);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.type_name(), "Counter");
        assert_eq!(a.repr(), "<Counter object>");
    }
}

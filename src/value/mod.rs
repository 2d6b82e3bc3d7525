//! Value model - the recursive data exchanged with the peer.
//!
//! A [`Value`] is one of:
//! - a plain scalar (number, text, boolean, null)
//! - a [`Complex`] number
//! - an [`Array`] with a shape vector and row-major data
//! - a [`Namespace`] of named values
//! - an [`ObjectRef`] pointing at an object in the peer's store
//! - a handle to an object in *our* store (sent back by the peer)
//! - a plain list or record that carries none of the reserved keys
//!
//! [`json`] holds the wire encoding; [`convert`] moves values in and out of
//! the host script.

mod array;
pub mod convert;
pub mod json;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use array::{element_count, Array, TypeHint, MAX_RESHAPE_ELEMENTS};
pub use convert::{from_host_element, from_host_value, text_value, to_host_value};

use crate::error::{BridgeError, Result};

/// Leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// JSON `null`.
    Null,
    /// JSON `true`/`false`.
    Bool(bool),
    /// Integral JSON number.
    Int(i64),
    /// Any other JSON number.
    Float(f64),
    /// A character or string.
    Text(String),
}

/// Complex number, `{"real": .., "imag": ..}` on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub real: f64,
    pub imag: f64,
}

impl Complex {
    /// Complex number from its parts.
    pub fn new(real: f64, imag: f64) -> Self {
        Self { real, imag }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.real == 0.0 && self.real.is_sign_positive() {
            write!(f, "{}j", fmt_float(self.imag))
        } else {
            let sign = if self.imag < 0.0 || (self.imag == 0.0 && self.imag.is_sign_negative()) {
                '-'
            } else {
                '+'
            };
            write!(
                f,
                "({}{}{}j)",
                fmt_float(self.real),
                sign,
                fmt_float(self.imag.abs())
            )
        }
    }
}

/// Format a float the way the host script prints it: integral values keep
/// a trailing `.0`.
pub(crate) fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "nan".into()
    } else if v.is_infinite() {
        if v > 0.0 { "inf".into() } else { "-inf".into() }
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// String-keyed collection of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    entries: BTreeMap<String, Value>,
}

impl Namespace {
    /// Empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Bind `name`, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(name.into(), value.into())
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, Value)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Reference to an object living in the peer's store.
///
/// Decoded references are single use: the first conversion to a host value
/// claims it, later ones fail with [`BridgeError::ReferenceConsumed`]. Clones
/// share the claim.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    id: String,
    class: Option<String>,
    attributes: Vec<String>,
    operations: Vec<String>,
    claimed: Arc<AtomicBool>,
}

impl ObjectRef {
    /// Unclaimed reference to peer object `id`.
    pub fn new(
        id: impl Into<String>,
        class: Option<String>,
        attributes: Vec<String>,
        operations: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            class,
            attributes,
            operations,
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store id on the peer.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Class name, when the peer sent one.
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// Attribute names captured when the object was wrapped.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Operation names captured when the object was wrapped.
    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Mark the reference as used.
    pub fn claim(&self) -> Result<()> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::ReferenceConsumed(self.id.clone()));
        }
        Ok(())
    }

    /// Whether a conversion already used this reference.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.class == other.class
            && self.attributes == other.attributes
            && self.operations == other.operations
    }
}

/// A value of the wire model.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Complex(Complex),
    Array(Array),
    Namespace(Namespace),
    Object(ObjectRef),
    /// Reference into the local object store (`{"rid": ..}`).
    Handle(String),
    /// JSON list without array framing.
    List(Vec<Value>),
    /// JSON object without reserved keys.
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub fn null() -> Self {
        Value::Scalar(Scalar::Null)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::Text(s.into()))
    }

    /// True for values that hold other values or stand for an object.
    pub fn is_container(&self) -> bool {
        !matches!(self, Value::Scalar(_) | Value::Complex(_))
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Text of a character vector or a text scalar (wrapped or not).
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Scalar(Scalar::Text(s)) => Some(s.clone()),
            Value::Array(a) if a.rank() <= 1 => a
                .data()
                .iter()
                .map(|v| v.as_text())
                .collect::<Option<Vec<_>>>()
                .map(|parts| parts.concat()),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Scalar(Scalar::Int(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(Scalar::Float(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Scalar(Scalar::Bool(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::text(v)
    }
}

impl From<Complex> for Value {
    fn from(v: Complex) -> Self {
        Value::Complex(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<Namespace> for Value {
    fn from(v: Namespace) -> Self {
        Value::Namespace(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_is_single_use() {
        let r = ObjectRef::new("7", None, vec![], vec![]);
        let shared = r.clone();
        r.claim().unwrap();
        assert!(shared.is_claimed());
        assert!(matches!(
            shared.claim(),
            Err(BridgeError::ReferenceConsumed(id)) if id == "7"
        ));
    }

    #[test]
    fn test_container_classification() {
        assert!(!Value::from(1i64).is_container());
        assert!(!Value::from(Complex::new(1.0, 2.0)).is_container());
        assert!(Value::Array(Array::vector(vec![])).is_container());
        assert!(Value::Handle("1".into()).is_container());
        assert!(Value::Namespace(Namespace::new()).is_container());
    }

    #[test]
    fn test_to_text() {
        assert_eq!(
            Value::Array(Array::from_text("abc")).to_text().as_deref(),
            Some("abc")
        );
        assert_eq!(Value::text("x").to_text().as_deref(), Some("x"));
        assert!(Value::from(3i64).to_text().is_none());
    }

    #[test]
    fn test_complex_display() {
        assert_eq!(Complex::new(0.0, 2.0).to_string(), "2.0j");
        assert_eq!(Complex::new(1.0, -2.5).to_string(), "(1.0-2.5j)");
    }

    #[test]
    fn test_fmt_float() {
        assert_eq!(fmt_float(3.0), "3.0");
        assert_eq!(fmt_float(0.5), "0.5");
        assert_eq!(fmt_float(f64::INFINITY), "inf");
    }
}

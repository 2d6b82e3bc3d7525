//! Conversion between wire values and host script values.
//!
//! Outbound (`from_host_value`): the top-level value is *enclosed*, so a
//! plain number becomes a scalar array, while values nested inside lists
//! stay plain scalars. Inbound (`to_host_value`) unwraps scalars, turns
//! character vectors into strings and splits higher-rank arrays along
//! their leading axis.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Array, ObjectRef, Scalar, TypeHint, Value};
use crate::error::{BridgeError, Result};
use crate::script::{HostValue, RemoteObject};
use crate::store::ObjectStore;

/// Convert a host value for sending, enclosing a top-level scalar.
///
/// Without a store, host objects that are not sequences cannot be sent and
/// yield [`BridgeError::TypeMismatch`].
pub fn from_host_value(value: &HostValue, store: Option<&mut ObjectStore>) -> Result<Value> {
    convert(value, true, store)
}

/// Convert a host value that will sit inside an array (no enclosing).
pub fn from_host_element(value: &HostValue, store: Option<&mut ObjectStore>) -> Result<Value> {
    convert(value, false, store)
}

/// Wire value for a piece of text: single characters are scalars.
pub fn text_value(text: &str, enclose: bool) -> Value {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => {
            let scalar = Value::Scalar(Scalar::Text(c.to_string()));
            if enclose {
                Value::Array(Array::scalar(scalar))
            } else {
                scalar
            }
        }
        _ => Value::Array(Array::from_text(text)),
    }
}

fn enclosed(value: Value, enclose: bool) -> Value {
    if enclose {
        Value::Array(Array::scalar(value))
    } else {
        value
    }
}

fn convert(value: &HostValue, enclose: bool, mut store: Option<&mut ObjectStore>) -> Result<Value> {
    Ok(match value {
        HostValue::None => Value::Array(Array::vector(Vec::new())),
        HostValue::Bool(b) => enclosed(Value::from(i64::from(*b)), enclose),
        HostValue::Int(i) => enclosed(Value::from(*i), enclose),
        HostValue::Float(f) => enclosed(Value::from(*f), enclose),
        HostValue::Complex(c) => enclosed(Value::Complex(*c), enclose),
        HostValue::Str(s) => text_value(s, enclose),
        HostValue::List(items) => Value::Array(Array::vector(
            items
                .iter()
                .map(|item| convert(item, false, store.as_deref_mut()))
                .collect::<Result<Vec<_>>>()?,
        )),
        HostValue::Dict(entries) => Value::Namespace(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), convert(v, true, store.as_deref_mut())?)))
                .collect::<Result<_>>()?,
        ),
        HostValue::Raw(v) => v.clone(),
        HostValue::Remote(remote) => Value::Handle(remote.id.clone()),
        HostValue::Object(obj) => {
            if let Some(items) = obj.elements() {
                return convert(&HostValue::List(items), false, store);
            }
            if let Some(len) = obj.len() {
                let items = (0..len)
                    .map(|i| obj.item(i).unwrap_or(HostValue::None))
                    .collect();
                return convert(&HostValue::List(items), false, store);
            }
            let Some(store) = store else {
                return Err(BridgeError::TypeMismatch(format!(
                    "type not supported: {}",
                    obj.type_name()
                )));
            };
            let id = store.store(Arc::clone(obj));
            Value::Object(ObjectRef::new(
                id,
                Some(obj.type_name().to_string()),
                obj.attributes(),
                obj.operations(),
            ))
        }
        other => {
            return Err(BridgeError::TypeMismatch(format!(
                "type not supported: {}",
                other.type_name()
            )))
        }
    })
}

/// Convert a received value into a host value.
///
/// Handles are resolved against `store`; object references become remote
/// proxies and can be converted only once.
pub fn to_host_value(value: &Value, store: &ObjectStore) -> Result<HostValue> {
    Ok(match value {
        Value::Scalar(s) => match s {
            Scalar::Null => HostValue::None,
            Scalar::Bool(b) => HostValue::Bool(*b),
            Scalar::Int(i) => HostValue::Int(*i),
            Scalar::Float(f) => HostValue::Float(*f),
            Scalar::Text(t) => HostValue::Str(t.clone()),
        },
        Value::Complex(c) => HostValue::Complex(*c),
        Value::Array(a) => array_to_host(a, store)?,
        Value::Namespace(ns) => HostValue::Dict(
            ns.iter()
                .map(|(k, v)| Ok((k.clone(), to_host_value(v, store)?)))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
        Value::Object(r) => {
            r.claim()?;
            HostValue::Remote(Arc::new(RemoteObject {
                id: r.id().to_string(),
                class: r.class().map(str::to_string),
                attributes: r.attributes().to_vec(),
                operations: r.operations().to_vec(),
            }))
        }
        Value::Handle(reference) => HostValue::Object(store.retrieve(reference)?),
        Value::List(items) => HostValue::List(
            items
                .iter()
                .map(|v| to_host_value(v, store))
                .collect::<Result<_>>()?,
        ),
        Value::Record(entries) => HostValue::Dict(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), to_host_value(v, store)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

fn array_to_host(array: &Array, store: &ObjectStore) -> Result<HostValue> {
    match array.rank() {
        0 => to_host_value(&array.data()[0], store),
        1 => {
            if array.hint() == TypeHint::Character && array.is_simple() {
                if let Some(parts) = array
                    .data()
                    .iter()
                    .map(Value::as_text)
                    .collect::<Option<Vec<_>>>()
                {
                    return Ok(HostValue::Str(parts.concat()));
                }
            }
            Ok(HostValue::List(
                array
                    .data()
                    .iter()
                    .map(|v| to_host_value(v, store))
                    .collect::<Result<_>>()?,
            ))
        }
        _ => Ok(HostValue::List(
            array
                .split_leading()?
                .into_iter()
                .map(|sub| array_to_host(&sub, store))
                .collect::<Result<_>>()?,
        )),
    }
}

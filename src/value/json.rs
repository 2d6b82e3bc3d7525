//! JSON wire encoding of [`Value`].
//!
//! ```text
//! {"r": shape, "d": data, "t": hint}      Array (t optional, 0 numeric)
//! {"ns": {..}}                            Namespace
//! {"id": .., "cls": .., "va": [..], "fn": [..]}   ObjectRef
//! {"rid": ..}                             Handle into the receiver's store
//! {"real": .., "imag": ..}                Complex
//! ```
//!
//! Reserved keys are checked in that order; any other object is a plain
//! record and any JSON list a plain list.
//!
//! # Example
//!
//! ```
//! use arraybridge::value::{json, Array, Value};
//!
//! let value = json::decode(br#"{"r":[2],"d":[1,2]}"#).unwrap();
//! assert_eq!(value, Value::Array(Array::vector(vec![1i64.into(), 2i64.into()])));
//! assert_eq!(json::encode(&value).unwrap(), br#"{"r":[2],"d":[1,2],"t":0}"#);
//! ```

use std::collections::BTreeMap;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Number};

use super::{Array, Complex, Namespace, ObjectRef, Scalar, TypeHint, Value};
use crate::error::{BridgeError, Result};

/// Encode a value as JSON bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode JSON bytes into a value.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let raw: serde_json::Value = serde_json::from_slice(bytes)?;
    from_json(raw)
}

/// Interpret parsed JSON according to the reserved keys.
pub fn from_json(json: serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;

    Ok(match json {
        Json::Null => Value::Scalar(Scalar::Null),
        Json::Bool(b) => Value::Scalar(Scalar::Bool(b)),
        Json::Number(n) => Value::Scalar(number(&n)),
        Json::String(s) => Value::Scalar(Scalar::Text(s)),
        Json::Array(items) => Value::List(
            items
                .into_iter()
                .map(from_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Json::Object(map) => from_object(map)?,
    })
}

fn number(n: &Number) -> Scalar {
    match n.as_i64() {
        Some(i) => Scalar::Int(i),
        None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn from_object(mut map: Map<String, serde_json::Value>) -> Result<Value> {
    if map.contains_key("r") && map.contains_key("d") {
        return decode_array(map).map(Value::Array);
    }

    if let Some(ns) = map.remove("ns") {
        let serde_json::Value::Object(entries) = ns else {
            return Err(BridgeError::TypeMismatch("namespace body must be an object".into()));
        };
        return entries
            .into_iter()
            .map(|(k, v)| Ok((k, from_json(v)?)))
            .collect::<Result<Namespace>>()
            .map(Value::Namespace);
    }

    if let Some(id) = map.remove("id") {
        let class = match map.remove("cls") {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        };
        return Ok(Value::Object(ObjectRef::new(
            key_text(id, "id")?,
            class,
            names(map.remove("va"))?,
            names(map.remove("fn"))?,
        )));
    }

    if let Some(rid) = map.remove("rid") {
        return Ok(Value::Handle(key_text(rid, "rid")?));
    }

    if let Some(imag) = map.remove("imag") {
        let real = match map.remove("real") {
            Some(r) => float(&r, "real")?,
            None => 0.0,
        };
        return Ok(Value::Complex(Complex::new(real, float(&imag, "imag")?)));
    }

    Ok(Value::Record(
        map.into_iter()
            .map(|(k, v)| Ok((k, from_json(v)?)))
            .collect::<Result<BTreeMap<_, _>>>()?,
    ))
}

fn decode_array(mut map: Map<String, serde_json::Value>) -> Result<Array> {
    let shape = match map.remove("r") {
        Some(serde_json::Value::Array(dims)) => dims
            .iter()
            .map(|d| {
                d.as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| BridgeError::TypeMismatch(format!("invalid axis length {}", d)))
            })
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(BridgeError::TypeMismatch("array shape must be a list".into())),
    };

    let data = match map.remove("d") {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(from_json)
            .collect::<Result<Vec<_>>>()?,
        Some(single) => vec![from_json(single)?],
        None => Vec::new(),
    };

    let hint = map
        .get("t")
        .and_then(|t| t.as_u64())
        .map(|t| TypeHint::from_u8(u8::try_from(t).unwrap_or(0)))
        .unwrap_or_default();

    Array::reshape(shape, data, hint)
}

fn key_text(value: serde_json::Value, key: &str) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(BridgeError::TypeMismatch(format!(
            "\"{}\" must be a string or number, got {}",
            key, other
        ))),
    }
}

fn names(value: Option<serde_json::Value>) -> Result<Vec<String>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(s),
                other => Err(BridgeError::TypeMismatch(format!(
                    "member name must be a string, got {}",
                    other
                ))),
            })
            .collect(),
        Some(other) => Err(BridgeError::TypeMismatch(format!(
            "member list must be a list, got {}",
            other
        ))),
    }
}

fn float(value: &serde_json::Value, key: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| BridgeError::TypeMismatch(format!("\"{}\" must be a number", key)))
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(f) => serializer.serialize_f64(*f),
            Scalar::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl Serialize for Complex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("real", &self.real)?;
        map.serialize_entry("imag", &self.imag)?;
        map.end()
    }
}

impl Serialize for Array {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("r", self.shape())?;
        map.serialize_entry("d", self.data())?;
        map.serialize_entry("t", &self.hint().as_u8())?;
        map.end()
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        struct Entries<'a>(&'a Namespace);

        impl Serialize for Entries<'_> {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_map(self.0.iter())
            }
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("ns", &Entries(self))?;
        map.end()
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", self.id())?;
        if let Some(class) = self.class() {
            map.serialize_entry("cls", class)?;
        }
        map.serialize_entry("va", self.attributes())?;
        map.serialize_entry("fn", self.operations())?;
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(s) => s.serialize(serializer),
            Value::Complex(c) => c.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Namespace(ns) => ns.serialize(serializer),
            Value::Object(r) => r.serialize(serializer),
            Value::Handle(rid) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("rid", rid)?;
                map.end()
            }
            Value::List(items) => serializer.collect_seq(items),
            Value::Record(entries) => serializer.collect_map(entries),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        from_json(raw).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Array {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Array(a) => Ok(a),
            _ => Err(de::Error::custom("expected an array")),
        }
    }
}

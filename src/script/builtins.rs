//! Builtin functions and methods on builtin types.

use std::cmp::Ordering;

use super::host::Host;
use super::ops::{self, type_error};
use super::value::HostValue;
use crate::error::{BridgeError, Result};
use crate::value::{from_host_value, Array, Complex, Value};

pub const BUILTINS: &[&str] = &[
    "len", "sum", "min", "max", "abs", "range", "str", "repr", "int", "float", "bool", "list",
    "sorted", "reversed", "round", "print", "type", "complex", "raw",
];

/// Upper bound on `range` results.
const MAX_RANGE: i64 = 10_000_000;

/// Look a builtin up by name.
pub fn lookup(name: &str) -> Option<HostValue> {
    BUILTINS
        .iter()
        .copied()
        .find(|b| *b == name)
        .map(HostValue::Builtin)
}

fn arity(name: &str, args: &[HostValue], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(type_error(format!(
            "{}() takes {} argument(s) ({} given)",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn value_error(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Runtime(format!("ValueError: {}", message))
}

/// Call builtin `name`.
pub fn call(host: &mut dyn Host, name: &str, args: Vec<HostValue>) -> Result<HostValue> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            length(&args[0]).map(|n| HostValue::Int(n as i64))
        }
        "sum" => {
            arity(name, &args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(HostValue::Int(0));
            for item in ops::iterate(&args[0])? {
                total = ops::binary(super::parser::BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "min" | "max" => {
            let items = if args.len() == 1 {
                ops::iterate(&args[0])?
            } else {
                args
            };
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = items.into_iter();
            let mut best = iter
                .next()
                .ok_or_else(|| value_error(format!("{}() arg is an empty sequence", name)))?;
            for item in iter {
                if ops::order(&item, &best, "<")? == wanted {
                    best = item;
                }
            }
            Ok(best)
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                HostValue::Float(f) => Ok(HostValue::Float(f.abs())),
                HostValue::Complex(c) => Ok(HostValue::Float(c.real.hypot(c.imag))),
                v => v
                    .as_int()
                    .ok_or_else(|| type_error(format!("bad operand type for abs(): '{}'", v.type_name())))?
                    .checked_abs()
                    .map(HostValue::Int)
                    .ok_or_else(|| BridgeError::Runtime("OverflowError: integer overflow".into())),
            }
        }
        "range" => {
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| {
                    a.as_int().ok_or_else(|| {
                        type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            a.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked"),
            };
            range(start, stop, step)
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(HostValue::Str(
                args.first().map(HostValue::to_display).unwrap_or_default(),
            ))
        }
        "repr" => {
            arity(name, &args, 1, 1)?;
            Ok(HostValue::Str(args[0].repr()))
        }
        "int" => {
            arity(name, &args, 0, 1)?;
            to_int(args.first().unwrap_or(&HostValue::Int(0)))
        }
        "float" => {
            arity(name, &args, 0, 1)?;
            to_float(args.first().unwrap_or(&HostValue::Float(0.0)))
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(HostValue::Bool(args.first().is_some_and(HostValue::truthy)))
        }
        "list" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(v) => ops::iterate(v).map(HostValue::List),
                None => Ok(HostValue::List(Vec::new())),
            }
        }
        "sorted" => {
            arity(name, &args, 1, 1)?;
            let mut items = ops::iterate(&args[0])?;
            sort(&mut items)?;
            Ok(HostValue::List(items))
        }
        "reversed" => {
            arity(name, &args, 1, 1)?;
            let mut items = ops::iterate(&args[0])?;
            items.reverse();
            Ok(HostValue::List(items))
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            round(&args[0], args.get(1))
        }
        "print" => {
            let parts: Vec<String> = args.iter().map(HostValue::to_display).collect();
            host.print(&parts.join(" "));
            Ok(HostValue::None)
        }
        "type" => {
            arity(name, &args, 1, 1)?;
            Ok(HostValue::Str(format!("<class '{}'>", args[0].type_name())))
        }
        "complex" => {
            arity(name, &args, 0, 2)?;
            let part = |v: Option<&HostValue>| -> Result<f64> {
                match v {
                    None => Ok(0.0),
                    Some(v) => v.as_float().ok_or_else(|| {
                        type_error(format!(
                            "complex() argument must be a number, not '{}'",
                            v.type_name()
                        ))
                    }),
                }
            };
            Ok(HostValue::Complex(Complex::new(
                part(args.first())?,
                part(args.get(1))?,
            )))
        }
        "raw" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                HostValue::Raw(_) => Ok(args[0].clone()),
                other => from_host_value(other, Some(host.store())).map(HostValue::Raw),
            }
        }
        other => Err(BridgeError::Runtime(format!(
            "NameError: name '{}' is not defined",
            other
        ))),
    }
}

pub fn length(value: &HostValue) -> Result<usize> {
    match value {
        HostValue::Str(s) => Ok(s.chars().count()),
        HostValue::List(items) => Ok(items.len()),
        HostValue::Dict(entries) => Ok(entries.len()),
        HostValue::Raw(Value::Array(a)) => Ok(a.shape().first().copied().unwrap_or(1)),
        HostValue::Raw(Value::List(items)) => Ok(items.len()),
        HostValue::Raw(Value::Namespace(ns)) => Ok(ns.len()),
        HostValue::Object(obj) => obj
            .len()
            .or_else(|| obj.elements().map(|e| e.len()))
            .ok_or_else(|| type_error(format!("object of type '{}' has no len()", obj.type_name()))),
        other => Err(type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

fn range(start: i64, stop: i64, step: i64) -> Result<HostValue> {
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        (span - 1) / step.saturating_abs() + 1
    };
    if count > MAX_RANGE {
        return Err(BridgeError::Runtime("MemoryError: range too large".into()));
    }
    Ok(HostValue::List(
        (0..count).map(|i| HostValue::Int(start + i * step)).collect(),
    ))
}

fn to_int(value: &HostValue) -> Result<HostValue> {
    match value {
        HostValue::Float(f) => {
            if !f.is_finite() {
                return Err(value_error(format!("cannot convert float {} to integer", f)));
            }
            let truncated = f.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(BridgeError::Runtime("OverflowError: integer overflow".into()));
            }
            Ok(HostValue::Int(truncated as i64))
        }
        HostValue::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(HostValue::Int)
            .map_err(|_| value_error(format!("invalid literal for int() with base 10: {}", value.repr()))),
        v => v.as_int().map(HostValue::Int).ok_or_else(|| {
            type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                v.type_name()
            ))
        }),
    }
}

fn to_float(value: &HostValue) -> Result<HostValue> {
    match value {
        HostValue::Str(s) => {
            let text = s.trim().to_ascii_lowercase();
            let parsed = match text.as_str() {
                "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                t => t.parse::<f64>(),
            };
            parsed
                .map(HostValue::Float)
                .map_err(|_| value_error(format!("could not convert string to float: {}", value.repr())))
        }
        v => v.as_float().map(HostValue::Float).ok_or_else(|| {
            type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                v.type_name()
            ))
        }),
    }
}

fn round(value: &HostValue, digits: Option<&HostValue>) -> Result<HostValue> {
    let digits = match digits {
        None | Some(HostValue::None) => None,
        Some(d) => Some(d.as_int().ok_or_else(|| {
            type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                d.type_name()
            ))
        })?),
    };
    match (value, digits) {
        (HostValue::Float(f), None) => to_int(&HostValue::Float(f.round_ties_even())),
        (HostValue::Float(f), Some(n)) => {
            let scale = 10f64.powi(i32::try_from(n).unwrap_or(if n > 0 { i32::MAX } else { i32::MIN }));
            if !scale.is_finite() || scale == 0.0 {
                return Ok(HostValue::Float(*f));
            }
            Ok(HostValue::Float((f * scale).round_ties_even() / scale))
        }
        (v, _) if v.as_int().is_some() => Ok(HostValue::Int(v.as_int().unwrap_or(0))),
        (v, _) => Err(type_error(format!(
            "type {} doesn't define __round__ method",
            v.type_name()
        ))),
    }
}

/// Stable sort with the script's ordering; incomparable items are an error.
pub fn sort(items: &mut [HostValue]) -> Result<()> {
    let mut failure = None;
    items.sort_by(|a, b| match ops::order(a, b, "<") {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Methods of strings, lists, dicts and raw values.
pub fn call_method(receiver: &HostValue, method: &str, args: Vec<HostValue>) -> Result<HostValue> {
    match receiver {
        HostValue::Str(s) => string_method(s, method, args),
        HostValue::List(items) => match method {
            "index" => {
                arity(method, &args, 1, 1)?;
                items
                    .iter()
                    .position(|v| *v == args[0])
                    .map(|i| HostValue::Int(i as i64))
                    .ok_or_else(|| value_error(format!("{} is not in list", args[0].repr())))
            }
            "count" => {
                arity(method, &args, 1, 1)?;
                Ok(HostValue::Int(
                    items.iter().filter(|v| **v == args[0]).count() as i64,
                ))
            }
            "copy" => Ok(receiver.clone()),
            _ => Err(no_attribute(receiver, method)),
        },
        HostValue::Dict(entries) => match method {
            "keys" => Ok(HostValue::List(
                entries.keys().map(|k| HostValue::Str(k.clone())).collect(),
            )),
            "values" => Ok(HostValue::List(entries.values().cloned().collect())),
            "items" => Ok(HostValue::List(
                entries
                    .iter()
                    .map(|(k, v)| HostValue::List(vec![HostValue::Str(k.clone()), v.clone()]))
                    .collect(),
            )),
            "get" => {
                arity(method, &args, 1, 2)?;
                Ok(args[0]
                    .as_str()
                    .and_then(|k| entries.get(k))
                    .cloned()
                    .or_else(|| args.get(1).cloned())
                    .unwrap_or(HostValue::None))
            }
            "copy" => Ok(receiver.clone()),
            _ => Err(no_attribute(receiver, method)),
        },
        HostValue::Raw(Value::Array(a)) => match method {
            "copy" => Ok(HostValue::Raw(Value::Array(a.copy()))),
            _ => Err(no_attribute(receiver, method)),
        },
        _ => Err(no_attribute(receiver, method)),
    }
}

/// Attributes of raw arrays: `shape`, `rank`, `hint`.
pub fn raw_attribute(array: &Array, name: &str) -> Option<HostValue> {
    match name {
        "shape" => Some(HostValue::List(
            array
                .shape()
                .iter()
                .map(|&n| HostValue::Int(n as i64))
                .collect(),
        )),
        "rank" => Some(HostValue::Int(array.rank() as i64)),
        "hint" => Some(HostValue::Int(i64::from(array.hint().as_u8()))),
        _ => None,
    }
}

pub fn no_attribute(receiver: &HostValue, name: &str) -> BridgeError {
    BridgeError::Runtime(format!(
        "AttributeError: '{}' object has no attribute '{}'",
        receiver.type_name(),
        name
    ))
}

fn string_arg<'a>(method: &str, value: &'a HostValue) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        type_error(format!(
            "{}() argument must be str, not {}",
            method,
            value.type_name()
        ))
    })
}

fn string_method(s: &str, method: &str, args: Vec<HostValue>) -> Result<HostValue> {
    let text = |t: String| Ok(HostValue::Str(t));
    match method {
        "upper" => text(s.to_uppercase()),
        "lower" => text(s.to_lowercase()),
        "strip" => match args.first() {
            None | Some(HostValue::None) => text(s.trim().to_string()),
            Some(chars) => {
                let chars: Vec<char> = string_arg(method, chars)?.chars().collect();
                text(s.trim_matches(|c: char| chars.contains(&c)).to_string())
            }
        },
        "split" => {
            arity(method, &args, 0, 1)?;
            let parts: Vec<HostValue> = match args.first() {
                None | Some(HostValue::None) => s.split_whitespace().map(HostValue::from).collect(),
                Some(sep) => {
                    let sep = string_arg(method, sep)?;
                    if sep.is_empty() {
                        return Err(value_error("empty separator"));
                    }
                    s.split(sep).map(HostValue::from).collect()
                }
            };
            Ok(HostValue::List(parts))
        }
        "join" => {
            arity(method, &args, 1, 1)?;
            let parts = ops::iterate(&args[0])?
                .iter()
                .map(|p| string_arg(method, p).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;
            text(parts.join(s))
        }
        "replace" => {
            arity(method, &args, 2, 2)?;
            text(s.replace(string_arg(method, &args[0])?, string_arg(method, &args[1])?))
        }
        "startswith" => {
            arity(method, &args, 1, 1)?;
            Ok(HostValue::Bool(s.starts_with(string_arg(method, &args[0])?)))
        }
        "endswith" => {
            arity(method, &args, 1, 1)?;
            Ok(HostValue::Bool(s.ends_with(string_arg(method, &args[0])?)))
        }
        _ => Err(no_attribute(&HostValue::Str(s.to_string()), method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Detached;

    fn run(name: &str, args: Vec<HostValue>) -> Result<HostValue> {
        call(&mut Detached::new(), name, args)
    }

    fn ints(values: &[i64]) -> HostValue {
        HostValue::List(values.iter().map(|&v| HostValue::Int(v)).collect())
    }

    #[test]
    fn test_range() {
        assert_eq!(run("range", vec![HostValue::Int(3)]).unwrap(), ints(&[0, 1, 2]));
        assert_eq!(
            run("range", vec![HostValue::Int(5), HostValue::Int(0), HostValue::Int(-2)]).unwrap(),
            ints(&[5, 3, 1])
        );
        assert_eq!(run("range", vec![HostValue::Int(2), HostValue::Int(2)]).unwrap(), ints(&[]));
        assert!(run("range", vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(0)]).is_err());
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(run("sum", vec![ints(&[1, 2, 3])]).unwrap(), HostValue::Int(6));
        assert_eq!(run("max", vec![ints(&[1, 7, 3])]).unwrap(), HostValue::Int(7));
        assert_eq!(
            run("min", vec![HostValue::Int(4), HostValue::Int(2), HostValue::Int(9)]).unwrap(),
            HostValue::Int(2)
        );
        assert!(run("max", vec![ints(&[])]).is_err());
        assert_eq!(run("len", vec!["héllo".into()]).unwrap(), HostValue::Int(5));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(run("int", vec![HostValue::Float(-2.7)]).unwrap(), HostValue::Int(-2));
        assert_eq!(run("int", vec![" 42 ".into()]).unwrap(), HostValue::Int(42));
        assert!(run("int", vec!["x".into()]).is_err());
        assert_eq!(run("float", vec!["1.5".into()]).unwrap(), HostValue::Float(1.5));
        assert_eq!(run("str", vec![HostValue::Float(2.0)]).unwrap(), HostValue::str("2.0"));
        assert_eq!(run("repr", vec!["a".into()]).unwrap(), HostValue::str("'a'"));
        assert_eq!(run("bool", vec![ints(&[])]).unwrap(), HostValue::Bool(false));
    }

    #[test]
    fn test_round_half_to_even() {
        assert_eq!(run("round", vec![HostValue::Float(2.5)]).unwrap(), HostValue::Int(2));
        assert_eq!(run("round", vec![HostValue::Float(3.5)]).unwrap(), HostValue::Int(4));
        assert_eq!(
            run("round", vec![HostValue::Float(1.2345), HostValue::Int(2)]).unwrap(),
            HostValue::Float(1.23)
        );
    }

    #[test]
    fn test_sorted_and_reversed() {
        assert_eq!(run("sorted", vec![ints(&[3, 1, 2])]).unwrap(), ints(&[1, 2, 3]));
        assert_eq!(run("reversed", vec![ints(&[1, 2])]).unwrap(), ints(&[2, 1]));
        assert!(run("sorted", vec![HostValue::List(vec![HostValue::Int(1), "a".into()])]).is_err());
    }

    #[test]
    fn test_print_goes_to_host() {
        let mut host = Detached::new();
        call(&mut host, "print", vec!["x".into(), HostValue::Int(1)]).unwrap();
        assert_eq!(host.output, vec!["x 1".to_string()]);
    }

    #[test]
    fn test_raw_wraps_values() {
        let v = run("raw", vec![ints(&[1, 2])]).unwrap();
        let HostValue::Raw(Value::Array(a)) = v else {
            panic!("expected raw array");
        };
        assert_eq!(a.shape(), &[2]);
        assert_eq!(raw_attribute(&a, "rank"), Some(HostValue::Int(1)));
    }

    #[test]
    fn test_string_methods() {
        let s = HostValue::str(" a,b ");
        assert_eq!(call_method(&s, "strip", vec![]).unwrap(), HostValue::str("a,b"));
        assert_eq!(
            call_method(&HostValue::str("a,b"), "split", vec![",".into()]).unwrap(),
            HostValue::List(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            call_method(&HostValue::str("-"), "join", vec![HostValue::List(vec!["x".into(), "y".into()])])
                .unwrap(),
            HostValue::str("x-y")
        );
        assert_eq!(
            call_method(&HostValue::str("abc"), "upper", vec![]).unwrap(),
            HostValue::str("ABC")
        );
        assert!(call_method(&HostValue::str("abc"), "nope", vec![]).is_err());
    }

    #[test]
    fn test_dict_methods() {
        let mut d = std::collections::BTreeMap::new();
        d.insert("k".to_string(), HostValue::Int(1));
        let d = HostValue::Dict(d);
        assert_eq!(
            call_method(&d, "get", vec!["k".into()]).unwrap(),
            HostValue::Int(1)
        );
        assert_eq!(
            call_method(&d, "get", vec!["z".into(), HostValue::Int(0)]).unwrap(),
            HostValue::Int(0)
        );
        assert_eq!(call_method(&d, "keys", vec![]).unwrap(), HostValue::List(vec!["k".into()]));
    }
}

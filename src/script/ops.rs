//! Operators of the host script: arithmetic, comparison, membership,
//! indexing and iteration.
//!
//! Integers are 64-bit and checked; overflow is an error rather than a
//! silent wrap. `/` always produces a float, `//` and `%` round towards
//! negative infinity.

use std::cmp::Ordering;

use super::parser::{BinOp, CmpOp, UnaryOp};
use super::value::HostValue;
use crate::error::{BridgeError, Result};
use crate::value::{Complex, Value};

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

pub(crate) fn type_error(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Runtime(format!("TypeError: {}", message))
}

fn overflow() -> BridgeError {
    BridgeError::Runtime("OverflowError: integer overflow".into())
}

fn zero_division(what: &str) -> BridgeError {
    BridgeError::Runtime(format!("ZeroDivisionError: {}", what))
}

/// Apply a binary operator.
pub fn binary(op: BinOp, left: &HostValue, right: &HostValue) -> Result<HostValue> {
    match (op, left, right) {
        (BinOp::Add, HostValue::Str(a), HostValue::Str(b)) => Ok(HostValue::Str(format!("{}{}", a, b))),
        (BinOp::Add, HostValue::List(a), HostValue::List(b)) => {
            Ok(HostValue::List(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Mul, HostValue::Str(s), n) | (BinOp::Mul, n, HostValue::Str(s))
            if n.as_int().is_some() =>
        {
            let count = repeat_count(n)?;
            Ok(HostValue::Str(s.repeat(count)))
        }
        (BinOp::Mul, HostValue::List(items), n) | (BinOp::Mul, n, HostValue::List(items))
            if n.as_int().is_some() =>
        {
            let count = repeat_count(n)?;
            let mut out = Vec::with_capacity(items.len().saturating_mul(count));
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(HostValue::List(out))
        }
        _ => numeric(op, left, right),
    }
}

fn repeat_count(n: &HostValue) -> Result<usize> {
    let n = n.as_int().unwrap_or(0);
    if n > 100_000_000 {
        return Err(BridgeError::Runtime("MemoryError: repetition too large".into()));
    }
    Ok(usize::try_from(n).unwrap_or(0))
}

fn numeric(op: BinOp, left: &HostValue, right: &HostValue) -> Result<HostValue> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_op(op, a, b);
    }
    if let (Some(a), Some(b)) = (as_complex(left), as_complex(right)) {
        if matches!(left, HostValue::Complex(_)) || matches!(right, HostValue::Complex(_)) {
            return complex_op(op, a, b).map(HostValue::Complex);
        }
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return float_op(op, a, b).map(HostValue::Float);
    }
    Err(type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol(op),
        left.type_name(),
        right.type_name()
    )))
}

fn as_complex(v: &HostValue) -> Option<Complex> {
    match v {
        HostValue::Complex(c) => Some(*c),
        other => other.as_float().map(|f| Complex::new(f, 0.0)),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<HostValue> {
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(HostValue::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let r = a.checked_rem(b).unwrap_or(0);
            if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(zero_division("0 cannot be raised to a negative power"));
                }
                return Ok(HostValue::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(HostValue::Int(value))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<f64> {
    Ok(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            a.powf(b)
        }
    })
}

fn complex_op(op: BinOp, a: Complex, b: Complex) -> Result<Complex> {
    Ok(match op {
        BinOp::Add => Complex::new(a.real + b.real, a.imag + b.imag),
        BinOp::Sub => Complex::new(a.real - b.real, a.imag - b.imag),
        BinOp::Mul => Complex::new(
            a.real * b.real - a.imag * b.imag,
            a.real * b.imag + a.imag * b.real,
        ),
        BinOp::Div => {
            let denom = b.real * b.real + b.imag * b.imag;
            if denom == 0.0 {
                return Err(zero_division("complex division by zero"));
            }
            Complex::new(
                (a.real * b.real + a.imag * b.imag) / denom,
                (a.imag * b.real - a.real * b.imag) / denom,
            )
        }
        BinOp::Pow => {
            if a.real == 0.0 && a.imag == 0.0 {
                if b.real == 0.0 && b.imag == 0.0 {
                    return Ok(Complex::new(1.0, 0.0));
                }
                if b.imag != 0.0 || b.real < 0.0 {
                    return Err(zero_division("0.0 to a negative or complex power"));
                }
                return Ok(Complex::new(0.0, 0.0));
            }
            let modulus = a.real.hypot(a.imag);
            let ln = Complex::new(modulus.ln(), a.imag.atan2(a.real));
            let w = Complex::new(
                b.real * ln.real - b.imag * ln.imag,
                b.real * ln.imag + b.imag * ln.real,
            );
            let scale = w.real.exp();
            Complex::new(scale * w.imag.cos(), scale * w.imag.sin())
        }
        BinOp::FloorDiv | BinOp::Mod => {
            return Err(type_error(format!(
                "unsupported operand type(s) for {}: 'complex' and 'complex'",
                symbol(op)
            )))
        }
    })
}

/// Apply a unary operator.
pub fn unary(op: UnaryOp, operand: &HostValue) -> Result<HostValue> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(HostValue::Bool(!v.truthy())),
        (UnaryOp::Neg, HostValue::Float(f)) => Ok(HostValue::Float(-f)),
        (UnaryOp::Neg, HostValue::Complex(c)) => Ok(HostValue::Complex(Complex::new(-c.real, -c.imag))),
        (UnaryOp::Neg, v) if v.as_int().is_some() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(HostValue::Int)
            .ok_or_else(overflow),
        (UnaryOp::Pos, HostValue::Float(_) | HostValue::Complex(_)) => Ok(operand.clone()),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(HostValue::Int(v.as_int().unwrap_or(0))),
        (op, v) => Err(type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

/// Evaluate one comparison.
pub fn compare(op: CmpOp, left: &HostValue, right: &HostValue) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt => order(left, right, "<")? == Ordering::Less,
        CmpOp::Le => order(left, right, "<=")? != Ordering::Greater,
        CmpOp::Gt => order(left, right, ">")? == Ordering::Greater,
        CmpOp::Ge => order(left, right, ">=")? != Ordering::Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
    })
}

/// Total order used by comparisons, `sorted`, `min` and `max`.
pub fn order(left: &HostValue, right: &HostValue, op: &str) -> Result<Ordering> {
    match (left, right) {
        (HostValue::Str(a), HostValue::Str(b)) => Ok(a.cmp(b)),
        (HostValue::List(a), HostValue::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if x != y {
                    return order(x, y, op);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        (a, b) => {
            if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
                return Ok(x.cmp(&y));
            }
            match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                _ => Err(type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op,
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    }
}

/// Membership test, `item in container`.
pub fn contains(container: &HostValue, item: &HostValue) -> Result<bool> {
    match container {
        HostValue::Str(s) => match item {
            HostValue::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        HostValue::Dict(entries) => Ok(item.as_str().is_some_and(|k| entries.contains_key(k))),
        other => Ok(iterate(other)?.iter().any(|v| v == item)),
    }
}

/// Elements of an iterable value.
pub fn iterate(value: &HostValue) -> Result<Vec<HostValue>> {
    match value {
        HostValue::Str(s) => Ok(s.chars().map(|c| HostValue::Str(c.to_string())).collect()),
        HostValue::List(items) => Ok(items.clone()),
        HostValue::Dict(entries) => Ok(entries.keys().map(|k| HostValue::Str(k.clone())).collect()),
        HostValue::Raw(Value::Array(a)) if !a.is_scalar() => Ok(a
            .split_leading()?
            .into_iter()
            .map(|sub| HostValue::Raw(Value::Array(sub)))
            .collect()),
        HostValue::Raw(Value::List(items)) => {
            Ok(items.iter().cloned().map(HostValue::Raw).collect())
        }
        HostValue::Object(obj) => {
            if let Some(items) = obj.elements() {
                return Ok(items);
            }
            if let Some(len) = obj.len() {
                return Ok((0..len)
                    .map(|i| obj.item(i).unwrap_or(HostValue::None))
                    .collect());
            }
            Err(type_error(format!("'{}' object is not iterable", obj.type_name())))
        }
        other => Err(type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// Resolve a possibly negative index against `len`.
fn position(index: i64, len: usize, what: &str) -> Result<usize> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + len_i } else { index };
    if resolved < 0 || resolved >= len_i {
        return Err(BridgeError::Index(format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

/// `target[index]`.
pub fn index(target: &HostValue, index: &HostValue) -> Result<HostValue> {
    let int_index = || {
        index.as_int().ok_or_else(|| {
            type_error(format!(
                "{} indices must be integers, not {}",
                target.type_name(),
                index.type_name()
            ))
        })
    };
    match target {
        HostValue::List(items) => Ok(items[position(int_index()?, items.len(), "list")?].clone()),
        HostValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let at = position(int_index()?, chars.len(), "string")?;
            Ok(HostValue::Str(chars[at].to_string()))
        }
        HostValue::Dict(entries) => {
            let key = index.as_str().ok_or_else(|| {
                BridgeError::Runtime(format!("KeyError: {}", index.repr()))
            })?;
            entries
                .get(key)
                .cloned()
                .ok_or_else(|| BridgeError::Runtime(format!("KeyError: {}", index.repr())))
        }
        HostValue::Raw(Value::Array(a)) if !a.is_scalar() => {
            let mut rows = a.split_leading()?;
            let at = position(int_index()?, rows.len(), "array")?;
            Ok(HostValue::Raw(Value::Array(rows.swap_remove(at))))
        }
        HostValue::Object(obj) if obj.len().is_some() => {
            let len = obj.len().unwrap_or(0);
            let at = position(int_index()?, len, obj.type_name())?;
            Ok(obj.item(at).unwrap_or(HostValue::None))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn clamp(bound: Option<i64>, len: usize, default: usize) -> usize {
    let Some(bound) = bound else {
        return default;
    };
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if bound < 0 { bound + len_i } else { bound };
    resolved.clamp(0, len_i) as usize
}

/// `target[start:stop]`.
pub fn slice(target: &HostValue, start: Option<&HostValue>, stop: Option<&HostValue>) -> Result<HostValue> {
    let bound = |v: Option<&HostValue>| -> Result<Option<i64>> {
        match v {
            None | Some(HostValue::None) => Ok(None),
            Some(v) => v
                .as_int()
                .map(Some)
                .ok_or_else(|| type_error("slice indices must be integers or None")),
        }
    };
    let (start, stop) = (bound(start)?, bound(stop)?);

    let range = |len: usize| {
        let from = clamp(start, len, 0);
        let to = clamp(stop, len, len).max(from);
        from..to
    };

    match target {
        HostValue::List(items) => Ok(HostValue::List(items[range(items.len())].to_vec())),
        HostValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(HostValue::Str(chars[range(chars.len())].iter().collect()))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> HostValue {
        HostValue::Int(i)
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(binary(BinOp::FloorDiv, &int(7), &int(2)).unwrap(), int(3));
        assert_eq!(binary(BinOp::FloorDiv, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(binary(BinOp::Mod, &int(-7), &int(2)).unwrap(), int(1));
        assert_eq!(binary(BinOp::Mod, &int(7), &int(-2)).unwrap(), int(-1));
        assert_eq!(
            binary(BinOp::Mod, &HostValue::Float(-7.5), &int(2)).unwrap(),
            HostValue::Float(0.5)
        );
    }

    #[test]
    fn test_true_division_is_float() {
        assert_eq!(
            binary(BinOp::Div, &int(7), &int(2)).unwrap(),
            HostValue::Float(3.5)
        );
        assert!(matches!(
            binary(BinOp::Div, &int(1), &int(0)),
            Err(BridgeError::Runtime(m)) if m.starts_with("ZeroDivisionError")
        ));
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(binary(BinOp::Add, &int(i64::MAX), &int(1)).is_err());
        assert!(binary(BinOp::Pow, &int(10), &int(30)).is_err());
        assert!(unary(UnaryOp::Neg, &int(i64::MIN)).is_err());
        assert!(binary(BinOp::FloorDiv, &int(i64::MIN), &int(-1)).is_err());
    }

    #[test]
    fn test_power() {
        assert_eq!(binary(BinOp::Pow, &int(2), &int(10)).unwrap(), int(1024));
        assert_eq!(
            binary(BinOp::Pow, &int(2), &int(-1)).unwrap(),
            HostValue::Float(0.5)
        );
    }

    #[test]
    fn test_sequence_operators() {
        assert_eq!(
            binary(BinOp::Add, &HostValue::str("ab"), &HostValue::str("c")).unwrap(),
            HostValue::str("abc")
        );
        assert_eq!(
            binary(BinOp::Mul, &int(2), &HostValue::str("ab")).unwrap(),
            HostValue::str("abab")
        );
        assert_eq!(
            binary(BinOp::Mul, &HostValue::List(vec![int(1)]), &int(3)).unwrap(),
            HostValue::List(vec![int(1), int(1), int(1)])
        );
        assert!(binary(BinOp::Add, &HostValue::str("a"), &int(1)).is_err());
    }

    #[test]
    fn test_complex_arithmetic() {
        let i = HostValue::Complex(Complex::new(0.0, 1.0));
        assert_eq!(
            binary(BinOp::Mul, &i, &i).unwrap(),
            HostValue::Complex(Complex::new(-1.0, 0.0))
        );
        assert_eq!(
            binary(BinOp::Add, &int(1), &i).unwrap(),
            HostValue::Complex(Complex::new(1.0, 1.0))
        );
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Lt, &int(1), &HostValue::Float(1.5)).unwrap());
        assert!(compare(CmpOp::Ge, &HostValue::str("b"), &HostValue::str("a")).unwrap());
        assert!(compare(CmpOp::Lt, &HostValue::str("a"), &int(1)).is_err());
        assert!(compare(
            CmpOp::Lt,
            &HostValue::List(vec![int(1), int(2)]),
            &HostValue::List(vec![int(1), int(3)])
        )
        .unwrap());
    }

    #[test]
    fn test_membership() {
        let list = HostValue::List(vec![int(1), HostValue::str("x")]);
        assert!(compare(CmpOp::In, &HostValue::str("x"), &list).unwrap());
        assert!(compare(CmpOp::NotIn, &int(2), &list).unwrap());
        assert!(contains(&HostValue::str("hello"), &HostValue::str("ell")).unwrap());
        assert!(contains(&int(3), &int(3)).is_err());
    }

    #[test]
    fn test_indexing_and_slicing() {
        let list = HostValue::List(vec![int(10), int(20), int(30)]);
        assert_eq!(index(&list, &int(-1)).unwrap(), int(30));
        assert!(matches!(index(&list, &int(3)), Err(BridgeError::Index(_))));
        assert_eq!(
            slice(&list, Some(&int(1)), None).unwrap(),
            HostValue::List(vec![int(20), int(30)])
        );
        assert_eq!(
            slice(&HostValue::str("hello"), None, Some(&int(-2))).unwrap(),
            HostValue::str("hel")
        );
        assert_eq!(
            slice(&list, Some(&int(5)), Some(&int(1))).unwrap(),
            HostValue::List(vec![])
        );
    }
}

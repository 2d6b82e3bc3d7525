//! Placeholder-substitution evaluator.
//!
//! The peer sends code such as `⎕ + ⍞` together with an argument vector.
//! Each placeholder outside a string literal is replaced, left to right,
//! by `args[n]`:
//!
//! - `⎕` binds the argument converted to a host value
//! - `⍞` binds it unconverted, as a raw wire value
//!
//! The number of placeholders must match the argument count before any
//! argument is converted or any code runs.

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::script::{parse_expr, Host, HostValue, Interpreter};
use crate::value::{from_host_value, to_host_value, Array, Value};

/// Placeholder for a converted argument.
pub const CONVERTED: char = '⎕';

/// Placeholder for a raw argument.
pub const RAW: char = '⍞';

/// Name the argument list is bound to while evaluating.
pub const ARGS_NAME: &str = "args";

/// How an argument is handed to the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Converted,
    Raw,
}

/// Code with its placeholders replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Substituted {
    pub code: String,
    pub placeholders: Vec<Placeholder>,
}

/// Replace placeholders outside string literals with `args[n]`.
///
/// Strings delimited by `'`, `"`, `'''` or `"""` are copied verbatim;
/// inside them a backslash escapes the next character.
pub fn substitute(code: &str) -> Substituted {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut placeholders = Vec::new();
    let mut delimiter: Option<&[char]> = None;
    let mut i = 0;

    const TRIPLE_SINGLE: &[char] = &['\'', '\'', '\''];
    const TRIPLE_DOUBLE: &[char] = &['"', '"', '"'];
    const SINGLE: &[char] = &['\''];
    const DOUBLE: &[char] = &['"'];

    while i < chars.len() {
        let c = chars[i];

        if let Some(delim) = delimiter {
            if c == '\\' {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
                continue;
            }
            if chars[i..].starts_with(delim) {
                out.extend(delim);
                i += delim.len();
                delimiter = None;
                continue;
            }
            out.push(c);
            i += 1;
            continue;
        }

        let opening = [TRIPLE_SINGLE, TRIPLE_DOUBLE, SINGLE, DOUBLE]
            .into_iter()
            .find(|d| chars[i..].starts_with(d));
        if let Some(delim) = opening {
            out.extend(delim);
            i += delim.len();
            delimiter = Some(delim);
            continue;
        }

        let kind = match c {
            CONVERTED => Some(Placeholder::Converted),
            RAW => Some(Placeholder::Raw),
            _ => None,
        };
        match kind {
            Some(kind) => {
                out.push_str(&format!("{}[{}]", ARGS_NAME, placeholders.len()));
                placeholders.push(kind);
            }
            None => out.push(c),
        }
        i += 1;
    }

    Substituted {
        code: out,
        placeholders,
    }
}

/// Evaluate `code` with the rank-1 argument vector `args`.
///
/// A result that is already a raw value is returned as-is; anything else is
/// converted with [`from_host_value`] against the host's store.
pub async fn evaluate(host: &mut dyn Host, code: &str, args: &Array) -> Result<Value> {
    if args.rank() != 1 {
        return Err(BridgeError::TypeMismatch(format!(
            "argument list must be a rank-1 array, got rank {}",
            args.rank()
        )));
    }

    let substituted = substitute(code);
    let expected = args.shape()[0];
    if substituted.placeholders.len() != expected {
        return Err(BridgeError::Arity {
            expected,
            found: substituted.placeholders.len(),
        });
    }

    let expr = parse_expr(&substituted.code)?;

    let mut bound = Vec::with_capacity(expected);
    for (kind, arg) in substituted.placeholders.iter().zip(args.data()) {
        bound.push(bind_argument(host, *kind, arg)?);
    }
    debug!(code = %substituted.code, args = bound.len(), "evaluating");

    let result = Interpreter::new(&mut *host)
        .with_local(ARGS_NAME, HostValue::List(bound))
        .eval(&expr)
        .await?;

    match result {
        HostValue::Raw(value) => Ok(value),
        other => from_host_value(&other, Some(host.store())),
    }
}

fn bind_argument(host: &mut dyn Host, kind: Placeholder, arg: &Value) -> Result<HostValue> {
    match kind {
        Placeholder::Raw if arg.is_container() => Ok(HostValue::Raw(arg.clone())),
        _ => to_host_value(arg, host.store()),
    }
}

/// Evaluate an expression and return its printable form.
pub async fn repr(host: &mut dyn Host, code: &str) -> Result<String> {
    let expr = parse_expr(code)?;
    Ok(Interpreter::new(host).eval(&expr).await?.repr())
}

/// Run statements in the host's environment.
pub async fn exec(host: &mut dyn Host, code: &str) -> Result<()> {
    crate::script::exec_source(host, code).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Detached;
    use crate::value::{json, ObjectRef, TypeHint};

    fn ints(values: &[i64]) -> Array {
        Array::vector(values.iter().map(|&v| Value::from(v)).collect())
    }

    #[test]
    fn test_substitute_outside_strings_only() {
        let s = substitute("⎕ + len('⎕') + ⍞");
        assert_eq!(s.code, "args[0] + len('⎕') + args[1]");
        assert_eq!(s.placeholders, vec![Placeholder::Converted, Placeholder::Raw]);
    }

    #[test]
    fn test_substitute_handles_escapes_and_triple_quotes() {
        let s = substitute(r#"'it\'s ⎕' + """a " ⎕ """ + "\"⍞" + ⎕"#);
        assert_eq!(s.placeholders, vec![Placeholder::Converted]);
        assert!(s.code.ends_with("args[0]"));

        let s = substitute("'''⎕'''⎕");
        assert_eq!(s.code, "'''⎕'''args[0]");
    }

    #[tokio::test]
    async fn test_sum_of_two_arguments() {
        let mut host = Detached::new();
        let result = evaluate(&mut host, "⎕+⎕", &ints(&[2, 3])).await.unwrap();
        assert_eq!(json::encode(&result).unwrap(), br#"{"r":[],"d":[5],"t":0}"#);
    }

    #[tokio::test]
    async fn test_arity_mismatch_before_evaluation() {
        let mut host = Detached::new();
        let err = evaluate(&mut host, "⎕ + undefined", &ints(&[1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Arity { expected: 2, found: 1 }));

        // syntax is not even looked at
        let err = evaluate(&mut host, "⎕ +", &ints(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Arity { expected: 0, found: 1 }));
    }

    #[tokio::test]
    async fn test_arity_failure_does_not_consume_references() {
        let mut host = Detached::new();
        let reference = ObjectRef::new("5", None, vec![], vec![]);
        let args = Array::vector(vec![Value::Object(reference.clone())]);
        assert!(evaluate(&mut host, "1", &args).await.is_err());
        assert!(!reference.is_claimed());
    }

    #[tokio::test]
    async fn test_args_must_be_rank_one() {
        let mut host = Detached::new();
        let matrix = Array::new(vec![1, 1], vec![Value::from(1i64)], TypeHint::Numeric).unwrap();
        assert!(matches!(
            evaluate(&mut host, "⎕", &matrix).await,
            Err(BridgeError::TypeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_raw_placeholder_keeps_wire_value() {
        let mut host = Detached::new();
        let args = Array::vector(vec![Value::Array(ints(&[1, 2, 3]))]);

        let shape = evaluate(&mut host, "⍞.shape", &args).await.unwrap();
        assert_eq!(shape, Value::Array(Array::vector(vec![Value::from(3i64)])));

        let total = evaluate(&mut host, "sum(⎕)", &args).await.unwrap();
        assert_eq!(total, Value::Array(Array::scalar(6i64)));

        // a raw result passes through without enclosing
        let same = evaluate(&mut host, "⍞", &args).await.unwrap();
        assert_eq!(same, Value::Array(ints(&[1, 2, 3])));
    }

    #[tokio::test]
    async fn test_string_result() {
        let mut host = Detached::new();
        let args = Array::vector(vec![Value::Array(Array::from_text("abc"))]);
        let result = evaluate(&mut host, "⎕.upper()", &args).await.unwrap();
        assert_eq!(result, Value::Array(Array::from_text("ABC")));
    }

    #[tokio::test]
    async fn test_repr_and_exec() {
        let mut host = Detached::new();
        exec(&mut host, "greeting = 'hi'").await.unwrap();
        assert_eq!(repr(&mut host, "[greeting, 1.0]").await.unwrap(), "['hi', 1.0]");
        assert!(matches!(
            repr(&mut host, "nope(").await,
            Err(BridgeError::Syntax(_))
        ));
    }
}

//! Async tree-walking interpreter.
//!
//! Evaluation is async because scripts can call the peer (`APL.eval(..)`),
//! and the peer may call back into us before it answers. Recursive
//! evaluation goes through [`BoxFuture`] to keep the future type finite.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use super::builtins::{self, no_attribute};
use super::host::Host;
use super::ops::{self, type_error};
use super::parser::{
    nested_too_deeply, parse_expr, parse_program, Expr, Literal, Program, Stmt, MAX_NESTING,
};
use super::value::{HostValue, PeerFunction, PeerOperator};
use crate::error::{BridgeError, Result};
use crate::value::{from_host_element, to_host_value, Complex, Value};

/// Boxed future used for recursive evaluation.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Evaluates syntax trees against a [`Host`].
///
/// Names resolve through the interpreter's locals, then the host's global
/// environment, then the builtins. Assignments always write globals.
pub struct Interpreter<'h> {
    host: &'h mut dyn Host,
    locals: HashMap<String, HostValue>,
    depth: usize,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h mut dyn Host) -> Self {
        Self {
            host,
            locals: HashMap::new(),
            depth: 0,
        }
    }

    /// Bind a local visible only to this interpreter.
    pub fn with_local(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.locals.insert(name.into(), value);
        self
    }

    /// Evaluate one expression.
    pub async fn eval(&mut self, expr: &Expr) -> Result<HostValue> {
        self.eval_expr(expr).await
    }

    /// Run statements; returns the value of the last expression statement.
    pub async fn run(&mut self, program: &Program) -> Result<HostValue> {
        let mut last = HostValue::None;
        for stmt in &program.body {
            self.check_interrupt()?;
            match stmt {
                Stmt::Assign(name, expr) => {
                    let value = self.eval_expr(expr).await?;
                    self.host.env().define(name.clone(), value);
                    last = HostValue::None;
                }
                Stmt::SetAttr(target, name, value) => {
                    let receiver = self.eval_expr(target).await?;
                    let value = self.eval_expr(value).await?;
                    self.set_attr(receiver, name, value).await?;
                    last = HostValue::None;
                }
                Stmt::Expr(expr) => last = self.eval_expr(expr).await?,
            }
        }
        Ok(last)
    }

    fn check_interrupt(&mut self) -> Result<()> {
        if self.host.take_interrupt() {
            return Err(BridgeError::Interrupted);
        }
        Ok(())
    }

    fn lookup(&mut self, name: &str) -> Result<HostValue> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.host.env().get(name) {
            return Ok(value.clone());
        }
        builtins::lookup(name)
            .ok_or_else(|| BridgeError::Runtime(format!("NameError: name '{}' is not defined", name)))
    }

    fn eval_expr<'a>(&'a mut self, expr: &'a Expr) -> BoxFuture<'a, Result<HostValue>> {
        Box::pin(async move {
            // trees built by hand skip the parser's limit
            if self.depth >= MAX_NESTING {
                return Err(nested_too_deeply());
            }
            self.depth += 1;
            let result = self.eval_node(expr).await;
            self.depth -= 1;
            result
        })
    }

    fn eval_node<'a>(&'a mut self, expr: &'a Expr) -> BoxFuture<'a, Result<HostValue>> {
        Box::pin(async move {
            match expr {
                Expr::Literal(lit) => Ok(literal(lit)),
                Expr::Name(name) => self.lookup(name),
                Expr::List(items) => Ok(HostValue::List(self.eval_all(items).await?)),
                Expr::Dict(entries) => {
                    let mut dict = std::collections::BTreeMap::new();
                    for (key, value) in entries {
                        let key = match self.eval_expr(key).await? {
                            HostValue::Str(s) => s,
                            other => {
                                return Err(type_error(format!(
                                    "dict keys must be str, not '{}'",
                                    other.type_name()
                                )))
                            }
                        };
                        let value = self.eval_expr(value).await?;
                        dict.insert(key, value);
                    }
                    Ok(HostValue::Dict(dict))
                }
                Expr::Unary(op, operand) => {
                    let value = self.eval_expr(operand).await?;
                    ops::unary(*op, &value)
                }
                Expr::Binary(op, left, right) => {
                    let left = self.eval_expr(left).await?;
                    let right = self.eval_expr(right).await?;
                    ops::binary(*op, &left, &right)
                }
                Expr::Compare(first, rest) => {
                    let mut left = self.eval_expr(first).await?;
                    for (op, right) in rest {
                        let right = self.eval_expr(right).await?;
                        if !ops::compare(*op, &left, &right)? {
                            return Ok(HostValue::Bool(false));
                        }
                        left = right;
                    }
                    Ok(HostValue::Bool(true))
                }
                Expr::And(left, right) => {
                    let left = self.eval_expr(left).await?;
                    if !left.truthy() {
                        return Ok(left);
                    }
                    self.eval_expr(right).await
                }
                Expr::Or(left, right) => {
                    let left = self.eval_expr(left).await?;
                    if left.truthy() {
                        return Ok(left);
                    }
                    self.eval_expr(right).await
                }
                Expr::IfElse {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.eval_expr(cond).await?.truthy() {
                        self.eval_expr(then).await
                    } else {
                        self.eval_expr(otherwise).await
                    }
                }
                Expr::Call(callee, args) => match callee.as_ref() {
                    Expr::Attr(target, name) => {
                        let receiver = self.eval_expr(target).await?;
                        let args = self.eval_all(args).await?;
                        self.call_method(receiver, name, args).await
                    }
                    callee => {
                        let function = self.eval_expr(callee).await?;
                        let args = self.eval_all(args).await?;
                        self.call_value(function, args).await
                    }
                },
                Expr::Index(target, index) => {
                    let target = self.eval_expr(target).await?;
                    let index = self.eval_expr(index).await?;
                    ops::index(&target, &index)
                }
                Expr::Slice {
                    target,
                    start,
                    stop,
                } => {
                    let target = self.eval_expr(target).await?;
                    let start = match start {
                        Some(e) => Some(self.eval_expr(e).await?),
                        None => None,
                    };
                    let stop = match stop {
                        Some(e) => Some(self.eval_expr(e).await?),
                        None => None,
                    };
                    ops::slice(&target, start.as_ref(), stop.as_ref())
                }
                Expr::Attr(target, name) => {
                    let receiver = self.eval_expr(target).await?;
                    self.get_attr(receiver, name).await
                }
            }
        })
    }

    async fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<HostValue>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval_expr(expr).await?);
        }
        Ok(values)
    }

    async fn call_value(&mut self, function: HostValue, args: Vec<HostValue>) -> Result<HostValue> {
        self.check_interrupt()?;
        match function {
            HostValue::Builtin(name) => builtins::call(&mut *self.host, name, args),
            HostValue::PeerFn(function) => {
                if function.derived && args.is_empty() {
                    return Err(BridgeError::Runtime(
                        "A function derived from an APL operator cannot be niladic.".into(),
                    ));
                }
                let code = self.host.dialect().call_expr(&function.code, args.len())?;
                self.peer_call(&code, args, function.raw).await
            }
            HostValue::PeerOp(operator) => self.derive(&operator, args).await,
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    async fn call_method(
        &mut self,
        receiver: HostValue,
        name: &str,
        args: Vec<HostValue>,
    ) -> Result<HostValue> {
        self.check_interrupt()?;
        match &receiver {
            HostValue::Peer => self.peer_method(name, args).await,
            HostValue::Remote(remote) => {
                if !remote.operations.iter().any(|op| op == name) {
                    return Err(no_attribute(&receiver, name));
                }
                let dialect = self.host.dialect();
                let target = dialect.access_expr(&remote.id, name);
                let code = dialect.call_expr(&target, args.len())?;
                self.peer_call(&code, args, false).await
            }
            HostValue::Object(obj) => obj.call(name, args),
            _ => builtins::call_method(&receiver, name, args),
        }
    }

    async fn get_attr(&mut self, receiver: HostValue, name: &str) -> Result<HostValue> {
        match &receiver {
            HostValue::Peer if name == "pid" => Ok(self
                .host
                .peer_pid()
                .map_or(HostValue::None, |pid| HostValue::Int(i64::from(pid)))),
            HostValue::Remote(remote) => {
                let expr = self.host.dialect().access_expr(&remote.id, name);
                if remote.attributes.iter().any(|a| a == name) {
                    self.peer_call(&expr, Vec::new(), false).await
                } else if remote.operations.iter().any(|op| op == name) {
                    Ok(HostValue::PeerFn(Arc::new(PeerFunction::new(expr, false))))
                } else {
                    Err(no_attribute(&receiver, name))
                }
            }
            HostValue::Object(obj) => obj.get(name).ok_or_else(|| no_attribute(&receiver, name)),
            HostValue::Raw(Value::Array(array)) => {
                builtins::raw_attribute(array, name).ok_or_else(|| no_attribute(&receiver, name))
            }
            HostValue::Raw(Value::Namespace(ns)) => ns
                .get(name)
                .map(|v| HostValue::Raw(v.clone()))
                .ok_or_else(|| no_attribute(&receiver, name)),
            HostValue::Complex(c) if name == "real" => Ok(HostValue::Float(c.real)),
            HostValue::Complex(c) if name == "imag" => Ok(HostValue::Float(c.imag)),
            _ => Err(no_attribute(&receiver, name)),
        }
    }

    async fn set_attr(&mut self, receiver: HostValue, name: &str, value: HostValue) -> Result<()> {
        match &receiver {
            HostValue::Remote(remote) if remote.attributes.iter().any(|a| a == name) => {
                let code = self.host.dialect().assign_attr_expr(&remote.id, name);
                self.peer_call(&code, vec![value], true).await?;
                Ok(())
            }
            HostValue::Object(obj) => obj.set(name, value),
            _ => Err(no_attribute(&receiver, name)),
        }
    }

    /// Apply a peer operator: `op(aa)`, `op(aa, ww)` or `op(aa, ww, raw)`.
    /// Operands are stored on the peer first.
    async fn derive(&mut self, operator: &PeerOperator, mut args: Vec<HostValue>) -> Result<HostValue> {
        if args.is_empty() || args.len() > 3 {
            return Err(type_error(
                "operator takes a left operand, an optional right operand and a raw flag",
            ));
        }
        let raw = args.get(2).is_some_and(HostValue::truthy);
        args.truncate(2);
        if matches!(args.get(1), Some(HostValue::None)) {
            args.truncate(1);
        }

        let slot = self.host.env().next_operand_slot();
        let mut names = Vec::with_capacity(args.len());
        for (operand, role) in args.into_iter().zip(["aa", "ww"]) {
            names.push(self.store_operand(slot, role, operand).await?);
        }
        let aa = names.first().map(String::as_str).unwrap_or_default();
        let ww = names.get(1).map(String::as_str);
        let code = self.host.dialect().derived_expr(&operator.code, aa, ww);
        debug!(code = %code, "derived peer function");
        Ok(HostValue::PeerFn(Arc::new(PeerFunction {
            code,
            raw,
            derived: true,
        })))
    }

    /// Bind an operator operand to a fresh name on the peer.
    async fn store_operand(&mut self, slot: usize, role: &str, operand: HostValue) -> Result<String> {
        if matches!(
            operand,
            HostValue::Builtin(_) | HostValue::Peer | HostValue::PeerOp(_)
        ) {
            return Err(type_error(format!(
                "'{}' cannot be an operand of a peer operator",
                operand.type_name()
            )));
        }
        let dialect = self.host.dialect();
        let name = dialect.operand_name(slot, role);
        match operand {
            HostValue::PeerFn(function) => {
                let code = dialect.store_fn_expr(&name, &function.code);
                self.peer_call(&code, Vec::new(), true).await?;
            }
            value => {
                let code = dialect.store_value_expr(&name);
                self.peer_call(&code, vec![value], true).await?;
            }
        }
        Ok(name)
    }

    /// Methods of the session handle.
    async fn peer_method(&mut self, name: &str, mut args: Vec<HostValue>) -> Result<HostValue> {
        match name {
            "eval" | "eval_raw" => {
                if args.is_empty() {
                    return Err(type_error(format!("{}() missing code argument", name)));
                }
                let code = text_arg(name, &args.remove(0))?;
                self.peer_call(&code, args, name == "eval_raw").await
            }
            "repr" => {
                let code = single_text(name, &args)?;
                self.host.peer_repr(&code).await.map(HostValue::Str)
            }
            "exec" => {
                let code = single_text(name, &args)?;
                self.host.peer_exec(&code).await.map(HostValue::Str)
            }
            "fn" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(type_error("fn() takes a code argument and an optional raw flag"));
                }
                let code = text_arg(name, &args[0])?;
                let raw = args.get(1).is_some_and(HostValue::truthy);
                Ok(HostValue::PeerFn(Arc::new(PeerFunction::new(code, raw))))
            }
            "op" => {
                let code = single_text(name, &args)?;
                Ok(HostValue::PeerOp(Arc::new(PeerOperator { code })))
            }
            "tradfn" => {
                let code = single_text(name, &args)?;
                let defined = self.host.peer_exec(&code).await?;
                Ok(HostValue::PeerFn(Arc::new(PeerFunction::new(defined, false))))
            }
            "fix" => {
                let lines = match args.as_slice() {
                    [HostValue::Str(code)] => code.split('\n').map(HostValue::str).collect(),
                    [HostValue::List(lines)] => lines.clone(),
                    _ => return Err(type_error("fix() takes a string or a list of lines")),
                };
                let code = self.host.dialect().fix.clone();
                self.peer_call(&code, lines, false).await
            }
            "access" => {
                let reference = single_text(name, &args)?;
                self.host.store().retrieve(&reference).map(HostValue::Object)
            }
            "release" => {
                if args.len() != 1 {
                    return Err(type_error("release() takes exactly one argument"));
                }
                match args.remove(0) {
                    HostValue::Remote(remote) => {
                        debug!(id = %remote.id, "releasing remote object");
                        let code = self.host.dialect().release_expr();
                        self.peer_call(&code, vec![HostValue::Str(remote.id.clone())], true)
                            .await?;
                    }
                    HostValue::Str(reference) => self.host.store().release(&reference)?,
                    other => {
                        return Err(type_error(format!(
                            "cannot release '{}' object",
                            other.type_name()
                        )))
                    }
                }
                Ok(HostValue::None)
            }
            "interrupt" => {
                self.host.interrupt_peer();
                Ok(HostValue::None)
            }
            _ => Err(no_attribute(&HostValue::Peer, name)),
        }
    }

    /// Evaluate `code` on the peer with `args` as its argument vector.
    async fn peer_call(&mut self, code: &str, args: Vec<HostValue>, raw: bool) -> Result<HostValue> {
        let values = {
            let store = self.host.store();
            args.iter()
                .map(|arg| from_host_element(arg, Some(&mut *store)))
                .collect::<Result<Vec<_>>>()?
        };
        let result = self.host.peer_eval(code, values).await?;
        if raw {
            Ok(HostValue::Raw(result))
        } else {
            to_host_value(&result, self.host.store())
        }
    }
}

fn literal(lit: &Literal) -> HostValue {
    match lit {
        Literal::None => HostValue::None,
        Literal::Bool(b) => HostValue::Bool(*b),
        Literal::Int(i) => HostValue::Int(*i),
        Literal::Float(f) => HostValue::Float(*f),
        Literal::Imag(f) => HostValue::Complex(Complex::new(0.0, *f)),
        Literal::Str(s) => HostValue::Str(s.clone()),
    }
}

fn text_arg(method: &str, value: &HostValue) -> Result<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        type_error(format!(
            "{}() argument must be str, not '{}'",
            method,
            value.type_name()
        ))
    })
}

fn single_text(method: &str, args: &[HostValue]) -> Result<String> {
    match args {
        [value] => text_arg(method, value),
        _ => Err(type_error(format!(
            "{}() takes exactly one argument ({} given)",
            method,
            args.len()
        ))),
    }
}

/// Parse and evaluate an expression.
pub async fn eval_source(host: &mut dyn Host, source: &str) -> Result<HostValue> {
    let expr = parse_expr(source)?;
    Interpreter::new(host).eval(&expr).await
}

/// Parse and run statements against the host's environment.
pub async fn exec_source(host: &mut dyn Host, source: &str) -> Result<HostValue> {
    let program = parse_program(source)?;
    Interpreter::new(host).run(&program).await
}

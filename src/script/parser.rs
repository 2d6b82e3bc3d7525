//! Recursive-descent parser producing the host script syntax tree.
//!
//! Precedence, loosest first:
//!
//! ```text
//! a if c else b
//! or
//! and
//! not
//! == != < <= > >= in, not in   (chained)
//! + -
//! * / // %
//! unary - +
//! **
//! call, index, slice, attribute
//! ```

use super::lexer::{tokenize, Spanned, Token};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Imag(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `first op1 e1 op2 e2 ...`, true when every pair holds.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call(Box<Expr>, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },
    Attr(Box<Expr>, String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(String, Expr),
    /// `target.name = value`
    SetAttr(Expr, String, Expr),
    Expr(Expr),
}

/// A parsed statement list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

const KEYWORDS: &[&str] = &["True", "False", "None", "and", "or", "not", "in", "if", "else"];

/// Deepest syntax tree the parser accepts. Also bounds the interpreter's
/// recursion.
pub(crate) const MAX_NESTING: usize = 100;

pub(crate) fn nested_too_deeply() -> BridgeError {
    BridgeError::Syntax("expression nested too deeply".into())
}

/// Parse a single expression.
pub fn parse_expr(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source)?;
    parser.skip_newlines();
    let expr = parser.expr()?;
    parser.skip_newlines();
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a statement list.
pub fn parse_program(source: &str) -> Result<Program> {
    let mut parser = Parser::new(source)?;
    let mut body = Vec::new();
    loop {
        parser.skip_newlines();
        if parser.at(&Token::Eof) {
            break;
        }
        body.push(parser.statement()?);
        if !parser.at(&Token::Eof) && !parser.at(&Token::Newline) {
            return Err(parser.unexpected());
        }
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        })
    }

    fn peek(&self) -> &Token {
        // tokenize always ends with Eof and we never advance past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == word)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if self.at(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// One level deeper in the tree; fails past [`MAX_NESTING`].
    fn deepen(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(nested_too_deeply());
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<R>(&mut self, parse: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.deepen()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn skip_newlines(&mut self) {
        while self.at(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> BridgeError {
        let offset = self.tokens[self.pos.min(self.tokens.len() - 1)].offset;
        match self.peek() {
            Token::Eof => BridgeError::Syntax("unexpected end of input".into()),
            token => BridgeError::Syntax(format!(
                "invalid syntax at position {} near {}",
                offset,
                describe(token)
            )),
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        if let (Token::Name(name), Token::Op("=")) = (self.peek(), self.peek_at(1)) {
            if KEYWORDS.contains(&name.as_str()) {
                return Err(self.unexpected());
            }
            let name = name.clone();
            self.pos += 2;
            return Ok(Stmt::Assign(name, self.expr()?));
        }
        let expr = self.expr()?;
        if !self.at_op("=") {
            return Ok(Stmt::Expr(expr));
        }
        match expr {
            Expr::Attr(target, name) => {
                self.pos += 1;
                Ok(Stmt::SetAttr(*target, name, self.expr()?))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr> {
        let then = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let cond = self.or_expr()?;
        if !self.eat_keyword("else") {
            return Err(self.unexpected());
        }
        let otherwise = self.expr()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    // Operator chains nest to the left, so each link deepens the tree.

    fn or_expr(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            self.deepen()?;
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        self.depth = depth;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            self.deepen()?;
            left = Expr::And(Box::new(left), Box::new(self.not_expr()?));
        }
        self.depth = depth;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn compare_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Token::Op("==") => CmpOp::Eq,
            Token::Op("!=") => CmpOp::Ne,
            Token::Op("<") => CmpOp::Lt,
            Token::Op("<=") => CmpOp::Le,
            Token::Op(">") => CmpOp::Gt,
            Token::Op(">=") => CmpOp::Ge,
            Token::Name(n) if n == "in" => CmpOp::In,
            Token::Name(n) if n == "not" && matches!(self.peek_at(1), Token::Name(m) if m == "in") => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn arith(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinOp::Add,
                Token::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.deepen()?;
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
        self.depth = depth;
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinOp::Mul,
                Token::Op("/") => BinOp::Div,
                Token::Op("//") => BinOp::FloorDiv,
                Token::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            self.deepen()?;
            left = Expr::Binary(op, Box::new(left), Box::new(self.factor()?));
        }
        self.depth = depth;
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Pos
        } else {
            return self.power();
        };
        let operand = self.nested(Self::factor)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            // right associative, binds tighter than a unary minus on its left
            let exponent = self.nested(Self::factor)?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut expr = self.atom()?;
        loop {
            if matches!(self.peek(), Token::Op("(" | "[" | ".")) {
                self.deepen()?;
            }
            if self.eat_op("(") {
                let args = self.sequence(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op(".") {
                match self.advance() {
                    Token::Name(name) => expr = Expr::Attr(Box::new(expr), name),
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                }
            } else {
                self.depth = depth;
                return Ok(expr);
            }
        }
    }

    fn subscript(&mut self, target: Expr) -> Result<Expr> {
        let start = if self.at_op(":") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        if !self.eat_op(":") {
            self.expect_op("]")?;
            let index = start.ok_or_else(|| self.unexpected())?;
            return Ok(Expr::Index(Box::new(target), index));
        }
        let stop = if self.at_op("]") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        self.expect_op("]")?;
        Ok(Expr::Slice {
            target: Box::new(target),
            start,
            stop,
        })
    }

    /// Comma separated expressions up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat_op(close) {
            items.push(self.expr()?);
            if !self.eat_op(",") {
                self.expect_op(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expr> {
        let token = self.advance();
        Ok(match token {
            Token::Int(i) => Expr::Literal(Literal::Int(i)),
            Token::Float(f) => Expr::Literal(Literal::Float(f)),
            Token::Imag(f) => Expr::Literal(Literal::Imag(f)),
            Token::Str(mut s) => {
                // adjacent literals concatenate
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Expr::Literal(Literal::Str(s))
            }
            Token::Name(name) => match name.as_str() {
                "True" => Expr::Literal(Literal::Bool(true)),
                "False" => Expr::Literal(Literal::Bool(false)),
                "None" => Expr::Literal(Literal::None),
                word if KEYWORDS.contains(&word) => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
                _ => Expr::Name(name),
            },
            Token::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expr()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                self.expect_op(",")?;
                let mut items = vec![first];
                items.extend(self.sequence(")")?);
                Expr::List(items)
            }
            Token::Op("[") => Expr::List(self.sequence("]")?),
            Token::Op("{") => {
                let mut entries = Vec::new();
                while !self.eat_op("}") {
                    let key = self.expr()?;
                    self.expect_op(":")?;
                    entries.push((key, self.expr()?));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Expr::Dict(entries)
            }
            Token::Eof => return Err(self.unexpected()),
            _ => {
                self.pos -= 1;
                return Err(self.unexpected());
            }
        })
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => i.to_string(),
        Token::Float(f) => f.to_string(),
        Token::Imag(f) => format!("{}j", f),
        Token::Str(s) => format!("{:?}", s),
        Token::Name(n) => format!("'{}'", n),
        Token::Op(op) => format!("'{}'", op),
        Token::Newline => "end of line".into(),
        Token::Eof => "end of input".into(),
    }
}

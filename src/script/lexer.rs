//! Tokenizer for the host script.

use crate::error::{BridgeError, Result};

/// A token with the character offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    /// Imaginary literal such as `2j`.
    Imag(f64),
    Str(String),
    Name(String),
    /// Operator or punctuation.
    Op(&'static str),
    /// Statement separator: a newline outside brackets, or `;`.
    Newline,
    Eof,
}

const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[",
    "]", "{", "}", ",", ":", ".", ";",
];

/// Split source text into tokens. The result always ends with [`Token::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Spanned>> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
        depth: 0,
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    /// Bracket nesting; newlines inside brackets are whitespace.
    depth: usize,
    tokens: Vec<Spanned>,
}

impl Lexer {
    fn run(mut self) -> Result<Vec<Spanned>> {
        while let Some(c) = self.peek(0) {
            let start = self.pos;
            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push(Token::Newline, start);
                    }
                }
                '\\' if self.peek(1) == Some('\n') => self.pos += 2,
                c if c.is_whitespace() => self.pos += 1,
                '#' => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\'' | '"' => {
                    let text = self.string(c)?;
                    self.push(Token::Str(text), start);
                }
                c if c.is_ascii_digit() => {
                    let token = self.number()?;
                    self.push(token, start);
                }
                '.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => {
                    let token = self.number()?;
                    self.push(token, start);
                }
                c if c == '_' || c.is_alphabetic() => {
                    let mut name = String::new();
                    while let Some(c) = self.peek(0).filter(|&c| c == '_' || c.is_alphanumeric()) {
                        name.push(c);
                        self.pos += 1;
                    }
                    self.push(Token::Name(name), start);
                }
                _ => {
                    let op = self.operator().ok_or_else(|| {
                        BridgeError::Syntax(format!("invalid character '{}' at position {}", c, start))
                    })?;
                    match op {
                        "(" | "[" | "{" => self.depth += 1,
                        ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                        _ => {}
                    }
                    if op == ";" {
                        self.push(Token::Newline, start);
                    } else {
                        self.push(Token::Op(op), start);
                    }
                }
            }
        }
        let end = self.pos;
        self.push(Token::Eof, end);
        Ok(self.tokens)
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn push(&mut self, token: Token, offset: usize) {
        self.tokens.push(Spanned { token, offset });
    }

    fn operator(&mut self) -> Option<&'static str> {
        let op = OPERATORS.iter().copied().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, c)| self.peek(i) == Some(c))
        })?;
        self.pos += op.chars().count();
        Some(op)
    }

    fn string(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut text = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(BridgeError::Syntax(format!(
                    "unterminated string literal at position {}",
                    start
                )));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(text);
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(text);
                }
            }
            if c == '\n' && !triple {
                return Err(BridgeError::Syntax(format!(
                    "unterminated string literal at position {}",
                    start
                )));
            }
            if c == '\\' {
                self.escape(&mut text)?;
                continue;
            }
            text.push(c);
            self.pos += 1;
        }
    }

    fn escape(&mut self, text: &mut String) -> Result<()> {
        let Some(c) = self.peek(1) else {
            text.push('\\');
            self.pos += 1;
            return Ok(());
        };
        self.pos += 2;
        match c {
            'n' => text.push('\n'),
            't' => text.push('\t'),
            'r' => text.push('\r'),
            '0' => text.push('\0'),
            '\\' => text.push('\\'),
            '\'' => text.push('\''),
            '"' => text.push('"'),
            '\n' => {}
            'x' => text.push(self.code_point(2)?),
            'u' => text.push(self.code_point(4)?),
            other => {
                text.push('\\');
                text.push(other);
            }
        }
        Ok(())
    }

    fn code_point(&mut self, digits: usize) -> Result<char> {
        let hex: String = (0..digits).filter_map(|i| self.peek(i)).collect();
        let value = (hex.len() == digits)
            .then(|| u32::from_str_radix(&hex, 16).ok())
            .flatten()
            .and_then(char::from_u32)
            .ok_or_else(|| {
                BridgeError::Syntax(format!("invalid escape at position {}", self.pos))
            })?;
        self.pos += digits;
        Ok(value)
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut text = String::new();
        let mut is_float = false;

        let digits = |lexer: &mut Lexer, text: &mut String| {
            while let Some(c) = lexer.peek(0).filter(|c| c.is_ascii_digit() || *c == '_') {
                if c != '_' {
                    text.push(c);
                }
                lexer.pos += 1;
            }
        };

        digits(self, &mut text);
        let fraction_follows = self
            .peek(1)
            .map_or(true, |c| !c.is_alphabetic() || matches!(c, 'e' | 'E' | 'j' | 'J'));
        if self.peek(0) == Some('.') && fraction_follows {
            is_float = true;
            text.push('.');
            self.pos += 1;
            digits(self, &mut text);
        }
        if matches!(self.peek(0), Some('e' | 'E'))
            && (self.peek(1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek(1), Some('+' | '-'))
                    && self.peek(2).is_some_and(|c| c.is_ascii_digit())))
        {
            is_float = true;
            text.push('e');
            self.pos += 1;
            if let Some(sign @ ('+' | '-')) = self.peek(0) {
                text.push(sign);
                self.pos += 1;
            }
            digits(self, &mut text);
        }

        let invalid = || BridgeError::Syntax(format!("invalid number literal at position {}", start));

        if matches!(self.peek(0), Some('j' | 'J')) {
            self.pos += 1;
            return text.parse().map(Token::Imag).map_err(|_| invalid());
        }
        if is_float {
            return text.parse().map(Token::Float).map_err(|_| invalid());
        }
        text.parse().map(Token::Int).map_err(|_| {
            BridgeError::Syntax(format!("integer literal too large at position {}", start))
        })
    }
}

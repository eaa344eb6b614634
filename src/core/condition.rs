//! Gate conditions - boolean expressions over the run context
//!
//! ```text
//! run.ref == 'refs/heads/main' && run.event != 'pull_request'
//! startsWith(run.ref, 'refs/tags/') || vars.force_deploy
//! ```

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors produced while parsing a condition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("Empty expression")]
    Empty,

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' takes {expected} arguments, got {found}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Source of values for path lookups such as `run.ref` or `vars.image`
pub trait ConditionContext {
    /// Resolve a dotted path; unknown paths resolve to None
    fn lookup(&self, path: &str) -> Option<String>;
}

impl ConditionContext for HashMap<String, String> {
    fn lookup(&self, path: &str) -> Option<String> {
        self.get(path).cloned()
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bool(bool),
}

impl Value {
    /// `""`, `"false"` and `"0"` are false, everything else is true
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !(s.is_empty() || s == "false" || s == "0"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Built-in string functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    StartsWith,
    EndsWith,
    Contains,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "startsWith" => Some(Function::StartsWith),
            "endsWith" => Some(Function::EndsWith),
            "contains" => Some(Function::Contains),
            _ => None,
        }
    }

    fn arity(&self) -> usize {
        2
    }

    fn apply(&self, args: &[Value]) -> Value {
        let haystack = args[0].to_string();
        let needle = args[1].to_string();
        Value::Bool(match self {
            Function::StartsWith => haystack.starts_with(&needle),
            Function::EndsWith => haystack.ends_with(&needle),
            Function::Contains => haystack.contains(&needle),
        })
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Evaluate to a value. `&&` and `||` short-circuit.
    pub fn evaluate(&self, ctx: &dyn ConditionContext) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Path(path) => Value::Str(ctx.lookup(path).unwrap_or_default()),
            Expr::Not(inner) => Value::Bool(!inner.evaluate(ctx).is_truthy()),
            Expr::And(lhs, rhs) => {
                Value::Bool(lhs.evaluate(ctx).is_truthy() && rhs.evaluate(ctx).is_truthy())
            }
            Expr::Or(lhs, rhs) => {
                Value::Bool(lhs.evaluate(ctx).is_truthy() || rhs.evaluate(ctx).is_truthy())
            }
            Expr::Eq(lhs, rhs) => {
                Value::Bool(lhs.evaluate(ctx).to_string() == rhs.evaluate(ctx).to_string())
            }
            Expr::Ne(lhs, rhs) => {
                Value::Bool(lhs.evaluate(ctx).to_string() != rhs.evaluate(ctx).to_string())
            }
            Expr::Call(function, args) => {
                let values: Vec<Value> = args.iter().map(|a| a.evaluate(ctx)).collect();
                function.apply(&values)
            }
        }
    }

    /// All context paths referenced by the expression
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path(p) => out.push(p),
            Expr::Not(inner) => inner.collect_paths(out),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Eq(l, r) | Expr::Ne(l, r) => {
                l.collect_paths(out);
                r.collect_paths(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_paths(out)),
        }
    }
}

/// A parsed gate condition that remembers its source text
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        Ok(Self {
            source: source.trim().to_string(),
            expr: parse_expression(source)?,
        })
    }

    /// Whether the gate lets execution proceed
    pub fn is_satisfied(&self, ctx: &dyn ConditionContext) -> bool {
        self.expr.evaluate(ctx).is_truthy()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Str(String),
    Ident(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Not => "'!'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Eq => "'=='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::Str(s) => format!("string '{}'", s),
            Token::Ident(s) => format!("'{}'", s),
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.'
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '!' => {
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    Token::Ne
                } else {
                    Token::Not
                }
            }
            '=' => match chars.next() {
                Some((_, '=')) => Token::Eq,
                _ => return Err(ConditionError::UnexpectedChar { ch, pos }),
            },
            '&' => match chars.next() {
                Some((_, '&')) => Token::And,
                _ => return Err(ConditionError::UnexpectedChar { ch, pos }),
            },
            '|' => match chars.next() {
                Some((_, '|')) => Token::Or,
                _ => return Err(ConditionError::UnexpectedChar { ch, pos }),
            },
            quote @ ('\'' | '"') => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => text.push(c),
                        None => return Err(ConditionError::UnterminatedString(pos)),
                    }
                }
                Token::Str(text)
            }
            c if is_ident_char(c) => {
                let mut ident = c.to_string();
                while let Some((_, c)) = chars.next_if(|&(_, c)| is_ident_char(c)) {
                    ident.push(c);
                }
                Token::Ident(ident)
            }
            other => return Err(ConditionError::UnexpectedChar { ch: other, pos }),
        };
        tokens.push((token, pos));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, pos)) => Err(ConditionError::UnexpectedToken {
                found: token.describe(),
                pos,
            }),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.pos += 1;
                let rhs = self.parse_primary()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some(Token::Ne) => {
                self.pos += 1;
                let rhs = self.parse_primary()?;
                Ok(Expr::Ne(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        let (token, pos) = self.next().ok_or(ConditionError::UnexpectedEnd)?;
        match token {
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Ident(ident) => {
                if ident == "true" || ident == "false" {
                    Ok(Expr::Literal(Value::Bool(ident == "true")))
                } else if self.peek() == Some(&Token::LParen) {
                    self.parse_call(ident)
                } else if ident.starts_with(|c: char| c.is_ascii_digit()) {
                    Ok(Expr::Literal(Value::Str(ident)))
                } else {
                    Ok(Expr::Path(ident))
                }
            }
            other => Err(ConditionError::UnexpectedToken {
                found: other.describe(),
                pos,
            }),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ConditionError> {
        let function =
            Function::from_name(&name).ok_or_else(|| ConditionError::UnknownFunction(name.clone()))?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            args.push(self.parse_or()?);
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                args.push(self.parse_or()?);
            }
        }
        self.expect(Token::RParen)?;

        if args.len() != function.arity() {
            return Err(ConditionError::WrongArity {
                name,
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(function, args))
    }
}

/// Parse an expression string into an expression tree
pub fn parse_expression(src: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;

    if let Some((token, pos)) = parser.next() {
        return Err(ConditionError::UnexpectedToken {
            found: token.describe(),
            pos,
        });
    }
    Ok(expr)
}

//! Expression evaluation
//!
//! Evaluates `when` clauses and expands `${...}` placeholders against a flat
//! variable namespace built from a manifest (`build_vars.X`, `cdefs.X`,
//! `mos.platform`, `mos.libs.<name>.path`, ...).
//!
//! The grammar is small: string literals, bare words, variable names,
//! `==`, `!=`, `!`, `&&`, `||` and parentheses.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::manifest::Manifest;
use crate::error::ExprError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{[^}]+\}").expect("valid regex"));

/// Variable namespace visible to expressions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars(BTreeMap<String, String>);

impl Vars {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Add the manifest's build vars and C defines
    pub fn add_manifest(&mut self, m: &Manifest) {
        for (k, v) in &m.build_vars {
            self.set(format!("build_vars.{k}"), v.clone());
        }
        for (k, v) in &m.cdefs {
            self.set(format!("cdefs.{k}"), v.clone());
        }
    }

    /// Iterate over all variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bool(bool),
}

impl Value {
    /// Boolean interpretation: empty, `0` and `false` strings are false
    pub fn truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Str(s) => !(s.is_empty() || s == "0" || s == "false"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Expression evaluation service
pub trait Evaluator: Send + Sync {
    /// Evaluate an expression to a value
    fn evaluate(&self, expr: &str, vars: &Vars) -> Result<Value, ExprError>;

    /// Evaluate an expression as a condition
    fn evaluate_bool(&self, expr: &str, vars: &Vars) -> Result<bool, ExprError> {
        Ok(self.evaluate(expr, vars)?.truthy())
    }

    /// Replace every `${expr}` in `template` with its value
    fn expand(&self, template: &str, vars: &Vars) -> Result<String, ExprError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for m in PLACEHOLDER.find_iter(template) {
            out.push_str(&template[last..m.start()]);
            let inner = &template[m.start() + 2..m.end() - 1];
            out.push_str(&self.evaluate(inner, vars)?.to_string());
            last = m.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}

/// Built-in evaluator for manifest expressions
#[derive(Debug, Clone, Copy, Default)]
pub struct MosExpr;

impl Evaluator for MosExpr {
    fn evaluate(&self, expr: &str, vars: &Vars) -> Result<Value, ExprError> {
        let tokens = tokenize(expr)?;
        let mut parser = Parser {
            expr,
            tokens: &tokens,
            pos: 0,
        };
        let ast = parser.parse_or()?;
        if let Some((offset, tok)) = parser.peek() {
            return Err(syntax(expr, *offset, format!("unexpected {tok}")));
        }
        ast.eval(vars)
    }
}

/// Evaluator bundled with the variables every expression sees
#[derive(Clone)]
pub struct Interp {
    evaluator: Arc<dyn Evaluator>,
    globals: Vars,
}

impl fmt::Debug for Interp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interp")
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new(Arc::new(MosExpr))
    }
}

impl Interp {
    /// Create an interpreter around an evaluator
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            globals: Vars::new(),
        }
    }

    /// Global variables
    pub fn globals(&self) -> &Vars {
        &self.globals
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.globals.set(name, value);
    }

    /// Globals plus the variables of `m`
    pub fn vars_for(&self, m: &Manifest) -> Vars {
        let mut vars = self.globals.clone();
        vars.add_manifest(m);
        vars
    }

    /// Evaluate a condition
    pub fn evaluate_bool(&self, expr: &str, vars: &Vars) -> Result<bool, ExprError> {
        self.evaluator.evaluate_bool(expr, vars)
    }

    /// Evaluate an expression
    pub fn evaluate(&self, expr: &str, vars: &Vars) -> Result<Value, ExprError> {
        self.evaluator.evaluate(expr, vars)
    }

    /// Expand placeholders; with `skip_failed` a failing placeholder is kept verbatim
    pub fn expand(&self, template: &str, vars: &Vars, skip_failed: bool) -> Result<String, ExprError> {
        if !skip_failed {
            return self.evaluator.expand(template, vars);
        }
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for m in PLACEHOLDER.find_iter(template) {
            out.push_str(&template[last..m.start()]);
            match self.evaluator.expand(m.as_str(), vars) {
                Ok(v) => out.push_str(&v),
                Err(_) => out.push_str(m.as_str()),
            }
            last = m.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    /// Expand every entry of a list
    pub fn expand_all(&self, items: &[String], vars: &Vars) -> Result<Vec<String>, ExprError> {
        items.iter().map(|s| self.expand(s, vars, false)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    Eq,
    Ne,
    And,
    Or,
    Str(String),
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Not => f.write_str("'!'"),
            Self::Eq => f.write_str("'=='"),
            Self::Ne => f.write_str("'!='"),
            Self::And => f.write_str("'&&'"),
            Self::Or => f.write_str("'||'"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Word(w) => write!(f, "{w:?}"),
        }
    }
}

fn syntax(expr: &str, offset: usize, message: impl Into<String>) -> ExprError {
    ExprError::Syntax {
        expr: expr.to_string(),
        offset,
        message: message.into(),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn tokenize(expr: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let tok = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '!' if chars.peek().is_some_and(|(_, n)| *n == '=') => {
                chars.next();
                Token::Ne
            }
            '!' => Token::Not,
            '=' if chars.peek().is_some_and(|(_, n)| *n == '=') => {
                chars.next();
                Token::Eq
            }
            '&' if chars.peek().is_some_and(|(_, n)| *n == '&') => {
                chars.next();
                Token::And
            }
            '|' if chars.peek().is_some_and(|(_, n)| *n == '|') => {
                chars.next();
                Token::Or
            }
            '"' | '\'' => {
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, n)) = chars.next() {
                    match n {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                s.push(escaped);
                            }
                        }
                        n if n == c => {
                            closed = true;
                            break;
                        }
                        n => s.push(n),
                    }
                }
                if !closed {
                    return Err(syntax(expr, i, "unterminated string"));
                }
                Token::Str(s)
            }
            c if is_word_char(c) => {
                let mut w = String::from(c);
                while let Some((_, n)) = chars.peek() {
                    if !is_word_char(*n) {
                        break;
                    }
                    w.push(*n);
                    chars.next();
                }
                Token::Word(w)
            }
            other => return Err(syntax(expr, i, format!("unexpected character {other:?}"))),
        };
        tokens.push((i, tok));
    }
    Ok(tokens)
}

#[derive(Debug)]
enum Ast {
    Lit(Value),
    Var(String),
    Not(Box<Ast>),
    Eq(Box<Ast>, Box<Ast>, bool),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

impl Ast {
    fn eval(&self, vars: &Vars) -> Result<Value, ExprError> {
        Ok(match self {
            Self::Lit(v) => v.clone(),
            Self::Var(name) => match vars.get(name) {
                Some(v) => Value::Str(v.to_string()),
                None => {
                    return Err(ExprError::Undefined { name: name.clone() });
                }
            },
            Self::Not(inner) => Value::Bool(!inner.eval(vars)?.truthy()),
            Self::Eq(a, b, equal) => {
                let same = a.eval(vars)?.to_string() == b.eval(vars)?.to_string();
                Value::Bool(same == *equal)
            }
            Self::And(a, b) => Value::Bool(a.eval(vars)?.truthy() && b.eval(vars)?.truthy()),
            Self::Or(a, b) => Value::Bool(a.eval(vars)?.truthy() || b.eval(vars)?.truthy()),
        })
    }
}

struct Parser<'a> {
    expr: &'a str,
    tokens: &'a [(usize, Token)],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek().is_some_and(|(_, t)| t == tok) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn parse_or(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            left = Ast::Or(Box::new(left), Box::new(self.parse_and()?));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.parse_cmp()?;
        while self.eat(&Token::And) {
            left = Ast::And(Box::new(left), Box::new(self.parse_cmp()?));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Ast, ExprError> {
        let left = self.parse_unary()?;
        if self.eat(&Token::Eq) {
            return Ok(Ast::Eq(Box::new(left), Box::new(self.parse_unary()?), true));
        }
        if self.eat(&Token::Ne) {
            return Ok(Ast::Eq(Box::new(left), Box::new(self.parse_unary()?), false));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Ast, ExprError> {
        if self.eat(&Token::Not) {
            return Ok(Ast::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Ast, ExprError> {
        let Some((offset, tok)) = self.peek().cloned() else {
            return Err(syntax(self.expr, self.expr.len(), "unexpected end of expression"));
        };
        self.pos += 1;
        match tok {
            Token::LParen => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(syntax(self.expr, offset, "unbalanced '('"));
                }
                Ok(inner)
            }
            Token::Str(s) => Ok(Ast::Lit(Value::Str(s))),
            Token::Word(w) => Ok(match w.as_str() {
                "true" => Ast::Lit(Value::Bool(true)),
                "false" => Ast::Lit(Value::Bool(false)),
                _ if w.starts_with(|c: char| c.is_ascii_digit() || c == '-') => {
                    Ast::Lit(Value::Str(w))
                }
                _ => Ast::Var(w),
            }),
            other => Err(syntax(self.expr, offset, format!("unexpected {other}"))),
        }
    }
}

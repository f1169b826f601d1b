//! The check-expression language generated code is written in: parsing and
//! evaluation.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | cmp
//! cmp     := rem (("==" | "!=") rem)?
//! rem     := postfix ("%" postfix)*
//! postfix := atom ("(" args ")" | "[" expr "]" | "." NAME)*
//! atom    := NAME | INT | True | False | None
//!          | "(" NAME ":=" expr ")" | "(" ")" | "(" expr ("," expr)* ","? ")"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::HintError;
use crate::forward_ref::ForwardRef;
use crate::hint::Hint;
use crate::language;
use crate::runtime::class::ClassRef;
use crate::runtime::value::Value;
use crate::scope::{Scope, ScopeObj};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Int(i64),
    Bool(bool),
    None,
    Tuple(Vec<Expr>),
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Rem(Box<Expr>, Box<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: String,
        args: Vec<Expr>,
    },
    Method {
        recv: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Name(String),
    Int(i64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Walrus,
    EqEq,
    NotEq,
    Percent,
}

fn lex(src: &str) -> Result<Vec<(Tok, usize)>, ParseError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => out.push((Tok::LParen, start)),
            b')' => out.push((Tok::RParen, start)),
            b'[' => out.push((Tok::LBracket, start)),
            b']' => out.push((Tok::RBracket, start)),
            b',' => out.push((Tok::Comma, start)),
            b'.' => out.push((Tok::Dot, start)),
            b'%' => out.push((Tok::Percent, start)),
            b':' if bytes.get(i + 1) == Some(&b'=') => {
                out.push((Tok::Walrus, start));
                i += 1;
            }
            b'=' if bytes.get(i + 1) == Some(&b'=') => {
                out.push((Tok::EqEq, start));
                i += 1;
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                out.push((Tok::NotEq, start));
                i += 1;
            }
            b'0'..=b'9' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &src[start..i];
                let n = text.parse::<i64>().map_err(|_| ParseError {
                    message: format!("integer literal out of range: {text}"),
                    offset: start,
                })?;
                out.push((Tok::Int(n), start));
                continue;
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                out.push((Tok::Name(src[start..i].to_string()), start));
                continue;
            }
            _ => {
                let ch = src[start..].chars().next().unwrap_or('?');
                let message = if c == b'@' {
                    "unsubstituted placeholder".to_string()
                } else {
                    format!("unexpected character {ch:?}")
                };
                return Err(ParseError {
                    message,
                    offset: start,
                });
            }
        }
        i += 1;
    }
    Ok(out)
}

struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
}

pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let toks = lex(src)?;
    let mut p = Parser {
        toks,
        pos: 0,
        end: src.len(),
        depth: 0,
    };
    let expr = p.expr()?;
    if p.pos != p.toks.len() {
        return Err(p.error("trailing tokens"));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, n: usize) -> Option<&Tok> {
        self.toks.get(self.pos + n).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.toks.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            offset: self.offset(),
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Name(n)) if n == kw)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), ParseError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > language::limits::MAX_EXPR_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut terms = vec![self.and()?];
        while self.is_keyword("or") {
            self.pos += 1;
            terms.push(self.and()?);
        }
        self.depth -= 1;
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.not()?];
        while self.is_keyword("and") {
            self.pos += 1;
            terms.push(self.not()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn not(&mut self) -> Result<Expr, ParseError> {
        if self.is_keyword("not") {
            self.pos += 1;
            self.enter()?;
            let inner = self.not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.cmp()
    }

    fn cmp(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.rem()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => CmpOp::Eq,
            Some(Tok::NotEq) => CmpOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.rem()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn rem(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.postfix()?;
        while self.eat(&Tok::Percent) {
            let rhs = self.postfix()?;
            lhs = Expr::Rem(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Tok::Comma) {
                if self.eat(&Tok::RParen) {
                    return Ok(args);
                }
                continue;
            }
            self.expect(&Tok::RParen, "')' after arguments")?;
            return Ok(args);
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.atom()?;
        loop {
            match self.peek() {
                Some(Tok::LParen) => {
                    let Expr::Name(func) = e else {
                        return Err(self.error("only names can be called"));
                    };
                    self.pos += 1;
                    let args = self.args()?;
                    e = Expr::Call { func, args };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.expr()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    e = Expr::Index {
                        target: Box::new(e),
                        index: Box::new(index),
                    };
                }
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let Some(Tok::Name(name)) = self.peek().cloned() else {
                        return Err(self.error("expected method name after '.'"));
                    };
                    self.pos += 1;
                    self.expect(&Tok::LParen, "'(' after method name")?;
                    let args = self.args()?;
                    e = Expr::Method {
                        recv: Box::new(e),
                        name,
                        args,
                    };
                }
                _ => return Ok(e),
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().cloned() {
            Some(Tok::Int(n)) => {
                self.pos += 1;
                Ok(Expr::Int(n))
            }
            Some(Tok::Name(name)) => {
                if language::is_keyword(&name) && !matches!(name.as_str(), "True" | "False" | "None")
                {
                    return Err(self.error(&format!("unexpected keyword {name:?}")));
                }
                self.pos += 1;
                Ok(match name.as_str() {
                    "True" => Expr::Bool(true),
                    "False" => Expr::Bool(false),
                    "None" => Expr::None,
                    _ => Expr::Name(name),
                })
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                if let (Some(Tok::Name(name)), Some(Tok::Walrus)) =
                    (self.peek().cloned(), self.peek_at(1))
                {
                    self.pos += 2;
                    let value = self.expr()?;
                    self.expect(&Tok::RParen, "')' after assignment")?;
                    return Ok(Expr::Assign {
                        name,
                        value: Box::new(value),
                    });
                }
                if self.eat(&Tok::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expr()?;
                if self.eat(&Tok::RParen) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat(&Tok::Comma) {
                    if self.peek() == Some(&Tok::RParen) {
                        break;
                    }
                    items.push(self.expr()?);
                }
                self.expect(&Tok::RParen, "')' closing tuple")?;
                Ok(Expr::Tuple(items))
            }
            _ => Err(self.error("expected expression")),
        }
    }
}

/// A runtime object visible to the check language.
#[derive(Debug, Clone)]
pub enum Obj {
    Value(Value),
    ForwardRef(Arc<ForwardRef>),
    Hint(Hint),
}

impl Obj {
    fn truthy(&self) -> bool {
        match self {
            Obj::Value(v) => v.truthy(),
            Obj::ForwardRef(_) | Obj::Hint(_) => true,
        }
    }

    fn bool(b: bool) -> Self {
        Obj::Value(Value::Bool(b))
    }
}

/// Why evaluation stopped early.
#[derive(Debug, Clone)]
pub enum EvalFailure {
    /// The generated `violation(...)` call was reached.
    Violation {
        pith: Value,
        hint: Hint,
        random_index: Option<u32>,
    },
    Error(HintError),
}

impl From<HintError> for EvalFailure {
    fn from(err: HintError) -> Self {
        EvalFailure::Error(err)
    }
}

pub struct Env<'a> {
    scope: &'a Scope,
    locals: HashMap<String, Obj>,
}

impl<'a> Env<'a> {
    pub fn new(scope: &'a Scope) -> Self {
        Self {
            scope,
            locals: HashMap::new(),
        }
    }

    pub fn bind(&mut self, name: &str, obj: Obj) {
        self.locals.insert(name.to_string(), obj);
    }

    fn lookup(&self, name: &str) -> Result<Obj, EvalFailure> {
        if let Some(obj) = self.locals.get(name) {
            return Ok(obj.clone());
        }
        match self.scope.get(name) {
            Some(ScopeObj::Class(cls)) => Ok(Obj::Value(Value::Class(cls.clone()))),
            Some(ScopeObj::Types(classes)) => Ok(Obj::Value(Value::tuple(
                classes.iter().cloned().map(Value::Class).collect(),
            ))),
            Some(ScopeObj::ForwardRef(proxy)) => Ok(Obj::ForwardRef(proxy.clone())),
            Some(ScopeObj::Hint(hint)) => Ok(Obj::Hint(hint.clone())),
            Some(ScopeObj::Const(value)) => Ok(Obj::Value(value.clone())),
            None => Err(internal(format!("name {name:?} is not defined"))),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Obj, EvalFailure> {
        match expr {
            Expr::Name(name) => self.lookup(name),
            Expr::Int(n) => Ok(Obj::Value(Value::Int(*n))),
            Expr::Bool(b) => Ok(Obj::bool(*b)),
            Expr::None => Ok(Obj::Value(Value::None)),
            Expr::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.value(item)?);
                }
                Ok(Obj::Value(Value::tuple(values)))
            }
            Expr::Or(terms) => {
                for term in terms {
                    if self.eval(term)?.truthy() {
                        return Ok(Obj::bool(true));
                    }
                }
                Ok(Obj::bool(false))
            }
            Expr::And(terms) => {
                for term in terms {
                    if !self.eval(term)?.truthy() {
                        return Ok(Obj::bool(false));
                    }
                }
                Ok(Obj::bool(true))
            }
            Expr::Not(inner) => Ok(Obj::bool(!self.eval(inner)?.truthy())),
            Expr::Compare { op, lhs, rhs } => {
                let l = self.value(lhs)?;
                let r = self.value(rhs)?;
                Ok(Obj::bool(match op {
                    CmpOp::Eq => l == r,
                    CmpOp::Ne => l != r,
                }))
            }
            Expr::Rem(lhs, rhs) => {
                let l = self.int(lhs)?;
                let r = self.int(rhs)?;
                if r == 0 {
                    return Err(internal("integer modulo by zero".to_string()));
                }
                Ok(Obj::Value(Value::Int(l.rem_euclid(r))))
            }
            Expr::Index { target, index } => {
                let t = self.value(target)?;
                let i = self.int(index)?;
                t.index(i)
                    .map(Obj::Value)
                    .ok_or_else(|| internal(format!("index {i} out of range for {}", t.repr())))
            }
            Expr::Assign { name, value } => {
                let v = self.eval(value)?;
                self.locals.insert(name.clone(), v.clone());
                Ok(v)
            }
            Expr::Call { func, args } => self.call(func, args),
            Expr::Method { recv, name, args } => {
                let Obj::ForwardRef(proxy) = self.eval(recv)? else {
                    return Err(internal(format!("method {name:?} called on a non-proxy")));
                };
                let [arg] = args.as_slice() else {
                    return Err(internal(format!("{name}() takes one argument")));
                };
                let value = self.value(arg)?;
                let ok = match name.as_str() {
                    "is_instance" => proxy.is_instance(&value)?,
                    "is_subclass" => proxy.is_subclass(&value)?,
                    _ => return Err(internal(format!("unknown proxy method {name:?}"))),
                };
                Ok(Obj::bool(ok))
            }
        }
    }

    fn value(&mut self, expr: &Expr) -> Result<Value, EvalFailure> {
        match self.eval(expr)? {
            Obj::Value(v) => Ok(v),
            other => Err(internal(format!("expected a value, got {other:?}"))),
        }
    }

    fn int(&mut self, expr: &Expr) -> Result<i64, EvalFailure> {
        match self.value(expr)? {
            Value::Int(n) => Ok(n),
            Value::Bool(b) => Ok(b as i64),
            other => Err(internal(format!("expected an int, got {}", other.repr()))),
        }
    }

    fn call(&mut self, func: &str, args: &[Expr]) -> Result<Obj, EvalFailure> {
        match (func, args) {
            ("isinstance", [obj, classes]) => {
                let v = self.value(obj)?;
                let classes = class_list(self.value(classes)?)?;
                Ok(Obj::bool(classes.iter().any(|c| c.is_instance(&v))))
            }
            ("issubclass", [obj, classes]) => {
                let Value::Class(sub) = self.value(obj)? else {
                    return Ok(Obj::bool(false));
                };
                let classes = class_list(self.value(classes)?)?;
                Ok(Obj::bool(classes.iter().any(|c| sub.is_subclass(c))))
            }
            ("len", [obj]) => {
                let v = self.value(obj)?;
                let n = v
                    .len()
                    .ok_or_else(|| internal(format!("{} has no length", v.repr())))?;
                Ok(Obj::Value(Value::Int(n as i64)))
            }
            (language::NAME_VIOLATION, [pith, hint, rest @ ..]) if rest.len() <= 1 => {
                let pith = self.value(pith)?;
                let Obj::Hint(hint) = self.eval(hint)? else {
                    return Err(internal("violation() expects the root hint".to_string()));
                };
                let random_index = match rest.first() {
                    Some(e) => Some(self.int(e)? as u32),
                    None => None,
                };
                Err(EvalFailure::Violation {
                    pith,
                    hint,
                    random_index,
                })
            }
            _ => Err(internal(format!(
                "unknown call {func}() with {} argument(s)",
                args.len()
            ))),
        }
    }
}

fn class_list(v: Value) -> Result<Vec<ClassRef>, EvalFailure> {
    match v {
        Value::Class(cls) => Ok(vec![cls]),
        Value::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Value::Class(cls) => Ok(cls.clone()),
                other => Err(internal(format!("{} is not a class", other.repr()))),
            })
            .collect(),
        other => Err(internal(format!("{} is not a class", other.repr()))),
    }
}

fn internal(message: String) -> EvalFailure {
    EvalFailure::Error(HintError::internal(format!(
        "generated check failed to evaluate: {message}"
    )))
}

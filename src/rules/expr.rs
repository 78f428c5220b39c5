//! Sandboxed expression language for `custom` process rules.
//!
//! A custom rule's `content` is a single expression. The source field's value
//! is bound to the identifier `value`; the expression's result becomes the
//! new field. Nothing else is reachable: there are no assignments, loops,
//! or I/O, so evaluation always terminates and has no side effects.
//! Every built value is capped at [`MAX_OUTPUT_LEN`] (see [`weight`]); an
//! expression that would exceed it fails with [`ExprError::TooComplex`].
//!
//! ## Syntax
//!
//! ```text
//! value                        the source field (null when absent)
//! 42  1.5  "text"  'text'      literals, plus true / false / null
//! [a, b]                       list
//! value.name  value[0]         member / index access (.length on text and lists)
//! + - * / %                    arithmetic; + concatenates when either side is text
//! == != < > <= >=              loose comparison (numeric when both sides are numbers)
//! && || !                      boolean logic (short-circuit)
//! cond ? a : b                 conditional
//! upper(value)                 function call
//! ```
//!
//! Functions: `upper lower trim len number string round floor ceil abs min
//! max contains starts_with ends_with replace substr split join concat
//! default if object`. `object("k1", v1, "k2", v2)` builds an object from
//! key/value pairs.
//!
//! ## Example
//!
//! ```
//! use cardpress::rules::expr::evaluate;
//! use serde_json::json;
//!
//! let out = evaluate(r#"value > 50 ? "strong" : "weak""#, &json!("80")).unwrap();
//! assert_eq!(out, json!("strong"));
//! ```

use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

use crate::record::{format_f64, value_to_string};

/// Longest accepted expression source, in bytes.
pub const MAX_SOURCE_LEN: usize = 4096;

/// Deepest accepted nesting of sub-expressions.
pub const MAX_DEPTH: usize = 64;

/// Largest value an expression may build, measured by [`weight`].
pub const MAX_OUTPUT_LEN: usize = 1 << 20;

/// Name the source value is bound to.
pub const PARAM: &str = "value";

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("unknown identifier '{0}' (only 'value' is defined)")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("expression too large or too deeply nested")]
    TooComplex,
}

// ============================================================================
// LEXER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Sym(&'static str),
}

const SYMBOLS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "(", ")", "[", "]",
    ",", ".", "?", ":", "!", "<", ">",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text.parse::<f64>().map_err(|_| ExprError::Syntax {
                pos: start,
                message: format!("bad number '{}'", text),
            })?;
            tokens.push((start, Token::Number(n)));
            continue;
        }

        if c == '"' || c == '\'' {
            i += 1;
            let mut s = String::new();
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(ExprError::Syntax {
                        pos: start,
                        message: "unterminated string".into(),
                    });
                };
                i += 1;
                if ch == c {
                    break;
                }
                if ch == '\\' {
                    let escaped = chars.get(i).copied().ok_or(ExprError::Syntax {
                        pos: i,
                        message: "dangling escape".into(),
                    })?;
                    i += 1;
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            tokens.push((start, Token::Str(s)));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(chars[start..i].iter().collect())));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        match SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            Some(sym) => {
                i += sym.len();
                tokens.push((start, Token::Sym(*sym)));
            }
            None => {
                return Err(ExprError::Syntax {
                    pos: start,
                    message: format!("unexpected character '{}'", c),
                });
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Param,
    List(Vec<Node>),
    Not(Box<Node>),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
    Member(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            pos: self.offset(),
            message: message.into(),
        }
    }

    fn eat(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, sym: &str) -> Result<(), ExprError> {
        if self.eat(sym) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", sym)))
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooComplex);
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Node, ExprError> {
        self.enter()?;
        let cond = self.or()?;
        let node = if self.eat("?") {
            let then = self.expression()?;
            self.expect(":")?;
            let otherwise = self.expression()?;
            Node::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise))
        } else {
            cond
        };
        self.depth -= 1;
        Ok(node)
    }

    fn or(&mut self) -> Result<Node, ExprError> {
        let mut left = self.and()?;
        while self.eat("||") {
            let right = self.and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Node, ExprError> {
        let mut left = self.equality()?;
        while self.eat("&&") {
            let right = self.equality()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Node, ExprError> {
        let mut left = self.comparison()?;
        loop {
            let op = if self.eat("==") || self.eat("===") {
                BinOp::Eq
            } else if self.eat("!=") || self.eat("!==") {
                BinOp::Ne
            } else {
                return Ok(left);
            };
            let right = self.comparison()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn comparison(&mut self) -> Result<Node, ExprError> {
        let mut left = self.additive()?;
        loop {
            let op = if self.eat("<=") {
                BinOp::Le
            } else if self.eat(">=") {
                BinOp::Ge
            } else if self.eat("<") {
                BinOp::Lt
            } else if self.eat(">") {
                BinOp::Gt
            } else {
                return Ok(left);
            };
            let right = self.additive()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Node, ExprError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat("+") {
                BinOp::Add
            } else if self.eat("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.multiplicative()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Node, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat("*") {
                BinOp::Mul
            } else if self.eat("/") {
                BinOp::Div
            } else if self.eat("%") {
                BinOp::Rem
            } else {
                return Ok(left);
            };
            let right = self.unary()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Node, ExprError> {
        self.enter()?;
        let node = if self.eat("!") {
            Node::Not(Box::new(self.unary()?))
        } else if self.eat("-") {
            Node::Neg(Box::new(self.unary()?))
        } else {
            self.postfix()?
        };
        self.depth -= 1;
        Ok(node)
    }

    fn postfix(&mut self) -> Result<Node, ExprError> {
        let mut node = self.primary()?;
        loop {
            if self.eat(".") {
                match self.peek().cloned() {
                    Some(Token::Ident(name)) => {
                        self.pos += 1;
                        node = Node::Member(Box::new(node), name);
                    }
                    _ => return Err(self.error("expected field name after '.'")),
                }
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                node = Node::Index(Box::new(node), Box::new(index));
            } else {
                return Ok(node);
            }
        }
    }

    fn primary(&mut self) -> Result<Node, ExprError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Node::Literal(number(n).map_err(|_| self.error("bad number"))?)),
            Token::Str(s) => Ok(Node::Literal(Value::String(s))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                PARAM => Ok(Node::Param),
                _ if self.eat("(") => {
                    let args = self.list_items(")")?;
                    Ok(Node::Call(name, args))
                }
                _ => Err(ExprError::UnknownIdentifier(name)),
            },
            Token::Sym("(") => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Sym("[") => Ok(Node::List(self.list_items("]")?)),
            Token::Sym(sym) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected '{}'", sym)))
            }
        }
    }

    fn list_items(&mut self, close: &str) -> Result<Vec<Node>, ExprError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(",")?;
        }
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

/// A parsed expression, reusable across records.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    root: Node,
}

impl Expr {
    /// Parse an expression.
    pub fn parse(src: &str) -> Result<Self, ExprError> {
        if src.len() > MAX_SOURCE_LEN {
            return Err(ExprError::TooComplex);
        }
        let tokens = tokenize(src)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            end: src.len(),
        };
        let root = parser.expression()?;
        if parser.peek().is_some() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self { root })
    }

    /// Evaluate with `value` bound to `param`.
    pub fn eval(&self, param: &Value) -> Result<Value, ExprError> {
        eval(&self.root, param)
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(src: &str, param: &Value) -> Result<Value, ExprError> {
    Expr::parse(src)?.eval(param)
}

fn eval(node: &Node, param: &Value) -> Result<Value, ExprError> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Param => Ok(param.clone()),
        Node::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            let mut size = 1usize;
            for item in items {
                let v = eval(item, param)?;
                size = size.saturating_add(weight(&v));
                within_budget(size)?;
                out.push(v);
            }
            Ok(Value::Array(out))
        }
        Node::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, param)?))),
        Node::Neg(inner) => {
            let v = eval(inner, param)?;
            number(-require_number(&v, "-")?)
        }
        Node::And(a, b) => {
            let left = eval(a, param)?;
            if truthy(&left) { eval(b, param) } else { Ok(left) }
        }
        Node::Or(a, b) => {
            let left = eval(a, param)?;
            if truthy(&left) { Ok(left) } else { eval(b, param) }
        }
        Node::Conditional(cond, then, otherwise) => {
            if truthy(&eval(cond, param)?) {
                eval(then, param)
            } else {
                eval(otherwise, param)
            }
        }
        Node::Binary(op, a, b) => bounded(binary(*op, &eval(a, param)?, &eval(b, param)?)?),
        Node::Member(target, name) => Ok(member(&eval(target, param)?, name)),
        Node::Index(target, index) => Ok(index_value(&eval(target, param)?, &eval(index, param)?)),
        Node::Call(name, args) => {
            let args = args
                .iter()
                .map(|n| eval(n, param))
                .collect::<Result<Vec<_>, _>>()?;
            bounded(call(name, &args)?)
        }
    }
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, ExprError> {
    match op {
        BinOp::Add => {
            if a.is_string() || b.is_string() {
                let (left, right) = (value_to_string(a), value_to_string(b));
                within_budget(left.len().saturating_add(right.len()))?;
                Ok(Value::String(left + &right))
            } else {
                number(require_number(a, "+")? + require_number(b, "+")?)
            }
        }
        BinOp::Sub => number(require_number(a, "-")? - require_number(b, "-")?),
        BinOp::Mul => number(require_number(a, "*")? * require_number(b, "*")?),
        BinOp::Div | BinOp::Rem => {
            let divisor = require_number(b, "/")?;
            if divisor == 0.0 {
                return Err(ExprError::Type("division by zero".into()));
            }
            let dividend = require_number(a, "/")?;
            number(if op == BinOp::Div { dividend / divisor } else { dividend % divisor })
        }
        BinOp::Eq => Ok(Value::Bool(loose_eq(a, b))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(a, b))),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let Some(ord) = loose_cmp(a, b) else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinOp::Lt => ord == Ordering::Less,
                BinOp::Gt => ord == Ordering::Greater,
                BinOp::Le => ord != Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
    }
}

fn member(target: &Value, name: &str) -> Value {
    match (target, name) {
        (Value::Object(map), _) => map.get(name).cloned().unwrap_or(Value::Null),
        (Value::String(s), "length") => Value::from(s.chars().count()),
        (Value::Array(items), "length") => Value::from(items.len()),
        _ => Value::Null,
    }
}

fn index_value(target: &Value, index: &Value) -> Value {
    match target {
        Value::Array(items) => as_index(index)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        Value::String(s) => as_index(index)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        Value::Object(map) => map.get(&value_to_string(index)).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn as_index(v: &Value) -> Option<usize> {
    let n = to_number(v)?;
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn call(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let arity = |expected: &'static str, ok: bool| {
        if ok {
            Ok(())
        } else {
            Err(ExprError::Arity {
                name: name.to_string(),
                expected,
                got: args.len(),
            })
        }
    };
    let text = |i: usize| value_to_string(&args[i]);

    match name {
        "upper" => {
            arity("1", args.len() == 1)?;
            Ok(Value::String(text(0).to_uppercase()))
        }
        "lower" => {
            arity("1", args.len() == 1)?;
            Ok(Value::String(text(0).to_lowercase()))
        }
        "trim" => {
            arity("1", args.len() == 1)?;
            Ok(Value::String(text(0).trim().to_string()))
        }
        "len" => {
            arity("1", args.len() == 1)?;
            Ok(Value::from(match &args[0] {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                other => value_to_string(other).chars().count(),
            }))
        }
        "number" => {
            arity("1", args.len() == 1)?;
            number(require_number(&args[0], "number")?)
        }
        "string" => {
            arity("1", args.len() == 1)?;
            Ok(Value::String(text(0)))
        }
        "round" => {
            arity("1 or 2", matches!(args.len(), 1 | 2))?;
            let n = require_number(&args[0], "round")?;
            let digits = match args.get(1) {
                Some(d) => require_number(d, "round")?.clamp(0.0, 10.0) as i32,
                None => 0,
            };
            let factor = 10f64.powi(digits);
            number((n * factor).round() / factor)
        }
        "floor" | "ceil" | "abs" => {
            arity("1", args.len() == 1)?;
            let n = require_number(&args[0], name)?;
            number(match name {
                "floor" => n.floor(),
                "ceil" => n.ceil(),
                _ => n.abs(),
            })
        }
        "min" | "max" => {
            arity("at least 1", !args.is_empty())?;
            let mut best = require_number(&args[0], name)?;
            for arg in &args[1..] {
                let n = require_number(arg, name)?;
                best = if name == "min" { best.min(n) } else { best.max(n) };
            }
            number(best)
        }
        "contains" => {
            arity("2", args.len() == 2)?;
            Ok(Value::Bool(match &args[0] {
                Value::Array(items) => items.iter().any(|item| loose_eq(item, &args[1])),
                other => value_to_string(other).contains(&text(1)),
            }))
        }
        "starts_with" => {
            arity("2", args.len() == 2)?;
            Ok(Value::Bool(text(0).starts_with(&text(1))))
        }
        "ends_with" => {
            arity("2", args.len() == 2)?;
            Ok(Value::Bool(text(0).ends_with(&text(1))))
        }
        "replace" => {
            arity("3", args.len() == 3)?;
            let (s, from, to) = (text(0), text(1), text(2));
            if from.is_empty() {
                return Ok(Value::String(s));
            }
            let hits = s.matches(from.as_str()).count();
            within_budget(
                (s.len() - hits * from.len()).saturating_add(hits.saturating_mul(to.len())),
            )?;
            Ok(Value::String(s.replace(&from, &to)))
        }
        "substr" => {
            arity("2 or 3", matches!(args.len(), 2 | 3))?;
            let s = text(0);
            let start = require_number(&args[1], "substr")?.max(0.0) as usize;
            let chars = s.chars().skip(start);
            let out: String = match args.get(2) {
                Some(len) => chars.take(require_number(len, "substr")?.max(0.0) as usize).collect(),
                None => chars.collect(),
            };
            Ok(Value::String(out))
        }
        "split" => {
            arity("2", args.len() == 2)?;
            let sep = text(1);
            let s = text(0);
            let pieces = if sep.is_empty() {
                s.chars().count()
            } else {
                s.matches(sep.as_str()).count() + 1
            };
            within_budget(pieces.saturating_add(s.len()))?;
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
            };
            Ok(Value::Array(parts))
        }
        "join" => {
            arity("2", args.len() == 2)?;
            let sep = text(1);
            let parts: Vec<String> = match &args[0] {
                Value::Array(items) => items.iter().map(value_to_string).collect(),
                other => vec![value_to_string(other)],
            };
            let seps = parts.len().saturating_sub(1).saturating_mul(sep.len());
            within_budget(parts.iter().fold(seps, |acc, p| acc.saturating_add(p.len())))?;
            Ok(Value::String(parts.join(&sep)))
        }
        "concat" => {
            let parts: Vec<String> = args.iter().map(value_to_string).collect();
            within_budget(parts.iter().fold(0, |acc: usize, p| acc.saturating_add(p.len())))?;
            Ok(Value::String(parts.concat()))
        }
        "default" => {
            arity("2", args.len() == 2)?;
            let missing = args[0].is_null() || args[0].as_str() == Some("");
            Ok(if missing { args[1].clone() } else { args[0].clone() })
        }
        "if" => {
            arity("3", args.len() == 3)?;
            Ok(if truthy(&args[0]) { args[1].clone() } else { args[2].clone() })
        }
        "object" => {
            // object("k1", v1, "k2", v2, ...)
            arity("an even number of", args.len() % 2 == 0)?;
            within_budget(args.iter().fold(1, |acc: usize, v| acc.saturating_add(weight(v))))?;
            let mut map = Map::new();
            for pair in args.chunks(2) {
                map.insert(value_to_string(&pair[0]), pair[1].clone());
            }
            Ok(Value::Object(map))
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

/// Rough size of a value: bytes of text plus one per scalar, item and key.
pub fn weight(v: &Value) -> usize {
    match v {
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().fold(1, |acc: usize, item| acc.saturating_add(weight(item))),
        Value::Object(map) => map.iter().fold(1, |acc: usize, (key, item)| {
            acc.saturating_add(key.len()).saturating_add(weight(item))
        }),
        _ => 1,
    }
}

fn within_budget(size: usize) -> Result<(), ExprError> {
    if size > MAX_OUTPUT_LEN {
        Err(ExprError::TooComplex)
    } else {
        Ok(())
    }
}

fn bounded(v: Value) -> Result<Value, ExprError> {
    within_budget(weight(&v))?;
    Ok(v)
}

// ============================================================================
// COERCION (shared with the rule comparators)
// ============================================================================

/// JavaScript-style truthiness.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric view of a value: numbers, booleans, and text that parses as a
/// finite number after trimming.
pub fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parse trimmed text as a finite number.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Loose equality: null only equals null, numeric when both sides are
/// numeric, otherwise string equality of the display forms.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => value_to_string(a) == value_to_string(b),
        },
    }
}

/// Loose ordering: numeric when both sides are numeric, lexical otherwise.
/// `None` when either side is null.
pub fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (to_number(a), to_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(value_to_string(a).cmp(&value_to_string(b))),
    }
}

fn require_number(v: &Value, op: &str) -> Result<f64, ExprError> {
    to_number(v).ok_or_else(|| {
        ExprError::Type(format!("'{}' needs a number, got {}", op, describe(v)))
    })
}

fn describe(v: &Value) -> String {
    match v {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

/// Wrap a float as a JSON number; integral values become JSON integers.
fn number(n: f64) -> Result<Value, ExprError> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Type(format!("result {} is not a finite number", format_f64(n))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(src: &str, v: Value) -> Value {
        evaluate(src, &v).unwrap_or_else(|e| panic!("{}: {}", src, e))
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(ev("1 + 2 * 3", json!(null)), json!(7));
        assert_eq!(ev("(1 + 2) * 3", json!(null)), json!(9));
        assert_eq!(ev("value * 2", json!("21")), json!(42));
        assert_eq!(ev("value / 4", json!(10)), json!(2.5));
        assert_eq!(ev("-value + 1", json!(3)), json!(-2));
        assert_eq!(ev("7 % 4", json!(null)), json!(3));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(ev(r#""HP: " + value"#, json!(80)), json!("HP: 80"));
        assert_eq!(ev("value + '!'", json!("Ada")), json!("Ada!"));
    }

    #[test]
    fn conditionals_and_logic() {
        let src = r#"value >= 50 ? "strong" : "weak""#;
        assert_eq!(ev(src, json!("80")), json!("strong"));
        assert_eq!(ev(src, json!("20")), json!("weak"));
        assert_eq!(ev("value && 'yes' || 'no'", json!("")), json!("no"));
        assert_eq!(ev("!value", json!(0)), json!(true));
        assert_eq!(ev("value == 80", json!("80.0")), json!(true));
        assert_eq!(ev("value === 'x' ? 1 : 2", json!("x")), json!(1));
    }

    #[test]
    fn functions() {
        assert_eq!(ev("upper(value)", json!("fire")), json!("FIRE"));
        assert_eq!(ev("len(value)", json!(["a", "b"])), json!(2));
        assert_eq!(ev("round(value, 1)", json!(2.46)), json!(2.5));
        assert_eq!(ev("max(value, 10)", json!("3")), json!(10));
        assert_eq!(ev("join(split(value, '-'), ' / ')", json!("a-b")), json!("a / b"));
        assert_eq!(ev("replace(value, 'o', '0')", json!("foo")), json!("f00"));
        assert_eq!(ev("substr(value, 1, 2)", json!("hello")), json!("el"));
        assert_eq!(ev("default(value, 'none')", json!(null)), json!("none"));
        assert_eq!(ev("contains(value, 'air')", json!(["fire", "air"])), json!(true));
        assert_eq!(ev("if(value > 1, 'many', 'one')", json!(2)), json!("many"));
        assert_eq!(ev("object('a', value)", json!(1)), json!({"a": 1}));
    }

    #[test]
    fn object_pairs_keys_with_values() {
        assert_eq!(
            ev("object('name', upper(value), 2, len(value))", json!("orc")),
            json!({"name": "ORC", "2": 3})
        );
        assert_eq!(ev("object()", json!(null)), json!({}));
        assert!(matches!(evaluate("object('a')", &json!(1)), Err(ExprError::Arity { .. })));
    }

    #[test]
    fn member_and_index_access() {
        let v = json!({"stats": {"atk": 5}, "tags": ["x", "y"]});
        assert_eq!(ev("value.stats.atk + 1", v.clone()), json!(6));
        assert_eq!(ev("value.tags[1]", v.clone()), json!("y"));
        assert_eq!(ev("value.tags.length", v.clone()), json!(2));
        assert_eq!(ev("value.missing", v), json!(null));
    }

    #[test]
    fn errors_are_reported_not_panicked() {
        assert!(matches!(evaluate("value +", &json!(1)), Err(ExprError::Syntax { .. })));
        assert!(matches!(evaluate("record", &json!(1)), Err(ExprError::UnknownIdentifier(_))));
        assert!(matches!(evaluate("eval(value)", &json!(1)), Err(ExprError::UnknownFunction(_))));
        assert!(matches!(evaluate("upper()", &json!(1)), Err(ExprError::Arity { .. })));
        assert!(matches!(evaluate("value * 2", &json!("abc")), Err(ExprError::Type(_))));
        assert!(matches!(evaluate("1 / 0", &json!(null)), Err(ExprError::Type(_))));
        assert!(matches!(evaluate("'open", &json!(null)), Err(ExprError::Syntax { .. })));
        assert!(matches!(evaluate("1 2", &json!(null)), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&deep, &json!(null)), Err(ExprError::TooComplex));
        let long = "1+".repeat(MAX_SOURCE_LEN) + "1";
        assert_eq!(evaluate(&long, &json!(null)), Err(ExprError::TooComplex));
    }

    fn nested_replace(levels: usize) -> String {
        (0..levels).fold("value".to_string(), |inner, _| format!("replace({}, 'a', 'aa')", inner))
    }

    #[test]
    fn output_size_is_bounded() {
        // each level doubles the text
        assert_eq!(ev(&nested_replace(10), json!("a")), json!("a".repeat(1024)));
        assert_eq!(evaluate(&nested_replace(22), &json!("a")), Err(ExprError::TooComplex));

        let wide = format!("replace(value, 'a', '{}')", "b".repeat(4000));
        assert_eq!(evaluate(&wide, &json!("a".repeat(300))), Err(ExprError::TooComplex));

        let half = json!("x".repeat(MAX_OUTPUT_LEN / 2 + 1));
        assert_eq!(evaluate("concat(value, value)", &half), Err(ExprError::TooComplex));
        assert_eq!(evaluate("value + value", &half), Err(ExprError::TooComplex));
        assert_eq!(evaluate("[value, value]", &half), Err(ExprError::TooComplex));
        assert_eq!(evaluate("join([value, value], '')", &half), Err(ExprError::TooComplex));
        assert_eq!(
            evaluate("split(value, '')", &json!("x".repeat(MAX_OUTPUT_LEN))),
            Err(ExprError::TooComplex)
        );
    }

    #[test]
    fn loose_comparison_rules() {
        assert!(loose_eq(&json!("80"), &json!(80)));
        assert!(!loose_eq(&json!(null), &json!("")));
        assert_eq!(loose_cmp(&json!("9"), &json!("10")), Some(Ordering::Less));
        assert_eq!(loose_cmp(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(loose_cmp(&json!(null), &json!(1)), None);
    }
}

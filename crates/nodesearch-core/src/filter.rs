//! Filter grammar shared by the query builder and the index backends.
//!
//! ```text
//! expr    := or
//! or      := and ("OR" and)*
//! and     := not ("AND" not)*
//! not     := "NOT" not | primary
//! primary := "(" expr ")"
//!          | "_geoRadius" "(" lat "," lng "," meters ")"
//!          | field op value
//! op      := "=" | "!=" | "<" | "<=" | ">" | ">="
//! value   := quoted string (\" and \\ escapes) | bare word
//! ```
//!
//! Array fields match when any element matches.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::types::{fields, GeoPoint};

/// Quote a filter value, escaping backslashes and double quotes.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare { field: String, op: CompareOp, value: String },
    GeoRadius { center: GeoPoint, meters: f64 },
}

impl Filter {
    /// Parse one expression; blank input yields `None`.
    pub fn parse(expression: &str) -> Result<Option<Filter>> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Ok(None);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let filter = parser.or()?;
        if let Some(token) = parser.peek() {
            return Err(Error::InvalidFilter(format!("unexpected {token:?} in '{expression}'")));
        }
        Ok(Some(filter))
    }

    /// Parse a list of expressions and conjoin them.
    pub fn parse_all(expressions: &[String]) -> Result<Option<Filter>> {
        let mut parts = Vec::new();
        for expression in expressions {
            if let Some(filter) = Self::parse(expression)? {
                parts.push(filter);
            }
        }
        Ok(match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Filter::And(parts)),
        })
    }

    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|f| f.matches(document)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(document)),
            Filter::Not(inner) => !inner.matches(document),
            Filter::Compare { field, op: CompareOp::Ne, value } => {
                !lookup(document, field).is_some_and(|v| compare(v, CompareOp::Eq, value))
            }
            Filter::Compare { field, op, value } => lookup(document, field).is_some_and(|v| compare(v, *op, value)),
            Filter::GeoRadius { center, meters } => document
                .get(fields::GEO)
                .and_then(GeoPoint::from_value)
                .is_some_and(|p| p.distance_to(center) <= *meters),
        }
    }
}

/// Resolve `a.b.c` into nested objects.
pub fn lookup<'a>(document: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    if let Some(v) = document.get(field) {
        return Some(v);
    }
    let mut parts = field.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn compare(actual: &Value, op: CompareOp, expected: &str) -> bool {
    let ordering = match actual {
        Value::Array(items) => return items.iter().any(|item| compare(item, op, expected)),
        Value::String(s) => match (s.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) if op != CompareOp::Eq => a.partial_cmp(&b),
            _ => Some(s.as_str().cmp(expected)),
        },
        Value::Number(n) => match (n.as_f64(), expected.parse::<f64>()) {
            (Some(a), Ok(b)) => a.partial_cmp(&b),
            _ => None,
        },
        Value::Bool(b) => match expected {
            "true" => Some(b.cmp(&true)),
            "false" => Some(b.cmp(&false)),
            _ => None,
        },
        Value::Null | Value::Object(_) => None,
    };
    let Some(ordering) = ordering else { return false };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Op(CompareOp),
    And,
    Or,
    Not,
    Quoted(String),
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | '=' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    _ => Token::Op(CompareOp::Eq),
                });
            }
            '!' | '<' | '>' => {
                chars.next();
                let with_eq = chars.next_if_eq(&'=').is_some();
                let op = match (c, with_eq) {
                    ('!', true) => CompareOp::Ne,
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    ('>', true) => CompareOp::Ge,
                    _ => return Err(Error::InvalidFilter(format!("dangling '!' in '{input}'"))),
                };
                tokens.push(Token::Op(op));
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(Error::InvalidFilter(format!("unterminated string in '{input}'")));
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || "()=,!<>\"'".contains(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> { self.tokens.get(self.pos) }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.next() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(Error::InvalidFilter(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn or(&mut self) -> Result<Filter> {
        let mut parts = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            parts.push(self.and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Filter::Or(parts) })
    }

    fn and(&mut self) -> Result<Filter> {
        let mut parts = vec![self.not()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            parts.push(self.not()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Filter::And(parts) })
    }

    fn not(&mut self) -> Result<Filter> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Filter::Not(Box::new(self.not()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Filter> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(word)) if word == "_geoRadius" && self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let lat = self.number()?;
                self.expect(&Token::Comma)?;
                let lng = self.number()?;
                self.expect(&Token::Comma)?;
                let meters = self.number()?;
                self.expect(&Token::RParen)?;
                Ok(Filter::GeoRadius { center: GeoPoint { lat, lng }, meters })
            }
            Some(Token::Word(field)) | Some(Token::Quoted(field)) => {
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    other => return Err(Error::InvalidFilter(format!("expected operator after '{field}', found {other:?}"))),
                };
                let value = match self.next() {
                    Some(Token::Word(v)) | Some(Token::Quoted(v)) => v,
                    other => return Err(Error::InvalidFilter(format!("expected value for '{field}', found {other:?}"))),
                };
                Ok(Filter::Compare { field, op, value })
            }
            other => Err(Error::InvalidFilter(format!("unexpected {other:?}"))),
        }
    }

    fn number(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Word(w)) | Some(Token::Quoted(w)) => {
                w.parse().map_err(|_| Error::InvalidFilter(format!("'{w}' is not a number")))
            }
            other => Err(Error::InvalidFilter(format!("expected number, found {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
        let parsed = Filter::parse(&format!("title = {}", quote(r#"a" OR x = "y"#))).unwrap();
        assert_eq!(
            parsed,
            Some(Filter::Compare { field: "title".into(), op: CompareOp::Eq, value: r#"a" OR x = "y"#.into() })
        );
    }

    #[test]
    fn array_fields_match_any_element() {
        let d = doc(json!({"__parentPath": ["/sites", "/sites/home"], "__path": "/sites/home/about"}));
        let f = Filter::parse(r#"(__parentPath = "/sites/home" OR __path = "/sites/home")"#).unwrap().unwrap();
        assert!(f.matches(&d));
        let f = Filter::parse(r#"__parentPath = "/sites/other""#).unwrap().unwrap();
        assert!(!f.matches(&d));
    }

    #[test]
    fn numeric_and_negated_comparisons() {
        let d = doc(json!({"price": 12.5, "status": "draft"}));
        assert!(Filter::parse("price >= 12 AND price < 13").unwrap().unwrap().matches(&d));
        assert!(Filter::parse(r#"NOT status = "published""#).unwrap().unwrap().matches(&d));
        assert!(Filter::parse(r#"missing != "x""#).unwrap().unwrap().matches(&d));
    }

    #[test]
    fn geo_radius_uses_geo_field() {
        let d = doc(json!({"_geo": {"lat": 48.137, "lng": 11.575}}));
        assert!(Filter::parse("_geoRadius(48.14, 11.58, 1000)").unwrap().unwrap().matches(&d));
        assert!(!Filter::parse("_geoRadius(52.52, 13.40, 1000)").unwrap().unwrap().matches(&d));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(Filter::parse(r#"title = "open"#).is_err());
        assert!(Filter::parse("title").is_err());
        assert!(Filter::parse("(a = b").is_err());
        assert_eq!(Filter::parse("   ").unwrap(), None);
    }
}

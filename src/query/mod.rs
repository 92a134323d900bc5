//! The search language: `clause AND clause ...`, each clause either a
//! shortcut such as `camera:Canon` / `size:>5MB` or a raw
//! `category.key OP value` comparison.

pub mod executor;
pub mod lexer;
pub mod parser;

use serde::Serialize;

use crate::ingest::flatten::FieldKey;
pub use parser::QueryCompiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileColumn {
    Path,
    Size,
    Type,
}

impl FileColumn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "path" => Some(FileColumn::Path),
            "size" => Some(FileColumn::Size),
            "type" => Some(FileColumn::Type),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldRef {
    File(FileColumn),
    Meta(FieldKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    Ge,
    Le,
    Ne,
    Gt,
    Lt,
    Eq,
    Like,
    Contains,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Eq => "=",
            Operator::Like => "LIKE",
            Operator::Contains => "CONTAINS",
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Operator::Ge | Operator::Le | Operator::Gt | Operator::Lt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Literal {
    /// Bare numbers become numbers, `true/yes/false/no` booleans, anything
    /// else text with one layer of surrounding quotes removed.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(n) = raw.parse::<f64>() {
            if n.is_finite() && raw.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c)) {
                return Literal::Number(n);
            }
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" => return Literal::Bool(true),
            "false" | "no" => return Literal::Bool(false),
            _ => {}
        }
        Literal::Text(strip_quotes(raw).to_string())
    }

    /// The text form compared against stored values.
    pub fn canonical(&self) -> String {
        match self {
            Literal::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Literal::Number(n) => n.to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Text(s) => s.clone(),
        }
    }
}

pub(crate) fn strip_quotes(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub field: FieldRef,
    pub op: Operator,
    pub literal: Literal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub predicates: Vec<Predicate>,
    /// Clauses seen in the query text, parsed or not.
    pub clauses: usize,
}

impl CompiledQuery {
    pub fn dropped(&self) -> usize {
        self.clauses - self.predicates.len()
    }
}

//! Tagged result values produced by evaluation.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use sqexport_core::Expr;

use crate::dist::Dist;
use crate::scope::Scope;

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Dist(Dist),
    /// Entries keep insertion order.
    Record(IndexMap<String, Value>),
    Array(Vec<Value>),
    Lambda(Rc<Lambda>),
    /// Result of a unit with no statements.
    Void,
}

/// A user-defined function closed over the scope it was created in.
#[derive(Debug)]
pub struct Lambda {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub(crate) body: Expr,
    pub(crate) captured: Rc<Scope>,
}

impl Value {
    /// Engine tag name, as reported to consumers of results.
    pub fn tag(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Bool(_) => "Boolean",
            Value::Dist(_) => "Dist",
            Value::Record(_) => "Record",
            Value::Array(_) => "Array",
            Value::Lambda(_) => "Lambda",
            Value::Void => "Void",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Dist> for Value {
    fn from(d: Dist) -> Self {
        Value::Dist(d)
    }
}

/// Short human-readable rendering, used in diagnostics.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Dist(d) => write!(f, "Dist(mean={})", d.mean()),
            Value::Record(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Lambda(l) => write!(f, "lambda({})", l.params.join(", ")),
            Value::Void => write!(f, "()"),
        }
    }
}

use std::fmt;

use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A constant literal embeddable in a scalar expression.
///
/// This is the value algebra of the source data model: untyped,
/// structurally nested, with maps keyed by arbitrary values. The core never
/// evaluates expressions, so this type carries no arithmetic of its own; it
/// only needs structural equality and ordering so that constructed trees
/// compare structurally.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Dec(Decimal),
    Str(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Returns the string content if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Dec(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(vs) => write!(f, "[{}]", vs.iter().join(", ")),
            Value::Map(kvs) => write!(
                f,
                "{{{}}}",
                kvs.iter().map(|(k, v)| format!("{}: {}", k, v)).join(", ")
            ),
        }
    }
}

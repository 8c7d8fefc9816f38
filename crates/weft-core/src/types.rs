//! Serializable literals and source locations carried by execution nodes.
//!
//! [`Literal`] is the compile-time counterpart of the runtime
//! [`Value`]: only scalars can appear as literal payloads, composite
//! literals are `ListLiteral`/`MapLiteral` nodes with element children.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A scalar constant embedded in the execution graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::None => Value::None,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::from(s.as_str()),
        }
    }

    /// The inverse of [`to_value`](Self::to_value) for scalar values.
    pub fn from_value(value: &Value) -> Option<Literal> {
        match value {
            Value::None => Some(Literal::None),
            Value::Bool(b) => Some(Literal::Bool(*b)),
            Value::Int(i) => Some(Literal::Int(*i)),
            Value::Float(f) => Some(Literal::Float(*f)),
            Value::Str(s) => Some(Literal::Str(s.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Int(i64::from(i))
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<f64> for Literal {
    fn from(x: f64) -> Self {
        Literal::Float(x)
    }
}

/// Where a node came from in the (out-of-scope) source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_value_roundtrip() {
        for lit in [
            Literal::None,
            Literal::Bool(true),
            Literal::Int(-4),
            Literal::Float(2.5),
            Literal::Str("hi".into()),
        ] {
            assert_eq!(Literal::from_value(&lit.to_value()), Some(lit.clone()));
        }
        assert_eq!(Literal::from_value(&Value::list([])), None);
    }

    #[test]
    fn serde_roundtrip_literal() {
        let lit = Literal::Str("x".into());
        let json = serde_json::to_string(&lit).unwrap();
        assert_eq!(json, r#"{"str":"x"}"#);
        let back: Literal = serde_json::from_str(&json).unwrap();
        assert_eq!(lit, back);
    }

    #[test]
    fn location_display() {
        assert_eq!(SourceLocation::new(3, 14).to_string(), "3:14");
    }
}

//! Expression runtime values

use std::collections::HashMap;
use std::fmt;

/// Value produced by evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// String value
    Str(String),
    /// String-to-string map (the `environ` accessor)
    Map(HashMap<String, String>),
}

impl Value {
    /// Get the type name of this value, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Map(_) => "map",
        }
    }

    /// The boolean content, if this is a boolean.
    ///
    /// Conditional gates and build scripts only accept `Bool(true)`; no
    /// other value is treated as truthy.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Printing coercion used by `{{ ... }}` interpolation
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Map(m) => {
                // Deterministic order so interpolations are stable
                let mut keys: Vec<_> = m.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}={}", m[*key])?;
                }
                write!(f, "}}")
            }
        }
    }
}

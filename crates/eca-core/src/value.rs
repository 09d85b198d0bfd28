//! Payload value model
//!
//! Event payloads and service-call data are maps of `Value`. The engine
//! never interprets these beyond passing them through to the Service
//! collaborator, but keeping them as a closed union (rather than arbitrary
//! JSON) keeps the collaborator boundary type-safe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A payload value: number, string, bool, or nested map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Absent/null value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Numeric value (all numbers are f64)
    Number(f64),
    /// String value
    String(String),
    /// Nested map of values
    Map(HashMap<String, Value>),
}

impl Value {
    /// Get as f64 if numeric
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as &str if a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get as bool if boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Number(1.5).as_number(), Some(1.5));
        assert_eq!(Value::String("x".into()).as_str(), Some("x"));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::Number(1.0).as_str(), None);
    }

    #[test]
    fn test_value_deserialize_untagged() {
        let v: Value = serde_json::from_str("42.5").unwrap();
        assert_eq!(v, Value::Number(42.5));

        let v: Value = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(v, Value::String("hello".to_string()));

        let v: Value = serde_json::from_str(r#"{"nested": true}"#).unwrap();
        if let Value::Map(m) = v {
            assert_eq!(m.get("nested"), Some(&Value::Bool(true)));
        } else {
            panic!("Expected map value");
        }
    }
}

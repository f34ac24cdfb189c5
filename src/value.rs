//! The tagged value union carried by Keyvals, Defaults and Documentation

use std::fmt;

use crate::error::{Error, Result};

/// The declared type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// UTF-8 string
    String,
    /// Signed 64-bit integer
    Integer,
    /// IEEE-754 double
    Float,
    /// Boolean
    Boolean,
    /// Symbolic token drawn from an enum-restriction whitelist
    Enum,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "String"),
            ValueType::Integer => write!(f, "Integer"),
            ValueType::Float => write!(f, "Float"),
            ValueType::Boolean => write!(f, "Boolean"),
            ValueType::Enum => write!(f, "Enum"),
        }
    }
}

/// A tagged union carrying exactly one of string, integer, float, boolean or enum-token.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string value
    String(String),
    /// Signed 64-bit integer value
    Integer(i64),
    /// IEEE-754 double value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Symbolic enum token value
    Enum(String),
}

impl Value {
    /// The declared type this value carries.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Enum(_) => ValueType::Enum,
        }
    }

    fn type_mismatch(&self, expected: ValueType) -> Error {
        Error::WrongValueType {
            expected: expected.to_string(),
            actual: self.value_type().to_string(),
        }
    }

    /// Borrow the string payload. Fails with `WrongValueType` unless this is a `String`.
    pub fn as_string(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(self.type_mismatch(ValueType::String)),
        }
    }

    /// Read the integer payload. Fails with `WrongValueType` unless this is an `Integer`.
    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(v) => Ok(*v),
            _ => Err(self.type_mismatch(ValueType::Integer)),
        }
    }

    /// Read the float payload. Fails with `WrongValueType` unless this is a `Float`.
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            _ => Err(self.type_mismatch(ValueType::Float)),
        }
    }

    /// Read the boolean payload. Fails with `WrongValueType` unless this is a `Boolean`.
    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Value::Boolean(v) => Ok(*v),
            _ => Err(self.type_mismatch(ValueType::Boolean)),
        }
    }

    /// Borrow the enum token payload. Fails with `WrongValueType` unless this is an `Enum`.
    pub fn as_enum(&self) -> Result<&str> {
        match self {
            Value::Enum(s) => Ok(s),
            _ => Err(self.type_mismatch(ValueType::Enum)),
        }
    }

    /// Numeric projection used by exclusive-value restrictions; works for `Integer` and `Float`.
    pub fn as_numeric(&self) -> Result<f64> {
        match self {
            Value::Integer(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v),
            _ => Err(self.type_mismatch(ValueType::Float)),
        }
    }

    /// Canonical string formatting, as produced by `get_default`/`get_value_string`.
    pub fn format(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Boolean(v) => v.to_string(),
            Value::Enum(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_matches_variant() {
        assert_eq!(Value::String("x".into()).value_type(), ValueType::String);
        assert_eq!(Value::Integer(1).value_type(), ValueType::Integer);
        assert_eq!(Value::Float(1.0).value_type(), ValueType::Float);
        assert_eq!(Value::Boolean(true).value_type(), ValueType::Boolean);
        assert_eq!(Value::Enum("a".into()).value_type(), ValueType::Enum);
    }

    #[test]
    fn test_accessor_mismatch_is_wrong_value_type() {
        let v = Value::Boolean(true);
        let err = v.as_integer().unwrap_err();
        match err {
            Error::WrongValueType { expected, actual } => {
                assert_eq!(expected, "Integer");
                assert_eq!(actual, "Boolean");
            }
            _ => panic!("expected WrongValueType"),
        }
    }

    #[test]
    fn test_numeric_projection() {
        assert_eq!(Value::Integer(7).as_numeric().unwrap(), 7.0);
        assert_eq!(Value::Float(7.5).as_numeric().unwrap(), 7.5);
        assert!(Value::String("x".into()).as_numeric().is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(Value::Integer(42).format(), "42");
        assert_eq!(Value::Boolean(true).format(), "true");
        assert_eq!(Value::Enum("high".into()).format(), "high");
    }
}

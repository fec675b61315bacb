//! Runtime values and the bytecode artifact produced by code generation.

pub mod chunk;
pub mod disassemble;
pub mod module;
pub mod native;

use std::fmt;
use std::rc::Rc;

#[derive(Clone, PartialEq, PartialOrd)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
}

impl Value {
    /// The numeric value as a `Float`, widening an `Int`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(val) => Some(*val as f64),
            Self::Float(val) => Some(*val),
            _ => None,
        }
    }

    /// Name of the value's type, used in runtime error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Bool",
            Value::Str(_) => "String",
        }
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Self {
        Value::Str(Rc::from(string))
    }
}

impl From<String> for Value {
    fn from(string: String) -> Self {
        Value::Str(Rc::from(string))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(val) => write!(f, "{}", val),
            // integral floats keep a trailing `.0`
            Value::Float(val) if val.is_finite() && val.fract() == 0.0 => write!(f, "{:.1}", val),
            Value::Float(val) => write!(f, "{}", val),
            Value::Bool(val) => write!(f, "{}", val),
            Value::Str(val) => write!(f, "{}", val),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(val) => write!(f, "{:?}", val),
            _ => fmt::Display::fmt(self, f),
        }
    }
}

pub type ValueArray = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Float(7.0).to_string(), "7.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(format!("{:?}", Value::from("hi")), "\"hi\"");
    }

    #[test]
    fn test_as_float() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(0.5).as_float(), Some(0.5));
        assert_eq!(Value::Bool(true).as_float(), None);
    }
}

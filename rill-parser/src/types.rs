//! The closed set of types an expression can have.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    Function { params: Vec<Type>, ret: Box<Type> },
    /// Sentinel for an already diagnosed failure. Absorbs every rule it flows into.
    Error,
}

impl Type {
    /// Resolves a type name as written in source code.
    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "Int" => Some(Type::Int),
            "Float" => Some(Type::Float),
            "Bool" => Some(Type::Bool),
            "String" => Some(Type::String),
            "Void" => Some(Type::Void),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// Returns `true` if a value of type `from` can be stored where `self` is expected.
    /// Exact matches and `Int` to `Float` widening are allowed. `Error` is assignable both ways.
    pub fn is_assignable_from(&self, from: &Type) -> bool {
        match (self, from) {
            (Type::Error, _) | (_, Type::Error) => true,
            (Type::Float, Type::Int) => true,
            (to, from) => to == from,
        }
    }

    /// Returns `true` if storing `from` into `self` needs an `Int` to `Float` conversion.
    pub fn needs_widening_from(&self, from: &Type) -> bool {
        matches!((self, from), (Type::Float, Type::Int))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::Void => write!(f, "Void"),
            Type::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::Error => write!(f, "<error>"),
        }
    }
}

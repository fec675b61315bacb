//! Native (builtin) functions callable from Rill code.

use crate::Value;
use derive_more::{Display, Error, From};
use rill_parser::types::Type;
use std::io::{self, Write};

#[derive(Debug, Display, Error, From)]
pub enum NativeError {
    #[display("I/O error: {_0}")]
    Io(#[error(source)] io::Error),
    #[from(ignore)]
    #[display("invalid argument of type {found} for {native}()")]
    BadArgument {
        native: &'static str,
        found: &'static str,
    },
}

/// The builtin functions. The discriminant is the index used by `call_native`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Native {
    /// `print(String) -> Void`: writes the string and a newline.
    Print = 0,
    /// `len(String) -> Int`: length in characters.
    Len = 1,
    /// `str(Int) -> String`
    Str = 2,
    /// `str_float(Float) -> String`: integral values keep a trailing `.0`.
    StrFloat = 3,
    /// `str_bool(Bool) -> String`
    StrBool = 4,
}

impl Native {
    pub const ALL: [Native; 5] = [
        Native::Print,
        Native::Len,
        Native::Str,
        Native::StrFloat,
        Native::StrBool,
    ];

    pub fn from_index(index: u8) -> Option<Native> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Native::Print => "print",
            Native::Len => "len",
            Native::Str => "str",
            Native::StrFloat => "str_float",
            Native::StrBool => "str_bool",
        }
    }

    pub fn arity(self) -> u8 {
        1
    }

    /// The function type used by semantic analysis.
    pub fn ty(self) -> Type {
        let (params, ret) = match self {
            Native::Print => (vec![Type::String], Type::Void),
            Native::Len => (vec![Type::String], Type::Int),
            Native::Str => (vec![Type::Int], Type::String),
            Native::StrFloat => (vec![Type::Float], Type::String),
            Native::StrBool => (vec![Type::Bool], Type::String),
        };
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }

    /// Runs the native with `args`. Returns `None` for `Void` natives.
    pub fn call(self, args: &[Value], out: &mut dyn Write) -> Result<Option<Value>, NativeError> {
        let bad_argument = |found: &Value| NativeError::BadArgument {
            native: self.name(),
            found: found.type_name(),
        };
        match (self, args) {
            (Native::Print, [Value::Str(string)]) => {
                writeln!(out, "{}", string)?;
                Ok(None)
            }
            (Native::Len, [Value::Str(string)]) => {
                Ok(Some(Value::Int(string.chars().count() as i64)))
            }
            (Native::Str, [Value::Int(value)]) => Ok(Some(Value::from(value.to_string()))),
            (Native::StrFloat, [value @ Value::Float(_)]) => Ok(Some(Value::from(value.to_string()))),
            (Native::StrBool, [Value::Bool(value)]) => Ok(Some(Value::from(value.to_string()))),
            (_, [arg]) => Err(bad_argument(arg)),
            // arity is checked by the caller
            _ => unreachable!("native {} called with {} arguments", self.name(), args.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natives() {
        let mut out = Vec::new();
        assert!(Native::Print
            .call(&[Value::from("hello")], &mut out)
            .unwrap()
            .is_none());
        assert_eq!(String::from_utf8(out).unwrap(), "hello\n");

        let mut sink = io::sink();
        assert_eq!(
            Native::Len.call(&[Value::from("héllo")], &mut sink).unwrap(),
            Some(Value::Int(5))
        );
        assert_eq!(
            Native::Str.call(&[Value::Int(-42)], &mut sink).unwrap(),
            Some(Value::from("-42"))
        );
        assert_eq!(
            Native::StrFloat.call(&[Value::Float(2.0)], &mut sink).unwrap(),
            Some(Value::from("2.0"))
        );
        assert_eq!(
            Native::StrFloat.call(&[Value::Float(-0.25)], &mut sink).unwrap(),
            Some(Value::from("-0.25"))
        );
        assert_eq!(
            Native::StrBool.call(&[Value::Bool(false)], &mut sink).unwrap(),
            Some(Value::from("false"))
        );
    }

    #[test]
    fn test_bad_argument() {
        let err = Native::Len
            .call(&[Value::Int(1)], &mut io::sink())
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid argument of type Int for len()");
    }

    #[test]
    fn test_indices() {
        for native in Native::ALL {
            assert_eq!(Native::from_index(native.index()), Some(native));
        }
        assert_eq!(Native::from_index(5), None);
        assert_eq!(Native::StrFloat.ty().to_string(), "fn(Float) -> String");
        assert_eq!(Native::Print.ty().to_string(), "fn(String) -> Void");
    }
}

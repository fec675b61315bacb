//! The compiled artifact: a script function plus the functions it can call.

use crate::chunk::Chunk;
use std::fmt;

/// A compiled function. Arguments occupy local slots `0..arity`.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arity: u8,
    pub chunk: Chunk,
}

impl Function {
    pub fn new(name: impl ToString, arity: u8) -> Self {
        let name = name.to_string();
        Self {
            chunk: Chunk::new(name.clone()),
            name,
            arity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Top-level statements. Executed by the VM as the entry point.
    pub script: Function,
    /// Functions addressed by index from `call` instructions.
    pub functions: Vec<Function>,
    /// Number of global variable slots.
    pub globals: u16,
}

impl Module {
    pub fn function(&self, index: u16) -> Option<&Function> {
        self.functions.get(index as usize)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".globals {}", self.globals)?;
        write!(f, "{}", self.script.chunk)?;
        for func in &self.functions {
            write!(f, "{}", func.chunk)?;
        }
        Ok(())
    }
}

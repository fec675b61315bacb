//! Bytecode generation and execution.

pub mod codegen;
pub mod vm;

pub use codegen::{CodeGenerator, CodegenError, CompileOptions};
pub use vm::{RuntimeError, Vm};

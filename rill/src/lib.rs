//! The Rill compiler pipeline: parsing, semantic analysis, code generation and execution.
//!
//! Every phase reports user-facing problems as diagnostics on the [`Source`]. [`Error`] only
//! signals that the pipeline stopped.

use derive_more::{Display, Error, From};
use rill_parser::ast::Program;
use rill_passes::analyze::SemanticAnalyzer;
use rill_passes::scope::SymbolTable;
use rill_source::Source;
use rill_value::module::Module;
use rill_vm::{CodeGenerator, CodegenError, RuntimeError, Vm};
use std::io::{self, Write};
use std::path::PathBuf;

pub use rill_vm::CompileOptions;

#[derive(Debug, Display, Error, From)]
pub enum Error {
    #[from(ignore)]
    #[display("cannot read '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[from(ignore)]
    #[display("cannot write '{}': {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    /// Error diagnostics were reported. They are stored on the [`Source`].
    #[from(ignore)]
    #[display("compilation failed with {errors} error(s)")]
    Compile { errors: usize },
    #[display("{_0}")]
    Codegen(#[error(source)] CodegenError),
    #[display("{_0}")]
    Runtime(#[error(source)] RuntimeError),
}

/// Parses and analyzes `source`. The returned tree is fully annotated if `source` has no errors.
pub fn check(source: &Source) -> (Program, SymbolTable) {
    let mut program = rill_parser::parse(source);
    let symbols = SemanticAnalyzer::new(source).analyze(&mut program);
    tracing::debug!(
        errors = source.diagnostics.error_count(),
        warnings = source.diagnostics.len() - source.diagnostics.error_count(),
        "checked {}",
        source.name
    );
    (program, symbols)
}

/// Runs every phase up to code generation.
/// Code generation is skipped when an earlier phase reported an error.
pub fn compile(source: &Source, options: CompileOptions) -> Result<Module, Error> {
    let _span = tracing::debug_span!("compile", name = %source.name).entered();

    let (program, symbols) = check(source);
    let errors = source.diagnostics.error_count();
    if errors > 0 {
        return Err(Error::Compile { errors });
    }
    Ok(CodeGenerator::new(source, &symbols, options).generate(&program)?)
}

/// Compiles and runs `source`. Output of `print` goes to `out`.
pub fn interpret(source: &Source, options: CompileOptions, out: &mut dyn Write) -> Result<(), Error> {
    let module = compile(source, options)?;
    let _span = tracing::debug_span!("run", name = %source.name).entered();
    Vm::interpret(&module, out)?;
    Ok(())
}

//! Front end of the Rill compiler: lexer, AST, parser and source printer.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod types;
pub mod visitor;

use rill_source::Source;

/// Parses `source` into a [`ast::Program`]. Lexical and syntax errors are reported to the source
/// diagnostics; the returned tree contains error markers where parsing failed.
pub fn parse(source: &Source) -> ast::Program {
    parser::Parser::new(source).parse_program()
}

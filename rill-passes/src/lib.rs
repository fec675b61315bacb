//! Semantic passes over the AST.

pub mod analyze;
pub mod scope;

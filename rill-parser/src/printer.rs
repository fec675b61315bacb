//! Source printer for the AST.
//!
//! The output is valid source code that parses back to a structurally equal tree: parentheses are
//! inserted only where precedence or associativity requires them.
//!
//! ```text
//! fn add(a: Int, b: Int) -> Int {
//!     return a + b * 2;
//! }
//! ```

use crate::ast::{Expr, ExprKind, FnDecl, Literal, Program, Stmt, StmtKind, VarDecl};
use std::fmt::{self, Write};

const INDENT: &str = "    ";

/// Precedence of assignment.
const ASSIGN_PREC: u8 = 1;
/// Precedence of prefix operators.
const PREFIX_PREC: u8 = 8;
/// Precedence of calls and atoms.
const POSTFIX_PREC: u8 = 9;

/// Printer state: output buffer and current indentation level.
pub struct PrintState {
    pub output: String,
    pub indent: usize,
}

impl PrintState {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    pub fn print_program(&mut self, program: &Program) -> fmt::Result {
        for item in &program.items {
            self.print_stmt(item)?;
        }
        Ok(())
    }

    /// Prints `stmt` on its own line(s) at the current indentation.
    pub fn print_stmt(&mut self, stmt: &Stmt) -> fmt::Result {
        self.write_indent()?;
        self.print_stmt_inline(stmt)?;
        writeln!(self.output)
    }

    fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.indent {
            self.output.write_str(INDENT)?;
        }
        Ok(())
    }

    /// Prints `stmt` starting at the cursor, without a trailing newline.
    fn print_stmt_inline(&mut self, stmt: &Stmt) -> fmt::Result {
        match &stmt.kind {
            StmtKind::FnDecl(FnDecl {
                name,
                params,
                return_type,
                body,
                ..
            }) => {
                write!(self.output, "fn {}(", name)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        self.output.write_str(", ")?;
                    }
                    write!(self.output, "{}: {}", param.name, param.ty.name)?;
                }
                self.output.write_str(")")?;
                if let Some(ty) = return_type {
                    write!(self.output, " -> {}", ty.name)?;
                }
                self.output.write_str(" ")?;
                self.print_block(body)
            }
            StmtKind::VarDecl(VarDecl {
                name,
                declared_type,
                initializer,
                ..
            }) => {
                write!(self.output, "let {}", name)?;
                if let Some(ty) = declared_type {
                    write!(self.output, ": {}", ty.name)?;
                }
                if let Some(initializer) = initializer {
                    self.output.write_str(" = ")?;
                    self.print_expr(initializer, 0)?;
                }
                self.output.write_str(";")
            }
            StmtKind::Block(body) => self.print_block(body),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.output.write_str("if (")?;
                self.print_expr(condition, 0)?;
                self.output.write_str(") ")?;
                self.print_stmt_inline(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.output.write_str(" else ")?;
                    self.print_stmt_inline(else_branch)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                self.output.write_str("while (")?;
                self.print_expr(condition, 0)?;
                self.output.write_str(") ")?;
                self.print_stmt_inline(body)
            }
            StmtKind::Return(value) => {
                self.output.write_str("return")?;
                if let Some(value) = value {
                    self.output.write_str(" ")?;
                    self.print_expr(value, 0)?;
                }
                self.output.write_str(";")
            }
            StmtKind::Expr(expr) => {
                self.print_expr(expr, 0)?;
                self.output.write_str(";")
            }
            StmtKind::Error => self.output.write_str("<error>;"),
        }
    }

    fn print_block(&mut self, body: &[Stmt]) -> fmt::Result {
        writeln!(self.output, "{{")?;
        self.indent += 1;
        for stmt in body {
            self.print_stmt(stmt)?;
        }
        self.indent -= 1;
        self.write_indent()?;
        self.output.write_str("}")
    }

    /// Prints `expr`, parenthesized if it binds looser than `min_prec`.
    pub fn print_expr(&mut self, expr: &Expr, min_prec: u8) -> fmt::Result {
        let prec = expr_precedence(expr);
        let parens = prec < min_prec;
        if parens {
            self.output.write_str("(")?;
        }

        match &expr.kind {
            ExprKind::Literal(literal) => self.print_literal(literal)?,
            ExprKind::Identifier(ident) => self.output.write_str(&ident.name)?,
            ExprKind::Assign { target, value } => {
                write!(self.output, "{} = ", target.name)?;
                // right associative
                self.print_expr(value, ASSIGN_PREC)?;
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (lhs_prec, rhs_prec) = if op.is_non_associative() {
                    (prec + 1, prec + 1)
                } else {
                    (prec, prec + 1)
                };
                self.print_expr(lhs, lhs_prec)?;
                write!(self.output, " {} ", op)?;
                self.print_expr(rhs, rhs_prec)?;
            }
            ExprKind::Unary { op, operand } => {
                write!(self.output, "{}", op)?;
                self.print_expr(operand, PREFIX_PREC)?;
            }
            ExprKind::Call { callee, args } => {
                self.print_expr(callee, POSTFIX_PREC)?;
                self.output.write_str("(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.output.write_str(", ")?;
                    }
                    self.print_expr(arg, 0)?;
                }
                self.output.write_str(")")?;
            }
            ExprKind::Error => self.output.write_str("<error>")?,
        }

        if parens {
            self.output.write_str(")")?;
        }
        Ok(())
    }

    fn print_literal(&mut self, literal: &Literal) -> fmt::Result {
        match literal {
            Literal::Int(value) => write!(self.output, "{}", value),
            Literal::Float(value) => {
                let text = value.to_string();
                if text.contains('.') {
                    self.output.write_str(&text)
                } else {
                    write!(self.output, "{}.0", text)
                }
            }
            Literal::Bool(value) => write!(self.output, "{}", value),
            Literal::Str(value) => {
                self.output.write_char('"')?;
                for c in value.chars() {
                    match c {
                        '\n' => self.output.write_str("\\n")?,
                        '\t' => self.output.write_str("\\t")?,
                        '\r' => self.output.write_str("\\r")?,
                        '\0' => self.output.write_str("\\0")?,
                        '\\' => self.output.write_str("\\\\")?,
                        '"' => self.output.write_str("\\\"")?,
                        c => self.output.write_char(c)?,
                    }
                }
                self.output.write_char('"')
            }
        }
    }
}

impl Default for PrintState {
    fn default() -> Self {
        Self::new()
    }
}

fn expr_precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } => ASSIGN_PREC,
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } => PREFIX_PREC,
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Call { .. } | ExprKind::Error => {
            POSTFIX_PREC
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = PrintState::new();
        state.print_program(self)?;
        f.write_str(&state.finish())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = PrintState::new();
        state.print_expr(self, 0)?;
        f.write_str(&state.finish())
    }
}

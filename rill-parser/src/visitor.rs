//! Visitor pattern for AST nodes.

use crate::ast::{Expr, ExprKind, FnDecl, Program, Stmt, StmtKind, VarDecl};

pub trait Visitor<'ast>: Sized {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        walk_expr(self, expr);
    }
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        walk_stmt(self, stmt);
    }
}

pub fn walk_program<'ast>(visitor: &mut impl Visitor<'ast>, program: &'ast Program) {
    for stmt in &program.items {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_expr<'ast>(visitor: &mut impl Visitor<'ast>, expr: &'ast Expr) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Identifier(_) => {}
        ExprKind::Assign { target: _, value } => visitor.visit_expr(value),
        ExprKind::Binary { op: _, lhs, rhs } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        ExprKind::Unary { op: _, operand } => visitor.visit_expr(operand),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr(callee);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Error => {}
    }
}

pub fn walk_stmt<'ast>(visitor: &mut impl Visitor<'ast>, stmt: &'ast Stmt) {
    /// Iteratively visit all statements in a `Vec<Stmt>`.
    macro_rules! visit_stmt_list {
        ($visitor: expr, $body: expr) => {
            for stmt in $body {
                Visitor::visit_stmt($visitor, stmt);
            }
        };
    }

    match &stmt.kind {
        StmtKind::VarDecl(VarDecl { initializer, .. }) => {
            if let Some(initializer) = initializer {
                visitor.visit_expr(initializer);
            }
        }
        StmtKind::FnDecl(FnDecl { body, .. }) => visit_stmt_list!(visitor, body),
        StmtKind::Block(body) => visit_stmt_list!(visitor, body),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(body);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::Error => {}
    }
}

/// Mutable counterpart of [`Visitor`].
pub trait VisitorMut: Sized {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }
    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }
}

pub fn walk_expr_mut(visitor: &mut impl VisitorMut, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Error => {}
        ExprKind::Assign { target: _, value } => visitor.visit_expr_mut(value),
        ExprKind::Binary { op: _, lhs, rhs } => {
            visitor.visit_expr_mut(lhs);
            visitor.visit_expr_mut(rhs);
        }
        ExprKind::Unary { op: _, operand } => visitor.visit_expr_mut(operand),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr_mut(callee);
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
    }
}

pub fn walk_stmt_mut(visitor: &mut impl VisitorMut, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::VarDecl(VarDecl { initializer, .. }) => {
            if let Some(initializer) = initializer {
                visitor.visit_expr_mut(initializer);
            }
        }
        StmtKind::FnDecl(FnDecl { body, .. }) | StmtKind::Block(body) => {
            for stmt in body {
                visitor.visit_stmt_mut(stmt);
            }
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr_mut(condition);
            visitor.visit_stmt_mut(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt_mut(else_branch);
            }
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr_mut(condition);
            visitor.visit_stmt_mut(body);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr_mut(value);
            }
        }
        StmtKind::Expr(expr) => visitor.visit_expr_mut(expr),
        StmtKind::Error => {}
    }
}

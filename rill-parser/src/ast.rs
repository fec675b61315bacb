//! Abstract syntax tree.
//!
//! Every node owns its children and carries its [`Span`]. The `ty` and `symbol` slots are empty
//! after parsing and are filled in place by semantic analysis.

use crate::types::Type;
use derive_more::Display;
use rill_source::Span;

/// Index of a symbol in the symbol table built by semantic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    FnDecl(FnDecl),
    VarDecl(VarDecl),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Expr(Expr),
    /// Marks a declaration that could not be parsed.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    /// `None` means `Void`.
    pub return_type: Option<TypeName>,
    pub body: Vec<Stmt>,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub span: Span,
    pub ty: TypeName,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub name_span: Span,
    pub declared_type: Option<TypeName>,
    pub initializer: Option<Expr>,
    pub symbol: Option<SymbolId>,
}

/// A type as written in the source (e.g. `Int`). Resolved during semantic analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Filled in by semantic analysis.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn error(span: Span) -> Self {
        Self::new(ExprKind::Error, span)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ExprKind::Error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// An identifier (e.g. `foo`).
    Identifier(Ident),
    /// An assignment (e.g. `a = 1`). The target is always a plain identifier.
    Assign {
        target: Ident,
        value: Box<Expr>,
    },
    /// A binary expression (e.g. `1+1`).
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Marks an expression that could not be parsed.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
    pub symbol: Option<SymbolId>,
}

impl Ident {
    pub fn new(name: impl ToString, span: Span) -> Self {
        Self {
            name: name.to_string(),
            span,
            symbol: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Literal {
    /// Literal types are intrinsic.
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Bool(_) => Type::Bool,
            Literal::Str(_) => Type::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Rem,
    #[display("==")]
    Eq,
    #[display("!=")]
    NotEq,
    #[display("<")]
    Less,
    #[display("<=")]
    LessEq,
    #[display(">")]
    Greater,
    #[display(">=")]
    GreaterEq,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
}

impl BinaryOp {
    /// Precedence level, higher binds tighter. Assignment is level `1`, prefix operators level `8`.
    pub fn precedence(self) -> u8 {
        use BinaryOp::*;
        match self {
            Or => 2,
            And => 3,
            Eq | NotEq => 4,
            Less | LessEq | Greater | GreaterEq => 5,
            Add | Sub => 6,
            Mul | Div | Rem => 7,
        }
    }

    pub fn is_non_associative(self) -> bool {
        matches!(self.precedence(), 4 | 5)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOp {
    #[display("-")]
    Neg,
    #[display("!")]
    Not,
}

/// Returns the span of the first error marker left by the parser, if any.
pub fn find_error_marker(program: &Program) -> Option<Span> {
    use crate::visitor::{walk_expr, walk_program, walk_stmt, Visitor};

    struct Finder(Option<Span>);

    impl<'ast> Visitor<'ast> for Finder {
        fn visit_expr(&mut self, expr: &'ast Expr) {
            if expr.is_error() && self.0.is_none() {
                self.0 = Some(expr.span);
            }
            walk_expr(self, expr);
        }

        fn visit_stmt(&mut self, stmt: &'ast Stmt) {
            if matches!(stmt.kind, StmtKind::Error) && self.0.is_none() {
                self.0 = Some(stmt.span);
            }
            walk_stmt(self, stmt);
        }
    }

    let mut finder = Finder(None);
    walk_program(&mut finder, program);
    finder.0
}

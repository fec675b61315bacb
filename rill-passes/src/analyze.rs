//! Semantic analysis: name resolution and type checking.
//!
//! The analyzer annotates the AST in place (`Expr::ty` and every `symbol` slot) and returns the
//! [`SymbolTable`]. Problems are reported to the source diagnostics. An expression whose error was
//! already reported has type [`Type::Error`], which is accepted by every rule without a new
//! diagnostic.

use crate::scope::{ScopeId, Storage, Symbol, SymbolKind, SymbolTable};
use rill_parser::ast::{
    BinaryOp, Expr, ExprKind, FnDecl, Ident, Program, Stmt, StmtKind, SymbolId, TypeName, UnaryOp,
    VarDecl,
};
use rill_parser::types::Type;
use rill_parser::visitor::VisitorMut;
use rill_source::{Diagnostic, Phase, Source, Span};
use rill_value::native::Native;
use std::collections::HashMap;

/// Number of addressable global or local slots.
const MAX_SLOTS: usize = 256;
/// Largest arity a call instruction can encode.
const MAX_PARAMS: usize = 255;

/// The function being analyzed, or the script for top-level code.
struct Frame {
    /// `None` outside of functions.
    return_type: Option<Type>,
    /// Number of live locals. The next local is assigned this slot.
    locals: usize,
}

impl Frame {
    fn script() -> Self {
        Self {
            return_type: None,
            locals: 0,
        }
    }
}

pub struct SemanticAnalyzer<'a> {
    source: &'a Source<'a>,
    table: SymbolTable,
    scope: ScopeId,
    frame: Frame,
    globals: usize,
    functions: usize,
    /// Signatures of hoisted functions, keyed by the span of their name.
    signatures: HashMap<Span, Type>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(source: &'a Source<'a>) -> Self {
        let table = SymbolTable::new();
        let scope = table.global_scope();
        Self {
            source,
            table,
            scope,
            frame: Frame::script(),
            globals: 0,
            functions: 0,
            signatures: HashMap::new(),
        }
    }

    /// Analyzes `program`, annotating it in place, and returns the symbol table.
    pub fn analyze(mut self, program: &mut Program) -> SymbolTable {
        self.declare_builtins();

        // pass 1: functions are visible from anywhere in the program
        for item in &mut program.items {
            if let StmtKind::FnDecl(decl) = &mut item.kind {
                self.hoist_function(decl);
            }
        }

        // pass 2
        for item in &mut program.items {
            self.visit_stmt_mut(item);
        }

        tracing::debug!(
            symbols = self.table.symbols().count(),
            scopes = self.table.scope_count(),
            globals = self.globals,
            functions = self.functions,
            "analyzed program"
        );
        self.table
    }

    fn error(&self, message: impl ToString, span: Span) {
        self.source
            .report(Diagnostic::error(Phase::Semantic, message, span));
    }

    fn warning(&self, message: impl ToString, span: Span) {
        self.source
            .report(Diagnostic::warning(Phase::Semantic, message, span));
    }

    fn mismatch(&self, expected: &Type, found: &Type, span: Span) {
        self.error(
            format!("type mismatch: expected {}, found {}", expected, found),
            span,
        );
    }

    fn declare_builtins(&mut self) {
        let scope = self.table.global_scope();
        for native in Native::ALL {
            let declared = self.table.declare(Symbol {
                name: native.name().to_string(),
                ty: native.ty(),
                kind: SymbolKind::Builtin,
                scope,
                span: Span::default(),
                storage: Storage::Native(native.index()),
                used: false,
            });
            debug_assert!(declared.is_ok());
        }
    }

    /// Declares `symbol` in the current scope. Reports a redeclaration and returns `None` if the
    /// name is already bound in this scope.
    fn declare(&mut self, symbol: Symbol) -> Option<SymbolId> {
        let span = symbol.span;
        let name = symbol.name.clone();
        match self.table.declare(symbol) {
            Ok(id) => Some(id),
            Err(_) => {
                self.error(format!("redeclaration of '{}' in the same scope", name), span);
                None
            }
        }
    }

    fn resolve_type(&self, name: &TypeName) -> Type {
        match Type::from_name(&name.name) {
            Some(ty) => ty,
            None => {
                self.error(format!("unknown type '{}'", name.name), name.span);
                Type::Error
            }
        }
    }

    /// Resolves the type of a variable or parameter. `Void` is not a storable type.
    fn resolve_value_type(&self, name: &TypeName, what: &str, ident: &str) -> Type {
        match self.resolve_type(name) {
            Type::Void => {
                self.error(
                    format!("{} '{}' cannot have type Void", what, ident),
                    name.span,
                );
                Type::Error
            }
            ty => ty,
        }
    }

    fn function_signature(&self, decl: &FnDecl) -> Type {
        let params = decl
            .params
            .iter()
            .map(|param| self.resolve_value_type(&param.ty, "parameter", &param.name))
            .collect();
        let ret = match &decl.return_type {
            Some(ty) => self.resolve_type(ty),
            None => Type::Void,
        };
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }

    fn hoist_function(&mut self, decl: &mut FnDecl) {
        let ty = self.function_signature(decl);
        self.signatures.insert(decl.name_span, ty.clone());

        if self.functions > u16::MAX as usize {
            self.error("too many functions", decl.name_span);
        }
        decl.symbol = self.declare(Symbol {
            name: decl.name.clone(),
            ty,
            kind: SymbolKind::Function,
            scope: self.scope,
            span: decl.name_span,
            storage: Storage::Function(self.functions as u16),
            used: false,
        });
        if decl.symbol.is_some() {
            self.functions += 1;
        }
    }

    fn enter_scope(&mut self) -> ScopeId {
        let previous = self.scope;
        self.scope = self.table.push_scope(previous);
        previous
    }

    fn exit_scope(&mut self, previous: ScopeId) {
        let unused: Vec<(String, Span)> = self
            .table
            .symbols_in(self.scope)
            .filter(|(_, symbol)| {
                symbol.kind == SymbolKind::Variable
                    && matches!(symbol.storage, Storage::Local(_))
                    && !symbol.used
            })
            .map(|(_, symbol)| (symbol.name.clone(), symbol.span))
            .collect();
        for (name, span) in unused {
            self.warning(format!("unused variable '{}'", name), span);
        }
        self.scope = previous;
    }

    /// Checks a statement list. Warns once about statements following one that always returns.
    fn check_stmt_list(&mut self, stmts: &mut [Stmt]) {
        let mut returned = false;
        let mut warned = false;
        for stmt in stmts {
            if returned && !warned {
                self.warning("unreachable code", stmt.span);
                warned = true;
            }
            self.visit_stmt_mut(stmt);
            returned = returned || always_returns(stmt);
        }
    }

    fn check_block(&mut self, stmts: &mut [Stmt]) {
        let previous = self.enter_scope();
        let locals = self.frame.locals;
        self.check_stmt_list(stmts);
        self.exit_scope(previous);
        self.frame.locals = locals;
    }

    fn check_function(&mut self, decl: &mut FnDecl) {
        let ty = match self.signatures.get(&decl.name_span) {
            Some(ty) => ty.clone(),
            None => self.function_signature(decl),
        };
        let (param_types, ret) = match ty {
            Type::Function { params, ret } => (params, *ret),
            _ => unreachable!("function signature is always a function type"),
        };
        tracing::trace!(name = %decl.name, "checking function");

        let frame = std::mem::replace(
            &mut self.frame,
            Frame {
                return_type: Some(ret.clone()),
                locals: 0,
            },
        );
        let previous = self.enter_scope();

        if decl.params.len() > MAX_PARAMS {
            self.error(
                format!("a function can have at most {} parameters", MAX_PARAMS),
                decl.name_span,
            );
        }
        for (param, ty) in decl.params.iter_mut().zip(param_types) {
            let slot = self.frame.locals.min(MAX_SLOTS - 1);
            param.symbol = self.declare(Symbol {
                name: param.name.clone(),
                ty,
                kind: SymbolKind::Parameter,
                scope: self.scope,
                span: param.span,
                storage: Storage::Local(slot as u8),
                used: false,
            });
            self.frame.locals += 1;
        }

        self.check_stmt_list(&mut decl.body);

        if ret != Type::Void && !ret.is_error() && !always_returns_list(&decl.body) {
            self.error("missing return on all paths", decl.name_span);
        }

        self.exit_scope(previous);
        self.frame = frame;
    }

    fn check_var_decl(&mut self, decl: &mut VarDecl) {
        let declared = decl
            .declared_type
            .as_ref()
            .map(|ty| self.resolve_value_type(ty, "variable", &decl.name));
        let initializer = decl
            .initializer
            .as_mut()
            .map(|init| (self.check_expr(init), init.span));

        let ty = match (declared, initializer) {
            (Some(declared), Some((init, span))) => {
                if !declared.is_assignable_from(&init) {
                    self.mismatch(&declared, &init, span);
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some((Type::Void, span))) => {
                self.error(
                    format!("cannot initialize '{}' with a Void value", decl.name),
                    span,
                );
                Type::Error
            }
            (None, Some((init, _))) => init,
            (None, None) => {
                self.error(
                    format!(
                        "cannot infer the type of '{}' without a type or an initializer",
                        decl.name
                    ),
                    decl.name_span,
                );
                Type::Error
            }
        };

        let storage = if self.scope == self.table.global_scope() {
            if self.globals >= MAX_SLOTS {
                self.error("too many global variables", decl.name_span);
            }
            Storage::Global(self.globals.min(MAX_SLOTS - 1) as u8)
        } else {
            if self.frame.locals >= MAX_SLOTS {
                self.error("too many local variables in one function", decl.name_span);
            }
            Storage::Local(self.frame.locals.min(MAX_SLOTS - 1) as u8)
        };

        decl.symbol = self.declare(Symbol {
            name: decl.name.clone(),
            ty,
            kind: SymbolKind::Variable,
            scope: self.scope,
            span: decl.name_span,
            storage,
            used: false,
        });
        if decl.symbol.is_some() {
            match storage {
                Storage::Global(_) => self.globals += 1,
                _ => self.frame.locals += 1,
            }
        }
    }

    fn check_condition(&mut self, condition: &mut Expr) {
        let ty = self.check_expr(condition);
        if ty != Type::Bool && !ty.is_error() {
            self.error(
                format!("condition must be Bool, found {}", ty),
                condition.span,
            );
        }
    }

    fn check_return(&mut self, value: Option<&mut Expr>, span: Span) {
        let found = value.map(|value| (self.check_expr(value), value.span));
        let expected = match &self.frame.return_type {
            Some(ty) => ty.clone(),
            None => {
                self.error("return outside of a function", span);
                return;
            }
        };
        match found {
            Some((found, value_span)) => {
                if !expected.is_assignable_from(&found) {
                    self.mismatch(&expected, &found, value_span);
                }
            }
            None => {
                if expected != Type::Void && !expected.is_error() {
                    self.error(
                        format!("return without a value in a function returning {}", expected),
                        span,
                    );
                }
            }
        }
    }

    /// Resolves an identifier that is read as a value.
    fn resolve_value(&mut self, ident: &mut Ident) -> Type {
        let id = match self.table.lookup(self.scope, &ident.name) {
            Some(id) => id,
            None => {
                self.error(format!("undeclared identifier '{}'", ident.name), ident.span);
                return Type::Error;
            }
        };
        ident.symbol = Some(id);
        let symbol = self.table.symbol_mut(id);
        symbol.used = true;
        match symbol.kind {
            SymbolKind::Function | SymbolKind::Builtin => {
                let message = format!("function '{}' cannot be used as a value", ident.name);
                self.error(message, ident.span);
                Type::Error
            }
            SymbolKind::Variable | SymbolKind::Parameter => symbol.ty.clone(),
        }
    }

    fn check_assign(&mut self, target: &mut Ident, value: &mut Expr) -> Type {
        let found = self.check_expr(value);
        let id = match self.table.lookup(self.scope, &target.name) {
            Some(id) => id,
            None => {
                self.error(
                    format!("undeclared identifier '{}'", target.name),
                    target.span,
                );
                return Type::Error;
            }
        };
        target.symbol = Some(id);
        let symbol = self.table.symbol(id);
        match symbol.kind {
            SymbolKind::Function | SymbolKind::Builtin => {
                self.error(
                    format!("cannot assign to function '{}'", target.name),
                    target.span,
                );
                Type::Error
            }
            SymbolKind::Variable | SymbolKind::Parameter => {
                let expected = symbol.ty.clone();
                if !expected.is_assignable_from(&found) {
                    self.mismatch(&expected, &found, value.span);
                }
                expected
            }
        }
    }

    fn check_call(&mut self, callee: &mut Expr, args: &mut [Expr], span: Span) -> Type {
        let arg_types: Vec<Type> = args.iter_mut().map(|arg| self.check_expr(arg)).collect();

        let (name, ty) = match &mut callee.kind {
            ExprKind::Identifier(ident) => match self.table.lookup(self.scope, &ident.name) {
                None => {
                    self.error(format!("undeclared identifier '{}'", ident.name), ident.span);
                    (ident.name.clone(), Type::Error)
                }
                Some(id) => {
                    ident.symbol = Some(id);
                    let symbol = self.table.symbol_mut(id);
                    symbol.used = true;
                    match symbol.kind {
                        SymbolKind::Function | SymbolKind::Builtin => {
                            (ident.name.clone(), symbol.ty.clone())
                        }
                        SymbolKind::Variable | SymbolKind::Parameter => {
                            let message = format!("'{}' is not a function", ident.name);
                            self.error(message, ident.span);
                            (ident.name.clone(), Type::Error)
                        }
                    }
                }
            },
            _ => {
                let ty = self.check_expr(callee);
                if !ty.is_error() {
                    self.error("expression is not callable", callee.span);
                }
                (String::new(), Type::Error)
            }
        };
        callee.ty = Some(ty.clone());

        let (params, ret) = match ty {
            Type::Function { params, ret } => (params, *ret),
            _ => return Type::Error,
        };

        if params.len() != args.len() {
            self.error(
                format!(
                    "function '{}' expects {} argument{}, found {}",
                    name,
                    params.len(),
                    if params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
                span,
            );
            return ret;
        }
        for ((param, found), arg) in params.iter().zip(&arg_types).zip(args.iter()) {
            if !param.is_assignable_from(found) {
                self.mismatch(param, found, arg.span);
            }
        }
        ret
    }

    /// Type checks `expr`, stores the type in `expr.ty`, and returns it.
    fn check_expr(&mut self, expr: &mut Expr) -> Type {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Literal(literal) => literal.ty(),
            ExprKind::Identifier(ident) => self.resolve_value(ident),
            ExprKind::Assign { target, value } => self.check_assign(target, value),
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lhs = self.check_expr(lhs);
                let rhs = self.check_expr(rhs);
                if lhs.is_error() || rhs.is_error() {
                    Type::Error
                } else {
                    match binary_result(op, &lhs, &rhs) {
                        Some(ty) => ty,
                        None => {
                            self.error(
                                format!("invalid operands to '{}': {} and {}", op, lhs, rhs),
                                span,
                            );
                            Type::Error
                        }
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand = self.check_expr(operand);
                match (op, &operand) {
                    (_, Type::Error) => Type::Error,
                    (UnaryOp::Neg, ty) if ty.is_numeric() => operand,
                    (UnaryOp::Not, Type::Bool) => Type::Bool,
                    _ => {
                        self.error(format!("invalid operand to '{}': {}", op, operand), span);
                        Type::Error
                    }
                }
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, span),
            ExprKind::Error => Type::Error,
        };
        expr.ty = Some(ty.clone());
        ty
    }
}

impl VisitorMut for SemanticAnalyzer<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        self.check_expr(expr);
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        // Do not use default walking logic.

        match &mut stmt.kind {
            StmtKind::FnDecl(decl) => {
                if self.scope != self.table.global_scope() {
                    self.error(
                        "functions can only be declared at the top level",
                        decl.name_span,
                    );
                }
                self.check_function(decl);
            }
            StmtKind::VarDecl(decl) => self.check_var_decl(decl),
            StmtKind::Block(body) => self.check_block(body),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition);
                self.visit_stmt_mut(then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit_stmt_mut(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                self.check_condition(condition);
                self.visit_stmt_mut(body);
            }
            StmtKind::Return(value) => self.check_return(value.as_mut(), stmt.span),
            StmtKind::Expr(expr) => self.visit_expr_mut(expr),
            StmtKind::Error => {}
        }
    }
}

/// Result type of a binary operator, or `None` if the operands are not compatible.
fn binary_result(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<Type> {
    use BinaryOp::*;
    let numeric = lhs.is_numeric() && rhs.is_numeric();
    match op {
        Add if *lhs == Type::String && *rhs == Type::String => Some(Type::String),
        Add | Sub | Mul | Div | Rem if numeric => Some(unify_numeric(lhs, rhs)),
        Eq | NotEq if numeric => Some(Type::Bool),
        Eq | NotEq if lhs == rhs && matches!(lhs, Type::Bool | Type::String) => Some(Type::Bool),
        Less | LessEq | Greater | GreaterEq
            if numeric || (*lhs == Type::String && *rhs == Type::String) =>
        {
            Some(Type::Bool)
        }
        And | Or if *lhs == Type::Bool && *rhs == Type::Bool => Some(Type::Bool),
        _ => None,
    }
}

/// `Int` with `Int` stays `Int`, any `Float` operand makes the result `Float`.
fn unify_numeric(lhs: &Type, rhs: &Type) -> Type {
    if *lhs == Type::Int && *rhs == Type::Int {
        Type::Int
    } else {
        Type::Float
    }
}

/// Structural check: a `return`, a block containing a statement that always returns, or an `if`
/// whose branches both always return.
pub fn always_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(body) => always_returns_list(body),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => always_returns(then_branch) && always_returns(else_branch),
        _ => false,
    }
}

fn always_returns_list(stmts: &[Stmt]) -> bool {
    stmts.iter().any(always_returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_parser::parser::Parser;

    struct Analyzed {
        program: Program,
        table: SymbolTable,
        errors: Vec<String>,
        warnings: Vec<String>,
    }

    fn analyze(text: &str) -> Analyzed {
        let source: Source = text.into();
        let mut program = Parser::new(&source).parse_program();
        assert!(source.has_no_errors(), "{}", source.render_all());
        let table = SemanticAnalyzer::new(&source).analyze(&mut program);
        Analyzed {
            program,
            table,
            errors: source.diagnostics.error_messages(),
            warnings: source.diagnostics.warning_messages(),
        }
    }

    fn errors(text: &str) -> Vec<String> {
        analyze(text).errors
    }

    fn storage_of(table: &SymbolTable, name: &str) -> Vec<Storage> {
        table
            .symbols()
            .filter(|(_, symbol)| symbol.name == name)
            .map(|(_, symbol)| symbol.storage)
            .collect()
    }

    #[test]
    fn test_let_scenario() {
        let analyzed = analyze("let x = 1 + 2 * 3;");
        assert!(analyzed.errors.is_empty());
        match &analyzed.program.items[0].kind {
            StmtKind::VarDecl(decl) => {
                let init = decl.initializer.as_ref().unwrap();
                assert_eq!(init.ty, Some(Type::Int));
                let symbol = analyzed.table.symbol(decl.symbol.unwrap());
                assert_eq!(symbol.ty, Type::Int);
                assert_eq!(symbol.storage, Storage::Global(0));
            }
            _ => panic!("expected a let declaration"),
        }
    }

    #[test]
    fn test_one_error_per_undeclared_use() {
        assert_eq!(
            errors("let a = b + c;"),
            vec!["undeclared identifier 'b'", "undeclared identifier 'c'"]
        );
        // each use site is reported, cascades are not
        assert_eq!(
            errors("let y = -(z + 1) * 2 < 3 && !(z == 1);"),
            vec!["undeclared identifier 'z'", "undeclared identifier 'z'"]
        );
        assert_eq!(
            errors("print(str(q));"),
            vec!["undeclared identifier 'q'"]
        );
        assert_eq!(errors("q = 1;"), vec!["undeclared identifier 'q'"]);
        assert_eq!(errors("q(1);"), vec!["undeclared identifier 'q'"]);
    }

    #[test]
    fn test_missing_return() {
        assert_eq!(
            errors("fn f() -> Int { if (true) { return 1; } }"),
            vec!["missing return on all paths"]
        );
        assert!(errors("fn f() -> Int { if (true) { return 1; } else { return 2; } }").is_empty());
        assert!(errors("fn f() -> Int { if (true) { return 1; } return 2; }").is_empty());
        assert!(errors("fn f() -> Int { { return 1; } }").is_empty());
        // loops are not considered
        assert_eq!(
            errors("fn f() -> Int { while (true) { return 1; } }"),
            vec!["missing return on all paths"]
        );
        assert!(errors("fn f() { }").is_empty());
    }

    #[test]
    fn test_redeclaration() {
        let analyzed = analyze(
            r#"
            fn main() {
                let x = 1;
                let x = "s";
                let y: Int = x;
                print(str(y));
            }"#,
        );
        assert_eq!(
            analyzed.errors,
            vec!["redeclaration of 'x' in the same scope"]
        );

        // the reference resolves to the first declaration
        let body = match &analyzed.program.items[0].kind {
            StmtKind::FnDecl(decl) => &decl.body,
            _ => panic!("expected a function"),
        };
        let first = match &body[0].kind {
            StmtKind::VarDecl(decl) => decl.symbol.unwrap(),
            _ => panic!("expected a let declaration"),
        };
        match &body[1].kind {
            StmtKind::VarDecl(decl) => assert_eq!(decl.symbol, None),
            _ => panic!("expected a let declaration"),
        }
        match &body[2].kind {
            StmtKind::VarDecl(decl) => match &decl.initializer.as_ref().unwrap().kind {
                ExprKind::Identifier(ident) => assert_eq!(ident.symbol, Some(first)),
                _ => panic!("expected an identifier"),
            },
            _ => panic!("expected a let declaration"),
        }
    }

    #[test]
    fn test_shadowing_is_allowed() {
        assert!(errors("let x = 1; { let x = \"s\"; print(x); } print(str(x));").is_empty());
        assert_eq!(
            errors("fn f(a: Int) { let a = 2; }"),
            vec!["redeclaration of 'a' in the same scope"]
        );
        assert_eq!(
            errors("fn print(s: String) { }"),
            vec!["redeclaration of 'print' in the same scope"]
        );
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(
            errors(r#"let x: Int = "hello";"#),
            vec!["type mismatch: expected Int, found String"]
        );
        assert_eq!(
            errors("let i: Int = 1.5;"),
            vec!["type mismatch: expected Int, found Float"]
        );
        assert!(errors("let f: Float = 1; f = 2; f = f * 2;").is_empty());
        assert_eq!(
            errors("let i = 1; i = 2.0;"),
            vec!["type mismatch: expected Int, found Float"]
        );
    }

    #[test]
    fn test_operators() {
        let analyzed = analyze(
            r#"
            let a = 1 + 2.5;
            let b = "x" + "y";
            let c = 1 < 2.0;
            let d = "a" < "b";
            let e = true == false;
            let f = 7 % 2;
            let g = -1.5;
            "#,
        );
        assert!(analyzed.errors.is_empty());
        let types: Vec<Type> = analyzed
            .program
            .items
            .iter()
            .map(|item| match &item.kind {
                StmtKind::VarDecl(decl) => decl.initializer.as_ref().unwrap().ty.clone().unwrap(),
                _ => panic!("expected a let declaration"),
            })
            .collect();
        assert_eq!(
            types,
            vec![
                Type::Float,
                Type::String,
                Type::Bool,
                Type::Bool,
                Type::Bool,
                Type::Int,
                Type::Float
            ]
        );

        assert_eq!(
            errors(r#"let x = 1 + "s";"#),
            vec!["invalid operands to '+': Int and String"]
        );
        assert_eq!(
            errors("let x = 1 && true;"),
            vec!["invalid operands to '&&': Int and Bool"]
        );
        assert_eq!(
            errors("let x = true == 1;"),
            vec!["invalid operands to '==': Bool and Int"]
        );
        assert_eq!(errors("let x = !1;"), vec!["invalid operand to '!': Int"]);
        assert_eq!(
            errors(r#"let x = -"s";"#),
            vec!["invalid operand to '-': String"]
        );
    }

    #[test]
    fn test_conditions() {
        assert_eq!(
            errors("if (1) { }"),
            vec!["condition must be Bool, found Int"]
        );
        assert_eq!(
            errors(r#"while ("s") { }"#),
            vec!["condition must be Bool, found String"]
        );
        // no cascade from an undeclared condition
        assert_eq!(errors("if (nope) { }"), vec!["undeclared identifier 'nope'"]);
    }

    #[test]
    fn test_returns() {
        assert_eq!(errors("return 1;"), vec!["return outside of a function"]);
        assert_eq!(
            errors(r#"fn f() -> Int { return "s"; }"#),
            vec!["type mismatch: expected Int, found String"]
        );
        assert_eq!(
            errors("fn f() -> Int { return; }"),
            vec!["return without a value in a function returning Int"]
        );
        assert_eq!(
            errors("fn f() { return 1; }"),
            vec!["type mismatch: expected Void, found Int"]
        );
        assert!(errors("fn f() -> Float { return 1; }").is_empty());
    }

    #[test]
    fn test_forward_references() {
        // sibling functions see each other regardless of order
        assert!(errors(
            r#"
            fn is_even(n: Int) -> Bool { if (n == 0) return true; else return is_odd(n - 1); }
            fn is_odd(n: Int) -> Bool { if (n == 0) return false; else return is_even(n - 1); }
            let r = is_even(10);
            "#
        )
        .is_empty());
        // variables are visible from their declaration onward
        assert_eq!(
            errors("fn f() -> Int { return g; } let g = 1;"),
            vec!["undeclared identifier 'g'"]
        );
        assert_eq!(errors("let x = x;"), vec!["undeclared identifier 'x'"]);
    }

    #[test]
    fn test_calls() {
        assert_eq!(
            errors(
                r#"
                fn f(a: Int, b: Float) { }
                f(1);
                f(1, "x");
                f(1, 2);
                str(1, 2);
                "#
            ),
            vec![
                "function 'f' expects 2 arguments, found 1",
                "type mismatch: expected Float, found String",
                "function 'str' expects 1 argument, found 2",
            ]
        );
        assert_eq!(
            errors("let x = 1; x(2);"),
            vec!["'x' is not a function"]
        );
        assert_eq!(
            errors("(1 + 2)(3);"),
            vec!["expression is not callable"]
        );
        assert_eq!(
            errors("fn f() { } let x = f;"),
            vec!["function 'f' cannot be used as a value"]
        );
        assert_eq!(
            errors("fn f() { } f = 1;"),
            vec!["cannot assign to function 'f'"]
        );
    }

    #[test]
    fn test_parameter_limit() {
        let declare = |count: usize| {
            let params: Vec<String> = (0..count).map(|i| format!("p{}: Int", i)).collect();
            format!("fn f({}) {{ }}", params.join(", "))
        };
        assert!(errors(&declare(255)).is_empty());
        assert_eq!(
            errors(&declare(256)),
            vec!["a function can have at most 255 parameters"]
        );

        // slots stay in range even past the limit
        let analyzed = analyze(&declare(300));
        let slots: Vec<Storage> = analyzed
            .table
            .symbols()
            .filter(|(_, symbol)| symbol.kind == SymbolKind::Parameter)
            .map(|(_, symbol)| symbol.storage)
            .collect();
        assert_eq!(slots.len(), 300);
        assert_eq!(slots[299], Storage::Local(255));
    }

    #[test]
    fn test_let_rules() {
        assert_eq!(
            errors("fn f() { } let x = f();"),
            vec!["cannot initialize 'x' with a Void value"]
        );
        assert_eq!(
            errors("let x;"),
            vec!["cannot infer the type of 'x' without a type or an initializer"]
        );
        assert_eq!(
            errors("let x: Void;"),
            vec!["variable 'x' cannot have type Void"]
        );
        // the unknown type absorbs the initializer check
        assert_eq!(errors("let x: Foo = 1;"), vec!["unknown type 'Foo'"]);
        assert_eq!(
            errors("fn f(a: Foo) -> Bar { return a; }"),
            vec!["unknown type 'Foo'", "unknown type 'Bar'"]
        );
    }

    #[test]
    fn test_nested_function() {
        assert_eq!(
            errors("fn outer() { fn inner() { } }"),
            vec!["functions can only be declared at the top level"]
        );
        // the body is still checked
        assert_eq!(
            errors("{ fn inner() -> Int { return nope; } }"),
            vec![
                "functions can only be declared at the top level",
                "undeclared identifier 'nope'"
            ]
        );
    }

    #[test]
    fn test_storage() {
        let analyzed = analyze(
            r#"
            let g = 1;
            fn f(a: Int) {
                let b = a;
                {
                    let c = b;
                    print(str(c));
                }
                let d = b + g;
                print(str(d));
            }
            fn h() { }
            "#,
        );
        assert!(analyzed.errors.is_empty());
        let table = &analyzed.table;
        assert_eq!(storage_of(table, "g"), vec![Storage::Global(0)]);
        assert_eq!(storage_of(table, "a"), vec![Storage::Local(0)]);
        assert_eq!(storage_of(table, "b"), vec![Storage::Local(1)]);
        assert_eq!(storage_of(table, "c"), vec![Storage::Local(2)]);
        // `c` is out of scope, so `d` reuses its slot
        assert_eq!(storage_of(table, "d"), vec![Storage::Local(2)]);
        assert_eq!(storage_of(table, "f"), vec![Storage::Function(0)]);
        assert_eq!(storage_of(table, "h"), vec![Storage::Function(1)]);
        assert_eq!(
            storage_of(table, "print"),
            vec![Storage::Native(Native::Print.index())]
        );
    }

    #[test]
    fn test_warnings() {
        let analyzed = analyze(
            r#"
            fn main() {
                let unused = 1;
                return;
                print("a");
                print("b");
            }
            main();
            "#,
        );
        assert!(analyzed.errors.is_empty());
        assert_eq!(
            analyzed.warnings,
            vec!["unreachable code", "unused variable 'unused'"]
        );

        // parameters and globals are not reported
        let analyzed = analyze("let g = 1; fn f(a: Int) { }");
        assert!(analyzed.warnings.is_empty());
    }

    #[test]
    fn test_every_expression_is_annotated() {
        use rill_parser::visitor::{walk_expr, walk_program, Visitor};

        struct Unannotated(usize);
        impl<'ast> Visitor<'ast> for Unannotated {
            fn visit_expr(&mut self, expr: &'ast Expr) {
                if expr.ty.is_none() {
                    self.0 += 1;
                }
                walk_expr(self, expr);
            }
        }

        let analyzed = analyze(
            r#"
            fn fib(n: Int) -> Int { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
            let i = 0;
            while (i < 10 && !false) { print(str(fib(i))); i = i + 1; }
            "#,
        );
        assert!(analyzed.errors.is_empty());
        let mut visitor = Unannotated(0);
        walk_program(&mut visitor, &analyzed.program);
        assert_eq!(visitor.0, 0);
    }
}

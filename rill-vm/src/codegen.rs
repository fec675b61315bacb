//! Lowers an analyzed AST into a [`Module`] (bytecode).
//!
//! Code generation trusts the annotations left by semantic analysis. It refuses to run when the
//! [`Source`] still carries errors or when the tree contains an error marker.

use derive_more::{Display, Error};
use rill_parser::ast::{
    find_error_marker, BinaryOp, Expr, ExprKind, FnDecl, Literal, Program, Stmt, StmtKind,
    SymbolId, UnaryOp, VarDecl,
};
use rill_parser::types::Type;
use rill_passes::scope::{Storage, Symbol, SymbolTable};
use rill_source::{Position, Source, Span};
use rill_value::chunk::{Chunk, OpCode, ToByteCode};
use rill_value::module::{Function, Module};
use rill_value::Value;
use std::collections::HashMap;
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Evaluate arithmetic on numeric literals at compile time.
    pub fold_constants: bool,
    /// Print the disassembled module to stderr after generation.
    pub dump_bytecode: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            fold_constants: true,
            dump_bytecode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum CodegenError {
    #[display("cannot generate code for a program with {count} error(s)")]
    OutstandingErrors { count: usize },
    #[display("{position}: error marker reached code generation")]
    ErrorNode { position: Position },
    #[display("{position}: node was not annotated by semantic analysis")]
    Unannotated { position: Position },
    #[display("{position}: {construct} is not supported")]
    Unsupported {
        construct: &'static str,
        position: Position,
    },
    #[display("too many constants in '{function}'")]
    TooManyConstants { function: String },
    #[display("jump target out of range in '{function}'")]
    JumpTooFar { function: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Label(u32);

/// State of the function currently being generated.
struct FunctionState {
    function: Function,
    return_type: Type,
    /// Offsets of the labels placed so far.
    placed: HashMap<Label, u32>,
    /// Jump operands waiting for their label, as `(operand offset, label)`.
    pending: Vec<(usize, Label)>,
}

impl FunctionState {
    fn new(function: Function, return_type: Type) -> Self {
        Self {
            function,
            return_type,
            placed: HashMap::new(),
            pending: Vec::new(),
        }
    }
}

/// Generate bytecode from an analyzed abstract syntax tree.
pub struct CodeGenerator<'a> {
    source: &'a Source<'a>,
    table: &'a SymbolTable,
    options: CompileOptions,
    state: FunctionState,
    functions: Vec<Function>,
    /// Label names are unique in the whole module.
    next_label: u32,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(source: &'a Source<'a>, table: &'a SymbolTable, options: CompileOptions) -> Self {
        Self {
            source,
            table,
            options,
            state: FunctionState::new(Function::new("<script>", 0), Type::Void),
            functions: Vec::new(),
            next_label: 0,
        }
    }

    /// Generates the module for `program`.
    ///
    /// Function declarations become entries of [`Module::functions`] in declaration order. Every
    /// other top-level statement goes into [`Module::script`].
    pub fn generate(mut self, program: &Program) -> Result<Module, CodegenError> {
        let count = self.source.diagnostics.error_count();
        if count > 0 {
            return Err(CodegenError::OutstandingErrors { count });
        }
        if let Some(span) = find_error_marker(program) {
            return Err(CodegenError::ErrorNode {
                position: self.position(span),
            });
        }

        for item in &program.items {
            match &item.kind {
                StmtKind::FnDecl(decl) => self.gen_function(decl, item.span)?,
                _ => self.gen_stmt(item)?,
            }
        }
        let end = Span::new(self.source.content.len(), self.source.content.len());
        self.emit(OpCode::RetVoid, end);

        let globals = self
            .table
            .symbols()
            .filter(|(_, symbol)| matches!(symbol.storage, Storage::Global(_)))
            .count() as u16;
        let module = Module {
            script: self.state.function,
            functions: self.functions,
            globals,
        };

        tracing::debug!(
            functions = module.functions.len(),
            globals = module.globals,
            "generated module"
        );
        if self.options.dump_bytecode {
            eprintln!("{}", module);
        }
        Ok(module)
    }

    fn position(&self, span: Span) -> Position {
        self.source.position(span.start)
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.state.function.chunk
    }

    fn emit(&mut self, data: impl ToByteCode, span: Span) {
        let line = self.source.line(span.start);
        self.chunk().write_chunk(data, line);
    }

    fn emit_constant(&mut self, value: Value, span: Span) -> Result<(), CodegenError> {
        let index = self.chunk().add_constant(value);
        match u8::try_from(index) {
            Ok(index) => {
                self.emit(OpCode::Ldc, span);
                self.emit(index, span);
            }
            Err(_) => {
                let index =
                    u32::try_from(index).map_err(|_| CodegenError::TooManyConstants {
                        function: self.state.function.name.clone(),
                    })?;
                self.emit(OpCode::LdcWide, span);
                let line = self.source.line(span.start);
                self.chunk().write_u32(index, line);
            }
        }
        Ok(())
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn jump_target(&self, offset: usize) -> Result<u32, CodegenError> {
        u32::try_from(offset).map_err(|_| CodegenError::JumpTooFar {
            function: self.state.function.name.clone(),
        })
    }

    /// Binds `label` to the current offset and patches every jump waiting for it.
    fn place_label(&mut self, label: Label) -> Result<(), CodegenError> {
        let offset = self.chunk().code.len();
        let target = self.jump_target(offset)?;
        self.state.placed.insert(label, target);
        self.chunk().place_label(format!("L{}", label.0));

        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.state.pending)
            .into_iter()
            .partition(|(_, pending)| *pending == label);
        self.state.pending = waiting;
        for (operand, _) in ready {
            self.chunk().patch_u32(operand, target);
        }
        Ok(())
    }

    fn emit_jump(&mut self, op: OpCode, label: Label, span: Span) {
        self.emit(op, span);
        let line = self.source.line(span.start);
        match self.state.placed.get(&label).copied() {
            Some(target) => self.chunk().write_u32(target, line),
            None => {
                let operand = self.chunk().code.len();
                self.state.pending.push((operand, label));
                self.chunk().write_u32(0, line);
            }
        }
    }

    fn symbol(&self, id: Option<SymbolId>, span: Span) -> Result<&'a Symbol, CodegenError> {
        match id {
            Some(id) => Ok(self.table.symbol(id)),
            None => Err(CodegenError::Unannotated {
                position: self.position(span),
            }),
        }
    }

    fn ty<'e>(&self, expr: &'e Expr) -> Result<&'e Type, CodegenError> {
        expr.ty.as_ref().ok_or_else(|| CodegenError::Unannotated {
            position: self.position(expr.span),
        })
    }

    fn unsupported(&self, construct: &'static str, span: Span) -> CodegenError {
        CodegenError::Unsupported {
            construct,
            position: self.position(span),
        }
    }

    fn gen_function(&mut self, decl: &FnDecl, span: Span) -> Result<(), CodegenError> {
        let symbol = self.symbol(decl.symbol, decl.name_span)?;
        let (index, ret) = match (&symbol.storage, &symbol.ty) {
            (Storage::Function(index), Type::Function { ret, .. }) => (*index, ret.as_ref()),
            _ => {
                return Err(CodegenError::Unannotated {
                    position: self.position(decl.name_span),
                })
            }
        };
        if index as usize != self.functions.len() {
            return Err(CodegenError::Unannotated {
                position: self.position(decl.name_span),
            });
        }
        let arity = u8::try_from(decl.params.len())
            .map_err(|_| self.unsupported("a function with more than 255 parameters", span))?;

        let state = FunctionState::new(Function::new(&decl.name, arity), ret.clone());
        let script = mem::replace(&mut self.state, state);

        // arguments are already in slots 0..arity
        if !decl.params.is_empty() {
            let params: Vec<&str> = decl.params.iter().map(|p| p.name.as_str()).collect();
            self.chunk()
                .annotate_next(format!("params: {}", params.join(", ")));
        }
        for stmt in &decl.body {
            self.gen_stmt(stmt)?;
        }
        if self.state.return_type == Type::Void {
            let end = Span::new(span.end.saturating_sub(1), span.end);
            self.emit(OpCode::RetVoid, end);
        }

        let state = mem::replace(&mut self.state, script);
        debug_assert!(state.pending.is_empty());
        tracing::trace!(
            name = %decl.name,
            bytes = state.function.chunk.code.len(),
            "generated function"
        );
        self.functions.push(state.function);
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match &stmt.kind {
            StmtKind::FnDecl(_) => Err(self.unsupported("a nested function", stmt.span)),
            StmtKind::VarDecl(decl) => self.gen_var_decl(decl, stmt.span),
            StmtKind::Block(body) => {
                let mut locals = 0;
                for stmt in body {
                    self.gen_stmt(stmt)?;
                    if let StmtKind::VarDecl(decl) = &stmt.kind {
                        if let Storage::Local(_) = self.symbol(decl.symbol, decl.name_span)?.storage
                        {
                            locals += 1;
                        }
                    }
                }
                let end = Span::new(stmt.span.end.saturating_sub(1), stmt.span.end);
                for _ in 0..locals {
                    self.emit(OpCode::Pop, end);
                }
                Ok(())
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.gen_expr(condition)?;
                match else_branch {
                    Some(else_branch) => {
                        let else_label = self.new_label();
                        let end = self.new_label();
                        self.emit_jump(OpCode::JmpIfFalse, else_label, condition.span);
                        self.gen_stmt(then_branch)?;
                        self.emit_jump(OpCode::Jmp, end, stmt.span);
                        self.place_label(else_label)?;
                        self.gen_stmt(else_branch)?;
                        self.place_label(end)
                    }
                    None => {
                        let end = self.new_label();
                        self.emit_jump(OpCode::JmpIfFalse, end, condition.span);
                        self.gen_stmt(then_branch)?;
                        self.place_label(end)
                    }
                }
            }
            StmtKind::While { condition, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.place_label(start)?;
                self.gen_expr(condition)?;
                self.emit_jump(OpCode::JmpIfFalse, end, condition.span);
                self.gen_stmt(body)?;
                self.emit_jump(OpCode::Jmp, start, stmt.span);
                self.place_label(end)
            }
            StmtKind::Return(value) => {
                match value {
                    Some(value) if self.state.return_type == Type::Void => {
                        self.gen_expr(value)?;
                        self.emit(OpCode::RetVoid, stmt.span);
                    }
                    Some(value) => {
                        let ret = self.state.return_type.clone();
                        self.gen_expr_as(value, &ret)?;
                        self.emit(OpCode::Ret, stmt.span);
                    }
                    None => self.emit(OpCode::RetVoid, stmt.span),
                }
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.gen_expr(expr)?;
                if *self.ty(expr)? != Type::Void {
                    self.emit(OpCode::Pop, stmt.span);
                }
                Ok(())
            }
            StmtKind::Error => Err(CodegenError::ErrorNode {
                position: self.position(stmt.span),
            }),
        }
    }

    fn gen_var_decl(&mut self, decl: &VarDecl, span: Span) -> Result<(), CodegenError> {
        let symbol = self.symbol(decl.symbol, decl.name_span)?;
        self.chunk().annotate_next(format!("let {}", decl.name));
        match &decl.initializer {
            Some(init) => self.gen_expr_as(init, &symbol.ty)?,
            None => self.gen_default(&symbol.ty, span)?,
        }
        match symbol.storage {
            Storage::Global(slot) => {
                self.emit(OpCode::StGlobal, span);
                self.emit(slot, span);
                self.emit(OpCode::Pop, span);
            }
            // the value stays on the stack as the local's slot
            Storage::Local(_) => {}
            _ => {
                return Err(CodegenError::Unannotated {
                    position: self.position(decl.name_span),
                })
            }
        }
        Ok(())
    }

    fn gen_default(&mut self, ty: &Type, span: Span) -> Result<(), CodegenError> {
        match ty {
            Type::Int => self.emit_constant(Value::Int(0), span),
            Type::Float => self.emit_constant(Value::Float(0.0), span),
            Type::Bool => {
                self.emit(OpCode::LdFalse, span);
                Ok(())
            }
            Type::String => self.emit_constant(Value::from(""), span),
            _ => Err(self.unsupported("a variable without a default value", span)),
        }
    }

    /// Generates `expr` and widens it if `target` is `Float` and `expr` is `Int`.
    fn gen_expr_as(&mut self, expr: &Expr, target: &Type) -> Result<(), CodegenError> {
        self.gen_expr(expr)?;
        if target.needs_widening_from(self.ty(expr)?) {
            self.emit(OpCode::I2F, expr.span);
        }
        Ok(())
    }

    fn gen_expr(&mut self, expr: &Expr) -> Result<(), CodegenError> {
        self.ty(expr)?;
        if self.options.fold_constants && !matches!(expr.kind, ExprKind::Literal(_)) {
            if let Some(value) = fold(expr) {
                return self.emit_constant(value, expr.span);
            }
        }

        match &expr.kind {
            ExprKind::Literal(literal) => match literal {
                Literal::Int(val) => self.emit_constant(Value::Int(*val), expr.span),
                Literal::Float(val) => self.emit_constant(Value::Float(*val), expr.span),
                Literal::Bool(true) => {
                    self.emit(OpCode::LdTrue, expr.span);
                    Ok(())
                }
                Literal::Bool(false) => {
                    self.emit(OpCode::LdFalse, expr.span);
                    Ok(())
                }
                Literal::Str(val) => self.emit_constant(Value::from(val.as_str()), expr.span),
            },
            ExprKind::Identifier(ident) => {
                let symbol = self.symbol(ident.symbol, ident.span)?;
                let (op, slot) = match symbol.storage {
                    Storage::Local(slot) => (OpCode::LdLoc, slot),
                    Storage::Global(slot) => (OpCode::LdGlobal, slot),
                    _ => return Err(self.unsupported("a function used as a value", expr.span)),
                };
                self.emit(op, expr.span);
                self.emit(slot, expr.span);
                Ok(())
            }
            ExprKind::Assign { target, value } => {
                let symbol = self.symbol(target.symbol, target.span)?;
                self.gen_expr_as(value, &symbol.ty)?;
                let (op, slot) = match symbol.storage {
                    Storage::Local(slot) => (OpCode::StLoc, slot),
                    Storage::Global(slot) => (OpCode::StGlobal, slot),
                    _ => return Err(self.unsupported("assignment to a function", expr.span)),
                };
                self.emit(op, expr.span);
                self.emit(slot, expr.span);
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs, expr.span),
            ExprKind::Unary { op, operand } => {
                self.gen_expr(operand)?;
                match op {
                    UnaryOp::Neg => self.emit(OpCode::Neg, expr.span),
                    UnaryOp::Not => self.emit(OpCode::Not, expr.span),
                }
                Ok(())
            }
            ExprKind::Call { callee, args } => self.gen_call(callee, args, expr.span),
            ExprKind::Error => Err(CodegenError::ErrorNode {
                position: self.position(expr.span),
            }),
        }
    }

    fn gen_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<(), CodegenError> {
        match op {
            // the left value stays on the stack as the result when it decides the outcome
            BinaryOp::And | BinaryOp::Or => {
                let end = self.new_label();
                self.gen_expr(lhs)?;
                self.emit(OpCode::Dup, span);
                if op == BinaryOp::Or {
                    self.emit(OpCode::Not, span);
                }
                self.emit_jump(OpCode::JmpIfFalse, end, span);
                self.emit(OpCode::Pop, span);
                self.gen_expr(rhs)?;
                self.place_label(end)
            }
            _ => {
                let lhs_ty = self.ty(lhs)?;
                let rhs_ty = self.ty(rhs)?;
                self.gen_expr(lhs)?;
                if rhs_ty.needs_widening_from(lhs_ty) {
                    self.emit(OpCode::I2F, lhs.span);
                }
                self.gen_expr(rhs)?;
                if lhs_ty.needs_widening_from(rhs_ty) {
                    self.emit(OpCode::I2F, rhs.span);
                }

                let (instr, negate) = match op {
                    BinaryOp::Add => (OpCode::Add, false),
                    BinaryOp::Sub => (OpCode::Sub, false),
                    BinaryOp::Mul => (OpCode::Mul, false),
                    BinaryOp::Div => (OpCode::Div, false),
                    BinaryOp::Rem => (OpCode::Rem, false),
                    BinaryOp::Eq => (OpCode::Eq, false),
                    BinaryOp::NotEq => (OpCode::Eq, true),
                    BinaryOp::Less => (OpCode::Less, false),
                    BinaryOp::LessEq => (OpCode::Greater, true),
                    BinaryOp::Greater => (OpCode::Greater, false),
                    BinaryOp::GreaterEq => (OpCode::Less, true),
                    BinaryOp::And | BinaryOp::Or => unreachable!(),
                };
                self.emit(instr, span);
                if negate {
                    self.emit(OpCode::Not, span);
                }
                Ok(())
            }
        }
    }

    fn gen_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Result<(), CodegenError> {
        let ident = match &callee.kind {
            ExprKind::Identifier(ident) => ident,
            _ => return Err(self.unsupported("calling an expression", callee.span)),
        };
        let symbol = self.symbol(ident.symbol, ident.span)?;
        let params = match &symbol.ty {
            Type::Function { params, .. } => params,
            _ => {
                return Err(CodegenError::Unannotated {
                    position: self.position(callee.span),
                })
            }
        };
        for (arg, param) in args.iter().zip(params) {
            self.gen_expr_as(arg, param)?;
        }
        let arity = u8::try_from(args.len())
            .map_err(|_| self.unsupported("a call with more than 255 arguments", span))?;

        match symbol.storage {
            Storage::Function(index) => {
                self.emit(OpCode::Call, span);
                let line = self.source.line(span.start);
                self.chunk().write_u16(index, line);
                self.emit(arity, span);
            }
            Storage::Native(index) => {
                self.emit(OpCode::CallNative, span);
                self.emit(index, span);
                self.emit(arity, span);
            }
            _ => return Err(self.unsupported("calling a variable", callee.span)),
        }
        Ok(())
    }
}

/// Evaluates arithmetic over numeric literals. Returns `None` when the expression is not constant
/// or when evaluating it would fail at runtime (division by zero or `Int` overflow).
fn fold(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(val)) => Some(Value::Int(*val)),
        ExprKind::Literal(Literal::Float(val)) => Some(Value::Float(*val)),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match fold(operand)? {
            Value::Int(val) => val.checked_neg().map(Value::Int),
            Value::Float(val) => Some(Value::Float(-val)),
            _ => None,
        },
        ExprKind::Binary { op, lhs, rhs } if op.is_arithmetic() => {
            fold_arithmetic(*op, fold(lhs)?, fold(rhs)?)
        }
        _ => None,
    }
}

fn fold_arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => None,
        }
        .map(Value::Int),
        (a, b) => {
            let a = a.as_float()?;
            let b = b.as_float()?;
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return None,
            };
            Some(Value::Float(result))
        }
    }
}

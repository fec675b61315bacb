//! Symbols and the scope tree.
//!
//! Scopes and symbols live in two arenas owned by [`SymbolTable`]. A scope refers to its enclosing
//! scope by index, and the AST refers to symbols by [`SymbolId`].

use derive_more::Display;
use rill_parser::ast::SymbolId;
use rill_parser::types::Type;
use rill_source::Span;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SymbolKind {
    #[display("variable")]
    Variable,
    #[display("parameter")]
    Parameter,
    #[display("function")]
    Function,
    #[display("builtin")]
    Builtin,
}

/// Where a symbol lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Storage {
    /// Slot in the global table.
    #[display("global {_0}")]
    Global(u8),
    /// Slot relative to the frame base.
    #[display("local {_0}")]
    Local(u8),
    /// Index into the module functions.
    #[display("function {_0}")]
    Function(u16),
    /// Index of a native function.
    #[display("native {_0}")]
    Native(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub kind: SymbolKind,
    /// The declaring scope.
    pub scope: ScopeId,
    pub span: Span,
    pub storage: Storage,
    /// Set when the symbol is read.
    pub used: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    names: HashMap<String, SymbolId>,
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Creates a table containing only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            symbols: Vec::new(),
        }
    }

    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Creates a new scope nested in `parent`.
    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            names: HashMap::new(),
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// Binds `symbol` in its scope.
    /// Fails with the already bound symbol if the name is taken in that same scope.
    pub fn declare(&mut self, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let scope = &mut self.scopes[symbol.scope.0 as usize];
        if let Some(existing) = scope.names.get(&symbol.name) {
            return Err(*existing);
        }
        let id = SymbolId(self.symbols.len() as u32);
        scope.names.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        Ok(id)
    }

    /// Looks `name` up in `scope` only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.0 as usize].names.get(name).copied()
    }

    /// Looks `name` up in `scope` and then in every enclosing scope.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(scope) = current {
            if let Some(id) = self.lookup_local(scope, name) {
                return Some(id);
            }
            current = self.parent(scope);
        }
        None
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| (SymbolId(i as u32), symbol))
    }

    /// Symbols declared directly in `scope`, in declaration order.
    pub fn symbols_in(&self, scope: ScopeId) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols()
            .filter(move |(_, symbol)| symbol.scope == scope)
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, scope: ScopeId, slot: u8) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty: Type::Int,
            kind: SymbolKind::Variable,
            scope,
            span: Span::default(),
            storage: Storage::Local(slot),
            used: false,
        }
    }

    #[test]
    fn test_declare_and_lookup() {
        let mut table = SymbolTable::new();
        let global = table.global_scope();
        let inner = table.push_scope(global);

        let x = table.declare(variable("x", global, 0)).unwrap();
        assert_eq!(table.lookup(inner, "x"), Some(x));
        assert_eq!(table.lookup_local(inner, "x"), None);

        // shadowing in a child scope is allowed
        let shadow = table.declare(variable("x", inner, 1)).unwrap();
        assert_eq!(table.lookup(inner, "x"), Some(shadow));
        assert_eq!(table.lookup(global, "x"), Some(x));
        assert_eq!(table.lookup(inner, "y"), None);
    }

    #[test]
    fn test_redeclaration_keeps_first() {
        let mut table = SymbolTable::new();
        let global = table.global_scope();
        let first = table.declare(variable("x", global, 0)).unwrap();
        assert_eq!(table.declare(variable("x", global, 1)), Err(first));
        assert_eq!(table.lookup(global, "x"), Some(first));
        assert_eq!(table.symbol(first).storage, Storage::Local(0));
        assert_eq!(table.symbols_in(global).count(), 1);
    }
}

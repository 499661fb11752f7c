//! Scoped storage of every declared name.
//!
//! Scopes live in an arena and point at their parent by index. The active
//! scope chain is the path from the current scope up to `global`, so lookups
//! walk that chain innermost first and never see a sibling function's locals.

use colored::Colorize;
use hashbrown::HashMap;
use itertools::Itertools;

use crate::{
    frontend::ast::LiteralKind,
    index::{IndexVec, simple_index},
    middle::ty::Type,
};

pub const GLOBAL_SCOPE: &str = "global";

simple_index! {
    pub struct ScopeId;
}

simple_index! {
    pub struct SymbolId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    Program,
    Constant,
    Variable,
    Parameter,
    Function,
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub declared_type: Option<Type>,
    pub scope: String,
    pub line: usize,
    /// Functions only, in declaration order
    pub parameters: Vec<(Option<Type>, String)>,
    /// Functions only
    pub return_type: Option<Type>,
    /// 1-based position of a parameter
    pub order: Option<usize>,
    pub dimensions: Vec<u64>,
    pub fields: Vec<(String, Type)>,
    /// Constants only
    pub value: Option<LiteralKind>,
}

#[derive(Debug)]
pub struct Scope {
    pub name: String,
    pub parent: Option<ScopeId>,
    bindings: HashMap<String, SymbolId>,
    declared: Vec<SymbolId>,
}

/// `name` was already declared in the current scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateNameError {
    pub name: String,
    pub scope: String,
    /// Line of the declaration that was kept
    pub previous_line: usize,
}

impl core::fmt::Display for DuplicateNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "`{}` is already declared in scope `{}` (line {})",
            self.name, self.scope, self.previous_line
        )
    }
}

impl std::error::Error for DuplicateNameError {}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: IndexVec<ScopeId, Scope>,
    symbols: IndexVec<SymbolId, Symbol>,
    current: ScopeId,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut scopes = IndexVec::new();
        let global = scopes.push(Scope {
            name: GLOBAL_SCOPE.to_string(),
            parent: None,
            bindings: HashMap::new(),
            declared: Vec::new(),
        });

        Self {
            scopes,
            symbols: IndexVec::new(),
            current: global,
        }
    }

    pub fn current_scope_name(&self) -> &str {
        &self.scopes[self.current].name
    }

    /// Opens a new scope nested in the current one
    pub fn enter_scope(&mut self, name: impl Into<String>) {
        let scope = self.scopes.push(Scope {
            name: name.into(),
            parent: Some(self.current),
            bindings: HashMap::new(),
            declared: Vec::new(),
        });

        self.current = scope;
    }

    /// Returns to the parent scope. Does nothing at `global`.
    pub fn exit_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current].parent {
            self.current = parent;
        }
    }

    /// Declares `name` in the current scope and hands back the new symbol so
    /// the caller can fill in kind specific attributes.
    pub fn declare(
        &mut self,
        name: &str,
        kind: SymbolKind,
        declared_type: Option<Type>,
        line: usize,
    ) -> Result<&mut Symbol, DuplicateNameError> {
        let scope = &self.scopes[self.current];

        if let Some(&previous) = scope.bindings.get(name) {
            return Err(DuplicateNameError {
                name: name.to_string(),
                scope: scope.name.clone(),
                previous_line: self.symbols[previous].line,
            });
        }

        let id = self.symbols.push(Symbol {
            name: name.to_string(),
            kind,
            declared_type,
            scope: scope.name.clone(),
            line,
            parameters: Vec::new(),
            return_type: None,
            order: None,
            dimensions: Vec::new(),
            fields: Vec::new(),
            value: None,
        });

        let scope = &mut self.scopes[self.current];
        scope.bindings.insert(name.to_string(), id);
        scope.declared.push(id);

        Ok(&mut self.symbols[id])
    }

    /// With a scope name, searches only scopes of that name. Otherwise walks
    /// the active chain from the innermost scope out to `global`.
    pub fn lookup(&self, name: &str, scope: Option<&str>) -> Option<&Symbol> {
        if let Some(scope_name) = scope {
            return self
                .scopes
                .iter()
                .filter(|scope| scope.name == scope_name)
                .find_map(|scope| scope.bindings.get(name))
                .map(|&id| &self.symbols[id]);
        }

        let mut scope = Some(self.current);

        while let Some(id) = scope {
            if let Some(&symbol) = self.scopes[id].bindings.get(name) {
                return Some(&self.symbols[symbol]);
            }

            scope = self.scopes[id].parent;
        }

        None
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// Every symbol declared in scopes with the given name, in declaration
    /// order
    pub fn symbols_in_scope<'a>(&'a self, scope_name: &'a str) -> impl Iterator<Item = &'a Symbol> {
        self.scopes
            .iter()
            .filter(move |scope| scope.name == scope_name)
            .flat_map(|scope| scope.declared.iter().map(|&id| &self.symbols[id]))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

fn format_type(ty: &Option<Type>) -> String {
    match ty {
        Some(ty) => ty.to_string(),
        None => "?".to_string(),
    }
}

impl core::fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<16} {:<10} {:<24} {:<12} {}",
            "name".bold(),
            "kind".bold(),
            "type".bold(),
            "scope".bold(),
            "line".bold()
        )?;

        for scope in self.scopes.iter() {
            for symbol in scope.declared.iter().map(|&id| &self.symbols[id]) {
                writeln!(
                    f,
                    "{:<16} {:<10} {:<24} {:<12} {}",
                    symbol.name,
                    symbol.kind,
                    format_type(&symbol.declared_type),
                    symbol.scope,
                    symbol.line
                )?;

                if symbol.kind == SymbolKind::Function {
                    writeln!(
                        f,
                        "    parameters: ({}) -> {}",
                        symbol
                            .parameters
                            .iter()
                            .map(|(ty, name)| format!("{name}: {}", format_type(ty)))
                            .join(", "),
                        format_type(&symbol.return_type)
                    )?;
                }

                if let Some(order) = symbol.order {
                    writeln!(f, "    position: {order}")?;
                }

                if !symbol.dimensions.is_empty() {
                    writeln!(f, "    dimensions: [{}]", symbol.dimensions.iter().join(", "))?;
                }

                if !symbol.fields.is_empty() {
                    writeln!(
                        f,
                        "    fields: {}",
                        symbol
                            .fields
                            .iter()
                            .map(|(name, ty)| format!("{name}: {ty}"))
                            .join(", ")
                    )?;
                }

                if let Some(value) = &symbol.value {
                    writeln!(f, "    value: {value}")?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(table: &mut SymbolTable, name: &str, kind: SymbolKind, ty: Type) {
        table.declare(name, kind, Some(ty), 1).unwrap();
    }

    #[test]
    fn function_locals_are_invisible_elsewhere() {
        let mut table = SymbolTable::new();
        declare(&mut table, "g", SymbolKind::Variable, Type::INTEGER);

        table.enter_scope("f");
        declare(&mut table, "local", SymbolKind::Variable, Type::REAL);
        assert_eq!(table.lookup("g", None).unwrap().scope, "global");
        assert_eq!(table.lookup("local", None).unwrap().scope, "f");
        table.exit_scope();

        table.enter_scope("h");
        assert!(table.lookup("local", None).is_none());
        assert!(table.lookup("g", None).is_some());
        table.exit_scope();

        assert!(table.lookup("local", None).is_none());
        assert!(table.lookup("local", Some("f")).is_some());
    }

    #[test]
    fn locals_shadow_globals() {
        let mut table = SymbolTable::new();
        declare(&mut table, "x", SymbolKind::Variable, Type::INTEGER);

        table.enter_scope("f");
        declare(&mut table, "x", SymbolKind::Variable, Type::REAL);

        let symbol = table.lookup("x", None).unwrap();
        assert_eq!(symbol.scope, "f");
        assert_eq!(symbol.declared_type, Some(Type::REAL));

        table.exit_scope();
        assert_eq!(table.lookup("x", None).unwrap().declared_type, Some(Type::INTEGER));
    }

    #[test]
    fn duplicate_in_same_scope_keeps_first() {
        let mut table = SymbolTable::new();
        table
            .declare("x", SymbolKind::Variable, Some(Type::INTEGER), 2)
            .unwrap();

        let error = table
            .declare("x", SymbolKind::Constant, Some(Type::REAL), 5)
            .unwrap_err();

        assert_eq!(error.previous_line, 2);
        assert_eq!(error.scope, "global");
        assert_eq!(table.lookup("x", None).unwrap().kind, SymbolKind::Variable);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn exiting_global_is_a_no_op() {
        let mut table = SymbolTable::new();
        table.exit_scope();
        table.exit_scope();

        assert_eq!(table.current_scope_name(), GLOBAL_SCOPE);
    }

    #[test]
    fn symbols_are_listed_in_declaration_order() {
        let mut table = SymbolTable::new();
        declare(&mut table, "b", SymbolKind::Variable, Type::INTEGER);
        declare(&mut table, "a", SymbolKind::Variable, Type::INTEGER);

        let names = table
            .symbols_in_scope("global")
            .map(|symbol| symbol.name.as_str())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["b", "a"]);
    }
}

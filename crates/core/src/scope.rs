//! Arena of lexical scopes shared by the code generator and the resolver.
//!
//! The generator creates scopes in source order; each resolver pass walks
//! them again through [`ScopeTree::use_next_scope`], which checks that the
//! walk stays in step with the order of creation.

use std::rc::Rc;

use a816_assets::TextTable;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::ast::Block;
use crate::expr::SymbolLookup;

pub type ScopeId = usize;

pub const ROOT_SCOPE: ScopeId = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SymbolValue {
    Int(i64),
    /// Command-line definitions keep their text; numeric text still
    /// evaluates as a number.
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Anonymous,
    Named(String),
    /// Loop iteration scope, never exported or dumped.
    Internal,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    symbols: IndexMap<String, SymbolValue>,
    labels: IndexMap<String, i64>,
    code: FxHashMap<String, Block>,
    table: Option<Rc<TextTable>>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            symbols: IndexMap::new(),
            labels: IndexMap::new(),
            code: FxHashMap::default(),
            table: None,
        }
    }

    pub fn symbols(&self) -> &IndexMap<String, SymbolValue> {
        &self.symbols
    }

    pub fn labels(&self) -> &IndexMap<String, i64> {
        &self.labels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("scope traversal out of sync: expected a child of scope {expected}, found scope {found:?}")]
    OutOfSync {
        expected: ScopeId,
        found: Option<ScopeId>,
    },
    #[error("cannot leave the root scope")]
    LeavingRoot,
}

#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    current: ScopeId,
    last_used: ScopeId,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Root, None)],
            current: ROOT_SCOPE,
            last_used: ROOT_SCOPE,
        }
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id)
    }

    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter().enumerate()
    }

    pub fn parent_of(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes.get(id).and_then(|scope| scope.parent)
    }

    /// Appends a child of the current scope without entering it.
    pub fn append_scope(&mut self, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope::new(kind, Some(self.current)));
        self.scopes.len() - 1
    }

    pub fn append_named_scope(&mut self, name: impl Into<String>) -> ScopeId {
        self.append_scope(ScopeKind::Named(name.into()))
    }

    pub fn append_internal_scope(&mut self) -> ScopeId {
        self.append_scope(ScopeKind::Internal)
    }

    /// Enters the next scope in creation order, which must be a child of
    /// the current one.
    pub fn use_next_scope(&mut self) -> Result<ScopeId, ScopeError> {
        let next = self.last_used + 1;
        match self.scopes.get(next) {
            Some(scope) if scope.parent == Some(self.current) => {
                self.last_used = next;
                self.current = next;
                Ok(next)
            }
            found => Err(ScopeError::OutOfSync {
                expected: self.current,
                found: found.map(|_| next),
            }),
        }
    }

    /// Returns to the parent scope. With `exports`, a named scope publishes
    /// its symbols and labels to the parent as `name.key`.
    pub fn restore_scope(&mut self, exports: bool) -> Result<(), ScopeError> {
        let scope = &self.scopes[self.current];
        let parent = scope.parent.ok_or(ScopeError::LeavingRoot)?;
        if exports && let ScopeKind::Named(name) = &scope.kind {
            let symbols: Vec<(String, SymbolValue)> = scope
                .symbols
                .iter()
                .map(|(key, value)| (format!("{name}.{key}"), value.clone()))
                .collect();
            let labels: Vec<(String, i64)> = scope
                .labels
                .iter()
                .map(|(key, value)| (format!("{name}.{key}"), *value))
                .collect();
            let target = &mut self.scopes[parent];
            target.symbols.extend(symbols);
            target.labels.extend(labels);
        }
        self.current = parent;
        Ok(())
    }

    /// Rewinds the traversal cursor to the root before a new pass.
    pub fn reset(&mut self) {
        self.current = ROOT_SCOPE;
        self.last_used = ROOT_SCOPE;
    }

    /// Binds a symbol in the current scope, warning when an existing
    /// binding changes value.
    pub fn add_symbol(&mut self, name: impl Into<String>, value: SymbolValue) {
        let name = name.into();
        if let Some(previous) = self.scopes[self.current].symbols.get(&name)
            && *previous != value
        {
            warn!(symbol = %name, ?previous, new = ?value, "symbol redefined");
        }
        self.scopes[self.current].symbols.insert(name, value);
    }

    /// Binds a symbol in `scope` without redefinition checks.
    pub fn set_symbol(&mut self, scope: ScopeId, name: impl Into<String>, value: SymbolValue) {
        if let Some(scope) = self.scopes.get_mut(scope) {
            scope.symbols.insert(name.into(), value);
        }
    }

    pub fn add_label(&mut self, name: impl Into<String>, address: i64) {
        self.scopes[self.current].labels.insert(name.into(), address);
    }

    pub fn add_code_symbol(&mut self, name: impl Into<String>, block: Block) {
        self.scopes[self.current].code.insert(name.into(), block);
    }

    pub fn set_table(&mut self, table: Rc<TextTable>) {
        self.scopes[self.current].table = Some(table);
    }

    pub fn table(&self) -> Option<Rc<TextTable>> {
        self.chain(self.current)
            .find_map(|scope| scope.table.clone())
    }

    pub fn code_for(&self, name: &str) -> Option<&Block> {
        self.chain(self.current)
            .find_map(|scope| scope.code.get(name))
    }

    pub fn value_for(&self, name: &str) -> Option<SymbolValue> {
        self.value_from(self.current, name)
    }

    /// Looks `name` up starting at `scope` and walking up the parents.
    pub fn value_from(&self, scope: ScopeId, name: &str) -> Option<SymbolValue> {
        self.chain(scope).find_map(|scope| {
            scope
                .symbols
                .get(name)
                .cloned()
                .or_else(|| scope.labels.get(name).map(|address| SymbolValue::Int(*address)))
        })
    }

    pub fn view(&self, scope: ScopeId) -> ScopeView<'_> {
        ScopeView { tree: self, scope }
    }

    fn chain(&self, start: ScopeId) -> impl Iterator<Item = &Scope> {
        std::iter::successors(self.scopes.get(start), |scope| {
            scope.parent.and_then(|parent| self.scopes.get(parent))
        })
    }

    /// Symbol tables of every non-internal scope, for dumps and exports.
    pub fn symbol_tables(&self) -> Vec<ScopeSymbols> {
        self.scopes
            .iter()
            .filter(|scope| scope.kind != ScopeKind::Internal)
            .filter(|scope| !scope.symbols.is_empty() || !scope.labels.is_empty())
            .map(|scope| {
                let mut symbols: Vec<(String, SymbolValue)> = scope
                    .symbols
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                symbols.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
                let mut labels: Vec<(String, i64)> = scope
                    .labels
                    .iter()
                    .map(|(name, value)| (name.clone(), *value))
                    .collect();
                labels.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
                ScopeSymbols {
                    scope: match &scope.kind {
                        ScopeKind::Root => "root".to_string(),
                        ScopeKind::Named(name) => name.clone(),
                        ScopeKind::Anonymous | ScopeKind::Internal => "anonymous".to_string(),
                    },
                    symbols: symbols.into_iter().collect(),
                    labels: labels.into_iter().collect(),
                }
            })
            .collect()
    }
}

/// Read-only lookup rooted at one scope.
#[derive(Debug, Clone, Copy)]
pub struct ScopeView<'a> {
    tree: &'a ScopeTree,
    scope: ScopeId,
}

impl SymbolLookup for ScopeView<'_> {
    fn symbol_value(&self, name: &str) -> Option<SymbolValue> {
        self.tree.value_from(self.scope, name)
    }
}

impl SymbolLookup for ScopeTree {
    fn symbol_value(&self, name: &str) -> Option<SymbolValue> {
        self.value_for(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSymbols {
    pub scope: String,
    pub symbols: IndexMap<String, SymbolValue>,
    pub labels: IndexMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_walk_up_the_parent_chain() {
        let mut tree = ScopeTree::new();
        tree.add_symbol("outer", SymbolValue::Int(1));
        tree.append_scope(ScopeKind::Anonymous);
        tree.use_next_scope().expect("enter");
        tree.add_symbol("inner", SymbolValue::Int(2));
        tree.add_symbol("outer", SymbolValue::Int(3));

        assert_eq!(tree.value_for("outer"), Some(SymbolValue::Int(3)));
        assert_eq!(tree.value_for("inner"), Some(SymbolValue::Int(2)));
        tree.restore_scope(true).expect("leave");
        assert_eq!(tree.value_for("outer"), Some(SymbolValue::Int(1)));
        assert_eq!(tree.value_for("inner"), None);
    }

    #[test]
    fn named_scope_exports_only_on_exit() {
        let mut tree = ScopeTree::new();
        tree.append_named_scope("foo");
        tree.use_next_scope().expect("enter");
        tree.add_symbol("bar", SymbolValue::Int(4));
        tree.add_label("start", 0x8000);
        assert_eq!(tree.view(ROOT_SCOPE).symbol_value("foo.bar"), None);

        tree.restore_scope(true).expect("leave");
        assert_eq!(tree.value_for("foo.bar"), Some(SymbolValue::Int(4)));
        assert_eq!(tree.value_for("foo.start"), Some(SymbolValue::Int(0x8000)));
    }

    #[test]
    fn anonymous_scopes_do_not_export() {
        let mut tree = ScopeTree::new();
        tree.append_scope(ScopeKind::Anonymous);
        tree.use_next_scope().expect("enter");
        tree.add_symbol("hidden", SymbolValue::Int(1));
        tree.restore_scope(true).expect("leave");
        assert_eq!(tree.symbol_tables().len(), 1);
        assert_eq!(tree.value_for("hidden"), None);
    }

    #[test]
    fn traversal_replays_creation_order() {
        let mut tree = ScopeTree::new();
        let first = tree.append_scope(ScopeKind::Anonymous);
        tree.use_next_scope().expect("enter first");
        let nested = tree.append_internal_scope();
        tree.use_next_scope().expect("enter nested");
        tree.restore_scope(false).expect("leave nested");
        tree.restore_scope(false).expect("leave first");

        tree.reset();
        assert_eq!(tree.use_next_scope(), Ok(first));
        assert_eq!(tree.use_next_scope(), Ok(nested));
        tree.restore_scope(false).expect("leave nested");
        tree.restore_scope(false).expect("leave first");
        assert!(matches!(
            tree.use_next_scope(),
            Err(ScopeError::OutOfSync { found: None, .. })
        ));
    }

    #[test]
    fn out_of_sync_traversal_is_detected() {
        let mut tree = ScopeTree::new();
        tree.append_scope(ScopeKind::Anonymous);
        tree.use_next_scope().expect("enter");
        tree.append_scope(ScopeKind::Anonymous);
        tree.restore_scope(false).expect("leave");

        tree.reset();
        tree.use_next_scope().expect("enter");
        tree.restore_scope(false).expect("leave");
        assert!(matches!(
            tree.use_next_scope(),
            Err(ScopeError::OutOfSync { found: Some(2), .. })
        ));
        assert_eq!(tree.restore_scope(false), Err(ScopeError::LeavingRoot));
    }

    #[test]
    fn tables_are_inherited() {
        let mut tree = ScopeTree::new();
        tree.set_table(Rc::new(TextTable::default()));
        tree.append_scope(ScopeKind::Anonymous);
        tree.use_next_scope().expect("enter");
        assert!(tree.table().is_some());
    }
}

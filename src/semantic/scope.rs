//! Scope tree for Rx
//!
//! Scopes live in an arena addressed by [`ScopeId`]. Passes find the scope of
//! a node through the `NodeId -> ScopeId` map recorded by the collector; the
//! per-scope child cursor is kept as a check that every pass visits scopes in
//! the order they were created.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

use super::error::SemanticError;
use super::symbol::{ConstSymbol, EnumSymbol, FuncSymbol, StructSymbol, TraitSymbol, VariableSymbol};
use super::types::Ty;
use crate::parser::ast::NodeId;

/// Index of a scope in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

impl ScopeId {
    /// The global scope
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn is_root(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Block,
    Function,
    Trait,
    Impl,
    Loop,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeKind::Global => "GLOBAL",
            ScopeKind::Block => "BLOCK",
            ScopeKind::Function => "FUNCTION",
            ScopeKind::Trait => "TRAIT",
            ScopeKind::Impl => "IMPL",
            ScopeKind::Loop => "LOOP",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Impl target, trait name, or the function's own name
    pub self_type: Option<String>,
    pub consts: IndexMap<String, ConstSymbol>,
    pub structs: IndexMap<String, StructSymbol>,
    pub enums: IndexMap<String, EnumSymbol>,
    pub funcs: IndexMap<String, FuncSymbol>,
    pub traits: IndexMap<String, TraitSymbol>,
    pub variables: IndexMap<String, VariableSymbol>,
    /// Unified type of the `break`s targeting this loop
    pub break_type: Option<Ty>,
    cursor: usize,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, self_type: Option<String>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            self_type,
            consts: IndexMap::new(),
            structs: IndexMap::new(),
            enums: IndexMap::new(),
            funcs: IndexMap::new(),
            traits: IndexMap::new(),
            variables: IndexMap::new(),
            break_type: None,
            cursor: 0,
        }
    }
}

/// Owner of every scope of one crate
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    node_scopes: HashMap<NodeId, ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// A tree holding only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Global, None, None)],
            node_scopes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.get(id).parent
    }

    /// Create a scope for `node` under `parent`.
    pub fn add_child(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        self_type: Option<String>,
        node: NodeId,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope::new(kind, Some(parent), self_type));
        self.get_mut(parent).children.push(id);
        self.node_scopes.insert(node, id);
        id
    }

    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.node_scopes.get(&node).copied()
    }

    /// Enter the scope recorded for `node`, checking it is the next child of `parent`.
    pub fn enter(&mut self, parent: ScopeId, node: NodeId) -> Result<ScopeId, SemanticError> {
        let id = self
            .scope_of(node)
            .ok_or(SemanticError::UnknownScopeNode(node.0))?;

        let scope = self.get_mut(parent);
        if scope.children.get(scope.cursor) != Some(&id) {
            return Err(SemanticError::ScopeOutOfSync {
                node: node.0,
                expected: id.0,
                cursor: scope.cursor,
            });
        }
        scope.cursor += 1;
        Ok(id)
    }

    pub fn reset_all_cursors(&mut self) {
        for scope in &mut self.scopes {
            scope.cursor = 0;
        }
    }

    /// `from` and each of its ancestors, innermost first.
    pub fn ancestors(&self, from: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(from), move |id| self.parent(*id))
    }

    fn lookup<'a, T>(
        &'a self,
        from: ScopeId,
        pick: impl Fn(&'a Scope) -> Option<&'a T>,
    ) -> Option<&'a T> {
        self.ancestors(from).find_map(|id| pick(self.get(id)))
    }

    pub fn find_const(&self, from: ScopeId, name: &str) -> Option<&ConstSymbol> {
        self.lookup(from, |s| s.consts.get(name))
    }

    pub fn find_const_scope(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        self.ancestors(from)
            .find(|id| self.get(*id).consts.contains_key(name))
    }

    pub fn find_struct(&self, from: ScopeId, name: &str) -> Option<&StructSymbol> {
        self.lookup(from, |s| s.structs.get(name))
    }

    pub fn find_struct_scope(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        self.ancestors(from)
            .find(|id| self.get(*id).structs.contains_key(name))
    }

    /// Mutable access to the struct symbol visible from `from`.
    pub fn find_struct_mut(&mut self, from: ScopeId, name: &str) -> Option<&mut StructSymbol> {
        let owner = self.find_struct_scope(from, name)?;
        self.get_mut(owner).structs.get_mut(name)
    }

    pub fn find_enum(&self, from: ScopeId, name: &str) -> Option<&EnumSymbol> {
        self.lookup(from, |s| s.enums.get(name))
    }

    pub fn find_func(&self, from: ScopeId, name: &str) -> Option<&FuncSymbol> {
        self.lookup(from, |s| s.funcs.get(name))
    }

    pub fn find_trait(&self, from: ScopeId, name: &str) -> Option<&TraitSymbol> {
        self.lookup(from, |s| s.traits.get(name))
    }

    pub fn find_variable(&self, from: ScopeId, name: &str) -> Option<&VariableSymbol> {
        self.lookup(from, |s| s.variables.get(name))
    }

    /// Innermost scope of `kind`, giving up at the first scope of a `barrier` kind.
    pub fn nearest(&self, from: ScopeId, kind: ScopeKind, barriers: &[ScopeKind]) -> Option<ScopeId> {
        for id in self.ancestors(from) {
            let scope_kind = self.get(id).kind;
            if scope_kind == kind {
                return Some(id);
            }
            if barriers.contains(&scope_kind) {
                return None;
            }
        }
        None
    }

    /// Loop targeted by a `break`/`continue` at `from`; loops never cross a function.
    pub fn enclosing_loop(&self, from: ScopeId) -> Option<ScopeId> {
        self.nearest(
            from,
            ScopeKind::Loop,
            &[ScopeKind::Function, ScopeKind::Impl, ScopeKind::Trait],
        )
    }

    pub fn enclosing_function(&self, from: ScopeId) -> Option<ScopeId> {
        self.nearest(from, ScopeKind::Function, &[])
    }

    /// Type named by `Self` at `from`.
    pub fn self_type(&self, from: ScopeId) -> Option<&str> {
        self.ancestors(from)
            .map(|id| self.get(id))
            .find(|s| matches!(s.kind, ScopeKind::Impl | ScopeKind::Trait))
            .and_then(|s| s.self_type.as_deref())
    }

    /// Snapshot of a trait's declared items, read from its scope.
    pub fn trait_symbol(&self, trait_scope: ScopeId, name: &str) -> TraitSymbol {
        let scope = self.get(trait_scope);
        let mut symbol = TraitSymbol::new(name);
        symbol.consts = scope.consts.clone();
        for func in scope.funcs.values() {
            if func.method_kind.is_method() {
                symbol.methods.insert(func.name.clone(), func.clone());
            } else {
                symbol.assoc_funcs.insert(func.name.clone(), func.clone());
            }
        }
        symbol
    }

    /// Every scope, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter().enumerate().map(|(i, s)| (ScopeId(i), s))
    }
}

//! Scope chains.
//!
//! Scopes form a singly linked tree toward the root `Decls` scope of a
//! file. They are allocated in a compilation-wide arena and referenced by
//! [`ScopeId`]; walking `parent` links is how name lookup, defer replay,
//! and comptime-context detection all work.

use rustc_hash::FxHashMap;
use zinc_ir::ast::{DeferKind, NodeId};
use zinc_ir::Name;
use zinc_types::{ImportId, TypeId};

use crate::tld::TldId;
use crate::VarId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scope payload.
#[derive(Debug)]
pub enum ScopeKind {
    /// Container or file scope owning top-level declarations.
    Decls {
        decls: FxHashMap<Name, TldId>,
        /// Declaration order, for deterministic `use` hoisting.
        decl_order: Vec<TldId>,
        safety_off: bool,
        /// The container type these declarations belong to, if any.
        container_ty: Option<TypeId>,
    },
    /// `{ ... }` with its labels and its own safety override.
    Block { safety_off: bool },
    /// A recorded defer statement; replayed on exits of inner scopes.
    Defer { kind: DeferKind, expr_node: NodeId },
    /// Inside a defer body: returns are rejected here.
    DeferExpr,
    /// One declared variable; children see it in lookups.
    VarDecl { var: VarId },
    /// Inside `@cImport`.
    CImport,
    /// Loop body: break/continue resolve against this.
    Loop { is_inline: bool },
    /// Function definition root.
    FnDef { fn_id: zinc_types::FnId },
    /// Forced compile-time context.
    Comptime,
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub node: NodeId,
    pub import: ImportId,
    pub kind: ScopeKind,
}

/// Compilation-wide scope storage.
#[derive(Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> ScopeArena {
        ScopeArena::default()
    }

    pub fn alloc(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// Nearest enclosing `Decls` scope.
    pub fn decls_scope(&self, mut id: ScopeId) -> ScopeId {
        loop {
            if matches!(self.get(id).kind, ScopeKind::Decls { .. }) {
                return id;
            }
            id = self.get(id).parent.expect("scope chain ends in Decls");
        }
    }

    /// Whether the chain passes through a comptime marker (an explicit
    /// `comptime` scope or an inline loop) before the function or file
    /// boundary.
    pub fn is_comptime(&self, mut id: ScopeId) -> bool {
        loop {
            match &self.get(id).kind {
                ScopeKind::Comptime => return true,
                ScopeKind::Loop { is_inline: true } => return true,
                ScopeKind::FnDef { .. } | ScopeKind::Decls { .. } => return false,
                _ => match self.get(id).parent {
                    Some(parent) => id = parent,
                    None => return false,
                },
            }
        }
    }

    /// Whether runtime safety checks are enabled at this scope.
    pub fn safety_on(&self, mut id: ScopeId) -> bool {
        loop {
            match &self.get(id).kind {
                ScopeKind::Block { safety_off } | ScopeKind::Decls { safety_off, .. } => {
                    if *safety_off {
                        return false;
                    }
                }
                _ => {}
            }
            match self.get(id).parent {
                Some(parent) => id = parent,
                None => return true,
            }
        }
    }

    /// Nearest enclosing function, if inside one.
    pub fn fn_scope(&self, mut id: ScopeId) -> Option<zinc_types::FnId> {
        loop {
            match &self.get(id).kind {
                ScopeKind::FnDef { fn_id } => return Some(*fn_id),
                _ => id = self.get(id).parent?,
            }
        }
    }

    /// Whether `id` is inside a defer body (walking up to the function
    /// or file boundary).
    pub fn in_defer_expr(&self, mut id: ScopeId) -> bool {
        loop {
            match &self.get(id).kind {
                ScopeKind::DeferExpr => return true,
                ScopeKind::FnDef { .. } | ScopeKind::Decls { .. } => return false,
                _ => match self.get(id).parent {
                    Some(parent) => id = parent,
                    None => return false,
                },
            }
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

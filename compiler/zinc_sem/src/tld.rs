//! Top-level declarations and their lazy resolution states.

use zinc_ir::ast::{NodeId, VisibMod};
use zinc_ir::Name;
use zinc_types::{ConstValue, FnId, ImportId, TypeId};

use crate::scope::ScopeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TldId(pub u32);

impl TldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lazy resolution state machine.
///
/// Re-entering `Resolving` through the dependency graph is a cycle; the
/// resolver reports it once and demotes the declaration to `Invalid`,
/// after which references see poison without new diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TldResolution {
    Unresolved,
    Resolving,
    Invalid,
    Ok,
}

/// Handle to an emitted global variable (table on the compilation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub enum TldKind {
    Var {
        /// Resolved initializer (const decls) or the global's comptime
        /// part for runtime globals.
        value: Option<ConstValue>,
        var_ty: TypeId,
        is_const: bool,
        /// Runtime storage, when one is emitted.
        global: Option<GlobalId>,
    },
    Fn {
        fn_id: Option<FnId>,
    },
    Comptime {
        block_node: NodeId,
    },
}

pub struct Tld {
    pub kind: TldKind,
    pub name: Name,
    pub visib: VisibMod,
    pub source_node: NodeId,
    pub import: ImportId,
    pub parent_scope: ScopeId,
    pub resolution: TldResolution,
    /// Set while walking members during `use` hoisting to catch loops.
    pub dep_loop_flag: bool,
}

/// A runtime global variable for emission.
#[derive(Debug)]
pub struct GlobalVar {
    pub name: String,
    pub ty: TypeId,
    pub init: ConstValue,
    pub is_const: bool,
    pub is_extern: bool,
    pub is_export: bool,
    pub alignment: Option<u32>,
    pub section: Option<String>,
}

//! Function table entries.

use zinc_ir::ast::NodeId;
use zinc_ir::Name;
use zinc_types::{ConstValue, ImportId, TypeId};

use crate::ir::IrExec;
use crate::scope::ScopeId;

/// Per-function analysis state.
///
/// `Probing` doubles as the structural marker for type-dependency
/// cycles: re-entry while probing is diagnosed once and the function is
/// demoted to `Invalid`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnAnalState {
    Ready,
    Probing,
    Complete,
    Invalid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnInline {
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
    Internal,
    Strong,
    Weak,
    LinkOnce,
}

/// One parameter after prototype resolution.
#[derive(Clone, Debug)]
pub struct ParamInfo {
    pub name: Name,
    pub ty: TypeId,
    pub is_noalias: bool,
    pub is_comptime: bool,
}

pub struct FnEntry {
    pub proto_node: NodeId,
    pub body_node: Option<NodeId>,
    pub import: ImportId,
    pub symbol_name: String,
    pub fn_type: TypeId,
    pub return_type: TypeId,
    pub params: Vec<ParamInfo>,
    /// Variables bound for the parameters, in order.
    pub param_vars: Vec<crate::VarId>,
    /// Scope the body opens under (fn-def scope with params chained in).
    pub fndef_scope: ScopeId,
    pub anal_state: FnAnalState,
    /// Stage-1 untyped IR.
    pub ir: Option<IrExec>,
    /// Stage-2 typed IR, present once `Complete`.
    pub analyzed: Option<IrExec>,
    pub fn_inline: FnInline,
    pub linkage: Linkage,
    pub alignment: Option<u32>,
    pub section: Option<String>,
    pub is_extern: bool,
    pub is_test: bool,
    /// For generic instantiations: the bound comptime argument values, in
    /// parameter order (`None` entries are runtime parameters).
    pub comptime_args: Option<Vec<Option<ConstValue>>>,
}

impl FnEntry {
    /// Whether any parameter makes this a generic (instantiate-per-call)
    /// function: comptime-marked, `type`-typed, or `var`-typed.
    pub fn is_generic(&self) -> bool {
        self.comptime_args.is_none()
            && self.params.iter().any(|param| {
                param.is_comptime
                    || param.ty == TypeId::META_TYPE
                    || param.ty == TypeId::VAR
            })
    }
}

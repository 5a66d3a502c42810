//! The intermediate representation.
//!
//! An [`IrExec`] is a control-flow graph of basic blocks of SSA-style
//! instructions, allocated flat and referenced by [`BlockId`]/[`InstId`].
//! The same representation serves both stages: stage 1 is untyped
//! (every instruction's value is invalid), stage 2 carries resolved
//! types and, where known, compile-time values.
//!
//! Invariants maintained by construction and checked in debug builds:
//! every reachable block ends in exactly one terminator, and phi
//! instructions precede all non-phi instructions in their block.

pub mod analyze;
pub mod build;
pub mod cast;
pub mod container;
pub mod eval;
pub mod fold;

use zinc_ir::ast::NodeId;
use zinc_ir::Name;
use zinc_types::{ConstValue, TypeId};

use crate::scope::ScopeId;
use crate::tld::TldId;
use crate::VarId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One basic block: ordered instructions, last one a terminator.
#[derive(Debug, Default)]
pub struct Block {
    pub insts: Vec<InstId>,
    /// Instruction that caused this block to be entered during analysis.
    pub ref_inst: Option<InstId>,
    /// Witness that this block must execute at compile time.
    pub must_be_comptime: Option<NodeId>,
}

/// Shared instruction header plus kind-specific payload.
#[derive(Debug)]
pub struct Inst {
    pub kind: InstKind,
    pub scope: ScopeId,
    pub node: NodeId,
    /// Type and, when compile-time known, value of the result.
    pub value: ConstValue,
    /// Zero ref-count side-effect-free instructions are skipped at emission.
    pub ref_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrUnOp {
    BinNot,
    Negation,
    NegationWrap,
    Dereference,
    /// `?T` type constructor.
    Maybe,
    /// `%T` type constructor.
    Error,
    /// `%%x` unwrap error union, asserting non-error.
    UnwrapError,
    /// `??x` unwrap nullable, asserting non-null.
    UnwrapMaybe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrBinOp {
    CmpEq,
    CmpNotEq,
    CmpLessThan,
    CmpGreaterThan,
    CmpLessOrEq,
    CmpGreaterOrEq,
    BinOr,
    BinXor,
    BinAnd,
    BitShiftLeft,
    BitShiftLeftWrap,
    BitShiftRight,
    Add,
    AddWrap,
    Sub,
    SubWrap,
    Mult,
    MultWrap,
    Div,
    Mod,
    ArrayCat,
    ArrayMult,
}

impl IrBinOp {
    pub fn is_wrapping(self) -> bool {
        matches!(
            self,
            IrBinOp::AddWrap | IrBinOp::SubWrap | IrBinOp::MultWrap | IrBinOp::BitShiftLeftWrap
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            IrBinOp::CmpEq
                | IrBinOp::CmpNotEq
                | IrBinOp::CmpLessThan
                | IrBinOp::CmpGreaterThan
                | IrBinOp::CmpLessOrEq
                | IrBinOp::CmpGreaterOrEq
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverflowOp {
    Add,
    Sub,
    Mul,
    Shl,
}

/// What a typed cast does at emission time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastOp {
    /// Same representation; type change only.
    Noop,
    WidenOrShorten,
    IntToFloat,
    FloatToInt,
    BoolToInt,
    ArrayToSlice,
    MaybeWrap,
    ErrWrapPayload,
    ErrWrapCode,
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub value: InstId,
    pub block: BlockId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeFamily {
    Int,
    Float,
}

/// Instruction payloads.
///
/// Stage-1 emits the untyped subset; stage-2 rewrites into the typed
/// subset (`Cast`, `StructFieldPtr`, ...) and folds what it can into
/// `Const`.
#[derive(Debug)]
pub enum InstKind {
    // Control.
    Br {
        dest: BlockId,
        is_comptime: bool,
    },
    CondBr {
        cond: InstId,
        then_block: BlockId,
        else_block: BlockId,
        is_comptime: bool,
    },
    SwitchBr {
        target: InstId,
        cases: Vec<SwitchCase>,
        else_block: BlockId,
        is_comptime: bool,
    },
    Phi {
        predecessors: Vec<BlockId>,
        values: Vec<InstId>,
    },
    Return {
        value: Option<InstId>,
    },
    Unreachable,

    // Data.
    Const,
    DeclVar {
        var: VarId,
        var_type: Option<InstId>,
        init: InstId,
    },
    LoadPtr {
        ptr: InstId,
    },
    StorePtr {
        ptr: InstId,
        value: InstId,
    },
    FieldPtr {
        container_ptr: InstId,
        field_name: Name,
    },
    /// Typed field address (stage 2).
    StructFieldPtr {
        struct_ptr: InstId,
        field_index: usize,
    },
    ElemPtr {
        array_ptr: InstId,
        index: InstId,
        safety_check_on: bool,
    },
    VarPtr {
        var: VarId,
    },
    Ref {
        value: InstId,
        is_const: bool,
        is_volatile: bool,
    },
    /// Typed aggregate construction (stage 2).
    StructInit {
        struct_type: TypeId,
        fields: Vec<(usize, InstId)>,
    },
    ContainerInitList {
        container_type: InstId,
        items: Vec<InstId>,
    },
    ContainerInitFields {
        container_type: InstId,
        fields: Vec<(Name, InstId)>,
    },
    Slice {
        array: InstId,
        start: InstId,
        end: Option<InstId>,
        is_const: bool,
        safety_check_on: bool,
    },
    Call {
        fn_ref: InstId,
        args: Vec<InstId>,
        is_comptime: bool,
        is_inline: bool,
    },
    DeclRef {
        tld: TldId,
        lval: bool,
    },
    /// Typed cast inserted by the implicit conversion lattice or an
    /// explicit cast builtin (stage 2).
    Cast {
        operand: InstId,
        cast_op: CastOp,
    },

    // Operators.
    UnOp {
        op: IrUnOp,
        operand: InstId,
    },
    BinOp {
        op: IrBinOp,
        lhs: InstId,
        rhs: InstId,
        safety_check_on: bool,
    },
    BoolNot {
        operand: InstId,
    },
    OverflowOp {
        op: OverflowOp,
        type_value: InstId,
        op1: InstId,
        op2: InstId,
        result_ptr: InstId,
    },
    DivExact {
        op1: InstId,
        op2: InstId,
        safety_check_on: bool,
    },
    Truncate {
        dest_type: InstId,
        operand: InstId,
    },
    WidenOrShorten {
        operand: InstId,
    },
    PtrCast {
        dest_type: InstId,
        ptr: InstId,
    },
    IntToPtr {
        dest_type: InstId,
        operand: InstId,
    },
    PtrToInt {
        operand: InstId,
    },
    IntToEnum {
        dest_type: InstId,
        operand: InstId,
    },
    IntToErr {
        operand: InstId,
    },
    ErrToInt {
        operand: InstId,
    },
    EnumTag {
        operand: InstId,
    },
    EnumTagName {
        operand: InstId,
    },

    // Type construction.
    ArrayTypeInst {
        size: InstId,
        child: InstId,
    },
    SliceTypeInst {
        is_const: bool,
        child: InstId,
    },
    FnProtoInst {
        param_types: Vec<InstId>,
        return_type: InstId,
        cc: zinc_ir::ast::CallingConv,
        is_var_args: bool,
    },

    // Intrinsics.
    SizeOf {
        type_value: InstId,
    },
    AlignOf {
        type_value: InstId,
    },
    OffsetOf {
        type_value: InstId,
        field_name: InstId,
    },
    TypeOf {
        operand: InstId,
    },
    TypeName {
        type_value: InstId,
    },
    IntTypeInst {
        is_signed: InstId,
        bits: InstId,
    },
    MinValue {
        type_value: InstId,
    },
    MaxValue {
        type_value: InstId,
    },
    MemberCount {
        type_value: InstId,
    },
    Memcpy {
        dest: InstId,
        src: InstId,
        count: InstId,
    },
    Memset {
        dest: InstId,
        byte: InstId,
        count: InstId,
    },
    Cmpxchg {
        ptr: InstId,
        cmp_value: InstId,
        new_value: InstId,
        success_order: InstId,
        failure_order: InstId,
    },
    Fence {
        order: InstId,
    },
    Breakpoint,
    ReturnAddress,
    FrameAddress,
    Ctz {
        operand: InstId,
    },
    Clz {
        operand: InstId,
    },
    EmbedFile {
        name: InstId,
    },
    Import {
        name: InstId,
    },
    CImport,
    CInclude {
        name: InstId,
    },
    CDefine {
        name: InstId,
        value: InstId,
    },
    CUndef {
        name: InstId,
    },
    ErrName {
        operand: InstId,
    },
    ArrayLen {
        array: InstId,
    },
    Asm {
        asm_node: NodeId,
        inputs: Vec<InstId>,
        output_types: Vec<InstId>,
    },

    // Checks.
    TestNonNull {
        operand: InstId,
    },
    TestErr {
        operand: InstId,
    },
    UnwrapMaybe {
        ptr: InstId,
        safety_check_on: bool,
    },
    UnwrapErrCode {
        err_union_ptr: InstId,
    },
    UnwrapErrPayload {
        err_union_ptr: InstId,
        safety_check_on: bool,
    },
    MaybeWrap {
        operand: InstId,
    },
    ErrWrapCode {
        operand: InstId,
    },
    ErrWrapPayload {
        operand: InstId,
    },
    CheckSwitchProngs {
        target: InstId,
        items: Vec<InstId>,
        ranges: Vec<(InstId, InstId)>,
        has_else: bool,
    },
    TestComptime {
        operand: InstId,
    },
    TestType {
        type_value: InstId,
        family: TypeFamily,
    },
    CanImplicitCast {
        type_value: InstId,
        operand: InstId,
    },
    /// Switch payload plumbing: the tag of the switched-on value.
    SwitchTarget {
        target_ptr: InstId,
    },
    /// Switch payload plumbing: pointer to the payload of one prong.
    SwitchVar {
        target_ptr: InstId,
        prong_value: InstId,
    },

    // Compile-time side effects.
    CompileError {
        message: InstId,
    },
    CompileLog {
        args: Vec<InstId>,
    },
    Panic {
        message: InstId,
    },

    // Attribute setters.
    SetDebugSafety {
        target_scope: ScopeId,
        enabled: InstId,
    },
    SetGlobalAlign {
        decl: InstId,
        align: InstId,
    },
    SetGlobalSection {
        decl: InstId,
        section: InstId,
    },
    SetGlobalLinkage {
        decl: InstId,
        linkage: InstId,
    },
    SetFnRefInline {
        fn_ref: InstId,
    },
}

impl InstKind {
    /// Terminators end a block; nothing may follow them.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::SwitchBr { .. }
                | InstKind::Return { .. }
                | InstKind::Unreachable
        )
    }

    /// Side-effecting instructions survive emission at ref-count zero.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::SwitchBr { .. }
                | InstKind::Return { .. }
                | InstKind::Unreachable
                | InstKind::DeclVar { .. }
                | InstKind::StorePtr { .. }
                | InstKind::Call { .. }
                | InstKind::Memcpy { .. }
                | InstKind::Memset { .. }
                | InstKind::Cmpxchg { .. }
                | InstKind::Fence { .. }
                | InstKind::Breakpoint
                | InstKind::Asm { .. }
                | InstKind::CompileError { .. }
                | InstKind::CompileLog { .. }
                | InstKind::Panic { .. }
                | InstKind::CImport
                | InstKind::CInclude { .. }
                | InstKind::CDefine { .. }
                | InstKind::CUndef { .. }
                | InstKind::SetDebugSafety { .. }
                | InstKind::SetGlobalAlign { .. }
                | InstKind::SetGlobalSection { .. }
                | InstKind::SetGlobalLinkage { .. }
                | InstKind::CheckSwitchProngs { .. }
        )
    }
}

/// One control-flow graph: blocks plus flat instruction storage.
#[derive(Debug, Default)]
pub struct IrExec {
    pub blocks: Vec<Block>,
    pub insts: Vec<Inst>,
}

impl IrExec {
    pub fn new() -> IrExec {
        IrExec::default()
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    pub fn add_inst(
        &mut self,
        block: BlockId,
        kind: InstKind,
        scope: ScopeId,
        node: NodeId,
    ) -> InstId {
        debug_assert!(
            !self.block_is_terminated(block),
            "instruction added after terminator"
        );
        let id = InstId(self.insts.len() as u32);
        self.insts.push(Inst {
            kind,
            scope,
            node,
            value: ConstValue::invalid(),
            ref_count: 0,
        });
        self.blocks[block.index()].insts.push(id);
        id
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_is_terminated(&self, id: BlockId) -> bool {
        self.blocks[id.index()]
            .insts
            .last()
            .is_some_and(|&last| self.insts[last.index()].kind.is_terminator())
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    /// Bump an operand's ref count.
    pub fn add_ref(&mut self, id: InstId) {
        self.insts[id.index()].ref_count += 1;
    }

    /// Debug check of the block invariants: phis precede non-phis, and
    /// nothing follows a terminator. Dead stage-1 continuation blocks may
    /// be unterminated; [`IrExec::check_terminated`] covers the stronger
    /// stage-2 guarantee.
    pub fn check_invariants(&self) {
        for block in &self.blocks {
            let mut seen_non_phi = false;
            for (i, &inst_id) in block.insts.iter().enumerate() {
                let inst = self.inst(inst_id);
                let is_phi = matches!(inst.kind, InstKind::Phi { .. });
                if is_phi {
                    debug_assert!(!seen_non_phi, "phi after non-phi");
                } else {
                    seen_non_phi = true;
                }
                if inst.kind.is_terminator() {
                    debug_assert_eq!(
                        i + 1,
                        block.insts.len(),
                        "instruction after terminator"
                    );
                }
            }
        }
    }

    /// Stage-2 invariant: every non-empty block ends in a terminator.
    pub fn check_terminated(&self) {
        for (index, block) in self.blocks.iter().enumerate() {
            if block.insts.is_empty() {
                continue;
            }
            let last = *block.insts.last().expect("non-empty");
            debug_assert!(
                self.inst(last).kind.is_terminator(),
                "block {index} is not terminated"
            );
        }
    }
}

//! Stage-1 IR construction: AST expression trees → untyped CFG.
//!
//! Control constructs produce explicit blocks and phis; short-circuit
//! booleans branch; defers are recorded as scope-chain entries and
//! replayed (innermost first) on every exit path; gotos are collected as
//! forward items and back-patched when the function body finishes.
//!
//! Instructions built here are untyped except for `Const`, whose value is
//! known at construction. Errors poison: the builder reports the
//! diagnostic and yields an invalid constant so downstream analysis stays
//! quiet.

use num_bigint::BigInt;
use rustc_hash::FxHashMap;
use tracing::trace;

use zinc_ir::ast::{
    BinOp as AstBinOp, ContainerKind, DeferKind, NodeId, NodeKind, NumLit, PrefixOp, ReturnKind,
};
use zinc_ir::Name;
use zinc_types::{
    ConstData, ConstPtr, ConstValue, FnId, ImportId, PtrMut, TypeId,
};

use crate::builtins::BuiltinFn;
use crate::ir::{
    BlockId, InstId, InstKind, IrBinOp, IrExec, IrUnOp, OverflowOp, SwitchCase, TypeFamily,
};
use crate::scope::{Scope, ScopeId, ScopeKind};
use crate::Compilation;

/// Whether an expression is wanted as an address or a value.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LVal {
    None,
    Ptr,
}

struct LoopCtx {
    break_block: BlockId,
    continue_block: BlockId,
    scope_at_entry: ScopeId,
    is_comptime: bool,
}

struct GotoItem {
    node: NodeId,
    name: Name,
    source_block: BlockId,
    scope: ScopeId,
    is_comptime: bool,
}

pub struct IrBuilder<'c> {
    comp: &'c mut Compilation,
    exec: IrExec,
    import: ImportId,
    current_block: BlockId,
    scope: ScopeId,
    loops: Vec<LoopCtx>,
    gotos: Vec<GotoItem>,
    labels: FxHashMap<Name, (BlockId, ScopeId, NodeId)>,
    /// Name given to the next container declaration (from a `const X =`).
    container_name_hint: Option<Name>,
    /// False after a terminator until control lands in a live block;
    /// dead continuations skip defer replay and implicit returns.
    reachable: bool,
}

/// Build the stage-1 IR for a function body.
pub fn build_fn_ir(comp: &mut Compilation, fn_id: FnId) -> Option<IrExec> {
    let (body, scope, import) = {
        let entry = comp.fn_entry(fn_id);
        (entry.body_node?, entry.fndef_scope, entry.import)
    };
    let mut builder = IrBuilder::new(comp, scope, import, None);
    let result = builder.gen_node(body, LVal::None);
    if !builder.block_terminated() {
        if builder.reachable {
            // Implicit return falls off the end of the body.
            builder.gen_all_defers(body);
            builder.exec.add_ref(result);
            builder.add(InstKind::Return { value: Some(result) }, body);
        } else if !builder.exec.block(builder.current_block).insts.is_empty() {
            builder.add(InstKind::Unreachable, body);
        }
    }
    builder.patch_gotos();
    let exec = builder.exec;
    exec.check_invariants();
    trace!(blocks = exec.blocks.len(), insts = exec.insts.len(), "built fn ir");
    Some(exec)
}

/// Build the stage-1 IR for a standalone (const) expression: one CFG
/// whose final `Return` carries the expression value.
pub fn build_expr_ir(
    comp: &mut Compilation,
    scope: ScopeId,
    node: NodeId,
    container_name_hint: Option<Name>,
) -> IrExec {
    let import = comp.scopes.get(scope).import;
    let mut builder = IrBuilder::new(comp, scope, import, container_name_hint);
    let result = builder.gen_node(node, LVal::None);
    if !builder.block_terminated() {
        if builder.reachable {
            builder.exec.add_ref(result);
            builder.add(InstKind::Return { value: Some(result) }, node);
        } else if !builder.exec.block(builder.current_block).insts.is_empty() {
            builder.add(InstKind::Unreachable, node);
        }
    }
    builder.patch_gotos();
    let exec = builder.exec;
    exec.check_invariants();
    exec
}

impl<'c> IrBuilder<'c> {
    fn new(
        comp: &'c mut Compilation,
        scope: ScopeId,
        import: ImportId,
        container_name_hint: Option<Name>,
    ) -> IrBuilder<'c> {
        let mut exec = IrExec::new();
        let entry = exec.new_block();
        IrBuilder {
            comp,
            exec,
            import,
            current_block: entry,
            scope,
            loops: Vec::new(),
            gotos: Vec::new(),
            labels: FxHashMap::default(),
            container_name_hint,
            reachable: true,
        }
    }

    fn add(&mut self, kind: InstKind, node: NodeId) -> InstId {
        self.exec.add_inst(self.current_block, kind, self.scope, node)
    }

    fn add_const(&mut self, node: NodeId, value: ConstValue) -> InstId {
        let id = self.add(InstKind::Const, node);
        self.exec.inst_mut(id).value = value;
        id
    }

    fn bad(&mut self, node: NodeId) -> InstId {
        self.add_const(node, ConstValue::invalid())
    }

    fn error(&mut self, node: NodeId, message: impl Into<String>) -> InstId {
        self.comp.add_node_error(self.import, node, message);
        self.bad(node)
    }

    fn node_kind(&self, node: NodeId) -> NodeKind {
        self.comp.import(self.import).arena.kind(node).clone()
    }

    fn node_list(&self, range: zinc_ir::ast::NodeRange) -> Vec<NodeId> {
        self.comp.import(self.import).arena.list(range).to_vec()
    }

    fn block_terminated(&self) -> bool {
        self.exec.block_is_terminated(self.current_block)
    }

    /// Control can still flow out of the current position: the block is
    /// live and unterminated. False in dead continuations after a
    /// return/break/goto.
    fn flows(&self) -> bool {
        self.reachable && !self.block_terminated()
    }

    fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
        self.reachable = true;
    }

    fn push_scope(&mut self, node: NodeId, kind: ScopeKind) -> ScopeId {
        let scope = self.comp.scopes.alloc(Scope {
            parent: Some(self.scope),
            node,
            import: self.import,
            kind,
        });
        self.scope = scope;
        scope
    }

    fn is_comptime_here(&self) -> bool {
        self.comp.scopes.is_comptime(self.scope)
    }

    fn safety_on(&self) -> bool {
        !self.comp.options.is_release && self.comp.scopes.safety_on(self.scope)
    }

    fn use_value(&mut self, inst: InstId) -> InstId {
        self.exec.add_ref(inst);
        inst
    }

    // Entry point for one node.
    fn gen_node(&mut self, node: NodeId, lval: LVal) -> InstId {
        let kind = self.node_kind(node);
        match kind {
            NodeKind::Block { stmts } => self.gen_block(node, stmts),
            NodeKind::Grouped { inner } => self.gen_node(inner, lval),
            NodeKind::Symbol { name } => self.gen_symbol(node, name, lval),
            NodeKind::NumberLiteral(lit) => self.gen_number(node, lit),
            NodeKind::StringLiteral { bytes, is_c } => self.gen_string(node, &bytes, is_c),
            NodeKind::CharLiteral(value) => {
                let u8_ty = self.comp.types.int_type(false, 8);
                self.add_const(
                    node,
                    ConstValue::int(u8_ty, BigInt::from(value)),
                )
            }
            NodeKind::BoolLiteral(value) => self.add_const(node, ConstValue::bool_value(value)),
            NodeKind::NullLiteral => {
                self.add_const(node, ConstValue::of(TypeId::NULL_LIT, ConstData::Void))
            }
            NodeKind::UndefinedLiteral => {
                self.add_const(node, ConstValue::undef(TypeId::UNDEF_LIT))
            }
            NodeKind::ThisLiteral => self.gen_this(node),
            NodeKind::VarLiteral => self.add_const(node, ConstValue::type_value(TypeId::VAR)),
            NodeKind::ErrorType => {
                self.add_const(node, ConstValue::type_value(TypeId::PURE_ERROR))
            }
            NodeKind::Unreachable => {
                let inst = self.add(InstKind::Unreachable, node);
                self.start_new_block();
                inst
            }
            NodeKind::BinOp { op, lhs, rhs } => self.gen_bin_op(node, op, lhs, rhs),
            NodeKind::PrefixOp { op, operand } => self.gen_prefix_op(node, op, operand, lval),
            NodeKind::UnwrapError { op1, err_name, op2 } => {
                self.gen_unwrap_error(node, op1, err_name, op2)
            }
            NodeKind::Call {
                callee,
                args,
                is_builtin,
            } => self.gen_call(node, callee, args, is_builtin),
            NodeKind::FieldAccess { operand, field } => {
                self.gen_field_access(node, operand, field, lval)
            }
            NodeKind::ArrayAccess { array, index } => {
                self.gen_array_access(node, array, index, lval)
            }
            NodeKind::Slice {
                array,
                start,
                end,
                is_const,
            } => self.gen_slice(node, array, start, end, is_const),
            NodeKind::ContainerInitExpr {
                ty,
                entries,
                is_field_init,
            } => self.gen_container_init(node, ty, entries, is_field_init),
            NodeKind::ArrayType {
                size,
                is_const,
                is_volatile: _,
                child,
            } => self.gen_array_type(node, size, is_const, child),
            NodeKind::FnProto(proto) => self.gen_fn_proto_type(node, &proto),
            NodeKind::ContainerDecl(decl) => self.gen_container_decl(node, &decl),
            NodeKind::IfBool {
                cond,
                then_body,
                else_body,
            } => self.gen_if_bool(node, cond, then_body, else_body),
            NodeKind::IfVar(if_var) => self.gen_if_var(node, &if_var),
            NodeKind::Try(try_expr) => self.gen_try(node, &try_expr),
            NodeKind::While {
                cond,
                continue_expr,
                body,
                is_inline,
            } => self.gen_while(node, cond, continue_expr, body, is_inline),
            NodeKind::For {
                array,
                elem_name,
                elem_is_ptr,
                index_name,
                body,
                is_inline,
            } => self.gen_for(node, array, elem_name, elem_is_ptr, index_name, body, is_inline),
            NodeKind::Switch { target, prongs } => self.gen_switch(node, target, prongs),
            NodeKind::Return { kind, expr } => self.gen_return(node, kind, expr),
            NodeKind::Break => self.gen_break(node),
            NodeKind::Continue => self.gen_continue(node),
            NodeKind::Goto { name, .. } => self.gen_goto(node, name),
            NodeKind::Comptime { expr } => {
                self.push_scope(node, ScopeKind::Comptime);
                let result = self.gen_node(expr, LVal::None);
                self.pop_scope();
                result
            }
            NodeKind::Defer { .. } => {
                // Handled in block context; a defer elsewhere is an error.
                self.error(node, "defer allowed in block scopes only")
            }
            NodeKind::VarDecl(decl) => self.gen_var_decl(node, &decl),
            NodeKind::Asm(asm) => self.gen_asm(node, &asm),
            NodeKind::Label { .. } => self.error(node, "label must be inside a block"),
            _ => self.error(node, format!("invalid expression: {}", kind.describe())),
        }
    }

    fn pop_scope(&mut self) {
        self.scope = self
            .comp
            .scopes
            .get(self.scope)
            .parent
            .expect("scope stack underflow");
    }

    /// Fresh block for code after a terminator (unreachable continuation).
    fn start_new_block(&mut self) {
        let block = self.exec.new_block();
        self.current_block = block;
        self.reachable = false;
    }

    fn gen_block(&mut self, node: NodeId, stmts: zinc_ir::ast::NodeRange) -> InstId {
        let outer_scope = self.scope;
        self.push_scope(node, ScopeKind::Block { safety_off: false });
        let stmt_nodes = self.node_list(stmts);
        let mut last_value = None;

        for &stmt in &stmt_nodes {
            if self.block_terminated() {
                // Unreachable code after a terminator: allowed only for
                // labels, which open a new reachable block.
                if !matches!(self.node_kind(stmt), NodeKind::Label { .. }) {
                    continue;
                }
            }
            match self.node_kind(stmt) {
                NodeKind::Defer { kind, expr } => {
                    self.push_scope(stmt, ScopeKind::Defer {
                        kind,
                        expr_node: expr,
                    });
                    last_value = None;
                }
                NodeKind::Label { name } => {
                    let label_block = self.exec.new_block();
                    if !self.block_terminated() {
                        let is_comptime = self.is_comptime_here();
                        self.add(
                            InstKind::Br {
                                dest: label_block,
                                is_comptime,
                            },
                            stmt,
                        );
                    }
                    if self.labels.contains_key(&name) {
                        let text = self.comp.interner.lookup(name).to_string();
                        self.error(stmt, format!("duplicate label '{text}'"));
                    } else {
                        self.labels.insert(name, (label_block, self.scope, stmt));
                    }
                    self.switch_to_block(label_block);
                    last_value = None;
                }
                _ => {
                    last_value = Some(self.gen_node(stmt, LVal::None));
                }
            }
        }

        // Normal fallthrough replays this block's defers; dead
        // continuations after a return do not.
        if self.reachable && !self.block_terminated() {
            self.gen_defers_up_to(outer_scope, node, false, false);
        }
        // Unwind the scopes this block introduced.
        self.scope = outer_scope;
        match last_value {
            Some(value) => value,
            None => self.add_const(node, ConstValue::void()),
        }
    }

    fn gen_symbol(&mut self, node: NodeId, name: Name, lval: LVal) -> InstId {
        let text = self.comp.interner.lookup(name);
        if text == "_" && lval == LVal::Ptr {
            return self.add_const(
                node,
                ConstValue::of(
                    TypeId::VOID,
                    ConstData::Ptr {
                        ptr: ConstPtr::Discard,
                        mutability: PtrMut::ComptimeVar,
                    },
                ),
            );
        }

        if let Some(var) = self.comp.find_var(self.scope, name) {
            let ptr = self.add(InstKind::VarPtr { var }, node);
            return match lval {
                LVal::Ptr => ptr,
                LVal::None => {
                    self.exec.add_ref(ptr);
                    self.add(InstKind::LoadPtr { ptr }, node)
                }
            };
        }

        if self.comp.find_decl(self.scope, name).is_some() {
            // Present; the visibility check reports if it is private.
            return match self.comp.find_visible_decl(self.scope, name, node) {
                Some(tld) => self.add(
                    InstKind::DeclRef {
                        tld,
                        lval: lval == LVal::Ptr,
                    },
                    node,
                ),
                None => self.bad(node),
            };
        }

        if let Some(ty) = self.comp.types.primitive(name) {
            return self.add_const(node, ConstValue::type_value(ty));
        }

        if let Some(&err) = self.comp.error_table.get(&name) {
            return self.add_const(
                node,
                ConstValue::of(TypeId::PURE_ERROR, ConstData::PureError(err)),
            );
        }

        let text = text.to_string();
        self.error(node, format!("use of undeclared identifier '{text}'"))
    }

    fn gen_number(&mut self, node: NodeId, lit: NumLit) -> InstId {
        match lit {
            NumLit::Int { value, .. } => self.add_const(
                node,
                ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(value)),
            ),
            NumLit::Float(value) => self.add_const(
                node,
                ConstValue::of(TypeId::NUM_LIT_FLOAT, ConstData::Float(value)),
            ),
        }
    }

    fn gen_string(&mut self, node: NodeId, bytes: &[u8], is_c: bool) -> InstId {
        let u8_ty = self.comp.types.int_type(false, 8);
        let mut elems: Vec<ConstValue> = bytes
            .iter()
            .map(|&byte| ConstValue::int(u8_ty, BigInt::from(byte)))
            .collect();
        if is_c {
            elems.push(ConstValue::int(u8_ty, BigInt::from(0u8)));
        }
        let len = elems.len() as u64;
        let array_ty = self.comp.types.array_type(u8_ty, len);
        let array_value = ConstValue::of(array_ty, ConstData::Array(elems));
        if is_c {
            let array_id = self.comp.values.alloc(array_value);
            let ptr_ty = self.comp.types.ptr_type(u8_ty, true);
            self.add_const(
                node,
                ConstValue::of(
                    ptr_ty,
                    ConstData::Ptr {
                        ptr: ConstPtr::BaseArray {
                            array: array_id,
                            elem_index: 0,
                            is_cstr: true,
                        },
                        mutability: PtrMut::ComptimeConst,
                    },
                ),
            )
        } else {
            self.add_const(node, array_value)
        }
    }

    fn gen_this(&mut self, node: NodeId) -> InstId {
        // Nearest container/namespace value.
        let decls_scope = self.comp.scopes.decls_scope(self.scope);
        let import = self.comp.scopes.get(decls_scope).import;
        if let ScopeKind::Decls {
            container_ty: Some(ty),
            ..
        } = &self.comp.scopes.get(decls_scope).kind
        {
            let ty = *ty;
            return self.add_const(node, ConstValue::type_value(ty));
        }
        self.add_const(
            node,
            ConstValue::of(
                self.comp.import(import).namespace_ty,
                ConstData::Namespace(import),
            ),
        )
    }

    fn map_bin_op(op: AstBinOp) -> Option<IrBinOp> {
        Some(match op {
            AstBinOp::CmpEq => IrBinOp::CmpEq,
            AstBinOp::CmpNotEq => IrBinOp::CmpNotEq,
            AstBinOp::CmpLessThan => IrBinOp::CmpLessThan,
            AstBinOp::CmpGreaterThan => IrBinOp::CmpGreaterThan,
            AstBinOp::CmpLessOrEq => IrBinOp::CmpLessOrEq,
            AstBinOp::CmpGreaterOrEq => IrBinOp::CmpGreaterOrEq,
            AstBinOp::BinOr => IrBinOp::BinOr,
            AstBinOp::BinXor => IrBinOp::BinXor,
            AstBinOp::BinAnd => IrBinOp::BinAnd,
            AstBinOp::BitShiftLeft => IrBinOp::BitShiftLeft,
            AstBinOp::BitShiftLeftWrap => IrBinOp::BitShiftLeftWrap,
            AstBinOp::BitShiftRight => IrBinOp::BitShiftRight,
            AstBinOp::Add => IrBinOp::Add,
            AstBinOp::AddWrap => IrBinOp::AddWrap,
            AstBinOp::Sub => IrBinOp::Sub,
            AstBinOp::SubWrap => IrBinOp::SubWrap,
            AstBinOp::Mult => IrBinOp::Mult,
            AstBinOp::MultWrap => IrBinOp::MultWrap,
            AstBinOp::Div => IrBinOp::Div,
            AstBinOp::Mod => IrBinOp::Mod,
            AstBinOp::ArrayCat => IrBinOp::ArrayCat,
            AstBinOp::ArrayMult => IrBinOp::ArrayMult,
            _ => return None,
        })
    }

    fn gen_bin_op(&mut self, node: NodeId, op: AstBinOp, lhs: NodeId, rhs: NodeId) -> InstId {
        match op {
            AstBinOp::Assign => {
                let ptr = self.gen_node(lhs, LVal::Ptr);
                let value = self.gen_node(rhs, LVal::None);
                self.use_value(ptr);
                self.use_value(value);
                self.add(InstKind::StorePtr { ptr, value }, node)
            }
            _ if op.assign_payload().is_some() => {
                let payload = Self::map_bin_op(op.assign_payload().unwrap()).unwrap();
                let ptr = self.gen_node(lhs, LVal::Ptr);
                self.use_value(ptr);
                let old = self.add(InstKind::LoadPtr { ptr }, lhs);
                let rhs_value = self.gen_node(rhs, LVal::None);
                self.use_value(old);
                self.use_value(rhs_value);
                let safety_check_on = self.safety_on();
                let result = self.add(
                    InstKind::BinOp {
                        op: payload,
                        lhs: old,
                        rhs: rhs_value,
                        safety_check_on,
                    },
                    node,
                );
                self.use_value(ptr);
                self.use_value(result);
                self.add(
                    InstKind::StorePtr {
                        ptr,
                        value: result,
                    },
                    node,
                )
            }
            AstBinOp::BoolOr | AstBinOp::BoolAnd => self.gen_bool_short_circuit(node, op, lhs, rhs),
            AstBinOp::UnwrapMaybe => self.gen_unwrap_maybe_binop(node, lhs, rhs),
            _ => {
                let ir_op = Self::map_bin_op(op).expect("unmapped binary operator");
                let lhs_value = self.gen_node(lhs, LVal::None);
                let rhs_value = self.gen_node(rhs, LVal::None);
                self.use_value(lhs_value);
                self.use_value(rhs_value);
                let safety_check_on = self.safety_on();
                self.add(
                    InstKind::BinOp {
                        op: ir_op,
                        lhs: lhs_value,
                        rhs: rhs_value,
                        safety_check_on,
                    },
                    node,
                )
            }
        }
    }

    /// `a or b` / `a and b` via explicit branching and a merge phi.
    fn gen_bool_short_circuit(
        &mut self,
        node: NodeId,
        op: AstBinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> InstId {
        let is_comptime = self.is_comptime_here();
        let lhs_value = self.gen_node(lhs, LVal::None);
        let lhs_block = self.current_block;

        let rhs_block = self.exec.new_block();
        let merge_block = self.exec.new_block();

        self.use_value(lhs_value);
        let (then_block, else_block) = if op == AstBinOp::BoolOr {
            (merge_block, rhs_block)
        } else {
            (rhs_block, merge_block)
        };
        self.add(
            InstKind::CondBr {
                cond: lhs_value,
                then_block,
                else_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(rhs_block);
        let rhs_value = self.gen_node(rhs, LVal::None);
        let rhs_end_block = self.current_block;
        self.add(
            InstKind::Br {
                dest: merge_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(merge_block);
        self.use_value(lhs_value);
        self.use_value(rhs_value);
        self.add(
            InstKind::Phi {
                predecessors: vec![lhs_block, rhs_end_block],
                values: vec![lhs_value, rhs_value],
            },
            node,
        )
    }

    /// `a ?? b`: unwrap or fall back.
    fn gen_unwrap_maybe_binop(&mut self, node: NodeId, lhs: NodeId, rhs: NodeId) -> InstId {
        let is_comptime = self.is_comptime_here();
        let maybe_ptr = self.gen_node(lhs, LVal::Ptr);
        self.use_value(maybe_ptr);
        let maybe_value = self.add(InstKind::LoadPtr { ptr: maybe_ptr }, lhs);
        self.use_value(maybe_value);
        let is_non_null = self.add(InstKind::TestNonNull { operand: maybe_value }, lhs);

        let ok_block = self.exec.new_block();
        let null_block = self.exec.new_block();
        let merge_block = self.exec.new_block();

        self.use_value(is_non_null);
        self.add(
            InstKind::CondBr {
                cond: is_non_null,
                then_block: ok_block,
                else_block: null_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(ok_block);
        self.use_value(maybe_ptr);
        let safety_check_on = self.safety_on();
        let payload_ptr = self.add(
            InstKind::UnwrapMaybe {
                ptr: maybe_ptr,
                safety_check_on,
            },
            node,
        );
        self.use_value(payload_ptr);
        let payload = self.add(InstKind::LoadPtr { ptr: payload_ptr }, node);
        let ok_end = self.current_block;
        self.add(
            InstKind::Br {
                dest: merge_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(null_block);
        let fallback = self.gen_node(rhs, LVal::None);
        let null_end = self.current_block;
        self.add(
            InstKind::Br {
                dest: merge_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(merge_block);
        self.use_value(payload);
        self.use_value(fallback);
        self.add(
            InstKind::Phi {
                predecessors: vec![ok_end, null_end],
                values: vec![payload, fallback],
            },
            node,
        )
    }

    /// `a %% b` / `a %% |err| b`.
    fn gen_unwrap_error(
        &mut self,
        node: NodeId,
        op1: NodeId,
        err_name: Option<Name>,
        op2: NodeId,
    ) -> InstId {
        let is_comptime = self.is_comptime_here();
        let union_ptr = self.gen_node(op1, LVal::Ptr);
        self.use_value(union_ptr);
        let union_value = self.add(InstKind::LoadPtr { ptr: union_ptr }, op1);
        self.use_value(union_value);
        let is_err = self.add(InstKind::TestErr { operand: union_value }, op1);

        let err_block = self.exec.new_block();
        let ok_block = self.exec.new_block();
        let merge_block = self.exec.new_block();

        self.use_value(is_err);
        self.add(
            InstKind::CondBr {
                cond: is_err,
                then_block: err_block,
                else_block: ok_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(err_block);
        let outer_scope = self.scope;
        if let Some(err_name) = err_name {
            self.use_value(union_ptr);
            let code = self.add(InstKind::UnwrapErrCode { err_union_ptr: union_ptr }, node);
            let var = self.comp.add_variable(
                err_name,
                node,
                self.import,
                TypeId::PURE_ERROR,
                true,
                false,
                ConstValue::runtime(TypeId::PURE_ERROR),
            );
            self.push_scope(node, ScopeKind::VarDecl { var });
            self.use_value(code);
            self.add(
                InstKind::DeclVar {
                    var,
                    var_type: None,
                    init: code,
                },
                node,
            );
        }
        let fallback = self.gen_node(op2, LVal::None);
        self.scope = outer_scope;
        let err_end = self.current_block;
        if self.flows() {
            self.add(
                InstKind::Br {
                    dest: merge_block,
                    is_comptime,
                },
                node,
            );
        }

        self.switch_to_block(ok_block);
        self.use_value(union_ptr);
        let safety_check_on = self.safety_on();
        let payload_ptr = self.add(
            InstKind::UnwrapErrPayload {
                err_union_ptr: union_ptr,
                safety_check_on,
            },
            node,
        );
        self.use_value(payload_ptr);
        let payload = self.add(InstKind::LoadPtr { ptr: payload_ptr }, node);
        let ok_end = self.current_block;
        self.add(
            InstKind::Br {
                dest: merge_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(merge_block);
        self.use_value(payload);
        self.use_value(fallback);
        self.add(
            InstKind::Phi {
                predecessors: vec![ok_end, err_end],
                values: vec![payload, fallback],
            },
            node,
        )
    }

    fn gen_prefix_op(
        &mut self,
        node: NodeId,
        op: PrefixOp,
        operand: NodeId,
        _lval: LVal,
    ) -> InstId {
        match op {
            PrefixOp::BoolNot => {
                let value = self.gen_node(operand, LVal::None);
                self.use_value(value);
                self.add(InstKind::BoolNot { operand: value }, node)
            }
            PrefixOp::BinNot => self.gen_un_op(node, IrUnOp::BinNot, operand),
            PrefixOp::Negation => self.gen_un_op(node, IrUnOp::Negation, operand),
            PrefixOp::NegationWrap => self.gen_un_op(node, IrUnOp::NegationWrap, operand),
            PrefixOp::Dereference => {
                let ptr = self.gen_node(operand, LVal::None);
                self.use_value(ptr);
                self.add(InstKind::UnOp {
                    op: IrUnOp::Dereference,
                    operand: ptr,
                }, node)
            }
            PrefixOp::AddressOf
            | PrefixOp::ConstAddressOf
            | PrefixOp::VolatileAddressOf
            | PrefixOp::ConstVolatileAddressOf => {
                let is_const = matches!(
                    op,
                    PrefixOp::ConstAddressOf | PrefixOp::ConstVolatileAddressOf
                );
                let is_volatile = matches!(
                    op,
                    PrefixOp::VolatileAddressOf | PrefixOp::ConstVolatileAddressOf
                );
                // Addressable operands produce their pointer; other values
                // (including types) go through a Ref instruction.
                if self.is_addressable(operand) && !is_const && !is_volatile {
                    return self.gen_node(operand, LVal::Ptr);
                }
                let value = self.gen_node(operand, LVal::None);
                self.use_value(value);
                self.add(
                    InstKind::Ref {
                        value,
                        is_const,
                        is_volatile,
                    },
                    node,
                )
            }
            PrefixOp::Maybe => self.gen_un_op(node, IrUnOp::Maybe, operand),
            PrefixOp::Error => self.gen_un_op(node, IrUnOp::Error, operand),
            PrefixOp::UnwrapError => {
                let ptr = self.gen_node(operand, LVal::Ptr);
                self.use_value(ptr);
                let safety_check_on = self.safety_on();
                let payload_ptr = self.add(
                    InstKind::UnwrapErrPayload {
                        err_union_ptr: ptr,
                        safety_check_on,
                    },
                    node,
                );
                self.use_value(payload_ptr);
                self.add(InstKind::LoadPtr { ptr: payload_ptr }, node)
            }
            PrefixOp::UnwrapMaybe => {
                let ptr = self.gen_node(operand, LVal::Ptr);
                self.use_value(ptr);
                let safety_check_on = self.safety_on();
                let payload_ptr = self.add(
                    InstKind::UnwrapMaybe {
                        ptr,
                        safety_check_on,
                    },
                    node,
                );
                self.use_value(payload_ptr);
                self.add(InstKind::LoadPtr { ptr: payload_ptr }, node)
            }
        }
    }

    fn is_addressable(&self, node: NodeId) -> bool {
        matches!(
            self.comp.import(self.import).arena.kind(node),
            NodeKind::Symbol { .. }
                | NodeKind::FieldAccess { .. }
                | NodeKind::ArrayAccess { .. }
                | NodeKind::Grouped { .. }
        )
    }

    fn gen_un_op(&mut self, node: NodeId, op: IrUnOp, operand: NodeId) -> InstId {
        let value = self.gen_node(operand, LVal::None);
        self.use_value(value);
        self.add(InstKind::UnOp { op, operand: value }, node)
    }

    fn gen_field_access(&mut self, node: NodeId, operand: NodeId, field: Name, lval: LVal) -> InstId {
        let container_ptr = self.gen_node(operand, LVal::Ptr);
        self.use_value(container_ptr);
        let field_ptr = self.add(
            InstKind::FieldPtr {
                container_ptr,
                field_name: field,
            },
            node,
        );
        match lval {
            LVal::Ptr => field_ptr,
            LVal::None => {
                self.use_value(field_ptr);
                self.add(InstKind::LoadPtr { ptr: field_ptr }, node)
            }
        }
    }

    fn gen_array_access(&mut self, node: NodeId, array: NodeId, index: NodeId, lval: LVal) -> InstId {
        let array_ptr = self.gen_node(array, LVal::Ptr);
        let index_value = self.gen_node(index, LVal::None);
        self.use_value(array_ptr);
        self.use_value(index_value);
        let safety_check_on = self.safety_on();
        let elem_ptr = self.add(
            InstKind::ElemPtr {
                array_ptr,
                index: index_value,
                safety_check_on,
            },
            node,
        );
        match lval {
            LVal::Ptr => elem_ptr,
            LVal::None => {
                self.use_value(elem_ptr);
                self.add(InstKind::LoadPtr { ptr: elem_ptr }, node)
            }
        }
    }

    fn gen_slice(
        &mut self,
        node: NodeId,
        array: NodeId,
        start: NodeId,
        end: Option<NodeId>,
        is_const: bool,
    ) -> InstId {
        let array_ptr = self.gen_node(array, LVal::Ptr);
        let start_value = self.gen_node(start, LVal::None);
        let end_value = end.map(|end_node| self.gen_node(end_node, LVal::None));
        self.use_value(array_ptr);
        self.use_value(start_value);
        if let Some(end_value) = end_value {
            self.use_value(end_value);
        }
        let safety_check_on = self.safety_on();
        self.add(
            InstKind::Slice {
                array: array_ptr,
                start: start_value,
                end: end_value,
                is_const,
                safety_check_on,
            },
            node,
        )
    }

    fn gen_container_init(
        &mut self,
        node: NodeId,
        ty: NodeId,
        entries: zinc_ir::ast::NodeRange,
        is_field_init: bool,
    ) -> InstId {
        let type_value = self.gen_node(ty, LVal::None);
        let entry_nodes = self.node_list(entries);
        if is_field_init {
            let mut fields = Vec::with_capacity(entry_nodes.len());
            for &entry in &entry_nodes {
                match self.node_kind(entry) {
                    NodeKind::StructValueField { name, expr } => {
                        let value = self.gen_node(expr, LVal::None);
                        self.use_value(value);
                        fields.push((name, value));
                    }
                    _ => {
                        self.error(entry, "expected field initializer");
                    }
                }
            }
            self.use_value(type_value);
            self.add(
                InstKind::ContainerInitFields {
                    container_type: type_value,
                    fields,
                },
                node,
            )
        } else {
            let mut items = Vec::with_capacity(entry_nodes.len());
            for &entry in &entry_nodes {
                let value = self.gen_node(entry, LVal::None);
                self.use_value(value);
                items.push(value);
            }
            self.use_value(type_value);
            self.add(
                InstKind::ContainerInitList {
                    container_type: type_value,
                    items,
                },
                node,
            )
        }
    }

    fn gen_array_type(
        &mut self,
        node: NodeId,
        size: Option<NodeId>,
        is_const: bool,
        child: NodeId,
    ) -> InstId {
        let child_value = self.gen_node(child, LVal::None);
        self.use_value(child_value);
        match size {
            Some(size_node) => {
                let size_value = self.gen_node(size_node, LVal::None);
                self.use_value(size_value);
                self.add(
                    InstKind::ArrayTypeInst {
                        size: size_value,
                        child: child_value,
                    },
                    node,
                )
            }
            None => self.add(
                InstKind::SliceTypeInst {
                    is_const,
                    child: child_value,
                },
                node,
            ),
        }
    }

    fn gen_fn_proto_type(&mut self, node: NodeId, proto: &zinc_ir::ast::FnProto) -> InstId {
        let param_nodes = self.node_list(proto.params);
        let mut param_types = Vec::with_capacity(param_nodes.len());
        for &param in &param_nodes {
            match self.node_kind(param) {
                NodeKind::ParamDecl { ty, .. } => {
                    let value = self.gen_node(ty, LVal::None);
                    self.use_value(value);
                    param_types.push(value);
                }
                _ => {
                    self.error(param, "expected parameter");
                }
            }
        }
        let return_type = match proto.return_ty {
            Some(ret) => self.gen_node(ret, LVal::None),
            None => self.add_const(node, ConstValue::type_value(TypeId::VOID)),
        };
        self.use_value(return_type);
        self.add(
            InstKind::FnProtoInst {
                param_types,
                return_type,
                cc: proto.cc,
                is_var_args: proto.is_var_args,
            },
            node,
        )
    }

    /// Container declarations are values of type `type`; the nominal type
    /// is created here, its members scanned, and field resolution left to
    /// the two-phase container pass.
    fn gen_container_decl(&mut self, node: NodeId, decl: &zinc_ir::ast::ContainerDecl) -> InstId {
        let name = match self.container_name_hint.take() {
            Some(hint) => self.comp.interner.lookup(hint).to_string(),
            None => format!("(anonymous {})", decl.kind.keyword()),
        };
        let ty = match decl.kind {
            ContainerKind::Struct => {
                self.comp
                    .types
                    .new_struct(name, node, self.import, decl.layout)
            }
            ContainerKind::Enum => self.comp.types.new_enum(name, node, self.import, decl.layout),
            ContainerKind::Union => {
                self.comp
                    .types
                    .new_union(name, node, self.import, decl.layout)
            }
        };

        let container_scope = self.comp.scopes.alloc(Scope {
            parent: Some(self.scope),
            node,
            import: self.import,
            kind: ScopeKind::Decls {
                decls: FxHashMap::default(),
                decl_order: Vec::new(),
                safety_off: false,
                container_ty: Some(ty),
            },
        });
        let decls = self.node_list(decl.decls);
        self.comp.scan_decls(container_scope, self.import, &decls);
        self.comp.container_scopes.insert(ty, container_scope);

        self.add_const(node, ConstValue::type_value(ty))
    }

    fn gen_if_bool(
        &mut self,
        node: NodeId,
        cond: NodeId,
        then_body: NodeId,
        else_body: Option<NodeId>,
    ) -> InstId {
        let is_comptime = self.is_comptime_here();
        let cond_value = self.gen_node(cond, LVal::None);

        let then_block = self.exec.new_block();
        let else_block = self.exec.new_block();
        let merge_block = self.exec.new_block();

        self.use_value(cond_value);
        self.add(
            InstKind::CondBr {
                cond: cond_value,
                then_block,
                else_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(then_block);
        let then_value = self.gen_node(then_body, LVal::None);
        let then_end = self.current_block;
        let then_reaches_merge = self.flows();
        if then_reaches_merge {
            self.add(
                InstKind::Br {
                    dest: merge_block,
                    is_comptime,
                },
                node,
            );
        }

        self.switch_to_block(else_block);
        let else_value = match else_body {
            Some(else_node) => self.gen_node(else_node, LVal::None),
            None => self.add_const(node, ConstValue::void()),
        };
        let else_end = self.current_block;
        let else_reaches_merge = self.flows();
        if else_reaches_merge {
            self.add(
                InstKind::Br {
                    dest: merge_block,
                    is_comptime,
                },
                node,
            );
        }

        self.switch_to_block(merge_block);
        let mut predecessors = Vec::new();
        let mut values = Vec::new();
        if then_reaches_merge {
            predecessors.push(then_end);
            values.push(then_value);
        }
        if else_reaches_merge {
            predecessors.push(else_end);
            values.push(else_value);
        }
        if predecessors.is_empty() {
            let inst = self.add(InstKind::Unreachable, node);
            self.start_new_block();
            return inst;
        }
        for &value in &values {
            self.use_value(value);
        }
        self.add(
            InstKind::Phi {
                predecessors,
                values,
            },
            node,
        )
    }

    fn gen_if_var(&mut self, node: NodeId, if_var: &zinc_ir::ast::IfVarExpr) -> InstId {
        let is_comptime = self.is_comptime_here();
        let maybe_ptr = self.gen_node(if_var.expr, LVal::Ptr);
        self.use_value(maybe_ptr);
        let maybe_value = self.add(InstKind::LoadPtr { ptr: maybe_ptr }, if_var.expr);
        self.use_value(maybe_value);
        let is_non_null = self.add(InstKind::TestNonNull { operand: maybe_value }, node);

        let then_block = self.exec.new_block();
        let else_block = self.exec.new_block();
        let merge_block = self.exec.new_block();

        self.use_value(is_non_null);
        self.add(
            InstKind::CondBr {
                cond: is_non_null,
                then_block,
                else_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(then_block);
        let outer_scope = self.scope;
        self.use_value(maybe_ptr);
        let safety_check_on = self.safety_on();
        let payload_ptr = self.add(
            InstKind::UnwrapMaybe {
                ptr: maybe_ptr,
                safety_check_on,
            },
            node,
        );
        let init = if if_var.is_ptr {
            payload_ptr
        } else {
            self.use_value(payload_ptr);
            self.add(InstKind::LoadPtr { ptr: payload_ptr }, node)
        };
        let var = self.comp.add_variable(
            if_var.name,
            node,
            self.import,
            TypeId::INVALID,
            if_var.is_const,
            false,
            ConstValue::runtime(TypeId::INVALID),
        );
        self.push_scope(node, ScopeKind::VarDecl { var });
        self.use_value(init);
        self.add(
            InstKind::DeclVar {
                var,
                var_type: None,
                init,
            },
            node,
        );
        let then_value = self.gen_node(if_var.then_body, LVal::None);
        self.scope = outer_scope;
        let then_end = self.current_block;
        let then_reaches = self.flows();
        if then_reaches {
            self.add(
                InstKind::Br {
                    dest: merge_block,
                    is_comptime,
                },
                node,
            );
        }

        self.switch_to_block(else_block);
        let else_value = match if_var.else_body {
            Some(else_node) => self.gen_node(else_node, LVal::None),
            None => self.add_const(node, ConstValue::void()),
        };
        let else_end = self.current_block;
        let else_reaches = self.flows();
        if else_reaches {
            self.add(
                InstKind::Br {
                    dest: merge_block,
                    is_comptime,
                },
                node,
            );
        }

        self.switch_to_block(merge_block);
        let mut predecessors = Vec::new();
        let mut values = Vec::new();
        if then_reaches {
            predecessors.push(then_end);
            values.push(then_value);
        }
        if else_reaches {
            predecessors.push(else_end);
            values.push(else_value);
        }
        if predecessors.is_empty() {
            let inst = self.add(InstKind::Unreachable, node);
            self.start_new_block();
            return inst;
        }
        for &value in &values {
            self.use_value(value);
        }
        self.add(
            InstKind::Phi {
                predecessors,
                values,
            },
            node,
        )
    }

    fn gen_try(&mut self, node: NodeId, try_expr: &zinc_ir::ast::TryExpr) -> InstId {
        let is_comptime = self.is_comptime_here();
        let union_ptr = self.gen_node(try_expr.target, LVal::Ptr);
        self.use_value(union_ptr);
        let union_value = self.add(InstKind::LoadPtr { ptr: union_ptr }, try_expr.target);
        self.use_value(union_value);
        let is_err = self.add(InstKind::TestErr { operand: union_value }, node);

        let ok_block = self.exec.new_block();
        let err_block = self.exec.new_block();
        let merge_block = self.exec.new_block();

        self.use_value(is_err);
        self.add(
            InstKind::CondBr {
                cond: is_err,
                then_block: err_block,
                else_block: ok_block,
                is_comptime,
            },
            node,
        );

        // Success arm, with the optional payload binding.
        self.switch_to_block(ok_block);
        let outer_scope = self.scope;
        if let Some(var_name) = try_expr.var_name {
            self.use_value(union_ptr);
            let safety_check_on = self.safety_on();
            let payload_ptr = self.add(
                InstKind::UnwrapErrPayload {
                    err_union_ptr: union_ptr,
                    safety_check_on,
                },
                node,
            );
            let init = if try_expr.var_is_ptr {
                payload_ptr
            } else {
                self.use_value(payload_ptr);
                self.add(InstKind::LoadPtr { ptr: payload_ptr }, node)
            };
            let var = self.comp.add_variable(
                var_name,
                node,
                self.import,
                TypeId::INVALID,
                try_expr.var_is_const,
                false,
                ConstValue::runtime(TypeId::INVALID),
            );
            self.push_scope(node, ScopeKind::VarDecl { var });
            self.use_value(init);
            self.add(
                InstKind::DeclVar {
                    var,
                    var_type: None,
                    init,
                },
                node,
            );
        }
        let then_value = self.gen_node(try_expr.then_body, LVal::None);
        self.scope = outer_scope;
        let ok_end = self.current_block;
        let ok_reaches = self.flows();
        if ok_reaches {
            self.add(
                InstKind::Br {
                    dest: merge_block,
                    is_comptime,
                },
                node,
            );
        }

        // Error arm, with the optional |err| binding.
        self.switch_to_block(err_block);
        if let Some(err_name) = try_expr.err_name {
            self.use_value(union_ptr);
            let code = self.add(InstKind::UnwrapErrCode { err_union_ptr: union_ptr }, node);
            let var = self.comp.add_variable(
                err_name,
                node,
                self.import,
                TypeId::PURE_ERROR,
                true,
                false,
                ConstValue::runtime(TypeId::PURE_ERROR),
            );
            self.push_scope(node, ScopeKind::VarDecl { var });
            self.use_value(code);
            self.add(
                InstKind::DeclVar {
                    var,
                    var_type: None,
                    init: code,
                },
                node,
            );
        }
        let else_value = match try_expr.else_body {
            Some(else_node) => self.gen_node(else_node, LVal::None),
            None => self.add_const(node, ConstValue::void()),
        };
        self.scope = outer_scope;
        let err_end = self.current_block;
        let err_reaches = self.flows();
        if err_reaches {
            self.add(
                InstKind::Br {
                    dest: merge_block,
                    is_comptime,
                },
                node,
            );
        }

        self.switch_to_block(merge_block);
        let mut predecessors = Vec::new();
        let mut values = Vec::new();
        if ok_reaches {
            predecessors.push(ok_end);
            values.push(then_value);
        }
        if err_reaches {
            predecessors.push(err_end);
            values.push(else_value);
        }
        if predecessors.is_empty() {
            let inst = self.add(InstKind::Unreachable, node);
            self.start_new_block();
            return inst;
        }
        for &value in &values {
            self.use_value(value);
        }
        self.add(
            InstKind::Phi {
                predecessors,
                values,
            },
            node,
        )
    }

    fn gen_while(
        &mut self,
        node: NodeId,
        cond: NodeId,
        continue_expr: Option<NodeId>,
        body: NodeId,
        is_inline: bool,
    ) -> InstId {
        let is_comptime = is_inline || self.is_comptime_here();
        let cond_block = self.exec.new_block();
        let body_block = self.exec.new_block();
        let continue_block = match continue_expr {
            Some(_) => self.exec.new_block(),
            None => cond_block,
        };
        let end_block = self.exec.new_block();

        self.add(
            InstKind::Br {
                dest: cond_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(cond_block);
        let cond_value = self.gen_node(cond, LVal::None);
        self.use_value(cond_value);
        self.add(
            InstKind::CondBr {
                cond: cond_value,
                then_block: body_block,
                else_block: end_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(body_block);
        let outer_scope = self.scope;
        self.push_scope(node, ScopeKind::Loop {
            is_inline,
        });
        self.loops.push(LoopCtx {
            break_block: end_block,
            continue_block,
            scope_at_entry: self.scope,
            is_comptime,
        });
        self.gen_node(body, LVal::None);
        self.loops.pop();
        self.scope = outer_scope;
        if self.flows() {
            self.add(
                InstKind::Br {
                    dest: continue_block,
                    is_comptime,
                },
                node,
            );
        }

        if let Some(cont) = continue_expr {
            self.switch_to_block(continue_block);
            self.gen_node(cont, LVal::None);
            if self.flows() {
                self.add(
                    InstKind::Br {
                        dest: cond_block,
                        is_comptime,
                    },
                    node,
                );
            }
        }

        self.switch_to_block(end_block);
        self.add_const(node, ConstValue::void())
    }

    #[allow(clippy::too_many_arguments)]
    fn gen_for(
        &mut self,
        node: NodeId,
        array: NodeId,
        elem_name: Option<Name>,
        elem_is_ptr: bool,
        index_name: Option<Name>,
        body: NodeId,
        is_inline: bool,
    ) -> InstId {
        let is_comptime = is_inline || self.is_comptime_here();
        let usize_ty = self.comp.types.usize_type();

        let array_ptr = self.gen_node(array, LVal::Ptr);
        self.use_value(array_ptr);
        let len = self.add(InstKind::ArrayLen { array: array_ptr }, node);

        // Hidden index variable.
        let index_var = self.comp.add_variable(
            index_name.unwrap_or(Name::EMPTY),
            node,
            self.import,
            usize_ty,
            false,
            is_comptime,
            ConstValue::runtime(usize_ty),
        );
        let outer_scope = self.scope;
        self.push_scope(node, ScopeKind::VarDecl { var: index_var });
        let zero = self.add_const(node, ConstValue::int(usize_ty, BigInt::from(0)));
        self.use_value(zero);
        self.add(
            InstKind::DeclVar {
                var: index_var,
                var_type: None,
                init: zero,
            },
            node,
        );

        let cond_block = self.exec.new_block();
        let body_block = self.exec.new_block();
        let continue_block = self.exec.new_block();
        let end_block = self.exec.new_block();

        self.add(
            InstKind::Br {
                dest: cond_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(cond_block);
        let index_ptr = self.add(InstKind::VarPtr { var: index_var }, node);
        self.use_value(index_ptr);
        let index_value = self.add(InstKind::LoadPtr { ptr: index_ptr }, node);
        self.use_value(index_value);
        self.use_value(len);
        let in_bounds = self.add(
            InstKind::BinOp {
                op: IrBinOp::CmpLessThan,
                lhs: index_value,
                rhs: len,
                safety_check_on: false,
            },
            node,
        );
        self.use_value(in_bounds);
        self.add(
            InstKind::CondBr {
                cond: in_bounds,
                then_block: body_block,
                else_block: end_block,
                is_comptime,
            },
            node,
        );

        self.switch_to_block(body_block);
        // Element binding.
        let elem_scope_base = self.scope;
        if let Some(elem_name) = elem_name {
            self.use_value(array_ptr);
            self.use_value(index_value);
            let elem_ptr = self.add(
                InstKind::ElemPtr {
                    array_ptr,
                    index: index_value,
                    safety_check_on: false,
                },
                node,
            );
            let init = if elem_is_ptr {
                elem_ptr
            } else {
                self.use_value(elem_ptr);
                self.add(InstKind::LoadPtr { ptr: elem_ptr }, node)
            };
            let elem_var = self.comp.add_variable(
                elem_name,
                node,
                self.import,
                TypeId::INVALID,
                true,
                is_comptime,
                ConstValue::runtime(TypeId::INVALID),
            );
            self.push_scope(node, ScopeKind::VarDecl { var: elem_var });
            self.use_value(init);
            self.add(
                InstKind::DeclVar {
                    var: elem_var,
                    var_type: None,
                    init,
                },
                node,
            );
        }
        self.push_scope(node, ScopeKind::Loop {
            is_inline,
        });
        self.loops.push(LoopCtx {
            break_block: end_block,
            continue_block,
            scope_at_entry: self.scope,
            is_comptime,
        });
        self.gen_node(body, LVal::None);
        self.loops.pop();
        self.scope = elem_scope_base;
        if self.flows() {
            self.add(
                InstKind::Br {
                    dest: continue_block,
                    is_comptime,
                },
                node,
            );
        }

        // index += 1
        self.switch_to_block(continue_block);
        let index_ptr2 = self.add(InstKind::VarPtr { var: index_var }, node);
        self.use_value(index_ptr2);
        let old_index = self.add(InstKind::LoadPtr { ptr: index_ptr2 }, node);
        let one = self.add_const(node, ConstValue::int(usize_ty, BigInt::from(1)));
        self.use_value(old_index);
        self.use_value(one);
        let next_index = self.add(
            InstKind::BinOp {
                op: IrBinOp::Add,
                lhs: old_index,
                rhs: one,
                safety_check_on: false,
            },
            node,
        );
        self.use_value(index_ptr2);
        self.use_value(next_index);
        self.add(
            InstKind::StorePtr {
                ptr: index_ptr2,
                value: next_index,
            },
            node,
        );
        self.add(
            InstKind::Br {
                dest: cond_block,
                is_comptime,
            },
            node,
        );

        self.scope = outer_scope;
        self.switch_to_block(end_block);
        self.add_const(node, ConstValue::void())
    }

    fn gen_switch(&mut self, node: NodeId, target: NodeId, prongs: zinc_ir::ast::NodeRange) -> InstId {
        let is_comptime = self.is_comptime_here();
        let target_ptr = self.gen_node(target, LVal::Ptr);
        self.use_value(target_ptr);
        let target_value = self.add(InstKind::SwitchTarget { target_ptr }, node);

        let prong_nodes = self.node_list(prongs);
        let end_block = self.exec.new_block();
        let mut else_block = None;
        let mut cases: Vec<SwitchCase> = Vec::new();
        let mut check_items: Vec<InstId> = Vec::new();
        let mut check_ranges: Vec<(InstId, InstId)> = Vec::new();
        // (block, prong body, payload binding info)
        let mut prong_work: Vec<(BlockId, NodeId, Option<(Name, bool)>, Vec<InstId>)> = Vec::new();

        for &prong in &prong_nodes {
            let NodeKind::SwitchProng {
                items,
                var_name,
                var_is_ptr,
                expr,
            } = self.node_kind(prong)
            else {
                self.error(prong, "expected switch prong");
                continue;
            };
            let item_nodes = self.node_list(items);
            let block = self.exec.new_block();
            let binding = var_name.map(|name| (name, var_is_ptr));
            let mut prong_case_values = Vec::new();

            if item_nodes.is_empty() {
                if else_block.is_some() {
                    self.error(prong, "multiple else prongs in switch expression");
                } else {
                    else_block = Some(block);
                }
            } else {
                for &item in &item_nodes {
                    match self.node_kind(item) {
                        NodeKind::SwitchRange { start, end } => {
                            let start_value = self.gen_node(start, LVal::None);
                            let end_value = self.gen_node(end, LVal::None);
                            self.use_value(start_value);
                            self.use_value(end_value);
                            check_ranges.push((start_value, end_value));
                            // Ranges become per-value cases at analysis.
                            cases.push(SwitchCase {
                                value: start_value,
                                block,
                            });
                            prong_case_values.push(start_value);
                        }
                        _ => {
                            let value = self.gen_node(item, LVal::None);
                            self.use_value(value);
                            check_items.push(value);
                            cases.push(SwitchCase { value, block });
                            prong_case_values.push(value);
                        }
                    }
                }
            }
            prong_work.push((block, expr, binding, prong_case_values));
        }

        let final_else = match else_block {
            Some(block) => block,
            None => {
                // No else: exhaustiveness is enforced by the prong check;
                // the synthetic else traps.
                let block = self.exec.new_block();
                let saved = self.current_block;
                self.switch_to_block(block);
                self.add(InstKind::Unreachable, node);
                self.switch_to_block(saved);
                block
            }
        };

        self.use_value(target_value);
        self.add(
            InstKind::CheckSwitchProngs {
                target: target_value,
                items: check_items,
                ranges: check_ranges,
                has_else: else_block.is_some(),
            },
            node,
        );
        self.use_value(target_value);
        self.add(
            InstKind::SwitchBr {
                target: target_value,
                cases,
                else_block: final_else,
                is_comptime,
            },
            node,
        );

        let mut predecessors = Vec::new();
        let mut values = Vec::new();
        for (block, expr, binding, case_values) in prong_work {
            self.switch_to_block(block);
            let outer_scope = self.scope;
            if let Some((name, is_ptr)) = binding {
                self.use_value(target_ptr);
                let prong_value = case_values.first().copied();
                let payload_ptr = self.add(
                    InstKind::SwitchVar {
                        target_ptr,
                        prong_value: prong_value.unwrap_or(target_value),
                    },
                    node,
                );
                let init = if is_ptr {
                    payload_ptr
                } else {
                    self.use_value(payload_ptr);
                    self.add(InstKind::LoadPtr { ptr: payload_ptr }, node)
                };
                let var = self.comp.add_variable(
                    name,
                    node,
                    self.import,
                    TypeId::INVALID,
                    true,
                    false,
                    ConstValue::runtime(TypeId::INVALID),
                );
                self.push_scope(node, ScopeKind::VarDecl { var });
                self.use_value(init);
                self.add(
                    InstKind::DeclVar {
                        var,
                        var_type: None,
                        init,
                    },
                    node,
                );
            }
            let value = self.gen_node(expr, LVal::None);
            self.scope = outer_scope;
            if self.flows() {
                predecessors.push(self.current_block);
                values.push(value);
                self.add(
                    InstKind::Br {
                        dest: end_block,
                        is_comptime,
                    },
                    node,
                );
            }
        }

        self.switch_to_block(end_block);
        if predecessors.is_empty() {
            let inst = self.add(InstKind::Unreachable, node);
            self.start_new_block();
            return inst;
        }
        for &value in &values {
            self.use_value(value);
        }
        self.add(
            InstKind::Phi {
                predecessors,
                values,
            },
            node,
        )
    }

    fn gen_var_decl(&mut self, node: NodeId, decl: &zinc_ir::ast::VarDecl) -> InstId {
        let Some(init) = decl.init else {
            return self.error(node, "variables must be initialized");
        };
        // Shadowing check against the current chain.
        if self.comp.find_var(self.scope, decl.name).is_some() {
            let text = self.comp.interner.lookup(decl.name).to_string();
            return self.error(node, format!("redeclaration of variable '{text}'"));
        }

        let var_type = decl.ty.map(|ty_node| self.gen_node(ty_node, LVal::None));
        // Name the container after the variable: `const A = struct {...}`.
        if matches!(
            self.comp.import(self.import).arena.kind(init),
            NodeKind::ContainerDecl(_)
        ) {
            self.container_name_hint = Some(decl.name);
        }
        let init_value = self.gen_node(init, LVal::None);

        let is_comptime = decl.is_comptime || self.is_comptime_here();
        let var = self.comp.add_variable(
            decl.name,
            node,
            self.import,
            TypeId::INVALID,
            decl.is_const,
            is_comptime,
            ConstValue::runtime(TypeId::INVALID),
        );
        self.push_scope(node, ScopeKind::VarDecl { var });
        if let Some(var_type) = var_type {
            self.use_value(var_type);
        }
        self.use_value(init_value);
        self.add(
            InstKind::DeclVar {
                var,
                var_type,
                init: init_value,
            },
            node,
        )
    }

    fn gen_return(&mut self, node: NodeId, kind: ReturnKind, expr: Option<NodeId>) -> InstId {
        if self.comp.scopes.in_defer_expr(self.scope) {
            return self.error(node, "cannot return from defer expression");
        }
        match kind {
            ReturnKind::Unconditional => {
                let value = match expr {
                    Some(expr_node) => self.gen_node(expr_node, LVal::None),
                    None => self.add_const(node, ConstValue::void()),
                };
                self.gen_all_defers(node);
                self.use_value(value);
                let inst = self.add(InstKind::Return { value: Some(value) }, node);
                self.start_new_block();
                inst
            }
            ReturnKind::Error => {
                // `%return x`: if x is an error, run error defers and
                // propagate; otherwise continue with the payload.
                let Some(expr_node) = expr else {
                    return self.error(node, "%return needs an operand");
                };
                let is_comptime = self.is_comptime_here();
                let union_ptr = self.gen_node(expr_node, LVal::Ptr);
                self.use_value(union_ptr);
                let union_value = self.add(InstKind::LoadPtr { ptr: union_ptr }, expr_node);
                self.use_value(union_value);
                let is_err = self.add(InstKind::TestErr { operand: union_value }, node);

                let err_block = self.exec.new_block();
                let ok_block = self.exec.new_block();
                self.use_value(is_err);
                self.add(
                    InstKind::CondBr {
                        cond: is_err,
                        then_block: err_block,
                        else_block: ok_block,
                        is_comptime,
                    },
                    node,
                );

                self.switch_to_block(err_block);
                self.gen_defers_for_exit(node, true, false);
                self.use_value(union_value);
                self.add(
                    InstKind::Return {
                        value: Some(union_value),
                    },
                    node,
                );

                self.switch_to_block(ok_block);
                self.use_value(union_ptr);
                let payload_ptr = self.add(
                    InstKind::UnwrapErrPayload {
                        err_union_ptr: union_ptr,
                        safety_check_on: false,
                    },
                    node,
                );
                self.use_value(payload_ptr);
                self.add(InstKind::LoadPtr { ptr: payload_ptr }, node)
            }
            ReturnKind::Maybe => {
                // `?return x`: propagate null.
                let Some(expr_node) = expr else {
                    return self.error(node, "?return needs an operand");
                };
                let is_comptime = self.is_comptime_here();
                let maybe_ptr = self.gen_node(expr_node, LVal::Ptr);
                self.use_value(maybe_ptr);
                let maybe_value = self.add(InstKind::LoadPtr { ptr: maybe_ptr }, expr_node);
                self.use_value(maybe_value);
                let is_non_null = self.add(InstKind::TestNonNull { operand: maybe_value }, node);

                let ok_block = self.exec.new_block();
                let null_block = self.exec.new_block();
                self.use_value(is_non_null);
                self.add(
                    InstKind::CondBr {
                        cond: is_non_null,
                        then_block: ok_block,
                        else_block: null_block,
                        is_comptime,
                    },
                    node,
                );

                self.switch_to_block(null_block);
                self.gen_defers_for_exit(node, false, true);
                self.use_value(maybe_value);
                self.add(
                    InstKind::Return {
                        value: Some(maybe_value),
                    },
                    node,
                );

                self.switch_to_block(ok_block);
                self.use_value(maybe_ptr);
                let payload_ptr = self.add(
                    InstKind::UnwrapMaybe {
                        ptr: maybe_ptr,
                        safety_check_on: false,
                    },
                    node,
                );
                self.use_value(payload_ptr);
                self.add(InstKind::LoadPtr { ptr: payload_ptr }, node)
            }
        }
    }

    fn gen_break(&mut self, node: NodeId) -> InstId {
        let Some(ctx) = self.loops.last() else {
            return self.error(node, "break expression outside loop");
        };
        let (break_block, loop_scope, is_comptime) =
            (ctx.break_block, ctx.scope_at_entry, ctx.is_comptime);
        self.gen_defers_up_to(loop_scope, node, false, false);
        let inst = self.add(
            InstKind::Br {
                dest: break_block,
                is_comptime,
            },
            node,
        );
        self.start_new_block();
        inst
    }

    fn gen_continue(&mut self, node: NodeId) -> InstId {
        let Some(ctx) = self.loops.last() else {
            return self.error(node, "continue expression outside loop");
        };
        let (continue_block, loop_scope, is_comptime) =
            (ctx.continue_block, ctx.scope_at_entry, ctx.is_comptime);
        self.gen_defers_up_to(loop_scope, node, false, false);
        let inst = self.add(
            InstKind::Br {
                dest: continue_block,
                is_comptime,
            },
            node,
        );
        self.start_new_block();
        inst
    }

    fn gen_goto(&mut self, node: NodeId, name: Name) -> InstId {
        let is_comptime = self.is_comptime_here();
        self.gotos.push(GotoItem {
            node,
            name,
            source_block: self.current_block,
            scope: self.scope,
            is_comptime,
        });
        // Placeholder destination; patched when the body finishes.
        let inst = self.add(
            InstKind::Br {
                dest: self.current_block,
                is_comptime,
            },
            node,
        );
        self.start_new_block();
        inst
    }

    /// Resolve all recorded gotos against the collected labels, rejecting
    /// jumps that would skip a defer.
    fn patch_gotos(&mut self) {
        let gotos = std::mem::take(&mut self.gotos);
        for goto in gotos {
            let Some(&(label_block, label_scope, label_node)) = self.labels.get(&goto.name) else {
                let text = self.comp.interner.lookup(goto.name).to_string();
                self.comp.add_node_error(
                    self.import,
                    goto.node,
                    format!("no label in scope named '{text}'"),
                );
                continue;
            };

            // A defer in scope at the label but not at the goto would have
            // been jumped over: its statement never ran, yet block exit
            // would replay it. Forbidden.
            let mut crossed_defer = None;
            let mut cursor = Some(label_scope);
            while let Some(scope) = cursor {
                if let ScopeKind::Defer { expr_node, .. } = self.comp.scopes.get(scope).kind {
                    let mut goto_cursor = Some(goto.scope);
                    let mut in_goto_chain = false;
                    while let Some(goto_scope) = goto_cursor {
                        if goto_scope == scope {
                            in_goto_chain = true;
                            break;
                        }
                        goto_cursor = self.comp.scopes.get(goto_scope).parent;
                    }
                    if !in_goto_chain {
                        crossed_defer = Some(expr_node);
                    }
                }
                cursor = self.comp.scopes.get(scope).parent;
            }
            if let Some(defer_node) = crossed_defer {
                let import = self.import;
                let label_span = self.comp.node_span(import, label_node);
                let defer_span = self.comp.node_span(import, defer_node);
                let goto_span = self.comp.node_span(import, goto.node);
                let diag = zinc_diagnostic::Diagnostic::error(
                    import.0,
                    goto_span,
                    "goto jumps across defer expression",
                )
                .with_note(import.0, defer_span, "defer here")
                .with_note(import.0, label_span, "label here");
                self.comp.diagnostics.push(diag);
                continue;
            }

            // Patch the placeholder branch.
            let &branch_inst = self
                .exec
                .block(goto.source_block)
                .insts
                .last()
                .expect("goto block has the placeholder branch");
            if let InstKind::Br { dest, .. } = &mut self.exec.inst_mut(branch_inst).kind {
                *dest = label_block;
            }
        }
    }

    /// Replay defers from the current scope up to (exclusive) `target`.
    fn gen_defers_up_to(
        &mut self,
        target: ScopeId,
        node: NodeId,
        is_error_exit: bool,
        is_maybe_exit: bool,
    ) {
        let mut cursor = Some(self.scope);
        while let Some(scope) = cursor {
            if scope == target {
                return;
            }
            let parent = self.comp.scopes.get(scope).parent;
            if let ScopeKind::Defer { kind, expr_node } = self.comp.scopes.get(scope).kind {
                let run = match kind {
                    DeferKind::Unconditional => true,
                    DeferKind::Error => is_error_exit,
                    DeferKind::Maybe => is_maybe_exit,
                };
                if run {
                    self.gen_defer_body(scope, expr_node, node);
                }
            }
            match parent {
                Some(parent) => cursor = Some(parent),
                None => return,
            }
        }
    }

    fn gen_defer_body(&mut self, defer_scope: ScopeId, expr_node: NodeId, _exit_node: NodeId) {
        let saved_scope = self.scope;
        // The defer body sees the scope the defer was declared in, marked
        // so nested returns are rejected.
        self.scope = defer_scope;
        self.push_scope(expr_node, ScopeKind::DeferExpr);
        self.gen_node(expr_node, LVal::None);
        self.scope = saved_scope;
    }

    /// Replay every defer in the function on an unconditional return.
    fn gen_all_defers(&mut self, node: NodeId) {
        let mut cursor = Some(self.scope);
        while let Some(scope) = cursor {
            if matches!(
                self.comp.scopes.get(scope).kind,
                ScopeKind::FnDef { .. } | ScopeKind::Decls { .. }
            ) {
                return;
            }
            if let ScopeKind::Defer { kind, expr_node } = self.comp.scopes.get(scope).kind {
                if kind == DeferKind::Unconditional {
                    self.gen_defer_body(scope, expr_node, node);
                }
            }
            cursor = self.comp.scopes.get(scope).parent;
        }
    }

    /// Defers on an error/null propagation path (`%return` / `?return`).
    fn gen_defers_for_exit(&mut self, node: NodeId, is_error: bool, is_maybe: bool) {
        let mut cursor = Some(self.scope);
        while let Some(scope) = cursor {
            if matches!(
                self.comp.scopes.get(scope).kind,
                ScopeKind::FnDef { .. } | ScopeKind::Decls { .. }
            ) {
                return;
            }
            if let ScopeKind::Defer { kind, expr_node } = self.comp.scopes.get(scope).kind {
                let run = match kind {
                    DeferKind::Unconditional => true,
                    DeferKind::Error => is_error,
                    DeferKind::Maybe => is_maybe,
                };
                if run {
                    self.gen_defer_body(scope, expr_node, node);
                }
            }
            cursor = self.comp.scopes.get(scope).parent;
        }
    }

    fn gen_asm(&mut self, node: NodeId, asm: &zinc_ir::ast::AsmExpr) -> InstId {
        let mut inputs = Vec::with_capacity(asm.inputs.len());
        for input in &asm.inputs {
            let value = self.gen_node(input.expr, LVal::None);
            self.use_value(value);
            inputs.push(value);
        }
        let mut output_types = Vec::with_capacity(asm.outputs.len());
        for output in &asm.outputs {
            if let Some(ret_ty) = output.return_ty {
                let value = self.gen_node(ret_ty, LVal::None);
                self.use_value(value);
                output_types.push(value);
            }
        }
        self.add(
            InstKind::Asm {
                asm_node: node,
                inputs,
                output_types,
            },
            node,
        )
    }

    fn gen_call(
        &mut self,
        node: NodeId,
        callee: NodeId,
        args: zinc_ir::ast::NodeRange,
        is_builtin: bool,
    ) -> InstId {
        let arg_nodes = self.node_list(args);
        if is_builtin {
            return self.gen_builtin_call(node, callee, &arg_nodes);
        }
        let fn_ref = self.gen_node(callee, LVal::None);
        let mut arg_values = Vec::with_capacity(arg_nodes.len());
        for &arg in &arg_nodes {
            let value = self.gen_node(arg, LVal::None);
            self.use_value(value);
            arg_values.push(value);
        }
        self.use_value(fn_ref);
        let is_comptime = self.is_comptime_here();
        self.add(
            InstKind::Call {
                fn_ref,
                args: arg_values,
                is_comptime,
                is_inline: false,
            },
            node,
        )
    }

    fn gen_builtin_call(&mut self, node: NodeId, callee: NodeId, args: &[NodeId]) -> InstId {
        let NodeKind::Symbol { name } = self.node_kind(callee) else {
            return self.error(callee, "invalid builtin reference");
        };
        let Some(builtin) = self.comp.builtins.lookup(name) else {
            let text = self.comp.interner.lookup(name).to_string();
            return self.error(node, format!("invalid builtin function: '{text}'"));
        };
        let expected = builtin.param_count();
        if expected != usize::MAX && args.len() != expected {
            let text = self.comp.interner.lookup(name).to_string();
            return self.error(
                node,
                format!(
                    "expected {expected} arguments, found {} in call to '@{text}'",
                    args.len()
                ),
            );
        }

        // Generate operands up front; every arm below uses `a(i)`.
        let values: Vec<InstId> = args
            .iter()
            .map(|&arg| {
                let value = self.gen_node(arg, LVal::None);
                self.use_value(value);
                value
            })
            .collect();
        let a = |i: usize| values[i];

        let kind = match builtin {
            BuiltinFn::Memcpy => InstKind::Memcpy {
                dest: a(0),
                src: a(1),
                count: a(2),
            },
            BuiltinFn::Memset => InstKind::Memset {
                dest: a(0),
                byte: a(1),
                count: a(2),
            },
            BuiltinFn::SizeOf => InstKind::SizeOf { type_value: a(0) },
            BuiltinFn::AlignOf => InstKind::AlignOf { type_value: a(0) },
            BuiltinFn::OffsetOf => InstKind::OffsetOf {
                type_value: a(0),
                field_name: a(1),
            },
            BuiltinFn::MaxValue => InstKind::MaxValue { type_value: a(0) },
            BuiltinFn::MinValue => InstKind::MinValue { type_value: a(0) },
            BuiltinFn::MemberCount => InstKind::MemberCount { type_value: a(0) },
            BuiltinFn::TypeOf => InstKind::TypeOf { operand: a(0) },
            BuiltinFn::AddWithOverflow => InstKind::OverflowOp {
                op: OverflowOp::Add,
                type_value: a(0),
                op1: a(1),
                op2: a(2),
                result_ptr: a(3),
            },
            BuiltinFn::SubWithOverflow => InstKind::OverflowOp {
                op: OverflowOp::Sub,
                type_value: a(0),
                op1: a(1),
                op2: a(2),
                result_ptr: a(3),
            },
            BuiltinFn::MulWithOverflow => InstKind::OverflowOp {
                op: OverflowOp::Mul,
                type_value: a(0),
                op1: a(1),
                op2: a(2),
                result_ptr: a(3),
            },
            BuiltinFn::ShlWithOverflow => InstKind::OverflowOp {
                op: OverflowOp::Shl,
                type_value: a(0),
                op1: a(1),
                op2: a(2),
                result_ptr: a(3),
            },
            BuiltinFn::CInclude => InstKind::CInclude { name: a(0) },
            BuiltinFn::CDefine => InstKind::CDefine {
                name: a(0),
                value: a(1),
            },
            BuiltinFn::CUndef => InstKind::CUndef { name: a(0) },
            BuiltinFn::CompileErr => InstKind::CompileError { message: a(0) },
            BuiltinFn::CompileLog => InstKind::CompileLog {
                args: values.clone(),
            },
            BuiltinFn::Ctz => InstKind::Ctz { operand: a(0) },
            BuiltinFn::Clz => InstKind::Clz { operand: a(0) },
            BuiltinFn::Import => InstKind::Import { name: a(0) },
            BuiltinFn::CImport => InstKind::CImport,
            BuiltinFn::ErrName => InstKind::ErrName { operand: a(0) },
            BuiltinFn::Breakpoint => InstKind::Breakpoint,
            BuiltinFn::ReturnAddress => InstKind::ReturnAddress,
            BuiltinFn::FrameAddress => InstKind::FrameAddress,
            BuiltinFn::EmbedFile => InstKind::EmbedFile { name: a(0) },
            BuiltinFn::Cmpxchg => InstKind::Cmpxchg {
                ptr: a(0),
                cmp_value: a(1),
                new_value: a(2),
                success_order: a(3),
                failure_order: a(4),
            },
            BuiltinFn::Fence => InstKind::Fence { order: a(0) },
            BuiltinFn::DivExact => InstKind::DivExact {
                op1: a(0),
                op2: a(1),
                safety_check_on: self.safety_on(),
            },
            BuiltinFn::Truncate => InstKind::Truncate {
                dest_type: a(0),
                operand: a(1),
            },
            BuiltinFn::IntType => InstKind::IntTypeInst {
                is_signed: a(0),
                bits: a(1),
            },
            BuiltinFn::SetDebugSafety => InstKind::SetDebugSafety {
                target_scope: self.scope,
                enabled: a(1),
            },
            BuiltinFn::TypeName => InstKind::TypeName { type_value: a(0) },
            BuiltinFn::IsInteger => InstKind::TestType {
                type_value: a(0),
                family: TypeFamily::Int,
            },
            BuiltinFn::IsFloat => InstKind::TestType {
                type_value: a(0),
                family: TypeFamily::Float,
            },
            BuiltinFn::CanImplicitCast => InstKind::CanImplicitCast {
                type_value: a(0),
                operand: a(1),
            },
            BuiltinFn::SetGlobalAlign => InstKind::SetGlobalAlign {
                decl: a(0),
                align: a(1),
            },
            BuiltinFn::SetGlobalSection => InstKind::SetGlobalSection {
                decl: a(0),
                section: a(1),
            },
            BuiltinFn::SetGlobalLinkage => InstKind::SetGlobalLinkage {
                decl: a(0),
                linkage: a(1),
            },
            BuiltinFn::Panic => InstKind::Panic { message: a(0) },
            BuiltinFn::PtrCast => InstKind::PtrCast {
                dest_type: a(0),
                ptr: a(1),
            },
            BuiltinFn::IntToPtr => InstKind::IntToPtr {
                dest_type: a(0),
                operand: a(1),
            },
            BuiltinFn::PtrToInt => InstKind::PtrToInt { operand: a(0) },
            BuiltinFn::IntToEnum => InstKind::IntToEnum {
                dest_type: a(0),
                operand: a(1),
            },
            BuiltinFn::EnumTagName => InstKind::EnumTagName { operand: a(0) },
            BuiltinFn::SetFnRefInline => InstKind::SetFnRefInline { fn_ref: a(0) },
            BuiltinFn::SetEvalBranchQuota => {
                // Applies immediately: quota raises must precede the loop.
                return self.gen_set_quota(node, a(0));
            }
        };
        let inst = self.add(kind, node);
        if matches!(
            self.exec.inst(inst).kind,
            InstKind::CompileError { .. } | InstKind::Panic { .. }
        ) {
            self.start_new_block();
        }
        inst
    }

    fn gen_set_quota(&mut self, node: NodeId, arg: InstId) -> InstId {
        if let Some(value) = self.exec.inst(arg).value.as_int() {
            use num_traits::ToPrimitive;
            if let Some(quota) = value.to_u32() {
                self.comp.backward_branch_quota = self.comp.backward_branch_quota.max(quota);
                return self.add_const(node, ConstValue::void());
            }
        }
        self.error(node, "@setEvalBranchQuota expects a comptime integer")
    }
}

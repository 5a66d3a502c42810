//! Stage-2 analysis: untyped IR → typed, partially evaluated IR.
//!
//! Instructions are walked in block order. Every result gets a resolved
//! type; results whose operands are all compile-time known are folded on
//! the spot (delegating to the comptime [`Interpreter`] for the shared
//! semantics) and replaced by constants. Conditional branches on known
//! conditions collapse to unconditional ones. Calls resolve their
//! callees; generic callees are instantiated per canonicalized comptime
//! argument tuple; inline and comptime calls are interpreted outright.
//!
//! Function state runs `Ready → Probing → {Complete, Invalid}`; re-entry
//! while probing is a type-dependency cycle diagnosed by the caller.

use rustc_hash::FxHashMap;
use tracing::debug;

use zinc_ir::ast::NodeId;
use zinc_types::{
    ConstData, ConstValue, FnId, GenericKey, ImportId, TypeData, TypeId,
};

use crate::fns::{FnAnalState, FnInline};
use crate::ir::cast::{cast_const_value, implicit_cast_op, peer_type};
use crate::ir::eval::{eval_fn_call, Interpreter};
use crate::ir::{build, BlockId, CastOp, InstId, InstKind, IrExec, IrUnOp, SwitchCase};
use crate::tld::TldKind;
use crate::{Compilation, VarId};

/// Analyze one function body into typed IR.
pub fn analyze_fn(comp: &mut Compilation, fn_id: FnId) {
    comp.fn_entry_mut(fn_id).anal_state = FnAnalState::Probing;

    if comp.fn_entry(fn_id).ir.is_none() {
        let built = build::build_fn_ir(comp, fn_id);
        comp.fn_entry_mut(fn_id).ir = built;
    }
    let Some(exec) = comp.fn_entry_mut(fn_id).ir.take() else {
        comp.fn_entry_mut(fn_id).anal_state = FnAnalState::Invalid;
        return;
    };

    let errors_before = comp.diagnostics.error_count();
    let import = comp.fn_entry(fn_id).import;
    let mut analyzer = Analyzer {
        comp,
        old: &exec,
        fn_id,
        import,
        new: IrExec::new(),
        inst_map: vec![None; exec.insts.len()],
        block_map: Vec::new(),
        values: vec![None; exec.insts.len()],
    };
    analyzer.run();
    let analyzed = analyzer.new;

    let failed = comp.diagnostics.error_count() > errors_before;
    analyzed.check_invariants();
    analyzed.check_terminated();
    comp.fn_entry_mut(fn_id).ir = Some(exec);
    comp.fn_entry_mut(fn_id).analyzed = Some(analyzed);
    comp.fn_entry_mut(fn_id).anal_state = if failed {
        FnAnalState::Invalid
    } else {
        FnAnalState::Complete
    };
    debug!(
        name = %comp.fn_entry(fn_id).symbol_name,
        ok = !failed,
        "analyzed fn body"
    );
}

struct Analyzer<'c, 'e> {
    comp: &'c mut Compilation,
    old: &'e IrExec,
    fn_id: FnId,
    import: ImportId,
    new: IrExec,
    /// Old instruction id → new instruction id.
    inst_map: Vec<Option<InstId>>,
    /// Old block id → new block id (identity order).
    block_map: Vec<BlockId>,
    /// Static values discovered per old instruction, shared with the
    /// interpreter when folding.
    values: Vec<Option<ConstValue>>,
}

impl Analyzer<'_, '_> {
    fn run(&mut self) {
        for _ in 0..self.old.blocks.len() {
            let block = self.new.new_block();
            self.block_map.push(block);
        }

        for (block_index, block) in self.old.blocks.iter().enumerate() {
            let new_block = self.block_map[block_index];
            for &inst_id in &block.insts {
                if self.new.block_is_terminated(new_block) {
                    break;
                }
                self.analyze_inst(inst_id, new_block);
            }
            // Unterminated continuation blocks (after goto/unreachable)
            // get an explicit trap so the invariant holds.
            if !self.new.block(new_block).insts.is_empty()
                && !self.new.block_is_terminated(new_block)
            {
                let node = self
                    .old
                    .block(BlockId(block_index as u32))
                    .insts
                    .last()
                    .map(|&inst| self.old.inst(inst).node)
                    .unwrap_or(NodeId::new(0));
                let scope = self.comp.fn_entry(self.fn_id).fndef_scope;
                self.new
                    .add_inst(new_block, InstKind::Unreachable, scope, node);
            }
        }
    }

    fn mapped(&self, old: InstId) -> Option<InstId> {
        self.inst_map[old.index()]
    }

    fn value_of(&self, old: InstId) -> ConstValue {
        self.values[old.index()]
            .clone()
            .unwrap_or_else(ConstValue::invalid)
    }

    fn is_static(&self, old: InstId) -> bool {
        self.values[old.index()]
            .as_ref()
            .is_some_and(ConstValue::is_comptime)
    }

    fn error(&mut self, node: NodeId, message: impl Into<String>) -> ConstValue {
        self.comp.add_node_error(self.import, node, message)
    }

    /// Emit a typed instruction carrying `value`.
    fn emit(
        &mut self,
        old: InstId,
        block: BlockId,
        kind: InstKind,
        value: ConstValue,
    ) -> InstId {
        let inst = self.old.inst(old);
        let (scope, node, ref_count) = (inst.scope, inst.node, inst.ref_count);
        let new_id = self.new.add_inst(block, kind, scope, node);
        self.new.inst_mut(new_id).value = value.clone();
        self.new.inst_mut(new_id).ref_count = ref_count;
        self.inst_map[old.index()] = Some(new_id);
        self.values[old.index()] = Some(value);
        new_id
    }

    fn emit_const(&mut self, old: InstId, block: BlockId, value: ConstValue) -> InstId {
        self.emit(old, block, InstKind::Const, value)
    }

    /// Fold one instruction through the comptime interpreter, reusing the
    /// static values already established for its operands.
    fn fold_through_interpreter(&mut self, old: InstId, block: BlockId) -> InstId {
        let seeded = std::mem::take(&mut self.values);
        let mut interp =
            Interpreter::with_values(self.comp, self.old, self.import, seeded);
        let value = interp.eval_inst(old);
        self.values = interp.into_values();
        self.emit_const(old, block, value)
    }

    /// Convert an already-analyzed operand to `wanted`, inserting a typed
    /// cast instruction (or folding) as needed.
    fn coerce(&mut self, old_operand: InstId, wanted: TypeId, block: BlockId) -> InstId {
        let node = self.old.inst(old_operand).node;
        let Some(mapped) = self.mapped(old_operand) else {
            return self.emit_const(old_operand, block, ConstValue::invalid());
        };
        let value = self.value_of(old_operand);
        // `unreachable` flows into any type; invalid poison stays quiet.
        if value.ty == wanted
            || value.ty == TypeId::NO_RETURN
            || wanted.is_invalid()
            || value.is_invalid()
        {
            return mapped;
        }
        if value.is_comptime() {
            let converted = cast_const_value(self.comp, &value, wanted, self.import, node);
            let new_id = self.new.add_inst(
                block,
                InstKind::Const,
                self.old.inst(old_operand).scope,
                node,
            );
            self.new.inst_mut(new_id).value = converted;
            return new_id;
        }
        match implicit_cast_op(self.comp, wanted, value.ty) {
            Some(cast_op) => {
                let new_id = self.new.add_inst(
                    block,
                    InstKind::Cast {
                        operand: mapped,
                        cast_op,
                    },
                    self.old.inst(old_operand).scope,
                    node,
                );
                self.new.inst_mut(new_id).value = ConstValue::runtime(wanted);
                self.new.add_ref(mapped);
                new_id
            }
            None => {
                let wanted_name = self.comp.types.name(wanted).to_string();
                let actual_name = self.comp.types.name(value.ty).to_string();
                self.error(
                    node,
                    format!("expected type '{wanted_name}', found '{actual_name}'"),
                );
                mapped
            }
        }
    }

    fn ptr_child(&self, ptr_ty: TypeId) -> TypeId {
        match self.comp.types.get(ptr_ty).data {
            TypeData::Pointer { child, .. } => child,
            _ => TypeId::INVALID,
        }
    }

    fn analyze_inst(&mut self, inst_id: InstId, block: BlockId) {
        let inst = self.old.inst(inst_id);
        let node = inst.node;
        match &inst.kind {
            InstKind::Const => {
                let value = inst.value.clone();
                self.emit_const(inst_id, block, value);
            }

            InstKind::Br { dest, is_comptime } => {
                let dest = self.block_map[dest.index()];
                let is_comptime = *is_comptime;
                let branch = self.emit(
                    inst_id,
                    block,
                    InstKind::Br { dest, is_comptime },
                    ConstValue::runtime(TypeId::NO_RETURN),
                );
                // Record how the destination gets entered.
                self.new.blocks[dest.index()].ref_inst.get_or_insert(branch);
            }

            InstKind::CondBr {
                cond,
                then_block,
                else_block,
                is_comptime,
            } => {
                let (cond, then_block, else_block, is_comptime) =
                    (*cond, *then_block, *else_block, *is_comptime);
                let cond_mapped = self.coerce(cond, TypeId::BOOL, block);
                let cond_value = self.value_of(cond);
                // A known condition collapses to an unconditional branch.
                if let Some(flag) = cond_value.as_bool() {
                    let dest = if flag { then_block } else { else_block };
                    let dest = self.block_map[dest.index()];
                    let branch = self.emit(
                        inst_id,
                        block,
                        InstKind::Br { dest, is_comptime },
                        ConstValue::runtime(TypeId::NO_RETURN),
                    );
                    self.new.blocks[dest.index()].ref_inst.get_or_insert(branch);
                    return;
                }
                let then_block = self.block_map[then_block.index()];
                let else_block = self.block_map[else_block.index()];
                self.new.add_ref(cond_mapped);
                let branch = self.emit(
                    inst_id,
                    block,
                    InstKind::CondBr {
                        cond: cond_mapped,
                        then_block,
                        else_block,
                        is_comptime,
                    },
                    ConstValue::runtime(TypeId::NO_RETURN),
                );
                self.new.blocks[then_block.index()]
                    .ref_inst
                    .get_or_insert(branch);
                self.new.blocks[else_block.index()]
                    .ref_inst
                    .get_or_insert(branch);
            }

            InstKind::SwitchBr {
                target,
                cases,
                else_block,
                is_comptime,
            } => {
                let target = *target;
                let else_block = self.block_map[else_block.index()];
                let is_comptime = *is_comptime;
                let cases: Vec<SwitchCase> = cases
                    .iter()
                    .map(|case| SwitchCase {
                        value: self.mapped(case.value).unwrap_or(InstId(0)),
                        block: self.block_map[case.block.index()],
                    })
                    .collect();
                let Some(target_mapped) = self.mapped(target) else {
                    return;
                };
                self.new.add_ref(target_mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::SwitchBr {
                        target: target_mapped,
                        cases,
                        else_block,
                        is_comptime,
                    },
                    ConstValue::runtime(TypeId::NO_RETURN),
                );
            }

            InstKind::Phi {
                predecessors,
                values,
            } => {
                let incoming: Vec<(BlockId, InstId)> = predecessors
                    .iter()
                    .zip(values.iter())
                    .filter_map(|(&pred, &value)| {
                        self.mapped(value).map(|_| (pred, value))
                    })
                    .collect();
                if incoming.is_empty() {
                    self.emit_const(inst_id, block, ConstValue::invalid());
                    return;
                }
                // Peer-type all incoming values.
                let mut ty = self.value_of(incoming[0].1).ty;
                for &(_, value) in &incoming[1..] {
                    let other = self.value_of(value).ty;
                    ty = peer_type(self.comp, ty, other).unwrap_or(ty);
                }
                let mut new_preds = Vec::with_capacity(incoming.len());
                let mut new_values = Vec::with_capacity(incoming.len());
                for &(pred, value) in &incoming {
                    new_preds.push(self.block_map[pred.index()]);
                    new_values.push(self.mapped(value).unwrap());
                }
                self.emit(
                    inst_id,
                    block,
                    InstKind::Phi {
                        predecessors: new_preds,
                        values: new_values,
                    },
                    ConstValue::runtime(ty),
                );
            }

            InstKind::Return { value } => {
                let return_type = self.comp.fn_entry(self.fn_id).return_type;
                let coerced = value.map(|value| self.coerce(value, return_type, block));
                if let Some(coerced) = coerced {
                    self.new.add_ref(coerced);
                }
                self.emit(
                    inst_id,
                    block,
                    InstKind::Return { value: coerced },
                    ConstValue::runtime(TypeId::NO_RETURN),
                );
            }

            InstKind::Unreachable => {
                self.emit(
                    inst_id,
                    block,
                    InstKind::Unreachable,
                    ConstValue::runtime(TypeId::NO_RETURN),
                );
            }

            InstKind::DeclVar {
                var,
                var_type,
                init,
            } => self.analyze_decl_var(inst_id, block, *var, *var_type, *init),

            InstKind::VarPtr { var } => {
                let var_ty = self.comp.var(*var).ty;
                let is_const = self.comp.var(*var).is_const;
                let ptr_ty = self.comp.types.ptr_type(var_ty, is_const);
                // Comptime variables fold to their stored value's address.
                if self.comp.var(*var).is_comptime {
                    let slot = self.comp.var(*var).mem;
                    self.emit_const(
                        inst_id,
                        block,
                        ConstValue::of(
                            ptr_ty,
                            ConstData::Ptr {
                                ptr: zinc_types::ConstPtr::Ref(slot),
                                mutability: zinc_types::PtrMut::ComptimeVar,
                            },
                        ),
                    );
                    return;
                }
                self.emit(
                    inst_id,
                    block,
                    InstKind::VarPtr { var: *var },
                    ConstValue::runtime(ptr_ty),
                );
            }

            InstKind::LoadPtr { ptr } => {
                let ptr = *ptr;
                if self.is_static(ptr) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(ptr) else {
                    return;
                };
                let ptr_ty = self.value_of(ptr).ty;
                let child = self.ptr_child(ptr_ty);
                if child.is_invalid() && !ptr_ty.is_invalid() {
                    let name = self.comp.types.name(ptr_ty).to_string();
                    self.error(node, format!("attempt to dereference non-pointer type '{name}'"));
                }
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::LoadPtr { ptr: mapped },
                    ConstValue::runtime(child),
                );
            }

            InstKind::StorePtr { ptr, value } => {
                let (ptr, value) = (*ptr, *value);
                let ptr_value = self.value_of(ptr);
                if ptr_value.is_comptime() && self.is_static(value) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(ptr_mapped) = self.mapped(ptr) else {
                    return;
                };
                let ptr_ty = ptr_value.ty;
                match self.comp.types.get(ptr_ty).data {
                    TypeData::Pointer {
                        is_const: true, ..
                    } => {
                        self.error(node, "cannot assign to constant");
                        return;
                    }
                    _ => {}
                }
                let child = self.ptr_child(ptr_ty);
                let value_mapped = self.coerce(value, child, block);
                self.new.add_ref(ptr_mapped);
                self.new.add_ref(value_mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::StorePtr {
                        ptr: ptr_mapped,
                        value: value_mapped,
                    },
                    ConstValue::void(),
                );
            }

            InstKind::FieldPtr {
                container_ptr,
                field_name,
            } => self.analyze_field_ptr(inst_id, block, *container_ptr, *field_name),

            InstKind::ElemPtr {
                array_ptr,
                index,
                safety_check_on,
            } => {
                let (array_ptr, index, safety_check_on) = (*array_ptr, *index, *safety_check_on);
                if self.is_static(array_ptr) && self.is_static(index) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(array_mapped) = self.mapped(array_ptr) else {
                    return;
                };
                let usize_ty = self.comp.types.usize_type();
                let index_mapped = self.coerce(index, usize_ty, block);
                let ptr_ty = self.value_of(array_ptr).ty;
                let pointee = self.ptr_child(ptr_ty);
                let elem_ptr_ty = match self.comp.types.get(pointee).data.clone() {
                    TypeData::Array { child, .. } => self.comp.types.ptr_type(child, false),
                    TypeData::Struct(data) if data.is_slice => data.fields[0].ty,
                    _ => {
                        let name = self.comp.types.name(pointee).to_string();
                        self.error(node, format!("type '{name}' does not support indexing"));
                        TypeId::INVALID
                    }
                };
                self.new.add_ref(array_mapped);
                self.new.add_ref(index_mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::ElemPtr {
                        array_ptr: array_mapped,
                        index: index_mapped,
                        safety_check_on,
                    },
                    ConstValue::runtime(elem_ptr_ty),
                );
            }

            InstKind::Call {
                fn_ref,
                args,
                is_comptime,
                is_inline,
            } => {
                let (fn_ref, args, is_comptime, is_inline) =
                    (*fn_ref, args.clone(), *is_comptime, *is_inline);
                self.analyze_call(inst_id, block, fn_ref, &args, is_comptime, is_inline);
            }

            InstKind::DeclRef { tld, lval } => {
                let (tld, lval) = (*tld, *lval);
                self.comp.resolve_tld(tld);
                // Runtime globals keep an instruction; everything else
                // folds to its value.
                let is_runtime_global = matches!(
                    &self.comp.tld(tld).kind,
                    TldKind::Var {
                        global: Some(_),
                        is_const: false,
                        ..
                    }
                ) || matches!(
                    &self.comp.tld(tld).kind,
                    TldKind::Var { global: Some(_), .. } if lval
                );
                if is_runtime_global {
                    let (var_ty, is_const) = match &self.comp.tld(tld).kind {
                        TldKind::Var { var_ty, is_const, .. } => (*var_ty, *is_const),
                        _ => (TypeId::INVALID, false),
                    };
                    let result_ty = if lval {
                        self.comp.types.ptr_type(var_ty, is_const)
                    } else {
                        var_ty
                    };
                    self.emit(
                        inst_id,
                        block,
                        InstKind::DeclRef { tld, lval },
                        ConstValue::runtime(result_ty),
                    );
                    return;
                }
                self.fold_through_interpreter(inst_id, block);
            }

            InstKind::BinOp {
                op,
                lhs,
                rhs,
                safety_check_on,
            } => {
                let (op, lhs, rhs, safety_check_on) = (*op, *lhs, *rhs, *safety_check_on);
                if self.is_static(lhs) && self.is_static(rhs) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let lhs_ty = self.value_of(lhs).ty;
                let rhs_ty = self.value_of(rhs).ty;
                let Some(ty) = peer_type(self.comp, lhs_ty, rhs_ty) else {
                    let a = self.comp.types.name(lhs_ty).to_string();
                    let b = self.comp.types.name(rhs_ty).to_string();
                    self.error(node, format!("incompatible types: '{a}' and '{b}'"));
                    return;
                };
                let lhs_mapped = self.coerce(lhs, ty, block);
                let rhs_mapped = self.coerce(rhs, ty, block);
                let result_ty = if op.is_comparison() { TypeId::BOOL } else { ty };
                self.new.add_ref(lhs_mapped);
                self.new.add_ref(rhs_mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::BinOp {
                        op,
                        lhs: lhs_mapped,
                        rhs: rhs_mapped,
                        safety_check_on,
                    },
                    ConstValue::runtime(result_ty),
                );
            }

            InstKind::UnOp { op, operand } => {
                let (op, operand) = (*op, *operand);
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                let operand_ty = self.value_of(operand).ty;
                let result_ty = match op {
                    IrUnOp::Dereference => self.ptr_child(operand_ty),
                    _ => operand_ty,
                };
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::UnOp {
                        op,
                        operand: mapped,
                    },
                    ConstValue::runtime(result_ty),
                );
            }

            InstKind::BoolNot { operand } => {
                let operand = *operand;
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let mapped = self.coerce(operand, TypeId::BOOL, block);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::BoolNot { operand: mapped },
                    ConstValue::runtime(TypeId::BOOL),
                );
            }

            InstKind::Ref {
                value,
                is_const,
                is_volatile,
            } => {
                let (value, is_const, is_volatile) = (*value, *is_const, *is_volatile);
                if self.is_static(value) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(value) else {
                    return;
                };
                let value_ty = self.value_of(value).ty;
                let ptr_ty = self
                    .comp
                    .types
                    .ptr_type_extra(value_ty, is_const, is_volatile, 0, 0);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::Ref {
                        value: mapped,
                        is_const,
                        is_volatile,
                    },
                    ConstValue::runtime(ptr_ty),
                );
            }

            InstKind::TestNonNull { operand } => {
                let operand = *operand;
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::TestNonNull { operand: mapped },
                    ConstValue::runtime(TypeId::BOOL),
                );
            }

            InstKind::TestErr { operand } => {
                let operand = *operand;
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::TestErr { operand: mapped },
                    ConstValue::runtime(TypeId::BOOL),
                );
            }

            InstKind::UnwrapMaybe {
                ptr,
                safety_check_on,
            } => {
                let (ptr, safety_check_on) = (*ptr, *safety_check_on);
                if self.is_static(ptr) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(ptr) else {
                    return;
                };
                let pointee = self.ptr_child(self.value_of(ptr).ty);
                let payload = match self.comp.types.get(pointee).data {
                    TypeData::Maybe { child } => child,
                    _ => {
                        let name = self.comp.types.name(pointee).to_string();
                        self.error(node, format!("expected nullable type, found '{name}'"));
                        TypeId::INVALID
                    }
                };
                let result_ty = self.comp.types.ptr_type(payload, false);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::UnwrapMaybe {
                        ptr: mapped,
                        safety_check_on,
                    },
                    ConstValue::runtime(result_ty),
                );
            }

            InstKind::UnwrapErrCode { err_union_ptr } => {
                let ptr = *err_union_ptr;
                if self.is_static(ptr) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(ptr) else {
                    return;
                };
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::UnwrapErrCode {
                        err_union_ptr: mapped,
                    },
                    ConstValue::runtime(TypeId::PURE_ERROR),
                );
            }

            InstKind::UnwrapErrPayload {
                err_union_ptr,
                safety_check_on,
            } => {
                let (ptr, safety_check_on) = (*err_union_ptr, *safety_check_on);
                if self.is_static(ptr) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(ptr) else {
                    return;
                };
                let pointee = self.ptr_child(self.value_of(ptr).ty);
                let payload = match self.comp.types.get(pointee).data {
                    TypeData::ErrorUnion { payload } => payload,
                    _ => pointee,
                };
                let result_ty = self.comp.types.ptr_type(payload, false);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::UnwrapErrPayload {
                        err_union_ptr: mapped,
                        safety_check_on,
                    },
                    ConstValue::runtime(result_ty),
                );
            }

            InstKind::MaybeWrap { operand } => {
                let operand = *operand;
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                let ty = self.comp.types.maybe_type(self.value_of(operand).ty);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::MaybeWrap { operand: mapped },
                    ConstValue::runtime(ty),
                );
            }

            InstKind::ErrWrapCode { operand } | InstKind::ErrWrapPayload { operand } => {
                let operand = *operand;
                let is_code = matches!(inst.kind, InstKind::ErrWrapCode { .. });
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                let operand_ty = self.value_of(operand).ty;
                let ty = if is_code {
                    self.comp.types.error_union_type(TypeId::VOID)
                } else {
                    self.comp.types.error_union_type(operand_ty)
                };
                self.new.add_ref(mapped);
                let kind = if is_code {
                    InstKind::ErrWrapCode { operand: mapped }
                } else {
                    InstKind::ErrWrapPayload { operand: mapped }
                };
                self.emit(inst_id, block, kind, ConstValue::runtime(ty));
            }

            InstKind::Slice {
                array,
                start,
                end,
                is_const,
                safety_check_on,
            } => {
                let (array, start, end, is_const, safety_check_on) =
                    (*array, *start, *end, *is_const, *safety_check_on);
                let statically_known = self.is_static(array)
                    && self.is_static(start)
                    && end.is_none_or(|end| self.is_static(end));
                if statically_known {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(array_mapped) = self.mapped(array) else {
                    return;
                };
                let usize_ty = self.comp.types.usize_type();
                let start_mapped = self.coerce(start, usize_ty, block);
                let end_mapped = end.map(|end| self.coerce(end, usize_ty, block));
                let pointee = self.ptr_child(self.value_of(array).ty);
                let elem_ty = match self.comp.types.get(pointee).data.clone() {
                    TypeData::Array { child, .. } => child,
                    TypeData::Struct(data) if data.is_slice => {
                        self.ptr_child(data.fields[0].ty)
                    }
                    _ => {
                        let name = self.comp.types.name(pointee).to_string();
                        self.error(node, format!("type '{name}' does not support slicing"));
                        TypeId::INVALID
                    }
                };
                let slice_ty = self.comp.types.slice_type(elem_ty, is_const);
                self.new.add_ref(array_mapped);
                self.new.add_ref(start_mapped);
                if let Some(end_mapped) = end_mapped {
                    self.new.add_ref(end_mapped);
                }
                self.emit(
                    inst_id,
                    block,
                    InstKind::Slice {
                        array: array_mapped,
                        start: start_mapped,
                        end: end_mapped,
                        is_const,
                        safety_check_on,
                    },
                    ConstValue::runtime(slice_ty),
                );
            }

            InstKind::ArrayLen { array } => {
                let array = *array;
                if self.is_static(array) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(array) else {
                    return;
                };
                let usize_ty = self.comp.types.usize_type();
                let pointee = self.ptr_child(self.value_of(array).ty);
                // Fixed arrays have a comptime length even at runtime.
                if let TypeData::Array { len, .. } = self.comp.types.get(pointee).data {
                    self.emit_const(
                        inst_id,
                        block,
                        ConstValue::int(usize_ty, num_bigint::BigInt::from(len)),
                    );
                    return;
                }
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::ArrayLen { array: mapped },
                    ConstValue::runtime(usize_ty),
                );
            }

            InstKind::OverflowOp {
                op,
                type_value,
                op1,
                op2,
                result_ptr,
            } => {
                let (op, type_value, op1, op2, result_ptr) =
                    (*op, *type_value, *op1, *op2, *result_ptr);
                if self.is_static(op1) && self.is_static(op2) && self.is_static(result_ptr) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let ty_value = self.value_of(type_value);
                let Some(ty) = ty_value.as_type() else {
                    self.error(node, "expected type expression");
                    return;
                };
                let op1_mapped = self.coerce(op1, ty, block);
                let op2_mapped = self.coerce(op2, ty, block);
                let (Some(type_mapped), Some(ptr_mapped)) =
                    (self.mapped(type_value), self.mapped(result_ptr))
                else {
                    return;
                };
                for mapped in [op1_mapped, op2_mapped, ptr_mapped] {
                    self.new.add_ref(mapped);
                }
                self.emit(
                    inst_id,
                    block,
                    InstKind::OverflowOp {
                        op,
                        type_value: type_mapped,
                        op1: op1_mapped,
                        op2: op2_mapped,
                        result_ptr: ptr_mapped,
                    },
                    ConstValue::runtime(TypeId::BOOL),
                );
            }

            InstKind::Asm {
                asm_node,
                inputs,
                output_types,
            } => {
                let asm_node = *asm_node;
                let inputs: Vec<InstId> = inputs
                    .iter()
                    .filter_map(|&input| self.mapped(input))
                    .collect();
                let output_types = output_types.clone();
                // Result type comes from the (sole) typed output.
                let result_ty = output_types
                    .first()
                    .and_then(|&output| self.value_of(output).as_type())
                    .unwrap_or(TypeId::VOID);
                for &input in &inputs {
                    self.new.add_ref(input);
                }
                let mapped_outputs: Vec<InstId> = output_types
                    .iter()
                    .filter_map(|&output| self.mapped(output))
                    .collect();
                self.emit(
                    inst_id,
                    block,
                    InstKind::Asm {
                        asm_node,
                        inputs,
                        output_types: mapped_outputs,
                    },
                    ConstValue::runtime(result_ty),
                );
            }

            InstKind::Memcpy { dest, src, count } => {
                let (dest, src, count) = (*dest, *src, *count);
                let (Some(dest_mapped), Some(src_mapped), Some(count_mapped)) =
                    (self.mapped(dest), self.mapped(src), self.mapped(count))
                else {
                    return;
                };
                for mapped in [dest_mapped, src_mapped, count_mapped] {
                    self.new.add_ref(mapped);
                }
                self.emit(
                    inst_id,
                    block,
                    InstKind::Memcpy {
                        dest: dest_mapped,
                        src: src_mapped,
                        count: count_mapped,
                    },
                    ConstValue::void(),
                );
            }

            InstKind::Memset { dest, byte, count } => {
                let (dest, byte, count) = (*dest, *byte, *count);
                let (Some(dest_mapped), Some(byte_mapped), Some(count_mapped)) =
                    (self.mapped(dest), self.mapped(byte), self.mapped(count))
                else {
                    return;
                };
                for mapped in [dest_mapped, byte_mapped, count_mapped] {
                    self.new.add_ref(mapped);
                }
                self.emit(
                    inst_id,
                    block,
                    InstKind::Memset {
                        dest: dest_mapped,
                        byte: byte_mapped,
                        count: count_mapped,
                    },
                    ConstValue::void(),
                );
            }

            InstKind::Cmpxchg { .. } | InstKind::Fence { .. } => {
                self.passthrough_runtime(inst_id, block, TypeId::VOID);
            }

            InstKind::Breakpoint => {
                self.emit(inst_id, block, InstKind::Breakpoint, ConstValue::void());
            }

            InstKind::ReturnAddress | InstKind::FrameAddress => {
                let u8_ty = self.comp.types.int_type(false, 8);
                let ptr_ty = self.comp.types.ptr_type(u8_ty, true);
                let kind = if matches!(inst.kind, InstKind::ReturnAddress) {
                    InstKind::ReturnAddress
                } else {
                    InstKind::FrameAddress
                };
                self.emit(inst_id, block, kind, ConstValue::runtime(ptr_ty));
            }

            InstKind::Ctz { operand } | InstKind::Clz { operand } => {
                let operand = *operand;
                let is_ctz = matches!(inst.kind, InstKind::Ctz { .. });
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                let ty = self.value_of(operand).ty;
                self.new.add_ref(mapped);
                let kind = if is_ctz {
                    InstKind::Ctz { operand: mapped }
                } else {
                    InstKind::Clz { operand: mapped }
                };
                self.emit(inst_id, block, kind, ConstValue::runtime(ty));
            }

            InstKind::Truncate { dest_type, operand } => {
                let (dest_type, operand) = (*dest_type, *operand);
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let ty = self
                    .value_of(dest_type)
                    .as_type()
                    .unwrap_or(TypeId::INVALID);
                let (Some(type_mapped), Some(operand_mapped)) =
                    (self.mapped(dest_type), self.mapped(operand))
                else {
                    return;
                };
                self.new.add_ref(operand_mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::Truncate {
                        dest_type: type_mapped,
                        operand: operand_mapped,
                    },
                    ConstValue::runtime(ty),
                );
            }

            InstKind::DivExact {
                op1,
                op2,
                safety_check_on,
            } => {
                let (op1, op2, safety_check_on) = (*op1, *op2, *safety_check_on);
                if self.is_static(op1) && self.is_static(op2) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let lhs_ty = self.value_of(op1).ty;
                let rhs_ty = self.value_of(op2).ty;
                let ty = peer_type(self.comp, lhs_ty, rhs_ty).unwrap_or(TypeId::INVALID);
                let op1_mapped = self.coerce(op1, ty, block);
                let op2_mapped = self.coerce(op2, ty, block);
                self.new.add_ref(op1_mapped);
                self.new.add_ref(op2_mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::DivExact {
                        op1: op1_mapped,
                        op2: op2_mapped,
                        safety_check_on,
                    },
                    ConstValue::runtime(ty),
                );
            }

            InstKind::PtrToInt { operand } => {
                let operand = *operand;
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                let usize_ty = self.comp.types.usize_type();
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::PtrToInt { operand: mapped },
                    ConstValue::runtime(usize_ty),
                );
            }

            InstKind::IntToPtr { dest_type, operand }
            | InstKind::PtrCast {
                dest_type,
                ptr: operand,
            }
            | InstKind::IntToEnum { dest_type, operand } => {
                let (dest_type, operand) = (*dest_type, *operand);
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let ty = self
                    .value_of(dest_type)
                    .as_type()
                    .unwrap_or(TypeId::INVALID);
                let (Some(type_mapped), Some(operand_mapped)) =
                    (self.mapped(dest_type), self.mapped(operand))
                else {
                    return;
                };
                self.new.add_ref(operand_mapped);
                let kind = match inst.kind {
                    InstKind::IntToPtr { .. } => InstKind::IntToPtr {
                        dest_type: type_mapped,
                        operand: operand_mapped,
                    },
                    InstKind::PtrCast { .. } => InstKind::PtrCast {
                        dest_type: type_mapped,
                        ptr: operand_mapped,
                    },
                    _ => InstKind::IntToEnum {
                        dest_type: type_mapped,
                        operand: operand_mapped,
                    },
                };
                self.emit(inst_id, block, kind, ConstValue::runtime(ty));
            }

            InstKind::IntToErr { operand } | InstKind::ErrToInt { operand } => {
                let operand = *operand;
                let is_to_err = matches!(inst.kind, InstKind::IntToErr { .. });
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                let ty = if is_to_err {
                    TypeId::PURE_ERROR
                } else {
                    self.comp.types.usize_type()
                };
                self.new.add_ref(mapped);
                let kind = if is_to_err {
                    InstKind::IntToErr { operand: mapped }
                } else {
                    InstKind::ErrToInt { operand: mapped }
                };
                self.emit(inst_id, block, kind, ConstValue::runtime(ty));
            }

            InstKind::EnumTag { operand } | InstKind::EnumTagName { operand } => {
                let operand = *operand;
                let is_tag = matches!(inst.kind, InstKind::EnumTag { .. });
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                if !is_tag {
                    self.comp.err_name_table_needed = true;
                }
                let ty = if is_tag {
                    let operand_ty = self.value_of(operand).ty;
                    match &self.comp.types.get(operand_ty).data {
                        TypeData::Enum(data) => {
                            self.comp.types.int_type(false, data.tag_bits.max(1))
                        }
                        _ => TypeId::INVALID,
                    }
                } else {
                    let u8_ty = self.comp.types.int_type(false, 8);
                    self.comp.types.slice_type(u8_ty, true)
                };
                self.new.add_ref(mapped);
                let kind = if is_tag {
                    InstKind::EnumTag { operand: mapped }
                } else {
                    InstKind::EnumTagName { operand: mapped }
                };
                self.emit(inst_id, block, kind, ConstValue::runtime(ty));
            }

            InstKind::ErrName { operand } => {
                let operand = *operand;
                self.comp.err_name_table_needed = true;
                if self.is_static(operand) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(operand) else {
                    return;
                };
                let u8_ty = self.comp.types.int_type(false, 8);
                let ty = self.comp.types.slice_type(u8_ty, true);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::ErrName { operand: mapped },
                    ConstValue::runtime(ty),
                );
            }

            InstKind::SwitchTarget { target_ptr } => {
                let target_ptr = *target_ptr;
                if self.is_static(target_ptr) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let Some(mapped) = self.mapped(target_ptr) else {
                    return;
                };
                let pointee = self.ptr_child(self.value_of(target_ptr).ty);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::SwitchTarget { target_ptr: mapped },
                    ConstValue::runtime(pointee),
                );
            }

            InstKind::SwitchVar {
                target_ptr,
                prong_value,
            } => {
                let (target_ptr, prong_value) = (*target_ptr, *prong_value);
                if self.is_static(target_ptr) {
                    self.fold_through_interpreter(inst_id, block);
                    return;
                }
                let (Some(target_mapped), Some(prong_mapped)) =
                    (self.mapped(target_ptr), self.mapped(prong_value))
                else {
                    return;
                };
                // Payload pointer type from the prong's enum tag.
                let prong = self.value_of(prong_value);
                let payload_ty = match prong.as_static() {
                    Some(ConstData::Enum { tag, .. }) => {
                        match &self.comp.types.get(prong.ty).data {
                            TypeData::Enum(data) => data.fields[*tag as usize].payload_ty,
                            _ => TypeId::INVALID,
                        }
                    }
                    _ => TypeId::INVALID,
                };
                let result_ty = self.comp.types.ptr_type(payload_ty, false);
                self.new.add_ref(target_mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::SwitchVar {
                        target_ptr: target_mapped,
                        prong_value: prong_mapped,
                    },
                    ConstValue::runtime(result_ty),
                );
            }

            // Everything below is comptime-only: the operands must be
            // static, and the result is always a constant.
            InstKind::FieldPtr { .. } => unreachable!("handled above"),
            InstKind::TypeOf { .. }
            | InstKind::SizeOf { .. }
            | InstKind::AlignOf { .. }
            | InstKind::OffsetOf { .. }
            | InstKind::MinValue { .. }
            | InstKind::MaxValue { .. }
            | InstKind::MemberCount { .. }
            | InstKind::IntTypeInst { .. }
            | InstKind::TypeName { .. }
            | InstKind::TestType { .. }
            | InstKind::TestComptime { .. }
            | InstKind::CanImplicitCast { .. }
            | InstKind::ArrayTypeInst { .. }
            | InstKind::SliceTypeInst { .. }
            | InstKind::FnProtoInst { .. }
            | InstKind::ContainerInitList { .. }
            | InstKind::ContainerInitFields { .. }
            | InstKind::CheckSwitchProngs { .. }
            | InstKind::CompileError { .. }
            | InstKind::CompileLog { .. }
            | InstKind::Import { .. }
            | InstKind::EmbedFile { .. }
            | InstKind::CImport
            | InstKind::CInclude { .. }
            | InstKind::CDefine { .. }
            | InstKind::CUndef { .. }
            | InstKind::SetDebugSafety { .. }
            | InstKind::SetGlobalAlign { .. }
            | InstKind::SetGlobalSection { .. }
            | InstKind::SetGlobalLinkage { .. }
            | InstKind::SetFnRefInline { .. } => {
                self.fold_through_interpreter(inst_id, block);
            }

            InstKind::Panic { message } => {
                let message = *message;
                let Some(mapped) = self.mapped(message) else {
                    return;
                };
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::Panic { message: mapped },
                    ConstValue::runtime(TypeId::NO_RETURN),
                );
            }

            InstKind::Cast { .. }
            | InstKind::StructFieldPtr { .. }
            | InstKind::StructInit { .. }
            | InstKind::WidenOrShorten { .. } => {
                unreachable!("stage-2 instruction in stage-1 input")
            }
        }
    }

    fn passthrough_runtime(&mut self, inst_id: InstId, block: BlockId, ty: TypeId) {
        // Conservative: clone the kind with mapped operands where the
        // kinds above did not need bespoke typing. Only reached for
        // cmpxchg/fence whose operand typing is checked at emission.
        let inst = self.old.inst(inst_id);
        let kind = match &inst.kind {
            InstKind::Cmpxchg {
                ptr,
                cmp_value,
                new_value,
                success_order,
                failure_order,
            } => {
                let mapped: Vec<Option<InstId>> = [ptr, cmp_value, new_value, success_order, failure_order]
                    .iter()
                    .map(|&&operand| self.mapped(operand))
                    .collect();
                if mapped.iter().any(Option::is_none) {
                    return;
                }
                let mapped: Vec<InstId> = mapped.into_iter().map(Option::unwrap).collect();
                for &operand in &mapped {
                    self.new.add_ref(operand);
                }
                InstKind::Cmpxchg {
                    ptr: mapped[0],
                    cmp_value: mapped[1],
                    new_value: mapped[2],
                    success_order: mapped[3],
                    failure_order: mapped[4],
                }
            }
            InstKind::Fence { order } => {
                let Some(mapped) = self.mapped(*order) else {
                    return;
                };
                InstKind::Fence { order: mapped }
            }
            _ => return,
        };
        let result = if matches!(kind, InstKind::Cmpxchg { .. }) {
            ConstValue::runtime(TypeId::BOOL)
        } else {
            ConstValue::runtime(ty)
        };
        self.emit(inst_id, block, kind, result);
    }

    fn analyze_decl_var(
        &mut self,
        inst_id: InstId,
        block: BlockId,
        var: VarId,
        var_type: Option<InstId>,
        init: InstId,
    ) {
        let node = self.old.inst(inst_id).node;
        let explicit_ty = match var_type {
            Some(type_inst) => match self.value_of(type_inst).as_type() {
                Some(ty) => Some(ty),
                None => {
                    self.error(node, "expected type expression");
                    return;
                }
            },
            None => None,
        };

        let init_value = self.value_of(init);
        let mut var_ty = explicit_ty.unwrap_or(init_value.ty);
        // Untyped literals must settle into a concrete type unless the
        // variable itself is comptime.
        let is_comptime_var = self.comp.var(var).is_comptime;
        if !is_comptime_var
            && matches!(var_ty, TypeId::NUM_LIT_INT | TypeId::NUM_LIT_FLOAT)
        {
            if self.comp.var(var).is_const {
                // Const bindings may stay untyped; they fold away.
            } else {
                let name = self.comp.types.name(var_ty).to_string();
                self.error(
                    node,
                    format!("variable of type '{name}' must be const or comptime"),
                );
                var_ty = TypeId::INVALID;
            }
        }
        self.comp.vars[var.index()].ty = var_ty;

        // Comptime variables and static const bindings keep their value
        // in the arena and emit nothing at runtime.
        if is_comptime_var || (self.comp.var(var).is_const && init_value.is_comptime()) {
            let converted = match explicit_ty {
                Some(ty) => cast_const_value(self.comp, &init_value, ty, self.import, node),
                None => init_value,
            };
            let slot = self.comp.var(var).mem;
            *self.comp.values.get_mut(slot) = converted;
            self.emit_const(inst_id, block, ConstValue::void());
            return;
        }

        let init_mapped = self.coerce(init, var_ty, block);
        let type_mapped = var_type.and_then(|type_inst| self.mapped(type_inst));
        self.new.add_ref(init_mapped);
        self.emit(
            inst_id,
            block,
            InstKind::DeclVar {
                var,
                var_type: type_mapped,
                init: init_mapped,
            },
            ConstValue::void(),
        );
    }

    fn analyze_field_ptr(
        &mut self,
        inst_id: InstId,
        block: BlockId,
        container_ptr: InstId,
        field_name: zinc_ir::Name,
    ) {
        let node = self.old.inst(inst_id).node;
        if self.is_static(container_ptr) {
            self.fold_through_interpreter(inst_id, block);
            return;
        }
        let Some(mapped) = self.mapped(container_ptr) else {
            return;
        };
        let pointee = self.ptr_child(self.value_of(container_ptr).ty);
        crate::ir::container::ensure_fields_resolved(self.comp, pointee, self.import, node);

        let entry = self.comp.types.get(pointee);
        let field_text = self.comp.interner.lookup(field_name);
        match entry.data.clone() {
            TypeData::Struct(data) => {
                if data.is_slice {
                    // Slices expose `.len` (and `.ptr`) as fields.
                    let index = if field_text == "len" {
                        1
                    } else if field_text == "ptr" {
                        0
                    } else {
                        let type_name = self.comp.types.name(pointee).to_string();
                        self.error(
                            node,
                            format!("no member named '{field_text}' in '{type_name}'"),
                        );
                        return;
                    };
                    let field_ty = data.fields[index].ty;
                    let ptr_ty = self.comp.types.ptr_type(field_ty, false);
                    self.new.add_ref(mapped);
                    self.emit(
                        inst_id,
                        block,
                        InstKind::StructFieldPtr {
                            struct_ptr: mapped,
                            field_index: index,
                        },
                        ConstValue::runtime(ptr_ty),
                    );
                    return;
                }
                let Some(index) = data
                    .fields
                    .iter()
                    .position(|field| field.name == field_name)
                else {
                    // Member functions: `value.method` binds the function.
                    if let Some(&container_scope) =
                        self.comp.container_scopes.get(&pointee)
                    {
                        if let Some(tld) =
                            self.comp.find_visible_decl(container_scope, field_name, node)
                        {
                            self.comp.resolve_tld(tld);
                            if let TldKind::Fn { fn_id: Some(fn_id) } = &self.comp.tld(tld).kind
                            {
                                let fn_id = *fn_id;
                                let fn_type = self.comp.fn_entry(fn_id).fn_type;
                                let bound_ty = self.comp.types.bound_fn_type(fn_type);
                                self.emit_const(
                                    inst_id,
                                    block,
                                    ConstValue::of(
                                        bound_ty,
                                        ConstData::BoundFn {
                                            fn_id,
                                            is_inline: false,
                                        },
                                    ),
                                );
                                return;
                            }
                        }
                    }
                    let type_name = self.comp.types.name(pointee).to_string();
                    self.error(
                        node,
                        format!("no member named '{field_text}' in '{type_name}'"),
                    );
                    return;
                };
                let field_ty = data.fields[index].ty;
                let ptr_ty = self.comp.types.ptr_type(field_ty, false);
                self.new.add_ref(mapped);
                self.emit(
                    inst_id,
                    block,
                    InstKind::StructFieldPtr {
                        struct_ptr: mapped,
                        field_index: index,
                    },
                    ConstValue::runtime(ptr_ty),
                );
            }
            TypeData::Array { len, .. } => {
                if field_text == "len" {
                    let usize_ty = self.comp.types.usize_type();
                    self.emit_const(
                        inst_id,
                        block,
                        ConstValue::int(usize_ty, num_bigint::BigInt::from(len)),
                    );
                    return;
                }
                let type_name = self.comp.types.name(pointee).to_string();
                self.error(
                    node,
                    format!("no member named '{field_text}' in '{type_name}'"),
                );
            }
            _ => {
                let type_name = self.comp.types.name(pointee).to_string();
                self.error(
                    node,
                    format!("no member named '{field_text}' in '{type_name}'"),
                );
            }
        }
    }

    fn analyze_call(
        &mut self,
        inst_id: InstId,
        block: BlockId,
        fn_ref: InstId,
        args: &[InstId],
        is_comptime: bool,
        is_inline: bool,
    ) {
        let node = self.old.inst(inst_id).node;
        let callee = self.value_of(fn_ref);

        // Calling a type is an explicit cast.
        if let Some(wanted) = callee.as_type() {
            if args.len() != 1 {
                self.error(node, "cast expects exactly one argument");
                return;
            }
            let operand = args[0];
            if self.is_static(operand) {
                self.fold_through_interpreter(inst_id, block);
                return;
            }
            let operand_value = self.value_of(operand);
            let cast_op = self.explicit_cast_op(wanted, operand_value.ty);
            let Some(cast_op) = cast_op else {
                let wanted_name = self.comp.types.name(wanted).to_string();
                let actual_name = self.comp.types.name(operand_value.ty).to_string();
                self.error(
                    node,
                    format!("invalid cast from type '{actual_name}' to type '{wanted_name}'"),
                );
                return;
            };
            let Some(mapped) = self.mapped(operand) else {
                return;
            };
            self.new.add_ref(mapped);
            self.emit(
                inst_id,
                block,
                InstKind::Cast {
                    operand: mapped,
                    cast_op,
                },
                ConstValue::runtime(wanted),
            );
            return;
        }

        let Some((fn_id, callee_inline)) = (match callee.as_static() {
            Some(ConstData::Fn { fn_id, is_inline }) => Some((*fn_id, *is_inline)),
            Some(ConstData::BoundFn { fn_id, is_inline }) => Some((*fn_id, *is_inline)),
            _ => None,
        }) else {
            if !callee.is_invalid() {
                self.error(node, "expected function");
            }
            return;
        };

        let entry_is_generic = self.comp.fn_entry(fn_id).is_generic();
        let force_comptime = is_comptime
            || callee_inline
            || is_inline
            || self.comp.fn_entry(fn_id).fn_inline == FnInline::Always;

        if force_comptime {
            let arg_values: Vec<ConstValue> =
                args.iter().map(|&arg| self.value_of(arg)).collect();
            if arg_values.iter().all(ConstValue::is_comptime) {
                let call_scope = self.old.inst(inst_id).scope;
                let result =
                    eval_fn_call(self.comp, fn_id, arg_values, self.import, node, call_scope);
                self.emit_const(inst_id, block, result);
                return;
            }
            self.error(node, "unable to evaluate constant expression");
            return;
        }

        let target_fn = if entry_is_generic {
            match self.instantiate_generic(fn_id, args, node) {
                Some(instance) => instance,
                None => return,
            }
        } else {
            fn_id
        };

        // Runtime call: coerce runtime arguments to parameter types,
        // dropping comptime-bound and zero-bit parameters. Variadic
        // functions accept extras past the declared list, passed as-is.
        let params = self.comp.fn_entry(target_fn).params.clone();
        let bound = self.comp.fn_entry(target_fn).comptime_args.clone();
        let is_var_args = match &self
            .comp
            .types
            .get(self.comp.fn_entry(target_fn).fn_type)
            .data
        {
            TypeData::Fn(key) => key.is_var_args,
            _ => false,
        };
        let arity_bad = if is_var_args {
            args.len() < params.len()
        } else {
            args.len() != params.len()
        };
        if arity_bad && !entry_is_generic {
            let expected = params.len();
            let name = self.comp.fn_entry(target_fn).symbol_name.clone();
            self.error(
                node,
                format!(
                    "expected {expected} arguments, found {} in call to '{name}'",
                    args.len()
                ),
            );
            return;
        }
        let mut runtime_args = Vec::new();
        for (index, &arg) in args.iter().enumerate() {
            let bound_here = bound
                .as_ref()
                .and_then(|bound| bound.get(index))
                .map(Option::is_some)
                .unwrap_or(false);
            if bound_here {
                continue;
            }
            let Some(param) = params.get(index) else {
                // Variadic extra: passed at its own type.
                if let Some(mapped) = self.mapped(arg) {
                    self.new.add_ref(mapped);
                    runtime_args.push(mapped);
                }
                continue;
            };
            let param_ty = param.ty;
            if self.comp.types.get(param_ty).zero_bits {
                continue;
            }
            let coerced = self.coerce(arg, param_ty, block);
            self.new.add_ref(coerced);
            runtime_args.push(coerced);
        }

        if self.mapped(fn_ref).is_none() {
            return;
        }
        let return_type = self.comp.fn_entry(target_fn).return_type;
        // The call site must reference the concrete instance.
        let fn_type = self.comp.fn_entry(target_fn).fn_type;
        let callee_const = self.new.add_inst(
            block,
            InstKind::Const,
            self.old.inst(fn_ref).scope,
            node,
        );
        self.new.inst_mut(callee_const).value = ConstValue::of(
            fn_type,
            ConstData::Fn {
                fn_id: target_fn,
                is_inline: false,
            },
        );
        self.new.add_ref(callee_const);
        self.emit(
            inst_id,
            block,
            InstKind::Call {
                fn_ref: callee_const,
                args: runtime_args,
                is_comptime: false,
                is_inline: false,
            },
            ConstValue::runtime(return_type),
        );
    }

    fn explicit_cast_op(&mut self, wanted: TypeId, actual: TypeId) -> Option<CastOp> {
        if let Some(cast_op) = implicit_cast_op(self.comp, wanted, actual) {
            return Some(cast_op);
        }
        let wanted_data = self.comp.types.get(wanted).data.clone();
        let actual_data = self.comp.types.get(actual).data.clone();
        match (wanted_data, actual_data) {
            (TypeData::Int(_), TypeData::Int(_)) => Some(CastOp::WidenOrShorten),
            (TypeData::Float { .. }, TypeData::Int(_)) => Some(CastOp::IntToFloat),
            (TypeData::Int(_), TypeData::Float { .. }) => Some(CastOp::FloatToInt),
            (TypeData::Int(_), TypeData::Bool) => Some(CastOp::BoolToInt),
            _ => None,
        }
    }

    /// Materialize (or reuse) the concrete instance of a generic callee
    /// for this call's comptime argument tuple.
    fn instantiate_generic(
        &mut self,
        fn_id: FnId,
        args: &[InstId],
        node: NodeId,
    ) -> Option<FnId> {
        let params = self.comp.fn_entry(fn_id).params.clone();
        if args.len() != params.len() {
            let name = self.comp.fn_entry(fn_id).symbol_name.clone();
            self.error(
                node,
                format!(
                    "expected {} arguments, found {} in call to '{name}'",
                    params.len(),
                    args.len()
                ),
            );
            return None;
        }

        let mut bound: Vec<Option<ConstValue>> = Vec::with_capacity(args.len());
        let mut key_args = Vec::new();
        for (param, &arg) in params.iter().zip(args.iter()) {
            if param.is_comptime {
                let value = self.value_of(arg);
                if !value.is_comptime() {
                    let text = self.comp.interner.lookup(param.name).to_string();
                    self.error(
                        node,
                        format!("parameter '{text}' must be known at compile time"),
                    );
                    return None;
                }
                key_args.push(value.clone());
                bound.push(Some(value));
            } else {
                bound.push(None);
            }
        }

        let key = GenericKey {
            fn_id,
            args: key_args,
        };
        if let Some(instance) = self.comp.generics.get(&key) {
            return Some(instance);
        }

        // The generic's fndef scope chain already includes parameter
        // VarDecls; the instantiation re-creates them with bound values,
        // so start from the declaring scope.
        let (proto_node, body_node, import, parent_scope) = {
            let entry = self.comp.fn_entry(fn_id);
            let mut scope = entry.fndef_scope;
            while !matches!(
                self.comp.scopes.get(scope).kind,
                crate::scope::ScopeKind::Decls { .. }
            ) {
                match self.comp.scopes.get(scope).parent {
                    Some(parent_scope) => scope = parent_scope,
                    None => break,
                }
            }
            (entry.proto_node, entry.body_node, entry.import, scope)
        };
        let instance =
            self.comp
                .resolve_fn_proto(parent_scope, import, proto_node, body_node, Some(&bound))?;
        self.comp.generics.insert(key, instance);
        Some(instance)
    }
}

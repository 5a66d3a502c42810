//! Compile-time execution: interpretation of stage-1 IR.
//!
//! Constant initializers, type expressions, comptime blocks, and calls
//! forced to compile time all run through the [`Interpreter`]: a frame
//! over one [`IrExec`] that walks instructions in control-flow order,
//! requiring every result to be compile-time known. Language-level
//! failures never unwind the host stack; each step yields a value or a
//! poison after reporting its diagnostic.
//!
//! Backward branches (including those taken inside nested call frames)
//! are counted against the compilation's quota; exceeding it aborts the
//! evaluation with the quota diagnostic instead of hanging.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use rustc_hash::FxHashMap;

use zinc_ir::ast::NodeId;
use zinc_ir::Name;
use zinc_types::{
    ConstData, ConstPtr, ConstValue, FnId, ImportId, PtrMut, TypeData, TypeId,
    ValueId,
};

use crate::ir::cast::{cast_const_value, int_bounds, peer_type, wrap_to_type};
use crate::ir::fold::{fold_bin_op, fold_div_exact, fold_un_op};
use crate::ir::{build, BlockId, InstId, InstKind, IrExec, IrUnOp, OverflowOp, TypeFamily};
use crate::scope::{ScopeId, ScopeKind};
use crate::tld::{TldKind, TldResolution};
use crate::{Compilation, VarId};

/// Evaluate an expression at compile time, optionally converting the
/// result to an expected type.
pub fn analyze_const_expr(
    comp: &mut Compilation,
    scope: ScopeId,
    node: NodeId,
    expected: Option<TypeId>,
) -> ConstValue {
    analyze_const_expr_named(comp, scope, node, expected, None)
}

/// Like [`analyze_const_expr`], with a name hint for container
/// declarations (`const A = struct { ... }` names the struct `A`).
pub fn analyze_const_expr_named(
    comp: &mut Compilation,
    scope: ScopeId,
    node: NodeId,
    expected: Option<TypeId>,
    name_hint: Option<Name>,
) -> ConstValue {
    let import = comp.scopes.get(scope).import;
    let exec = build::build_expr_ir(comp, scope, node, name_hint);

    if comp.eval_depth == 0 {
        comp.backward_branch_count = 0;
    }
    comp.eval_depth += 1;
    let mut interp = Interpreter::new(comp, &exec, import);
    let value = interp.run();
    comp.eval_depth -= 1;

    match expected {
        Some(wanted) if !value.is_invalid() => cast_const_value(comp, &value, wanted, import, node),
        _ => value,
    }
}

/// Evaluate a type expression to a canonical type handle.
pub fn resolve_type_expr(comp: &mut Compilation, scope: ScopeId, node: NodeId) -> TypeId {
    let import = comp.scopes.get(scope).import;
    // `-> unreachable` is a type position despite the keyword.
    if matches!(
        comp.import(import).arena.kind(node),
        zinc_ir::ast::NodeKind::Unreachable
    ) {
        return TypeId::NO_RETURN;
    }
    let value = analyze_const_expr(comp, scope, node, None);
    if value.is_invalid() {
        return TypeId::INVALID;
    }
    match value.as_type() {
        Some(ty) => ty,
        None => {
            let found = comp.types.name(value.ty).to_string();
            comp.add_node_error(
                import,
                node,
                format!("expected type expression, found '{found}'"),
            );
            TypeId::INVALID
        }
    }
}

/// Interpret a function call at compile time.
///
/// Pure evaluations are memoized by the call site's scope identity (its
/// scope plus source node), so re-analyzing the same expression reuses
/// the result. Dynamic calls inside a running evaluation are never
/// memoized: each one counts against the backward-branch quota exactly
/// like the original, so an exponential comptime recursion is rejected
/// with the quota diagnostic instead of silently collapsing to linear.
pub fn eval_fn_call(
    comp: &mut Compilation,
    fn_id: FnId,
    args: Vec<ConstValue>,
    import: ImportId,
    node: NodeId,
    scope: ScopeId,
) -> ConstValue {
    if args.iter().any(|arg| arg.is_invalid()) {
        return ConstValue::invalid();
    }
    let top_level = comp.eval_depth == 0;
    let key = (scope, node);
    if top_level {
        if let Some(memoized) = comp.memoized_evals.get(&key) {
            return memoized.clone();
        }
    }

    // Recursive calls count against the same quota as loop back-edges;
    // unbounded comptime recursion fails instead of hanging.
    if top_level {
        comp.backward_branch_count = 0;
    }
    comp.backward_branch_count += 1;
    if comp.backward_branch_count > comp.backward_branch_quota {
        let quota = comp.backward_branch_quota;
        return comp.add_node_error(
            import,
            node,
            format!("evaluation exceeded {quota} backwards branches"),
        );
    }

    if comp.fn_entry(fn_id).body_node.is_none() {
        return comp.add_node_error(
            import,
            node,
            "unable to evaluate constant expression: extern function has no body",
        );
    }
    // The executable is taken out of the entry while this frame runs;
    // re-entrant calls (recursion) rebuild their own copy from the AST.
    if comp.fn_entry(fn_id).ir.is_none() {
        let built = build::build_fn_ir(comp, fn_id);
        comp.fn_entry_mut(fn_id).ir = built;
    }
    let Some(exec) = comp.fn_entry_mut(fn_id).ir.take() else {
        return ConstValue::invalid();
    };

    let fn_import = comp.fn_entry(fn_id).import;
    // Arguments convert to concrete parameter types before binding.
    let param_tys: Vec<TypeId> = comp
        .fn_entry(fn_id)
        .params
        .iter()
        .map(|param| param.ty)
        .collect();
    let mut converted_args = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        let wanted = param_tys.get(index).copied().unwrap_or(TypeId::INVALID);
        let converted = if wanted.is_invalid()
            || wanted == TypeId::VAR
            || wanted == TypeId::META_TYPE
        {
            arg.clone()
        } else {
            cast_const_value(comp, arg, wanted, import, node)
        };
        if converted.is_invalid() {
            return ConstValue::invalid();
        }
        converted_args.push(converted);
    }

    comp.eval_depth += 1;
    let mut interp = Interpreter::new(comp, &exec, fn_import);
    // Bind arguments into a fresh frame so recursion cannot clobber an
    // outer call's parameters.
    let param_vars = interp.comp.fn_entry(fn_id).param_vars.clone();
    for (var, arg) in param_vars.iter().zip(converted_args.iter()) {
        let slot = interp.comp.values.alloc(arg.clone());
        interp.env.insert(*var, slot);
    }
    let result = interp.run();
    comp.eval_depth -= 1;
    comp.fn_entry_mut(fn_id).ir = Some(exec);

    if top_level && !result.is_invalid() {
        comp.memoized_evals.insert(key, result.clone());
    }
    result
}

/// Render a static `[N]u8` / c-string pointer / slice value to text.
pub fn const_value_to_string(comp: &Compilation, value: &ConstValue) -> Option<String> {
    fn array_to_string(elems: &[ConstValue]) -> Option<String> {
        let mut bytes = Vec::with_capacity(elems.len());
        for elem in elems {
            bytes.push(elem.as_int()?.to_u8()?);
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
    match value.as_static()? {
        ConstData::Array(elems) => array_to_string(elems),
        ConstData::Ptr {
            ptr: ConstPtr::BaseArray {
                array,
                elem_index,
                is_cstr,
            },
            ..
        } => {
            let array_value = comp.values.get(*array);
            let ConstData::Array(elems) = array_value.as_static()? else {
                return None;
            };
            let end = if *is_cstr {
                elems.len().saturating_sub(1)
            } else {
                elems.len()
            };
            array_to_string(&elems[*elem_index..end])
        }
        ConstData::Struct(fields) if comp.types.get(value.ty).is_slice() => {
            // { ptr, len }
            let ptr_value = &fields[0];
            let len = fields[1].as_int()?.to_usize()?;
            if let ConstData::Ptr {
                ptr: ConstPtr::BaseArray { array, elem_index, .. },
                ..
            } = ptr_value.as_static()?
            {
                let ConstData::Array(elems) = comp.values.get(*array).as_static()? else {
                    return None;
                };
                array_to_string(&elems[*elem_index..*elem_index + len])
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Build a `[N]u8` value from text.
pub fn make_string_value(comp: &mut Compilation, text: &str) -> ConstValue {
    let u8_ty = comp.types.int_type(false, 8);
    let elems: Vec<ConstValue> = text
        .bytes()
        .map(|byte| ConstValue::int(u8_ty, BigInt::from(byte)))
        .collect();
    let ty = comp.types.array_type(u8_ty, elems.len() as u64);
    ConstValue::of(ty, ConstData::Array(elems))
}

pub struct Interpreter<'c, 'e> {
    pub(crate) comp: &'c mut Compilation,
    exec: &'e IrExec,
    import: ImportId,
    /// Computed value per instruction of this frame.
    values: Vec<Option<ConstValue>>,
    /// Frame-local variable storage, shadowing `Variable::mem`.
    pub(crate) env: FxHashMap<VarId, ValueId>,
}

impl<'c, 'e> Interpreter<'c, 'e> {
    pub fn new(comp: &'c mut Compilation, exec: &'e IrExec, import: ImportId) -> Self {
        Interpreter {
            comp,
            exec,
            import,
            values: vec![None; exec.insts.len()],
            env: FxHashMap::default(),
        }
    }

    /// Frame with pre-seeded instruction values; the stage-2 analyzer
    /// uses this to fold individual instructions whose operands it has
    /// already proven static.
    pub(crate) fn with_values(
        comp: &'c mut Compilation,
        exec: &'e IrExec,
        import: ImportId,
        values: Vec<Option<ConstValue>>,
    ) -> Self {
        Interpreter {
            comp,
            exec,
            import,
            values,
            env: FxHashMap::default(),
        }
    }

    /// Hand the per-instruction values back to the analyzer.
    pub(crate) fn into_values(self) -> Vec<Option<ConstValue>> {
        self.values
    }

    fn error(&mut self, node: NodeId, message: impl Into<String>) -> ConstValue {
        self.comp.add_node_error(self.import, node, message)
    }

    fn value_of(&self, inst: InstId) -> ConstValue {
        self.values[inst.index()]
            .clone()
            .unwrap_or_else(ConstValue::invalid)
    }

    fn var_slot(&mut self, var: VarId) -> ValueId {
        if let Some(&slot) = self.env.get(&var) {
            return slot;
        }
        self.comp.var(var).mem
    }

    /// Run the frame to its `Return`.
    pub fn run(&mut self) -> ConstValue {
        let mut block = self.exec.entry_block();
        let mut prev_block: Option<BlockId> = None;

        'blocks: loop {
            let insts = self.exec.block(block).insts.clone();
            for inst_id in insts {
                let inst = self.exec.inst(inst_id);
                let node = inst.node;
                match &inst.kind {
                    InstKind::Br { dest, .. } => {
                        if self.count_branch(*dest, block, node).is_err() {
                            return ConstValue::invalid();
                        }
                        prev_block = Some(block);
                        block = *dest;
                        continue 'blocks;
                    }
                    InstKind::CondBr {
                        cond,
                        then_block,
                        else_block,
                        ..
                    } => {
                        let cond_value = self.value_of(*cond);
                        let Some(flag) = cond_value.as_bool() else {
                            if cond_value.is_invalid() {
                                return ConstValue::invalid();
                            }
                            return self
                                .error(node, "unable to evaluate constant expression");
                        };
                        let dest = if flag { *then_block } else { *else_block };
                        if self.count_branch(dest, block, node).is_err() {
                            return ConstValue::invalid();
                        }
                        prev_block = Some(block);
                        block = dest;
                        continue 'blocks;
                    }
                    InstKind::SwitchBr {
                        target,
                        cases,
                        else_block,
                        ..
                    } => {
                        let target_value = self.value_of(*target);
                        if target_value.is_invalid() {
                            return ConstValue::invalid();
                        }
                        let mut dest = *else_block;
                        for case in cases {
                            let case_value = self.value_of(case.value);
                            if static_values_equal(&target_value, &case_value) {
                                dest = case.block;
                                break;
                            }
                        }
                        if self.count_branch(dest, block, node).is_err() {
                            return ConstValue::invalid();
                        }
                        prev_block = Some(block);
                        block = dest;
                        continue 'blocks;
                    }
                    InstKind::Return { value } => {
                        return match value {
                            Some(inst) => self.value_of(*inst),
                            None => ConstValue::void(),
                        };
                    }
                    InstKind::Unreachable => {
                        return self.error(node, "reached unreachable code");
                    }
                    InstKind::Phi {
                        predecessors,
                        values,
                    } => {
                        let Some(prev) = prev_block else {
                            return self.error(node, "phi with no predecessor");
                        };
                        let mut chosen = ConstValue::invalid();
                        for (pred, value) in predecessors.iter().zip(values.iter()) {
                            if *pred == prev {
                                chosen = self.value_of(*value);
                                break;
                            }
                        }
                        self.values[inst_id.index()] = Some(chosen);
                    }
                    _ => {
                        let result = self.eval_inst(inst_id);
                        if result.is_invalid() {
                            self.values[inst_id.index()] = Some(result);
                            return ConstValue::invalid();
                        }
                        self.values[inst_id.index()] = Some(result);
                    }
                }
            }
            // A well-formed block ends in a terminator; falling out means
            // the builder produced an unterminated continuation block.
            return ConstValue::void();
        }
    }

    fn count_branch(&mut self, dest: BlockId, current: BlockId, node: NodeId) -> Result<(), ()> {
        if dest.index() <= current.index() {
            self.comp.backward_branch_count += 1;
            if self.comp.backward_branch_count > self.comp.backward_branch_quota {
                let quota = self.comp.backward_branch_quota;
                self.error(
                    node,
                    format!("evaluation exceeded {quota} backwards branches"),
                );
                return Err(());
            }
        }
        Ok(())
    }

    pub(crate) fn eval_inst(&mut self, inst_id: InstId) -> ConstValue {
        let inst = self.exec.inst(inst_id);
        let node = inst.node;
        let scope = inst.scope;
        match &inst.kind {
            InstKind::Const => inst.value.clone(),

            InstKind::DeclVar {
                var,
                var_type,
                init,
            } => {
                let mut value = self.value_of(*init);
                if let Some(type_inst) = var_type {
                    let wanted = self.value_of(*type_inst);
                    match wanted.as_type() {
                        Some(ty) => {
                            value =
                                cast_const_value(self.comp, &value, ty, self.import, node);
                        }
                        None => return self.error(node, "expected type expression"),
                    }
                }
                if value.is_invalid() {
                    return value;
                }
                let slot = self.comp.values.alloc(value);
                self.env.insert(*var, slot);
                ConstValue::void()
            }

            InstKind::VarPtr { var } => {
                let slot = self.var_slot(*var);
                let is_const = self.comp.var(*var).is_const;
                let pointee_ty = self.comp.values.get(slot).ty;
                let ptr_ty = self.comp.types.ptr_type(pointee_ty, is_const);
                ConstValue::of(
                    ptr_ty,
                    ConstData::Ptr {
                        ptr: ConstPtr::Ref(slot),
                        mutability: if is_const {
                            PtrMut::ComptimeConst
                        } else {
                            PtrMut::ComptimeVar
                        },
                    },
                )
            }

            InstKind::LoadPtr { ptr } => {
                let ptr_value = self.value_of(*ptr);
                self.load_through_ptr(&ptr_value, node)
            }

            InstKind::StorePtr { ptr, value } => {
                let ptr_value = self.value_of(*ptr);
                let new_value = self.value_of(*value);
                self.store_through_ptr(&ptr_value, new_value, node)
            }

            InstKind::FieldPtr {
                container_ptr,
                field_name,
            } => {
                let ptr_value = self.value_of(*container_ptr);
                self.eval_field_ptr(&ptr_value, *field_name, scope, node)
            }

            InstKind::ElemPtr {
                array_ptr, index, ..
            } => {
                let ptr_value = self.value_of(*array_ptr);
                let index_value = self.value_of(*index);
                self.eval_elem_ptr(&ptr_value, &index_value, node)
            }

            InstKind::Ref {
                value, is_const, ..
            } => {
                let operand = self.value_of(*value);
                // `&T` over a type builds a pointer type.
                if let Some(child) = operand.as_type() {
                    let ty = self.comp.types.ptr_type(child, *is_const);
                    return ConstValue::type_value(ty);
                }
                let ty = operand.ty;
                let slot = self.comp.values.alloc(operand);
                let ptr_ty = self.comp.types.ptr_type(ty, *is_const);
                ConstValue::of(
                    ptr_ty,
                    ConstData::Ptr {
                        ptr: ConstPtr::Ref(slot),
                        mutability: PtrMut::ComptimeConst,
                    },
                )
            }

            InstKind::UnOp { op, operand } => {
                let operand_value = self.value_of(*operand);
                if *op == IrUnOp::Dereference {
                    return self.load_through_ptr(&operand_value, node);
                }
                fold_un_op(self.comp, *op, &operand_value, self.import, node)
            }

            InstKind::BoolNot { operand } => {
                let operand_value = self.value_of(*operand);
                match operand_value.as_bool() {
                    Some(flag) => ConstValue::bool_value(!flag),
                    None => self.error(node, "expected bool"),
                }
            }

            InstKind::BinOp { op, lhs, rhs, .. } => {
                let lhs_value = self.value_of(*lhs);
                let rhs_value = self.value_of(*rhs);
                let Some(ty) = peer_type(self.comp, lhs_value.ty, rhs_value.ty) else {
                    let a = self.comp.types.name(lhs_value.ty).to_string();
                    let b = self.comp.types.name(rhs_value.ty).to_string();
                    return self.error(node, format!("incompatible types: '{a}' and '{b}'"));
                };
                let lhs_cast = cast_const_value(self.comp, &lhs_value, ty, self.import, node);
                let rhs_cast = cast_const_value(self.comp, &rhs_value, ty, self.import, node);
                fold_bin_op(self.comp, *op, &lhs_cast, &rhs_cast, ty, self.import, node)
            }

            InstKind::DivExact { op1, op2, .. } => {
                let lhs_value = self.value_of(*op1);
                let rhs_value = self.value_of(*op2);
                let ty = peer_type(self.comp, lhs_value.ty, rhs_value.ty)
                    .unwrap_or(TypeId::INVALID);
                fold_div_exact(self.comp, &lhs_value, &rhs_value, ty, self.import, node)
            }

            InstKind::OverflowOp {
                op,
                type_value,
                op1,
                op2,
                result_ptr,
            } => self.eval_overflow_op(*op, *type_value, *op1, *op2, *result_ptr, node),

            InstKind::Call {
                fn_ref,
                args,
                ..
            } => {
                let callee = self.value_of(*fn_ref);
                let arg_values: Vec<ConstValue> =
                    args.iter().map(|&arg| self.value_of(arg)).collect();
                self.eval_call(&callee, arg_values, node, scope)
            }

            InstKind::DeclRef { tld, lval } => self.eval_decl_ref(*tld, *lval, node),

            InstKind::ContainerInitList {
                container_type,
                items,
            } => {
                let type_value = self.value_of(*container_type);
                let item_values: Vec<ConstValue> =
                    items.iter().map(|&item| self.value_of(item)).collect();
                self.eval_init_list(&type_value, item_values, node)
            }

            InstKind::ContainerInitFields {
                container_type,
                fields,
            } => {
                let type_value = self.value_of(*container_type);
                let field_values: Vec<(Name, ConstValue)> = fields
                    .iter()
                    .map(|&(name, value)| (name, self.value_of(value)))
                    .collect();
                self.eval_init_fields(&type_value, field_values, node)
            }

            InstKind::Slice {
                array,
                start,
                end,
                is_const,
                ..
            } => {
                let array_ptr = self.value_of(*array);
                let start_value = self.value_of(*start);
                let end_value = end.map(|end_inst| self.value_of(end_inst));
                self.eval_slice(&array_ptr, &start_value, end_value.as_ref(), *is_const, node)
            }

            InstKind::ArrayTypeInst { size, child } => {
                let size_value = self.value_of(*size);
                let child_value = self.value_of(*child);
                let (Some(len), Some(child_ty)) =
                    (size_value.as_int().and_then(|v| v.to_u64()), child_value.as_type())
                else {
                    return self.error(node, "expected array size and element type");
                };
                let ty = self.comp.types.array_type(child_ty, len);
                ConstValue::type_value(ty)
            }

            InstKind::SliceTypeInst { is_const, child } => {
                let child_value = self.value_of(*child);
                let Some(child_ty) = child_value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                let ty = self.comp.types.slice_type(child_ty, *is_const);
                ConstValue::type_value(ty)
            }

            InstKind::FnProtoInst {
                param_types,
                return_type,
                cc,
                is_var_args,
            } => {
                let mut params = Vec::with_capacity(param_types.len());
                for &param in param_types {
                    let value = self.value_of(param);
                    let Some(ty) = value.as_type() else {
                        return self.error(node, "expected type expression");
                    };
                    params.push(zinc_types::FnParam {
                        is_noalias: false,
                        ty,
                    });
                }
                let ret_value = self.value_of(*return_type);
                let Some(return_ty) = ret_value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                let ty = self.comp.types.fn_type(zinc_types::FnTypeKey {
                    params,
                    return_ty,
                    cc: *cc,
                    is_var_args: *is_var_args,
                    is_generic: false,
                });
                ConstValue::type_value(ty)
            }

            InstKind::TypeOf { operand } => {
                let value = self.value_of(*operand);
                ConstValue::type_value(value.ty)
            }

            InstKind::SizeOf { type_value } => {
                let value = self.value_of(*type_value);
                let Some(ty) = value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                match crate::ir::container::type_size(self.comp, ty, self.import, node) {
                    Some(size) => {
                        let usize_ty = self.comp.types.usize_type();
                        ConstValue::int(usize_ty, BigInt::from(size))
                    }
                    None => ConstValue::invalid(),
                }
            }

            InstKind::AlignOf { type_value } => {
                let value = self.value_of(*type_value);
                let Some(ty) = value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                match crate::ir::container::type_align(self.comp, ty, self.import, node) {
                    Some(align) => {
                        let usize_ty = self.comp.types.usize_type();
                        ConstValue::int(usize_ty, BigInt::from(align))
                    }
                    None => ConstValue::invalid(),
                }
            }

            InstKind::OffsetOf {
                type_value,
                field_name,
            } => {
                let ty_value = self.value_of(*type_value);
                let name_value = self.value_of(*field_name);
                let (Some(ty), Some(name)) = (
                    ty_value.as_type(),
                    const_value_to_string(self.comp, &name_value),
                ) else {
                    return self.error(node, "expected type and field name");
                };
                match crate::ir::container::field_offset(self.comp, ty, &name, self.import, node)
                {
                    Some(offset) => {
                        let usize_ty = self.comp.types.usize_type();
                        ConstValue::int(usize_ty, BigInt::from(offset))
                    }
                    None => ConstValue::invalid(),
                }
            }

            InstKind::MinValue { type_value } | InstKind::MaxValue { type_value } => {
                let is_max = matches!(inst.kind, InstKind::MaxValue { .. });
                let value = self.value_of(*type_value);
                let Some(ty) = value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                let Some((min, max)) = int_bounds(self.comp, ty) else {
                    let name = self.comp.types.name(ty).to_string();
                    return self.error(
                        node,
                        format!("no min/max value available for type '{name}'"),
                    );
                };
                ConstValue::int(ty, if is_max { max } else { min })
            }

            InstKind::MemberCount { type_value } => {
                let value = self.value_of(*type_value);
                let Some(ty) = value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                let count = match &self.comp.types.get(ty).data {
                    TypeData::Enum(data) => data.fields.len(),
                    TypeData::Struct(data) => data.fields.len(),
                    TypeData::Union(data) => data.fields.len(),
                    _ => {
                        let name = self.comp.types.name(ty).to_string();
                        return self
                            .error(node, format!("type '{name}' has no members"));
                    }
                };
                ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(count))
            }

            InstKind::IntTypeInst { is_signed, bits } => {
                let signed_value = self.value_of(*is_signed);
                let bits_value = self.value_of(*bits);
                let (Some(signed), Some(bits)) = (
                    signed_value.as_bool(),
                    bits_value.as_int().and_then(|v| v.to_u32()),
                ) else {
                    return self.error(node, "@intType expects (bool, comptime integer)");
                };
                let ty = self.comp.types.int_type(signed, bits);
                ConstValue::type_value(ty)
            }

            InstKind::TypeName { type_value } => {
                let value = self.value_of(*type_value);
                let Some(ty) = value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                let name = self.comp.types.name(ty).to_string();
                make_string_value(self.comp, &name)
            }

            InstKind::TestType { type_value, family } => {
                let value = self.value_of(*type_value);
                let Some(ty) = value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                let matches_family = match family {
                    TypeFamily::Int => matches!(self.comp.types.get(ty).data, TypeData::Int(_)),
                    TypeFamily::Float => {
                        matches!(self.comp.types.get(ty).data, TypeData::Float { .. })
                    }
                };
                ConstValue::bool_value(matches_family)
            }

            InstKind::CanImplicitCast {
                type_value,
                operand,
            } => {
                let ty_value = self.value_of(*type_value);
                let operand_value = self.value_of(*operand);
                let Some(wanted) = ty_value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                // Value-dependent literal fits count too; the probe uses
                // the quiet cast path so a negative answer leaves no
                // diagnostic behind.
                let can = crate::ir::cast::implicit_cast_op(self.comp, wanted, operand_value.ty)
                    .is_some()
                    || crate::ir::cast::try_cast_const_value(self.comp, &operand_value, wanted)
                        .is_ok_and(|converted| !converted.is_invalid());
                ConstValue::bool_value(can)
            }

            InstKind::TestComptime { .. } => ConstValue::bool_value(true),

            InstKind::TestNonNull { operand } => {
                let value = self.value_of(*operand);
                if value.ty == TypeId::NULL_LIT {
                    return ConstValue::bool_value(false);
                }
                match value.as_static() {
                    Some(ConstData::Maybe(payload)) => {
                        ConstValue::bool_value(payload.is_some())
                    }
                    _ => self.error(node, "expected nullable value"),
                }
            }

            InstKind::UnwrapMaybe { ptr, .. } => {
                let ptr_value = self.value_of(*ptr);
                let maybe = self.load_through_ptr(&ptr_value, node);
                match maybe.as_static() {
                    Some(ConstData::Maybe(Some(payload))) => {
                        let payload = (**payload).clone();
                        let ty = payload.ty;
                        let slot = self.comp.values.alloc(payload);
                        let ptr_ty = self.comp.types.ptr_type(ty, true);
                        ConstValue::of(
                            ptr_ty,
                            ConstData::Ptr {
                                ptr: ConstPtr::Ref(slot),
                                mutability: PtrMut::ComptimeConst,
                            },
                        )
                    }
                    Some(ConstData::Maybe(None)) => self.error(node, "unable to unwrap null"),
                    _ => {
                        if maybe.is_invalid() {
                            maybe
                        } else {
                            self.error(node, "expected nullable value")
                        }
                    }
                }
            }

            InstKind::TestErr { operand } => {
                let value = self.value_of(*operand);
                if value.ty == TypeId::PURE_ERROR {
                    return ConstValue::bool_value(true);
                }
                match value.as_static() {
                    Some(ConstData::ErrUnion { err, .. }) => {
                        ConstValue::bool_value(err.is_some())
                    }
                    // A non-error-union value never is an error.
                    Some(_) => ConstValue::bool_value(false),
                    None => self.error(node, "unable to evaluate constant expression"),
                }
            }

            InstKind::UnwrapErrCode { err_union_ptr } => {
                let ptr_value = self.value_of(*err_union_ptr);
                let err_union = self.load_through_ptr(&ptr_value, node);
                match err_union.as_static() {
                    Some(ConstData::ErrUnion { err: Some(err), .. }) => {
                        ConstValue::of(TypeId::PURE_ERROR, ConstData::PureError(*err))
                    }
                    Some(ConstData::PureError(err)) => {
                        ConstValue::of(TypeId::PURE_ERROR, ConstData::PureError(*err))
                    }
                    _ => self.error(node, "expected error value"),
                }
            }

            InstKind::UnwrapErrPayload { err_union_ptr, .. } => {
                let ptr_value = self.value_of(*err_union_ptr);
                let err_union = self.load_through_ptr(&ptr_value, node);
                match err_union.as_static() {
                    Some(ConstData::ErrUnion {
                        err: None,
                        payload,
                    }) => payload
                        .as_deref()
                        .cloned()
                        .unwrap_or_else(ConstValue::void),
                    Some(ConstData::ErrUnion { err: Some(err), .. }) => {
                        let name = self
                            .comp
                            .interner
                            .lookup(self.comp.error_values[err.index()].name)
                            .to_string();
                        self.error(node, format!("caught unexpected error '{name}'"))
                    }
                    // A plain value wrapped implicitly.
                    Some(_) => err_union.clone(),
                    None => self.error(node, "unable to evaluate constant expression"),
                }
            }

            InstKind::MaybeWrap { operand } => {
                let value = self.value_of(*operand);
                let ty = self.comp.types.maybe_type(value.ty);
                ConstValue::of(ty, ConstData::Maybe(Some(Box::new(value))))
            }

            InstKind::ErrWrapCode { operand } => {
                let value = self.value_of(*operand);
                match value.as_static() {
                    Some(ConstData::PureError(err)) => {
                        let ty = self.comp.types.error_union_type(TypeId::VOID);
                        ConstValue::of(
                            ty,
                            ConstData::ErrUnion {
                                err: Some(*err),
                                payload: None,
                            },
                        )
                    }
                    _ => self.error(node, "expected error value"),
                }
            }

            InstKind::ErrWrapPayload { operand } => {
                let value = self.value_of(*operand);
                let ty = self.comp.types.error_union_type(value.ty);
                ConstValue::of(
                    ty,
                    ConstData::ErrUnion {
                        err: None,
                        payload: Some(Box::new(value)),
                    },
                )
            }

            InstKind::EnumTag { operand } => {
                let value = self.value_of(*operand);
                match value.as_static() {
                    Some(ConstData::Enum { tag, .. }) => {
                        ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(*tag))
                    }
                    _ => self.error(node, "expected enum value"),
                }
            }

            InstKind::EnumTagName { operand } => {
                let value = self.value_of(*operand);
                let Some(ConstData::Enum { tag, .. }) = value.as_static() else {
                    return self.error(node, "expected enum value");
                };
                let TypeData::Enum(data) = &self.comp.types.get(value.ty).data else {
                    return self.error(node, "expected enum value");
                };
                let name = self
                    .comp
                    .interner
                    .lookup(data.fields[*tag as usize].name)
                    .to_string();
                make_string_value(self.comp, &name)
            }

            InstKind::ErrName { operand } => {
                self.comp.err_name_table_needed = true;
                let value = self.value_of(*operand);
                match value.as_static() {
                    Some(ConstData::PureError(err)) => {
                        let name = self
                            .comp
                            .interner
                            .lookup(self.comp.error_values[err.index()].name)
                            .to_string();
                        make_string_value(self.comp, &name)
                    }
                    _ => self.error(node, "expected error value"),
                }
            }

            InstKind::ArrayLen { array } => {
                let ptr_value = self.value_of(*array);
                let array_value = self.load_through_ptr(&ptr_value, node);
                let usize_ty = self.comp.types.usize_type();
                match array_value.as_static() {
                    Some(ConstData::Array(elems)) => {
                        ConstValue::int(usize_ty, BigInt::from(elems.len()))
                    }
                    Some(ConstData::Struct(fields))
                        if self.comp.types.get(array_value.ty).is_slice() =>
                    {
                        fields[1].clone()
                    }
                    _ => self.error(node, "expected array or slice"),
                }
            }

            InstKind::Truncate { dest_type, operand } => {
                let ty_value = self.value_of(*dest_type);
                let operand_value = self.value_of(*operand);
                let (Some(ty), Some(value)) = (ty_value.as_type(), operand_value.as_int()) else {
                    return self.error(node, "@truncate expects (type, integer)");
                };
                ConstValue::int(ty, wrap_to_type(self.comp, value, ty))
            }

            InstKind::Ctz { operand } | InstKind::Clz { operand } => {
                let is_ctz = matches!(inst.kind, InstKind::Ctz { .. });
                let value = self.value_of(*operand);
                let Some(int_value) = value.as_int() else {
                    return self.error(node, "expected integer value");
                };
                let Some(info) = self.comp.types.get(value.ty).int_info() else {
                    return self.error(node, "expected sized integer type");
                };
                let wrapped = wrap_to_type(self.comp, int_value, value.ty);
                let magnitude = wrapped.magnitude();
                let result = if magnitude.is_zero() {
                    u64::from(info.bits)
                } else if is_ctz {
                    magnitude.trailing_zeros().unwrap_or(0)
                } else {
                    u64::from(info.bits) - 1 - (magnitude.bits() - 1)
                };
                ConstValue::int(value.ty, BigInt::from(result))
            }

            InstKind::IntToErr { operand } => {
                let value = self.value_of(*operand);
                let Some(code) = value.as_int().and_then(|v| v.to_u32()) else {
                    return self.error(node, "expected integer value");
                };
                if code == 0 || (code as usize) > self.comp.error_values.len() {
                    return self.error(node, format!("integer value {code} represents no error"));
                }
                ConstValue::of(
                    TypeId::PURE_ERROR,
                    ConstData::PureError(zinc_types::ErrorId(code - 1)),
                )
            }

            InstKind::ErrToInt { operand } => {
                let value = self.value_of(*operand);
                match value.as_static() {
                    Some(ConstData::PureError(err)) => {
                        let code = self.comp.error_values[err.index()].value;
                        ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(code))
                    }
                    _ => self.error(node, "expected error value"),
                }
            }

            InstKind::IntToEnum { dest_type, operand } => {
                let ty_value = self.value_of(*dest_type);
                let operand_value = self.value_of(*operand);
                let (Some(ty), Some(tag)) = (
                    ty_value.as_type(),
                    operand_value.as_int().and_then(|v| v.to_u32()),
                ) else {
                    return self.error(node, "@intToEnum expects (type, integer)");
                };
                let TypeData::Enum(data) = &self.comp.types.get(ty).data else {
                    return self.error(node, "expected enum type");
                };
                if tag as usize >= data.fields.len() {
                    return self.error(node, format!("integer value {tag} represents no tag"));
                }
                ConstValue::of(ty, ConstData::Enum { tag, payload: None })
            }

            InstKind::PtrToInt { operand } => {
                let value = self.value_of(*operand);
                match value.as_static() {
                    Some(ConstData::Ptr {
                        ptr: ConstPtr::HardCodedAddr(addr),
                        ..
                    }) => {
                        let usize_ty = self.comp.types.usize_type();
                        ConstValue::int(usize_ty, BigInt::from(*addr))
                    }
                    _ => self.error(node, "unable to evaluate constant expression"),
                }
            }

            InstKind::IntToPtr { dest_type, operand } => {
                let ty_value = self.value_of(*dest_type);
                let operand_value = self.value_of(*operand);
                let (Some(ty), Some(addr)) = (
                    ty_value.as_type(),
                    operand_value.as_int().and_then(|v| v.to_u64()),
                ) else {
                    return self.error(node, "@intToPtr expects (type, integer)");
                };
                // The binary keeps the literal address; reads through it
                // at comptime are refused in load_through_ptr.
                ConstValue::of(
                    ty,
                    ConstData::Ptr {
                        ptr: ConstPtr::HardCodedAddr(addr),
                        mutability: PtrMut::RuntimeVar,
                    },
                )
            }

            InstKind::PtrCast { dest_type, ptr } => {
                let ty_value = self.value_of(*dest_type);
                let ptr_value = self.value_of(*ptr);
                let Some(ty) = ty_value.as_type() else {
                    return self.error(node, "expected type expression");
                };
                let mut out = ptr_value;
                out.ty = ty;
                out
            }

            InstKind::CompileError { message } => {
                let message_value = self.value_of(*message);
                let text = const_value_to_string(self.comp, &message_value)
                    .unwrap_or_else(|| "(non-string message)".to_string());
                self.error(node, text)
            }

            InstKind::CompileLog { args } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|&arg| {
                        let value = self.value_of(arg);
                        const_value_to_string(self.comp, &value)
                            .unwrap_or_else(|| format!("{value:?}"))
                    })
                    .collect();
                eprintln!("| {}", rendered.join(", "));
                ConstValue::void()
            }

            InstKind::Panic { .. } => {
                self.error(node, "encountered @panic at compile-time")
            }

            InstKind::Import { name } => {
                let name_value = self.value_of(*name);
                let Some(text) = const_value_to_string(self.comp, &name_value) else {
                    return self.error(node, "@import expects a string literal");
                };
                match self.comp.load_import(self.import, &text) {
                    Ok(import) => ConstValue::of(
                        self.comp.import(import).namespace_ty,
                        ConstData::Namespace(import),
                    ),
                    Err(message) => {
                        self.error(node, format!("unable to import '{text}': {message}"))
                    }
                }
            }

            InstKind::EmbedFile { name } => {
                let name_value = self.value_of(*name);
                let Some(text) = const_value_to_string(self.comp, &name_value) else {
                    return self.error(node, "@embedFile expects a string literal");
                };
                match self.comp.load_raw(self.import, &text) {
                    Ok(contents) => make_string_value(self.comp, &contents),
                    Err(message) => {
                        self.error(node, format!("unable to open '{text}': {message}"))
                    }
                }
            }

            InstKind::CImport
            | InstKind::CInclude { .. }
            | InstKind::CDefine { .. }
            | InstKind::CUndef { .. } => {
                let result = self.comp.c_importer.import("");
                match result {
                    Ok((path, source)) => match self.comp.add_source(path, source) {
                        Ok(import) => ConstValue::of(
                            self.comp.import(import).namespace_ty,
                            ConstData::Namespace(import),
                        ),
                        Err(()) => ConstValue::invalid(),
                    },
                    Err(message) => self.error(node, message),
                }
            }

            InstKind::SetDebugSafety {
                target_scope,
                enabled,
            } => {
                let enabled_value = self.value_of(*enabled);
                let Some(flag) = enabled_value.as_bool() else {
                    return self.error(node, "@setDebugSafety expects a comptime bool");
                };
                // Applies to the nearest block (or file) scope.
                let mut cursor = *target_scope;
                loop {
                    match &mut self.comp.scopes.get_mut(cursor).kind {
                        ScopeKind::Block { safety_off }
                        | ScopeKind::Decls { safety_off, .. } => {
                            *safety_off = !flag;
                            break;
                        }
                        _ => match self.comp.scopes.get(cursor).parent {
                            Some(parent) => cursor = parent,
                            None => break,
                        },
                    }
                }
                ConstValue::void()
            }

            InstKind::SetGlobalAlign { decl, align } => {
                self.eval_set_global(*decl, *align, node, GlobalAttr::Align)
            }
            InstKind::SetGlobalSection { decl, section } => {
                self.eval_set_global(*decl, *section, node, GlobalAttr::Section)
            }
            InstKind::SetGlobalLinkage { decl, linkage } => {
                self.eval_set_global(*decl, *linkage, node, GlobalAttr::Linkage)
            }

            InstKind::SetFnRefInline { fn_ref } => {
                let value = self.value_of(*fn_ref);
                match value.as_static() {
                    Some(ConstData::Fn { fn_id, .. }) => ConstValue::of(
                        value.ty,
                        ConstData::Fn {
                            fn_id: *fn_id,
                            is_inline: true,
                        },
                    ),
                    _ => self.error(node, "expected function"),
                }
            }

            InstKind::CheckSwitchProngs {
                target,
                items,
                ranges,
                has_else,
            } => {
                let target_value = self.value_of(*target);
                let item_values: Vec<ConstValue> =
                    items.iter().map(|&item| self.value_of(item)).collect();
                let range_values: Vec<(ConstValue, ConstValue)> = ranges
                    .iter()
                    .map(|&(start, end)| (self.value_of(start), self.value_of(end)))
                    .collect();
                self.check_switch_prongs(&target_value, &item_values, &range_values, *has_else, node)
            }

            InstKind::SwitchTarget { target_ptr } => {
                let ptr_value = self.value_of(*target_ptr);
                self.load_through_ptr(&ptr_value, node)
            }

            InstKind::SwitchVar {
                target_ptr,
                ..
            } => {
                let ptr_value = self.value_of(*target_ptr);
                let target = self.load_through_ptr(&ptr_value, node);
                match target.as_static() {
                    Some(ConstData::Enum {
                        payload: Some(payload),
                        ..
                    }) => {
                        let payload = (**payload).clone();
                        let ty = payload.ty;
                        let slot = self.comp.values.alloc(payload);
                        let ptr_ty = self.comp.types.ptr_type(ty, true);
                        ConstValue::of(
                            ptr_ty,
                            ConstData::Ptr {
                                ptr: ConstPtr::Ref(slot),
                                mutability: PtrMut::ComptimeConst,
                            },
                        )
                    }
                    _ => ptr_value,
                }
            }

            InstKind::Memcpy { dest, src, count } => {
                let dest_ptr = self.value_of(*dest);
                let src_ptr = self.value_of(*src);
                let count_value = self.value_of(*count);
                self.eval_memcpy(&dest_ptr, &src_ptr, &count_value, node)
            }

            InstKind::Memset { dest, byte, count } => {
                let dest_ptr = self.value_of(*dest);
                let byte_value = self.value_of(*byte);
                let count_value = self.value_of(*count);
                self.eval_memset(&dest_ptr, &byte_value, &count_value, node)
            }

            InstKind::Asm { .. }
            | InstKind::Cmpxchg { .. }
            | InstKind::Fence { .. }
            | InstKind::Breakpoint
            | InstKind::ReturnAddress
            | InstKind::FrameAddress => {
                self.error(node, "unable to evaluate constant expression")
            }

            // Stage-2-only instructions never appear in stage-1 IR.
            InstKind::Cast { .. }
            | InstKind::StructFieldPtr { .. }
            | InstKind::StructInit { .. }
            | InstKind::WidenOrShorten { .. } => {
                self.error(node, "unexpected typed instruction in comptime execution")
            }

            InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::SwitchBr { .. }
            | InstKind::Phi { .. }
            | InstKind::Return { .. }
            | InstKind::Unreachable => unreachable!("control handled by run()"),
        }
    }

    fn load_through_ptr(&mut self, ptr_value: &ConstValue, node: NodeId) -> ConstValue {
        if ptr_value.is_invalid() {
            return ConstValue::invalid();
        }
        match ptr_value.as_static() {
            Some(ConstData::Ptr { ptr, .. }) => match ptr {
                ConstPtr::Ref(slot) => self.comp.values.get(*slot).clone(),
                ConstPtr::BaseArray {
                    array, elem_index, ..
                } => match self.comp.values.get(*array).as_static() {
                    Some(ConstData::Array(elems)) => match elems.get(*elem_index) {
                        Some(elem) => elem.clone(),
                        None => self.error(node, "index out of bounds"),
                    },
                    _ => ConstValue::invalid(),
                },
                ConstPtr::BaseStruct { struct_val, field } => {
                    match self.comp.values.get(*struct_val).as_static() {
                        Some(ConstData::Struct(fields)) => fields[*field].clone(),
                        _ => ConstValue::invalid(),
                    }
                }
                ConstPtr::HardCodedAddr(_) => self.error(
                    node,
                    "unable to evaluate constant expression: pointer has a hard-coded address",
                ),
                ConstPtr::Discard => self.error(node, "cannot read from discarding store"),
            },
            // Values flowing where a pointer was expected were produced by
            // rvalue positions; treat them as a load of themselves.
            Some(_) => ptr_value.clone(),
            None => self.error(node, "unable to evaluate constant expression"),
        }
    }

    fn store_through_ptr(
        &mut self,
        ptr_value: &ConstValue,
        new_value: ConstValue,
        node: NodeId,
    ) -> ConstValue {
        if ptr_value.is_invalid() || new_value.is_invalid() {
            return ConstValue::invalid();
        }
        let Some(ConstData::Ptr { ptr, mutability }) = ptr_value.as_static() else {
            return self.error(node, "invalid assignment target");
        };
        if *mutability == PtrMut::ComptimeConst {
            return self.error(node, "cannot assign to constant");
        }
        match ptr {
            ConstPtr::Discard => ConstValue::void(),
            ConstPtr::Ref(slot) => {
                let slot = *slot;
                let old_ty = self.comp.values.get(slot).ty;
                let converted = if old_ty.is_invalid() || old_ty == TypeId::NUM_LIT_INT {
                    new_value
                } else {
                    cast_const_value(self.comp, &new_value, old_ty, self.import, node)
                };
                if converted.is_invalid() {
                    return converted;
                }
                *self.comp.values.get_mut(slot) = converted;
                ConstValue::void()
            }
            ConstPtr::BaseArray {
                array, elem_index, ..
            } => {
                let (array, elem_index) = (*array, *elem_index);
                if let Some(ConstData::Array(elems)) =
                    self.comp.values.get_mut(array).as_static_mut()
                {
                    if elem_index < elems.len() {
                        elems[elem_index] = new_value;
                        return ConstValue::void();
                    }
                }
                self.error(node, "index out of bounds")
            }
            ConstPtr::BaseStruct { struct_val, field } => {
                let (struct_val, field) = (*struct_val, *field);
                if let Some(ConstData::Struct(fields)) =
                    self.comp.values.get_mut(struct_val).as_static_mut()
                {
                    if field < fields.len() {
                        fields[field] = new_value;
                        return ConstValue::void();
                    }
                }
                ConstValue::invalid()
            }
            ConstPtr::HardCodedAddr(_) => self.error(
                node,
                "unable to evaluate constant expression: pointer has a hard-coded address",
            ),
        }
    }

    fn eval_field_ptr(
        &mut self,
        ptr_value: &ConstValue,
        field_name: Name,
        _scope: ScopeId,
        node: NodeId,
    ) -> ConstValue {
        let container = self.load_through_ptr(ptr_value, node);
        if container.is_invalid() {
            return container;
        }

        // Namespace member: resolve the declaration.
        if let Some(ConstData::Namespace(import)) = container.as_static() {
            let decls_scope = self.comp.import(*import).decls_scope;
            let Some(tld) = self.comp.find_visible_decl(decls_scope, field_name, node) else {
                let text = self.comp.interner.lookup(field_name).to_string();
                if self.comp.error_count() == 0 {
                    return self.error(node, format!("no member named '{text}'"));
                }
                return ConstValue::invalid();
            };
            return self.eval_decl_ref(tld, false, node);
        }

        // Member of a type: enum tag, container decl, or member function.
        if let Some(ty) = container.as_type() {
            crate::ir::container::ensure_zero_bits_known(self.comp, ty, self.import, node);
            if let TypeData::Enum(data) = &self.comp.types.get(ty).data {
                if let Some(tag) = data
                    .fields
                    .iter()
                    .position(|field| field.name == field_name)
                {
                    return ConstValue::of(
                        ty,
                        ConstData::Enum {
                            tag: tag as u32,
                            payload: None,
                        },
                    );
                }
            }
            if let Some(&container_scope) = self.comp.container_scopes.get(&ty) {
                if let Some(tld) = self.comp.find_visible_decl(container_scope, field_name, node)
                {
                    return self.eval_decl_ref(tld, false, node);
                }
            }
            let type_name = self.comp.types.name(ty).to_string();
            let text = self.comp.interner.lookup(field_name).to_string();
            return self.error(node, format!("type '{type_name}' has no member '{text}'"));
        }

        // Struct field through the pointer.
        let container_ty = container.ty;
        let field_index = {
            let entry = self.comp.types.get(container_ty);
            match &entry.data {
                TypeData::Struct(data) => data
                    .fields
                    .iter()
                    .position(|field| field.name == field_name),
                _ => None,
            }
        };
        let Some(field_index) = field_index else {
            let type_name = self.comp.types.name(container_ty).to_string();
            let text = self.comp.interner.lookup(field_name).to_string();
            return self.error(node, format!("no member named '{text}' in '{type_name}'"));
        };

        // Point into the underlying struct storage when we have it.
        if let Some(ConstData::Ptr {
            ptr: ConstPtr::Ref(slot),
            mutability,
        }) = ptr_value.as_static()
        {
            let field_ty = match &self.comp.types.get(container_ty).data {
                TypeData::Struct(data) => data.fields[field_index].ty,
                _ => TypeId::INVALID,
            };
            let ptr_ty = self
                .comp
                .types
                .ptr_type(field_ty, *mutability == PtrMut::ComptimeConst);
            return ConstValue::of(
                ptr_ty,
                ConstData::Ptr {
                    ptr: ConstPtr::BaseStruct {
                        struct_val: *slot,
                        field: field_index,
                    },
                    mutability: *mutability,
                },
            );
        }

        // Fallback: a temporary holding the field value.
        if let Some(ConstData::Struct(fields)) = container.as_static() {
            let field_value = fields[field_index].clone();
            let ty = field_value.ty;
            let slot = self.comp.values.alloc(field_value);
            let ptr_ty = self.comp.types.ptr_type(ty, true);
            return ConstValue::of(
                ptr_ty,
                ConstData::Ptr {
                    ptr: ConstPtr::Ref(slot),
                    mutability: PtrMut::ComptimeConst,
                },
            );
        }
        ConstValue::invalid()
    }

    fn eval_elem_ptr(
        &mut self,
        ptr_value: &ConstValue,
        index_value: &ConstValue,
        node: NodeId,
    ) -> ConstValue {
        let Some(index) = index_value.as_int().and_then(|v| v.to_usize()) else {
            return self.error(node, "expected comptime index");
        };

        // Pointer directly into an array value: extend the base-array form.
        if let Some(ConstData::Ptr { ptr, mutability }) = ptr_value.as_static() {
            match ptr {
                ConstPtr::BaseArray {
                    array,
                    elem_index,
                    is_cstr,
                } => {
                    let (array, base, is_cstr) = (*array, *elem_index, *is_cstr);
                    let len = match self.comp.values.get(array).as_static() {
                        Some(ConstData::Array(elems)) => elems.len(),
                        _ => 0,
                    };
                    if base + index >= len + usize::from(is_cstr) {
                        return self.error(node, "index out of bounds");
                    }
                    let elem_ty = match self.comp.values.get(array).as_static() {
                        Some(ConstData::Array(elems)) => {
                            elems.first().map_or(TypeId::INVALID, |elem| elem.ty)
                        }
                        _ => TypeId::INVALID,
                    };
                    let ptr_ty = self
                        .comp
                        .types
                        .ptr_type(elem_ty, *mutability == PtrMut::ComptimeConst);
                    return ConstValue::of(
                        ptr_ty,
                        ConstData::Ptr {
                            ptr: ConstPtr::BaseArray {
                                array,
                                elem_index: base + index,
                                is_cstr,
                            },
                            mutability: *mutability,
                        },
                    );
                }
                ConstPtr::Ref(slot) => {
                    let slot = *slot;
                    let pointee = self.comp.values.get(slot).clone();
                    match pointee.as_static() {
                        Some(ConstData::Array(elems)) => {
                            if index >= elems.len() {
                                return self.error(node, "index out of bounds");
                            }
                            let elem_ty = elems[index].ty;
                            let ptr_ty = self
                                .comp
                                .types
                                .ptr_type(elem_ty, *mutability == PtrMut::ComptimeConst);
                            return ConstValue::of(
                                ptr_ty,
                                ConstData::Ptr {
                                    ptr: ConstPtr::BaseArray {
                                        array: slot,
                                        elem_index: index,
                                        is_cstr: false,
                                    },
                                    mutability: *mutability,
                                },
                            );
                        }
                        Some(ConstData::Struct(fields))
                            if self.comp.types.get(pointee.ty).is_slice() =>
                        {
                            // Index through the slice's base pointer.
                            let base_ptr = fields[0].clone();
                            let index_value = ConstValue::int(
                                self.comp.types.usize_type(),
                                BigInt::from(index),
                            );
                            return self.eval_elem_ptr(&base_ptr, &index_value, node);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // Array rvalue: index the value itself.
        let array_value = self.load_through_ptr(ptr_value, node);
        match array_value.as_static() {
            Some(ConstData::Array(elems)) => {
                let Some(elem) = elems.get(index) else {
                    return self.error(node, "index out of bounds");
                };
                let elem = elem.clone();
                let ty = elem.ty;
                let slot = self.comp.values.alloc(elem);
                let ptr_ty = self.comp.types.ptr_type(ty, true);
                ConstValue::of(
                    ptr_ty,
                    ConstData::Ptr {
                        ptr: ConstPtr::Ref(slot),
                        mutability: PtrMut::ComptimeConst,
                    },
                )
            }
            _ => {
                if array_value.is_invalid() {
                    array_value
                } else {
                    self.error(node, "expected array value")
                }
            }
        }
    }

    fn eval_decl_ref(&mut self, tld: crate::tld::TldId, lval: bool, node: NodeId) -> ConstValue {
        self.comp.resolve_tld(tld);
        match self.comp.tld(tld).resolution {
            TldResolution::Invalid => return ConstValue::invalid(),
            TldResolution::Ok => {}
            _ => return ConstValue::invalid(),
        }
        match &self.comp.tld(tld).kind {
            TldKind::Var {
                value: Some(value),
                is_const,
                ..
            } => {
                let value = value.clone();
                let is_const = *is_const;
                if lval {
                    let ty = value.ty;
                    let slot = self.comp.values.alloc(value);
                    let ptr_ty = self.comp.types.ptr_type(ty, is_const);
                    return ConstValue::of(
                        ptr_ty,
                        ConstData::Ptr {
                            ptr: ConstPtr::Ref(slot),
                            mutability: if is_const {
                                PtrMut::ComptimeConst
                            } else {
                                PtrMut::RuntimeVar
                            },
                        },
                    );
                }
                if !is_const {
                    return self.error(
                        node,
                        "unable to evaluate constant expression: global variable",
                    );
                }
                value
            }
            TldKind::Fn { fn_id: Some(fn_id) } => {
                let fn_id = *fn_id;
                let fn_type = self.comp.fn_entry(fn_id).fn_type;
                ConstValue::of(
                    fn_type,
                    ConstData::Fn {
                        fn_id,
                        is_inline: false,
                    },
                )
            }
            _ => ConstValue::invalid(),
        }
    }

    fn eval_call(
        &mut self,
        callee: &ConstValue,
        args: Vec<ConstValue>,
        node: NodeId,
        scope: ScopeId,
    ) -> ConstValue {
        match callee.as_static() {
            Some(ConstData::Fn { fn_id, .. }) | Some(ConstData::BoundFn { fn_id, .. }) => {
                eval_fn_call(self.comp, *fn_id, args, self.import, node, scope)
            }
            // Calling a type is an explicit cast.
            Some(ConstData::Type(ty)) => {
                let ty = *ty;
                match args.as_slice() {
                    [value] => self.eval_explicit_cast(ty, value, node),
                    _ => self.error(node, "cast expects exactly one argument"),
                }
            }
            _ => {
                if callee.is_invalid() {
                    ConstValue::invalid()
                } else {
                    self.error(node, "unable to evaluate constant expression")
                }
            }
        }
    }

    fn eval_explicit_cast(
        &mut self,
        wanted: TypeId,
        value: &ConstValue,
        node: NodeId,
    ) -> ConstValue {
        let wanted_data = self.comp.types.get(wanted).data.clone();
        match (&wanted_data, value.as_static()) {
            // Int to int: explicit casts allow signedness changes but
            // still require the value to fit.
            (TypeData::Int(_), Some(ConstData::Int(int_value))) => {
                let (min, max) = int_bounds(self.comp, wanted).expect("sized int");
                if *int_value < min || *int_value > max {
                    let type_name = self.comp.types.name(wanted).to_string();
                    return self.error(
                        node,
                        format!(
                            "integer value {int_value} cannot be implicitly casted to type '{type_name}'"
                        ),
                    );
                }
                ConstValue::int(wanted, int_value.clone())
            }
            (TypeData::Int(_), Some(ConstData::Float(float_value))) => {
                let truncated = float_value.trunc();
                ConstValue::int(wanted, BigInt::from(truncated as i64))
            }
            (TypeData::Float { .. }, Some(ConstData::Int(int_value))) => {
                ConstValue::of(
                    wanted,
                    ConstData::Float(int_value.to_f64().unwrap_or(f64::INFINITY)),
                )
            }
            (TypeData::Int(_), Some(ConstData::Bool(flag))) => {
                ConstValue::int(wanted, BigInt::from(u8::from(*flag)))
            }
            _ => cast_const_value(self.comp, value, wanted, self.import, node),
        }
    }

    fn eval_init_list(
        &mut self,
        type_value: &ConstValue,
        items: Vec<ConstValue>,
        node: NodeId,
    ) -> ConstValue {
        let Some(ty) = type_value.as_type() else {
            if type_value.is_invalid() {
                return ConstValue::invalid();
            }
            return self.error(node, "expected type in initializer");
        };
        match self.comp.types.get(ty).data.clone() {
            TypeData::Array { child, len } => {
                if items.len() as u64 != len {
                    return self.error(
                        node,
                        format!("expected {len} array elements, found {}", items.len()),
                    );
                }
                let mut elems = Vec::with_capacity(items.len());
                for item in items {
                    let converted =
                        cast_const_value(self.comp, &item, child, self.import, node);
                    if converted.is_invalid() {
                        return converted;
                    }
                    elems.push(converted);
                }
                ConstValue::of(ty, ConstData::Array(elems))
            }
            TypeData::Struct(data) => {
                crate::ir::container::ensure_fields_resolved(self.comp, ty, self.import, node);
                let data = match &self.comp.types.get(ty).data {
                    TypeData::Struct(data) => data.clone(),
                    _ => data,
                };
                if items.len() != data.fields.len() {
                    return self.error(
                        node,
                        format!(
                            "expected {} fields, found {}",
                            data.fields.len(),
                            items.len()
                        ),
                    );
                }
                let mut fields = Vec::with_capacity(items.len());
                for (item, field) in items.into_iter().zip(data.fields.iter()) {
                    let converted =
                        cast_const_value(self.comp, &item, field.ty, self.import, node);
                    if converted.is_invalid() {
                        return converted;
                    }
                    fields.push(converted);
                }
                ConstValue::of(ty, ConstData::Struct(fields))
            }
            _ => {
                let name = self.comp.types.name(ty).to_string();
                self.error(node, format!("type '{name}' does not support initialization"))
            }
        }
    }

    fn eval_init_fields(
        &mut self,
        type_value: &ConstValue,
        inits: Vec<(Name, ConstValue)>,
        node: NodeId,
    ) -> ConstValue {
        let Some(ty) = type_value.as_type() else {
            if type_value.is_invalid() {
                return ConstValue::invalid();
            }
            return self.error(node, "expected type in initializer");
        };
        crate::ir::container::ensure_fields_resolved(self.comp, ty, self.import, node);
        let TypeData::Struct(data) = self.comp.types.get(ty).data.clone() else {
            let name = self.comp.types.name(ty).to_string();
            return self.error(node, format!("type '{name}' does not support field initialization"));
        };

        let mut fields: Vec<Option<ConstValue>> = vec![None; data.fields.len()];
        for (name, value) in inits {
            let Some(index) = data.fields.iter().position(|field| field.name == name) else {
                let text = self.comp.interner.lookup(name).to_string();
                let type_name = self.comp.types.name(ty).to_string();
                return self.error(node, format!("no member named '{text}' in '{type_name}'"));
            };
            if fields[index].is_some() {
                let text = self.comp.interner.lookup(name).to_string();
                return self.error(node, format!("duplicate field '{text}'"));
            }
            let converted =
                cast_const_value(self.comp, &value, data.fields[index].ty, self.import, node);
            if converted.is_invalid() {
                return converted;
            }
            fields[index] = Some(converted);
        }
        for (index, slot) in fields.iter().enumerate() {
            if slot.is_none() {
                let text = self
                    .comp
                    .interner
                    .lookup(data.fields[index].name)
                    .to_string();
                return self.error(node, format!("missing field: '{text}'"));
            }
        }
        ConstValue::of(
            ty,
            ConstData::Struct(fields.into_iter().map(Option::unwrap).collect()),
        )
    }

    fn eval_slice(
        &mut self,
        array_ptr: &ConstValue,
        start: &ConstValue,
        end: Option<&ConstValue>,
        is_const: bool,
        node: NodeId,
    ) -> ConstValue {
        let Some(start_index) = start.as_int().and_then(|v| v.to_usize()) else {
            return self.error(node, "expected comptime slice start");
        };
        let array_value = self.load_through_ptr(array_ptr, node);
        let Some(ConstData::Array(elems)) = array_value.as_static() else {
            if array_value.is_invalid() {
                return ConstValue::invalid();
            }
            return self.error(node, "slicing requires an array");
        };
        let len = elems.len();
        let end_index = match end {
            Some(end_value) => match end_value.as_int().and_then(|v| v.to_usize()) {
                Some(index) => index,
                None => return self.error(node, "expected comptime slice end"),
            },
            None => len,
        };
        if start_index > end_index || end_index > len {
            return self.error(node, "slice out of bounds");
        }

        let elem_ty = elems.first().map_or(TypeId::INVALID, |elem| elem.ty);
        let array_slot = self.comp.values.alloc(array_value.clone());
        let slice_ty = self.comp.types.slice_type(elem_ty, is_const);
        let ptr_ty = self.comp.types.ptr_type(elem_ty, is_const);
        let usize_ty = self.comp.types.usize_type();
        ConstValue::of(
            slice_ty,
            ConstData::Struct(vec![
                ConstValue::of(
                    ptr_ty,
                    ConstData::Ptr {
                        ptr: ConstPtr::BaseArray {
                            array: array_slot,
                            elem_index: start_index,
                            is_cstr: false,
                        },
                        mutability: if is_const {
                            PtrMut::ComptimeConst
                        } else {
                            PtrMut::ComptimeVar
                        },
                    },
                ),
                ConstValue::int(usize_ty, BigInt::from(end_index - start_index)),
            ]),
        )
    }

    fn eval_overflow_op(
        &mut self,
        op: OverflowOp,
        type_value: InstId,
        op1: InstId,
        op2: InstId,
        result_ptr: InstId,
        node: NodeId,
    ) -> ConstValue {
        let ty_value = self.value_of(type_value);
        let Some(ty) = ty_value.as_type() else {
            return self.error(node, "expected type expression");
        };
        let a_value = self.value_of(op1);
        let b_value = self.value_of(op2);
        let (Some(a), Some(b)) = (a_value.as_int(), b_value.as_int()) else {
            return self.error(node, "expected integer operands");
        };
        let raw = match op {
            OverflowOp::Add => a + b,
            OverflowOp::Sub => a - b,
            OverflowOp::Mul => a * b,
            OverflowOp::Shl => match b.to_u64() {
                Some(shift) => a << shift,
                None => return self.error(node, "shift amount is negative or too large"),
            },
        };
        let overflowed = match int_bounds(self.comp, ty) {
            Some((min, max)) => raw < min || raw > max,
            None => false,
        };
        let wrapped = wrap_to_type(self.comp, &raw, ty);
        let ptr_value = self.value_of(result_ptr);
        let stored = self.store_through_ptr(&ptr_value, ConstValue::int(ty, wrapped), node);
        if stored.is_invalid() {
            return stored;
        }
        ConstValue::bool_value(overflowed)
    }

    fn eval_memcpy(
        &mut self,
        dest: &ConstValue,
        src: &ConstValue,
        count: &ConstValue,
        node: NodeId,
    ) -> ConstValue {
        let Some(count) = count.as_int().and_then(|v| v.to_usize()) else {
            return self.error(node, "expected comptime count");
        };
        let usize_ty = self.comp.types.usize_type();
        for offset in 0..count {
            let index = ConstValue::int(usize_ty, BigInt::from(offset));
            let src_elem_ptr = self.eval_elem_ptr(src, &index, node);
            let value = self.load_through_ptr(&src_elem_ptr, node);
            if value.is_invalid() {
                return value;
            }
            let dest_elem_ptr = self.eval_elem_ptr(dest, &index, node);
            let stored = self.store_through_ptr(&dest_elem_ptr, value, node);
            if stored.is_invalid() {
                return stored;
            }
        }
        ConstValue::void()
    }

    fn eval_memset(
        &mut self,
        dest: &ConstValue,
        byte: &ConstValue,
        count: &ConstValue,
        node: NodeId,
    ) -> ConstValue {
        let Some(count) = count.as_int().and_then(|v| v.to_usize()) else {
            return self.error(node, "expected comptime count");
        };
        let usize_ty = self.comp.types.usize_type();
        for offset in 0..count {
            let index = ConstValue::int(usize_ty, BigInt::from(offset));
            let dest_elem_ptr = self.eval_elem_ptr(dest, &index, node);
            let stored = self.store_through_ptr(&dest_elem_ptr, byte.clone(), node);
            if stored.is_invalid() {
                return stored;
            }
        }
        ConstValue::void()
    }

    fn check_switch_prongs(
        &mut self,
        target: &ConstValue,
        items: &[ConstValue],
        ranges: &[(ConstValue, ConstValue)],
        has_else: bool,
        node: NodeId,
    ) -> ConstValue {
        if has_else {
            return ConstValue::void();
        }
        // Enums must cover every tag.
        if let TypeData::Enum(data) = self.comp.types.get(target.ty).data.clone() {
            for (tag, field) in data.fields.iter().enumerate() {
                let covered = items.iter().any(|item| {
                    matches!(
                        item.as_static(),
                        Some(ConstData::Enum { tag: item_tag, .. }) if *item_tag == tag as u32
                    )
                });
                if !covered {
                    let name = self.comp.interner.lookup(field.name).to_string();
                    return self.error(
                        node,
                        format!("enumeration value '{name}' not handled in switch"),
                    );
                }
            }
            return ConstValue::void();
        }
        // Integer targets need full range coverage to omit else; ranges
        // are honored, but open integer types can never be exhausted.
        if let Some((min, max)) = int_bounds(self.comp, target.ty) {
            let mut cursor = min.clone();
            'scan: while cursor <= max {
                for item in items {
                    if item.as_int() == Some(&cursor) {
                        cursor += 1;
                        continue 'scan;
                    }
                }
                for (start, end) in ranges {
                    if let (Some(start), Some(end)) = (start.as_int(), end.as_int()) {
                        if *start <= cursor && cursor <= *end {
                            cursor = end + 1;
                            continue 'scan;
                        }
                    }
                }
                return self.error(node, "switch must handle all possibilities");
            }
            return ConstValue::void();
        }
        ConstValue::void()
    }

    fn eval_set_global(
        &mut self,
        decl: InstId,
        value: InstId,
        node: NodeId,
        attr: GlobalAttr,
    ) -> ConstValue {
        // The decl operand must be a DeclRef in this frame.
        let InstKind::DeclRef { tld, .. } = self.exec.inst(decl).kind else {
            return self.error(node, "expected global declaration reference");
        };
        let attr_value = self.value_of(value);
        let global_id = match &self.comp.tld(tld).kind {
            TldKind::Var {
                global: Some(global),
                ..
            } => Some(*global),
            _ => None,
        };
        let fn_id = match &self.comp.tld(tld).kind {
            TldKind::Fn { fn_id } => *fn_id,
            _ => None,
        };
        match attr {
            GlobalAttr::Align => {
                let Some(align) = attr_value.as_int().and_then(|v| v.to_u32()) else {
                    return self.error(node, "expected comptime integer alignment");
                };
                if let Some(global) = global_id {
                    self.comp.globals[global.index()].alignment = Some(align);
                }
                if let Some(fn_id) = fn_id {
                    self.comp.fn_entry_mut(fn_id).alignment = Some(align);
                }
            }
            GlobalAttr::Section => {
                let Some(section) = const_value_to_string(self.comp, &attr_value) else {
                    return self.error(node, "expected section name string");
                };
                if let Some(global) = global_id {
                    self.comp.globals[global.index()].section = Some(section.clone());
                }
                if let Some(fn_id) = fn_id {
                    self.comp.fn_entry_mut(fn_id).section = Some(section);
                }
            }
            GlobalAttr::Linkage => {
                let Some(linkage) = attr_value.as_int().and_then(|v| v.to_u32()) else {
                    return self.error(node, "expected linkage value");
                };
                let linkage = match linkage {
                    0 => crate::fns::Linkage::Internal,
                    1 => crate::fns::Linkage::Strong,
                    2 => crate::fns::Linkage::Weak,
                    _ => crate::fns::Linkage::LinkOnce,
                };
                if let Some(fn_id) = fn_id {
                    self.comp.fn_entry_mut(fn_id).linkage = linkage;
                }
                if let Some(global) = global_id {
                    self.comp.globals[global.index()].is_export =
                        linkage != crate::fns::Linkage::Internal;
                }
            }
        }
        ConstValue::void()
    }
}

#[derive(Clone, Copy)]
enum GlobalAttr {
    Align,
    Section,
    Linkage,
}

/// Structural equality for switch dispatch at comptime.
fn static_values_equal(a: &ConstValue, b: &ConstValue) -> bool {
    match (a.as_static(), b.as_static()) {
        (Some(ConstData::Int(x)), Some(ConstData::Int(y))) => x == y,
        (Some(ConstData::Bool(x)), Some(ConstData::Bool(y))) => x == y,
        (
            Some(ConstData::Enum { tag: x, .. }),
            Some(ConstData::Enum { tag: y, .. }),
        ) => x == y,
        (Some(ConstData::PureError(x)), Some(ConstData::PureError(y))) => x == y,
        (Some(ConstData::Type(x)), Some(ConstData::Type(y))) => x == y,
        _ => false,
    }
}

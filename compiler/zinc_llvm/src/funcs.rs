//! Global, function, and body emission.

use inkwell::basic_block::BasicBlock;
use inkwell::module::Linkage as LlvmLinkage;
use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PhiValue, PointerValue};
use inkwell::{AddressSpace, IntPredicate};
use rustc_hash::FxHashMap;
use tracing::trace;

use zinc_sem::fns::Linkage;
use zinc_sem::ir::{CastOp, InstId, InstKind, IrBinOp, IrExec, IrUnOp, OverflowOp};
use zinc_sem::tld::TldKind;
use zinc_types::{ConstData, FnId, TypeData, TypeId};

use crate::safety::PanicMsgId;
use crate::Codegen;

impl<'ctx> Codegen<'ctx, '_> {
    pub(crate) fn declare_global(&mut self, index: u32) -> Result<(), String> {
        let global = &self.comp.globals[index as usize];
        let name = global.name.clone();
        let ty = global.ty;
        let is_extern = global.is_extern;
        let is_export = global.is_export;
        let is_const = global.is_const;
        let alignment = global.alignment;
        let section = global.section.clone();
        let init = global.init.clone();

        let lowered_ty = self.lower_type(ty);
        let llvm_global = self
            .module
            .add_global(lowered_ty, Some(AddressSpace::default()), &name);
        llvm_global.set_constant(is_const);
        if is_extern {
            llvm_global.set_linkage(LlvmLinkage::External);
        } else {
            llvm_global.set_linkage(if is_export {
                LlvmLinkage::External
            } else {
                LlvmLinkage::Internal
            });
            let lowered_init = self
                .lower_const(&init)
                .unwrap_or_else(|| lowered_ty.const_zero());
            llvm_global.set_initializer(&lowered_init);
        }
        if let Some(alignment) = alignment {
            llvm_global.set_alignment(alignment);
        }
        if let Some(section) = section {
            llvm_global.set_section(Some(&section));
        }
        self.global_map.insert(index, llvm_global);
        Ok(())
    }

    pub(crate) fn declare_fn(&mut self, fn_id: FnId) -> Result<(), String> {
        let fn_type = self.lower_fn_type(fn_id);
        let entry = self.comp.fn_entry(fn_id);
        let name = entry.symbol_name.clone();
        let linkage = match entry.linkage {
            Linkage::Internal if !entry.is_extern => Some(LlvmLinkage::Internal),
            Linkage::Weak => Some(LlvmLinkage::WeakAny),
            Linkage::LinkOnce => Some(LlvmLinkage::LinkOnceAny),
            _ => None,
        };
        // The user entry point gets a reserved symbol; a C-compatible
        // wrapper calls it (see emit_entry_point).
        let symbol = if Some(fn_id) == self.comp.main_fn {
            "zinc.main".to_string()
        } else {
            name
        };
        let function = self.module.add_function(&symbol, fn_type, linkage);
        let alignment = self.comp.fn_entry(fn_id).alignment;
        if let Some(alignment) = alignment {
            function
                .as_global_value()
                .set_alignment(alignment);
        }
        let section = self.comp.fn_entry(fn_id).section.clone();
        if let Some(section) = section {
            function.as_global_value().set_section(Some(&section));
        }
        self.fn_map.insert(fn_id, function);
        Ok(())
    }

    pub(crate) fn emit_fn_body(&mut self, fn_id: FnId) -> Result<(), String> {
        let function = *self
            .fn_map
            .get(&fn_id)
            .ok_or_else(|| "function not declared".to_string())?;
        let exec = self
            .comp
            .fn_entry_mut(fn_id)
            .analyzed
            .take()
            .ok_or_else(|| "missing analyzed IR".to_string())?;

        self.locals.clear();
        trace!(name = %self.comp.fn_entry(fn_id).symbol_name, "emitting body");

        // Pre-create LLVM blocks 1:1.
        let llvm_blocks: Vec<BasicBlock> = (0..exec.blocks.len())
            .map(|index| {
                self.context
                    .append_basic_block(function, &format!("bb{index}"))
            })
            .collect();

        // Bind runtime parameters to allocas in the entry block.
        self.builder.position_at_end(llvm_blocks[0]);
        let entry = self.comp.fn_entry(fn_id);
        let bound = entry.comptime_args.clone();
        let param_vars = entry.param_vars.clone();
        let params = entry.params.clone();
        let import = entry.import;
        let mut llvm_param_index = 0u32;
        for (index, (var, param)) in param_vars.iter().zip(params.iter()).enumerate() {
            let bound_here = bound
                .as_ref()
                .and_then(|bound| bound.get(index))
                .map(Option::is_some)
                .unwrap_or(false);
            if bound_here || self.comp.types.get(param.ty).zero_bits {
                continue;
            }
            let lowered = self.lower_type(param.ty);
            let slot = self
                .builder
                .build_alloca(lowered, "param")
                .map_err(|e| e.to_string())?;
            let incoming = function
                .get_nth_param(llvm_param_index)
                .ok_or_else(|| "parameter count mismatch".to_string())?;
            self.builder
                .build_store(slot, incoming)
                .map_err(|e| e.to_string())?;
            self.locals.insert(*var, slot);
            llvm_param_index += 1;
        }

        let mut values: FxHashMap<InstId, BasicValueEnum<'ctx>> = FxHashMap::default();
        let mut phi_fixups: Vec<(PhiValue<'ctx>, Vec<(usize, InstId)>)> = Vec::new();

        for (block_index, block) in exec.blocks.iter().enumerate() {
            self.builder.position_at_end(llvm_blocks[block_index]);
            for &inst_id in &block.insts {
                let inst = exec.inst(inst_id);
                if inst.ref_count == 0 && !inst.kind.has_side_effects() {
                    continue;
                }
                if let Some(dibuilder) = &self.dibuilder {
                    dibuilder.set_location(
                        &self.builder,
                        self.comp,
                        import,
                        inst.node,
                    );
                }
                if let Some(result) = self.emit_inst(
                    &exec,
                    inst_id,
                    function,
                    &llvm_blocks,
                    &mut values,
                    &mut phi_fixups,
                )? {
                    values.insert(inst_id, result);
                }
            }
            // Unterminated trailing blocks trap.
            if llvm_blocks[block_index].get_terminator().is_none() {
                self.builder
                    .build_unreachable()
                    .map_err(|e| e.to_string())?;
            }
        }

        // Wire phi incoming edges now that every block exists.
        for (phi, incoming) in phi_fixups {
            for (pred_index, value_inst) in incoming {
                if let Some(value) = values.get(&value_inst) {
                    phi.add_incoming(&[(value, llvm_blocks[pred_index])]);
                }
            }
        }

        self.comp.fn_entry_mut(fn_id).analyzed = Some(exec);
        Ok(())
    }

    fn operand(
        &mut self,
        exec: &IrExec,
        values: &FxHashMap<InstId, BasicValueEnum<'ctx>>,
        inst: InstId,
    ) -> Result<BasicValueEnum<'ctx>, String> {
        if let Some(&value) = values.get(&inst) {
            return Ok(value);
        }
        // Folded constants are materialized on use.
        let const_value = exec.inst(inst).value.clone();
        self.lower_const(&const_value)
            .ok_or_else(|| "operand has no runtime value".to_string())
    }

    fn emit_inst(
        &mut self,
        exec: &IrExec,
        inst_id: InstId,
        function: FunctionValue<'ctx>,
        llvm_blocks: &[BasicBlock<'ctx>],
        values: &mut FxHashMap<InstId, BasicValueEnum<'ctx>>,
        phi_fixups: &mut Vec<(PhiValue<'ctx>, Vec<(usize, InstId)>)>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, String> {
        let inst = exec.inst(inst_id);
        let result_ty = inst.value.ty;
        let err = |e: inkwell::builder::BuilderError| e.to_string();

        match &inst.kind {
            InstKind::Const => {
                let value = inst.value.clone();
                Ok(self.lower_const(&value))
            }

            InstKind::Br { dest, .. } => {
                self.builder
                    .build_unconditional_branch(llvm_blocks[dest.index()])
                    .map_err(err)?;
                Ok(None)
            }

            InstKind::CondBr {
                cond,
                then_block,
                else_block,
                ..
            } => {
                let cond_value = self.operand(exec, values, *cond)?.into_int_value();
                self.builder
                    .build_conditional_branch(
                        cond_value,
                        llvm_blocks[then_block.index()],
                        llvm_blocks[else_block.index()],
                    )
                    .map_err(err)?;
                Ok(None)
            }

            InstKind::SwitchBr {
                target,
                cases,
                else_block,
                ..
            } => {
                let target_value = self.operand(exec, values, *target)?.into_int_value();
                let mut llvm_cases = Vec::with_capacity(cases.len());
                for case in cases {
                    let case_value = self.operand(exec, values, case.value)?.into_int_value();
                    llvm_cases.push((case_value, llvm_blocks[case.block.index()]));
                }
                self.builder
                    .build_switch(target_value, llvm_blocks[else_block.index()], &llvm_cases)
                    .map_err(err)?;
                Ok(None)
            }

            InstKind::Phi {
                predecessors,
                values: incoming_values,
            } => {
                let lowered_ty = self.lower_type(result_ty);
                let phi = self.builder.build_phi(lowered_ty, "phi").map_err(err)?;
                let incoming: Vec<(usize, InstId)> = predecessors
                    .iter()
                    .zip(incoming_values.iter())
                    .map(|(pred, &value)| (pred.index(), value))
                    .collect();
                phi_fixups.push((phi, incoming));
                Ok(Some(phi.as_basic_value()))
            }

            InstKind::Return { value } => {
                match value {
                    Some(value_inst) => {
                        let return_ty = exec.inst(*value_inst).value.ty;
                        if self.comp.types.get(return_ty).zero_bits {
                            self.builder.build_return(None).map_err(err)?;
                        } else {
                            let lowered = self.operand(exec, values, *value_inst)?;
                            self.builder.build_return(Some(&lowered)).map_err(err)?;
                        }
                    }
                    None => {
                        self.builder.build_return(None).map_err(err)?;
                    }
                }
                Ok(None)
            }

            InstKind::Unreachable => {
                // Reaching unreachable is a safety-checked trap.
                self.emit_panic_call(PanicMsgId::Unreachable)?;
                Ok(None)
            }

            InstKind::DeclVar { var, init, .. } => {
                let var_ty = self.comp.var(*var).ty;
                if self.comp.types.get(var_ty).zero_bits {
                    return Ok(None);
                }
                let lowered_ty = self.lower_type(var_ty);
                let slot = self
                    .builder
                    .build_alloca(lowered_ty, "local")
                    .map_err(err)?;
                self.locals.insert(*var, slot);
                let init_value = self.operand(exec, values, *init)?;
                self.builder.build_store(slot, init_value).map_err(err)?;
                Ok(None)
            }

            InstKind::VarPtr { var } => {
                let slot = self
                    .locals
                    .get(var)
                    .copied()
                    .ok_or_else(|| "variable has no runtime slot".to_string())?;
                Ok(Some(slot.into()))
            }

            InstKind::LoadPtr { ptr } => {
                let ptr_value = self.operand(exec, values, *ptr)?.into_pointer_value();
                let lowered_ty = self.lower_type(result_ty);
                let loaded = self
                    .builder
                    .build_load(lowered_ty, ptr_value, "load")
                    .map_err(err)?;
                Ok(Some(loaded))
            }

            InstKind::StorePtr { ptr, value } => {
                let value_ty = exec.inst(*value).value.ty;
                if self.comp.types.get(value_ty).zero_bits {
                    return Ok(None);
                }
                let ptr_value = self.operand(exec, values, *ptr)?.into_pointer_value();
                let stored = self.operand(exec, values, *value)?;
                self.builder.build_store(ptr_value, stored).map_err(err)?;
                Ok(None)
            }

            InstKind::StructFieldPtr {
                struct_ptr,
                field_index,
            } => {
                let ptr_value = self.operand(exec, values, *struct_ptr)?.into_pointer_value();
                let pointee = self.pointee_of(exec, *struct_ptr);
                let lowered = self.lower_type(pointee);
                let gep = self
                    .builder
                    .build_struct_gep(lowered, ptr_value, *field_index as u32, "field")
                    .map_err(|_| "invalid field index".to_string())?;
                Ok(Some(gep.into()))
            }

            InstKind::ElemPtr {
                array_ptr,
                index,
                safety_check_on,
            } => {
                let ptr_value = self.operand(exec, values, *array_ptr)?.into_pointer_value();
                let index_value = self.operand(exec, values, *index)?.into_int_value();
                let pointee = self.pointee_of(exec, *array_ptr);
                match self.comp.types.get(pointee).data.clone() {
                    TypeData::Array { child, len } => {
                        if *safety_check_on {
                            let bound = self.context.i64_type().const_int(len, false);
                            let in_bounds = self
                                .builder
                                .build_int_compare(
                                    IntPredicate::ULT,
                                    index_value,
                                    bound,
                                    "bounds",
                                )
                                .map_err(err)?;
                            self.emit_safety_check(in_bounds, PanicMsgId::BoundsCheck, function)?;
                        }
                        let lowered = self.lower_type(pointee);
                        let zero = self.context.i64_type().const_zero();
                        let gep = unsafe {
                            self.builder
                                .build_gep(lowered, ptr_value, &[zero, index_value], "elem")
                                .map_err(err)?
                        };
                        let _ = child;
                        Ok(Some(gep.into()))
                    }
                    TypeData::Struct(data) if data.is_slice => {
                        // Load the base pointer, then index it.
                        let slice_ty = self.lower_type(pointee);
                        let base_ptr_ptr = self
                            .builder
                            .build_struct_gep(slice_ty, ptr_value, 0, "slice.ptr")
                            .map_err(|_| "slice layout".to_string())?;
                        let base_ptr = self
                            .builder
                            .build_load(
                                self.context.ptr_type(AddressSpace::default()),
                                base_ptr_ptr,
                                "base",
                            )
                            .map_err(err)?
                            .into_pointer_value();
                        if *safety_check_on {
                            let len_ptr = self
                                .builder
                                .build_struct_gep(slice_ty, ptr_value, 1, "slice.len")
                                .map_err(|_| "slice layout".to_string())?;
                            let len = self
                                .builder
                                .build_load(self.context.i64_type(), len_ptr, "len")
                                .map_err(err)?
                                .into_int_value();
                            let in_bounds = self
                                .builder
                                .build_int_compare(IntPredicate::ULT, index_value, len, "bounds")
                                .map_err(err)?;
                            self.emit_safety_check(in_bounds, PanicMsgId::BoundsCheck, function)?;
                        }
                        let elem_ty = self.ptr_child_lowered(result_ty);
                        let gep = unsafe {
                            self.builder
                                .build_gep(elem_ty, base_ptr, &[index_value], "elem")
                                .map_err(err)?
                        };
                        Ok(Some(gep.into()))
                    }
                    _ => Err("unsupported element pointer base".to_string()),
                }
            }

            InstKind::Call { fn_ref, args, .. } => {
                let callee = exec.inst(*fn_ref).value.clone();
                let Some(ConstData::Fn { fn_id, .. }) = callee.as_static() else {
                    return Err("indirect calls not yet lowered".to_string());
                };
                let function_value = *self
                    .fn_map
                    .get(fn_id)
                    .ok_or_else(|| "callee not declared".to_string())?;
                let mut lowered_args = Vec::with_capacity(args.len());
                for &arg in args {
                    lowered_args.push(self.operand(exec, values, arg)?.into());
                }
                let call = self
                    .builder
                    .build_call(function_value, &lowered_args, "call")
                    .map_err(err)?;
                Ok(call.try_as_basic_value().left())
            }

            InstKind::DeclRef { tld, lval } => {
                let TldKind::Var {
                    global: Some(global),
                    var_ty,
                    ..
                } = &self.comp.tld(*tld).kind
                else {
                    return Err("unresolved declaration reference".to_string());
                };
                let (global, var_ty) = (*global, *var_ty);
                let llvm_global = self
                    .global_map
                    .get(&global.0)
                    .copied()
                    .ok_or_else(|| "global not declared".to_string())?;
                if *lval {
                    Ok(Some(llvm_global.as_pointer_value().into()))
                } else {
                    let lowered_ty = self.lower_type(var_ty);
                    let loaded = self
                        .builder
                        .build_load(lowered_ty, llvm_global.as_pointer_value(), "gload")
                        .map_err(err)?;
                    Ok(Some(loaded))
                }
            }

            InstKind::BinOp {
                op,
                lhs,
                rhs,
                safety_check_on,
            } => {
                let lhs_value = self.operand(exec, values, *lhs)?;
                let rhs_value = self.operand(exec, values, *rhs)?;
                let operand_ty = exec.inst(*lhs).value.ty;
                self.emit_bin_op(
                    *op,
                    lhs_value,
                    rhs_value,
                    operand_ty,
                    *safety_check_on,
                    function,
                )
                .map(Some)
            }

            InstKind::UnOp { op, operand } => {
                let operand_value = self.operand(exec, values, *operand)?;
                match op {
                    IrUnOp::Negation | IrUnOp::NegationWrap => {
                        if operand_value.is_float_value() {
                            let negated = self
                                .builder
                                .build_float_neg(operand_value.into_float_value(), "fneg")
                                .map_err(err)?;
                            Ok(Some(negated.into()))
                        } else {
                            let negated = self
                                .builder
                                .build_int_neg(operand_value.into_int_value(), "neg")
                                .map_err(err)?;
                            Ok(Some(negated.into()))
                        }
                    }
                    IrUnOp::BinNot => {
                        let inverted = self
                            .builder
                            .build_not(operand_value.into_int_value(), "not")
                            .map_err(err)?;
                        Ok(Some(inverted.into()))
                    }
                    IrUnOp::Dereference => {
                        let lowered_ty = self.lower_type(result_ty);
                        let loaded = self
                            .builder
                            .build_load(
                                lowered_ty,
                                operand_value.into_pointer_value(),
                                "deref",
                            )
                            .map_err(err)?;
                        Ok(Some(loaded))
                    }
                    _ => Err("type-constructor operator reached emission".to_string()),
                }
            }

            InstKind::BoolNot { operand } => {
                let operand_value = self.operand(exec, values, *operand)?.into_int_value();
                let result = self.builder.build_not(operand_value, "boolnot").map_err(err)?;
                Ok(Some(result.into()))
            }

            InstKind::Cast { operand, cast_op } => {
                let operand_value = self.operand(exec, values, *operand)?;
                let operand_ty = exec.inst(*operand).value.ty;
                self.emit_cast(*cast_op, operand_value, operand_ty, result_ty)
                    .map(Some)
            }

            InstKind::Ref { value, .. } => {
                // Spill the value to a stack slot and hand out its address.
                let operand_value = self.operand(exec, values, *value)?;
                let slot = self
                    .builder
                    .build_alloca(operand_value.get_type(), "ref")
                    .map_err(err)?;
                self.builder.build_store(slot, operand_value).map_err(err)?;
                Ok(Some(slot.into()))
            }

            InstKind::TestNonNull { operand } => {
                let maybe = self.operand(exec, values, *operand)?.into_struct_value();
                let flag = self
                    .builder
                    .build_extract_value(maybe, 1, "non_null")
                    .map_err(err)?;
                Ok(Some(flag))
            }

            InstKind::TestErr { operand } => {
                let operand_value = self.operand(exec, values, *operand)?;
                let err_code = if operand_value.is_struct_value() {
                    self.builder
                        .build_extract_value(operand_value.into_struct_value(), 0, "err")
                        .map_err(err)?
                        .into_int_value()
                } else {
                    operand_value.into_int_value()
                };
                let zero = err_code.get_type().const_zero();
                let is_err = self
                    .builder
                    .build_int_compare(IntPredicate::NE, err_code, zero, "is_err")
                    .map_err(err)?;
                Ok(Some(is_err.into()))
            }

            InstKind::UnwrapMaybe {
                ptr,
                safety_check_on,
            } => {
                let ptr_value = self.operand(exec, values, *ptr)?.into_pointer_value();
                let pointee = self.pointee_of(exec, *ptr);
                let lowered = self.lower_type(pointee);
                if *safety_check_on {
                    let flag_ptr = self
                        .builder
                        .build_struct_gep(lowered, ptr_value, 1, "maybe.flag")
                        .map_err(|_| "nullable layout".to_string())?;
                    let flag = self
                        .builder
                        .build_load(self.context.bool_type(), flag_ptr, "non_null")
                        .map_err(err)?
                        .into_int_value();
                    self.emit_safety_check(flag, PanicMsgId::UnwrapNull, function)?;
                }
                let payload_ptr = self
                    .builder
                    .build_struct_gep(lowered, ptr_value, 0, "maybe.payload")
                    .map_err(|_| "nullable layout".to_string())?;
                Ok(Some(payload_ptr.into()))
            }

            InstKind::UnwrapErrCode { err_union_ptr } => {
                let ptr_value = self
                    .operand(exec, values, *err_union_ptr)?
                    .into_pointer_value();
                let pointee = self.pointee_of(exec, *err_union_ptr);
                let lowered = self.lower_type(pointee);
                let code = if lowered.is_struct_type() {
                    let code_ptr = self
                        .builder
                        .build_struct_gep(lowered, ptr_value, 0, "err.code")
                        .map_err(|_| "error union layout".to_string())?;
                    self.builder
                        .build_load(self.context.i64_type(), code_ptr, "code")
                        .map_err(err)?
                } else {
                    self.builder
                        .build_load(self.context.i64_type(), ptr_value, "code")
                        .map_err(err)?
                };
                Ok(Some(code))
            }

            InstKind::UnwrapErrPayload {
                err_union_ptr,
                safety_check_on,
            } => {
                let ptr_value = self
                    .operand(exec, values, *err_union_ptr)?
                    .into_pointer_value();
                let pointee = self.pointee_of(exec, *err_union_ptr);
                let lowered = self.lower_type(pointee);
                if *safety_check_on {
                    let code_ptr = if lowered.is_struct_type() {
                        self.builder
                            .build_struct_gep(lowered, ptr_value, 0, "err.code")
                            .map_err(|_| "error union layout".to_string())?
                    } else {
                        ptr_value
                    };
                    let code = self
                        .builder
                        .build_load(self.context.i64_type(), code_ptr, "code")
                        .map_err(err)?
                        .into_int_value();
                    let zero = code.get_type().const_zero();
                    let ok = self
                        .builder
                        .build_int_compare(IntPredicate::EQ, code, zero, "ok")
                        .map_err(err)?;
                    self.emit_safety_check(ok, PanicMsgId::UnwrapError, function)?;
                }
                if lowered.is_struct_type() {
                    let payload_ptr = self
                        .builder
                        .build_struct_gep(lowered, ptr_value, 1, "err.payload")
                        .map_err(|_| "error union layout".to_string())?;
                    Ok(Some(payload_ptr.into()))
                } else {
                    // Zero-bit payload; hand back the union pointer.
                    Ok(Some(ptr_value.into()))
                }
            }

            InstKind::MaybeWrap { operand } => {
                let payload = self.operand(exec, values, *operand)?;
                let lowered = self.lower_type(result_ty).into_struct_type();
                let mut agg = lowered.get_undef();
                agg = self
                    .builder
                    .build_insert_value(agg, payload, 0, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                let one = self.context.bool_type().const_int(1, false);
                agg = self
                    .builder
                    .build_insert_value(agg, one, 1, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                Ok(Some(agg.into()))
            }

            InstKind::ErrWrapPayload { operand } => {
                let payload = self.operand(exec, values, *operand)?;
                let lowered = self.lower_type(result_ty);
                if !lowered.is_struct_type() {
                    return Ok(Some(self.context.i64_type().const_zero().into()));
                }
                let mut agg = lowered.into_struct_type().get_undef();
                let zero = self.context.i64_type().const_zero();
                agg = self
                    .builder
                    .build_insert_value(agg, zero, 0, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                agg = self
                    .builder
                    .build_insert_value(agg, payload, 1, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                Ok(Some(agg.into()))
            }

            InstKind::ErrWrapCode { operand } => {
                let code = self.operand(exec, values, *operand)?;
                let lowered = self.lower_type(result_ty);
                if !lowered.is_struct_type() {
                    return Ok(Some(code));
                }
                let mut agg = lowered.into_struct_type().get_undef();
                agg = self
                    .builder
                    .build_insert_value(agg, code, 0, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                Ok(Some(agg.into()))
            }

            InstKind::OverflowOp {
                op,
                op1,
                op2,
                result_ptr,
                ..
            } => {
                let lhs = self.operand(exec, values, *op1)?.into_int_value();
                let rhs = self.operand(exec, values, *op2)?.into_int_value();
                let ptr = self.operand(exec, values, *result_ptr)?.into_pointer_value();
                let bits = lhs.get_type().get_bit_width();
                let signed = self.int_is_signed(exec.inst(*op1).value.ty);
                let intrinsic = self.overflow_intrinsic(*op, bits, signed);
                let call = self
                    .builder
                    .build_call(intrinsic, &[lhs.into(), rhs.into()], "overflow")
                    .map_err(err)?;
                let pair = call
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| "overflow intrinsic".to_string())?
                    .into_struct_value();
                let wrapped = self
                    .builder
                    .build_extract_value(pair, 0, "value")
                    .map_err(err)?;
                let overflowed = self
                    .builder
                    .build_extract_value(pair, 1, "bit")
                    .map_err(err)?;
                self.builder.build_store(ptr, wrapped).map_err(err)?;
                Ok(Some(overflowed))
            }

            InstKind::DivExact {
                op1,
                op2,
                safety_check_on,
            } => {
                let lhs = self.operand(exec, values, *op1)?.into_int_value();
                let rhs = self.operand(exec, values, *op2)?.into_int_value();
                let signed = self.int_is_signed(result_ty);
                if *safety_check_on {
                    let rem = if signed {
                        self.builder.build_int_signed_rem(lhs, rhs, "rem")
                    } else {
                        self.builder.build_int_unsigned_rem(lhs, rhs, "rem")
                    }
                    .map_err(err)?;
                    let zero = rem.get_type().const_zero();
                    let exact = self
                        .builder
                        .build_int_compare(IntPredicate::EQ, rem, zero, "exact")
                        .map_err(err)?;
                    self.emit_safety_check(exact, PanicMsgId::ExactDivisionRemainder, function)?;
                }
                let quotient = if signed {
                    self.builder.build_int_signed_div(lhs, rhs, "div")
                } else {
                    self.builder.build_int_unsigned_div(lhs, rhs, "div")
                }
                .map_err(err)?;
                Ok(Some(quotient.into()))
            }

            InstKind::Truncate { operand, .. } => {
                let operand_value = self.operand(exec, values, *operand)?.into_int_value();
                let dest = self.lower_type(result_ty).into_int_type();
                let truncated = self
                    .builder
                    .build_int_truncate(operand_value, dest, "trunc")
                    .map_err(err)?;
                Ok(Some(truncated.into()))
            }

            InstKind::Ctz { operand } | InstKind::Clz { operand } => {
                let is_ctz = matches!(inst.kind, InstKind::Ctz { .. });
                let operand_value = self.operand(exec, values, *operand)?.into_int_value();
                let bits = operand_value.get_type().get_bit_width();
                let intrinsic = self.bit_count_intrinsic(is_ctz, bits);
                let poison_ok = self.context.bool_type().const_zero();
                let call = self
                    .builder
                    .build_call(
                        intrinsic,
                        &[operand_value.into(), poison_ok.into()],
                        "count",
                    )
                    .map_err(err)?;
                Ok(call.try_as_basic_value().left())
            }

            InstKind::PtrToInt { operand } => {
                let operand_value = self.operand(exec, values, *operand)?.into_pointer_value();
                let result = self
                    .builder
                    .build_ptr_to_int(operand_value, self.context.i64_type(), "p2i")
                    .map_err(err)?;
                Ok(Some(result.into()))
            }

            InstKind::IntToPtr { operand, .. } => {
                let operand_value = self.operand(exec, values, *operand)?.into_int_value();
                let result = self
                    .builder
                    .build_int_to_ptr(
                        operand_value,
                        self.context.ptr_type(AddressSpace::default()),
                        "i2p",
                    )
                    .map_err(err)?;
                Ok(Some(result.into()))
            }

            InstKind::PtrCast { ptr, .. } => {
                // Opaque pointers: a pure type change.
                Ok(Some(self.operand(exec, values, *ptr)?))
            }

            InstKind::IntToEnum { operand, .. } => {
                let operand_value = self.operand(exec, values, *operand)?.into_int_value();
                let dest = self.lower_type(result_ty);
                if dest.is_int_type() {
                    let cast = self
                        .builder
                        .build_int_cast(operand_value, dest.into_int_type(), "i2e")
                        .map_err(err)?;
                    Ok(Some(cast.into()))
                } else {
                    Err("enum with payload cannot come from an integer".to_string())
                }
            }

            InstKind::IntToErr { operand } => {
                let operand_value = self.operand(exec, values, *operand)?.into_int_value();
                let max = self
                    .context
                    .i64_type()
                    .const_int(self.comp.error_values.len() as u64, false);
                let widened = self
                    .builder
                    .build_int_z_extend_or_bit_cast(operand_value, self.context.i64_type(), "err")
                    .map_err(err)?;
                // 0 and out-of-range codes trap.
                let nonzero = self
                    .builder
                    .build_int_compare(
                        IntPredicate::NE,
                        widened,
                        self.context.i64_type().const_zero(),
                        "nz",
                    )
                    .map_err(err)?;
                let in_range = self
                    .builder
                    .build_int_compare(IntPredicate::ULE, widened, max, "inrange")
                    .map_err(err)?;
                let ok = self.builder.build_and(nonzero, in_range, "ok").map_err(err)?;
                self.emit_safety_check(ok, PanicMsgId::InvalidErrorCode, function)?;
                Ok(Some(widened.into()))
            }

            InstKind::ErrToInt { operand } | InstKind::EnumTag { operand } => {
                Ok(Some(self.operand(exec, values, *operand)?))
            }

            InstKind::EnumTagName { operand } | InstKind::ErrName { operand } => {
                let tag = self.operand(exec, values, *operand)?.into_int_value();
                let table = self
                    .module
                    .get_global("zinc.err_name_table")
                    .ok_or_else(|| "error name table missing".to_string())?;
                let slice_ty = self.byte_slice_type();
                let entry_ptr = unsafe {
                    self.builder
                        .build_gep(
                            slice_ty.array_type(self.comp.error_values.len() as u32 + 1),
                            table.as_pointer_value(),
                            &[self.context.i64_type().const_zero(), tag],
                            "name",
                        )
                        .map_err(err)?
                };
                let loaded = self
                    .builder
                    .build_load(slice_ty, entry_ptr, "name")
                    .map_err(err)?;
                Ok(Some(loaded))
            }

            InstKind::ArrayLen { array } => {
                let ptr_value = self.operand(exec, values, *array)?.into_pointer_value();
                let pointee = self.pointee_of(exec, *array);
                let lowered = self.lower_type(pointee);
                let len_ptr = self
                    .builder
                    .build_struct_gep(lowered, ptr_value, 1, "len")
                    .map_err(|_| "slice layout".to_string())?;
                let len = self
                    .builder
                    .build_load(self.context.i64_type(), len_ptr, "len")
                    .map_err(err)?;
                Ok(Some(len))
            }

            InstKind::Slice {
                array,
                start,
                end,
                safety_check_on,
                ..
            } => {
                let ptr_value = self.operand(exec, values, *array)?.into_pointer_value();
                let start_value = self.operand(exec, values, *start)?.into_int_value();
                let pointee = self.pointee_of(exec, *array);
                let (base_ptr, total_len): (PointerValue, IntValue) =
                    match self.comp.types.get(pointee).data.clone() {
                        TypeData::Array { len, .. } => {
                            (ptr_value, self.context.i64_type().const_int(len, false))
                        }
                        TypeData::Struct(data) if data.is_slice => {
                            let lowered = self.lower_type(pointee);
                            let bp = self
                                .builder
                                .build_struct_gep(lowered, ptr_value, 0, "ptr")
                                .map_err(|_| "slice layout".to_string())?;
                            let base = self
                                .builder
                                .build_load(
                                    self.context.ptr_type(AddressSpace::default()),
                                    bp,
                                    "base",
                                )
                                .map_err(err)?
                                .into_pointer_value();
                            let lp = self
                                .builder
                                .build_struct_gep(lowered, ptr_value, 1, "len")
                                .map_err(|_| "slice layout".to_string())?;
                            let total = self
                                .builder
                                .build_load(self.context.i64_type(), lp, "len")
                                .map_err(err)?
                                .into_int_value();
                            (base, total)
                        }
                        _ => return Err("unsupported slice base".to_string()),
                    };
                let end_value = match end {
                    Some(end_inst) => self.operand(exec, values, *end_inst)?.into_int_value(),
                    None => total_len,
                };
                if *safety_check_on {
                    let le = self
                        .builder
                        .build_int_compare(IntPredicate::ULE, end_value, total_len, "slice.le")
                        .map_err(err)?;
                    self.emit_safety_check(le, PanicMsgId::BoundsCheck, function)?;
                }
                let elem_ty = match self.comp.types.get(result_ty).data.clone() {
                    TypeData::Struct(data) if data.is_slice => {
                        let ptr_ty = data.fields[0].ty;
                        match self.comp.types.get(ptr_ty).data {
                            TypeData::Pointer { child, .. } => self.lower_type(child),
                            _ => self.context.i8_type().into(),
                        }
                    }
                    _ => self.context.i8_type().into(),
                };
                let new_base = unsafe {
                    self.builder
                        .build_gep(elem_ty, base_ptr, &[start_value], "slice.base")
                        .map_err(err)?
                };
                let new_len = self
                    .builder
                    .build_int_sub(end_value, start_value, "slice.len")
                    .map_err(err)?;
                let slice_ty = self.byte_slice_type();
                let mut agg = slice_ty.get_undef();
                agg = self
                    .builder
                    .build_insert_value(agg, new_base, 0, "slice")
                    .map_err(err)?
                    .into_struct_value();
                agg = self
                    .builder
                    .build_insert_value(agg, new_len, 1, "slice")
                    .map_err(err)?
                    .into_struct_value();
                Ok(Some(agg.into()))
            }

            InstKind::Memcpy { dest, src, count } => {
                let dest_ptr = self.operand(exec, values, *dest)?.into_pointer_value();
                let src_ptr = self.operand(exec, values, *src)?.into_pointer_value();
                let count_value = self.operand(exec, values, *count)?.into_int_value();
                self.builder
                    .build_memcpy(dest_ptr, 1, src_ptr, 1, count_value)
                    .map_err(|message| message.to_string())?;
                Ok(None)
            }

            InstKind::Memset { dest, byte, count } => {
                let dest_ptr = self.operand(exec, values, *dest)?.into_pointer_value();
                let byte_value = self.operand(exec, values, *byte)?.into_int_value();
                let count_value = self.operand(exec, values, *count)?.into_int_value();
                self.builder
                    .build_memset(dest_ptr, 1, byte_value, count_value)
                    .map_err(|message| message.to_string())?;
                Ok(None)
            }

            InstKind::Cmpxchg {
                ptr,
                cmp_value,
                new_value,
                ..
            } => {
                let ptr_value = self.operand(exec, values, *ptr)?.into_pointer_value();
                let cmp = self.operand(exec, values, *cmp_value)?.into_int_value();
                let new = self.operand(exec, values, *new_value)?.into_int_value();
                let result = self
                    .builder
                    .build_cmpxchg(
                        ptr_value,
                        cmp,
                        new,
                        inkwell::AtomicOrdering::SequentiallyConsistent,
                        inkwell::AtomicOrdering::SequentiallyConsistent,
                    )
                    .map_err(|message| message.to_string())?;
                let success = self
                    .builder
                    .build_extract_value(result, 1, "swapped")
                    .map_err(err)?;
                Ok(Some(success))
            }

            InstKind::Fence { .. } => {
                self.builder
                    .build_fence(inkwell::AtomicOrdering::SequentiallyConsistent, 0, "fence")
                    .map_err(err)?;
                Ok(None)
            }

            InstKind::Breakpoint => {
                let intrinsic = self.module.get_function("llvm.debugtrap").unwrap_or_else(|| {
                    let fn_type = self.context.void_type().fn_type(&[], false);
                    self.module.add_function("llvm.debugtrap", fn_type, None)
                });
                self.builder.build_call(intrinsic, &[], "").map_err(err)?;
                Ok(None)
            }

            InstKind::ReturnAddress | InstKind::FrameAddress => {
                let name = if matches!(inst.kind, InstKind::ReturnAddress) {
                    "llvm.returnaddress"
                } else {
                    "llvm.frameaddress.p0"
                };
                let intrinsic = self.module.get_function(name).unwrap_or_else(|| {
                    let ptr = self.context.ptr_type(AddressSpace::default());
                    let fn_type = ptr.fn_type(&[self.context.i32_type().into()], false);
                    self.module.add_function(name, fn_type, None)
                });
                let zero = self.context.i32_type().const_zero();
                let call = self
                    .builder
                    .build_call(intrinsic, &[zero.into()], "addr")
                    .map_err(err)?;
                Ok(call.try_as_basic_value().left())
            }

            InstKind::Panic { message } => {
                let message_value = self.operand(exec, values, *message)?;
                self.emit_panic_with_value(message_value)?;
                Ok(None)
            }

            InstKind::Asm { asm_node, inputs, .. } => {
                self.emit_asm(exec, inst_id, *asm_node, inputs, values)
            }

            other => Err(format!(
                "instruction not lowered by backend: {other:?}"
            )),
        }
    }

    fn emit_bin_op(
        &mut self,
        op: IrBinOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        operand_ty: TypeId,
        safety_check_on: bool,
        function: FunctionValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, String> {
        let err = |e: inkwell::builder::BuilderError| e.to_string();
        if lhs.is_float_value() {
            let (a, b) = (lhs.into_float_value(), rhs.into_float_value());
            let result: BasicValueEnum = match op {
                IrBinOp::Add => self.builder.build_float_add(a, b, "fadd").map_err(err)?.into(),
                IrBinOp::Sub => self.builder.build_float_sub(a, b, "fsub").map_err(err)?.into(),
                IrBinOp::Mult => self.builder.build_float_mul(a, b, "fmul").map_err(err)?.into(),
                IrBinOp::Div => self.builder.build_float_div(a, b, "fdiv").map_err(err)?.into(),
                IrBinOp::Mod => self.builder.build_float_rem(a, b, "frem").map_err(err)?.into(),
                IrBinOp::CmpEq
                | IrBinOp::CmpNotEq
                | IrBinOp::CmpLessThan
                | IrBinOp::CmpGreaterThan
                | IrBinOp::CmpLessOrEq
                | IrBinOp::CmpGreaterOrEq => {
                    let predicate = match op {
                        IrBinOp::CmpEq => inkwell::FloatPredicate::OEQ,
                        IrBinOp::CmpNotEq => inkwell::FloatPredicate::ONE,
                        IrBinOp::CmpLessThan => inkwell::FloatPredicate::OLT,
                        IrBinOp::CmpGreaterThan => inkwell::FloatPredicate::OGT,
                        IrBinOp::CmpLessOrEq => inkwell::FloatPredicate::OLE,
                        _ => inkwell::FloatPredicate::OGE,
                    };
                    self.builder
                        .build_float_compare(predicate, a, b, "fcmp")
                        .map_err(err)?
                        .into()
                }
                _ => return Err("invalid float operation".to_string()),
            };
            return Ok(result);
        }

        let (a, b) = (lhs.into_int_value(), rhs.into_int_value());
        let signed = self.int_is_signed(operand_ty);
        let result: BasicValueEnum = match op {
            IrBinOp::Add | IrBinOp::Sub | IrBinOp::Mult => {
                if safety_check_on {
                    let overflow_op = match op {
                        IrBinOp::Add => OverflowOp::Add,
                        IrBinOp::Sub => OverflowOp::Sub,
                        _ => OverflowOp::Mul,
                    };
                    let bits = a.get_type().get_bit_width();
                    let intrinsic = self.overflow_intrinsic(overflow_op, bits, signed);
                    let call = self
                        .builder
                        .build_call(intrinsic, &[a.into(), b.into()], "checked")
                        .map_err(err)?;
                    let pair = call
                        .try_as_basic_value()
                        .left()
                        .ok_or("overflow intrinsic")?
                        .into_struct_value();
                    let overflowed = self
                        .builder
                        .build_extract_value(pair, 1, "bit")
                        .map_err(err)?
                        .into_int_value();
                    let ok = self.builder.build_not(overflowed, "ok").map_err(err)?;
                    self.emit_safety_check(ok, PanicMsgId::IntegerOverflow, function)?;
                    self.builder
                        .build_extract_value(pair, 0, "value")
                        .map_err(err)?
                } else {
                    match op {
                        IrBinOp::Add => self.builder.build_int_add(a, b, "add"),
                        IrBinOp::Sub => self.builder.build_int_sub(a, b, "sub"),
                        _ => self.builder.build_int_mul(a, b, "mul"),
                    }
                    .map_err(err)?
                    .into()
                }
            }
            IrBinOp::AddWrap => self.builder.build_int_add(a, b, "addw").map_err(err)?.into(),
            IrBinOp::SubWrap => self.builder.build_int_sub(a, b, "subw").map_err(err)?.into(),
            IrBinOp::MultWrap => self.builder.build_int_mul(a, b, "mulw").map_err(err)?.into(),
            IrBinOp::Div => {
                if safety_check_on {
                    let zero = b.get_type().const_zero();
                    let nonzero = self
                        .builder
                        .build_int_compare(IntPredicate::NE, b, zero, "nz")
                        .map_err(err)?;
                    self.emit_safety_check(nonzero, PanicMsgId::DivisionByZero, function)?;
                }
                if signed {
                    self.builder.build_int_signed_div(a, b, "div")
                } else {
                    self.builder.build_int_unsigned_div(a, b, "div")
                }
                .map_err(err)?
                .into()
            }
            IrBinOp::Mod => {
                if safety_check_on {
                    let zero = b.get_type().const_zero();
                    let nonzero = self
                        .builder
                        .build_int_compare(IntPredicate::NE, b, zero, "nz")
                        .map_err(err)?;
                    self.emit_safety_check(nonzero, PanicMsgId::RemainderByZero, function)?;
                }
                if signed {
                    self.builder.build_int_signed_rem(a, b, "rem")
                } else {
                    self.builder.build_int_unsigned_rem(a, b, "rem")
                }
                .map_err(err)?
                .into()
            }
            IrBinOp::BinAnd => self.builder.build_and(a, b, "and").map_err(err)?.into(),
            IrBinOp::BinOr => self.builder.build_or(a, b, "or").map_err(err)?.into(),
            IrBinOp::BinXor => self.builder.build_xor(a, b, "xor").map_err(err)?.into(),
            IrBinOp::BitShiftLeft | IrBinOp::BitShiftLeftWrap => self
                .builder
                .build_left_shift(a, b, "shl")
                .map_err(err)?
                .into(),
            IrBinOp::BitShiftRight => self
                .builder
                .build_right_shift(a, b, signed, "shr")
                .map_err(err)?
                .into(),
            IrBinOp::CmpEq
            | IrBinOp::CmpNotEq
            | IrBinOp::CmpLessThan
            | IrBinOp::CmpGreaterThan
            | IrBinOp::CmpLessOrEq
            | IrBinOp::CmpGreaterOrEq => {
                let predicate = match (op, signed) {
                    (IrBinOp::CmpEq, _) => IntPredicate::EQ,
                    (IrBinOp::CmpNotEq, _) => IntPredicate::NE,
                    (IrBinOp::CmpLessThan, true) => IntPredicate::SLT,
                    (IrBinOp::CmpLessThan, false) => IntPredicate::ULT,
                    (IrBinOp::CmpGreaterThan, true) => IntPredicate::SGT,
                    (IrBinOp::CmpGreaterThan, false) => IntPredicate::UGT,
                    (IrBinOp::CmpLessOrEq, true) => IntPredicate::SLE,
                    (IrBinOp::CmpLessOrEq, false) => IntPredicate::ULE,
                    (_, true) => IntPredicate::SGE,
                    (_, false) => IntPredicate::UGE,
                };
                self.builder
                    .build_int_compare(predicate, a, b, "cmp")
                    .map_err(err)?
                    .into()
            }
            IrBinOp::ArrayCat | IrBinOp::ArrayMult => {
                return Err("array operators are compile-time only".to_string());
            }
        };
        Ok(result)
    }

    fn emit_cast(
        &mut self,
        cast_op: CastOp,
        operand: BasicValueEnum<'ctx>,
        operand_ty: TypeId,
        result_ty: TypeId,
    ) -> Result<BasicValueEnum<'ctx>, String> {
        let err = |e: inkwell::builder::BuilderError| e.to_string();
        match cast_op {
            CastOp::Noop => Ok(operand),
            CastOp::WidenOrShorten => {
                let dest = self.lower_type(result_ty).into_int_type();
                let signed = self.int_is_signed(operand_ty);
                let source = operand.into_int_value();
                let result = if dest.get_bit_width() > source.get_type().get_bit_width() {
                    if signed {
                        self.builder.build_int_s_extend(source, dest, "sext")
                    } else {
                        self.builder.build_int_z_extend(source, dest, "zext")
                    }
                } else {
                    self.builder.build_int_truncate(source, dest, "trunc")
                }
                .map_err(err)?;
                Ok(result.into())
            }
            CastOp::IntToFloat => {
                let dest = self.lower_type(result_ty).into_float_type();
                let signed = self.int_is_signed(operand_ty);
                let source = operand.into_int_value();
                let result = if signed {
                    self.builder.build_signed_int_to_float(source, dest, "i2f")
                } else {
                    self.builder.build_unsigned_int_to_float(source, dest, "u2f")
                }
                .map_err(err)?;
                Ok(result.into())
            }
            CastOp::FloatToInt => {
                let dest = self.lower_type(result_ty).into_int_type();
                let signed = self.int_is_signed(result_ty);
                let source = operand.into_float_value();
                let result = if signed {
                    self.builder.build_float_to_signed_int(source, dest, "f2i")
                } else {
                    self.builder.build_float_to_unsigned_int(source, dest, "f2u")
                }
                .map_err(err)?;
                Ok(result.into())
            }
            CastOp::BoolToInt => {
                let dest = self.lower_type(result_ty).into_int_type();
                let result = self
                    .builder
                    .build_int_z_extend_or_bit_cast(operand.into_int_value(), dest, "b2i")
                    .map_err(err)?;
                Ok(result.into())
            }
            CastOp::ArrayToSlice => {
                // The analyzer folds static arrays; a runtime array value
                // must be spilled so the slice can point at it.
                let slot = self
                    .builder
                    .build_alloca(operand.get_type(), "arr")
                    .map_err(err)?;
                self.builder.build_store(slot, operand).map_err(err)?;
                let len = match self.comp.types.get(operand_ty).data {
                    TypeData::Array { len, .. } => len,
                    _ => 0,
                };
                let slice_ty = self.byte_slice_type();
                let mut agg = slice_ty.get_undef();
                agg = self
                    .builder
                    .build_insert_value(agg, slot, 0, "slice")
                    .map_err(err)?
                    .into_struct_value();
                let len_const = self.context.i64_type().const_int(len, false);
                agg = self
                    .builder
                    .build_insert_value(agg, len_const, 1, "slice")
                    .map_err(err)?
                    .into_struct_value();
                Ok(agg.into())
            }
            CastOp::MaybeWrap => {
                let lowered = self.lower_type(result_ty).into_struct_type();
                let mut agg = lowered.get_undef();
                agg = self
                    .builder
                    .build_insert_value(agg, operand, 0, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                let one = self.context.bool_type().const_int(1, false);
                agg = self
                    .builder
                    .build_insert_value(agg, one, 1, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                Ok(agg.into())
            }
            CastOp::ErrWrapPayload => {
                let lowered = self.lower_type(result_ty);
                if !lowered.is_struct_type() {
                    return Ok(self.context.i64_type().const_zero().into());
                }
                let mut agg = lowered.into_struct_type().get_undef();
                let zero = self.context.i64_type().const_zero();
                agg = self
                    .builder
                    .build_insert_value(agg, zero, 0, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                agg = self
                    .builder
                    .build_insert_value(agg, operand, 1, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                Ok(agg.into())
            }
            CastOp::ErrWrapCode => {
                let lowered = self.lower_type(result_ty);
                if !lowered.is_struct_type() {
                    return Ok(operand);
                }
                let mut agg = lowered.into_struct_type().get_undef();
                agg = self
                    .builder
                    .build_insert_value(agg, operand, 0, "wrap")
                    .map_err(err)?
                    .into_struct_value();
                Ok(agg.into())
            }
        }
    }

    fn emit_asm(
        &mut self,
        exec: &IrExec,
        inst_id: InstId,
        asm_node: zinc_ir::ast::NodeId,
        inputs: &[InstId],
        values: &FxHashMap<InstId, BasicValueEnum<'ctx>>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, String> {
        let inst = exec.inst(inst_id);
        let import = self.comp.scopes.get(inst.scope).import;
        let arena = &self.comp.import(import).arena;
        let zinc_ir::ast::NodeKind::Asm(asm) = arena.kind(asm_node).clone() else {
            return Err("asm node mismatch".to_string());
        };

        let template = String::from_utf8_lossy(&asm.template).into_owned();
        let mut constraints = Vec::new();
        for output in &asm.outputs {
            constraints.push(String::from_utf8_lossy(&output.constraint).into_owned());
        }
        for input in &asm.inputs {
            constraints.push(String::from_utf8_lossy(&input.constraint).into_owned());
        }
        for clobber in &asm.clobbers {
            constraints.push(format!("~{{{}}}", self.comp.interner.lookup(*clobber)));
        }
        let constraints = constraints.join(",");

        let mut arg_types = Vec::new();
        let mut args = Vec::new();
        for &input in inputs {
            let value = values
                .get(&input)
                .copied()
                .or_else(|| {
                    let const_value = exec.inst(input).value.clone();
                    self.lower_const(&const_value)
                })
                .ok_or_else(|| "asm input has no value".to_string())?;
            arg_types.push(value.get_type().into());
            args.push(value.into());
        }

        let result_ty = inst.value.ty;
        let fn_type = if self.comp.types.get(result_ty).zero_bits {
            self.context.void_type().fn_type(&arg_types, false)
        } else {
            self.lower_type(result_ty).fn_type(&arg_types, false)
        };
        let inline_asm = self.context.create_inline_asm(
            fn_type,
            template,
            constraints,
            asm.is_volatile,
            false,
            None,
            false,
        );
        let call = self
            .builder
            .build_indirect_call(fn_type, inline_asm, &args, "asm")
            .map_err(|e| e.to_string())?;
        Ok(call.try_as_basic_value().left())
    }

    fn pointee_of(&self, exec: &IrExec, ptr_inst: InstId) -> TypeId {
        match self.comp.types.get(exec.inst(ptr_inst).value.ty).data {
            TypeData::Pointer { child, .. } => child,
            _ => TypeId::INVALID,
        }
    }

    fn ptr_child_lowered(&mut self, ptr_ty: TypeId) -> inkwell::types::BasicTypeEnum<'ctx> {
        match self.comp.types.get(ptr_ty).data {
            TypeData::Pointer { child, .. } => self.lower_type(child),
            _ => self.context.i8_type().into(),
        }
    }

    fn int_is_signed(&self, ty: TypeId) -> bool {
        self.comp
            .types
            .get(ty)
            .int_info()
            .map(|info| info.signed)
            .unwrap_or(ty == TypeId::NUM_LIT_INT)
    }

    pub(crate) fn overflow_intrinsic(
        &mut self,
        op: OverflowOp,
        bits: u32,
        signed: bool,
    ) -> FunctionValue<'ctx> {
        if let Some(&cached) = self.overflow_intrinsics.get(&(op, bits)) {
            return cached;
        }
        let op_name = match (op, signed) {
            (OverflowOp::Add, true) => "sadd",
            (OverflowOp::Add, false) => "uadd",
            (OverflowOp::Sub, true) => "ssub",
            (OverflowOp::Sub, false) => "usub",
            (OverflowOp::Mul, true) => "smul",
            (OverflowOp::Mul, false) => "umul",
            // Shifts check the shift amount separately; reuse umul slot.
            (OverflowOp::Shl, _) => "umul",
        };
        let name = format!("llvm.{op_name}.with.overflow.i{bits}");
        let function = self.module.get_function(&name).unwrap_or_else(|| {
            let int_ty = self.context.custom_width_int_type(bits);
            let pair = self
                .context
                .struct_type(&[int_ty.into(), self.context.bool_type().into()], false);
            let fn_type = pair.fn_type(&[int_ty.into(), int_ty.into()], false);
            self.module.add_function(&name, fn_type, None)
        });
        self.overflow_intrinsics.insert((op, bits), function);
        function
    }

    pub(crate) fn bit_count_intrinsic(&mut self, is_ctz: bool, bits: u32) -> FunctionValue<'ctx> {
        if let Some(&cached) = self.bit_count_intrinsics.get(&(is_ctz, bits)) {
            return cached;
        }
        let name = format!(
            "llvm.{}.i{bits}",
            if is_ctz { "cttz" } else { "ctlz" }
        );
        let function = self.module.get_function(&name).unwrap_or_else(|| {
            let int_ty = self.context.custom_width_int_type(bits);
            let fn_type = int_ty.fn_type(
                &[int_ty.into(), self.context.bool_type().into()],
                false,
            );
            self.module.add_function(&name, fn_type, None)
        });
        self.bit_count_intrinsics.insert((is_ctz, bits), function);
        function
    }

    /// `@errName` support: a global table of byte slices indexed by error
    /// code (index 0 reserved).
    pub(crate) fn emit_error_name_table(&mut self) {
        let slice_ty = self.byte_slice_type();
        let mut entries = Vec::with_capacity(self.comp.error_values.len() + 1);
        entries.push(slice_ty.get_undef());
        let names: Vec<String> = self
            .comp
            .error_values
            .iter()
            .map(|error| self.comp.interner.lookup(error.name).to_string())
            .collect();
        for name in names {
            entries.push(self.const_byte_slice(&name).into_struct_value());
        }
        let table_ty = slice_ty.array_type(entries.len() as u32);
        let table = self
            .module
            .add_global(table_ty, Some(AddressSpace::default()), "zinc.err_name_table");
        table.set_initializer(&slice_ty.const_array(&entries));
        table.set_constant(true);
        table.set_linkage(LlvmLinkage::Internal);
    }

    /// Synthesize the image entry point.
    ///
    /// Executables get a C `main` that calls the user's entry function
    /// and converts its result to an exit code. Test builds run every
    /// collected test in declaration order.
    pub(crate) fn emit_entry_point(&mut self) -> Result<(), String> {
        let err = |e: inkwell::builder::BuilderError| e.to_string();
        if self.comp.options.is_test {
            let fn_type = self.context.i32_type().fn_type(&[], false);
            let main = self.module.add_function("main", fn_type, None);
            let entry = self.context.append_basic_block(main, "entry");
            self.builder.position_at_end(entry);
            let test_fns = self.comp.test_fns.clone();
            for test_fn in test_fns {
                if let Some(&function) = self.fn_map.get(&test_fn) {
                    self.builder.build_call(function, &[], "test").map_err(err)?;
                }
            }
            let zero = self.context.i32_type().const_zero();
            self.builder.build_return(Some(&zero)).map_err(err)?;
            return Ok(());
        }

        if self.comp.options.out_type != zinc_sem::OutType::Exe {
            return Ok(());
        }
        let Some(user_main) = self.comp.main_fn else {
            return Err("no 'main' function found for executable".to_string());
        };
        let Some(&user_main_fn) = self.fn_map.get(&user_main) else {
            return Err("entry point was not emitted".to_string());
        };

        let fn_type = self.context.i32_type().fn_type(&[], false);
        let main = self.module.add_function("main", fn_type, None);
        let entry = self.context.append_basic_block(main, "entry");
        self.builder.position_at_end(entry);
        let call = self.builder.build_call(user_main_fn, &[], "ret").map_err(err)?;
        let exit_code = match call.try_as_basic_value().left() {
            Some(value) if value.is_int_value() => {
                let int_value = value.into_int_value();
                self.builder
                    .build_int_cast(int_value, self.context.i32_type(), "code")
                    .map_err(err)?
            }
            // Error-union returns exit 1 on error, 0 otherwise; void
            // returns exit 0.
            Some(value) if value.is_struct_value() => {
                let code = self
                    .builder
                    .build_extract_value(value.into_struct_value(), 0, "err")
                    .map_err(err)?
                    .into_int_value();
                let zero = code.get_type().const_zero();
                let is_err = self
                    .builder
                    .build_int_compare(IntPredicate::NE, code, zero, "is_err")
                    .map_err(err)?;
                self.builder
                    .build_int_z_extend(is_err, self.context.i32_type(), "code")
                    .map_err(err)?
            }
            _ => self.context.i32_type().const_zero(),
        };
        self.builder.build_return(Some(&exit_code)).map_err(err)?;
        Ok(())
    }
}

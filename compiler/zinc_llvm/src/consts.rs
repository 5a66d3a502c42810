//! Constant value materialization.

use inkwell::values::{BasicValue, BasicValueEnum};
use inkwell::AddressSpace;
use num_traits::ToPrimitive;

use zinc_types::{ConstData, ConstPtr, ConstSpecial, ConstValue, TypeData, TypeId};

use crate::Codegen;

impl<'ctx> Codegen<'ctx, '_> {
    /// Lower a compile-time value to an LLVM constant.
    pub(crate) fn lower_const(&mut self, value: &ConstValue) -> Option<BasicValueEnum<'ctx>> {
        let lowered_ty = self.lower_type(value.ty);
        let data = match &value.special {
            ConstSpecial::Static(data) => data.clone(),
            ConstSpecial::Undef => {
                return Some(undef_of(lowered_ty));
            }
            ConstSpecial::Runtime(_) => return None,
        };

        match data {
            ConstData::Void => Some(self.context.struct_type(&[], false).get_undef().into()),
            ConstData::Bool(flag) => Some(
                self.context
                    .bool_type()
                    .const_int(u64::from(flag), false)
                    .into(),
            ),
            ConstData::Int(int_value) => {
                let int_ty = match lowered_ty {
                    inkwell::types::BasicTypeEnum::IntType(int_ty) => int_ty,
                    _ => self.context.i64_type(),
                };
                let raw = int_value
                    .to_i64()
                    .map(|v| v as u64)
                    .or_else(|| int_value.to_u64())
                    .unwrap_or(0);
                Some(int_ty.const_int(raw, int_value.sign() == num_bigint::Sign::Minus).into())
            }
            ConstData::Float(float_value) => {
                let float_ty = match lowered_ty {
                    inkwell::types::BasicTypeEnum::FloatType(float_ty) => float_ty,
                    _ => self.context.f64_type(),
                };
                Some(float_ty.const_float(float_value).into())
            }
            ConstData::Array(elems) => {
                let lowered: Option<Vec<BasicValueEnum>> =
                    elems.iter().map(|elem| self.lower_const(elem)).collect();
                let lowered = lowered?;
                let elem_ty = match &self.comp.types.get(value.ty).data {
                    TypeData::Array { child, .. } => self.lower_type(*child),
                    _ => return None,
                };
                Some(const_array(elem_ty, &lowered))
            }
            ConstData::Struct(fields) => {
                let field_tys = match &self.comp.types.get(value.ty).data {
                    TypeData::Struct(data) => data.fields.clone(),
                    _ => return None,
                };
                let mut lowered = Vec::new();
                for (field, meta) in fields.iter().zip(field_tys.iter()) {
                    if meta.gen_index.is_none() {
                        continue;
                    }
                    lowered.push(self.lower_const(field)?);
                }
                Some(self.context.const_struct(&lowered, false).into())
            }
            ConstData::Enum { tag, .. } => {
                let TypeData::Enum(enum_data) = self.comp.types.get(value.ty).data.clone() else {
                    return None;
                };
                let tag_ty = self
                    .context
                    .custom_width_int_type(enum_data.tag_bits.max(1));
                let tag_const = tag_ty.const_int(u64::from(tag), false);
                match self.lower_type(value.ty) {
                    inkwell::types::BasicTypeEnum::IntType(_) => Some(tag_const.into()),
                    inkwell::types::BasicTypeEnum::StructType(struct_ty) => {
                        let payload = struct_ty.get_field_type_at_index(1)?;
                        Some(
                            self.context
                                .const_struct(&[tag_const.into(), undef_of(payload)], false)
                                .into(),
                        )
                    }
                    _ => None,
                }
            }
            ConstData::Maybe(payload) => {
                let child = match self.comp.types.get(value.ty).data {
                    TypeData::Maybe { child } => child,
                    _ => return None,
                };
                let is_some = payload.is_some();
                let payload_value = match payload {
                    Some(payload) => self.lower_const(&payload)?,
                    None => undef_of(self.lower_type(child)),
                };
                let non_null = self
                    .context
                    .bool_type()
                    .const_int(u64::from(is_some), false);
                Some(
                    self.context
                        .const_struct(&[payload_value, non_null.into()], false)
                        .into(),
                )
            }
            ConstData::ErrUnion { err, payload } => {
                let payload_ty = match self.comp.types.get(value.ty).data {
                    TypeData::ErrorUnion { payload } => payload,
                    _ => return None,
                };
                let err_code = err
                    .map(|err| u64::from(self.comp.error_values[err.index()].value))
                    .unwrap_or(0);
                let err_const = self.context.i64_type().const_int(err_code, false);
                if self.comp.types.get(payload_ty).zero_bits {
                    return Some(err_const.into());
                }
                let payload_value = match payload {
                    Some(payload) => self.lower_const(&payload)?,
                    None => undef_of(self.lower_type(payload_ty)),
                };
                Some(
                    self.context
                        .const_struct(&[err_const.into(), payload_value], false)
                        .into(),
                )
            }
            ConstData::PureError(err) => {
                let code = u64::from(self.comp.error_values[err.index()].value);
                Some(self.context.i64_type().const_int(code, false).into())
            }
            ConstData::Fn { fn_id, .. } | ConstData::BoundFn { fn_id, .. } => {
                let function = self.fn_map.get(&fn_id)?;
                Some(function.as_global_value().as_pointer_value().into())
            }
            ConstData::Ptr { ptr, .. } => self.lower_const_ptr(&ptr),
            // Types, namespaces, blocks, and arg tuples are zero-bit.
            _ => Some(self.context.struct_type(&[], false).get_undef().into()),
        }
    }

    fn lower_const_ptr(&mut self, ptr: &ConstPtr) -> Option<BasicValueEnum<'ctx>> {
        match ptr {
            ConstPtr::HardCodedAddr(addr) => {
                // The literal address lands in the binary as requested.
                let int = self.context.i64_type().const_int(*addr, false);
                Some(
                    int.const_to_pointer(self.context.ptr_type(AddressSpace::default()))
                        .into(),
                )
            }
            ConstPtr::Ref(slot) | ConstPtr::BaseArray { array: slot, .. } => {
                // Materialize the pointee as an internal global.
                let pointee = self.comp.values.get(*slot).clone();
                let lowered = self.lower_const(&pointee)?;
                let global = self.module.add_global(
                    lowered.get_type(),
                    Some(AddressSpace::default()),
                    "anon.const",
                );
                global.set_initializer(&lowered);
                global.set_constant(true);
                global.set_linkage(inkwell::module::Linkage::Internal);
                if let ConstPtr::BaseArray { elem_index, .. } = ptr {
                    if *elem_index != 0 {
                        let index = self.context.i64_type().const_int(*elem_index as u64, false);
                        let zero = self.context.i64_type().const_zero();
                        let elem_ty = lowered.get_type();
                        let gep = unsafe {
                            global
                                .as_pointer_value()
                                .const_gep(elem_ty, &[zero, index])
                        };
                        return Some(gep.into());
                    }
                }
                Some(global.as_pointer_value().into())
            }
            ConstPtr::BaseStruct { struct_val, field } => {
                let pointee = self.comp.values.get(*struct_val).clone();
                let lowered = self.lower_const(&pointee)?;
                let global =
                    self.module
                        .add_global(lowered.get_type(), Some(AddressSpace::default()), "anon.const");
                global.set_initializer(&lowered);
                global.set_constant(true);
                global.set_linkage(inkwell::module::Linkage::Internal);
                let zero = self.context.i32_type().const_zero();
                let index = self.context.i32_type().const_int(*field as u64, false);
                let gep = unsafe {
                    global
                        .as_pointer_value()
                        .const_gep(lowered.get_type(), &[zero, index])
                };
                Some(gep.into())
            }
            ConstPtr::Discard => None,
        }
    }

    /// A `{ptr, len}` byte-slice constant for a message string.
    pub(crate) fn const_byte_slice(&mut self, text: &str) -> BasicValueEnum<'ctx> {
        let data = self.context.const_string(text.as_bytes(), false);
        let global = self
            .module
            .add_global(data.get_type(), Some(AddressSpace::default()), "str");
        global.set_initializer(&data);
        global.set_constant(true);
        global.set_linkage(inkwell::module::Linkage::Internal);
        let len = self.context.i64_type().const_int(text.len() as u64, false);
        self.context
            .const_struct(&[global.as_pointer_value().into(), len.into()], false)
            .into()
    }
}

fn undef_of(ty: inkwell::types::BasicTypeEnum<'_>) -> BasicValueEnum<'_> {
    match ty {
        inkwell::types::BasicTypeEnum::IntType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::FloatType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::PointerType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::StructType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::VectorType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::ScalableVectorType(t) => t.get_undef().into(),
    }
}

fn const_array<'ctx>(
    elem_ty: inkwell::types::BasicTypeEnum<'ctx>,
    values: &[BasicValueEnum<'ctx>],
) -> BasicValueEnum<'ctx> {
    match elem_ty {
        inkwell::types::BasicTypeEnum::IntType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_int_value()).collect();
            t.const_array(&elems).into()
        }
        inkwell::types::BasicTypeEnum::FloatType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_float_value()).collect();
            t.const_array(&elems).into()
        }
        inkwell::types::BasicTypeEnum::PointerType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_pointer_value()).collect();
            t.const_array(&elems).into()
        }
        inkwell::types::BasicTypeEnum::StructType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_struct_value()).collect();
            t.const_array(&elems).into()
        }
        inkwell::types::BasicTypeEnum::ArrayType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_array_value()).collect();
            t.const_array(&elems).into()
        }
        _ => elem_ty.into_struct_type().const_array(&[]).into(),
    }
}

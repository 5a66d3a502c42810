//! Type lowering.
//!
//! Composite types lower recursively, so the declaration order is
//! dependency order by construction; the cache guarantees each zinc type
//! maps to one LLVM type for the whole module.

use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::AddressSpace;

use zinc_types::{TypeData, TypeId};

use crate::Codegen;

impl<'ctx> Codegen<'ctx, '_> {
    pub(crate) fn lower_type(&mut self, ty: TypeId) -> BasicTypeEnum<'ctx> {
        if let Some(&cached) = self.type_cache.get(&ty) {
            return cached;
        }
        let lowered = self.lower_type_uncached(ty);
        self.type_cache.insert(ty, lowered);
        lowered
    }

    fn lower_type_uncached(&mut self, ty: TypeId) -> BasicTypeEnum<'ctx> {
        let data = self.comp.types.get(ty).data.clone();
        match data {
            TypeData::Bool => self.context.bool_type().into(),
            TypeData::Int(info) => self.context.custom_width_int_type(info.bits.max(1)).into(),
            TypeData::Float { bits } => match bits {
                32 => self.context.f32_type().into(),
                _ => self.context.f64_type().into(),
            },
            TypeData::Pointer { .. } | TypeData::Fn(_) | TypeData::BoundFn { .. } => {
                self.context.ptr_type(AddressSpace::default()).into()
            }
            // Bare errors are their integer code.
            TypeData::PureError => self.context.i64_type().into(),
            TypeData::Array { child, len } => {
                let elem = self.lower_type(child);
                elem.array_type(len as u32).into()
            }
            TypeData::Struct(data) => {
                let fields: Vec<BasicTypeEnum> = data
                    .fields
                    .iter()
                    .filter(|field| field.gen_index.is_some())
                    .map(|field| self.lower_type(field.ty))
                    .collect();
                self.context
                    .struct_type(&fields, data.layout == zinc_ir::ast::ContainerLayout::Packed)
                    .into()
            }
            TypeData::Union(data) => {
                // Biggest member as a byte blob; fields reinterpret.
                let size = data
                    .fields
                    .iter()
                    .map(|field| self.comp.types.get(field.ty).abi_size)
                    .max()
                    .unwrap_or(0);
                self.context
                    .i8_type()
                    .array_type(size.max(1) as u32)
                    .into()
            }
            TypeData::Enum(data) => {
                let tag = self.context.custom_width_int_type(data.tag_bits.max(1));
                let payload_size = data
                    .fields
                    .iter()
                    .map(|field| self.comp.types.get(field.payload_ty).abi_size)
                    .max()
                    .unwrap_or(0);
                if payload_size == 0 {
                    tag.into()
                } else {
                    let payload = self.context.i8_type().array_type(payload_size as u32);
                    self.context
                        .struct_type(&[tag.into(), payload.into()], false)
                        .into()
                }
            }
            TypeData::Maybe { child } => {
                // { T payload, i1 non_null }; pointers could use null but
                // a uniform layout keeps field indices stable.
                let payload = self.lower_type(child);
                self.context
                    .struct_type(&[payload, self.context.bool_type().into()], false)
                    .into()
            }
            TypeData::ErrorUnion { payload } => {
                let err = self.context.i64_type();
                if self.comp.types.get(payload).zero_bits {
                    err.into()
                } else {
                    let payload_ty = self.lower_type(payload);
                    self.context
                        .struct_type(&[err.into(), payload_ty], false)
                        .into()
                }
            }
            // Zero-bit and metadata types that still reach lowering get a
            // unit placeholder.
            _ => self.context.struct_type(&[], false).into(),
        }
    }

    /// The `[]const u8` slice type used for panic messages and
    /// `@errName` results: `{ ptr, usize len }`.
    pub(crate) fn byte_slice_type(&self) -> inkwell::types::StructType<'ctx> {
        self.context.struct_type(
            &[
                self.context.ptr_type(AddressSpace::default()).into(),
                self.context.i64_type().into(),
            ],
            false,
        )
    }

    pub(crate) fn lower_fn_type(
        &mut self,
        fn_id: zinc_types::FnId,
    ) -> inkwell::types::FunctionType<'ctx> {
        let entry = self.comp.fn_entry(fn_id);
        let return_type = entry.return_type;
        let is_var_args = match &self.comp.types.get(entry.fn_type).data {
            TypeData::Fn(key) => key.is_var_args,
            _ => false,
        };
        let bound = entry.comptime_args.clone();
        let param_tys: Vec<TypeId> = entry
            .params
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                bound
                    .as_ref()
                    .and_then(|bound| bound.get(*index))
                    .map_or(true, Option::is_none)
            })
            .map(|(_, param)| param.ty)
            .collect();

        let params: Vec<inkwell::types::BasicMetadataTypeEnum> = param_tys
            .iter()
            .filter(|&&ty| !self.comp.types.get(ty).zero_bits)
            .map(|&ty| self.lower_type(ty).into())
            .collect();

        if return_type == TypeId::NO_RETURN
            || self.comp.types.get(return_type).zero_bits
        {
            self.context.void_type().fn_type(&params, is_var_args)
        } else {
            self.lower_type(return_type).fn_type(&params, is_var_args)
        }
    }
}

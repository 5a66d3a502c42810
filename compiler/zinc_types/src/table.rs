//! The type table: canonical interning plus nominal container creation.
//!
//! Structural keys (ints, floats, pointers, arrays, nullables, error
//! unions, function types) map to a single entry each; constructing the
//! same key twice returns the same [`TypeId`]. The common single-step
//! wrappers — `&T`, `&const T`, `[]T`, `[]const T`, `?T`, `%T` — are
//! additionally cached on the child entry so hot derivations skip the
//! hash map entirely.

use rustc_hash::FxHashMap;
use zinc_ir::ast::{ContainerLayout, NodeId};
use zinc_ir::{Name, StringInterner};

use crate::ty::{
    ContainerResolution, EnumData, FnTypeKey, IntInfo, StructData, StructField, TypeData,
    TypeEntry, TypeId, UnionData,
};
use crate::ImportId;

#[derive(Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Int(IntInfo),
    Float(u32),
    Pointer {
        child: TypeId,
        is_const: bool,
        is_volatile: bool,
        bit_offset: u32,
        unaligned_bit_count: u32,
    },
    Array {
        child: TypeId,
        len: u64,
    },
    Maybe(TypeId),
    ErrorUnion(TypeId),
    Fn(FnTypeKey),
}

pub struct TypeTable {
    entries: Vec<TypeEntry>,
    interned: FxHashMap<TypeKey, TypeId>,
    primitives: FxHashMap<Name, TypeId>,
    usize_id: TypeId,
    isize_id: TypeId,
    ptr_bits: u32,
}

impl TypeTable {
    /// Build the table with every primitive pre-interned.
    ///
    /// `ptr_bits` is the target pointer width; it sizes `usize`/`isize`
    /// and the C compatibility integers.
    pub fn new(interner: &StringInterner, ptr_bits: u32) -> TypeTable {
        let mut table = TypeTable {
            entries: Vec::with_capacity(64),
            interned: FxHashMap::default(),
            primitives: FxHashMap::default(),
            usize_id: TypeId::INVALID,
            isize_id: TypeId::INVALID,
            ptr_bits,
        };

        // Fixed entries, in TypeId constant order.
        for (name, data, zero_bits) in [
            ("(invalid)", TypeData::Invalid, false),
            ("type", TypeData::MetaType, true),
            ("void", TypeData::Void, true),
            ("unreachable", TypeData::NoReturn, true),
            ("bool", TypeData::Bool, false),
            ("(integer literal)", TypeData::NumLitInt, true),
            ("(float literal)", TypeData::NumLitFloat, true),
            ("(undefined)", TypeData::UndefLit, true),
            ("(null)", TypeData::NullLit, true),
            ("var", TypeData::Var, true),
            ("error", TypeData::PureError, false),
            ("(block)", TypeData::Block, true),
            ("(args)", TypeData::ArgTuple, true),
        ] {
            let id = table.push(TypeEntry::new(name.to_string(), data, zero_bits));
            if !matches!(
                table.entries[id.index()].data,
                TypeData::Invalid
                    | TypeData::NumLitInt
                    | TypeData::NumLitFloat
                    | TypeData::UndefLit
                    | TypeData::NullLit
                    | TypeData::Block
                    | TypeData::ArgTuple
            ) {
                table.primitives.insert(interner.intern(name), id);
            }
        }
        debug_assert_eq!(table.entries.len(), TypeId::ARG_TUPLE.index() + 1);

        for (signed, bits) in [
            (true, 8),
            (false, 8),
            (true, 16),
            (false, 16),
            (true, 32),
            (false, 32),
            (true, 64),
            (false, 64),
        ] {
            let id = table.int_type(signed, bits);
            let name = table.entries[id.index()].name.clone();
            table.primitives.insert(interner.intern(&name), id);
        }

        // usize/isize are their own types, not aliases of uN/iN.
        table.usize_id = table.push(TypeEntry::new(
            "usize".to_string(),
            TypeData::Int(IntInfo {
                signed: false,
                bits: ptr_bits,
            }),
            false,
        ));
        table.isize_id = table.push(TypeEntry::new(
            "isize".to_string(),
            TypeData::Int(IntInfo {
                signed: true,
                bits: ptr_bits,
            }),
            false,
        ));
        let usize_id = table.usize_id;
        let isize_id = table.isize_id;
        table.primitives.insert(interner.intern("usize"), usize_id);
        table.primitives.insert(interner.intern("isize"), isize_id);

        for (name, bits) in [("f32", 32), ("f64", 64)] {
            let id = table.float_type(bits);
            table.primitives.insert(interner.intern(name), id);
        }

        // C compatibility integers: distinct named entries like usize.
        for (name, signed, bits) in [
            ("c_short", true, 16),
            ("c_ushort", false, 16),
            ("c_int", true, 32),
            ("c_uint", false, 32),
            ("c_long", true, 64),
            ("c_ulong", false, 64),
            ("c_longlong", true, 64),
            ("c_ulonglong", false, 64),
        ] {
            let id = table.push(TypeEntry::new(
                name.to_string(),
                TypeData::Int(IntInfo { signed, bits }),
                false,
            ));
            table.primitives.insert(interner.intern(name), id);
        }

        table
    }

    fn push(&mut self, entry: TypeEntry) -> TypeId {
        let id = TypeId(self.entries.len() as u32);
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeEntry {
        &self.entries[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeEntry {
        &mut self.entries[id.index()]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.entries[id.index()].name
    }

    pub fn ptr_bits(&self) -> u32 {
        self.ptr_bits
    }

    pub fn usize_type(&self) -> TypeId {
        self.usize_id
    }

    pub fn isize_type(&self) -> TypeId {
        self.isize_id
    }

    /// Look up a primitive by its source name (`u8`, `bool`, ...).
    pub fn primitive(&self, name: Name) -> Option<TypeId> {
        self.primitives.get(&name).copied()
    }

    fn intern(&mut self, key: TypeKey, build: impl FnOnce(&Self) -> TypeEntry) -> TypeId {
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let entry = build(self);
        let id = self.push(entry);
        self.interned.insert(key, id);
        id
    }

    pub fn int_type(&mut self, signed: bool, bits: u32) -> TypeId {
        let info = IntInfo { signed, bits };
        self.intern(TypeKey::Int(info), |_| {
            let prefix = if signed { 'i' } else { 'u' };
            TypeEntry::new(
                format!("{prefix}{bits}"),
                TypeData::Int(info),
                bits == 0,
            )
        })
    }

    pub fn float_type(&mut self, bits: u32) -> TypeId {
        self.intern(TypeKey::Float(bits), |_| {
            TypeEntry::new(format!("f{bits}"), TypeData::Float { bits }, false)
        })
    }

    /// Canonical pointer type. The plain mutable/const single-object
    /// pointers are cached on the child.
    pub fn ptr_type(&mut self, child: TypeId, is_const: bool) -> TypeId {
        if let Some(cached) = self.entries[child.index()].pointer_parent[is_const as usize] {
            return cached;
        }
        let id = self.ptr_type_extra(child, is_const, false, 0, 0);
        self.entries[child.index()].pointer_parent[is_const as usize] = Some(id);
        id
    }

    /// Pointer type with volatility and bit-level packing attributes.
    pub fn ptr_type_extra(
        &mut self,
        child: TypeId,
        is_const: bool,
        is_volatile: bool,
        bit_offset: u32,
        unaligned_bit_count: u32,
    ) -> TypeId {
        self.intern(
            TypeKey::Pointer {
                child,
                is_const,
                is_volatile,
                bit_offset,
                unaligned_bit_count,
            },
            |table| {
                let mut name = String::from("&");
                if is_const {
                    name.push_str("const ");
                }
                if is_volatile {
                    name.push_str("volatile ");
                }
                name.push_str(table.name(child));
                // A pointer to a zero-bit type is itself zero bits.
                let zero_bits = table.get(child).zero_bits;
                TypeEntry::new(
                    name,
                    TypeData::Pointer {
                        child,
                        is_const,
                        is_volatile,
                        bit_offset,
                        unaligned_bit_count,
                    },
                    zero_bits,
                )
            },
        )
    }

    pub fn array_type(&mut self, child: TypeId, len: u64) -> TypeId {
        self.intern(TypeKey::Array { child, len }, |table| {
            let zero_bits = len == 0 || table.get(child).zero_bits;
            TypeEntry::new(
                format!("[{len}]{}", table.name(child)),
                TypeData::Array { child, len },
                zero_bits,
            )
        })
    }

    /// Slice: a struct `{ ptr: &T, len: usize }` with the slice marker.
    pub fn slice_type(&mut self, child: TypeId, is_const: bool) -> TypeId {
        if let Some(cached) = self.entries[child.index()].slice_parent[is_const as usize] {
            return cached;
        }
        let ptr = self.ptr_type(child, is_const);
        let usize_id = self.usize_id;
        let name = if is_const {
            format!("[]const {}", self.name(child))
        } else {
            format!("[]{}", self.name(child))
        };
        let id = self.push(TypeEntry::new(
            name,
            TypeData::Struct(StructData {
                decl_node: None,
                import: ImportId(0),
                layout: ContainerLayout::Auto,
                fields: vec![
                    StructField {
                        name: Name::EMPTY,
                        ty: ptr,
                        gen_index: Some(0),
                    },
                    StructField {
                        name: Name::EMPTY,
                        ty: usize_id,
                        gen_index: Some(1),
                    },
                ],
                resolution: ContainerResolution::Complete,
                is_slice: true,
            }),
            false,
        ));
        self.entries[child.index()].slice_parent[is_const as usize] = Some(id);
        id
    }

    pub fn maybe_type(&mut self, child: TypeId) -> TypeId {
        if let Some(cached) = self.entries[child.index()].maybe_parent {
            return cached;
        }
        let id = self.intern(TypeKey::Maybe(child), |table| {
            TypeEntry::new(
                format!("?{}", table.name(child)),
                TypeData::Maybe { child },
                false,
            )
        });
        self.entries[child.index()].maybe_parent = Some(id);
        id
    }

    pub fn error_union_type(&mut self, payload: TypeId) -> TypeId {
        if let Some(cached) = self.entries[payload.index()].error_parent {
            return cached;
        }
        let id = self.intern(TypeKey::ErrorUnion(payload), |table| {
            TypeEntry::new(
                format!("%{}", table.name(payload)),
                TypeData::ErrorUnion { payload },
                false,
            )
        });
        self.entries[payload.index()].error_parent = Some(id);
        id
    }

    pub fn fn_type(&mut self, key: FnTypeKey) -> TypeId {
        self.intern(TypeKey::Fn(key.clone()), |table| {
            let mut name = String::from("fn(");
            for (i, param) in key.params.iter().enumerate() {
                if i > 0 {
                    name.push_str(", ");
                }
                if param.is_noalias {
                    name.push_str("noalias ");
                }
                name.push_str(table.name(param.ty));
            }
            if key.is_var_args {
                if !key.params.is_empty() {
                    name.push_str(", ");
                }
                name.push_str("...");
            }
            name.push(')');
            if key.return_ty != TypeId::VOID {
                name.push_str(" -> ");
                name.push_str(table.name(key.return_ty));
            }
            TypeEntry::new(name, TypeData::Fn(key), false)
        })
    }

    pub fn bound_fn_type(&mut self, fn_type: TypeId) -> TypeId {
        let name = format!("(bound {})", self.name(fn_type));
        self.push(TypeEntry::new(
            name,
            TypeData::BoundFn { fn_type },
            true,
        ))
    }

    /// Fresh nominal struct entry; fields are filled during resolution.
    pub fn new_struct(
        &mut self,
        name: String,
        decl_node: NodeId,
        import: ImportId,
        layout: ContainerLayout,
    ) -> TypeId {
        self.push(TypeEntry::new(
            name,
            TypeData::Struct(StructData {
                decl_node: Some(decl_node),
                import,
                layout,
                fields: Vec::new(),
                resolution: ContainerResolution::Unresolved,
                is_slice: false,
            }),
            false,
        ))
    }

    pub fn new_enum(
        &mut self,
        name: String,
        decl_node: NodeId,
        import: ImportId,
        layout: ContainerLayout,
    ) -> TypeId {
        self.push(TypeEntry::new(
            name,
            TypeData::Enum(EnumData {
                decl_node: Some(decl_node),
                import,
                layout,
                fields: Vec::new(),
                resolution: ContainerResolution::Unresolved,
                tag_bits: 0,
            }),
            false,
        ))
    }

    pub fn new_union(
        &mut self,
        name: String,
        decl_node: NodeId,
        import: ImportId,
        layout: ContainerLayout,
    ) -> TypeId {
        self.push(TypeEntry::new(
            name,
            TypeData::Union(UnionData {
                decl_node: Some(decl_node),
                import,
                layout,
                fields: Vec::new(),
                resolution: ContainerResolution::Unresolved,
            }),
            false,
        ))
    }

    pub fn namespace_type(&mut self, import: ImportId, name: String) -> TypeId {
        self.push(TypeEntry::new(name, TypeData::Namespace(import), true))
    }

    pub fn opaque_type(&mut self, name: Name, rendered: String) -> TypeId {
        self.push(TypeEntry::new(rendered, TypeData::Opaque { name }, false))
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::FnParam;

    fn table() -> (TypeTable, StringInterner) {
        let interner = StringInterner::new();
        let table = TypeTable::new(&interner, 64);
        (table, interner)
    }

    #[test]
    fn primitive_lookup() {
        let (table, interner) = table();
        let u8_ty = table.primitive(interner.intern("u8")).unwrap();
        assert_eq!(table.name(u8_ty), "u8");
        assert!(table.primitive(interner.intern("not_a_type")).is_none());
    }

    #[test]
    fn int_types_are_canonical() {
        let (mut table, _) = table();
        let a = table.int_type(false, 8);
        let b = table.int_type(false, 8);
        assert_eq!(a, b);
        assert_ne!(a, table.int_type(true, 8));
    }

    #[test]
    fn pointer_identity_across_paths() {
        let (mut table, _) = table();
        let u8_ty = table.int_type(false, 8);
        let a = table.ptr_type(u8_ty, true);
        let b = table.ptr_type(u8_ty, true);
        assert_eq!(a, b);
        assert_eq!(table.name(a), "&const u8");
        assert_ne!(a, table.ptr_type(u8_ty, false));
    }

    #[test]
    fn cached_derivations_round_trip() {
        let (mut table, _) = table();
        let u8_ty = table.int_type(false, 8);
        let maybe = table.maybe_type(u8_ty);
        assert_eq!(table.maybe_type(u8_ty), maybe);
        let err = table.error_union_type(u8_ty);
        assert_eq!(table.error_union_type(u8_ty), err);
        assert_eq!(table.name(err), "%u8");
    }

    #[test]
    fn slice_is_marked_struct() {
        let (mut table, _) = table();
        let u8_ty = table.int_type(false, 8);
        let slice = table.slice_type(u8_ty, true);
        assert_eq!(table.slice_type(u8_ty, true), slice);
        assert!(table.get(slice).is_slice());
        assert_eq!(table.name(slice), "[]const u8");
    }

    #[test]
    fn usize_is_distinct_from_u64() {
        let (mut table, _) = table();
        let u64_ty = table.int_type(false, 64);
        assert_ne!(table.usize_type(), u64_ty);
        assert_eq!(
            table.get(table.usize_type()).int_info().unwrap().bits,
            64
        );
    }

    #[test]
    fn fn_type_identity_folds_params_and_cc() {
        use zinc_ir::ast::CallingConv;
        let (mut table, _) = table();
        let i32_ty = table.int_type(true, 32);
        let key = FnTypeKey {
            params: vec![FnParam {
                is_noalias: false,
                ty: i32_ty,
            }],
            return_ty: i32_ty,
            cc: CallingConv::Unspecified,
            is_var_args: false,
            is_generic: false,
        };
        let a = table.fn_type(key.clone());
        let b = table.fn_type(key.clone());
        assert_eq!(a, b);
        let c = table.fn_type(FnTypeKey {
            cc: CallingConv::C,
            ..key
        });
        assert_ne!(a, c);
    }

    #[test]
    fn nominal_structs_are_unique() {
        let (mut table, _) = table();
        let node = zinc_ir::ast::NodeId::new(0);
        let a = table.new_struct("A".into(), node, ImportId(0), ContainerLayout::Auto);
        let b = table.new_struct("A".into(), node, ImportId(0), ContainerLayout::Auto);
        assert_ne!(a, b);
    }
}

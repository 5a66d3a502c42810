//! Type representation.
//!
//! Structural families (ints, floats, pointers, arrays, nullables, error
//! unions, function types) are interned by [`crate::TypeTable`];
//! containers are nominal and mutate in place as the analyzer resolves
//! them in two phases.

use zinc_ir::ast::{CallingConv, ContainerLayout, NodeId};
use zinc_ir::Name;

/// Canonical handle to a type table entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Poison: propagates through analysis without new diagnostics.
    pub const INVALID: TypeId = TypeId(0);
    pub const META_TYPE: TypeId = TypeId(1);
    pub const VOID: TypeId = TypeId(2);
    /// The `unreachable` type: no value, terminates control flow.
    pub const NO_RETURN: TypeId = TypeId(3);
    pub const BOOL: TypeId = TypeId(4);
    /// Untyped compile-time integer literal.
    pub const NUM_LIT_INT: TypeId = TypeId(5);
    /// Untyped compile-time float literal.
    pub const NUM_LIT_FLOAT: TypeId = TypeId(6);
    pub const UNDEF_LIT: TypeId = TypeId(7);
    pub const NULL_LIT: TypeId = TypeId(8);
    /// `var` in type position: inferred generic parameter.
    pub const VAR: TypeId = TypeId(9);
    /// The type of bare error values.
    pub const PURE_ERROR: TypeId = TypeId(10);
    /// Labeled-block handles in comptime values.
    pub const BLOCK: TypeId = TypeId(11);
    /// Packed variadic argument tuple.
    pub const ARG_TUPLE: TypeId = TypeId(12);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_invalid(self) -> bool {
        self == TypeId::INVALID
    }
}

impl std::fmt::Debug for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ty{}", self.0)
    }
}

/// Handle to a function table entry (table lives on the compilation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(pub u32);

impl FnId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an imported file (table lives on the compilation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImportId(pub u32);

impl ImportId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an entry of the global error value table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorId(pub u32);

impl ErrorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IntInfo {
    pub signed: bool,
    pub bits: u32,
}

/// Ordered parameter info folded into function type identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnParam {
    pub is_noalias: bool,
    pub ty: TypeId,
}

/// Structural identity of a function type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnTypeKey {
    pub params: Vec<FnParam>,
    pub return_ty: TypeId,
    pub cc: CallingConv,
    pub is_var_args: bool,
    /// At least one comptime or `type`/`var` parameter: instantiated per
    /// call-site argument tuple rather than emitted directly.
    pub is_generic: bool,
}

/// Two-phase container resolution state.
///
/// Phase one establishes whether the container has zero bits (detecting
/// infinite containment on the way); phase two computes field layout.
/// `Probing` states double as the structural cycle markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerResolution {
    Unresolved,
    ZeroBitsProbing,
    ZeroBitsKnown,
    LayoutProbing,
    Complete,
    Invalid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub name: Name,
    pub ty: TypeId,
    /// Index in the emitted layout; fields with zero-bit types get none.
    pub gen_index: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructData {
    pub decl_node: Option<NodeId>,
    pub import: ImportId,
    pub layout: ContainerLayout,
    pub fields: Vec<StructField>,
    pub resolution: ContainerResolution,
    /// Slices are structs `{ ptr, len }` distinguished by this marker.
    pub is_slice: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumField {
    pub name: Name,
    /// `void` for payload-free tags.
    pub payload_ty: TypeId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumData {
    pub decl_node: Option<NodeId>,
    pub import: ImportId,
    pub layout: ContainerLayout,
    pub fields: Vec<EnumField>,
    pub resolution: ContainerResolution,
    /// Bits of the tag integer once layout is known.
    pub tag_bits: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnionData {
    pub decl_node: Option<NodeId>,
    pub import: ImportId,
    pub layout: ContainerLayout,
    pub fields: Vec<StructField>,
    pub resolution: ContainerResolution,
}

/// Type payload, tagged by family.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeData {
    Invalid,
    MetaType,
    Void,
    NoReturn,
    Bool,
    NumLitInt,
    NumLitFloat,
    UndefLit,
    NullLit,
    /// Inferred generic parameter marker.
    Var,
    PureError,
    Int(IntInfo),
    Float {
        bits: u32,
    },
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
    Struct(StructData),
    Enum(EnumData),
    Union(UnionData),
    Fn(FnTypeKey),
    Maybe {
        child: TypeId,
    },
    ErrorUnion {
        payload: TypeId,
    },
    /// A loaded file as a compile-time module value.
    Namespace(ImportId),
    Block,
    BoundFn {
        fn_type: TypeId,
    },
    ArgTuple,
    Opaque {
        name: Name,
    },
}

/// One canonical type.
#[derive(Clone, Debug)]
pub struct TypeEntry {
    /// Rendered display name, e.g. `&const u8`.
    pub name: String,
    pub data: TypeData,
    /// Carries no bits at runtime (void, metatype, zero-length arrays,
    /// empty structs...). Parameters and fields of such types are elided.
    pub zero_bits: bool,
    pub abi_size: u64,
    pub abi_align: u32,
    // Cached derivations; short-circuit interner lookups for the common
    // wrappers. Index 0 = mutable, 1 = const.
    pub(crate) pointer_parent: [Option<TypeId>; 2],
    pub(crate) slice_parent: [Option<TypeId>; 2],
    pub(crate) maybe_parent: Option<TypeId>,
    pub(crate) error_parent: Option<TypeId>,
}

impl TypeEntry {
    pub(crate) fn new(name: String, data: TypeData, zero_bits: bool) -> TypeEntry {
        TypeEntry {
            name,
            data,
            zero_bits,
            abi_size: 0,
            abi_align: 0,
            pointer_parent: [None; 2],
            slice_parent: [None; 2],
            maybe_parent: None,
            error_parent: None,
        }
    }

    pub fn int_info(&self) -> Option<IntInfo> {
        match &self.data {
            TypeData::Int(info) => Some(*info),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.data,
            TypeData::Int(_) | TypeData::Float { .. } | TypeData::NumLitInt | TypeData::NumLitFloat
        )
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.data,
            TypeData::Struct(_) | TypeData::Enum(_) | TypeData::Union(_)
        )
    }

    pub fn is_slice(&self) -> bool {
        matches!(&self.data, TypeData::Struct(data) if data.is_slice)
    }
}

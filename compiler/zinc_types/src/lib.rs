//! Type and value arenas.
//!
//! Types are canonicalized by identity: the [`TypeTable`] interns every
//! structural type key so two independently constructed equal types share
//! one [`TypeId`]. Container types (struct/enum/union) are nominal; each
//! declaration mints a fresh entry whose field data is filled in by the
//! analyzer's two-phase resolution.
//!
//! Constant values ([`ConstValue`]) carry a type and a specialness:
//! `Static` holds concrete data, `Runtime` holds only hints, `Undef` is
//! explicit undefined. Values that need identity (variables, referents of
//! compile-time pointers) live in the [`ValueArena`]; compile-time
//! pointers address them by [`ValueId`].

mod generics;
mod table;
mod ty;
mod value;

pub use generics::{hash_const_value, GenericInstances, GenericKey};
pub use table::TypeTable;
pub use ty::{
    ContainerResolution, EnumData, EnumField, ErrorId, FnId, FnParam, FnTypeKey, ImportId,
    IntInfo, StructData, StructField, TypeData, TypeEntry, TypeId, UnionData,
};
pub use value::{
    ConstData, ConstPtr, ConstSpecial, ConstValue, PtrMut, RuntimeHint, ValueArena, ValueId,
};

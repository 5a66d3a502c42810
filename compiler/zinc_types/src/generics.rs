//! Generic instantiation identity.
//!
//! A generic function instantiation is keyed by the generic function plus
//! the canonicalized tuple of its compile-time argument values. Equal
//! tuples — structurally equal static values — share one concrete
//! instantiation.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;

use crate::value::{ConstData, ConstSpecial, ConstValue};
use crate::FnId;

/// Structural hash of a constant value.
///
/// Only comptime-known values participate in generic keys, so runtime
/// specials hash by their type alone. Floats hash by bit pattern.
pub fn hash_const_value(value: &ConstValue, state: &mut impl Hasher) {
    value.ty.hash(state);
    match &value.special {
        ConstSpecial::Runtime(_) => 0u8.hash(state),
        ConstSpecial::Undef => 1u8.hash(state),
        ConstSpecial::Static(data) => {
            2u8.hash(state);
            hash_const_data(data, state);
        }
    }
}

fn hash_const_data(data: &ConstData, state: &mut impl Hasher) {
    std::mem::discriminant(data).hash(state);
    match data {
        ConstData::Void => {}
        ConstData::Int(value) => value.hash(state),
        ConstData::Float(value) => value.to_bits().hash(state),
        ConstData::Bool(value) => value.hash(state),
        ConstData::Type(ty) => ty.hash(state),
        ConstData::Fn { fn_id, is_inline } | ConstData::BoundFn { fn_id, is_inline } => {
            fn_id.hash(state);
            is_inline.hash(state);
        }
        ConstData::Namespace(import) => import.hash(state),
        ConstData::Maybe(payload) => {
            if let Some(payload) = payload {
                hash_const_value(payload, state);
            }
        }
        ConstData::ErrUnion { err, payload } => {
            err.hash(state);
            if let Some(payload) = payload {
                hash_const_value(payload, state);
            }
        }
        ConstData::PureError(err) => err.hash(state),
        ConstData::Enum { tag, payload } => {
            tag.hash(state);
            if let Some(payload) = payload {
                hash_const_value(payload, state);
            }
        }
        ConstData::Struct(fields) => {
            for field in fields {
                hash_const_value(field, state);
            }
        }
        ConstData::Array(elems) => {
            for elem in elems {
                hash_const_value(elem, state);
            }
        }
        ConstData::Ptr { ptr, .. } => {
            // Pointer identity, not pointee contents.
            std::mem::discriminant(ptr).hash(state);
        }
        ConstData::ArgTuple { start, end } => {
            start.hash(state);
            end.hash(state);
        }
    }
}

/// Key: `{generic function, comptime argument tuple}`.
#[derive(Clone, Debug)]
pub struct GenericKey {
    pub fn_id: FnId,
    pub args: Vec<ConstValue>,
}

impl PartialEq for GenericKey {
    fn eq(&self, other: &Self) -> bool {
        self.fn_id == other.fn_id && self.args == other.args
    }
}

impl Eq for GenericKey {}

impl Hash for GenericKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fn_id.hash(state);
        for arg in &self.args {
            hash_const_value(arg, state);
        }
    }
}

/// Memo table from generic keys to instantiated concrete functions.
#[derive(Default)]
pub struct GenericInstances {
    table: FxHashMap<GenericKey, FnId>,
}

impl GenericInstances {
    pub fn new() -> GenericInstances {
        GenericInstances::default()
    }

    pub fn get(&self, key: &GenericKey) -> Option<FnId> {
        self.table.get(key).copied()
    }

    pub fn insert(&mut self, key: GenericKey, instance: FnId) {
        self.table.insert(key, instance);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeId;
    use num_bigint::BigInt;

    fn int_arg(value: i64) -> ConstValue {
        ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(value))
    }

    #[test]
    fn equal_tuples_hit_the_memo() {
        let mut instances = GenericInstances::new();
        let key = GenericKey {
            fn_id: FnId(3),
            args: vec![int_arg(7), ConstValue::type_value(TypeId::BOOL)],
        };
        instances.insert(key.clone(), FnId(9));
        let probe = GenericKey {
            fn_id: FnId(3),
            args: vec![int_arg(7), ConstValue::type_value(TypeId::BOOL)],
        };
        assert_eq!(instances.get(&probe), Some(FnId(9)));
    }

    #[test]
    fn different_args_miss() {
        let mut instances = GenericInstances::new();
        instances.insert(
            GenericKey {
                fn_id: FnId(3),
                args: vec![int_arg(7)],
            },
            FnId(9),
        );
        let probe = GenericKey {
            fn_id: FnId(3),
            args: vec![int_arg(8)],
        };
        assert_eq!(instances.get(&probe), None);
    }
}

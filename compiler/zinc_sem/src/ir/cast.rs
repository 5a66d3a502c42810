//! The implicit conversion lattice.
//!
//! A defined partial order decides when a value of type `T` may be used
//! where `U` is wanted: integer widenings of matching signedness,
//! untyped numeric literals into any numeric type they fit, pointer
//! mutability weakening, array-to-slice, payload into nullable or error
//! union, and bare errors into error unions. Success names the cast the
//! backend must emit; failure is reported by the caller with a typed
//! diagnostic.

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

use zinc_types::{ConstData, ConstValue, TypeData, TypeId};

use crate::ir::CastOp;
use crate::Compilation;

/// Inclusive representable range of an integer type.
pub fn int_bounds(comp: &Compilation, ty: TypeId) -> Option<(BigInt, BigInt)> {
    let info = comp.types.get(ty).int_info()?;
    let bits = info.bits;
    if bits == 0 {
        return Some((BigInt::zero(), BigInt::zero()));
    }
    if info.signed {
        let max = (BigInt::one() << (bits - 1)) - 1;
        let min = -(BigInt::one() << (bits - 1));
        Some((min, max))
    } else {
        let max = (BigInt::one() << bits) - 1;
        Some((BigInt::zero(), max))
    }
}

/// Wrap a value into an integer type's representable range.
pub fn wrap_to_type(comp: &Compilation, value: &BigInt, ty: TypeId) -> BigInt {
    let Some(info) = comp.types.get(ty).int_info() else {
        return value.clone();
    };
    let bits = info.bits;
    if bits == 0 {
        return BigInt::zero();
    }
    let modulus = BigInt::one() << bits;
    let mut wrapped = value % &modulus;
    if wrapped.is_negative() {
        wrapped += &modulus;
    }
    if info.signed && wrapped >= (BigInt::one() << (bits - 1)) {
        wrapped -= &modulus;
    }
    wrapped
}

/// Type-level implicit cast query, value-independent.
///
/// Returns the cast the backend should emit, or `None` when the lattice
/// has no edge. Untyped literal sources are value-dependent and handled
/// by [`cast_const_value`].
pub fn implicit_cast_op(comp: &mut Compilation, wanted: TypeId, actual: TypeId) -> Option<CastOp> {
    if wanted == actual {
        return Some(CastOp::Noop);
    }
    if wanted.is_invalid() || actual.is_invalid() {
        return Some(CastOp::Noop);
    }

    let wanted_data = comp.types.get(wanted).data.clone();
    let actual_data = comp.types.get(actual).data.clone();

    match (&wanted_data, &actual_data) {
        // Integer widening of matching signedness.
        (TypeData::Int(wanted_info), TypeData::Int(actual_info))
            if wanted_info.signed == actual_info.signed
                && wanted_info.bits >= actual_info.bits =>
        {
            Some(CastOp::WidenOrShorten)
        }
        // Float widening.
        (TypeData::Float { bits: wanted_bits }, TypeData::Float { bits: actual_bits })
            if wanted_bits >= actual_bits =>
        {
            Some(CastOp::WidenOrShorten)
        }
        // Pointer-to-mut weakens to pointer-to-const over the same child.
        (
            TypeData::Pointer {
                child: wanted_child,
                is_const: true,
                ..
            },
            TypeData::Pointer {
                child: actual_child,
                is_const: false,
                ..
            },
        ) if wanted_child == actual_child => Some(CastOp::Noop),
        // Explicit undefined fits anywhere.
        (_, TypeData::UndefLit) => Some(CastOp::Noop),
        // Null into a nullable.
        (TypeData::Maybe { .. }, TypeData::NullLit) => Some(CastOp::MaybeWrap),
        _ => {
            // Payload into nullable.
            if let TypeData::Maybe { child } = wanted_data {
                if implicit_cast_op(comp, child, actual).is_some() {
                    return Some(CastOp::MaybeWrap);
                }
            }
            // Payload or error into error union.
            if let TypeData::ErrorUnion { payload } = wanted_data {
                if actual == TypeId::PURE_ERROR {
                    return Some(CastOp::ErrWrapCode);
                }
                if implicit_cast_op(comp, payload, actual).is_some() {
                    return Some(CastOp::ErrWrapPayload);
                }
            }
            // Fixed-size array into matching slice.
            if comp.types.get(wanted).is_slice() {
                if let TypeData::Array { child, .. } = actual_data {
                    let slice_const = slice_elem_is_const(comp, wanted);
                    let slice_child = slice_elem_type(comp, wanted);
                    if slice_child == Some(child) && slice_const {
                        return Some(CastOp::ArrayToSlice);
                    }
                }
            }
            None
        }
    }
}

fn slice_elem_type(comp: &Compilation, slice: TypeId) -> Option<TypeId> {
    if let TypeData::Struct(data) = &comp.types.get(slice).data {
        if data.is_slice {
            if let TypeData::Pointer { child, .. } = comp.types.get(data.fields[0].ty).data {
                return Some(child);
            }
        }
    }
    None
}

fn slice_elem_is_const(comp: &Compilation, slice: TypeId) -> bool {
    if let TypeData::Struct(data) = &comp.types.get(slice).data {
        if data.is_slice {
            if let TypeData::Pointer { is_const, .. } = comp.types.get(data.fields[0].ty).data {
                return is_const;
            }
        }
    }
    false
}

/// Cast a compile-time value to a wanted type without reporting.
///
/// This is the value-aware half of the lattice: untyped integer and
/// float literals convert exactly when they fit. Failure carries the
/// diagnostic text so the caller decides whether the attempt was a real
/// conversion or just a probe (`@canImplicitCast` must not leak errors).
pub fn try_cast_const_value(
    comp: &mut Compilation,
    value: &ConstValue,
    wanted: TypeId,
) -> Result<ConstValue, String> {
    if value.is_invalid() || wanted.is_invalid() {
        return Ok(ConstValue::invalid());
    }
    if value.ty == wanted {
        return Ok(value.clone());
    }
    if matches!(value.special, zinc_types::ConstSpecial::Undef) {
        return Ok(ConstValue::undef(wanted));
    }

    let wanted_data = comp.types.get(wanted).data.clone();

    // Untyped integer literal into a concrete numeric type.
    if value.ty == TypeId::NUM_LIT_INT {
        if let Some(int_value) = value.as_int() {
            match &wanted_data {
                TypeData::Int(_) => {
                    let (min, max) = int_bounds(comp, wanted).expect("int type has bounds");
                    if *int_value < min || *int_value > max {
                        let type_name = comp.types.name(wanted).to_string();
                        return Err(format!(
                            "integer value {int_value} cannot be implicitly casted to type '{type_name}'"
                        ));
                    }
                    return Ok(ConstValue::int(wanted, int_value.clone()));
                }
                TypeData::Float { .. } => {
                    let as_float = int_value.to_f64().unwrap_or(f64::INFINITY);
                    return Ok(ConstValue::of(wanted, ConstData::Float(as_float)));
                }
                _ => {}
            }
        }
    }

    // Untyped float literal into a concrete float.
    if value.ty == TypeId::NUM_LIT_FLOAT {
        if let (Some(float_value), TypeData::Float { .. }) = (value.as_float(), &wanted_data) {
            return Ok(ConstValue::of(wanted, ConstData::Float(float_value)));
        }
    }

    // Null literal into a nullable.
    if value.ty == TypeId::NULL_LIT {
        if let TypeData::Maybe { .. } = wanted_data {
            return Ok(ConstValue::of(wanted, ConstData::Maybe(None)));
        }
    }

    match implicit_cast_op(comp, wanted, value.ty) {
        Some(CastOp::Noop) | Some(CastOp::WidenOrShorten) => {
            let mut out = value.clone();
            out.ty = wanted;
            Ok(out)
        }
        Some(CastOp::MaybeWrap) => {
            let child = match comp.types.get(wanted).data {
                TypeData::Maybe { child } => child,
                _ => return Ok(ConstValue::invalid()),
            };
            let payload = try_cast_const_value(comp, value, child)?;
            if payload.is_invalid() {
                return Ok(payload);
            }
            Ok(ConstValue::of(
                wanted,
                ConstData::Maybe(Some(Box::new(payload))),
            ))
        }
        Some(CastOp::ErrWrapCode) => {
            let err = match value.as_static() {
                Some(ConstData::PureError(err)) => *err,
                _ => return Ok(ConstValue::invalid()),
            };
            Ok(ConstValue::of(
                wanted,
                ConstData::ErrUnion {
                    err: Some(err),
                    payload: None,
                },
            ))
        }
        Some(CastOp::ErrWrapPayload) => {
            let payload_ty = match comp.types.get(wanted).data {
                TypeData::ErrorUnion { payload } => payload,
                _ => return Ok(ConstValue::invalid()),
            };
            let payload = try_cast_const_value(comp, value, payload_ty)?;
            if payload.is_invalid() {
                return Ok(payload);
            }
            Ok(ConstValue::of(
                wanted,
                ConstData::ErrUnion {
                    err: None,
                    payload: Some(Box::new(payload)),
                },
            ))
        }
        Some(CastOp::ArrayToSlice) => {
            // The slice points into an arena copy of the array value.
            let array_id = comp.values.alloc(value.clone());
            let len = match &comp.types.get(value.ty).data {
                TypeData::Array { len, .. } => *len,
                _ => 0,
            };
            let usize_ty = comp.types.usize_type();
            let ptr_ty = match &comp.types.get(wanted).data {
                TypeData::Struct(data) if data.is_slice => data.fields[0].ty,
                _ => return Ok(ConstValue::invalid()),
            };
            Ok(ConstValue::of(
                wanted,
                ConstData::Struct(vec![
                    ConstValue::of(
                        ptr_ty,
                        ConstData::Ptr {
                            ptr: zinc_types::ConstPtr::BaseArray {
                                array: array_id,
                                elem_index: 0,
                                is_cstr: false,
                            },
                            mutability: zinc_types::PtrMut::ComptimeConst,
                        },
                    ),
                    ConstValue::int(usize_ty, BigInt::from(len)),
                ]),
            ))
        }
        Some(CastOp::IntToFloat)
        | Some(CastOp::FloatToInt)
        | Some(CastOp::BoolToInt)
        | None => {
            let wanted_name = comp.types.name(wanted).to_string();
            let actual_name = comp.types.name(value.ty).to_string();
            Err(format!(
                "expected type '{wanted_name}', found '{actual_name}'"
            ))
        }
    }
}

/// Cast a compile-time value to a wanted type, reporting a diagnostic on
/// failure.
pub fn cast_const_value(
    comp: &mut Compilation,
    value: &ConstValue,
    wanted: TypeId,
    import: zinc_types::ImportId,
    node: zinc_ir::ast::NodeId,
) -> ConstValue {
    match try_cast_const_value(comp, value, wanted) {
        Ok(converted) => converted,
        Err(message) => comp.add_node_error(import, node, message),
    }
}

/// The peer type of two operands of a binary operator.
///
/// Untyped literals defer to the concrete side; otherwise one operand
/// must implicitly cast to the other.
pub fn peer_type(comp: &mut Compilation, a: TypeId, b: TypeId) -> Option<TypeId> {
    if a == b {
        return Some(a);
    }
    if a.is_invalid() || b.is_invalid() {
        return Some(TypeId::INVALID);
    }
    let a_lit = matches!(a, TypeId::NUM_LIT_INT | TypeId::NUM_LIT_FLOAT | TypeId::UNDEF_LIT);
    let b_lit = matches!(b, TypeId::NUM_LIT_INT | TypeId::NUM_LIT_FLOAT | TypeId::UNDEF_LIT);
    match (a_lit, b_lit) {
        (true, false) => Some(b),
        (false, true) => Some(a),
        (true, true) => {
            // Two literals: floats dominate ints.
            if a == TypeId::NUM_LIT_FLOAT || b == TypeId::NUM_LIT_FLOAT {
                Some(TypeId::NUM_LIT_FLOAT)
            } else {
                Some(TypeId::NUM_LIT_INT)
            }
        }
        (false, false) => {
            if implicit_cast_op(comp, a, b).is_some() {
                Some(a)
            } else if implicit_cast_op(comp, b, a).is_some() {
                Some(b)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompileOptions, Compilation, SourceLoader};

    struct NoLoader;
    impl SourceLoader for NoLoader {
        fn load(&mut self, _from: &str, _name: &str) -> Result<(String, String), String> {
            Err("no loader".into())
        }
    }

    fn comp() -> Compilation {
        Compilation::new(CompileOptions::default(), Box::new(NoLoader))
    }

    #[test]
    fn widening_same_signedness() {
        let mut comp = comp();
        let u8_ty = comp.types.int_type(false, 8);
        let u16_ty = comp.types.int_type(false, 16);
        assert_eq!(
            implicit_cast_op(&mut comp, u16_ty, u8_ty),
            Some(CastOp::WidenOrShorten)
        );
        assert_eq!(implicit_cast_op(&mut comp, u8_ty, u16_ty), None);
        let i16_ty = comp.types.int_type(true, 16);
        assert_eq!(implicit_cast_op(&mut comp, i16_ty, u8_ty), None);
    }

    #[test]
    fn mut_ptr_weakens_to_const() {
        let mut comp = comp();
        let u8_ty = comp.types.int_type(false, 8);
        let mut_ptr = comp.types.ptr_type(u8_ty, false);
        let const_ptr = comp.types.ptr_type(u8_ty, true);
        assert_eq!(
            implicit_cast_op(&mut comp, const_ptr, mut_ptr),
            Some(CastOp::Noop)
        );
        assert_eq!(implicit_cast_op(&mut comp, mut_ptr, const_ptr), None);
    }

    #[test]
    fn array_to_const_slice() {
        let mut comp = comp();
        let u8_ty = comp.types.int_type(false, 8);
        let array = comp.types.array_type(u8_ty, 5);
        let slice = comp.types.slice_type(u8_ty, true);
        assert_eq!(
            implicit_cast_op(&mut comp, slice, array),
            Some(CastOp::ArrayToSlice)
        );
    }

    #[test]
    fn payload_wraps_into_nullable_and_error_union() {
        let mut comp = comp();
        let u8_ty = comp.types.int_type(false, 8);
        let maybe = comp.types.maybe_type(u8_ty);
        let err_union = comp.types.error_union_type(u8_ty);
        assert_eq!(
            implicit_cast_op(&mut comp, maybe, u8_ty),
            Some(CastOp::MaybeWrap)
        );
        assert_eq!(
            implicit_cast_op(&mut comp, err_union, u8_ty),
            Some(CastOp::ErrWrapPayload)
        );
        assert_eq!(
            implicit_cast_op(&mut comp, err_union, TypeId::PURE_ERROR),
            Some(CastOp::ErrWrapCode)
        );
    }

    #[test]
    fn literal_fit_is_value_dependent() {
        let mut comp = comp();
        let u8_ty = comp.types.int_type(false, 8);
        let import = comp.test_import();
        let node = zinc_ir::ast::NodeId::new(0);

        let fits = ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(255));
        let casted = cast_const_value(&mut comp, &fits, u8_ty, import, node);
        assert_eq!(casted.ty, u8_ty);

        let too_big = ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(300));
        let casted = cast_const_value(&mut comp, &too_big, u8_ty, import, node);
        assert!(casted.is_invalid());
        let rendered = format!("{:?}", comp.diagnostics.diagnostics());
        assert!(rendered.contains("integer value 300 cannot be implicitly casted to type 'u8'"));
    }

    #[test]
    fn quiet_probe_leaves_no_diagnostic() {
        let mut comp = comp();
        let u8_ty = comp.types.int_type(false, 8);
        let too_big = ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(300));
        let result = try_cast_const_value(&mut comp, &too_big, u8_ty);
        assert!(result.is_err());
        assert_eq!(comp.error_count(), 0);
    }

    #[test]
    fn wrap_to_type_masks() {
        let mut comp = comp();
        let u8_ty = comp.types.int_type(false, 8);
        let i8_ty = comp.types.int_type(true, 8);
        assert_eq!(wrap_to_type(&comp, &BigInt::from(300), u8_ty), BigInt::from(44));
        assert_eq!(wrap_to_type(&comp, &BigInt::from(128), i8_ty), BigInt::from(-128));
    }
}

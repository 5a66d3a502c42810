//! Constant folding over the value representation.
//!
//! When every operand of an instruction is `Static`, the analyzer
//! computes the result here: big-integer arithmetic for integers, f64
//! for floats, element-wise concatenation/repetition for arrays.
//! Non-wrapping arithmetic that leaves the result type's range is a
//! compile error; wrapping variants wrap silently. Division by zero and
//! oversized shift counts are hard errors regardless of operands.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use zinc_ir::ast::NodeId;
use zinc_types::{ConstData, ConstValue, ImportId, TypeId};

use crate::ir::cast::{int_bounds, wrap_to_type};
use crate::ir::{IrBinOp, IrUnOp};
use crate::Compilation;

/// Fold a binary operation whose operands are both static and already
/// converted to the peer type `ty`. Reports its own diagnostics.
pub fn fold_bin_op(
    comp: &mut Compilation,
    op: IrBinOp,
    lhs: &ConstValue,
    rhs: &ConstValue,
    ty: TypeId,
    import: ImportId,
    node: NodeId,
) -> ConstValue {
    if lhs.is_invalid() || rhs.is_invalid() {
        return ConstValue::invalid();
    }

    if op.is_comparison() {
        return fold_comparison(comp, op, lhs, rhs, import, node);
    }

    match (lhs.as_static(), rhs.as_static()) {
        (Some(ConstData::Int(a)), Some(ConstData::Int(b))) => {
            fold_int_bin_op(comp, op, a.clone(), b.clone(), ty, import, node)
        }
        (Some(ConstData::Float(a)), Some(ConstData::Float(b))) => {
            fold_float_bin_op(comp, op, *a, *b, ty, import, node)
        }
        (Some(ConstData::Bool(a)), Some(ConstData::Bool(b))) => match op {
            IrBinOp::BinAnd => Some(ConstValue::bool_value(*a && *b)),
            IrBinOp::BinOr => Some(ConstValue::bool_value(*a || *b)),
            IrBinOp::BinXor => Some(ConstValue::bool_value(*a != *b)),
            _ => None,
        }
        .unwrap_or_else(|| invalid_operands(comp, ty, import, node)),
        (Some(ConstData::Array(a)), Some(ConstData::Array(b))) if op == IrBinOp::ArrayCat => {
            let mut elems = a.clone();
            elems.extend(b.iter().cloned());
            let elem_ty = array_elem_type(comp, lhs.ty);
            let result_ty = comp.types.array_type(elem_ty, elems.len() as u64);
            ConstValue::of(result_ty, ConstData::Array(elems))
        }
        (Some(ConstData::Array(a)), Some(ConstData::Int(times))) if op == IrBinOp::ArrayMult => {
            let Some(times) = times.to_usize() else {
                return comp.add_node_error(import, node, "array repetition count too large");
            };
            let mut elems = Vec::with_capacity(a.len() * times);
            for _ in 0..times {
                elems.extend(a.iter().cloned());
            }
            let elem_ty = array_elem_type(comp, lhs.ty);
            let result_ty = comp.types.array_type(elem_ty, elems.len() as u64);
            ConstValue::of(result_ty, ConstData::Array(elems))
        }
        _ => invalid_operands(comp, ty, import, node),
    }
}

fn array_elem_type(comp: &Compilation, array_ty: TypeId) -> TypeId {
    match comp.types.get(array_ty).data {
        zinc_types::TypeData::Array { child, .. } => child,
        _ => TypeId::INVALID,
    }
}

fn invalid_operands(
    comp: &mut Compilation,
    ty: TypeId,
    import: ImportId,
    node: NodeId,
) -> ConstValue {
    let name = comp.types.name(ty).to_string();
    comp.add_node_error(import, node, format!("invalid operands to binary expression: '{name}'"))
}

fn fold_comparison(
    comp: &mut Compilation,
    op: IrBinOp,
    lhs: &ConstValue,
    rhs: &ConstValue,
    import: ImportId,
    node: NodeId,
) -> ConstValue {
    let ordering = match (lhs.as_static(), rhs.as_static()) {
        (Some(ConstData::Int(a)), Some(ConstData::Int(b))) => a.partial_cmp(b),
        (Some(ConstData::Float(a)), Some(ConstData::Float(b))) => a.partial_cmp(b),
        (Some(ConstData::Bool(a)), Some(ConstData::Bool(b))) => Some(a.cmp(b)),
        (Some(ConstData::Type(a)), Some(ConstData::Type(b))) => {
            return match op {
                IrBinOp::CmpEq => ConstValue::bool_value(a == b),
                IrBinOp::CmpNotEq => ConstValue::bool_value(a != b),
                _ => comp.add_node_error(import, node, "types are not ordered"),
            };
        }
        (Some(ConstData::PureError(a)), Some(ConstData::PureError(b))) => {
            return match op {
                IrBinOp::CmpEq => ConstValue::bool_value(a == b),
                IrBinOp::CmpNotEq => ConstValue::bool_value(a != b),
                _ => comp.add_node_error(import, node, "errors are not ordered"),
            };
        }
        _ => None,
    };
    let Some(ordering) = ordering else {
        return comp.add_node_error(import, node, "operands cannot be compared");
    };
    let result = match op {
        IrBinOp::CmpEq => ordering.is_eq(),
        IrBinOp::CmpNotEq => !ordering.is_eq(),
        IrBinOp::CmpLessThan => ordering.is_lt(),
        IrBinOp::CmpGreaterThan => ordering.is_gt(),
        IrBinOp::CmpLessOrEq => ordering.is_le(),
        IrBinOp::CmpGreaterOrEq => ordering.is_ge(),
        _ => unreachable!("not a comparison"),
    };
    ConstValue::bool_value(result)
}

#[allow(clippy::too_many_arguments)]
fn fold_int_bin_op(
    comp: &mut Compilation,
    op: IrBinOp,
    a: BigInt,
    b: BigInt,
    ty: TypeId,
    import: ImportId,
    node: NodeId,
) -> ConstValue {
    let result = match op {
        IrBinOp::Add | IrBinOp::AddWrap => &a + &b,
        IrBinOp::Sub | IrBinOp::SubWrap => &a - &b,
        IrBinOp::Mult | IrBinOp::MultWrap => &a * &b,
        IrBinOp::Div => {
            if b.is_zero() {
                return comp.add_node_error(import, node, "division by zero is undefined");
            }
            &a / &b
        }
        IrBinOp::Mod => {
            if b.is_zero() {
                return comp.add_node_error(import, node, "division by zero is undefined");
            }
            &a % &b
        }
        IrBinOp::BinAnd => &a & &b,
        IrBinOp::BinOr => &a | &b,
        IrBinOp::BinXor => &a ^ &b,
        IrBinOp::BitShiftLeft | IrBinOp::BitShiftLeftWrap | IrBinOp::BitShiftRight => {
            let Some(shift) = b.to_u64() else {
                return comp.add_node_error(import, node, "shift amount is negative or too large");
            };
            if let Some(info) = comp.types.get(ty).int_info() {
                if shift >= u64::from(info.bits.max(1)) {
                    return comp.add_node_error(
                        import,
                        node,
                        format!("shift amount {shift} is too large for type '{}'", {
                            comp.types.name(ty)
                        }),
                    );
                }
            }
            match op {
                IrBinOp::BitShiftRight => &a >> shift,
                _ => &a << shift,
            }
        }
        _ => {
            return invalid_operands(comp, ty, import, node);
        }
    };

    if op.is_wrapping() {
        return ConstValue::int(ty, wrap_to_type(comp, &result, ty));
    }

    // Non-wrapping arithmetic must stay inside the result type.
    if let Some((min, max)) = int_bounds(comp, ty) {
        if result < min || result > max {
            return comp.add_node_error(import, node, "operation caused overflow");
        }
    }
    ConstValue::int(ty, result)
}

#[allow(clippy::too_many_arguments)]
fn fold_float_bin_op(
    comp: &mut Compilation,
    op: IrBinOp,
    a: f64,
    b: f64,
    ty: TypeId,
    import: ImportId,
    node: NodeId,
) -> ConstValue {
    let result = match op {
        IrBinOp::Add => a + b,
        IrBinOp::Sub => a - b,
        IrBinOp::Mult => a * b,
        IrBinOp::Div => {
            if b == 0.0 {
                return comp.add_node_error(import, node, "division by zero is undefined");
            }
            a / b
        }
        IrBinOp::Mod => {
            if b == 0.0 {
                return comp.add_node_error(import, node, "division by zero is undefined");
            }
            a % b
        }
        _ => {
            return invalid_operands(comp, ty, import, node);
        }
    };
    ConstValue::of(ty, ConstData::Float(result))
}

/// Fold `@divExact`: division with a remainder is a hard error.
pub fn fold_div_exact(
    comp: &mut Compilation,
    lhs: &ConstValue,
    rhs: &ConstValue,
    ty: TypeId,
    import: ImportId,
    node: NodeId,
) -> ConstValue {
    match (lhs.as_int(), rhs.as_int()) {
        (Some(a), Some(b)) => {
            if b.is_zero() {
                return comp.add_node_error(import, node, "division by zero is undefined");
            }
            if !(a % b).is_zero() {
                return comp.add_node_error(import, node, "exact division had a remainder");
            }
            ConstValue::int(ty, a / b)
        }
        _ => ConstValue::invalid(),
    }
}

/// Fold a unary operation on a static operand.
pub fn fold_un_op(
    comp: &mut Compilation,
    op: IrUnOp,
    operand: &ConstValue,
    import: ImportId,
    node: NodeId,
) -> ConstValue {
    if operand.is_invalid() {
        return ConstValue::invalid();
    }
    match op {
        IrUnOp::Negation | IrUnOp::NegationWrap => match operand.as_static() {
            Some(ConstData::Int(value)) => {
                let negated = -value;
                if op == IrUnOp::NegationWrap {
                    return ConstValue::int(
                        operand.ty,
                        wrap_to_type(comp, &negated, operand.ty),
                    );
                }
                if let Some((min, max)) = int_bounds(comp, operand.ty) {
                    if negated < min || negated > max {
                        return comp.add_node_error(import, node, "operation caused overflow");
                    }
                }
                ConstValue::int(operand.ty, negated)
            }
            Some(ConstData::Float(value)) => {
                ConstValue::of(operand.ty, ConstData::Float(-value))
            }
            _ => comp.add_node_error(import, node, "negation of non-numeric value"),
        },
        IrUnOp::BinNot => match operand.as_static() {
            Some(ConstData::Int(value)) => {
                let inverted = !value;
                ConstValue::int(operand.ty, wrap_to_type(comp, &inverted, operand.ty))
            }
            _ => comp.add_node_error(import, node, "bitwise not of non-integer value"),
        },
        // Type constructors.
        IrUnOp::Maybe => match operand.as_type() {
            Some(child) => {
                let ty = comp.types.maybe_type(child);
                ConstValue::type_value(ty)
            }
            None => comp.add_node_error(import, node, "expected type expression"),
        },
        IrUnOp::Error => match operand.as_type() {
            Some(payload) => {
                let ty = comp.types.error_union_type(payload);
                ConstValue::type_value(ty)
            }
            None => comp.add_node_error(import, node, "expected type expression"),
        },
        IrUnOp::UnwrapError => match operand.as_static() {
            Some(ConstData::ErrUnion { err: None, payload }) => {
                payload.as_deref().cloned().unwrap_or_else(ConstValue::void)
            }
            Some(ConstData::ErrUnion { err: Some(err), .. }) => {
                let name = comp
                    .interner
                    .lookup(comp.error_values[err.index()].name)
                    .to_string();
                comp.add_node_error(import, node, format!("caught unexpected error '{name}'"))
            }
            _ => ConstValue::invalid(),
        },
        IrUnOp::UnwrapMaybe => match operand.as_static() {
            Some(ConstData::Maybe(Some(payload))) => (**payload).clone(),
            Some(ConstData::Maybe(None)) => {
                comp.add_node_error(import, node, "unable to unwrap null")
            }
            _ => ConstValue::invalid(),
        },
        IrUnOp::Dereference => ConstValue::invalid(),
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

    fn setup() -> (Compilation, ImportId, NodeId) {
        let mut comp = Compilation::new(CompileOptions::default(), Box::new(NoLoader));
        let import = comp.test_import();
        (comp, import, NodeId::new(0))
    }

    fn lit(value: i64) -> ConstValue {
        ConstValue::int(TypeId::NUM_LIT_INT, BigInt::from(value))
    }

    #[test]
    fn literal_arithmetic_is_unbounded() {
        let (mut comp, import, node) = setup();
        let result = fold_bin_op(
            &mut comp,
            IrBinOp::Mult,
            &lit(1 << 40),
            &lit(1 << 40),
            TypeId::NUM_LIT_INT,
            import,
            node,
        );
        assert_eq!(result.as_int(), Some(&(BigInt::from(1u128 << 80))));
        assert_eq!(comp.error_count(), 0);
    }

    #[test]
    fn typed_overflow_is_an_error() {
        let (mut comp, import, node) = setup();
        let u8_ty = comp.types.int_type(false, 8);
        let a = ConstValue::int(u8_ty, BigInt::from(200));
        let b = ConstValue::int(u8_ty, BigInt::from(100));
        let result = fold_bin_op(&mut comp, IrBinOp::Add, &a, &b, u8_ty, import, node);
        assert!(result.is_invalid());
        let rendered = format!("{:?}", comp.diagnostics.diagnostics());
        assert!(rendered.contains("operation caused overflow"));
    }

    #[test]
    fn wrapping_add_wraps_silently() {
        let (mut comp, import, node) = setup();
        let u8_ty = comp.types.int_type(false, 8);
        let a = ConstValue::int(u8_ty, BigInt::from(200));
        let b = ConstValue::int(u8_ty, BigInt::from(100));
        let result = fold_bin_op(&mut comp, IrBinOp::AddWrap, &a, &b, u8_ty, import, node);
        assert_eq!(result.as_int(), Some(&BigInt::from(44)));
        assert_eq!(comp.error_count(), 0);
    }

    #[test]
    fn division_by_zero_diagnostic() {
        let (mut comp, import, node) = setup();
        let result = fold_bin_op(
            &mut comp,
            IrBinOp::Div,
            &lit(1),
            &lit(0),
            TypeId::NUM_LIT_INT,
            import,
            node,
        );
        assert!(result.is_invalid());
        let rendered = format!("{:?}", comp.diagnostics.diagnostics());
        assert!(rendered.contains("division by zero is undefined"));
    }

    #[test]
    fn oversized_shift_is_an_error() {
        let (mut comp, import, node) = setup();
        let u8_ty = comp.types.int_type(false, 8);
        let a = ConstValue::int(u8_ty, BigInt::from(1));
        let b = ConstValue::int(u8_ty, BigInt::from(9));
        let result = fold_bin_op(&mut comp, IrBinOp::BitShiftLeft, &a, &b, u8_ty, import, node);
        assert!(result.is_invalid());
    }

    #[test]
    fn exact_division_remainder() {
        let (mut comp, import, node) = setup();
        let result = fold_div_exact(&mut comp, &lit(7), &lit(2), TypeId::NUM_LIT_INT, import, node);
        assert!(result.is_invalid());
        let rendered = format!("{:?}", comp.diagnostics.diagnostics());
        assert!(rendered.contains("exact division had a remainder"));
        let ok = fold_div_exact(&mut comp, &lit(6), &lit(2), TypeId::NUM_LIT_INT, import, node);
        assert_eq!(ok.as_int(), Some(&BigInt::from(3)));
    }

    #[test]
    fn comparisons_fold_to_bool() {
        let (mut comp, import, node) = setup();
        let result = fold_bin_op(
            &mut comp,
            IrBinOp::CmpLessThan,
            &lit(3),
            &lit(5),
            TypeId::NUM_LIT_INT,
            import,
            node,
        );
        assert_eq!(result.as_bool(), Some(true));
    }

    #[test]
    fn array_concat_and_repeat() {
        let (mut comp, import, node) = setup();
        let u8_ty = comp.types.int_type(false, 8);
        let arr_ty = comp.types.array_type(u8_ty, 2);
        let a = ConstValue::of(
            arr_ty,
            ConstData::Array(vec![
                ConstValue::int(u8_ty, BigInt::from(1)),
                ConstValue::int(u8_ty, BigInt::from(2)),
            ]),
        );
        let cat = fold_bin_op(&mut comp, IrBinOp::ArrayCat, &a, &a, arr_ty, import, node);
        match cat.as_static() {
            Some(ConstData::Array(elems)) => assert_eq!(elems.len(), 4),
            other => panic!("expected array, got {other:?}"),
        }
        let rep = fold_bin_op(&mut comp, IrBinOp::ArrayMult, &a, &lit(3), arr_ty, import, node);
        match rep.as_static() {
            Some(ConstData::Array(elems)) => assert_eq!(elems.len(), 6),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn negation_overflow() {
        let (mut comp, import, node) = setup();
        let i8_ty = comp.types.int_type(true, 8);
        let min = ConstValue::int(i8_ty, BigInt::from(-128));
        let result = fold_un_op(&mut comp, IrUnOp::Negation, &min, import, node);
        assert!(result.is_invalid());
        let wrapped = fold_un_op(&mut comp, IrUnOp::NegationWrap, &min, import, node);
        assert_eq!(wrapped.as_int(), Some(&BigInt::from(-128)));
    }
}

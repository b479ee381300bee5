//! Arithmetic, unary minus and the `to` operator.

use crate::arena::ExprId;
use crate::error::{XPathError, XResult};
use crate::functions::SystemFunction;
use crate::kind::ExprKind;
use crate::kinds::fold_if_constant;
use crate::role::RoleDiagnostic;
use crate::type_checker::{convert_untyped, static_type_check};
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{AtomicType, Cardinality, ItemType, Relation, SequenceType};

/// Checks one numeric operand: atomized, at most one item, untyped values
/// read as doubles. Returns the operand to use.
fn numeric_operand(v: &mut ExpressionVisitor<'_>, id: ExprId, index: usize, symbol: &str) -> XResult<ExprId> {
    let operand = v.arena().operand(id, index);
    let role = RoleDiagnostic::operand(symbol, index);
    let required = SequenceType::optional(ItemType::any_atomic());
    let mut checked = static_type_check(v, operand, &required, &role)?;
    v.arena_mut().replace_operand(id, index, checked);

    let item_type = v.arena().item_type(checked);
    if item_type == ItemType::atomic(AtomicType::UntypedAtomic) {
        checked = convert_untyped(v, checked, AtomicType::Double)?;
        v.arena_mut().replace_operand(id, index, checked);
        return Ok(checked);
    }
    let disjoint = !item_type.is_error()
        && v.arena().cardinality(checked) != Cardinality::Empty
        && ItemType::numeric().relationship(&item_type) == Relation::Disjoint
        && item_type != ItemType::atomic(AtomicType::UntypedAtomic);
    if disjoint {
        if v.config().backwards_compatible {
            checked = v
                .arena_mut()
                .wrap(checked, ExprKind::FunctionCall(SystemFunction::Number));
            v.arena_mut().replace_operand(id, index, checked);
            return Ok(checked);
        }
        let message = format!(
            "{}; arithmetic is not defined for {}",
            role.item_type_mismatch(&ItemType::numeric(), &item_type.to_string()),
            item_type
        );
        return Err(v.static_error_at(checked, XPathError::static_type("XPTY0004", message)));
    }
    Ok(checked)
}

pub fn type_check(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    let ExprKind::Arithmetic(op) = *v.arena().kind(id) else {
        return Ok(id);
    };
    numeric_operand(v, id, 0, op.symbol())?;
    numeric_operand(v, id, 1, op.symbol())?;
    Ok(fold_if_constant(v, id))
}

pub fn type_check_negate(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    numeric_operand(v, id, 0, "-")?;
    Ok(fold_if_constant(v, id))
}

/// `a to b`: both operands are optional integers. The node is never
/// folded; an integer range is cheaper to hold than its expansion.
pub fn type_check_range(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    let required = SequenceType::atomic(AtomicType::Integer, Cardinality::ZeroOrOne);
    for i in 0..2 {
        let operand = v.arena().operand(id, i);
        let role = RoleDiagnostic::operand("to", i);
        let checked = static_type_check(v, operand, &required, &role)?;
        v.arena_mut().replace_operand(id, i, checked);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ExprArena;
    use crate::config::CompilerConfig;
    use crate::context::StaticContext;
    use crate::eval::DynamicContext;
    use crate::kinds::literal_integer;
    use crate::visitor::compile_passes;
    use quire_xdm::{ArithmeticOperator, AtomicValue, Item};

    #[test]
    fn test_string_operand_is_a_static_error() {
        let mut arena = ExprArena::new();
        let a = arena.string("x");
        let b = arena.int(1);
        let sum = arena.arith(a, ArithmeticOperator::Plus, b);
        let ctx = StaticContext::default();
        let err = compile_passes(&mut arena, sum, &ctx).unwrap_err();
        assert_eq!(err.code(), Some("XPTY0004"));
        assert!(err.is_static());
    }

    #[test]
    fn test_untyped_operand_reads_as_double() {
        let mut arena = ExprArena::new();
        let a = arena.literal(vec![Item::from(AtomicValue::untyped("2.5"))]);
        let b = arena.int(2);
        let product = arena.arith(a, ArithmeticOperator::Times, b);
        let ctx = StaticContext::default();
        let root = compile_passes(&mut arena, product, &ctx).unwrap();
        let out = DynamicContext::new(&arena).evaluate(root).unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Double(5.0)));
    }

    #[test]
    fn test_backwards_compatible_mode_converts_with_number() {
        let mut arena = ExprArena::new();
        let a = arena.string("4");
        let b = arena.int(1);
        let sum = arena.arith(a, ArithmeticOperator::Plus, b);
        let config = CompilerConfig::default().with_backwards_compatible(true);
        let ctx = StaticContext::new(config).unwrap();
        let root = compile_passes(&mut arena, sum, &ctx).unwrap();
        let out = DynamicContext::new(&arena).evaluate(root).unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Double(5.0)));
    }

    #[test]
    fn test_negation_of_literal_folds() {
        let mut arena = ExprArena::new();
        let a = arena.int(7);
        let neg = arena.negate(a);
        let ctx = StaticContext::default();
        let root = compile_passes(&mut arena, neg, &ctx).unwrap();
        assert_eq!(literal_integer(&arena, root), Some(-7));
    }

    #[test]
    fn test_range_is_kept_as_a_node() {
        let mut arena = ExprArena::new();
        let range = arena.range_of(1, 1_000_000);
        let ctx = StaticContext::default();
        let root = compile_passes(&mut arena, range, &ctx).unwrap();
        assert!(matches!(arena.kind(root), ExprKind::Range));
        let third = DynamicContext::new(&arena).iterate(root).nth(2).unwrap().unwrap();
        assert_eq!(third.as_atomic(), Some(&AtomicValue::Integer(3)));
    }

    #[test]
    fn test_range_bound_must_be_integer() {
        let mut arena = ExprArena::new();
        let a = arena.double(1.5);
        let b = arena.int(3);
        let range = arena.range(a, b);
        let ctx = StaticContext::default();
        let err = compile_passes(&mut arena, range, &ctx).unwrap_err();
        assert_eq!(err.code(), Some("XPTY0004"));
    }
}

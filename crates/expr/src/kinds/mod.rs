//! Per-kind behaviour of the three compile passes.
//!
//! Kinds without special handling get the generic behaviour: visit every
//! operand in order and keep the node.

pub mod arithmetic;
pub mod cast;
pub mod checkers;
pub mod comparison;
pub mod filter;
pub mod logical;
pub mod variables;

use crate::arena::{ExprArena, ExprId};
use crate::error::XResult;
use crate::eval::DynamicContext;
use crate::functions::{self, SystemFunction};
use crate::kind::{ExprKind, VariableTarget};
use crate::properties::SpecialProperties;
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_xdm::{AtomicValue, Item, Sequence};

pub fn simplify(v: &mut ExpressionVisitor<'_>, id: ExprId) -> XResult<ExprId> {
    match v.arena().kind(id) {
        ExprKind::Let(_) => variables::simplify_let(v, id),
        ExprKind::Block => logical::simplify_block(v, id),
        ExprKind::FunctionCall(f) => {
            let f = *f;
            functions::rewrite::simplify(v, id, f)
        }
        _ => {
            v.simplify_children(id)?;
            Ok(id)
        }
    }
}

pub fn type_check(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    match v.arena().kind(id) {
        ExprKind::Literal(_) => Ok(id),
        ExprKind::ContextItem { .. } => variables::type_check_context_item(v, id, info),
        ExprKind::VarRef(_) => variables::type_check_var_ref(v, id),
        ExprKind::Let(_) => variables::type_check_let(v, id, info),
        ExprKind::FunctionCall(f) => {
            let f = *f;
            functions::rewrite::type_check(v, id, f, info)
        }
        ExprKind::Arithmetic(_) => arithmetic::type_check(v, id, info),
        ExprKind::Negate => arithmetic::type_check_negate(v, id, info),
        ExprKind::Range => arithmetic::type_check_range(v, id, info),
        ExprKind::ValueComparison { .. } => comparison::type_check_value(v, id, info),
        ExprKind::GeneralComparison { .. } => comparison::type_check_general(v, id, info),
        ExprKind::And | ExprKind::Or => logical::type_check_boolean(v, id, info),
        ExprKind::Filter(_) => filter::type_check(v, id, info),
        ExprKind::Conditional => logical::type_check_conditional(v, id, info),
        ExprKind::InstanceOf(_) => logical::type_check_instance_of(v, id, info),
        ExprKind::Cast(_) => cast::type_check(v, id, info),
        ExprKind::ItemChecker { .. }
        | ExprKind::CardinalityChecker { .. }
        | ExprKind::Atomizer
        | ExprKind::UntypedConverter { .. }
        | ExprKind::AtomicConverter { .. }
        | ExprKind::FunctionCoercer { .. } => checkers::type_check(v, id, info),
        _ => {
            v.type_check_children(id, info)?;
            Ok(id)
        }
    }
}

pub fn optimize(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    match v.arena().kind(id) {
        ExprKind::Literal(_) | ExprKind::ContextItem { .. } => Ok(id),
        ExprKind::VarRef(_) => variables::optimize_var_ref(v, id),
        ExprKind::Let(_) => variables::optimize_let(v, id, info),
        ExprKind::For(_) => variables::optimize_for(v, id, info),
        ExprKind::FunctionCall(f) => {
            let f = *f;
            functions::rewrite::optimize(v, id, f, info)
        }
        ExprKind::GeneralComparison { .. } => comparison::optimize_general(v, id, info),
        ExprKind::And | ExprKind::Or => logical::optimize_boolean(v, id, info),
        ExprKind::Filter(_) => filter::optimize(v, id, info),
        ExprKind::FirstItem | ExprKind::LastItem | ExprKind::Subscript | ExprKind::Tail { .. } => {
            filter::optimize_item_access(v, id, info)
        }
        ExprKind::Conditional => logical::optimize_conditional(v, id, info),
        ExprKind::TryCatch { .. } => logical::optimize_try(v, id, info),
        ExprKind::InstanceOf(_) => logical::optimize_instance_of(v, id, info),
        ExprKind::Cast(_) => cast::optimize(v, id, info),
        ExprKind::ItemChecker { .. }
        | ExprKind::CardinalityChecker { .. }
        | ExprKind::Atomizer
        | ExprKind::UntypedConverter { .. }
        | ExprKind::AtomicConverter { .. }
        | ExprKind::FunctionCoercer { .. } => checkers::optimize(v, id, info),
        ExprKind::Range => {
            v.optimize_children(id, info)?;
            Ok(id)
        }
        _ => {
            v.optimize_children(id, info)?;
            Ok(fold_if_constant(v, id))
        }
    }
}

pub fn literal_value(arena: &ExprArena, id: ExprId) -> Option<&Sequence> {
    match arena.kind(id) {
        ExprKind::Literal(seq) => Some(seq),
        _ => None,
    }
}

pub fn literal_boolean(arena: &ExprArena, id: ExprId) -> Option<bool> {
    match literal_value(arena, id)?.as_slice() {
        [Item::Atomic(AtomicValue::Boolean(b))] => Some(*b),
        _ => None,
    }
}

pub fn literal_integer(arena: &ExprArena, id: ExprId) -> Option<i64> {
    match literal_value(arena, id)?.as_slice() {
        [Item::Atomic(AtomicValue::Integer(n))] => Some(*n),
        _ => None,
    }
}

/// The value of a single numeric literal.
pub fn literal_number(arena: &ExprArena, id: ExprId) -> Option<f64> {
    match literal_value(arena, id)?.as_slice() {
        [Item::Atomic(a)] if a.is_numeric() => Some(a.to_double()),
        _ => None,
    }
}

pub fn is_call(arena: &ExprArena, id: ExprId, function: SystemFunction) -> bool {
    matches!(arena.kind(id), ExprKind::FunctionCall(f) if *f == function)
}

/// Puts a literal holding `seq` where `id` sits and returns it.
pub(crate) fn make_literal(v: &mut ExpressionVisitor<'_>, id: ExprId, seq: Sequence) -> ExprId {
    let loc = v.arena().location(id);
    let literal = v.arena_mut().alloc_at(ExprKind::Literal(seq), vec![], loc);
    v.arena_mut().replace_node(id, literal);
    literal
}

/// Puts `new` where `id` sits and returns it.
pub(crate) fn replace(v: &mut ExpressionVisitor<'_>, id: ExprId, new: ExprId) -> ExprId {
    v.arena_mut().replace_node(id, new);
    new
}

/// Whether the value of the subtree can be computed at compile time: it
/// reads nothing from the dynamic context and raises no deliberate errors.
pub(crate) fn is_compile_time_constant(arena: &ExprArena, id: ExprId) -> bool {
    let props = arena.props(id);
    props.dependencies.is_empty()
        && !props.special.contains(SpecialProperties::HAS_SIDE_EFFECTS)
        && !arena.subtree(id).into_iter().any(|n| {
            matches!(
                arena.kind(n),
                ExprKind::VarRef(r) if r.target == VariableTarget::Global
            )
        })
}

/// Evaluates a subtree at compile time.
pub(crate) fn evaluate_early(v: &ExpressionVisitor<'_>, id: ExprId) -> XResult<Sequence> {
    DynamicContext::new(v.arena())
        .with_collation(v.context().collation)
        .with_backwards_compatible(v.config().backwards_compatible)
        .evaluate(id)
}

/// Replaces a node whose operands are all literals by its value. A failed
/// evaluation leaves the node alone: the error surfaces at run time only
/// if the node is actually reached.
pub(crate) fn fold_if_constant(v: &mut ExpressionVisitor<'_>, id: ExprId) -> ExprId {
    let arena = v.arena();
    let foldable = !matches!(
        arena.kind(id),
        ExprKind::Literal(_) | ExprKind::ContextItem { .. } | ExprKind::VarRef(_) | ExprKind::Range
    ) && arena
        .operands(id)
        .iter()
        .all(|o| arena.kind(o.child).is_literal())
        && is_compile_time_constant(arena, id);
    if !foldable {
        return id;
    }
    match evaluate_early(v, id) {
        Ok(seq) => {
            let name = v.arena().kind(id).display_name();
            v.trace(|| format!("Evaluated {} at compile time", name));
            make_literal(v, id, seq)
        }
        Err(e) => {
            log::debug!("Abandoned early evaluation: {}", e);
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use quire_xdm::ArithmeticOperator;

    #[test]
    fn test_constant_arithmetic_is_folded() {
        let mut arena = ExprArena::new();
        let a = arena.int(2);
        let b = arena.int(3);
        let sum = arena.arith(a, ArithmeticOperator::Times, b);
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = fold_if_constant(&mut v, sum);
        assert_eq!(literal_integer(v.arena(), out), Some(6));
    }

    #[test]
    fn test_failing_fold_is_abandoned() {
        let mut arena = ExprArena::new();
        let a = arena.int(1);
        let b = arena.int(0);
        let div = arena.arith(a, ArithmeticOperator::IDiv, b);
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        assert_eq!(fold_if_constant(&mut v, div), div);
    }

    #[test]
    fn test_global_references_are_not_constant() {
        let mut arena = ExprArena::new();
        let r = arena.global_ref("g", "xs:integer".parse().unwrap());
        let one = arena.int(1);
        let sum = arena.arith(r, ArithmeticOperator::Plus, one);
        assert!(!is_compile_time_constant(&arena, sum));
        let two = arena.int(2);
        let three = arena.int(3);
        let other = arena.arith(two, ArithmeticOperator::Plus, three);
        assert!(is_compile_time_constant(&arena, other));
    }
}

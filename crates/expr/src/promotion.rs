//! Promotion of loop-invariant subexpressions.
//!
//! A subexpression of a `for` action or of a filter predicate that reads
//! neither the focus nor any variable bound inside the loop has the same
//! value on every iteration. It is moved into a lazily evaluated `let`
//! wrapped around the loop, and replaced in place by a reference to that
//! variable. Laziness keeps the error behaviour: a promoted expression is
//! still only evaluated if the loop reads it.

use crate::arena::{ExprArena, ExprId, VariableId};
use crate::error::XResult;
use crate::kind::{ExprKind, VariableTarget};
use crate::properties::SpecialProperties;
use crate::visitor::ExpressionVisitor;
use quire_types::SequenceType;
use std::collections::HashSet;

/// Variables bound by `let` or `for` anywhere in `root`'s subtree.
fn bound_within(arena: &ExprArena, root: ExprId) -> HashSet<VariableId> {
    arena
        .subtree(root)
        .into_iter()
        .filter_map(|n| match arena.kind(n) {
            ExprKind::Let(b) => Some(b.var),
            ExprKind::For(b) => Some(b.var),
            _ => None,
        })
        .collect()
}

fn is_trivial(arena: &ExprArena, id: ExprId) -> bool {
    match arena.kind(id) {
        ExprKind::Literal(_) | ExprKind::VarRef(_) | ExprKind::ContextItem { .. } => true,
        ExprKind::FunctionCall(_) => arena.operand_count(id) == 0,
        _ => false,
    }
}

fn is_invariant(arena: &ExprArena, id: ExprId, loop_vars: &HashSet<VariableId>) -> bool {
    let props = arena.props(id);
    props.is_focus_independent()
        && !props.special.contains(SpecialProperties::HAS_SIDE_EFFECTS)
        && !arena.subtree(id).into_iter().any(|n| {
            matches!(
                arena.kind(n),
                ExprKind::VarRef(r) if matches!(r.target, VariableTarget::Local(v) if loop_vars.contains(&v))
            )
        })
}

/// The outermost invariant subexpressions under `id`, in document order.
/// Nothing inside a try expression is moved out of it.
fn collect(
    arena: &ExprArena,
    id: ExprId,
    loop_vars: &HashSet<VariableId>,
    found: &mut Vec<ExprId>,
) {
    if matches!(arena.kind(id), ExprKind::TryCatch { .. }) {
        return;
    }
    if !is_trivial(arena, id) && is_invariant(arena, id, loop_vars) {
        found.push(id);
        return;
    }
    for child in arena.children(id) {
        collect(arena, child, loop_vars, found);
    }
}

/// Puts `let $var := value return body` where `body` sits.
fn bind_around(arena: &mut ExprArena, body: ExprId, var: VariableId, name: &str, value: ExprId) -> ExprId {
    let slot = arena
        .parent(body)
        .and_then(|p| arena.operand_index(p, body).map(|i| (p, i)));
    let loc = arena.location(body);
    let binding = arena.let_binding(var, name, value, body);
    arena.set_location(binding, loc);
    match slot {
        Some((parent, index)) => arena.replace_operand(parent, index, binding),
        None => arena.detach(binding),
    }
    binding
}

/// Promotes the loop-invariant parts of a `for` action or filter
/// predicate into enclosing `let` bindings. Returns the node now standing
/// where `id` stood.
pub fn promote_loop_invariants(v: &mut ExpressionVisitor<'_>, id: ExprId) -> XResult<ExprId> {
    let arena = v.arena();
    let (region, mut loop_vars, include_region) = match arena.kind(id) {
        ExprKind::For(b) => {
            let mut vars = HashSet::new();
            vars.insert(b.var);
            (arena.operand(id, 1), vars, true)
        }
        ExprKind::Filter(_) => (arena.operand(id, 1), HashSet::new(), false),
        _ => return Ok(id),
    };
    loop_vars.extend(bound_within(arena, region));

    let mut found = Vec::new();
    if include_region {
        collect(arena, region, &loop_vars, &mut found);
    } else {
        for child in arena.children(region) {
            collect(arena, child, &loop_vars, &mut found);
        }
    }
    if found.is_empty() {
        return Ok(id);
    }

    let mut current = id;
    for candidate in found {
        let arena = v.arena_mut();
        let var = arena.new_variable();
        let name = format!("promoted{}", var.raw());
        let static_type = SequenceType::new(arena.item_type(candidate), arena.cardinality(candidate));
        let reference = arena.local_ref_typed(var, &name, static_type);
        arena.replace_node(candidate, reference);
        current = bind_around(arena, current, var, &name, candidate);
        let shown = name.clone();
        v.trace(|| format!("Promoted loop-invariant subexpression to ${}", shown));
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::eval::DynamicContext;
    use crate::visitor::compile_passes;
    use quire_xdm::{ArithmeticOperator, AtomicValue, ComparisonOperator, Item};

    fn context() -> StaticContext {
        let mut ctx = StaticContext::default();
        ctx.declare_variable("g", "xs:integer".parse().unwrap());
        ctx.declare_variable("s", "xs:integer*".parse().unwrap());
        ctx
    }

    fn ints(values: &[i64]) -> Vec<Item> {
        values.iter().map(|v| Item::from(AtomicValue::Integer(*v))).collect()
    }

    fn as_ints(items: &[Item]) -> Vec<i64> {
        items
            .iter()
            .filter_map(|i| match i.as_atomic() {
                Some(AtomicValue::Integer(n)) => Some(*n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_invariant_part_of_for_action_is_promoted() {
        let mut arena = ExprArena::new();
        let ctx = context();
        let var = arena.new_variable();
        let seq = arena.ints(&[1, 2, 3]);
        let x = arena.local_ref(var, "x");
        let g = arena.global_ref("g", SequenceType::any());
        let two = arena.int(2);
        let scaled = arena.arith(g, ArithmeticOperator::Times, two);
        let sum = arena.arith(x, ArithmeticOperator::Plus, scaled);
        let each = arena.for_each(var, "x", seq, sum);
        let root = compile_passes(&mut arena, each, &ctx).unwrap();

        assert!(matches!(arena.kind(root), ExprKind::Let(_)));
        assert_eq!(arena.operand(root, 0), scaled);
        assert!(arena.verify_parent_pointers(root).is_ok());
        let out = DynamicContext::new(&arena)
            .with_global("g", ints(&[10]))
            .evaluate(root)
            .unwrap();
        assert_eq!(as_ints(&out), vec![21, 22, 23]);
    }

    #[test]
    fn test_expression_using_the_range_variable_stays() {
        let mut arena = ExprArena::new();
        let ctx = context();
        let var = arena.new_variable();
        let seq = arena.global_ref("s", SequenceType::any());
        let x = arena.local_ref(var, "x");
        let two = arena.int(2);
        let doubled = arena.arith(x, ArithmeticOperator::Times, two);
        let each = arena.for_each(var, "x", seq, doubled);
        let root = compile_passes(&mut arena, each, &ctx).unwrap();
        assert!(matches!(arena.kind(root), ExprKind::For(_)));
    }

    #[test]
    fn test_focus_independent_part_of_predicate_is_promoted() {
        let mut arena = ExprArena::new();
        let ctx = context();
        let s = arena.global_ref("s", SequenceType::any());
        let dot = arena.context_item();
        let g = arena.global_ref("g", SequenceType::any());
        let one = arena.int(1);
        let bound = arena.arith(g, ArithmeticOperator::Plus, one);
        let test = arena.general_compare(dot, ComparisonOperator::Gt, bound);
        let f = arena.filter(s, test);
        let root = compile_passes(&mut arena, f, &ctx).unwrap();

        assert!(matches!(arena.kind(root), ExprKind::Let(_)));
        let out = DynamicContext::new(&arena)
            .with_global("s", ints(&[1, 5, 2, 7]))
            .with_global("g", ints(&[3]))
            .evaluate(root)
            .unwrap();
        assert_eq!(as_ints(&out), vec![5, 7]);
    }

    #[test]
    fn test_nothing_is_moved_out_of_try() {
        let mut arena = ExprArena::new();
        let ctx = context();
        let var = arena.new_variable();
        let seq = arena.ints(&[1, 2]);
        let g = arena.global_ref("g", SequenceType::any());
        let zero = arena.int(0);
        let risky = arena.arith(g, ArithmeticOperator::IDiv, zero);
        let fallback = arena.int(0);
        let guarded = arena.try_catch(risky, vec![(None, fallback)]);
        let each = arena.for_each(var, "x", seq, guarded);
        let root = compile_passes(&mut arena, each, &ctx).unwrap();
        assert!(matches!(arena.kind(root), ExprKind::For(_)));
        let out = DynamicContext::new(&arena)
            .with_global("g", ints(&[4]))
            .evaluate(root)
            .unwrap();
        assert_eq!(as_ints(&out), vec![0, 0]);
    }

    #[test]
    fn test_promoted_value_is_not_evaluated_for_an_empty_loop() {
        let mut arena = ExprArena::new();
        let ctx = context();
        let var = arena.new_variable();
        let seq = arena.global_ref("s", SequenceType::any());
        let g = arena.global_ref("g", SequenceType::any());
        let zero = arena.int(0);
        let risky = arena.arith(g, ArithmeticOperator::IDiv, zero);
        let each = arena.for_each(var, "x", seq, risky);
        let root = compile_passes(&mut arena, each, &ctx).unwrap();
        assert!(matches!(arena.kind(root), ExprKind::Let(_)));
        let out = DynamicContext::new(&arena)
            .with_global("s", vec![])
            .with_global("g", ints(&[4]))
            .evaluate(root)
            .unwrap();
        assert!(out.is_empty());
    }
}

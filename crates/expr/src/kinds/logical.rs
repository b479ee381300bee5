//! Blocks, boolean connectives, conditionals, try/catch and `instance of`.

use crate::arena::{ExprArena, ExprId};
use crate::error::XResult;
use crate::eval::effective_boolean_value;
use crate::functions::SystemFunction;
use crate::kind::ExprKind;
use crate::kinds::{fold_if_constant, literal_value, make_literal, replace};
use crate::properties::SpecialProperties;
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{AtomicType, Cardinality, ItemType, Relation, SequenceType};
use quire_xdm::{AtomicValue, Item, Sequence};

/// Effective boolean value of a literal operand, if it is one.
fn literal_ebv(arena: &ExprArena, id: ExprId) -> Option<XResult<bool>> {
    let items = literal_value(arena, id)?.clone();
    Some(effective_boolean_value(Box::new(items.into_iter().map(Ok))))
}

fn has_side_effects(arena: &ExprArena, id: ExprId) -> bool {
    arena
        .props(id)
        .special
        .contains(SpecialProperties::HAS_SIDE_EFFECTS)
}

fn boolean_literal(v: &mut ExpressionVisitor<'_>, id: ExprId, b: bool) -> ExprId {
    make_literal(v, id, vec![Item::from(AtomicValue::Boolean(b))])
}

/// `operand` as a single boolean, wrapping it in `boolean()` unless it is
/// one already.
fn as_boolean(v: &mut ExpressionVisitor<'_>, operand: ExprId) -> ExprId {
    let props = v.arena().props(operand);
    if props.item_type == ItemType::atomic(AtomicType::Boolean)
        && props.cardinality == Cardinality::ExactlyOne
    {
        operand
    } else {
        v.arena_mut().call(SystemFunction::Boolean, vec![operand])
    }
}

/// Reports an operand whose effective boolean value is known to fail.
fn check_ebv(v: &ExpressionVisitor<'_>, operand: ExprId) -> XResult<()> {
    if let Some(Err(e)) = literal_ebv(v.arena(), operand) {
        return Err(v.static_error_at(operand, e.into_static()));
    }
    Ok(())
}

pub fn simplify_block(v: &mut ExpressionVisitor<'_>, id: ExprId) -> XResult<ExprId> {
    v.simplify_children(id)?;
    let mut flat: Vec<ExprId> = Vec::new();
    let mut changed = false;
    let mut pending: Option<Sequence> = None;
    let mut stack: Vec<ExprId> = v.arena().children(id).into_iter().rev().collect();
    while let Some(child) = stack.pop() {
        match v.arena().kind(child) {
            ExprKind::Block => {
                changed = true;
                stack.extend(v.arena().children(child).into_iter().rev());
            }
            ExprKind::Literal(items) => {
                if items.is_empty() {
                    changed = true;
                    continue;
                }
                match pending.as_mut() {
                    Some(merged) => {
                        changed = true;
                        merged.extend(items.iter().cloned());
                    }
                    None => pending = Some(items.clone()),
                }
            }
            _ => {
                if let Some(items) = pending.take() {
                    flat.push(v.arena_mut().literal(items));
                }
                flat.push(child);
            }
        }
    }
    if let Some(items) = pending.take() {
        flat.push(v.arena_mut().literal(items));
    }

    match flat.len() {
        0 => Ok(make_literal(v, id, Vec::new())),
        1 => Ok(replace(v, id, flat[0])),
        _ if changed => {
            let loc = v.arena().location(id);
            let block = v.arena_mut().alloc_at(ExprKind::Block, flat, loc);
            Ok(replace(v, id, block))
        }
        _ => Ok(id),
    }
}

pub fn type_check_boolean(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    for i in 0..2 {
        check_ebv(v, v.arena().operand(id, i))?;
    }
    Ok(fold_if_constant(v, id))
}

pub fn optimize_boolean(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    let is_and = matches!(v.arena().kind(id), ExprKind::And);
    let (left, right) = (v.arena().operand(id, 0), v.arena().operand(id, 1));
    // the value that decides the outcome on its own
    let decisive = !is_and;

    if let Some(Ok(b)) = literal_ebv(v.arena(), left) {
        if b == decisive {
            return Ok(boolean_literal(v, id, b));
        }
        let other = as_boolean(v, right);
        v.trace(|| "Dropped constant operand of boolean connective".to_string());
        return Ok(replace(v, id, other));
    }
    if let Some(Ok(b)) = literal_ebv(v.arena(), right) {
        if b == decisive {
            if !has_side_effects(v.arena(), left) {
                return Ok(boolean_literal(v, id, b));
            }
        } else {
            let other = as_boolean(v, left);
            return Ok(replace(v, id, other));
        }
    }
    Ok(fold_if_constant(v, id))
}

/// Picks a branch when the condition is a literal.
fn select_branch(v: &mut ExpressionVisitor<'_>, id: ExprId) -> XResult<Option<ExprId>> {
    let condition = v.arena().operand(id, 0);
    match literal_ebv(v.arena(), condition) {
        Some(Ok(b)) => {
            let branch = v.arena().operand(id, if b { 1 } else { 2 });
            v.trace(|| format!("Condition is always {}", b));
            Ok(Some(replace(v, id, branch)))
        }
        Some(Err(e)) => Err(v.static_error_at(condition, e.into_static())),
        None => Ok(None),
    }
}

pub fn type_check_conditional(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    Ok(select_branch(v, id)?.unwrap_or(id))
}

pub fn optimize_conditional(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_operand(id, 0, info)?;
    if let Some(branch) = select_branch(v, id)? {
        return v.optimize(branch, info);
    }
    v.optimize_operand(id, 1, info)?;
    v.optimize_operand(id, 2, info)?;

    let condition = v.arena().operand(id, 0);
    let (then, otherwise) = (v.arena().operand(id, 1), v.arena().operand(id, 2));
    let empty = |e: ExprId| literal_value(v.arena(), e).is_some_and(|s| s.is_empty());
    if empty(then) && empty(otherwise) && !has_side_effects(v.arena(), condition) {
        return Ok(make_literal(v, id, Vec::new()));
    }
    // if (C) then true() else false()
    let truth = |e: ExprId, b: bool| {
        matches!(literal_value(v.arena(), e).map(|s| s.as_slice()),
            Some([Item::Atomic(AtomicValue::Boolean(x))]) if *x == b)
    };
    if truth(then, true) && truth(otherwise, false) {
        let condition = as_boolean(v, condition);
        return Ok(replace(v, id, condition));
    }
    Ok(id)
}

pub fn optimize_try(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    let body = v.arena().operand(id, 0);
    if v.arena().kind(body).is_literal() {
        return Ok(replace(v, id, body));
    }
    Ok(id)
}

/// Decides `E instance of T` from the static type of `E` where possible.
fn static_instance_of(arena: &ExprArena, operand: ExprId, target: &SequenceType) -> Option<bool> {
    let props = arena.props(operand);
    if props.special.contains(SpecialProperties::HAS_SIDE_EFFECTS) {
        return None;
    }
    let supplied = SequenceType::new(props.item_type.clone(), props.cardinality);
    if target.subsumes(&supplied) {
        return Some(true);
    }
    if props.cardinality.intersect(target.cardinality).is_none() {
        return Some(false);
    }
    let disjoint = target.item_type.relationship(&props.item_type) == Relation::Disjoint;
    if disjoint && !(props.cardinality.allows_zero() && target.cardinality.allows_zero()) {
        return Some(false);
    }
    None
}

fn decide_instance_of(v: &mut ExpressionVisitor<'_>, id: ExprId) -> ExprId {
    let ExprKind::InstanceOf(target) = v.arena().kind(id) else {
        return id;
    };
    let operand = v.arena().operand(id, 0);
    match static_instance_of(v.arena(), operand, target) {
        Some(b) => {
            v.trace(|| format!("Decided 'instance of' statically: {}", b));
            boolean_literal(v, id, b)
        }
        None => fold_if_constant(v, id),
    }
}

pub fn type_check_instance_of(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    Ok(decide_instance_of(v, id))
}

pub fn optimize_instance_of(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    Ok(decide_instance_of(v, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::eval::DynamicContext;
    use crate::kinds::literal_boolean;
    use crate::visitor::compile_passes;

    fn compile(arena: &mut ExprArena, root: ExprId, ctx: &StaticContext) -> ExprId {
        compile_passes(arena, root, ctx).unwrap()
    }

    fn flag_context() -> StaticContext {
        let mut ctx = StaticContext::default();
        ctx.declare_variable("b", "xs:boolean".parse().unwrap());
        ctx.declare_variable("s", "xs:string*".parse().unwrap());
        ctx
    }

    #[test]
    fn test_block_is_flattened_and_literals_merged() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let a = arena.int(1);
        let b = arena.int(2);
        let e = arena.empty();
        let inner = arena.block(vec![b, e]);
        let c = arena.int(3);
        let block = arena.block(vec![a, inner, c]);
        let root = compile(&mut arena, block, &ctx);
        let items = literal_value(&arena, root).unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_block_keeps_order_around_non_literals() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let a = arena.int(1);
        let s = arena.global_ref("s", SequenceType::any());
        let b = arena.int(2);
        let block = arena.block(vec![a, s, b]);
        let root = compile(&mut arena, block, &ctx);
        assert!(matches!(arena.kind(root), ExprKind::Block));
        assert_eq!(arena.operand_count(root), 3);
        assert_eq!(arena.operand(root, 1), s);
    }

    #[test]
    fn test_empty_block_becomes_empty_sequence() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let e = arena.empty();
        let block = arena.block(vec![e]);
        let root = compile(&mut arena, block, &ctx);
        assert_eq!(literal_value(&arena, root).map(Vec::len), Some(0));
    }

    #[test]
    fn test_and_with_false_literal_is_false() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let f = arena.boolean(false);
        let b = arena.global_ref("b", SequenceType::any());
        let and = arena.and(f, b);
        let root = compile(&mut arena, and, &ctx);
        assert_eq!(literal_boolean(&arena, root), Some(false));
    }

    #[test]
    fn test_or_with_false_literal_keeps_other_operand() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let f = arena.boolean(false);
        let s = arena.global_ref("s", SequenceType::any());
        let or = arena.or(f, s);
        let root = compile(&mut arena, or, &ctx);
        assert!(crate::kinds::is_call(&arena, root, SystemFunction::Boolean));
    }

    #[test]
    fn test_constant_condition_selects_branch() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let c = arena.string("yes");
        let t = arena.int(1);
        let e = arena.int(2);
        let cond = arena.conditional(c, t, e);
        let root = compile(&mut arena, cond, &ctx);
        assert_eq!(root, t);
    }

    #[test]
    fn test_condition_without_boolean_value_is_static_error() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let c = arena.ints(&[1, 2]);
        let t = arena.int(1);
        let e = arena.int(2);
        let cond = arena.conditional(c, t, e);
        let err = compile_passes(&mut arena, cond, &ctx).unwrap_err();
        assert_eq!(err.code(), Some("FORG0006"));
        assert!(err.is_static());
    }

    #[test]
    fn test_try_around_literal_is_dropped() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let body = arena.int(1);
        let handler = arena.int(0);
        let t = arena.try_catch(body, vec![(None, handler)]);
        let root = compile(&mut arena, t, &ctx);
        assert_eq!(root, body);
    }

    #[test]
    fn test_try_catches_dynamic_error_by_code() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let one = arena.int(1);
        let zero = arena.global_ref("z", SequenceType::any());
        let div = arena.arith(one, quire_xdm::ArithmeticOperator::IDiv, zero);
        let handler = arena.int(-1);
        let t = arena.try_catch(div, vec![(Some("FOAR0001".to_string()), handler)]);
        let mut ctx = ctx;
        ctx.declare_variable("z", "xs:integer".parse().unwrap());
        let root = compile(&mut arena, t, &ctx);
        let out = DynamicContext::new(&arena)
            .with_global("z", vec![Item::from(AtomicValue::Integer(0))])
            .evaluate(root)
            .unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Integer(-1)));
    }

    #[test]
    fn test_instance_of_is_decided_from_static_type() {
        let mut arena = ExprArena::new();
        let ctx = flag_context();
        let s = arena.global_ref("s", SequenceType::any());
        let yes = arena.instance_of(s, "xs:string*".parse().unwrap());
        let root = compile(&mut arena, yes, &ctx);
        assert_eq!(literal_boolean(&arena, root), Some(true));

        let b = arena.global_ref("b", SequenceType::any());
        let no = arena.instance_of(b, "xs:integer".parse().unwrap());
        let root = compile(&mut arena, no, &ctx);
        assert_eq!(literal_boolean(&arena, root), Some(false));

        let s = arena.global_ref("s", SequenceType::any());
        let maybe = arena.instance_of(s, "xs:string+".parse().unwrap());
        let root = compile(&mut arena, maybe, &ctx);
        assert!(matches!(arena.kind(root), ExprKind::InstanceOf(_)));
    }
}

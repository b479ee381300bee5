mod common;

use common::{TestResult, as_ints, compiler, ints, seq_ref};
use pretty_assertions::assert_eq;
use quire::{
    AtomicType, AtomicValue, ExprArena, ExprId, ExprKind, Item, ItemType, RoleDiagnostic,
    SequenceType, StaticContext, SystemFunction, explain,
};
use quire_expr::{ContextItemStaticInfo, ExpressionVisitor, compile_passes, static_type_check};
use quire_xdm::{ArithmeticOperator, ComparisonOperator};

fn context() -> StaticContext {
    let mut ctx = StaticContext::default();
    ctx.declare_variable("a", "xs:anyAtomicType".parse().unwrap());
    ctx.declare_variable("seq", "xs:integer*".parse().unwrap());
    ctx.declare_variable("i", "xs:integer".parse().unwrap());
    ctx
}

#[test]
fn test_overlapping_type_gets_item_check() -> TestResult {
    let ctx = context();
    let mut arena = ExprArena::new();
    let a = arena.global_ref("a", SequenceType::any());
    let info = ContextItemStaticInfo::from_context(&ctx);
    let mut v = ExpressionVisitor::new(&mut arena, &ctx);
    let a = v.type_check(a, &info)?;

    let required = SequenceType::atomic(AtomicType::Integer, quire::Cardinality::ExactlyOne);
    let checked = static_type_check(&mut v, a, &required, &RoleDiagnostic::variable("x"))?;
    assert_ne!(checked, a);
    let guarded = v.arena().subtree(checked).into_iter().any(|n| {
        matches!(v.arena().kind(n), ExprKind::ItemChecker { required, .. }
            if *required == ItemType::atomic(AtomicType::Integer))
    });
    assert!(guarded);
    Ok(())
}

#[test]
fn test_violating_literal_is_rejected_before_a_guard() {
    let ctx = context();
    let mut arena = ExprArena::new();
    let s = arena.string("x");
    let mut v = ExpressionVisitor::new(&mut arena, &ctx);
    let required = SequenceType::atomic(AtomicType::Integer, quire::Cardinality::ExactlyOne);
    let err = static_type_check(&mut v, s, &required, &RoleDiagnostic::variable("x")).unwrap_err();
    assert_eq!(err.code(), Some("XPTY0004"));
    assert!(err.is_static());
}

#[test]
fn test_identity_cast_keeps_value_without_guard() -> TestResult {
    let mut arena = ExprArena::new();
    let n = arena.global_ref("n", SequenceType::any());
    let cast = arena.cast(n, AtomicType::Integer, false);
    let compiled = compiler().compile(arena, cast)?;
    let has_guard = compiled
        .arena()
        .subtree(compiled.root())
        .into_iter()
        .any(|id| matches!(compiled.arena().kind(id), ExprKind::ItemChecker { .. }));
    assert!(!has_guard);
    let out = compiled.evaluate(None, vec![("n".into(), ints(&[17]))])?;
    assert_eq!(as_ints(&out), vec![17]);
    Ok(())
}

#[test]
fn test_let_is_inlined_and_folded() -> TestResult {
    let mut arena = ExprArena::new();
    let var = arena.new_variable();
    let one = arena.int(1);
    let one_more = arena.int(1);
    let sum = arena.arith(one, ArithmeticOperator::Plus, one_more);
    let x1 = arena.local_ref(var, "x");
    let x2 = arena.local_ref(var, "x");
    let square = arena.arith(x1, ArithmeticOperator::Times, x2);
    let binding = arena.let_binding(var, "x", sum, square);

    let compiled = compiler().compile(arena, binding)?;
    let remaining = compiled
        .arena()
        .subtree(compiled.root())
        .into_iter()
        .filter(|id| matches!(compiled.arena().kind(*id), ExprKind::VarRef(_)))
        .count();
    assert_eq!(remaining, 0);
    assert_eq!(as_ints(&compiled.evaluate(None, vec![])?), vec![4]);
    Ok(())
}

/// A few trees touching the main rewrites.
fn corpus(arena: &mut ExprArena) -> Vec<ExprId> {
    let mut roots = Vec::new();

    let seq = seq_ref(arena);
    let pos = arena.call(SystemFunction::Position, vec![]);
    let two = arena.int(2);
    let test = arena.general_compare(pos, ComparisonOperator::Gt, two);
    roots.push(arena.filter(seq, test));

    let seq = seq_ref(arena);
    let last = arena.call(SystemFunction::Last, vec![]);
    roots.push(arena.filter(seq, last));

    let left = seq_ref(arena);
    let right = arena.ints(&[3, 4]);
    roots.push(arena.general_compare(left, ComparisonOperator::Lt, right));

    let var = arena.new_variable();
    let seq = seq_ref(arena);
    let x = arena.local_ref(var, "x");
    let i = arena.global_ref("i", SequenceType::any());
    let ten = arena.int(10);
    let scaled = arena.arith(i, ArithmeticOperator::Times, ten);
    let sum = arena.arith(x, ArithmeticOperator::Plus, scaled);
    roots.push(arena.for_each(var, "x", seq, sum));

    let a = arena.global_ref("a", SequenceType::any());
    let cast = arena.cast(a, AtomicType::Double, false);
    let dot = arena.context_item();
    let fallback = arena.int(2);
    let cond = arena.conditional(dot, cast, fallback);
    roots.push(cond);

    roots
}

#[test]
fn test_optimize_is_idempotent() -> TestResult {
    let ctx = context();
    let mut arena = ExprArena::new();
    for root in corpus(&mut arena) {
        let root = compile_passes(&mut arena, root, &ctx)?;
        let before = explain(&arena, root)?;
        let info = ContextItemStaticInfo::from_context(&ctx);
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let again = v.optimize(root, &info)?;
        let after = explain(&arena, again)?;
        assert_eq!(before, after);
    }
    Ok(())
}

#[test]
fn test_loop_invariant_is_promoted() -> TestResult {
    let mut arena = ExprArena::new();
    let var = arena.new_variable();
    let seq = seq_ref(&mut arena);
    let x = arena.local_ref(var, "x");
    let n = arena.global_ref("n", SequenceType::any());
    let ten = arena.int(10);
    let scaled = arena.arith(n, ArithmeticOperator::Times, ten);
    let sum = arena.arith(x, ArithmeticOperator::Plus, scaled);
    let each = arena.for_each(var, "x", seq, sum);

    let compiled = compiler().compile(arena, each)?;
    assert!(matches!(compiled.arena().kind(compiled.root()), ExprKind::Let(_)));
    let out = compiled.evaluate(
        None,
        vec![("seq".into(), ints(&[1, 2])), ("n".into(), ints(&[3]))],
    )?;
    assert_eq!(as_ints(&out), vec![31, 32]);
    Ok(())
}

#[test]
fn test_context_item_is_available_to_evaluation() -> TestResult {
    let mut arena = ExprArena::new();
    let dot = arena.context_item();
    let one = arena.int(1);
    let sum = arena.arith(dot, ArithmeticOperator::Plus, one);
    let compiled = compiler().compile(arena, sum)?;
    let out = compiled.evaluate(Some(Item::from(AtomicValue::Integer(4))), vec![])?;
    assert_eq!(as_ints(&out), vec![5]);
    Ok(())
}

mod common;

use common::{TestResult, compiler, ints};
use quire::{AtomicValue, CollectWarnings, Compiler, ExprArena, Item, SequenceType, StaticContext};
use quire_expr::kinds::comparison::compare_many_to_many;
use quire_xdm::{Collation, ComparisonOperator};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_many_to_many_equality() -> TestResult {
    for (right, expected) in [(&[4, 5, 3], true), (&[4, 5, 6], false)] {
        let mut arena = ExprArena::new();
        let left = arena.ints(&[1, 2, 3]);
        let right = arena.ints(right);
        let gc = arena.general_compare(left, ComparisonOperator::Eq, right);
        let compiled = compiler().compile(arena, gc)?;
        assert_eq!(compiled.effective_boolean(None, vec![])?, expected);
    }
    Ok(())
}

#[test]
fn test_many_to_many_stops_at_first_match() -> TestResult {
    let pulled = Rc::new(Cell::new(0usize));
    let counter = pulled.clone();
    let left = [1i64, 2, 3, 9, 9, 9]
        .into_iter()
        .inspect(move |_| counter.set(counter.get() + 1))
        .map(|v| Ok(AtomicValue::Integer(v)));
    let right = [4i64, 5, 3, 8, 8, 8].into_iter().map(|v| Ok(AtomicValue::Integer(v)));

    let found = compare_many_to_many(left, right, ComparisonOperator::Eq, Collation::default())?;
    assert!(found);
    assert_eq!(pulled.get(), 3);
    Ok(())
}

#[test]
fn test_untyped_compares_as_number_or_string() -> TestResult {
    let cases = [
        (Item::from(AtomicValue::Integer(5)), true),
        (Item::from(AtomicValue::string("5")), true),
        (Item::from(AtomicValue::string("05")), false),
        (Item::from(AtomicValue::Double(5.0)), true),
    ];
    for (other, expected) in cases {
        let mut arena = ExprArena::new();
        let untyped = arena.literal(vec![Item::from(AtomicValue::untyped("5"))]);
        let other = arena.literal(vec![other]);
        let gc = arena.general_compare(untyped, ComparisonOperator::Eq, other);
        let compiled = compiler().compile(arena, gc)?;
        assert_eq!(compiled.effective_boolean(None, vec![])?, expected);
    }
    Ok(())
}

#[test]
fn test_disjoint_optional_operands_warn_once() -> TestResult {
    let sink = Rc::new(CollectWarnings::new());
    let mut ctx = StaticContext::default().with_warning_sink(sink.clone());
    ctx.declare_variable("d", "xs:date?".parse::<SequenceType>()?);
    ctx.declare_variable("opt", "xs:integer?".parse::<SequenceType>()?);

    let mut arena = ExprArena::new();
    let d = arena.global_ref("d", SequenceType::any());
    let opt = arena.global_ref("opt", SequenceType::any());
    let gc = arena.general_compare(d, ComparisonOperator::Eq, opt);
    let compiled = Compiler::with_context(ctx).compile(arena, gc)?;

    assert_eq!(sink.messages().len(), 1);
    let out = compiled.evaluate(None, vec![("d".into(), vec![]), ("opt".into(), ints(&[1]))])?;
    assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Boolean(false)));
    Ok(())
}

#[test]
fn test_disjoint_required_operands_are_rejected() -> TestResult {
    let mut arena = ExprArena::new();
    let n = arena.global_ref("n", SequenceType::any());
    let s = arena.string("x");
    let gc = arena.general_compare(n, ComparisonOperator::Eq, s);
    let err = compiler().compile(arena, gc).unwrap_err();
    assert_eq!(err.code(), Some("XPTY0004"));
    assert!(err.is_static());
    Ok(())
}

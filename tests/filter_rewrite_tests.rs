mod common;

use common::{TestResult, as_ints, compiler, compiler_with, init_logging, ints, seq_ref};
use proptest::prelude::*;
use quire::{AtomicValue, CompilerConfig, ExprArena, ExprKind, SystemFunction};
use quire_xdm::ComparisonOperator;

#[test]
fn test_first_item_of_literal() -> TestResult {
    init_logging();
    let mut arena = ExprArena::new();
    let base = arena.strings(&["a", "b", "c"]);
    let one = arena.int(1);
    let filter = arena.filter(base, one);

    let compiled = compiler().compile(arena, filter)?;
    assert!(matches!(compiled.arena().kind(compiled.root()), ExprKind::FirstItem));
    let out = compiled.evaluate(None, vec![])?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].as_atomic(), Some(&AtomicValue::string("a")));
    Ok(())
}

#[test]
fn test_position_equals_becomes_subscript() -> TestResult {
    let mut arena = ExprArena::new();
    let seq = seq_ref(&mut arena);
    let pos = arena.call(SystemFunction::Position, vec![]);
    let three = arena.int(3);
    let test = arena.general_compare(pos, ComparisonOperator::Eq, three);
    let filter = arena.filter(seq, test);

    let compiled = compiler().compile(arena, filter)?;
    assert!(matches!(compiled.arena().kind(compiled.root()), ExprKind::Subscript));
    let out = compiled.evaluate(None, vec![("seq".into(), ints(&[10, 20, 30, 40]))])?;
    assert_eq!(as_ints(&out), vec![30]);
    Ok(())
}

#[test]
fn test_position_greater_than_becomes_tail() -> TestResult {
    let mut arena = ExprArena::new();
    let seq = seq_ref(&mut arena);
    let pos = arena.call(SystemFunction::Position, vec![]);
    let two = arena.int(2);
    let test = arena.general_compare(pos, ComparisonOperator::Gt, two);
    let filter = arena.filter(seq, test);

    let compiled = compiler().compile(arena, filter)?;
    assert!(matches!(
        compiled.arena().kind(compiled.root()),
        ExprKind::Tail { start: 3 }
    ));
    Ok(())
}

#[test]
fn test_literal_base_with_value_comparison() -> TestResult {
    let mut arena = ExprArena::new();
    let base = arena.ints(&[10, 20, 30, 40]);
    let pos = arena.call(SystemFunction::Position, vec![]);
    let two = arena.int(2);
    let test = arena.value_compare(pos, ComparisonOperator::Gt, two);
    let filter = arena.filter(base, test);

    let compiled = compiler().compile(arena, filter)?;
    let out = compiled.evaluate(None, vec![])?;
    assert_eq!(as_ints(&out), vec![30, 40]);
    Ok(())
}

#[test]
fn test_comparand_from_optional_variable() -> TestResult {
    let mut arena = ExprArena::new();
    let seq = seq_ref(&mut arena);
    let pos = arena.call(SystemFunction::Position, vec![]);
    let opt = arena.global_ref("opt", quire::SequenceType::any());
    let test = arena.value_compare(pos, ComparisonOperator::Le, opt);
    let filter = arena.filter(seq, test);

    let compiled = compiler().compile(arena, filter)?;
    let some = compiled.evaluate(
        None,
        vec![("seq".into(), ints(&[5, 6, 7])), ("opt".into(), ints(&[2]))],
    )?;
    assert_eq!(as_ints(&some), vec![5, 6]);
    let none = compiled.evaluate(
        None,
        vec![("seq".into(), ints(&[5, 6, 7])), ("opt".into(), vec![])],
    )?;
    assert!(none.is_empty());
    Ok(())
}

fn operator() -> impl Strategy<Value = ComparisonOperator> {
    prop::sample::select(vec![
        ComparisonOperator::Eq,
        ComparisonOperator::Ne,
        ComparisonOperator::Lt,
        ComparisonOperator::Le,
        ComparisonOperator::Gt,
        ComparisonOperator::Ge,
    ])
}

/// `$seq[position() op N]` compiled with the positional rewrites and
/// compiled as a plain filter (the streaming setting keeps it one).
fn run_both(values: &[i64], op: ComparisonOperator, n: f64) -> (Vec<i64>, Vec<i64>) {
    let build = |arena: &mut ExprArena| {
        let seq = seq_ref(arena);
        let pos = arena.call(SystemFunction::Position, vec![]);
        let bound = arena.double(n);
        let test = arena.value_compare(pos, op, bound);
        arena.filter(seq, test)
    };
    let run = |config: CompilerConfig| {
        let mut arena = ExprArena::new();
        let root = build(&mut arena);
        let compiled = compiler_with(config).compile(arena, root).unwrap();
        let out = compiled
            .evaluate(None, vec![("seq".into(), ints(values))])
            .unwrap();
        as_ints(&out)
    };
    let rewritten = run(CompilerConfig::default());
    let plain = run(CompilerConfig::default().with_streaming(true));
    (rewritten, plain)
}

proptest! {
    #[test]
    fn test_positional_rewrites_agree_with_plain_filter(
        values in prop::collection::vec(0i64..100, 0..8),
        op in operator(),
        half_steps in -2i32..20,
    ) {
        let n = f64::from(half_steps) / 2.0;
        let (rewritten, plain) = run_both(&values, op, n);
        prop_assert_eq!(rewritten, plain);
    }
}

fn integer_comparand() -> impl Strategy<Value = i64> {
    prop_oneof![
        Just(i64::MIN),
        Just(i64::MIN + 1),
        Just(i64::MAX - 1),
        Just(i64::MAX),
        -3i64..12,
    ]
}

/// As `run_both`, with `N` read from a variable at run time. `$n` is
/// declared `xs:integer` and `$opt` is `xs:integer?`.
fn run_both_with_variable(
    values: &[i64],
    op: ComparisonOperator,
    name: &str,
    bound: Vec<i64>,
) -> (Result<Vec<i64>, String>, Result<Vec<i64>, String>) {
    let run = |config: CompilerConfig| {
        let mut arena = ExprArena::new();
        let seq = seq_ref(&mut arena);
        let pos = arena.call(SystemFunction::Position, vec![]);
        let comparand = arena.global_ref(name, quire::SequenceType::any());
        let test = arena.value_compare(pos, op, comparand);
        let root = arena.filter(seq, test);
        let compiled = compiler_with(config)
            .compile(arena, root)
            .map_err(|e| e.to_string())?;
        compiled
            .evaluate(
                None,
                vec![("seq".into(), ints(values)), (name.into(), ints(&bound))],
            )
            .map(|out| as_ints(&out))
            .map_err(|e| e.to_string())
    };
    let rewritten = run(CompilerConfig::default());
    let plain = run(CompilerConfig::default().with_streaming(true));
    (rewritten, plain)
}

proptest! {
    #[test]
    fn test_runtime_comparand_rewrites_agree_with_plain_filter(
        values in prop::collection::vec(0i64..100, 0..8),
        op in operator(),
        n in integer_comparand(),
    ) {
        let (rewritten, plain) = run_both_with_variable(&values, op, "n", vec![n]);
        prop_assert!(plain.is_ok(), "{:?}", plain);
        prop_assert_eq!(rewritten, plain);
    }

    #[test]
    fn test_optional_comparand_rewrites_agree_with_plain_filter(
        values in prop::collection::vec(0i64..100, 0..8),
        op in operator(),
        n in prop::option::of(integer_comparand()),
    ) {
        let bound: Vec<i64> = n.into_iter().collect();
        let (rewritten, plain) = run_both_with_variable(&values, op, "opt", bound);
        prop_assert!(plain.is_ok(), "{:?}", plain);
        prop_assert_eq!(rewritten, plain);
    }
}

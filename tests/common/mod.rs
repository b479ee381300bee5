use quire::{AtomicValue, Compiler, CompilerConfig, ExprArena, ExprId, Item, Sequence, SequenceType};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn ints(values: &[i64]) -> Sequence {
    values
        .iter()
        .map(|v| Item::from(AtomicValue::Integer(*v)))
        .collect()
}

pub fn as_ints(seq: &Sequence) -> Vec<i64> {
    seq.iter()
        .filter_map(|i| match i.as_atomic() {
            Some(AtomicValue::Integer(n)) => Some(*n),
            _ => None,
        })
        .collect()
}

/// A compiler with `$seq` declared as `xs:integer*`.
pub fn compiler() -> Compiler {
    compiler_with(CompilerConfig::default())
}

pub fn compiler_with(config: CompilerConfig) -> Compiler {
    let config = config
        .with_variable("seq", "xs:integer*")
        .with_variable("n", "xs:integer")
        .with_variable("opt", "xs:integer?");
    match Compiler::new(config) {
        Ok(c) => c,
        Err(e) => panic!("test configuration rejected: {}", e),
    }
}

pub fn seq_ref(arena: &mut ExprArena) -> ExprId {
    arena.global_ref("seq", SequenceType::any())
}

use indexmap::IndexMap;
use quire_expr::{
    CompilerConfig, DynamicContext, ExprArena, ExprId, RoleDiagnostic, SequenceIter,
    StaticContext, XResult, apply_function_conversion_rules, compile_passes,
};
use quire_types::SequenceType;
use quire_xdm::{Collation, Item, Sequence};

/// Drives the compile passes over parser-built expression trees.
#[derive(Debug, Clone)]
pub struct Compiler {
    context: StaticContext,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> XResult<Self> {
        Ok(Compiler {
            context: StaticContext::new(config)?,
        })
    }

    pub fn with_context(context: StaticContext) -> Self {
        Compiler { context }
    }

    pub fn context(&self) -> &StaticContext {
        &self.context
    }

    /// Runs simplify, type check and optimize over the tree at `root`.
    /// Any static error aborts the compilation.
    pub fn compile(&self, mut arena: ExprArena, root: ExprId) -> XResult<CompiledExpression> {
        log::trace!("Compiling expression tree of {} nodes", arena.len());
        let root = compile_passes(&mut arena, root, &self.context)?;
        debug_assert_eq!(arena.verify_parent_pointers(root), Ok(()));
        log::trace!("Compiled to {}", arena.kind(root).display_name());

        Ok(CompiledExpression {
            arena,
            root,
            globals: self.context.globals.clone(),
            collation: self.context.collation,
            backwards_compatible: self.context.config.backwards_compatible,
        })
    }
}

/// An optimized expression tree, ready to evaluate.
#[derive(Debug)]
pub struct CompiledExpression {
    arena: ExprArena,
    root: ExprId,
    globals: IndexMap<String, SequenceType>,
    collation: Collation,
    backwards_compatible: bool,
}

impl CompiledExpression {
    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn root(&self) -> ExprId {
        self.root
    }

    pub fn static_type(&self) -> SequenceType {
        SequenceType::new(self.arena.item_type(self.root), self.arena.cardinality(self.root))
    }

    pub fn explain(&self) -> XResult<String> {
        quire_expr::explain(&self.arena, self.root)
    }

    /// Sets up the dynamic context. Supplied variable values are converted
    /// to their declared types with the function conversion rules.
    pub fn dynamic_context(
        &self,
        context_item: Option<Item>,
        variables: impl IntoIterator<Item = (String, Sequence)>,
    ) -> XResult<DynamicContext<'_>> {
        let mut ctx = DynamicContext::new(&self.arena)
            .with_collation(self.collation)
            .with_backwards_compatible(self.backwards_compatible);
        if let Some(item) = context_item {
            ctx = ctx.with_context_item(item);
        }
        for (name, value) in variables {
            let value = match self.globals.get(&name) {
                Some(declared) => {
                    let role = RoleDiagnostic::variable(name.clone());
                    let input: SequenceIter<'_> = Box::new(value.into_iter().map(Ok));
                    apply_function_conversion_rules(input, declared, &role)
                        .collect::<XResult<Sequence>>()?
                }
                None => value,
            };
            ctx = ctx.with_global(name, value);
        }
        Ok(ctx)
    }

    pub fn evaluate(
        &self,
        context_item: Option<Item>,
        variables: impl IntoIterator<Item = (String, Sequence)>,
    ) -> XResult<Sequence> {
        self.dynamic_context(context_item, variables)?
            .evaluate(self.root)
    }

    pub fn effective_boolean(
        &self,
        context_item: Option<Item>,
        variables: impl IntoIterator<Item = (String, Sequence)>,
    ) -> XResult<bool> {
        self.dynamic_context(context_item, variables)?
            .effective_boolean(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_xdm::AtomicValue;

    #[test]
    fn test_compile_and_evaluate() {
        let config = CompilerConfig::default().with_variable("n", "xs:integer");
        let compiler = Compiler::new(config).unwrap();
        let mut arena = ExprArena::new();
        let n = arena.global_ref("n", SequenceType::any());
        let one = arena.int(1);
        let sum = arena.arith(n, quire_xdm::ArithmeticOperator::Plus, one);
        let compiled = compiler.compile(arena, sum).unwrap();
        let out = compiled
            .evaluate(None, vec![("n".to_string(), vec![Item::from(AtomicValue::Integer(41))])])
            .unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Integer(42)));
        assert_eq!(compiled.static_type().to_string(), "xs:integer");
    }

    #[test]
    fn test_supplied_value_is_converted_to_declared_type() {
        let config = CompilerConfig::default().with_variable("d", "xs:double");
        let compiler = Compiler::new(config).unwrap();
        let mut arena = ExprArena::new();
        let d = arena.global_ref("d", SequenceType::any());
        let compiled = compiler.compile(arena, d).unwrap();
        let out = compiled
            .evaluate(None, vec![("d".to_string(), vec![Item::from(AtomicValue::untyped("2.5"))])])
            .unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Double(2.5)));

        let err = compiled
            .evaluate(None, vec![("d".to_string(), vec![])])
            .unwrap_err();
        assert_eq!(err.code(), Some("XPTY0004"));
    }

    #[test]
    fn test_compile_matches_the_pass_pipeline() {
        let config = CompilerConfig::default().with_variable("s", "xs:integer*");
        let compiler = Compiler::new(config).unwrap();
        let build = |arena: &mut ExprArena| {
            let s = arena.global_ref("s", SequenceType::any());
            let pos = arena.call(quire_expr::SystemFunction::Position, vec![]);
            let two = arena.int(2);
            let test = arena.value_compare(pos, quire_xdm::ComparisonOperator::Gt, two);
            arena.filter(s, test)
        };

        let mut arena = ExprArena::new();
        let root = build(&mut arena);
        let compiled = compiler.compile(arena, root).unwrap();

        let mut arena = ExprArena::new();
        let root = build(&mut arena);
        let root = compile_passes(&mut arena, root, compiler.context()).unwrap();

        assert_eq!(
            compiled.explain().unwrap(),
            quire_expr::explain(&arena, root).unwrap()
        );
        assert_eq!(compiled.arena().verify_parent_pointers(compiled.root()), Ok(()));
    }

    #[test]
    fn test_bad_collation_is_a_config_error() {
        let config = CompilerConfig::default().with_default_collation("urn:nowhere");
        assert!(Compiler::new(config).is_err());
    }
}

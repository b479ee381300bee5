//! Constructors for the node kinds, shaped the way a parser hands trees
//! to the compiler: operands in place, nothing type-checked yet.

use crate::arena::{ExprArena, ExprId, VariableId};
use crate::error::XResult;
use crate::functions::{FunctionLibrary, SystemFunction};
use crate::kind::{
    CastSpec, ComparisonShape, EvaluationMode, ExprKind, FilterFlags, ForBinding, LetBinding,
    VariableReference, VariableTarget,
};
use quire_types::{AtomicType, ItemType, SequenceType};
use quire_xdm::{ArithmeticOperator, AtomicValue, ComparisonOperator, Item, Sequence};

impl ExprArena {
    pub fn literal(&mut self, seq: Sequence) -> ExprId {
        self.alloc(ExprKind::Literal(seq), vec![])
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.literal(vec![Item::from(AtomicValue::Integer(value))])
    }

    pub fn ints(&mut self, values: &[i64]) -> ExprId {
        let seq = values
            .iter()
            .map(|v| Item::from(AtomicValue::Integer(*v)))
            .collect();
        self.literal(seq)
    }

    pub fn double(&mut self, value: f64) -> ExprId {
        self.literal(vec![Item::from(AtomicValue::Double(value))])
    }

    pub fn string(&mut self, value: &str) -> ExprId {
        self.literal(vec![Item::from(AtomicValue::string(value))])
    }

    pub fn strings(&mut self, values: &[&str]) -> ExprId {
        let seq = values
            .iter()
            .map(|v| Item::from(AtomicValue::string(*v)))
            .collect();
        self.literal(seq)
    }

    pub fn boolean(&mut self, value: bool) -> ExprId {
        self.literal(vec![Item::from(AtomicValue::Boolean(value))])
    }

    pub fn empty(&mut self) -> ExprId {
        self.literal(Vec::new())
    }

    pub fn context_item(&mut self) -> ExprId {
        self.alloc(
            ExprKind::ContextItem {
                item_type: ItemType::AnyItem,
            },
            vec![],
        )
    }

    /// Reference to an external variable. The declared type is normally
    /// filled in from the static context during type checking.
    pub fn global_ref(&mut self, name: &str, static_type: SequenceType) -> ExprId {
        self.alloc(
            ExprKind::VarRef(VariableReference {
                name: name.to_string(),
                target: VariableTarget::Global,
                static_type,
                in_loop: false,
            }),
            vec![],
        )
    }

    pub fn local_ref(&mut self, var: VariableId, name: &str) -> ExprId {
        self.local_ref_typed(var, name, SequenceType::any())
    }

    pub fn local_ref_typed(&mut self, var: VariableId, name: &str, static_type: SequenceType) -> ExprId {
        self.alloc(
            ExprKind::VarRef(VariableReference {
                name: name.to_string(),
                target: VariableTarget::Local(var),
                static_type,
                in_loop: false,
            }),
            vec![],
        )
    }

    /// `let $name := seq return action`. References to `var` inside
    /// `action` are recorded on the binding.
    pub fn let_binding(&mut self, var: VariableId, name: &str, seq: ExprId, action: ExprId) -> ExprId {
        self.let_with(var, name, None, seq, action)
    }

    /// `let $name as required := seq return action`.
    pub fn let_typed(
        &mut self,
        var: VariableId,
        name: &str,
        required: SequenceType,
        seq: ExprId,
        action: ExprId,
    ) -> ExprId {
        self.let_with(var, name, Some(required), seq, action)
    }

    fn let_with(
        &mut self,
        var: VariableId,
        name: &str,
        required: Option<SequenceType>,
        seq: ExprId,
        action: ExprId,
    ) -> ExprId {
        let binding = LetBinding {
            var,
            name: name.to_string(),
            required,
            mode: EvaluationMode::default(),
            indexed: false,
            references: Vec::new(),
        };
        let id = self.alloc(ExprKind::Let(binding), vec![seq, action]);
        self.rebuild_reference_lists(id);
        id
    }

    /// `for $name in seq return action`.
    pub fn for_each(&mut self, var: VariableId, name: &str, seq: ExprId, action: ExprId) -> ExprId {
        let binding = ForBinding {
            var,
            name: name.to_string(),
        };
        self.alloc(ExprKind::For(binding), vec![seq, action])
    }

    pub fn call(&mut self, function: SystemFunction, args: Vec<ExprId>) -> ExprId {
        self.alloc(ExprKind::FunctionCall(function), args)
    }

    /// Resolves `name` against `library` and builds the call.
    pub fn call_named(
        &mut self,
        library: &FunctionLibrary,
        name: &str,
        args: Vec<ExprId>,
    ) -> XResult<ExprId> {
        let function = library.resolve(name, args.len())?;
        Ok(self.call(function, args))
    }

    pub fn arith(&mut self, left: ExprId, op: ArithmeticOperator, right: ExprId) -> ExprId {
        self.alloc(ExprKind::Arithmetic(op), vec![left, right])
    }

    pub fn negate(&mut self, operand: ExprId) -> ExprId {
        self.alloc(ExprKind::Negate, vec![operand])
    }

    pub fn value_compare(&mut self, left: ExprId, op: ComparisonOperator, right: ExprId) -> ExprId {
        self.alloc(
            ExprKind::ValueComparison {
                op,
                result_when_empty: None,
            },
            vec![left, right],
        )
    }

    pub fn general_compare(&mut self, left: ExprId, op: ComparisonOperator, right: ExprId) -> ExprId {
        self.alloc(
            ExprKind::GeneralComparison {
                op,
                shape: ComparisonShape::default(),
                done_warnings: false,
            },
            vec![left, right],
        )
    }

    pub fn and(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.alloc(ExprKind::And, vec![left, right])
    }

    pub fn or(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.alloc(ExprKind::Or, vec![left, right])
    }

    pub fn filter(&mut self, base: ExprId, predicate: ExprId) -> ExprId {
        self.alloc(ExprKind::Filter(FilterFlags::default()), vec![base, predicate])
    }

    pub fn range(&mut self, from: ExprId, to: ExprId) -> ExprId {
        self.alloc(ExprKind::Range, vec![from, to])
    }

    /// `from to to` over integer literals.
    pub fn range_of(&mut self, from: i64, to: i64) -> ExprId {
        let a = self.int(from);
        let b = self.int(to);
        self.range(a, b)
    }

    pub fn block(&mut self, children: Vec<ExprId>) -> ExprId {
        self.alloc(ExprKind::Block, children)
    }

    pub fn conditional(&mut self, condition: ExprId, then: ExprId, otherwise: ExprId) -> ExprId {
        self.alloc(ExprKind::Conditional, vec![condition, then, otherwise])
    }

    /// `try { body } catch codes { handler }...`; a `None` code catches
    /// every error.
    pub fn try_catch(&mut self, body: ExprId, handlers: Vec<(Option<String>, ExprId)>) -> ExprId {
        let (catch_codes, mut children): (Vec<_>, Vec<_>) = handlers.into_iter().unzip();
        children.insert(0, body);
        self.alloc(ExprKind::TryCatch { catch_codes }, children)
    }

    pub fn simple_map(&mut self, select: ExprId, action: ExprId) -> ExprId {
        self.alloc(ExprKind::SimpleMap, vec![select, action])
    }

    pub fn cast(&mut self, operand: ExprId, target: AtomicType, allows_empty: bool) -> ExprId {
        self.alloc(
            ExprKind::Cast(CastSpec {
                target,
                allows_empty,
                converter: None,
            }),
            vec![operand],
        )
    }

    pub fn instance_of(&mut self, operand: ExprId, sequence_type: SequenceType) -> ExprId {
        self.alloc(ExprKind::InstanceOf(sequence_type), vec![operand])
    }
}

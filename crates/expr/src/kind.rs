//! The closed catalogue of expression kinds.
//!
//! Each variant carries its kind-specific payload; children live in the
//! node's operand list, in the order documented on the variant.

use crate::arena::{ExprId, VariableId};
use crate::functions::SystemFunction;
use crate::operand::OperandRole;
use crate::role::RoleDiagnostic;
use quire_types::{AtomicType, Cardinality, FunctionType, ItemType, SequenceType};
use quire_xdm::{ArithmeticOperator, ComparisonOperator, Converter, Sequence};
use std::fmt;

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A constant sequence.
    Literal(Sequence),
    /// `.`; the item type is filled in from the static context.
    ContextItem { item_type: ItemType },
    VarRef(VariableReference),
    /// Operands: sequence, action.
    Let(LetBinding),
    /// Operands: sequence, action.
    For(ForBinding),
    /// Operands: the arguments.
    FunctionCall(SystemFunction),
    /// Operands: left, right.
    Arithmetic(ArithmeticOperator),
    Negate,
    /// Operands: left, right.
    ValueComparison {
        op: ComparisonOperator,
        /// Result to deliver when either operand is empty, instead of `()`.
        result_when_empty: Option<bool>,
    },
    /// Operands: left, right.
    GeneralComparison {
        op: ComparisonOperator,
        shape: ComparisonShape,
        done_warnings: bool,
    },
    And,
    Or,
    /// Operands: base, predicate.
    Filter(FilterFlags),
    FirstItem,
    LastItem,
    /// Operands: base, index (1-based).
    Subscript,
    /// All items of the operand from 1-based position `start` onwards.
    Tail { start: usize },
    /// `value = (min to max)`. Operands: value, min, max.
    IntegerRangeTest,
    /// `min to max`.
    Range,
    /// The comma operator.
    Block,
    /// Operands: condition, then, else.
    Conditional,
    /// Operands: the guarded body, then one handler per entry of
    /// `catch_codes`. A `None` code catches every error.
    TryCatch { catch_codes: Vec<Option<String>> },
    /// `lhs ! rhs`.
    SimpleMap,
    Cast(CastSpec),
    InstanceOf(SequenceType),
    ItemChecker {
        required: ItemType,
        role: RoleDiagnostic,
    },
    CardinalityChecker {
        required: Cardinality,
        role: RoleDiagnostic,
    },
    Atomizer,
    /// Casts untyped atomic items to `target`; other items pass unchanged.
    UntypedConverter { target: AtomicType },
    /// Numeric promotion (or anyURI to string) to `target`.
    AtomicConverter { target: AtomicType },
    FunctionCoercer {
        required: FunctionType,
        role: RoleDiagnostic,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableReference {
    pub name: String,
    pub target: VariableTarget,
    pub static_type: SequenceType,
    /// Set when the reference is evaluated repeatedly relative to its binding.
    pub in_loop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableTarget {
    Local(VariableId),
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Evaluated in full when the binding is entered.
    Eager,
    /// Evaluated on first read; items are memoised for later readers.
    #[default]
    Lazy,
    /// Evaluated in full and retained for index lookups.
    Materialized,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvaluationMode::Eager => "eager",
            EvaluationMode::Lazy => "lazy",
            EvaluationMode::Materialized => "indexed",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub var: VariableId,
    pub name: String,
    /// Declared type, checked without implicit conversion.
    pub required: Option<SequenceType>,
    pub mode: EvaluationMode,
    /// The variable is used to build an index, which forces materialisation.
    pub indexed: bool,
    /// Reference sites last seen bound to this variable. Lists of length
    /// 0 or 1 are provisional and re-verified before they are acted on.
    pub references: Vec<ExprId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForBinding {
    pub var: VariableId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonShape {
    OneToOne,
    ManyToOne,
    #[default]
    ManyToMany,
}

impl fmt::Display for ComparisonShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComparisonShape::OneToOne => "one-to-one",
            ComparisonShape::ManyToOne => "many-to-one",
            ComparisonShape::ManyToMany => "many-to-many",
        })
    }
}

/// Facts about a filter's predicate, derived during type checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterFlags {
    /// The predicate may depend on position or size, or may be numeric.
    pub positional: bool,
    /// The predicate always yields exactly one boolean.
    pub singleton_boolean: bool,
    /// The predicate does not depend on the focus at all.
    pub independent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastSpec {
    pub target: AtomicType,
    pub allows_empty: bool,
    /// Chosen during type checking when the source type is known.
    pub converter: Option<Converter>,
}

impl ExprKind {
    pub fn is_literal(&self) -> bool {
        matches!(self, ExprKind::Literal(_))
    }

    /// Role of operand `index` for a node of this kind with `count` operands.
    pub fn operand_role(&self, index: usize, count: usize) -> OperandRole {
        let _ = count;
        match self {
            ExprKind::Let(_) => OperandRole::SAME_FOCUS_ACTION,
            ExprKind::For(_) => {
                if index == 0 {
                    OperandRole::FOCUS_CONTROLLING_SELECT
                } else {
                    OperandRole::REPEATED_ACTION
                }
            }
            ExprKind::Filter(_) => {
                if index == 0 {
                    OperandRole::FOCUS_CONTROLLING_SELECT
                } else {
                    OperandRole::PREDICATE
                }
            }
            ExprKind::SimpleMap => {
                if index == 0 {
                    OperandRole::FOCUS_CONTROLLING_SELECT
                } else {
                    OperandRole::FOCUS_CONTROLLED_ACTION
                }
            }
            ExprKind::FunctionCall(f) => f.operand_role(index),
            ExprKind::Arithmetic(_)
            | ExprKind::Negate
            | ExprKind::ValueComparison { .. }
            | ExprKind::GeneralComparison { .. }
            | ExprKind::IntegerRangeTest
            | ExprKind::Range
            | ExprKind::Cast(_)
            | ExprKind::Atomizer => OperandRole::ABSORB,
            ExprKind::And | ExprKind::Or | ExprKind::InstanceOf(_) => OperandRole::INSPECT,
            ExprKind::Conditional => {
                if index == 0 {
                    OperandRole::INSPECT
                } else {
                    OperandRole::SAME_FOCUS_ACTION
                }
            }
            ExprKind::Subscript => {
                if index == 0 {
                    OperandRole::FOCUS_CONTROLLING_SELECT
                } else {
                    OperandRole::ABSORB
                }
            }
            ExprKind::FirstItem | ExprKind::LastItem | ExprKind::Tail { .. } => {
                OperandRole::FOCUS_CONTROLLING_SELECT
            }
            _ => OperandRole::SAME_FOCUS_ACTION,
        }
    }

    /// True for kinds evaluated as a single item rather than iterated.
    pub fn evaluates_singly(&self) -> bool {
        match self {
            ExprKind::ContextItem { .. }
            | ExprKind::Arithmetic(_)
            | ExprKind::Negate
            | ExprKind::ValueComparison { .. }
            | ExprKind::GeneralComparison { .. }
            | ExprKind::And
            | ExprKind::Or
            | ExprKind::FirstItem
            | ExprKind::LastItem
            | ExprKind::Subscript
            | ExprKind::IntegerRangeTest
            | ExprKind::Cast(_)
            | ExprKind::InstanceOf(_) => true,
            ExprKind::FunctionCall(f) => f.is_singleton_valued(),
            _ => false,
        }
    }

    /// Short name used in diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            ExprKind::Literal(_) => "literal".to_string(),
            ExprKind::ContextItem { .. } => ".".to_string(),
            ExprKind::VarRef(r) => format!("${}", r.name),
            ExprKind::Let(b) => format!("let ${}", b.name),
            ExprKind::For(b) => format!("for ${}", b.name),
            ExprKind::FunctionCall(f) => format!("{}()", f.name()),
            ExprKind::Arithmetic(op) => op.symbol().to_string(),
            ExprKind::Negate => "unary minus".to_string(),
            ExprKind::ValueComparison { op, .. } => op.value_symbol().to_string(),
            ExprKind::GeneralComparison { op, .. } => op.general_symbol().to_string(),
            ExprKind::And => "and".to_string(),
            ExprKind::Or => "or".to_string(),
            ExprKind::Filter(_) => "filter".to_string(),
            ExprKind::FirstItem => "first item".to_string(),
            ExprKind::LastItem => "last item".to_string(),
            ExprKind::Subscript => "subscript".to_string(),
            ExprKind::Tail { .. } => "tail".to_string(),
            ExprKind::IntegerRangeTest => "integer range test".to_string(),
            ExprKind::Range => "to".to_string(),
            ExprKind::Block => ",".to_string(),
            ExprKind::Conditional => "if".to_string(),
            ExprKind::TryCatch { .. } => "try".to_string(),
            ExprKind::SimpleMap => "!".to_string(),
            ExprKind::Cast(_) => "cast as".to_string(),
            ExprKind::InstanceOf(_) => "instance of".to_string(),
            ExprKind::ItemChecker { .. } => "treat as".to_string(),
            ExprKind::CardinalityChecker { .. } => "cardinality check".to_string(),
            ExprKind::Atomizer => "data".to_string(),
            ExprKind::UntypedConverter { .. } => "untyped conversion".to_string(),
            ExprKind::AtomicConverter { .. } => "promotion".to_string(),
            ExprKind::FunctionCoercer { .. } => "function coercion".to_string(),
        }
    }
}

//! Static properties of an expression: cardinality, item type, context
//! dependencies and a few special flags. Computed bottom-up on first read
//! and cached on the node until the subtree changes.

use crate::arena::{ExprArena, ExprId};
use crate::kind::{ExprKind, VariableTarget};
use bitflags::bitflags;
use quire_types::{AtomicType, Cardinality, ItemType, NodeTest};
use quire_xdm::{Item, Sequence, arith};

bitflags! {
    /// Parts of the dynamic context an expression reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Dependencies: u8 {
        const CONTEXT_ITEM = 1 << 0;
        const POSITION = 1 << 1;
        const LAST = 1 << 2;
        const LOCAL_VARIABLES = 1 << 3;
        const FOCUS = Self::CONTEXT_ITEM.bits() | Self::POSITION.bits() | Self::LAST.bits();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpecialProperties: u8 {
        /// Evaluation may raise an error on purpose (`fn:error`), so the
        /// expression must not be moved or evaluated speculatively.
        const HAS_SIDE_EFFECTS = 1 << 0;
    }
}

bitflags! {
    /// Which evaluation entry points a node implements natively.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImplementationMethod: u8 {
        const EVALUATE = 1 << 0;
        const ITERATE = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticProperties {
    pub cardinality: Cardinality,
    pub item_type: ItemType,
    pub dependencies: Dependencies,
    pub special: SpecialProperties,
    pub implementation: ImplementationMethod,
}

impl StaticProperties {
    pub fn is_focus_independent(&self) -> bool {
        !self.dependencies.intersects(Dependencies::FOCUS)
    }
}

/// Static item type of a single runtime item.
pub fn item_type_of(item: &Item) -> ItemType {
    match item {
        Item::Atomic(a) => ItemType::Atomic(a.atomic_type()),
        Item::Node(n) => match &n.name {
            Some(name) => ItemType::Node(NodeTest::named(n.kind, name.clone())),
            None => ItemType::Node(NodeTest::kind(n.kind)),
        },
        Item::Function(f) => ItemType::Function(f.function_type.clone()),
    }
}

pub fn sequence_item_type(seq: &Sequence) -> ItemType {
    seq.iter()
        .map(item_type_of)
        .reduce(|a, b| a.common_supertype(&b))
        .unwrap_or(ItemType::Error)
}

/// Common supertype of alternative results, ignoring alternatives that
/// are statically empty.
fn choice_type<'a>(alternatives: impl Iterator<Item = &'a StaticProperties>) -> ItemType {
    alternatives
        .filter(|p| p.cardinality != Cardinality::Empty)
        .map(|p| p.item_type.clone())
        .reduce(|a, b| a.common_supertype(&b))
        .unwrap_or(ItemType::Error)
}

/// The type an arithmetic operand has once untyped values are cast to
/// double.
pub(crate) fn numeric_operand_type(t: &ItemType) -> ItemType {
    match t {
        ItemType::Atomic(AtomicType::UntypedAtomic) => ItemType::Atomic(AtomicType::Double),
        ItemType::Union(ms) => ItemType::union(ms.iter().map(|m| {
            if *m == AtomicType::UntypedAtomic {
                AtomicType::Double
            } else {
                *m
            }
        })),
        other => other.clone(),
    }
}

fn replace_member(t: &ItemType, from: impl Fn(AtomicType) -> bool, to: AtomicType) -> ItemType {
    match t.atomic_members() {
        Some(ms) if !t.is_error() => {
            ItemType::union(ms.iter().map(|m| if from(*m) { to } else { *m }))
        }
        _ => t.clone(),
    }
}

pub(crate) fn compute(arena: &ExprArena, id: ExprId) -> StaticProperties {
    let kind = arena.kind(id);
    let ops: Vec<&StaticProperties> = arena
        .operands(id)
        .iter()
        .map(|o| arena.props(o.child))
        .collect();
    let (item_type, cardinality) = type_of(kind, &ops);

    let mut dependencies = intrinsic_dependencies(kind);
    let mut special = SpecialProperties::empty();
    for (op, p) in arena.operands(id).iter().zip(&ops) {
        let mut deps = p.dependencies;
        if op.role.masks_focus() {
            deps.remove(Dependencies::FOCUS);
        }
        dependencies |= deps;
        special |= p.special;
    }
    if let ExprKind::FunctionCall(f) = kind
        && f.has_side_effects()
    {
        special |= SpecialProperties::HAS_SIDE_EFFECTS;
    }
    let implementation = if kind.evaluates_singly() {
        ImplementationMethod::EVALUATE | ImplementationMethod::ITERATE
    } else {
        ImplementationMethod::ITERATE
    };
    StaticProperties {
        cardinality,
        item_type,
        dependencies,
        special,
        implementation,
    }
}

fn intrinsic_dependencies(kind: &ExprKind) -> Dependencies {
    match kind {
        ExprKind::ContextItem { .. } => Dependencies::CONTEXT_ITEM,
        ExprKind::VarRef(r) => match r.target {
            VariableTarget::Local(_) => Dependencies::LOCAL_VARIABLES,
            VariableTarget::Global => Dependencies::empty(),
        },
        ExprKind::FunctionCall(f) => f.intrinsic_dependencies(),
        _ => Dependencies::empty(),
    }
}

fn type_of(
    kind: &ExprKind,
    ops: &[&StaticProperties],
) -> (ItemType, Cardinality) {
    use Cardinality::*;
    let op = |i: usize| ops[i];
    match kind {
        ExprKind::Literal(seq) => (sequence_item_type(seq), Cardinality::for_count(seq.len())),
        ExprKind::ContextItem { item_type } => (item_type.clone(), ExactlyOne),
        ExprKind::VarRef(r) => (r.static_type.item_type.clone(), r.static_type.cardinality),
        ExprKind::Let(_) => (op(1).item_type.clone(), op(1).cardinality),
        ExprKind::For(_) => (
            op(1).item_type.clone(),
            op(0).cardinality.multiply(op(1).cardinality),
        ),
        ExprKind::FunctionCall(f) => f.result_type(ops),
        ExprKind::Arithmetic(o) => {
            let a = numeric_operand_type(&op(0).item_type);
            let b = numeric_operand_type(&op(1).item_type);
            let t = match (a.as_atomic(), b.as_atomic()) {
                (Some(x), Some(y)) => arith::arithmetic_result_type(x, *o, y)
                    .map(ItemType::Atomic)
                    .unwrap_or_else(ItemType::any_atomic),
                _ if a.is_numeric() && b.is_numeric() => ItemType::numeric(),
                _ => ItemType::any_atomic(),
            };
            (t, singleton_result(&[op(0), op(1)]))
        }
        ExprKind::Negate => {
            let a = numeric_operand_type(&op(0).item_type);
            let t = if a.is_numeric() { a } else { ItemType::numeric() };
            (t, singleton_result(&[op(0)]))
        }
        ExprKind::ValueComparison {
            result_when_empty, ..
        } => {
            let card = if result_when_empty.is_some() {
                ExactlyOne
            } else {
                singleton_result(&[op(0), op(1)])
            };
            (ItemType::Atomic(AtomicType::Boolean), card)
        }
        ExprKind::GeneralComparison { .. }
        | ExprKind::And
        | ExprKind::Or
        | ExprKind::InstanceOf(_)
        | ExprKind::IntegerRangeTest => (ItemType::Atomic(AtomicType::Boolean), ExactlyOne),
        ExprKind::Filter(flags) => {
            let base = op(0);
            let card = if base.cardinality == Empty {
                Empty
            } else if base.cardinality.allows_many() && !is_numeric_singleton(op(1), flags) {
                ZeroOrMore
            } else {
                ZeroOrOne
            };
            (base.item_type.clone(), card)
        }
        ExprKind::FirstItem | ExprKind::LastItem => {
            let base = op(0);
            let card = match base.cardinality {
                Empty => Empty,
                c if c.allows_zero() => ZeroOrOne,
                _ => ExactlyOne,
            };
            (base.item_type.clone(), card)
        }
        ExprKind::Subscript => {
            let base = op(0);
            let card = if base.cardinality == Empty { Empty } else { ZeroOrOne };
            (base.item_type.clone(), card)
        }
        ExprKind::Tail { start } => {
            let base = op(0);
            let card = if *start <= 1 {
                base.cardinality
            } else if base.cardinality.allows_many() {
                ZeroOrMore
            } else {
                Empty
            };
            (base.item_type.clone(), card)
        }
        ExprKind::Range => (ItemType::Atomic(AtomicType::Integer), ZeroOrMore),
        ExprKind::Block => {
            let card = ops.iter().fold(Empty, |acc, p| acc.sum(p.cardinality));
            (choice_type(ops.iter().copied()), card)
        }
        ExprKind::Conditional => (
            choice_type(ops[1..].iter().copied()),
            op(1).cardinality.choice(op(2).cardinality),
        ),
        ExprKind::TryCatch { .. } => {
            let card = ops[1..]
                .iter()
                .fold(op(0).cardinality, |acc, p| acc.choice(p.cardinality));
            (choice_type(ops.iter().copied()), card)
        }
        ExprKind::SimpleMap => (
            op(1).item_type.clone(),
            op(0).cardinality.multiply(op(1).cardinality),
        ),
        ExprKind::Cast(spec) => {
            let card = if op(0).cardinality == Empty && spec.allows_empty {
                Empty
            } else if spec.allows_empty {
                ZeroOrOne
            } else {
                ExactlyOne
            };
            (ItemType::Atomic(spec.target), card)
        }
        ExprKind::ItemChecker { required, .. } => {
            let supplied = &op(0).item_type;
            let t = if supplied.is_subtype(required) {
                supplied.clone()
            } else {
                required.clone()
            };
            (t, op(0).cardinality)
        }
        ExprKind::CardinalityChecker { required, .. } => (
            op(0).item_type.clone(),
            op(0).cardinality.intersect(*required).unwrap_or(*required),
        ),
        ExprKind::Atomizer => (op(0).item_type.atomized_type(), op(0).cardinality),
        ExprKind::UntypedConverter { target } => (
            replace_member(&op(0).item_type, |m| m == AtomicType::UntypedAtomic, *target),
            op(0).cardinality,
        ),
        ExprKind::AtomicConverter { target } => {
            let target = *target;
            let promotable = move |m: AtomicType| match target {
                AtomicType::Double => m.is_numeric(),
                AtomicType::Float => m.is_numeric() && m != AtomicType::Double,
                AtomicType::String => m == AtomicType::AnyUri,
                _ => false,
            };
            (
                replace_member(&op(0).item_type, promotable, target),
                op(0).cardinality,
            )
        }
        ExprKind::FunctionCoercer { required, .. } => {
            (ItemType::Function(required.clone()), op(0).cardinality)
        }
    }
}

/// `ExactlyOne` when every operand is exactly one item, else `ZeroOrOne`.
fn singleton_result(ops: &[&StaticProperties]) -> Cardinality {
    if ops.iter().any(|p| p.cardinality == Cardinality::Empty) {
        Cardinality::Empty
    } else if ops.iter().all(|p| !p.cardinality.allows_zero()) {
        Cardinality::ExactlyOne
    } else {
        Cardinality::ZeroOrOne
    }
}

fn is_numeric_singleton(pred: &StaticProperties, flags: &crate::kind::FilterFlags) -> bool {
    flags.positional
        && pred.is_focus_independent()
        && pred.cardinality == Cardinality::ExactlyOne
        && pred.item_type.is_numeric()
}

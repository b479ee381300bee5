//! Filter expressions `E[P]` and the item-access forms the optimizer
//! reduces them to.

use crate::arena::ExprId;
use crate::error::XResult;
use crate::eval::effective_boolean_value;
use crate::functions::SystemFunction;
use crate::kind::{ExprKind, FilterFlags};
use crate::kinds::{
    evaluate_early, is_call, is_compile_time_constant, literal_boolean,
    literal_number, literal_value, make_literal, replace,
};
use crate::promotion;
use crate::properties::{Dependencies, SpecialProperties, StaticProperties};
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{AtomicType, Cardinality, ItemType, Relation};
use quire_xdm::{ArithmeticOperator, ComparisonOperator};

/// Derives the predicate facts recorded on a filter node.
pub fn predicate_flags(props: &StaticProperties) -> FilterFlags {
    let may_be_numeric =
        ItemType::numeric().relationship(&props.item_type) != Relation::Disjoint;
    FilterFlags {
        positional: may_be_numeric
            || props
                .dependencies
                .intersects(Dependencies::POSITION | Dependencies::LAST),
        singleton_boolean: props.item_type == ItemType::atomic(AtomicType::Boolean)
            && props.cardinality == Cardinality::ExactlyOne,
        independent: props.is_focus_independent(),
    }
}

fn refresh_flags(v: &mut ExpressionVisitor<'_>, id: ExprId) {
    let predicate = v.arena().operand(id, 1);
    let flags = predicate_flags(v.arena().props(predicate));
    if let ExprKind::Filter(current) = v.arena().kind(id)
        && *current != flags
    {
        v.arena_mut().set_kind(id, ExprKind::Filter(flags));
    }
}

pub fn type_check(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    let base = v.type_check_operand(id, 0, info)?;
    if v.arena().cardinality(base) == Cardinality::Empty {
        return Ok(replace(v, id, base));
    }
    let predicate = v.type_check_operand(id, 1, info)?;
    let props = v.arena().props(predicate);
    if ItemType::numeric().relationship(&props.item_type) == Relation::Disjoint
        && !predicate_flags(props).singleton_boolean
    {
        let call = v
            .arena_mut()
            .wrap(predicate, ExprKind::FunctionCall(SystemFunction::Boolean));
        v.arena_mut().replace_operand(id, 1, call);
    }
    refresh_flags(v, id);
    Ok(id)
}

pub fn optimize(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    let base = v.optimize_operand(id, 0, info)?;
    if v.arena().cardinality(base) == Cardinality::Empty {
        return Ok(replace(v, id, base));
    }
    let predicate = v.optimize_operand(id, 1, info)?;
    refresh_flags(v, id);

    if let Some(new) = constant_predicate(v, id, base, predicate)? {
        return Ok(new);
    }
    if is_call(v.arena(), predicate, SystemFunction::Last) {
        let new = match literal_value(v.arena(), base) {
            Some(items) => {
                let last = items.len() as i64;
                let index = v.arena_mut().int(last);
                v.arena_mut().alloc(ExprKind::Subscript, vec![base, index])
            }
            None => v.arena_mut().alloc(ExprKind::LastItem, vec![base]),
        };
        v.trace(|| "Rewrote [last()] as direct item access".to_string());
        return Ok(replace(v, id, new));
    }
    if !v.config().optimize_for_streaming
        && let Some(new) = positional_rewrite(v, id, base, predicate)?
    {
        let new = replace(v, id, new);
        return v.optimize(new, info);
    }
    if let Some(new) = split_conjunction(v, id, base, predicate) {
        let new = replace(v, id, new);
        return v.optimize(new, info);
    }

    let id = promotion::promote_loop_invariants(v, id)?;
    if !matches!(v.arena().kind(id), ExprKind::Filter(_)) {
        return Ok(id);
    }
    let base = v.arena().operand(id, 0);
    if v.arena().kind(base).is_literal() && is_compile_time_constant(v.arena(), id) {
        match evaluate_early(v, id) {
            Ok(seq) => {
                v.trace(|| "Evaluated filter over a literal at compile time".to_string());
                return Ok(make_literal(v, id, seq));
            }
            Err(e) => log::debug!("Abandoned early evaluation of filter: {}", e),
        }
    }
    Ok(id)
}

/// Predicates whose value does not depend on the item being tested:
/// literals, and numeric singletons that select a single position.
fn constant_predicate(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    base: ExprId,
    predicate: ExprId,
) -> XResult<Option<ExprId>> {
    if let Some(b) = literal_boolean(v.arena(), predicate) {
        let new = if b { base } else { v.arena_mut().empty() };
        return Ok(Some(replace(v, id, new)));
    }
    if let Some(n) = literal_number(v.arena(), predicate) {
        let new = if n == 1.0 {
            v.arena_mut().alloc(ExprKind::FirstItem, vec![base])
        } else if n < 1.0 || n.fract() != 0.0 || !n.is_finite() {
            v.arena_mut().empty()
        } else {
            v.arena_mut().alloc(ExprKind::Subscript, vec![base, predicate])
        };
        v.trace(|| format!("Rewrote numeric predicate [{}]", n));
        return Ok(Some(replace(v, id, new)));
    }
    if let Some(items) = literal_value(v.arena(), predicate) {
        let items = items.clone();
        let Ok(b) = effective_boolean_value(Box::new(items.into_iter().map(Ok))) else {
            return Ok(None);
        };
        let new = if b { base } else { v.arena_mut().empty() };
        return Ok(Some(replace(v, id, new)));
    }
    let props = v.arena().props(predicate);
    if props.is_focus_independent()
        && props.cardinality == Cardinality::ExactlyOne
        && props.item_type.is_numeric()
        && !props.special.contains(SpecialProperties::HAS_SIDE_EFFECTS)
    {
        let new = v
            .arena_mut()
            .alloc(ExprKind::Subscript, vec![base, predicate]);
        return Ok(Some(replace(v, id, new)));
    }
    Ok(None)
}

/// A predicate of the form `position() op N` with `N` independent of the
/// focus, normalised so that `position()` is on the left.
struct PositionalTest {
    op: ComparisonOperator,
    comparand: ExprId,
}

fn positional_test(v: &ExpressionVisitor<'_>, predicate: ExprId) -> Option<PositionalTest> {
    let arena = v.arena();
    let op = match arena.kind(predicate) {
        ExprKind::ValueComparison { op, .. } | ExprKind::GeneralComparison { op, .. } => *op,
        _ => return None,
    };
    let (left, right) = (arena.operand(predicate, 0), arena.operand(predicate, 1));
    let (op, comparand) = if is_call(arena, left, SystemFunction::Position) {
        (op, right)
    } else if is_call(arena, right, SystemFunction::Position) {
        (op.inverse(), left)
    } else {
        return None;
    };
    let props = arena.props(comparand);
    let usable = props.is_focus_independent()
        && !props.cardinality.allows_many()
        && props.cardinality != Cardinality::Empty
        && props.item_type.is_numeric()
        && !props.special.contains(SpecialProperties::HAS_SIDE_EFFECTS);
    usable.then_some(PositionalTest { op, comparand })
}

fn number_literal(v: &mut ExpressionVisitor<'_>, n: f64) -> ExprId {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        v.arena_mut().int(n as i64)
    } else {
        v.arena_mut().double(n)
    }
}

fn subsequence(v: &mut ExpressionVisitor<'_>, args: Vec<ExprId>) -> ExprId {
    v.arena_mut().call(SystemFunction::Subsequence, args)
}

fn rounded(v: &mut ExpressionVisitor<'_>, f: SystemFunction, n: ExprId) -> ExprId {
    v.arena_mut().call(f, vec![n])
}

/// `n ± 1` in xs:double, so that a comparand at either end of the
/// xs:integer range cannot overflow. `subsequence` rounds its arguments.
fn offset(v: &mut ExpressionVisitor<'_>, n: ExprId, op: ArithmeticOperator) -> ExprId {
    let one = v.arena_mut().double(1.0);
    v.arena_mut().arith(n, op, one)
}

/// `E[position() op N]` with a literal `N`.
fn rewrite_for_literal(
    v: &mut ExpressionVisitor<'_>,
    base: ExprId,
    op: ComparisonOperator,
    n: f64,
) -> Option<ExprId> {
    use ComparisonOperator::*;
    if n.is_nan() {
        return Some(if op == Ne { base } else { v.arena_mut().empty() });
    }
    let new = match op {
        Eq => {
            let index = number_literal(v, n);
            v.arena_mut().alloc(ExprKind::Subscript, vec![base, index])
        }
        Lt | Le => {
            let len = if op == Lt { n.ceil() - 1.0 } else { n.floor() };
            if len < 1.0 {
                v.arena_mut().empty()
            } else {
                let one = v.arena_mut().int(1);
                let len = number_literal(v, len);
                subsequence(v, vec![base, one, len])
            }
        }
        Gt | Ge => {
            let start = if op == Gt { n.floor() + 1.0 } else { n.ceil() };
            if start <= 1.0 {
                base
            } else if start > usize::MAX as f64 {
                v.arena_mut().empty()
            } else {
                v.arena_mut().alloc(
                    ExprKind::Tail {
                        start: start as usize,
                    },
                    vec![base],
                )
            }
        }
        Ne if n.fract() == 0.0 => {
            let index = number_literal(v, n);
            v.arena_mut().call(SystemFunction::Remove, vec![base, index])
        }
        Ne => base,
    };
    Some(new)
}

/// `E[position() op N]` with `N` computed at run time, exactly one item.
fn rewrite_for_expression(
    v: &mut ExpressionVisitor<'_>,
    base: ExprId,
    op: ComparisonOperator,
    n: ExprId,
) -> Option<ExprId> {
    use ComparisonOperator::*;
    let integral = v
        .arena()
        .item_type(n)
        .is_subtype(&ItemType::atomic(AtomicType::Integer));
    let new = match op {
        Eq => v.arena_mut().alloc(ExprKind::Subscript, vec![base, n]),
        Lt => {
            let limit = if integral { n } else { rounded(v, SystemFunction::Ceiling, n) };
            let one = v.arena_mut().int(1);
            let len = offset(v, limit, ArithmeticOperator::Minus);
            subsequence(v, vec![base, one, len])
        }
        Le => {
            let len = if integral { n } else { rounded(v, SystemFunction::Floor, n) };
            let one = v.arena_mut().int(1);
            subsequence(v, vec![base, one, len])
        }
        Gt => {
            let limit = if integral { n } else { rounded(v, SystemFunction::Floor, n) };
            let start = offset(v, limit, ArithmeticOperator::Plus);
            subsequence(v, vec![base, start])
        }
        Ge => {
            let start = if integral { n } else { rounded(v, SystemFunction::Ceiling, n) };
            subsequence(v, vec![base, start])
        }
        Ne if integral => v.arena_mut().call(SystemFunction::Remove, vec![base, n]),
        Ne => return None,
    };
    Some(new)
}

fn positional_rewrite(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    base: ExprId,
    predicate: ExprId,
) -> XResult<Option<ExprId>> {
    if matches!(v.arena().kind(predicate), ExprKind::IntegerRangeTest) {
        return Ok(range_rewrite(v, base, predicate));
    }
    let Some(PositionalTest { op, comparand }) = positional_test(v, predicate) else {
        return Ok(None);
    };
    if let Some(n) = literal_number(v.arena(), comparand) {
        let new = rewrite_for_literal(v, base, op, n);
        if new.is_some() {
            v.trace(|| format!("Rewrote [position() {} {}]", op.general_symbol(), n));
        }
        return Ok(new);
    }

    if !v.arena().cardinality(comparand).allows_zero() {
        let new = rewrite_for_expression(v, base, op, comparand);
        if new.is_some() {
            v.trace(|| format!("Rewrote [position() {} N]", op.general_symbol()));
        }
        return Ok(new);
    }

    // The comparand may be empty, in which case no item is selected:
    // let $n := N return if (exists($n)) then E' else ()
    let var = v.arena_mut().new_variable();
    let name = format!("pos{}", var.raw());
    let static_type = quire_types::SequenceType::new(
        v.arena().item_type(comparand),
        v.arena().cardinality(comparand),
    );
    let in_rewrite = v.arena_mut().local_ref_typed(var, &name, static_type.clone());
    let Some(selected) = rewrite_for_expression(v, base, op, in_rewrite) else {
        return Ok(None);
    };
    let tested = v.arena_mut().local_ref_typed(var, &name, static_type);
    let exists = v.arena_mut().call(SystemFunction::Exists, vec![tested]);
    let nothing = v.arena_mut().empty();
    let choice = v.arena_mut().conditional(exists, selected, nothing);
    let loc = v.arena().location(id);
    v.arena_mut().set_location(choice, loc);
    let binding = v.arena_mut().let_binding(var, &name, comparand, choice);
    v.trace(|| format!("Rewrote [position() {} N] for an optional N", op.general_symbol()));
    Ok(Some(binding))
}

/// `E[position() = (min to max)]` becomes a subsequence.
fn range_rewrite(v: &mut ExpressionVisitor<'_>, base: ExprId, test: ExprId) -> Option<ExprId> {
    let arena = v.arena();
    let [value, min, max] = [0, 1, 2].map(|i| arena.operand(test, i));
    if !is_call(arena, value, SystemFunction::Position) {
        return None;
    }
    let bounded = [min, max].iter().all(|b| {
        let props = arena.props(*b);
        props.is_focus_independent()
            && props.cardinality == Cardinality::ExactlyOne
            && !props.special.contains(SpecialProperties::HAS_SIDE_EFFECTS)
    });
    if !bounded {
        return None;
    }
    // subsequence(E, min, (max + 1e0) - min)
    let min_again = v.arena_mut().copy_subtree(min);
    let end = offset(v, max, ArithmeticOperator::Plus);
    let len = v.arena_mut().arith(end, ArithmeticOperator::Minus, min_again);
    v.trace(|| "Rewrote positional range predicate as subsequence".to_string());
    Some(subsequence(v, vec![base, min, len]))
}

/// `E[p and q]` becomes `E[p][q]` when exactly one of the two conditions
/// is positional; that one goes in the inner filter.
fn split_conjunction(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    base: ExprId,
    predicate: ExprId,
) -> Option<ExprId> {
    if !matches!(v.arena().kind(predicate), ExprKind::And) {
        return None;
    }
    let (p, q) = (v.arena().operand(predicate, 0), v.arena().operand(predicate, 1));
    let positional = |e: ExprId| {
        let props = v.arena().props(e);
        props
            .dependencies
            .intersects(Dependencies::POSITION | Dependencies::LAST)
    };
    let (inner, outer) = match (positional(p), positional(q)) {
        (true, false) => (p, q),
        (false, true) => (q, p),
        _ => return None,
    };
    let as_boolean = |v: &mut ExpressionVisitor<'_>, e: ExprId| {
        if predicate_flags(v.arena().props(e)).singleton_boolean {
            e
        } else {
            v.arena_mut().call(SystemFunction::Boolean, vec![e])
        }
    };
    let inner = as_boolean(v, inner);
    let outer = as_boolean(v, outer);
    let first = v.arena_mut().filter(base, inner);
    refresh_flags(v, first);
    let second = v.arena_mut().filter(first, outer);
    refresh_flags(v, second);
    let loc = v.arena().location(id);
    v.arena_mut().set_location(second, loc);
    v.trace(|| "Split conjunctive predicate".to_string());
    Some(second)
}

/// First, last, subscript and tail access.
pub fn optimize_item_access(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    let base = v.arena().operand(id, 0);
    if v.arena().cardinality(base) == Cardinality::Empty {
        return Ok(replace(v, id, base));
    }
    if matches!(v.arena().kind(id), ExprKind::Tail { start: 0 | 1 }) {
        return Ok(replace(v, id, base));
    }
    // kept as a node even over a literal base
    Ok(id)
}

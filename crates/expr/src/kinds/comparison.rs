//! Value comparisons (`eq`, `lt`, ...) and general comparisons (`=`, `<`,
//! ...), including the existential evaluation of the latter.

use crate::arena::ExprId;
use crate::error::{XPathError, XResult};
use crate::eval::DynamicContext;
use crate::functions::SystemFunction;
use crate::kind::{ComparisonShape, ExprKind};
use crate::kinds::{fold_if_constant, make_literal, replace};
use crate::role::RoleDiagnostic;
use crate::type_checker::{convert_untyped, static_type_check};
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{AtomicType, Cardinality, ItemType, SequenceType};
use quire_xdm::compare::is_comparable;
use quire_xdm::{AtomicValue, Collation, ComparisonOperator, Item, cast_atomic, value_compare};

fn boolean(b: bool) -> Vec<Item> {
    vec![Item::Atomic(AtomicValue::Boolean(b))]
}

/// The type an untyped operand is cast to when compared with a value of
/// type `other`.
fn untyped_partner(other: AtomicType) -> AtomicType {
    if other.is_numeric() {
        AtomicType::Double
    } else if other == AtomicType::UntypedAtomic || other == AtomicType::AnyUri {
        AtomicType::String
    } else {
        other.primitive()
    }
}

fn incomparable(symbol: &str, left: AtomicType, right: AtomicType) -> String {
    format!("Cannot compare {} to {} using '{}'", left, right, symbol)
}

pub fn type_check_value(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    let ExprKind::ValueComparison {
        op,
        result_when_empty,
    } = *v.arena().kind(id)
    else {
        return Ok(id);
    };
    let required = SequenceType::optional(ItemType::any_atomic());
    for i in 0..2 {
        let operand = v.arena().operand(id, i);
        let role = RoleDiagnostic::operand(op.value_symbol(), i);
        let checked = static_type_check(v, operand, &required, &role)?;
        v.arena_mut().replace_operand(id, i, checked);
        if v.arena().item_type(checked) == ItemType::atomic(AtomicType::UntypedAtomic) {
            let converted = convert_untyped(v, checked, AtomicType::String)?;
            v.arena_mut().replace_operand(id, i, converted);
        }
    }

    let (left, right) = (v.arena().operand(id, 0), v.arena().operand(id, 1));
    if v.arena().cardinality(left) == Cardinality::Empty
        || v.arena().cardinality(right) == Cardinality::Empty
    {
        let value = result_when_empty.map(boolean).unwrap_or_default();
        return Ok(make_literal(v, id, value));
    }
    let (lt, rt) = (v.arena().item_type(left), v.arena().item_type(right));
    if let (Some(x), Some(y)) = (lt.as_atomic(), rt.as_atomic())
        && !is_comparable(x, y, op.is_ordering())
    {
        let message = incomparable(op.value_symbol(), x, y);
        return Err(v.static_error_at(id, XPathError::static_type("XPTY0004", message)));
    }
    Ok(fold_if_constant(v, id))
}

pub fn type_check_general(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    let ExprKind::GeneralComparison {
        mut op,
        done_warnings,
        ..
    } = *v.arena().kind(id)
    else {
        return Ok(id);
    };
    let required = SequenceType::star(ItemType::any_atomic());
    for i in 0..2 {
        let operand = v.arena().operand(id, i);
        let role = RoleDiagnostic::operand(op.general_symbol(), i);
        let checked = static_type_check(v, operand, &required, &role)?;
        v.arena_mut().replace_operand(id, i, checked);
    }

    let (left, right) = (v.arena().operand(id, 0), v.arena().operand(id, 1));
    let (lc, rc) = (v.arena().cardinality(left), v.arena().cardinality(right));
    if lc == Cardinality::Empty || rc == Cardinality::Empty {
        return Ok(make_literal(v, id, boolean(false)));
    }
    let (lt, rt) = (v.arena().item_type(left), v.arena().item_type(right));
    let (la, ra) = (lt.as_atomic(), rt.as_atomic());

    if let (Some(x), Some(y)) = (la, ra)
        && x != AtomicType::UntypedAtomic
        && y != AtomicType::UntypedAtomic
        && !is_comparable(x, y, op.is_ordering())
    {
        let message = incomparable(op.general_symbol(), x, y);
        if lc.allows_zero() && rc.allows_zero() {
            if !done_warnings {
                let message = format!(
                    "{}; the comparison can succeed only if one of the operands is empty",
                    message
                );
                v.issue_warning(&message, v.arena().location(id));
                if let ExprKind::GeneralComparison { done_warnings, .. } = v.arena_mut().kind_mut(id) {
                    *done_warnings = true;
                }
            }
        } else {
            return Err(v.static_error_at(id, XPathError::static_type("XPTY0004", message)));
        }
    }

    let concrete = |t: Option<AtomicType>| t.filter(|t| *t != AtomicType::AnyAtomic);
    if !lc.allows_many()
        && !rc.allows_many()
        && let (Some(x), Some(y)) = (concrete(la), concrete(ra))
    {
        let targets = match (x == AtomicType::UntypedAtomic, y == AtomicType::UntypedAtomic) {
            (true, true) => (Some(AtomicType::String), Some(AtomicType::String)),
            (true, false) => (Some(untyped_partner(y)), None),
            (false, true) => (None, Some(untyped_partner(x))),
            (false, false) => (None, None),
        };
        for (i, target) in [targets.0, targets.1].into_iter().enumerate() {
            if let Some(target) = target {
                let operand = v.arena().operand(id, i);
                let converted = convert_untyped(v, operand, target)?;
                v.arena_mut().replace_operand(id, i, converted);
            }
        }
        v.arena_mut().set_kind(
            id,
            ExprKind::ValueComparison {
                op,
                result_when_empty: Some(false),
            },
        );
        v.trace(|| "Reduced general comparison to a value comparison".to_string());
        return Ok(fold_if_constant(v, id));
    }

    let shape = if !lc.allows_many() && !rc.allows_many() {
        ComparisonShape::OneToOne
    } else if !rc.allows_many() {
        ComparisonShape::ManyToOne
    } else if !lc.allows_many() {
        v.arena_mut().swap_operands(id, 0, 1);
        op = op.inverse();
        ComparisonShape::ManyToOne
    } else {
        ComparisonShape::ManyToMany
    };
    let done_warnings = matches!(
        v.arena().kind(id),
        ExprKind::GeneralComparison {
            done_warnings: true,
            ..
        }
    );
    v.arena_mut().set_kind(
        id,
        ExprKind::GeneralComparison {
            op,
            shape,
            done_warnings,
        },
    );
    Ok(fold_if_constant(v, id))
}

pub fn optimize_general(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    let folded = fold_if_constant(v, id);
    if folded != id {
        return Ok(folded);
    }
    let ExprKind::GeneralComparison { op, shape, .. } = *v.arena().kind(id) else {
        return Ok(id);
    };
    let (left, right) = (v.arena().operand(id, 0), v.arena().operand(id, 1));
    let (lt, rt) = (v.arena().item_type(left), v.arena().item_type(right));

    // `$x = (a to b)`, with the range on either side
    let is_range = |e: ExprId| matches!(v.arena().kind(e), ExprKind::Range);
    let range_test = if is_range(right) && lt.is_numeric() {
        Some((left, right))
    } else if is_range(left) && rt.is_numeric() {
        Some((right, left))
    } else {
        None
    };
    if op == ComparisonOperator::Eq
        && let Some((value, range)) = range_test
    {
        let min = v.arena().operand(range, 0);
        let max = v.arena().operand(range, 1);
        let loc = v.arena().location(id);
        let test = v
            .arena_mut()
            .alloc_at(ExprKind::IntegerRangeTest, vec![value, min, max], loc);
        v.trace(|| "Rewrote comparison with a range as an integer range test".to_string());
        return Ok(replace(v, id, test));
    }

    if op.is_ordering()
        && shape == ComparisonShape::ManyToMany
        && (lt.is_numeric() || rt.is_numeric())
    {
        let (lower, upper) = (
            SystemFunction::Min { ignore_nan: true },
            SystemFunction::Max { ignore_nan: true },
        );
        let (left_fn, right_fn) = match op {
            ComparisonOperator::Lt | ComparisonOperator::Le => (lower, upper),
            _ => (upper, lower),
        };
        let new_left = v.arena_mut().call(left_fn, vec![left]);
        let new_left = fold_if_constant(v, new_left);
        let new_right = v.arena_mut().call(right_fn, vec![right]);
        let new_right = fold_if_constant(v, new_right);
        let loc = v.arena().location(id);
        let compare = v.arena_mut().alloc_at(
            ExprKind::ValueComparison {
                op,
                result_when_empty: Some(false),
            },
            vec![new_left, new_right],
            loc,
        );
        v.trace(|| format!("Rewrote many-to-many '{}' using min and max", op.general_symbol()));
        return Ok(replace(v, id, compare));
    }
    Ok(id)
}

/// Compares two atomic values under the general-comparison rules for
/// untyped operands.
pub fn compare_general_pair(
    a: &AtomicValue,
    op: ComparisonOperator,
    b: &AtomicValue,
    collation: Collation,
) -> XResult<bool> {
    let converted = match (a.is_untyped(), b.is_untyped()) {
        (true, true) => None,
        (true, false) => Some((cast_atomic(a, untyped_partner(b.atomic_type()))?, b.clone())),
        (false, true) => Some((a.clone(), cast_atomic(b, untyped_partner(a.atomic_type()))?)),
        (false, false) => None,
    };
    let result = match &converted {
        Some((a, b)) => value_compare(a, op, b, collation)?,
        None => value_compare(a, op, b, collation)?,
    };
    Ok(result)
}

/// Existential comparison of two sequences. Items are read from each side
/// in turn and compared with the items already read from the other side,
/// so that a match found early leaves the rest of both inputs unread.
pub fn compare_many_to_many<L, R>(
    mut left: L,
    mut right: R,
    op: ComparisonOperator,
    collation: Collation,
) -> XResult<bool>
where
    L: Iterator<Item = XResult<AtomicValue>>,
    R: Iterator<Item = XResult<AtomicValue>>,
{
    let mut seen_left: Vec<AtomicValue> = Vec::new();
    let mut seen_right: Vec<AtomicValue> = Vec::new();
    let (mut left_done, mut right_done) = (false, false);
    while !(left_done && right_done) {
        if !left_done {
            match left.next() {
                Some(a) => {
                    let a = a?;
                    for b in &seen_right {
                        if compare_general_pair(&a, op, b, collation)? {
                            return Ok(true);
                        }
                    }
                    seen_left.push(a);
                }
                None => left_done = true,
            }
        }
        if !right_done {
            match right.next() {
                Some(b) => {
                    let b = b?;
                    for a in &seen_left {
                        if compare_general_pair(a, op, &b, collation)? {
                            return Ok(true);
                        }
                    }
                    seen_right.push(b);
                }
                None => right_done = true,
            }
        }
        if (left_done && seen_left.is_empty()) || (right_done && seen_right.is_empty()) {
            return Ok(false);
        }
    }
    Ok(false)
}

pub(crate) fn evaluate_general(
    ctx: &DynamicContext<'_>,
    id: ExprId,
    op: ComparisonOperator,
    shape: ComparisonShape,
) -> XResult<bool> {
    let arena = ctx.arena();
    let (left, right) = (arena.operand(id, 0), arena.operand(id, 1));
    match shape {
        ComparisonShape::OneToOne | ComparisonShape::ManyToOne => {
            let Some(b) = ctx.atomic_operand(right)? else {
                return Ok(false);
            };
            for a in ctx.atomized(left) {
                if compare_general_pair(&a?, op, &b, ctx.collation())? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ComparisonShape::ManyToMany => compare_many_to_many(
            ctx.atomized(left),
            ctx.atomized(right),
            op,
            ctx.collation(),
        ),
    }
}

/// `value = (min to max)`, true when some item of `value` is a whole
/// number within the bounds.
pub(crate) fn evaluate_integer_range_test(ctx: &DynamicContext<'_>, id: ExprId) -> XResult<bool> {
    let arena = ctx.arena();
    let bound = |i: usize| -> XResult<Option<f64>> {
        Ok(ctx.atomic_operand(arena.operand(id, i))?.map(|a| a.to_double()))
    };
    let (Some(min), Some(max)) = (bound(1)?, bound(2)?) else {
        return Ok(false);
    };
    for value in ctx.atomized(arena.operand(id, 0)) {
        let value = value?;
        let d = if value.is_untyped() {
            cast_atomic(&value, AtomicType::Double)?.to_double()
        } else {
            value.to_double()
        };
        if d.fract() == 0.0 && d >= min && d <= max {
            return Ok(true);
        }
    }
    Ok(false)
}

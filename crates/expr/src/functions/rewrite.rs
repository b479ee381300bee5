//! Compile-time handling of system function calls: argument checking
//! against the declared signatures and the function-specific rewrites.

use crate::arena::ExprId;
use crate::error::{XPathError, XResult};
use crate::functions::SystemFunction;
use crate::kind::ExprKind;
use crate::kinds::{fold_if_constant, literal_number, make_literal, replace};
use crate::properties::SpecialProperties;
use crate::role::RoleDiagnostic;
use crate::type_checker::static_type_check;
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{AtomicType, Cardinality, ItemType};
use quire_xdm::{AtomicValue, Item};

fn boolean_literal(v: &mut ExpressionVisitor<'_>, id: ExprId, value: bool) -> ExprId {
    make_literal(v, id, vec![Item::Atomic(AtomicValue::Boolean(value))])
}

pub fn simplify(v: &mut ExpressionVisitor<'_>, id: ExprId, function: SystemFunction) -> XResult<ExprId> {
    v.simplify_children(id)?;
    Ok(match function {
        SystemFunction::True => boolean_literal(v, id, true),
        SystemFunction::False => boolean_literal(v, id, false),
        _ => id,
    })
}

pub fn type_check(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    function: SystemFunction,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    if matches!(function, SystemFunction::Position | SystemFunction::Last) && info.absent {
        let message = format!("{}() is used where there is no context item", function.name());
        return Err(v.static_error_at(id, XPathError::static_error("XPDY0002", message)));
    }
    for i in 0..v.arena().operand_count(id) {
        let operand = v.arena().operand(id, i);
        let required = function.parameter_type(i);
        let role = RoleDiagnostic::function_argument(function.qualified_name(), i);
        let checked = static_type_check(v, operand, &required, &role)?;
        v.arena_mut().replace_operand(id, i, checked);
    }
    Ok(fold_if_constant(v, id))
}

fn has_side_effects(v: &ExpressionVisitor<'_>, id: ExprId) -> bool {
    v.arena()
        .props(id)
        .special
        .contains(SpecialProperties::HAS_SIDE_EFFECTS)
}

/// `exists`, `empty` and `count` decided from the argument's cardinality.
fn from_cardinality(function: SystemFunction, card: Cardinality) -> Option<AtomicValue> {
    match (function, card) {
        (SystemFunction::Exists, Cardinality::Empty) => Some(AtomicValue::Boolean(false)),
        (SystemFunction::Exists, c) if !c.allows_zero() => Some(AtomicValue::Boolean(true)),
        (SystemFunction::Empty, Cardinality::Empty) => Some(AtomicValue::Boolean(true)),
        (SystemFunction::Empty, c) if !c.allows_zero() => Some(AtomicValue::Boolean(false)),
        (SystemFunction::Count, Cardinality::Empty) => Some(AtomicValue::Integer(0)),
        (SystemFunction::Count, Cardinality::ExactlyOne) => Some(AtomicValue::Integer(1)),
        _ => None,
    }
}

pub fn optimize(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    function: SystemFunction,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    let arena = v.arena();
    match function {
        SystemFunction::Boolean => {
            let arg = arena.operand(id, 0);
            if arena.item_type(arg) == ItemType::atomic(AtomicType::Boolean)
                && arena.cardinality(arg) == Cardinality::ExactlyOne
            {
                return Ok(replace(v, id, arg));
            }
        }
        SystemFunction::Exists | SystemFunction::Empty | SystemFunction::Count => {
            let arg = arena.operand(id, 0);
            if !has_side_effects(v, arg)
                && let Some(value) = from_cardinality(function, arena.cardinality(arg))
            {
                v.trace(|| format!("Decided {}() from the static cardinality", function.name()));
                return Ok(make_literal(v, id, vec![Item::Atomic(value)]));
            }
        }
        SystemFunction::Subsequence if arena.operand_count(id) == 2 => {
            let base = arena.operand(id, 0);
            if let Some(n) = literal_number(arena, arena.operand(id, 1))
                && n.is_finite()
            {
                let start = (n + 0.5).floor();
                if start <= 1.0 {
                    return Ok(replace(v, id, base));
                }
                let loc = arena.location(id);
                let tail = v.arena_mut().alloc_at(
                    ExprKind::Tail {
                        start: start as usize,
                    },
                    vec![base],
                    loc,
                );
                v.trace(|| format!("Rewrote subsequence() from {} as a tail expression", start));
                return Ok(replace(v, id, tail));
            }
        }
        SystemFunction::Data => {
            let arg = arena.operand(id, 0);
            if arena.item_type(arg).is_plain() {
                return Ok(replace(v, id, arg));
            }
        }
        _ => {}
    }
    Ok(fold_if_constant(v, id))
}

//! Runtime behaviour of the system functions.

use crate::arena::ExprId;
use crate::error::{XPathError, XResult};
use crate::eval::{DynamicContext, SequenceIter, bool_item, empty};
use crate::functions::SystemFunction;
use quire_types::AtomicType;
use quire_xdm::cast::promote;
use quire_xdm::{AtomicValue, Item, arith, cast_atomic, compare_atomic};
use std::cmp::Ordering;

fn no_focus(function: SystemFunction) -> XPathError {
    XPathError::dynamic(
        "XPDY0002",
        format!("The context item is absent, so {}() is undefined", function.name()),
    )
}

fn numeric_argument(value: AtomicValue) -> XResult<AtomicValue> {
    if value.is_untyped() {
        Ok(cast_atomic(&value, AtomicType::Double)?)
    } else {
        Ok(value)
    }
}

/// A required single numeric argument, as a double.
fn double_argument(ctx: &DynamicContext<'_>, id: ExprId, function: SystemFunction) -> XResult<f64> {
    match ctx.atomic_operand(id)? {
        Some(value) => Ok(numeric_argument(value)?.to_double()),
        None => Err(XPathError::dynamic(
            "XPTY0004",
            format!("An empty sequence is not allowed as an argument of {}()", function.name()),
        )),
    }
}

/// `fn:round` semantics: halves go up.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

fn is_whole_number(value: &AtomicValue) -> bool {
    match value {
        AtomicValue::Integer(_) => true,
        AtomicValue::Decimal(d) => d.fract().is_zero(),
        AtomicValue::Float(_) | AtomicValue::Double(_) => {
            let d = value.to_double();
            d.is_finite() && d.fract() == 0.0
        }
        _ => false,
    }
}

/// Widest numeric type seen, for the promotion of `min`/`max` results.
fn widen(current: Option<AtomicType>, next: AtomicType) -> Option<AtomicType> {
    let rank = |t: AtomicType| match t {
        AtomicType::Double => 3,
        AtomicType::Float => 2,
        AtomicType::Decimal => 1,
        _ => 0,
    };
    match current {
        Some(c) if rank(c) >= rank(next) => Some(c),
        _ if next.is_numeric() => Some(next),
        other => other,
    }
}

fn extreme(ctx: &DynamicContext<'_>, arg: ExprId, want: Ordering, ignore_nan: bool) -> XResult<Option<Item>> {
    let mut best: Option<AtomicValue> = None;
    let mut widest = None;
    let mut saw_nan = false;
    for value in ctx.atomized(arg) {
        let value = numeric_argument(value?)?;
        let t = value.atomic_type();
        if !t.is_ordered() {
            return Err(XPathError::dynamic(
                "FORG0006",
                format!("Values of type {} have no ordering", t),
            ));
        }
        widest = widen(widest, t);
        if value.is_nan() {
            saw_nan = true;
            continue;
        }
        best = match best {
            None => Some(value),
            Some(current) => {
                let ordering = compare_atomic(&value, &current, ctx.collation()).map_err(|_| {
                    XPathError::dynamic(
                        "FORG0006",
                        format!("Cannot compare {} with {}", value.type_name(), current.type_name()),
                    )
                })?;
                if ordering == Some(want) {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    if saw_nan && !ignore_nan {
        return Ok(Some(Item::Atomic(AtomicValue::Double(f64::NAN))));
    }
    Ok(best.map(|b| match widest {
        Some(t) => Item::Atomic(promote(b, t)),
        None => Item::Atomic(b),
    }))
}

fn raise_error(ctx: &DynamicContext<'_>, id: ExprId) -> XPathError {
    let arena = ctx.arena();
    let code = match arena.operand_count(id) {
        0 => None,
        _ => match ctx.atomic_operand(arena.operand(id, 0)) {
            Ok(v) => v.map(|v| {
                let s = v.to_string_value();
                s.rsplit(':').next().unwrap_or_default().to_string()
            }),
            Err(e) => return e,
        },
    };
    let description = if arena.operand_count(id) > 1 {
        match ctx.atomic_operand(arena.operand(id, 1)) {
            Ok(v) => v.map(|v| v.to_string_value()),
            Err(e) => return e,
        }
    } else {
        None
    };
    let code = code.filter(|c| !c.is_empty()).unwrap_or_else(|| "FOER0000".to_string());
    let description =
        description.unwrap_or_else(|| "Error signalled by application call on error()".to_string());
    XPathError::dynamic(code, description)
}

/// Calls of functions that return at most one item.
pub(crate) fn evaluate_call(
    ctx: &DynamicContext<'_>,
    id: ExprId,
    function: SystemFunction,
) -> XResult<Option<Item>> {
    let arena = ctx.arena();
    let arg = |i: usize| arena.operand(id, i);
    let item = match function {
        SystemFunction::Position => {
            let focus = ctx.focus().ok_or_else(|| no_focus(function))?;
            Item::Atomic(AtomicValue::Integer(focus.position as i64))
        }
        SystemFunction::Last => {
            let focus = ctx.focus().ok_or_else(|| no_focus(function))?;
            let size = focus.size.ok_or_else(|| {
                XPathError::dynamic("XPDY0002", "The size of the context sequence is not known")
            })?;
            Item::Atomic(AtomicValue::Integer(size as i64))
        }
        SystemFunction::Boolean => bool_item(ctx.effective_boolean(arg(0))?),
        SystemFunction::Not => bool_item(!ctx.effective_boolean(arg(0))?),
        SystemFunction::Exists => bool_item(ctx.iterate(arg(0)).next().transpose()?.is_some()),
        SystemFunction::Empty => bool_item(ctx.iterate(arg(0)).next().transpose()?.is_none()),
        SystemFunction::Count => {
            let mut n = 0i64;
            for r in ctx.iterate(arg(0)) {
                r?;
                n += 1;
            }
            Item::Atomic(AtomicValue::Integer(n))
        }
        SystemFunction::String => {
            let s = match ctx.evaluate_item(arg(0))? {
                Some(item) => item.string_value()?,
                None => String::new(),
            };
            Item::Atomic(AtomicValue::String(s))
        }
        SystemFunction::Number => {
            let d = ctx.atomic_operand(arg(0))?.map_or(f64::NAN, |v| v.to_double());
            Item::Atomic(AtomicValue::Double(d))
        }
        SystemFunction::Floor | SystemFunction::Ceiling => {
            let Some(value) = ctx.atomic_operand(arg(0))? else {
                return Ok(None);
            };
            let value = numeric_argument(value)?;
            let rounded = if function == SystemFunction::Floor {
                arith::floor(&value)
            } else {
                arith::ceiling(&value)
            };
            Item::Atomic(rounded)
        }
        SystemFunction::Min { ignore_nan } => return extreme(ctx, arg(0), Ordering::Less, ignore_nan),
        SystemFunction::Max { ignore_nan } => {
            return extreme(ctx, arg(0), Ordering::Greater, ignore_nan);
        }
        SystemFunction::Concat => {
            let mut out = String::new();
            for i in 0..arena.operand_count(id) {
                if let Some(value) = ctx.atomic_operand(arg(i))? {
                    out.push_str(&value.to_string_value());
                }
            }
            Item::Atomic(AtomicValue::String(out))
        }
        SystemFunction::True => bool_item(true),
        SystemFunction::False => bool_item(false),
        SystemFunction::IsWholeNumber => {
            let whole = match ctx.atomic_operand(arg(0))? {
                Some(value) => is_whole_number(&numeric_argument(value)?),
                None => false,
            };
            bool_item(whole)
        }
        SystemFunction::Subsequence
        | SystemFunction::Remove
        | SystemFunction::Data
        | SystemFunction::Error => return iterate_call(ctx, id, function)?.next().transpose(),
    };
    Ok(Some(item))
}

/// Calls of functions that may return several items. The result is
/// produced lazily where the function allows it.
pub(crate) fn iterate_call<'a>(
    ctx: &DynamicContext<'a>,
    id: ExprId,
    function: SystemFunction,
) -> XResult<SequenceIter<'a>> {
    let arena = ctx.arena();
    let arg = |i: usize| arena.operand(id, i);
    match function {
        SystemFunction::Data => Ok(Box::new(ctx.atomized(arg(0)).map(|r| r.map(Item::Atomic)))),
        SystemFunction::Subsequence => {
            let start = round_half_up(double_argument(ctx, arg(1), function)?);
            let end = if arena.operand_count(id) > 2 {
                start + round_half_up(double_argument(ctx, arg(2), function)?)
            } else {
                f64::INFINITY
            };
            if start.is_nan() || end.is_nan() || end <= 1.0 || start >= end || start == f64::INFINITY {
                return Ok(empty());
            }
            let first = start.max(1.0);
            let skip = (first - 1.0) as usize;
            let base = ctx.iterate(arg(0));
            if end.is_infinite() {
                return Ok(Box::new(base.skip(skip)));
            }
            let take = (end - first) as usize;
            Ok(Box::new(base.skip(skip).take(take)))
        }
        SystemFunction::Remove => {
            let position = double_argument(ctx, arg(1), function)?;
            Ok(Box::new(ctx.iterate(arg(0)).enumerate().filter_map(
                move |(i, r)| match r {
                    Ok(_) if (i + 1) as f64 == position => None,
                    other => Some(other),
                },
            )))
        }
        SystemFunction::Error => Err(raise_error(ctx, id)),
        _ => Ok(Box::new(evaluate_call(ctx, id, function)?.into_iter().map(Ok))),
    }
}

//! Static checking of a supplied expression against a required sequence
//! type.
//!
//! The checker either accepts the expression as it is, rejects it with a
//! static type error, or returns a rewritten expression in which implicit
//! conversions (atomization, untyped conversion, numeric promotion) and
//! run-time guards have been inserted.

use crate::arena::ExprId;
use crate::conversion::{self, untyped_target};
use crate::error::{XPathError, XResult};
use crate::functions::SystemFunction;
use crate::kind::ExprKind;
use crate::kinds;
use crate::role::RoleDiagnostic;
use crate::visitor::ExpressionVisitor;
use quire_types::{AtomicType, Cardinality, FunctionType, ItemType, Relation, SequenceType};
use quire_xdm::Item;

/// Checks `supplied` against `required`, applying the function conversion
/// rules. Returns the (possibly new) expression to use in its place.
pub fn static_type_check(
    v: &mut ExpressionVisitor<'_>,
    supplied: ExprId,
    required: &SequenceType,
    role: &RoleDiagnostic,
) -> XResult<ExprId> {
    check(v, supplied, required, role, true)
}

/// Like [`static_type_check`] but without any implicit conversion: only
/// the item type and cardinality are checked, and guards inserted.
pub fn strict_type_check(
    v: &mut ExpressionVisitor<'_>,
    supplied: ExprId,
    required: &SequenceType,
    role: &RoleDiagnostic,
) -> XResult<ExprId> {
    check(v, supplied, required, role, false)
}

fn item_type_ok(required: &ItemType, supplied: &ItemType) -> bool {
    *required == ItemType::AnyItem
        || supplied.is_error()
        || matches!(
            required.relationship(supplied),
            Relation::SameType | Relation::Subsumes
        )
}

fn may_contain_untyped(t: &ItemType) -> bool {
    match t {
        ItemType::Atomic(AtomicType::AnyAtomic) => true,
        ItemType::Union(members) => members.contains(&AtomicType::UntypedAtomic),
        _ => false,
    }
}

struct Supplied {
    expr: ExprId,
    item_type: ItemType,
    cardinality: Cardinality,
    item_ok: bool,
    card_ok: bool,
}

impl Supplied {
    fn read(v: &ExpressionVisitor<'_>, expr: ExprId, required: &SequenceType) -> Self {
        let item_type = v.arena().item_type(expr);
        let cardinality = v.arena().cardinality(expr);
        Supplied {
            expr,
            item_ok: item_type_ok(&required.item_type, &item_type),
            card_ok: required.cardinality.subsumes(cardinality),
            item_type,
            cardinality,
        }
    }
}

fn check(
    v: &mut ExpressionVisitor<'_>,
    supplied: ExprId,
    required: &SequenceType,
    role: &RoleDiagnostic,
    conversions: bool,
) -> XResult<ExprId> {
    let req_item = &required.item_type;
    let req_card = required.cardinality;
    if *req_item == ItemType::AnyItem && req_card == Cardinality::ZeroOrMore {
        return Ok(supplied);
    }
    let mut s = Supplied::read(v, supplied, required);

    if conversions && v.config().backwards_compatible && !req_card.allows_many() {
        if !s.card_ok && s.cardinality.allows_many() {
            let first = v.arena_mut().wrap(s.expr, ExprKind::FirstItem);
            s = Supplied::read(v, first, required);
        }
        if !s.item_ok {
            let conversion = match req_item {
                ItemType::Atomic(AtomicType::String) => Some(SystemFunction::String),
                ItemType::Atomic(AtomicType::Double) => Some(SystemFunction::Number),
                t if t.is_numeric() && t.atomic_members().is_some_and(|m| m.len() > 1) => {
                    Some(SystemFunction::Number)
                }
                _ => None,
            };
            if let Some(f) = conversion {
                let call = v.arena_mut().wrap(s.expr, ExprKind::FunctionCall(f));
                let arg_role = RoleDiagnostic::function_argument(f.name(), 0);
                let arg = check(v, s.expr, &f.parameter_type(0), &arg_role, true)?;
                v.arena_mut().replace_operand(call, 0, arg);
                return check(v, call, required, role, conversions);
            }
        }
    }

    if conversions && !s.item_ok && req_item.is_plain() {
        if !s.item_type.is_plain() && s.cardinality != Cardinality::Empty {
            if !s.item_type.is_atomizable() {
                let message = format!(
                    "{}; supplied value of type {} cannot be atomized",
                    role.item_type_mismatch(req_item, &s.item_type.to_string()),
                    s.item_type
                );
                return Err(v.static_error_at(s.expr, XPathError::static_type("FOTY0013", message)));
            }
            let atomized = fold_or_wrap(v, s.expr, ExprKind::Atomizer, conversion::atomize_item)?;
            s = Supplied::read(v, atomized, required);
        }

        if !s.item_ok
            && let Some(target) = untyped_target(req_item)
        {
            if s.item_type == ItemType::Atomic(AtomicType::UntypedAtomic) {
                if target.is_namespace_sensitive() {
                    let message = format!(
                        "{}; untyped atomic values cannot be converted to a namespace-sensitive type",
                        role.item_type_mismatch(req_item, &s.item_type.to_string())
                    );
                    return Err(v.static_error_at(s.expr, XPathError::static_type("XPTY0117", message)));
                }
                let converted = convert_untyped(v, s.expr, target)?;
                s = Supplied::read(v, converted, required);
            } else if may_contain_untyped(&s.item_type) {
                let converted = convert_untyped(v, s.expr, target)?;
                s = Supplied::read(v, converted, required);
            }
        }

        if !s.item_ok
            && let Some(prim) = req_item.as_atomic()
        {
            let overlaps_numeric =
                s.item_type.relationship(&ItemType::numeric()) != Relation::Disjoint;
            let no_double = s.item_type.relationship(&ItemType::Atomic(AtomicType::Double))
                == Relation::Disjoint;
            match prim {
                AtomicType::Double if overlaps_numeric => {
                    let promoted = promote(v, s.expr, AtomicType::Double)?;
                    s = Supplied::read(v, promoted, required);
                }
                AtomicType::Float if overlaps_numeric && no_double => {
                    let promoted = promote(v, s.expr, AtomicType::Float)?;
                    s = Supplied::read(v, promoted, required);
                }
                AtomicType::String
                    if s.item_type.relationship(&ItemType::Atomic(AtomicType::AnyUri))
                        != Relation::Disjoint =>
                {
                    if s.item_type.is_subtype(&ItemType::Atomic(AtomicType::AnyUri)) {
                        // anyURI values are string-valued already
                        s.item_ok = true;
                    } else {
                        let promoted = promote(v, s.expr, AtomicType::String)?;
                        s = Supplied::read(v, promoted, required);
                    }
                }
                _ => {}
            }
        }
    }

    if conversions
        && !s.item_ok
        && let ItemType::Function(ft) = req_item
        && *ft != FunctionType::Map
    {
        if !matches!(s.item_type, ItemType::Function(_)) {
            let checked = check_items(v, s.expr, &ItemType::any_function(), role)?;
            s = Supplied::read(v, checked, required);
        }
        let coercer = ExprKind::FunctionCoercer {
            required: ft.clone(),
            role: role.clone(),
        };
        let coerced = v.arena_mut().wrap(s.expr, coercer);
        s = Supplied::read(v, coerced, required);
    }

    if s.item_ok && s.card_ok {
        return Ok(s.expr);
    }

    if s.cardinality == Cardinality::Empty && !req_card.allows_zero() {
        let message = role.cardinality_mismatch(req_card, "an empty sequence");
        return Err(v.static_error_at(s.expr, role.static_error(message)));
    }

    let relation = s.item_type.relationship(req_item);
    if relation == Relation::Disjoint {
        if s.cardinality.allows_zero() && req_card.allows_zero() {
            if s.cardinality != Cardinality::Empty {
                let message = format!(
                    "The only value that can pass type-checking is an empty sequence. {}",
                    role.item_type_mismatch(req_item, &s.item_type.to_string())
                );
                v.issue_warning(&message, v.arena().location(s.expr));
            }
        } else {
            let message = role.item_type_mismatch(req_item, &s.item_type.to_string());
            return Err(v.static_error_at(s.expr, role.static_error(message)));
        }
    }

    if !s.item_ok && !matches!(relation, Relation::SameType | Relation::SubsumedBy) {
        let checked = check_items(v, s.expr, req_item, role)?;
        s.expr = checked;
    }

    if !s.card_ok {
        if let Some(seq) = kinds::literal_value(v.arena(), s.expr) {
            if !req_card.admits(seq.len()) {
                let described = describe_count(seq.len());
                let message = role.cardinality_mismatch(req_card, &described);
                return Err(v.static_error_at(s.expr, role.static_error(message)));
            }
        } else {
            let checker = ExprKind::CardinalityChecker {
                required: req_card,
                role: role.clone(),
            };
            s.expr = v.arena_mut().wrap(s.expr, checker);
        }
    }
    Ok(s.expr)
}

fn describe_count(n: usize) -> String {
    match n {
        0 => "an empty sequence".to_string(),
        1 => "one item".to_string(),
        n => format!("a sequence of {} items", n),
    }
}

/// Inserts an item-type guard, or decides statically when the operand is
/// a literal.
fn check_items(
    v: &mut ExpressionVisitor<'_>,
    expr: ExprId,
    required: &ItemType,
    role: &RoleDiagnostic,
) -> XResult<ExprId> {
    if let Some(seq) = kinds::literal_value(v.arena(), expr) {
        return match seq.iter().find(|item| !item.matches(required)) {
            Some(bad) => {
                let message = role.item_type_mismatch(required, &bad.type_name());
                Err(v.static_error_at(expr, role.static_error(message)))
            }
            None => Ok(expr),
        };
    }
    let checker = ExprKind::ItemChecker {
        required: required.clone(),
        role: role.clone(),
    };
    Ok(v.arena_mut().wrap(expr, checker))
}

/// Applies an item conversion to a literal at compile time; wraps any
/// other expression in a converter node of `kind`.
fn fold_or_wrap(
    v: &mut ExpressionVisitor<'_>,
    expr: ExprId,
    kind: ExprKind,
    convert: impl Fn(Item) -> XResult<Item>,
) -> XResult<ExprId> {
    let Some(seq) = kinds::literal_value(v.arena(), expr) else {
        return Ok(v.arena_mut().wrap(expr, kind));
    };
    let converted = seq
        .iter()
        .cloned()
        .map(&convert)
        .collect::<XResult<Vec<_>>>()
        .map_err(|e| v.static_error_at(expr, e.into_static()))?;
    let loc = v.arena().location(expr);
    let literal = v.arena_mut().alloc_at(ExprKind::Literal(converted), vec![], loc);
    v.arena_mut().replace_node(expr, literal);
    Ok(literal)
}

pub(crate) fn convert_untyped(
    v: &mut ExpressionVisitor<'_>,
    expr: ExprId,
    target: AtomicType,
) -> XResult<ExprId> {
    fold_or_wrap(v, expr, ExprKind::UntypedConverter { target }, move |item| {
        conversion::convert_untyped_item(item, target)
    })
}

fn promote(v: &mut ExpressionVisitor<'_>, expr: ExprId, target: AtomicType) -> XResult<ExprId> {
    fold_or_wrap(v, expr, ExprKind::AtomicConverter { target }, move |item| {
        Ok(conversion::promote_item(item, target))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ExprArena;
    use crate::config::CompilerConfig;
    use crate::context::{CollectWarnings, StaticContext};
    use quire_xdm::{AtomicValue, XdmNode};
    use std::rc::Rc;

    fn required(text: &str) -> SequenceType {
        text.parse().unwrap()
    }

    fn role() -> RoleDiagnostic {
        RoleDiagnostic::function_argument("f", 0)
    }

    #[test]
    fn test_matching_types_are_left_alone() {
        let mut arena = ExprArena::new();
        let lit = arena.int(3);
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, lit, &required("xs:decimal"), &role()).unwrap();
        assert_eq!(out, lit);
    }

    #[test]
    fn test_literal_mismatch_fails_statically() {
        let mut arena = ExprArena::new();
        let lit = arena.string("abc");
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let err = static_type_check(&mut v, lit, &required("xs:integer"), &role()).unwrap_err();
        assert!(err.is_static());
        assert!(err.is_type_error());
        assert_eq!(err.code(), Some("XPTY0004"));
    }

    #[test]
    fn test_literal_cardinality_mismatch_fails_statically() {
        let mut arena = ExprArena::new();
        let lit = arena.ints(&[1, 2]);
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        assert!(static_type_check(&mut v, lit, &required("xs:integer"), &role()).is_err());
    }

    #[test]
    fn test_empty_where_one_is_required() {
        let mut arena = ExprArena::new();
        let empty = arena.empty();
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let err = static_type_check(&mut v, empty, &required("xs:string"), &role()).unwrap_err();
        assert!(err.message().contains("empty sequence"));
    }

    #[test]
    fn test_overlapping_type_gets_item_checker() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("v", required("xs:anyAtomicType"));
        let r = arena.global_ref("v", required("xs:anyAtomicType"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, r, &required("xs:boolean"), &role()).unwrap();
        assert!(matches!(v.arena().kind(out), ExprKind::ItemChecker { .. }));
    }

    #[test]
    fn test_untyped_literal_is_converted_at_compile_time() {
        let mut arena = ExprArena::new();
        let lit = arena.literal(vec![Item::Atomic(AtomicValue::untyped("5"))]);
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, lit, &required("xs:integer"), &role()).unwrap();
        let seq = kinds::literal_value(v.arena(), out).unwrap();
        assert_eq!(seq[0].as_atomic(), Some(&AtomicValue::Integer(5)));
    }

    #[test]
    fn test_bad_untyped_literal_is_a_static_error() {
        let mut arena = ExprArena::new();
        let lit = arena.literal(vec![Item::Atomic(AtomicValue::untyped("five"))]);
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let err = static_type_check(&mut v, lit, &required("xs:integer"), &role()).unwrap_err();
        assert_eq!(err.code(), Some("FORG0001"));
        assert!(err.is_static());
    }

    #[test]
    fn test_nodes_are_atomized_then_converted() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("e", required("element()"));
        let r = arena.global_ref("e", required("element()"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, r, &required("xs:double"), &role()).unwrap();
        assert!(matches!(
            v.arena().kind(out),
            ExprKind::UntypedConverter {
                target: AtomicType::Double
            }
        ));
        let inner = v.arena().operand(out, 0);
        assert!(matches!(v.arena().kind(inner), ExprKind::Atomizer));
    }

    #[test]
    fn test_integer_is_promoted_to_double() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("i", required("xs:integer"));
        let r = arena.global_ref("i", required("xs:integer"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, r, &required("xs:double"), &role()).unwrap();
        assert!(matches!(
            v.arena().kind(out),
            ExprKind::AtomicConverter {
                target: AtomicType::Double
            }
        ));
        assert_eq!(v.arena().item_type(out), ItemType::Atomic(AtomicType::Double));
    }

    #[test]
    fn test_strict_check_does_not_convert() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("i", required("xs:integer"));
        let r = arena.global_ref("i", required("xs:integer"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let err = strict_type_check(&mut v, r, &required("xs:double"), &role()).unwrap_err();
        assert_eq!(err.code(), Some("XPTY0004"));
    }

    #[test]
    fn test_disjoint_but_both_optional_only_warns() {
        let mut arena = ExprArena::new();
        let sink = Rc::new(CollectWarnings::new());
        let mut ctx = StaticContext::default().with_warning_sink(sink.clone());
        ctx.declare_variable("d", required("xs:date?"));
        let r = arena.global_ref("d", required("xs:date?"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = strict_type_check(&mut v, r, &required("xs:integer?"), &role()).unwrap();
        assert!(matches!(v.arena().kind(out), ExprKind::ItemChecker { .. }));
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn test_disjoint_with_one_side_required_is_fatal() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("d", required("xs:date?"));
        let r = arena.global_ref("d", required("xs:date?"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        assert!(strict_type_check(&mut v, r, &required("xs:integer"), &role()).is_err());
    }

    #[test]
    fn test_cardinality_guard() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("s", required("xs:string*"));
        let r = arena.global_ref("s", required("xs:string*"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, r, &required("xs:string"), &role()).unwrap();
        assert!(matches!(
            v.arena().kind(out),
            ExprKind::CardinalityChecker {
                required: Cardinality::ExactlyOne,
                ..
            }
        ));
    }

    #[test]
    fn test_backwards_compatible_takes_first_and_stringifies() {
        let mut arena = ExprArena::new();
        let config = CompilerConfig::default().with_backwards_compatible(true);
        let mut ctx = StaticContext::new(config).unwrap();
        ctx.declare_variable("n", required("element()*"));
        let r = arena.global_ref("n", required("element()*"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, r, &required("xs:string"), &role()).unwrap();
        assert!(matches!(
            v.arena().kind(out),
            ExprKind::FunctionCall(SystemFunction::String)
        ));
        let first = v.arena().operand(out, 0);
        assert!(matches!(v.arena().kind(first), ExprKind::FirstItem));
    }

    #[test]
    fn test_function_items_cannot_be_atomized() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("m", required("map(*)"));
        let r = arena.global_ref("m", required("map(*)"));
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let err = static_type_check(&mut v, r, &required("xs:string"), &role()).unwrap_err();
        assert_eq!(err.code(), Some("FOTY0013"));
    }

    #[test]
    fn test_node_literal_matching_node_type() {
        let mut arena = ExprArena::new();
        let lit = arena.literal(vec![Item::from(XdmNode::element("p", "x"))]);
        let ctx = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &ctx);
        let out = static_type_check(&mut v, lit, &required("element()"), &role()).unwrap();
        assert_eq!(out, lit);
    }
}

//! `E cast as T` and `E cast as T?`.

use crate::arena::ExprId;
use crate::error::{XPathError, XResult};
use crate::kind::{CastSpec, ExprKind};
use crate::kinds::{evaluate_early, fold_if_constant, literal_value, make_literal, replace};
use crate::role::RoleDiagnostic;
use crate::type_checker::static_type_check;
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{AtomicType, Cardinality, ItemType, SequenceType};
use quire_xdm::{Castability, Converter, cast_possibility};

fn spec_of(v: &ExpressionVisitor<'_>, id: ExprId) -> Option<CastSpec> {
    match v.arena().kind(id) {
        ExprKind::Cast(spec) => Some(*spec),
        _ => None,
    }
}

/// The converter for a statically known operand type, `Ok(None)` when the
/// source type is too loose to decide.
fn choose_converter(source: &ItemType, target: AtomicType) -> Result<Option<Converter>, ()> {
    if let Some(from) = source.as_atomic() {
        return Converter::for_types(from, target).map(Some).ok_or(());
    }
    if let Some(members) = source.atomic_members()
        && !source.is_error()
        && members
            .iter()
            .all(|m| cast_possibility(*m, target) == Castability::Never)
    {
        return Err(());
    }
    Ok(None)
}

pub fn type_check(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    let Some(mut spec) = spec_of(v, id) else {
        return Ok(id);
    };
    if spec.target.is_abstract() {
        let message = format!("Cannot cast to the abstract type {}", spec.target);
        return Err(v.static_error_at(id, XPathError::static_error("XPST0080", message)));
    }

    let cardinality = if spec.allows_empty {
        Cardinality::ZeroOrOne
    } else {
        Cardinality::ExactlyOne
    };
    let required = SequenceType::new(ItemType::any_atomic(), cardinality);
    let role = RoleDiagnostic::type_operation("cast as");
    let operand = v.arena().operand(id, 0);
    let operand = static_type_check(v, operand, &required, &role)?;
    v.arena_mut().replace_operand(id, 0, operand);

    let source = v.arena().item_type(operand);
    match choose_converter(&source, spec.target) {
        Ok(converter) => spec.converter = converter,
        Err(()) => {
            let message = format!("Casting from {} to {} can never succeed", source, spec.target);
            return Err(v.static_error_at(id, XPathError::static_type("XPTY0004", message)));
        }
    }
    v.arena_mut().set_kind(id, ExprKind::Cast(spec));

    if literal_value(v.arena(), operand).is_some() {
        let seq = evaluate_early(v, id).map_err(|e| v.static_error_at(id, e.into_static()))?;
        return Ok(make_literal(v, id, seq));
    }
    Ok(id)
}

pub fn optimize(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    let Some(mut spec) = spec_of(v, id) else {
        return Ok(id);
    };
    let operand = v.arena().operand(id, 0);
    if spec.allows_empty && !v.arena().cardinality(operand).allows_zero() {
        spec.allows_empty = false;
        v.arena_mut().set_kind(id, ExprKind::Cast(spec));
    }

    // (E cast as xs:string) cast as T, where E is already a T
    if let ExprKind::Cast(inner) = v.arena().kind(operand)
        && matches!(inner.target, AtomicType::String | AtomicType::UntypedAtomic)
    {
        let original = v.arena().operand(operand, 0);
        let props = v.arena().props(original);
        let same_type = props.item_type == ItemType::atomic(spec.target);
        let card_ok = spec.allows_empty || !props.cardinality.allows_zero();
        if same_type && card_ok {
            v.trace(|| format!("Removed round trip through {}", inner.target));
            return Ok(replace(v, id, original));
        }
    }
    Ok(fold_if_constant(v, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ExprArena;
    use crate::context::StaticContext;
    use crate::eval::DynamicContext;
    use crate::kinds::literal_integer;
    use crate::visitor::compile_passes;
    use quire_xdm::{AtomicValue, Item};

    fn context() -> StaticContext {
        let mut ctx = StaticContext::default();
        ctx.declare_variable("d", "xs:date".parse().unwrap());
        ctx.declare_variable("i", "xs:integer".parse().unwrap());
        ctx.declare_variable("s", "xs:string?".parse().unwrap());
        ctx
    }

    #[test]
    fn test_abstract_target_is_rejected() {
        let mut arena = ExprArena::new();
        let s = arena.string("1");
        let cast = arena.cast(s, AtomicType::AnyAtomic, false);
        let err = compile_passes(&mut arena, cast, &context()).unwrap_err();
        assert_eq!(err.code(), Some("XPST0080"));
    }

    #[test]
    fn test_impossible_cast_is_rejected() {
        let mut arena = ExprArena::new();
        let d = arena.global_ref("d", SequenceType::any());
        let cast = arena.cast(d, AtomicType::Integer, false);
        let err = compile_passes(&mut arena, cast, &context()).unwrap_err();
        assert_eq!(err.code(), Some("XPTY0004"));
    }

    #[test]
    fn test_literal_operand_is_cast_early() {
        let mut arena = ExprArena::new();
        let s = arena.string(" 12 ");
        let cast = arena.cast(s, AtomicType::Integer, false);
        let root = compile_passes(&mut arena, cast, &context()).unwrap();
        assert_eq!(literal_integer(&arena, root), Some(12));
    }

    #[test]
    fn test_invalid_literal_is_a_static_error() {
        let mut arena = ExprArena::new();
        let s = arena.string("twelve");
        let cast = arena.cast(s, AtomicType::Integer, false);
        let err = compile_passes(&mut arena, cast, &context()).unwrap_err();
        assert!(err.is_static());
        assert_eq!(err.code(), Some("FORG0001"));
    }

    #[test]
    fn test_optional_cast_tightens() {
        let mut arena = ExprArena::new();
        let i = arena.global_ref("i", SequenceType::any());
        let cast = arena.cast(i, AtomicType::String, true);
        let root = compile_passes(&mut arena, cast, &context()).unwrap();
        let ExprKind::Cast(spec) = arena.kind(root) else {
            panic!("expected a cast");
        };
        assert!(!spec.allows_empty);
        assert_eq!(spec.converter, Some(Converter::Cast {
            from: AtomicType::Integer,
            to: AtomicType::String
        }));
        assert_eq!(arena.cardinality(root), Cardinality::ExactlyOne);
    }

    #[test]
    fn test_empty_operand_of_optional_cast() {
        let mut arena = ExprArena::new();
        let s = arena.global_ref("s", SequenceType::any());
        let cast = arena.cast(s, AtomicType::Double, true);
        let root = compile_passes(&mut arena, cast, &context()).unwrap();
        let out = DynamicContext::new(&arena)
            .with_global("s", vec![])
            .evaluate(root)
            .unwrap();
        assert!(out.is_empty());
        let out = DynamicContext::new(&arena)
            .with_global("s", vec![Item::from(AtomicValue::string("2.5"))])
            .evaluate(root)
            .unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Double(2.5)));
    }

    #[test]
    fn test_round_trip_through_string_is_removed() {
        let mut arena = ExprArena::new();
        let i = arena.global_ref("i", SequenceType::any());
        let to_string = arena.cast(i, AtomicType::String, false);
        let back = arena.cast(to_string, AtomicType::Integer, false);
        let root = compile_passes(&mut arena, back, &context()).unwrap();
        assert_eq!(root, i);
    }

    #[test]
    fn test_identity_cast_is_kept() {
        let mut arena = ExprArena::new();
        let i = arena.global_ref("i", SequenceType::any());
        let cast = arena.cast(i, AtomicType::Integer, false);
        let root = compile_passes(&mut arena, cast, &context()).unwrap();
        assert!(matches!(
            arena.kind(root),
            ExprKind::Cast(CastSpec {
                converter: Some(Converter::Identity),
                ..
            })
        ));
    }
}

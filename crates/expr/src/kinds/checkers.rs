//! The guards and converters inserted by the type checker. Each one
//! disappears once its operand is statically known to satisfy it.

use crate::arena::ExprId;
use crate::error::XResult;
use crate::kind::ExprKind;
use crate::kinds::{fold_if_constant, replace};
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{AtomicType, ItemType, Relation};

fn is_redundant(v: &ExpressionVisitor<'_>, id: ExprId) -> bool {
    let operand = v.arena().operand(id, 0);
    let props = v.arena().props(operand);
    let supplied = &props.item_type;
    match v.arena().kind(id) {
        ExprKind::ItemChecker { required, .. } => supplied.is_subtype(required),
        ExprKind::CardinalityChecker { required, .. } => required.subsumes(props.cardinality),
        ExprKind::Atomizer => supplied.is_plain(),
        ExprKind::UntypedConverter { .. } => {
            supplied.relationship(&ItemType::atomic(AtomicType::UntypedAtomic))
                == Relation::Disjoint
        }
        ExprKind::AtomicConverter { target } => {
            let promotable = ItemType::numeric().relationship(supplied) != Relation::Disjoint
                || supplied.relationship(&ItemType::atomic(AtomicType::AnyUri))
                    != Relation::Disjoint;
            supplied.is_subtype(&ItemType::atomic(*target)) || !promotable
        }
        ExprKind::FunctionCoercer { required, .. } => {
            supplied.is_subtype(&ItemType::Function(required.clone()))
        }
        _ => false,
    }
}

fn settle(v: &mut ExpressionVisitor<'_>, id: ExprId) -> ExprId {
    if is_redundant(v, id) {
        let operand = v.arena().operand(id, 0);
        let name = v.arena().kind(id).display_name();
        v.trace(|| format!("Removed redundant {}", name));
        return replace(v, id, operand);
    }
    fold_if_constant(v, id)
}

pub fn type_check(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.type_check_children(id, info)?;
    Ok(settle(v, id))
}

pub fn optimize(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    Ok(settle(v, id))
}

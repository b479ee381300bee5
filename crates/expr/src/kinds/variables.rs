//! The context item, variable references, and the `let` and `for`
//! bindings.

use crate::arena::{ExprArena, ExprId, VariableId};
use crate::error::{XPathError, XResult};
use crate::kind::{EvaluationMode, ExprKind, VariableTarget};
use crate::kinds::{self, literal_value, replace};
use crate::promotion;
use crate::role::RoleDiagnostic;
use crate::type_checker::strict_type_check;
use crate::visitor::{ContextItemStaticInfo, ExpressionVisitor};
use quire_types::{Cardinality, SequenceType};

pub fn type_check_context_item(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    if info.absent {
        return Err(v.static_error_at(
            id,
            XPathError::static_type("XPDY0002", "The context item is absent at this point"),
        ));
    }
    if let ExprKind::ContextItem { item_type } = v.arena_mut().kind_mut(id) {
        *item_type = info.item_type.clone();
    }
    Ok(id)
}

/// Static type of the value bound by `binding`, as seen from a reference
/// in its action.
fn bound_type(arena: &ExprArena, binding: ExprId) -> SequenceType {
    let seq = arena.operand(binding, 0);
    match arena.kind(binding) {
        ExprKind::For(_) => SequenceType::new(arena.item_type(seq), Cardinality::ExactlyOne),
        _ => SequenceType::new(arena.item_type(seq), arena.cardinality(seq)),
    }
}

fn unbound(v: &ExpressionVisitor<'_>, id: ExprId, name: &str) -> XPathError {
    v.static_error_at(
        id,
        XPathError::static_error("XPST0008", format!("Variable ${} has not been declared", name)),
    )
}

fn set_reference_type(v: &mut ExpressionVisitor<'_>, id: ExprId, static_type: SequenceType) {
    let unchanged = matches!(v.arena().kind(id), ExprKind::VarRef(r) if r.static_type == static_type);
    if unchanged {
        return;
    }
    if let ExprKind::VarRef(r) = v.arena_mut().kind_mut(id) {
        r.static_type = static_type;
    }
}

pub fn type_check_var_ref(v: &mut ExpressionVisitor<'_>, id: ExprId) -> XResult<ExprId> {
    let ExprKind::VarRef(r) = v.arena().kind(id) else {
        return Ok(id);
    };
    let (name, target) = (r.name.clone(), r.target);
    let static_type = match target {
        VariableTarget::Global => match v.context().variable_type(&name) {
            Some(t) => t.clone(),
            None => return Err(unbound(v, id, &name)),
        },
        VariableTarget::Local(var) => match v.arena().find_binding(id, var) {
            Some(binding) => bound_type(v.arena(), binding),
            None => return Err(unbound(v, id, &name)),
        },
    };
    set_reference_type(v, id, static_type);
    Ok(id)
}

/// Refreshes the static type of a local reference, whose binding may have
/// been rewritten, and records whether it sits in a loop.
pub fn optimize_var_ref(v: &mut ExpressionVisitor<'_>, id: ExprId) -> XResult<ExprId> {
    let ExprKind::VarRef(r) = v.arena().kind(id) else {
        return Ok(id);
    };
    let VariableTarget::Local(var) = r.target else {
        return Ok(id);
    };
    let binding = v.arena().find_binding(id, var);
    let in_loop = v.is_looping_subexpression(binding);
    if let Some(b) = binding {
        let static_type = bound_type(v.arena(), b);
        set_reference_type(v, id, static_type);
    }
    let changed = matches!(v.arena().kind(id), ExprKind::VarRef(r) if r.in_loop != in_loop);
    if changed && let ExprKind::VarRef(r) = v.arena_mut().kind_mut(id) {
        r.in_loop = in_loop;
    }
    Ok(id)
}

/// The variable of an untyped `let`; a declared type must still be
/// checked, so typed bindings are never collapsed.
fn untyped_binding_var(v: &ExpressionVisitor<'_>, id: ExprId) -> Option<VariableId> {
    match v.arena().kind(id) {
        ExprKind::Let(b) if b.required.is_none() => Some(b.var),
        _ => None,
    }
}

/// `let $x := E return $x` is just `E`.
pub fn simplify_let(v: &mut ExpressionVisitor<'_>, id: ExprId) -> XResult<ExprId> {
    v.simplify_children(id)?;
    let Some(var) = untyped_binding_var(v, id) else {
        return Ok(id);
    };
    let action = v.arena().operand(id, 1);
    let trivial = matches!(
        v.arena().kind(action),
        ExprKind::VarRef(r) if r.target == VariableTarget::Local(var)
    );
    if trivial {
        let seq = v.arena().operand(id, 0);
        return Ok(replace(v, id, seq));
    }
    Ok(id)
}

pub fn type_check_let(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    let seq = v.type_check_operand(id, 0, info)?;
    if let ExprKind::Let(b) = v.arena().kind(id)
        && let Some(required) = b.required.clone()
    {
        let role = RoleDiagnostic::variable(b.name.clone());
        let checked = strict_type_check(v, seq, &required, &role)?;
        v.arena_mut().replace_operand(id, 0, checked);
    }
    v.type_check_operand(id, 1, info)?;
    Ok(id)
}

/// References to `var` in the action of `binding`, found by a full scan.
/// `None` when the scan would visit more than `budget` nodes.
fn scan_references(
    arena: &ExprArena,
    binding: ExprId,
    var: VariableId,
    budget: usize,
) -> Option<Vec<ExprId>> {
    let mut found = Vec::new();
    let mut stack = vec![arena.operand(binding, 1)];
    let mut visited = 0;
    while let Some(id) = stack.pop() {
        visited += 1;
        if visited > budget {
            return None;
        }
        if let ExprKind::VarRef(r) = arena.kind(id)
            && r.target == VariableTarget::Local(var)
        {
            found.push(id);
        }
        for op in arena.operands(id).iter().rev() {
            stack.push(op.child);
        }
    }
    Some(found)
}

fn refers_to(arena: &ExprArena, root: ExprId, var: VariableId) -> bool {
    arena.subtree(root).into_iter().any(|id| {
        matches!(arena.kind(id), ExprKind::VarRef(r) if r.target == VariableTarget::Local(var))
    })
}

/// Whether `var` is read inside the guarded operand of a try/catch under
/// `root`. A lazily evaluated binding would raise its errors there.
fn referenced_in_try(arena: &ExprArena, root: ExprId, var: VariableId) -> bool {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let children = arena.children(id);
        match arena.kind(id) {
            ExprKind::TryCatch { .. } => {
                if let Some(guarded) = children.first()
                    && refers_to(arena, *guarded, var)
                {
                    return true;
                }
                stack.extend(children.iter().skip(1).copied());
            }
            _ => stack.extend(children.iter().copied()),
        }
    }
    false
}

pub fn optimize_let(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_operand(id, 0, info)?;
    v.optimize_operand(id, 1, info)?;

    let ExprKind::Let(binding) = v.arena().kind(id) else {
        return Ok(id);
    };
    let (var, name, indexed) = (binding.var, binding.name.clone(), binding.indexed);
    let recorded = binding.references.len();

    // short lists may be out of date
    let references = if recorded <= 1 {
        match scan_references(v.arena(), id, var, v.config().reference_scan_budget) {
            Some(found) => found,
            None => {
                v.trace(|| format!("Reference scan for ${} exceeded its budget", name));
                return Ok(id);
            }
        }
    } else {
        binding.references.clone()
    };

    let seq = v.arena().operand(id, 0);
    let action = v.arena().operand(id, 1);

    if references.is_empty() {
        v.trace(|| format!("Eliminated unused variable ${}", name));
        return Ok(replace(v, id, action));
    }

    if references.len() == 1 && !v.arena().is_looping_reference(references[0], id) {
        v.trace(|| format!("Inlined local variable ${}", name));
        v.arena_mut().replace_node(references[0], seq);
        // the reference may have been the action itself
        let action = v.arena().operand(id, 1);
        let action = replace(v, id, action);
        return reoptimize(v, action, info);
    }

    if let Some(value) = literal_value(v.arena(), seq).cloned() {
        v.trace(|| format!("Inlined constant value of ${}", name));
        for r in references {
            let loc = v.arena().location(r);
            let copy = v
                .arena_mut()
                .alloc_at(ExprKind::Literal(value.clone()), vec![], loc);
            v.arena_mut().replace_node(r, copy);
        }
        let action = replace(v, id, action);
        return reoptimize(v, action, info);
    }

    let mode = if referenced_in_try(v.arena(), action, var) {
        EvaluationMode::Eager
    } else if indexed {
        EvaluationMode::Materialized
    } else {
        EvaluationMode::Lazy
    };
    if let ExprKind::Let(b) = v.arena_mut().kind_mut(id) {
        b.mode = mode;
        b.references = references;
    }
    Ok(id)
}

/// Re-optimizes an action after an inlining, until it settles or the
/// configured number of rounds is used up.
fn reoptimize(
    v: &mut ExpressionVisitor<'_>,
    mut current: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    for _ in 0..v.config().max_optimize_rounds {
        let next = v.optimize(current, info)?;
        if next == current {
            break;
        }
        current = next;
    }
    Ok(current)
}

pub fn optimize_for(
    v: &mut ExpressionVisitor<'_>,
    id: ExprId,
    info: &ContextItemStaticInfo,
) -> XResult<ExprId> {
    v.optimize_children(id, info)?;
    let seq = v.arena().operand(id, 0);
    if v.arena().cardinality(seq) == Cardinality::Empty {
        return Ok(replace(v, id, seq));
    }
    let id = kinds::fold_if_constant(v, id);
    promotion::promote_loop_invariants(v, id)
}

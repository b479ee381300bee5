//! State threaded through the simplify, type-check and optimize passes.

use crate::arena::{ExprArena, ExprId};
use crate::config::CompilerConfig;
use crate::context::StaticContext;
use crate::error::{Location, XPathError, XResult};
use crate::kinds;
use crate::operand::FocusRole;
use quire_types::ItemType;

/// What is statically known about the context item at some point of the
/// expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextItemStaticInfo {
    pub item_type: ItemType,
    /// No context item exists at all; `.` here is an error.
    pub absent: bool,
}

impl ContextItemStaticInfo {
    pub fn new(item_type: ItemType) -> Self {
        ContextItemStaticInfo {
            item_type,
            absent: false,
        }
    }

    pub fn absent() -> Self {
        ContextItemStaticInfo {
            item_type: ItemType::Error,
            absent: true,
        }
    }

    pub fn from_context(context: &StaticContext) -> Self {
        match &context.context_item {
            Some(t) => Self::new(t.clone()),
            None => Self::absent(),
        }
    }
}

pub struct ExpressionVisitor<'a> {
    arena: &'a mut ExprArena,
    context: &'a StaticContext,
    stack: Vec<ExprId>,
}

impl<'a> ExpressionVisitor<'a> {
    pub fn new(arena: &'a mut ExprArena, context: &'a StaticContext) -> Self {
        ExpressionVisitor {
            arena,
            context,
            stack: Vec::new(),
        }
    }

    pub fn arena(&self) -> &ExprArena {
        &*self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ExprArena {
        &mut *self.arena
    }

    pub fn context(&self) -> &'a StaticContext {
        self.context
    }

    pub fn config(&self) -> &'a CompilerConfig {
        &self.context.config
    }

    /// Ancestors of the node currently being visited, outermost first.
    pub fn stack(&self) -> &[ExprId] {
        &self.stack
    }

    pub fn simplify(&mut self, id: ExprId) -> XResult<ExprId> {
        let loc = self.arena.location(id);
        self.stack.push(id);
        let result = kinds::simplify(self, id);
        self.stack.pop();
        self.settle(id, result, loc)
    }

    pub fn type_check(&mut self, id: ExprId, info: &ContextItemStaticInfo) -> XResult<ExprId> {
        let loc = self.arena.location(id);
        self.stack.push(id);
        let result = kinds::type_check(self, id, info);
        self.stack.pop();
        self.settle(id, result, loc)
    }

    pub fn optimize(&mut self, id: ExprId, info: &ContextItemStaticInfo) -> XResult<ExprId> {
        let loc = self.arena.location(id);
        self.stack.push(id);
        let result = kinds::optimize(self, id, info);
        self.stack.pop();
        self.settle(id, result, loc)
    }

    /// Gives a replacement the location of the node it replaces, and
    /// locates errors that do not have a location yet.
    fn settle(&mut self, id: ExprId, result: XResult<ExprId>, loc: Location) -> XResult<ExprId> {
        match result {
            Ok(new) => {
                if new != id && self.arena.location(new).is_unknown() {
                    self.arena.set_location(new, loc);
                }
                Ok(new)
            }
            Err(e) => Err(e.at(loc)),
        }
    }

    pub fn simplify_children(&mut self, id: ExprId) -> XResult<()> {
        for i in 0..self.arena.operand_count(id) {
            let child = self.arena.operand(id, i);
            let new = self.simplify(child)?;
            self.arena.replace_operand(id, i, new);
        }
        Ok(())
    }

    /// Context for operand `index` of `id`: a new-focus operand sees the
    /// items of operand 0 as its context.
    pub fn operand_context(
        &self,
        id: ExprId,
        index: usize,
        info: &ContextItemStaticInfo,
    ) -> ContextItemStaticInfo {
        match self.arena.operands(id)[index].role.focus {
            FocusRole::Same => info.clone(),
            FocusRole::New => {
                let base = self.arena.operand(id, 0);
                ContextItemStaticInfo::new(self.arena.item_type(base))
            }
            FocusRole::None => ContextItemStaticInfo::absent(),
        }
    }

    pub fn type_check_operand(
        &mut self,
        id: ExprId,
        index: usize,
        info: &ContextItemStaticInfo,
    ) -> XResult<ExprId> {
        let child_info = self.operand_context(id, index, info);
        let child = self.arena.operand(id, index);
        let new = self.type_check(child, &child_info)?;
        self.arena.replace_operand(id, index, new);
        Ok(new)
    }

    pub fn optimize_operand(
        &mut self,
        id: ExprId,
        index: usize,
        info: &ContextItemStaticInfo,
    ) -> XResult<ExprId> {
        let child_info = self.operand_context(id, index, info);
        let child = self.arena.operand(id, index);
        let new = self.optimize(child, &child_info)?;
        self.arena.replace_operand(id, index, new);
        Ok(new)
    }

    pub fn type_check_children(&mut self, id: ExprId, info: &ContextItemStaticInfo) -> XResult<()> {
        for i in 0..self.arena.operand_count(id) {
            self.type_check_operand(id, i, info)?;
        }
        Ok(())
    }

    pub fn optimize_children(&mut self, id: ExprId, info: &ContextItemStaticInfo) -> XResult<()> {
        for i in 0..self.arena.operand_count(id) {
            self.optimize_operand(id, i, info)?;
        }
        Ok(())
    }

    /// Whether the node on top of the stack is evaluated repeatedly
    /// relative to `binding` (or relative to the whole expression when
    /// `binding` is `None`).
    pub fn is_looping_subexpression(&self, binding: Option<ExprId>) -> bool {
        for pair in self.stack.windows(2).rev() {
            let (parent, child) = (pair[0], pair[1]);
            if Some(parent) == binding {
                return false;
            }
            if self
                .arena
                .role_of(parent, child)
                .is_some_and(|r| r.repeated)
            {
                return true;
            }
        }
        false
    }

    pub fn issue_warning(&self, message: &str, location: Location) {
        self.context.issue_warning(message, location);
    }

    /// Records an optimizer decision when tracing is enabled.
    pub fn trace(&self, message: impl FnOnce() -> String) {
        if self.context.config.trace_optimizer_decisions {
            log::debug!("{}", message());
        }
    }

    pub fn static_error_at(&self, id: ExprId, error: XPathError) -> XPathError {
        error.at(self.arena.location(id))
    }
}

/// Runs the three passes over the tree rooted at `root` and returns the
/// new root.
pub fn compile_passes(
    arena: &mut ExprArena,
    root: ExprId,
    context: &StaticContext,
) -> XResult<ExprId> {
    let info = ContextItemStaticInfo::from_context(context);
    let mut visitor = ExpressionVisitor::new(arena, context);
    let root = visitor.simplify(root)?;
    settle_root(visitor.arena_mut(), root, "simplify");
    let root = visitor.type_check(root, &info)?;
    settle_root(visitor.arena_mut(), root, "type check");
    let root = visitor.optimize(root, &info)?;
    settle_root(visitor.arena_mut(), root, "optimize");
    Ok(root)
}

fn settle_root(arena: &mut ExprArena, root: ExprId, pass: &str) {
    arena.detach(root);
    debug_assert_eq!(
        arena.verify_parent_pointers(root),
        Ok(()),
        "inconsistent tree after the {} pass",
        pass
    );
    log::trace!("{} pass done; root is {}", pass, arena.kind(root).display_name());
}

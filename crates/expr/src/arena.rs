//! Index-addressed storage for the expression graph.
//!
//! Nodes are never freed individually: a rewrite that drops a subtree
//! simply stops referencing it. Every edge is owned by exactly one
//! [`Operand`], and each node records the parent holding that edge so that
//! ancestor queries are O(depth).

use crate::error::Location;
use crate::kind::{ExprKind, VariableTarget};
use crate::operand::{Operand, OperandRole};
use crate::properties::{self, StaticProperties};
use quire_types::{Cardinality, ItemType};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a local variable binding, independent of where the binding
/// node currently sits in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(u32);

impl VariableId {
    pub fn from_raw(raw: u32) -> Self {
        VariableId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    operands: Vec<Operand>,
    parent: Option<ExprId>,
    location: Location,
    properties: OnceCell<StaticProperties>,
}

#[derive(Debug, Default, Clone)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    next_variable: u32,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node owning `children`. Each child is reparented to the new
    /// node; callers must make sure no other operand still refers to it.
    pub fn alloc(&mut self, kind: ExprKind, children: Vec<ExprId>) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        let count = children.len();
        let operands = children
            .iter()
            .enumerate()
            .map(|(i, c)| Operand::new(*c, kind.operand_role(i, count)))
            .collect();
        for child in &children {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(ExprNode {
            kind,
            operands,
            parent: None,
            location: Location::UNKNOWN,
            properties: OnceCell::new(),
        });
        id
    }

    pub fn alloc_at(&mut self, kind: ExprKind, children: Vec<ExprId>, location: Location) -> ExprId {
        let id = self.alloc(kind, children);
        self.nodes[id.index()].location = location;
        id
    }

    pub fn new_variable(&mut self) -> VariableId {
        let v = VariableId(self.next_variable);
        self.next_variable += 1;
        v
    }

    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.index()].kind
    }

    /// Mutable access to the payload. Cached properties of the node and
    /// its ancestors are dropped, since the payload may affect them.
    pub fn kind_mut(&mut self, id: ExprId) -> &mut ExprKind {
        self.invalidate(id);
        &mut self.nodes[id.index()].kind
    }

    /// Replaces the payload, keeping the operands but recomputing their
    /// roles for the new kind.
    pub fn set_kind(&mut self, id: ExprId, kind: ExprKind) {
        let count = self.nodes[id.index()].operands.len();
        let node = &mut self.nodes[id.index()];
        for (i, op) in node.operands.iter_mut().enumerate() {
            op.role = kind.operand_role(i, count);
        }
        node.kind = kind;
        self.invalidate(id);
    }

    pub fn operands(&self, id: ExprId) -> &[Operand] {
        &self.nodes[id.index()].operands
    }

    pub fn operand_count(&self, id: ExprId) -> usize {
        self.nodes[id.index()].operands.len()
    }

    pub fn operand(&self, id: ExprId, index: usize) -> ExprId {
        self.nodes[id.index()].operands[index].child
    }

    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        self.operands(id).iter().map(|o| o.child).collect()
    }

    pub fn parent(&self, id: ExprId) -> Option<ExprId> {
        self.nodes[id.index()].parent
    }

    pub fn location(&self, id: ExprId) -> Location {
        self.nodes[id.index()].location
    }

    pub fn set_location(&mut self, id: ExprId, location: Location) {
        self.nodes[id.index()].location = location;
    }

    pub fn props(&self, id: ExprId) -> &StaticProperties {
        self.nodes[id.index()]
            .properties
            .get_or_init(|| properties::compute(self, id))
    }

    pub fn cardinality(&self, id: ExprId) -> Cardinality {
        self.props(id).cardinality
    }

    pub fn item_type(&self, id: ExprId) -> ItemType {
        self.props(id).item_type.clone()
    }

    /// Drops the cached properties of `id` and of every ancestor. They are
    /// recomputed on the next read.
    pub fn invalidate(&mut self, id: ExprId) {
        let mut current = Some(id);
        while let Some(c) = current {
            let node = &mut self.nodes[c.index()];
            node.properties.take();
            current = node.parent;
        }
    }

    /// Installs `new` as operand `index` of `parent`. The displaced child is
    /// detached; the replacement inherits its location when it has none.
    pub fn replace_operand(&mut self, parent: ExprId, index: usize, new: ExprId) {
        let old = self.nodes[parent.index()].operands[index].child;
        if old == new {
            return;
        }
        if self.location(new).is_unknown() {
            let loc = self.location(old);
            self.set_location(new, loc);
        }
        if self.nodes[old.index()].parent == Some(parent) {
            self.nodes[old.index()].parent = None;
        }
        self.nodes[parent.index()].operands[index].child = new;
        self.nodes[new.index()].parent = Some(parent);
        self.invalidate(parent);
    }

    /// Puts `new` where `old` currently sits in the graph. When `old` is a
    /// root, `new` simply becomes a root too.
    pub fn replace_node(&mut self, old: ExprId, new: ExprId) {
        if old == new {
            return;
        }
        match self.parent(old).and_then(|p| self.operand_index(p, old).map(|i| (p, i))) {
            Some((p, i)) => self.replace_operand(p, i, new),
            None => {
                if self.location(new).is_unknown() {
                    let loc = self.location(old);
                    self.set_location(new, loc);
                }
                self.detach(new);
            }
        }
    }

    pub fn detach(&mut self, id: ExprId) {
        self.nodes[id.index()].parent = None;
    }

    /// Inserts a new node of `kind` between `child` and its parent.
    pub fn wrap(&mut self, child: ExprId, kind: ExprKind) -> ExprId {
        let parent = self.parent(child);
        let slot = parent.and_then(|p| self.operand_index(p, child).map(|i| (p, i)));
        let loc = self.location(child);
        let wrapper = self.alloc_at(kind, vec![child], loc);
        if let Some((p, i)) = slot {
            self.nodes[p.index()].operands[i].child = wrapper;
            self.nodes[wrapper.index()].parent = Some(p);
            self.invalidate(p);
        }
        wrapper
    }

    /// Exchanges two operands of `id`, recomputing their roles.
    pub fn swap_operands(&mut self, id: ExprId, i: usize, j: usize) {
        let node = &mut self.nodes[id.index()];
        node.operands.swap(i, j);
        let count = node.operands.len();
        for (k, op) in node.operands.iter_mut().enumerate() {
            op.role = node.kind.operand_role(k, count);
        }
        self.invalidate(id);
    }

    pub fn operand_index(&self, parent: ExprId, child: ExprId) -> Option<usize> {
        self.operands(parent).iter().position(|o| o.child == child)
    }

    pub fn role_of(&self, parent: ExprId, child: ExprId) -> Option<OperandRole> {
        self.operands(parent)
            .iter()
            .find(|o| o.child == child)
            .map(|o| o.role)
    }

    /// All nodes of the subtree rooted at `root`, parents before children.
    pub fn subtree(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for op in self.operands(id).iter().rev() {
                stack.push(op.child);
            }
        }
        out
    }

    /// True when `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: ExprId, id: ExprId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    /// Deep copy of a subtree. Bindings inside the copy get fresh variable
    /// identities and the references to them are redirected.
    pub fn copy_subtree(&mut self, root: ExprId) -> ExprId {
        let mut renamed = HashMap::new();
        let copy = self.copy_rec(root, &mut renamed);
        if !renamed.is_empty() {
            self.rebuild_reference_lists(copy);
        }
        copy
    }

    fn copy_rec(&mut self, id: ExprId, renamed: &mut HashMap<VariableId, VariableId>) -> ExprId {
        let mut kind = self.kind(id).clone();
        match &mut kind {
            ExprKind::Let(b) => {
                let fresh = self.new_variable();
                renamed.insert(b.var, fresh);
                b.var = fresh;
                b.references.clear();
            }
            ExprKind::For(b) => {
                let fresh = self.new_variable();
                renamed.insert(b.var, fresh);
                b.var = fresh;
            }
            _ => {}
        }
        let children: Vec<ExprId> = self
            .children(id)
            .into_iter()
            .map(|c| self.copy_rec(c, renamed))
            .collect();
        if let ExprKind::VarRef(r) = &mut kind
            && let VariableTarget::Local(v) = r.target
            && let Some(fresh) = renamed.get(&v)
        {
            r.target = VariableTarget::Local(*fresh);
        }
        let loc = self.location(id);
        self.alloc_at(kind, children, loc)
    }

    /// Recomputes the reference list of every let binding in the subtree.
    pub fn rebuild_reference_lists(&mut self, root: ExprId) {
        let nodes = self.subtree(root);
        let mut refs: HashMap<VariableId, Vec<ExprId>> = HashMap::new();
        for id in &nodes {
            if let ExprKind::VarRef(r) = self.kind(*id)
                && let VariableTarget::Local(v) = r.target
            {
                refs.entry(v).or_default().push(*id);
            }
        }
        for id in nodes {
            if let ExprKind::Let(b) = &mut self.nodes[id.index()].kind {
                b.references = refs.remove(&b.var).unwrap_or_default();
            }
        }
    }

    /// The binding node that declares `var` in scope at `reference`: an
    /// ancestor let/for whose action (operand 1) contains the reference.
    pub fn find_binding(&self, reference: ExprId, var: VariableId) -> Option<ExprId> {
        let mut child = reference;
        while let Some(p) = self.parent(child) {
            let declares = match self.kind(p) {
                ExprKind::Let(b) => b.var == var,
                ExprKind::For(b) => b.var == var,
                _ => false,
            };
            if declares && self.operand_index(p, child) == Some(1) {
                return Some(p);
            }
            child = p;
        }
        None
    }

    /// Whether `reference` may be evaluated more than once per evaluation
    /// of `binding`, or inside a try body where a deferred error would
    /// escape its handler.
    pub fn is_looping_reference(&self, reference: ExprId, binding: ExprId) -> bool {
        let mut child = reference;
        loop {
            let Some(p) = self.parent(child) else {
                return true;
            };
            if p == binding {
                return false;
            }
            if matches!(self.kind(p), ExprKind::TryCatch { .. }) {
                return true;
            }
            if self.role_of(p, child).is_some_and(|r| r.repeated) {
                return true;
            }
            child = p;
        }
    }

    /// Checks that every operand's child points back at its owner.
    pub fn verify_parent_pointers(&self, root: ExprId) -> Result<(), String> {
        for id in self.subtree(root) {
            for op in self.operands(id) {
                let actual = self.parent(op.child);
                if actual != Some(id) {
                    return Err(format!(
                        "{} ({}) is an operand of {} ({}) but its parent is {}",
                        op.child,
                        self.kind(op.child).display_name(),
                        id,
                        self.kind(id).display_name(),
                        actual.map_or_else(|| "none".to_string(), |p| p.to_string())
                    ));
                }
            }
        }
        Ok(())
    }
}

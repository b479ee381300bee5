//! Evaluation of a compiled expression tree.
//!
//! Every node can be iterated; nodes whose kind [evaluates
//! singly](ExprKind::evaluates_singly) also have a direct single-item
//! entry point, and each entry point falls back on the other for kinds it
//! does not implement natively.

use crate::arena::{ExprArena, ExprId, VariableId};
use crate::conversion;
use crate::error::{XPathError, XResult};
use crate::functions;
use crate::kind::{EvaluationMode, ExprKind, VariableTarget};
use crate::kinds::comparison;
use crate::properties::Dependencies;
use indexmap::IndexMap;
use quire_types::AtomicType;
use quire_xdm::{AtomicValue, Collation, Converter, Item, Sequence, arith, cast_atomic, value_compare};
use std::cell::RefCell;
use std::iter;
use std::rc::Rc;

/// A lazily produced sequence. Errors travel in-band; consumers stop at
/// the first one.
pub type SequenceIter<'a> = Box<dyn Iterator<Item = XResult<Item>> + 'a>;

#[derive(Debug, Clone)]
pub struct Focus {
    pub item: Item,
    /// 1-based.
    pub position: usize,
    /// Known only when the whole sequence has been read.
    pub size: Option<usize>,
}

struct Frame<'a> {
    var: VariableId,
    value: VariableValue<'a>,
    parent: Option<Rc<Frame<'a>>>,
}

#[derive(Clone)]
enum VariableValue<'a> {
    Eager(Rc<Sequence>),
    Memo(Rc<RefCell<Memo<'a>>>),
}

/// A variable value computed on first read. Items are kept as they are
/// produced, so that every reader sees the same sequence and the binding
/// expression runs at most once.
struct Memo<'a> {
    items: Vec<Item>,
    state: MemoState<'a>,
}

enum MemoState<'a> {
    Pending(ExprId, DynamicContext<'a>),
    Streaming(SequenceIter<'a>),
    /// A reader is pulling the next item.
    Busy,
    Done,
    Failed(XPathError),
}

struct MemoReader<'a> {
    memo: Rc<RefCell<Memo<'a>>>,
    index: usize,
    finished: bool,
}

impl<'a> Iterator for MemoReader<'a> {
    type Item = XResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let state = {
                let mut memo = self.memo.borrow_mut();
                if let Some(item) = memo.items.get(self.index) {
                    let item = item.clone();
                    self.index += 1;
                    return Some(Ok(item));
                }
                std::mem::replace(&mut memo.state, MemoState::Busy)
            };
            // the borrow is released while the binding expression runs
            match state {
                MemoState::Pending(expr, ctx) => {
                    let source = ctx.iterate(expr);
                    self.memo.borrow_mut().state = MemoState::Streaming(source);
                }
                MemoState::Streaming(mut source) => {
                    let next = source.next();
                    let mut memo = self.memo.borrow_mut();
                    match next {
                        Some(Ok(item)) => {
                            memo.items.push(item);
                            memo.state = MemoState::Streaming(source);
                        }
                        Some(Err(e)) => {
                            memo.state = MemoState::Failed(e.clone());
                            self.finished = true;
                            return Some(Err(e));
                        }
                        None => {
                            memo.state = MemoState::Done;
                            self.finished = true;
                            return None;
                        }
                    }
                }
                MemoState::Done => {
                    self.memo.borrow_mut().state = MemoState::Done;
                    self.finished = true;
                    return None;
                }
                MemoState::Failed(e) => {
                    self.memo.borrow_mut().state = MemoState::Failed(e.clone());
                    self.finished = true;
                    return Some(Err(e));
                }
                MemoState::Busy => {
                    self.finished = true;
                    return Some(Err(XPathError::dynamic(
                        "XPDY0002",
                        "Circular reference to a variable while it is being evaluated",
                    )));
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct DynamicContext<'a> {
    arena: &'a ExprArena,
    collation: Collation,
    backwards_compatible: bool,
    focus: Option<Rc<Focus>>,
    frames: Option<Rc<Frame<'a>>>,
    globals: Rc<IndexMap<String, Rc<Sequence>>>,
}

pub(crate) fn items_of<'a>(seq: Sequence) -> SequenceIter<'a> {
    Box::new(seq.into_iter().map(Ok))
}

fn shared_items<'a>(seq: Rc<Sequence>) -> SequenceIter<'a> {
    let len = seq.len();
    Box::new((0..len).map(move |i| Ok(seq[i].clone())))
}

pub(crate) fn option_iter<'a>(item: Option<Item>) -> SequenceIter<'a> {
    Box::new(item.into_iter().map(Ok))
}

pub(crate) fn empty<'a>() -> SequenceIter<'a> {
    Box::new(iter::empty())
}

pub(crate) fn bool_item(b: bool) -> Item {
    Item::Atomic(AtomicValue::Boolean(b))
}

fn ebv_error(message: impl Into<String>) -> XPathError {
    XPathError::dynamic("FORG0006", message)
}

/// Effective boolean value of a sequence. Only as many items as needed are
/// read.
pub fn effective_boolean_value(mut input: SequenceIter<'_>) -> XResult<bool> {
    let Some(first) = input.next() else {
        return Ok(false);
    };
    match first? {
        Item::Node(_) => Ok(true),
        Item::Atomic(a) => {
            if input.next().transpose()?.is_some() {
                return Err(ebv_error(
                    "Effective boolean value is not defined for a sequence of two or more items starting with an atomic value",
                ));
            }
            a.effective_boolean().ok_or_else(|| {
                ebv_error(format!(
                    "Effective boolean value is not defined for a value of type {}",
                    a.type_name()
                ))
            })
        }
        Item::Function(f) => Err(ebv_error(format!(
            "Effective boolean value is not defined for {}",
            f.function_type
        ))),
    }
}

/// A single numeric item used as a predicate selects by position.
fn numeric_singleton(value: &Sequence) -> Option<f64> {
    match value.as_slice() {
        [Item::Atomic(a)] if a.is_numeric() => Some(a.to_double()),
        _ => None,
    }
}

/// Untyped values in arithmetic are read as doubles.
fn numeric_value(value: AtomicValue) -> XResult<AtomicValue> {
    if value.is_untyped() {
        Ok(cast_atomic(&value, AtomicType::Double)?)
    } else {
        Ok(value)
    }
}

impl<'a> DynamicContext<'a> {
    pub fn new(arena: &'a ExprArena) -> Self {
        DynamicContext {
            arena,
            collation: Collation::default(),
            backwards_compatible: false,
            focus: None,
            frames: None,
            globals: Rc::new(IndexMap::new()),
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    pub fn with_backwards_compatible(mut self, on: bool) -> Self {
        self.backwards_compatible = on;
        self
    }

    pub fn with_context_item(self, item: Item) -> Self {
        self.with_focus(item, 1, Some(1))
    }

    pub fn with_global(mut self, name: impl Into<String>, value: Sequence) -> Self {
        Rc::make_mut(&mut self.globals).insert(name.into(), Rc::new(value));
        self
    }

    pub fn arena(&self) -> &'a ExprArena {
        self.arena
    }

    pub fn collation(&self) -> Collation {
        self.collation
    }

    pub fn backwards_compatible(&self) -> bool {
        self.backwards_compatible
    }

    pub fn focus(&self) -> Option<&Focus> {
        self.focus.as_deref()
    }

    pub(crate) fn with_focus(&self, item: Item, position: usize, size: Option<usize>) -> Self {
        let mut ctx = self.clone();
        ctx.focus = Some(Rc::new(Focus {
            item,
            position,
            size,
        }));
        ctx
    }

    fn bind(&self, var: VariableId, value: VariableValue<'a>) -> Self {
        let mut ctx = self.clone();
        ctx.frames = Some(Rc::new(Frame {
            var,
            value,
            parent: self.frames.clone(),
        }));
        ctx
    }

    fn lookup(&self, var: VariableId) -> Option<VariableValue<'a>> {
        let mut frame = self.frames.as_deref();
        while let Some(f) = frame {
            if f.var == var {
                return Some(f.value.clone());
            }
            frame = f.parent.as_deref();
        }
        None
    }

    pub fn iterate(&self, id: ExprId) -> SequenceIter<'a> {
        let result = if self.arena.kind(id).evaluates_singly() {
            self.evaluate_singly(id).map(option_iter)
        } else {
            self.try_iterate(id)
        };
        match result {
            Ok(it) => it,
            Err(e) => Box::new(iter::once(Err(e.at(self.arena.location(id))))),
        }
    }

    /// The first item of the value, for kinds that return at most one.
    pub fn evaluate_item(&self, id: ExprId) -> XResult<Option<Item>> {
        let result = if self.arena.kind(id).evaluates_singly() {
            self.evaluate_singly(id)
        } else {
            self.try_iterate(id)
                .and_then(|mut it| it.next().transpose())
        };
        result.map_err(|e| e.at(self.arena.location(id)))
    }

    pub fn evaluate(&self, id: ExprId) -> XResult<Sequence> {
        self.iterate(id).collect()
    }

    pub fn effective_boolean(&self, id: ExprId) -> XResult<bool> {
        effective_boolean_value(self.iterate(id))
    }

    pub(crate) fn atomic_operand(&self, id: ExprId) -> XResult<Option<AtomicValue>> {
        match self.evaluate_item(id)? {
            Some(item) => Ok(Some(item.atomize()?)),
            None => Ok(None),
        }
    }

    pub(crate) fn atomized(&self, id: ExprId) -> Box<dyn Iterator<Item = XResult<AtomicValue>> + 'a> {
        Box::new(
            self.iterate(id)
                .map(|r| r.and_then(|item| Ok(item.atomize()?))),
        )
    }

    /// The item at 1-based `position` of `base`; non-integral positions
    /// select nothing. Errors raised before the position is reached are
    /// reported.
    pub(crate) fn item_at(&self, base: ExprId, position: f64) -> XResult<Option<Item>> {
        if position < 1.0 || position.fract() != 0.0 || !position.is_finite() {
            return Ok(None);
        }
        let target = position as usize;
        for (i, r) in self.iterate(base).enumerate() {
            let item = r?;
            if i + 1 == target {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn evaluate_singly(&self, id: ExprId) -> XResult<Option<Item>> {
        let arena = self.arena;
        let op = |i: usize| arena.operand(id, i);
        match arena.kind(id) {
            ExprKind::ContextItem { .. } => match &self.focus {
                Some(focus) => Ok(Some(focus.item.clone())),
                None => Err(XPathError::dynamic("XPDY0002", "The context item is absent")),
            },
            ExprKind::Arithmetic(operator) => {
                let a = self.atomic_operand(op(0))?;
                let b = self.atomic_operand(op(1))?;
                match (a, b) {
                    (Some(a), Some(b)) => {
                        let result = arith::arithmetic(&numeric_value(a)?, *operator, &numeric_value(b)?)?;
                        Ok(Some(Item::Atomic(result)))
                    }
                    _ if self.backwards_compatible => Ok(Some(Item::Atomic(AtomicValue::Double(f64::NAN)))),
                    _ => Ok(None),
                }
            }
            ExprKind::Negate => match self.atomic_operand(op(0))? {
                Some(a) => Ok(Some(Item::Atomic(arith::negate(&numeric_value(a)?)?))),
                None => Ok(None),
            },
            ExprKind::ValueComparison {
                op: operator,
                result_when_empty,
            } => {
                let a = self.atomic_operand(op(0))?;
                let b = self.atomic_operand(op(1))?;
                match (a, b) {
                    (Some(a), Some(b)) => Ok(Some(bool_item(value_compare(
                        &a,
                        *operator,
                        &b,
                        self.collation,
                    )?))),
                    _ => Ok(result_when_empty.map(bool_item)),
                }
            }
            ExprKind::GeneralComparison { op: operator, shape, .. } => {
                comparison::evaluate_general(self, id, *operator, *shape).map(|b| Some(bool_item(b)))
            }
            ExprKind::IntegerRangeTest => {
                comparison::evaluate_integer_range_test(self, id).map(|b| Some(bool_item(b)))
            }
            ExprKind::And => {
                let result = self.effective_boolean(op(0))? && self.effective_boolean(op(1))?;
                Ok(Some(bool_item(result)))
            }
            ExprKind::Or => {
                let result = self.effective_boolean(op(0))? || self.effective_boolean(op(1))?;
                Ok(Some(bool_item(result)))
            }
            ExprKind::FirstItem => self.iterate(op(0)).next().transpose(),
            ExprKind::LastItem => {
                let mut last = None;
                for r in self.iterate(op(0)) {
                    last = Some(r?);
                }
                Ok(last)
            }
            ExprKind::Subscript => {
                let Some(index) = self.atomic_operand(op(1))? else {
                    return Ok(None);
                };
                let index = numeric_value(index)?;
                self.item_at(op(0), index.to_double())
            }
            ExprKind::Cast(spec) => {
                let Some(value) = self.atomic_operand(op(0))? else {
                    return if spec.allows_empty {
                        Ok(None)
                    } else {
                        Err(XPathError::dynamic(
                            "XPTY0004",
                            "An empty sequence is not allowed as the operand of 'cast as'",
                        ))
                    };
                };
                let converter = spec.converter.unwrap_or(Converter::Dynamic(spec.target));
                Ok(Some(Item::Atomic(converter.convert(value)?)))
            }
            ExprKind::InstanceOf(st) => {
                let items = self.evaluate(op(0))?;
                let matches = st.cardinality.admits(items.len())
                    && items.iter().all(|i| i.matches(&st.item_type));
                Ok(Some(bool_item(matches)))
            }
            ExprKind::FunctionCall(f) if f.is_singleton_valued() => {
                functions::eval::evaluate_call(self, id, *f)
            }
            _ => self.try_iterate(id)?.next().transpose(),
        }
    }

    fn try_iterate(&self, id: ExprId) -> XResult<SequenceIter<'a>> {
        let arena = self.arena;
        let op = |i: usize| arena.operand(id, i);
        match arena.kind(id) {
            ExprKind::Literal(seq) => Ok(Box::new(seq.iter().cloned().map(Ok))),
            ExprKind::VarRef(r) => match r.target {
                VariableTarget::Local(var) => match self.lookup(var) {
                    Some(VariableValue::Eager(seq)) => Ok(shared_items(seq)),
                    Some(VariableValue::Memo(memo)) => Ok(Box::new(MemoReader {
                        memo,
                        index: 0,
                        finished: false,
                    })),
                    None => Err(XPathError::dynamic(
                        "XPST0008",
                        format!("Variable ${} is not bound", r.name),
                    )),
                },
                VariableTarget::Global => match self.globals.get(&r.name) {
                    Some(seq) => Ok(shared_items(seq.clone())),
                    None => Err(XPathError::dynamic(
                        "XPDY0002",
                        format!("No value has been supplied for variable ${}", r.name),
                    )),
                },
            },
            ExprKind::Let(binding) => {
                let value = match binding.mode {
                    EvaluationMode::Lazy => VariableValue::Memo(Rc::new(RefCell::new(Memo {
                        items: Vec::new(),
                        state: MemoState::Pending(op(0), self.clone()),
                    }))),
                    EvaluationMode::Eager | EvaluationMode::Materialized => {
                        VariableValue::Eager(Rc::new(self.evaluate(op(0))?))
                    }
                };
                Ok(self.bind(binding.var, value).iterate(op(1)))
            }
            ExprKind::For(binding) => {
                let ctx = self.clone();
                let var = binding.var;
                let action = op(1);
                Ok(Box::new(self.iterate(op(0)).flat_map(
                    move |r| -> SequenceIter<'a> {
                        match r {
                            Ok(item) => ctx
                                .bind(var, VariableValue::Eager(Rc::new(vec![item])))
                                .iterate(action),
                            Err(e) => Box::new(iter::once(Err(e))),
                        }
                    },
                )))
            }
            ExprKind::FunctionCall(f) if !f.is_singleton_valued() => {
                functions::eval::iterate_call(self, id, *f)
            }
            ExprKind::Filter(_) => self.iterate_filter(id),
            ExprKind::Tail { start } => {
                let start = *start;
                Ok(Box::new(self.iterate(op(0)).enumerate().filter_map(
                    move |(i, r)| match r {
                        Ok(_) if i + 1 < start => None,
                        other => Some(other),
                    },
                )))
            }
            ExprKind::Range => {
                let from = self.integer_operand(op(0))?;
                let to = self.integer_operand(op(1))?;
                match (from, to) {
                    (Some(a), Some(b)) if a <= b => Ok(Box::new(
                        (a..=b).map(|i| Ok(Item::Atomic(AtomicValue::Integer(i)))),
                    )),
                    _ => Ok(empty()),
                }
            }
            ExprKind::Block => {
                let ctx = self.clone();
                Ok(Box::new(
                    arena
                        .children(id)
                        .into_iter()
                        .flat_map(move |c| ctx.iterate(c)),
                ))
            }
            ExprKind::Conditional => {
                if self.effective_boolean(op(0))? {
                    Ok(self.iterate(op(1)))
                } else {
                    Ok(self.iterate(op(2)))
                }
            }
            ExprKind::TryCatch { catch_codes } => match self.evaluate(op(0)) {
                Ok(seq) => Ok(items_of(seq)),
                Err(e) => {
                    let handler = catch_codes
                        .iter()
                        .position(|code| code.as_deref().is_none_or(|c| e.code() == Some(c)));
                    match handler {
                        Some(i) => {
                            log::debug!("Caught {} in try expression", e);
                            Ok(self.iterate(op(i + 1)))
                        }
                        None => Err(e),
                    }
                }
            },
            ExprKind::SimpleMap => self.iterate_simple_map(id),
            ExprKind::ItemChecker { required, role } => Ok(conversion::checking_items(
                self.iterate(op(0)),
                required.clone(),
                role.clone(),
            )),
            ExprKind::CardinalityChecker { required, role } => Ok(conversion::checking_cardinality(
                self.iterate(op(0)),
                *required,
                role.clone(),
            )),
            ExprKind::Atomizer => Ok(conversion::atomizing(self.iterate(op(0)))),
            ExprKind::UntypedConverter { target } => {
                Ok(conversion::converting_untyped(self.iterate(op(0)), *target))
            }
            ExprKind::AtomicConverter { target } => {
                Ok(conversion::promoting(self.iterate(op(0)), *target))
            }
            ExprKind::FunctionCoercer { required, role } => Ok(conversion::coercing_functions(
                self.iterate(op(0)),
                required.clone(),
                role.clone(),
            )),
            _ => Ok(option_iter(self.evaluate_singly(id)?)),
        }
    }

    fn integer_operand(&self, id: ExprId) -> XResult<Option<i64>> {
        match self.atomic_operand(id)? {
            None => Ok(None),
            Some(AtomicValue::Integer(i)) => Ok(Some(i)),
            Some(v @ AtomicValue::UntypedAtomic(_)) => match cast_atomic(&v, AtomicType::Integer)? {
                AtomicValue::Integer(i) => Ok(Some(i)),
                _ => Ok(None),
            },
            Some(other) => Err(XPathError::dynamic(
                "XPTY0004",
                format!("Operand of 'to' must be an integer; supplied {}", other.type_name()),
            )),
        }
    }

    fn iterate_filter(&self, id: ExprId) -> XResult<SequenceIter<'a>> {
        let base = self.arena.operand(id, 0);
        let predicate = self.arena.operand(id, 1);
        let props = self.arena.props(predicate);

        if props.is_focus_independent() {
            let value = self.evaluate(predicate)?;
            if let Some(position) = numeric_singleton(&value) {
                return Ok(option_iter(self.item_at(base, position)?));
            }
            return if effective_boolean_value(items_of(value))? {
                Ok(self.iterate(base))
            } else {
                Ok(empty())
            };
        }

        if props.dependencies.contains(Dependencies::LAST) {
            let items = self.evaluate(base)?;
            let size = items.len();
            let mut kept = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                let inner = self.with_focus(item.clone(), i + 1, Some(size));
                if inner.predicate_matches(predicate, i + 1)? {
                    kept.push(item);
                }
            }
            return Ok(items_of(kept));
        }

        let ctx = self.clone();
        Ok(Box::new(self.iterate(base).enumerate().filter_map(
            move |(i, r)| match r {
                Err(e) => Some(Err(e)),
                Ok(item) => {
                    let inner = ctx.with_focus(item.clone(), i + 1, None);
                    match inner.predicate_matches(predicate, i + 1) {
                        Ok(true) => Some(Ok(item)),
                        Ok(false) => None,
                        Err(e) => Some(Err(e)),
                    }
                }
            },
        )))
    }

    /// Evaluates a predicate for the item at `position`: a numeric value
    /// is compared with the position, anything else is taken as a boolean.
    fn predicate_matches(&self, predicate: ExprId, position: usize) -> XResult<bool> {
        let mut value = self.iterate(predicate);
        let first = match value.next() {
            None => return Ok(false),
            Some(r) => r?,
        };
        if let Item::Atomic(a) = &first
            && a.is_numeric()
        {
            if value.next().transpose()?.is_some() {
                return Err(ebv_error(
                    "Effective boolean value is not defined for a sequence of two or more numbers",
                ));
            }
            return Ok(a.to_double() == position as f64);
        }
        effective_boolean_value(Box::new(iter::once(Ok(first)).chain(value)))
    }

    fn iterate_simple_map(&self, id: ExprId) -> XResult<SequenceIter<'a>> {
        let select = self.arena.operand(id, 0);
        let action = self.arena.operand(id, 1);
        let ctx = self.clone();
        if self
            .arena
            .props(action)
            .dependencies
            .contains(Dependencies::LAST)
        {
            let items = self.evaluate(select)?;
            let size = items.len();
            return Ok(Box::new(items.into_iter().enumerate().flat_map(
                move |(i, item)| ctx.with_focus(item, i + 1, Some(size)).iterate(action),
            )));
        }
        Ok(Box::new(self.iterate(select).enumerate().flat_map(
            move |(i, r)| -> SequenceIter<'a> {
                match r {
                    Ok(item) => ctx.with_focus(item, i + 1, None).iterate(action),
                    Err(e) => Box::new(iter::once(Err(e))),
                }
            },
        )))
    }
}

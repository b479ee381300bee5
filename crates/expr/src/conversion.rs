//! The function conversion rules applied to runtime values.
//!
//! Each step is a lazy adaptor over a [`SequenceIter`]; the static type
//! checker inserts the node form of the same steps, and the node
//! evaluators delegate here.

use crate::error::{XPathError, XResult};
use crate::eval::SequenceIter;
use crate::role::RoleDiagnostic;
use quire_types::{AtomicType, Cardinality, FunctionType, ItemType, SequenceType};
use quire_xdm::{AtomicValue, Item, cast, cast_atomic};
use std::rc::Rc;

/// Target type for untyped values supplied where `required` is expected,
/// or `None` when untyped values satisfy it as they are.
pub(crate) fn untyped_target(required: &ItemType) -> Option<AtomicType> {
    match required {
        ItemType::Atomic(AtomicType::AnyAtomic | AtomicType::UntypedAtomic) => None,
        ItemType::Atomic(t) => Some(*t),
        ItemType::Union(members) => {
            if required.is_numeric() {
                Some(AtomicType::Double)
            } else if members.contains(&AtomicType::UntypedAtomic) {
                None
            } else {
                members.first().copied()
            }
        }
        _ => None,
    }
}

pub(crate) fn atomize_item(item: Item) -> XResult<Item> {
    match item {
        Item::Atomic(_) => Ok(item),
        other => Ok(Item::Atomic(other.atomize()?)),
    }
}

/// Casts an untyped atomic item to `target`; any other item is returned
/// unchanged.
pub(crate) fn convert_untyped_item(item: Item, target: AtomicType) -> XResult<Item> {
    match &item {
        Item::Atomic(a @ AtomicValue::UntypedAtomic(_)) => {
            if target.is_namespace_sensitive() {
                return Err(XPathError::dynamic(
                    "XPTY0117",
                    format!("Cannot convert an untyped atomic value to {}", target),
                ));
            }
            Ok(Item::Atomic(cast_atomic(a, target)?))
        }
        _ => Ok(item),
    }
}

/// Numeric promotion to `target`, and anyURI to string.
pub(crate) fn promote_item(item: Item, target: AtomicType) -> Item {
    match item {
        Item::Atomic(AtomicValue::AnyUri(s)) if target == AtomicType::String => {
            Item::Atomic(AtomicValue::String(s))
        }
        Item::Atomic(a) => Item::Atomic(cast::promote(a, target)),
        other => other,
    }
}

pub fn atomizing<'a>(input: SequenceIter<'a>) -> SequenceIter<'a> {
    Box::new(input.map(|r| r.and_then(atomize_item)))
}

pub fn converting_untyped<'a>(input: SequenceIter<'a>, target: AtomicType) -> SequenceIter<'a> {
    Box::new(input.map(move |r| r.and_then(|item| convert_untyped_item(item, target))))
}

pub fn promoting<'a>(input: SequenceIter<'a>, target: AtomicType) -> SequenceIter<'a> {
    Box::new(input.map(move |r| r.map(|item| promote_item(item, target))))
}

/// Fails on the first item that is not an instance of `required`.
pub fn checking_items<'a>(
    input: SequenceIter<'a>,
    required: ItemType,
    role: RoleDiagnostic,
) -> SequenceIter<'a> {
    Box::new(input.map(move |r| {
        let item = r?;
        if item.matches(&required) {
            Ok(item)
        } else {
            let message = role.item_type_mismatch(&required, &item.type_name());
            Err(role.dynamic_error(message))
        }
    }))
}

/// Passes items through while counting them. Too many items fail as soon
/// as the first surplus item is read; too few fail at the end.
struct CardinalityCheck<'a> {
    input: SequenceIter<'a>,
    required: Cardinality,
    role: RoleDiagnostic,
    count: usize,
    finished: bool,
}

impl Iterator for CardinalityCheck<'_> {
    type Item = XResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.input.next() {
            Some(Ok(item)) => {
                self.count += 1;
                if self.required.max_count().is_some_and(|max| self.count > max) {
                    self.finished = true;
                    let supplied = if self.count == 1 {
                        "one item"
                    } else {
                        "more than one item"
                    };
                    let message = self.role.cardinality_mismatch(self.required, supplied);
                    return Some(Err(self.role.dynamic_error(message)));
                }
                Some(Ok(item))
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                if self.count < self.required.min_count() {
                    let message = self
                        .role
                        .cardinality_mismatch(self.required, "an empty sequence");
                    Some(Err(self.role.dynamic_error(message)))
                } else {
                    None
                }
            }
        }
    }
}

pub fn checking_cardinality<'a>(
    input: SequenceIter<'a>,
    required: Cardinality,
    role: RoleDiagnostic,
) -> SequenceIter<'a> {
    Box::new(CardinalityCheck {
        input,
        required,
        role,
        count: 0,
        finished: false,
    })
}

pub fn coercing_functions<'a>(
    input: SequenceIter<'a>,
    required: FunctionType,
    role: RoleDiagnostic,
) -> SequenceIter<'a> {
    Box::new(input.map(move |r| match r? {
        Item::Function(f) => Ok(Item::Function(Rc::new(f.coerced(required.clone())))),
        other => {
            let message =
                role.item_type_mismatch(&ItemType::Function(required.clone()), &other.type_name());
            Err(role.dynamic_error(message))
        }
    }))
}

/// The function conversion rules as a pipeline over a runtime sequence:
/// atomize, convert untyped values, promote, check the item type, check
/// the cardinality.
pub fn apply_function_conversion_rules<'a>(
    input: SequenceIter<'a>,
    required: &SequenceType,
    role: &RoleDiagnostic,
) -> SequenceIter<'a> {
    let item_type = &required.item_type;
    let mut iter = input;
    if item_type.is_plain() {
        iter = atomizing(iter);
        if let Some(target) = untyped_target(item_type) {
            iter = converting_untyped(iter, target);
        }
        match item_type.as_atomic() {
            Some(t @ (AtomicType::Double | AtomicType::Float | AtomicType::String)) => {
                iter = promoting(iter, t);
            }
            _ => {}
        }
    }
    if *item_type != ItemType::AnyItem {
        if let ItemType::Function(ft) = item_type
            && *ft != FunctionType::Map
        {
            iter = checking_items(iter, ItemType::any_function(), role.clone());
            iter = coercing_functions(iter, ft.clone(), role.clone());
        } else {
            iter = checking_items(iter, item_type.clone(), role.clone());
        }
    }
    if required.cardinality != Cardinality::ZeroOrMore {
        iter = checking_cardinality(iter, required.cardinality, role.clone());
    }
    iter
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_xdm::XdmNode;
    use std::cell::Cell;

    fn source<'a>(items: Vec<Item>) -> SequenceIter<'a> {
        Box::new(items.into_iter().map(Ok))
    }

    fn role() -> RoleDiagnostic {
        RoleDiagnostic::variable("v")
    }

    #[test]
    fn test_untyped_node_becomes_double() {
        let input = source(vec![Item::from(XdmNode::element("n", "2.5"))]);
        let required: SequenceType = "xs:double".parse().unwrap();
        let out: XResult<Vec<Item>> =
            apply_function_conversion_rules(input, &required, &role()).collect();
        let out = out.unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Double(2.5)));
    }

    #[test]
    fn test_integers_are_promoted() {
        let input = source(vec![Item::from(AtomicValue::Integer(4))]);
        let required: SequenceType = "xs:double*".parse().unwrap();
        let out: Vec<Item> = apply_function_conversion_rules(input, &required, &role())
            .collect::<XResult<_>>()
            .unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::Double(4.0)));
    }

    #[test]
    fn test_any_uri_passes_as_string() {
        let input = source(vec![Item::from(AtomicValue::AnyUri("urn:x".into()))]);
        let required: SequenceType = "xs:string".parse().unwrap();
        let out: Vec<Item> = apply_function_conversion_rules(input, &required, &role())
            .collect::<XResult<_>>()
            .unwrap();
        assert_eq!(out[0].as_atomic(), Some(&AtomicValue::string("urn:x")));
    }

    #[test]
    fn test_wrong_item_type_fails_lazily() {
        let input = source(vec![
            Item::from(AtomicValue::Integer(1)),
            Item::from(AtomicValue::Boolean(true)),
        ]);
        let required: SequenceType = "xs:integer*".parse().unwrap();
        let mut iter = apply_function_conversion_rules(input, &required, &role());
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.code(), Some("XPTY0004"));
        assert!(!err.is_static());
    }

    #[test]
    fn test_surplus_item_fails_before_it_is_drained() {
        let pulled = Cell::new(0);
        let input: SequenceIter<'_> = Box::new((1..).map(|i| {
            pulled.set(pulled.get() + 1);
            Ok(Item::from(AtomicValue::Integer(i)))
        }));
        let mut iter = checking_cardinality(input, Cardinality::ZeroOrOne, role());
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
        drop(iter);
        assert_eq!(pulled.get(), 2);
    }

    #[test]
    fn test_missing_item_fails_at_the_end() {
        let mut iter = checking_cardinality(source(vec![]), Cardinality::OneOrMore, role());
        let err = iter.next().unwrap().unwrap_err();
        assert!(err.message().contains("empty sequence"));
    }

    #[test]
    fn test_qname_target_rejects_untyped() {
        let err = convert_untyped_item(Item::from(AtomicValue::untyped("a:b")), AtomicType::QName)
            .unwrap_err();
        assert_eq!(err.code(), Some("XPTY0117"));
    }
}

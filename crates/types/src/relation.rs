//! The item-type relationship algebra.
//!
//! Relationships are derived from two semantic predicates, "is a subtype
//! of" and "shares at least one value with", so that the result for
//! `(a, b)` is always the mirror image of the result for `(b, a)`.

use crate::item::{FunctionType, ItemType, NodeTest};

/// How the value spaces of two item types relate. `Subsumes` reads
/// left-to-right: `relationship(a, b) == Subsumes` means every `b` is an `a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    SameType,
    Subsumes,
    SubsumedBy,
    Overlaps,
    Disjoint,
}

impl Relation {
    pub fn inverse(self) -> Relation {
        match self {
            Relation::Subsumes => Relation::SubsumedBy,
            Relation::SubsumedBy => Relation::Subsumes,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Relation::SameType => "same type",
            Relation::Subsumes => "subsumes",
            Relation::SubsumedBy => "subsumed by",
            Relation::Overlaps => "overlaps",
            Relation::Disjoint => "disjoint",
        }
    }
}

pub fn relationship(a: &ItemType, b: &ItemType) -> Relation {
    match (is_subtype(a, b), is_subtype(b, a)) {
        (true, true) => Relation::SameType,
        (true, false) => Relation::SubsumedBy,
        (false, true) => Relation::Subsumes,
        (false, false) if overlaps(a, b) => Relation::Overlaps,
        (false, false) => Relation::Disjoint,
    }
}

pub fn is_subtype(a: &ItemType, b: &ItemType) -> bool {
    match (a, b) {
        (ItemType::Error, _) => true,
        (_, ItemType::AnyItem) => true,
        (ItemType::AnyItem, _) | (_, ItemType::Error) => false,
        (ItemType::Node(x), ItemType::Node(y)) => x.is_subtest_of(y),
        (ItemType::Function(x), ItemType::Function(y)) => x.is_subtype_of(y),
        _ => match (a.atomic_members(), b.atomic_members()) {
            (Some(xs), Some(ys)) => xs
                .iter()
                .all(|x| ys.iter().any(|y| x.is_subtype_of(*y))),
            _ => false,
        },
    }
}

fn overlaps(a: &ItemType, b: &ItemType) -> bool {
    match (a, b) {
        (ItemType::Error, _) | (_, ItemType::Error) => false,
        (ItemType::AnyItem, _) | (_, ItemType::AnyItem) => true,
        (ItemType::Node(x), ItemType::Node(y)) => x.overlaps(y),
        (ItemType::Function(x), ItemType::Function(y)) => x.overlaps(y),
        _ => match (a.atomic_members(), b.atomic_members()) {
            // the atomic hierarchy is a tree: two types share values only
            // when one derives from the other
            (Some(xs), Some(ys)) => xs.iter().any(|x| {
                ys.iter()
                    .any(|y| x.is_subtype_of(*y) || y.is_subtype_of(*x))
            }),
            _ => false,
        },
    }
}

pub fn common_supertype(a: &ItemType, b: &ItemType) -> ItemType {
    if is_subtype(a, b) {
        return b.clone();
    }
    if is_subtype(b, a) {
        return a.clone();
    }
    match (a, b) {
        (ItemType::Node(x), ItemType::Node(y)) => {
            let kinds = x.kinds | y.kinds;
            let name = if x.name == y.name && kinds == x.kinds {
                x.name.clone()
            } else {
                None
            };
            ItemType::Node(NodeTest { kinds, name })
        }
        (ItemType::Function(_), ItemType::Function(_)) => ItemType::Function(FunctionType::Any),
        _ => match (a.atomic_members(), b.atomic_members()) {
            (Some(xs), Some(ys)) => ItemType::union(xs.iter().chain(ys.iter()).copied()),
            _ => ItemType::AnyItem,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::AtomicType;
    use crate::item::{NodeKind, NodeKinds};
    use crate::sequence::SequenceType;
    use proptest::prelude::*;

    fn integer() -> ItemType {
        ItemType::Atomic(AtomicType::Integer)
    }

    #[test]
    fn test_atomic_relationships() {
        let decimal = ItemType::Atomic(AtomicType::Decimal);
        assert_eq!(integer().relationship(&decimal), Relation::SubsumedBy);
        assert_eq!(decimal.relationship(&integer()), Relation::Subsumes);
        assert_eq!(
            ItemType::numeric().relationship(&integer()),
            Relation::Subsumes
        );
        assert_eq!(
            ItemType::Atomic(AtomicType::String)
                .relationship(&ItemType::Atomic(AtomicType::UntypedAtomic)),
            Relation::Disjoint
        );
        assert_eq!(
            ItemType::union([AtomicType::Integer, AtomicType::String])
                .relationship(&ItemType::numeric()),
            Relation::Overlaps
        );
    }

    #[test]
    fn test_node_relationships() {
        let element = ItemType::node(NodeKind::Element);
        let para = ItemType::Node(NodeTest::named(NodeKind::Element, "para"));
        let text = ItemType::node(NodeKind::Text);
        assert_eq!(element.relationship(&para), Relation::Subsumes);
        assert_eq!(element.relationship(&text), Relation::Disjoint);
        assert_eq!(ItemType::any_node().relationship(&text), Relation::Subsumes);
        assert_eq!(
            ItemType::any_node().relationship(&ItemType::any_atomic()),
            Relation::Disjoint
        );
    }

    #[test]
    fn test_function_relationships() {
        let any = ItemType::Function(FunctionType::Any);
        let map = ItemType::Function(FunctionType::Map);
        let array = ItemType::Function(FunctionType::Array);
        let unary = ItemType::Function(FunctionType::Signature {
            params: vec![SequenceType::single(ItemType::any_atomic())],
            result: Box::new(SequenceType::any()),
        });
        let binary = ItemType::Function(FunctionType::Signature {
            params: vec![SequenceType::any(), SequenceType::any()],
            result: Box::new(SequenceType::any()),
        });
        assert_eq!(any.relationship(&map), Relation::Subsumes);
        assert_eq!(map.relationship(&array), Relation::Disjoint);
        assert_eq!(map.relationship(&unary), Relation::SubsumedBy);
        assert_eq!(unary.relationship(&binary), Relation::Disjoint);
    }

    #[test]
    fn test_error_type_is_bottom() {
        assert_eq!(ItemType::Error.relationship(&integer()), Relation::SubsumedBy);
        assert_eq!(ItemType::Error.relationship(&ItemType::Error), Relation::SameType);
        assert_eq!(
            ItemType::AnyItem.relationship(&ItemType::Error),
            Relation::Subsumes
        );
    }

    #[test]
    fn test_common_supertype() {
        assert_eq!(
            integer().common_supertype(&ItemType::Atomic(AtomicType::Decimal)),
            ItemType::Atomic(AtomicType::Decimal)
        );
        assert_eq!(
            ItemType::node(NodeKind::Text).common_supertype(&ItemType::node(NodeKind::Comment)),
            ItemType::Node(NodeTest {
                kinds: NodeKinds::TEXT | NodeKinds::COMMENT,
                name: None
            })
        );
        assert_eq!(
            integer().common_supertype(&ItemType::any_node()),
            ItemType::AnyItem
        );
    }

    fn any_item_type() -> impl Strategy<Value = ItemType> {
        let atomic = prop::sample::select(AtomicType::ALL.to_vec());
        let leaf = prop_oneof![
            Just(ItemType::AnyItem),
            Just(ItemType::Error),
            atomic.clone().prop_map(ItemType::Atomic),
            prop::collection::vec(atomic, 1..4).prop_map(ItemType::union),
            (0u8..128, prop::option::of(prop::sample::select(vec!["a", "b"]))).prop_map(
                |(bits, name)| {
                    let kinds = NodeKinds::from_bits_truncate(bits);
                    let name = if kinds == NodeKinds::ELEMENT || kinds == NodeKinds::ATTRIBUTE {
                        name.map(str::to_string)
                    } else {
                        None
                    };
                    ItemType::Node(NodeTest { kinds, name })
                }
            ),
            Just(ItemType::Function(FunctionType::Any)),
            Just(ItemType::Function(FunctionType::Map)),
            Just(ItemType::Function(FunctionType::Array)),
        ];
        leaf
    }

    proptest! {
        #[test]
        fn relationship_is_reflexive(a in any_item_type()) {
            prop_assert_eq!(a.relationship(&a), Relation::SameType);
        }

        #[test]
        fn relationship_is_mirrored(a in any_item_type(), b in any_item_type()) {
            let forward = a.relationship(&b);
            let backward = b.relationship(&a);
            prop_assert_eq!(forward, backward.inverse());
            prop_assert_eq!(forward == Relation::Subsumes, backward == Relation::SubsumedBy);
        }

        #[test]
        fn common_supertype_subsumes_both(a in any_item_type(), b in any_item_type()) {
            let s = a.common_supertype(&b);
            prop_assert!(a.is_subtype(&s));
            prop_assert!(b.is_subtype(&s));
        }
    }
}

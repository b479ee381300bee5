use crate::atomic::AtomicType;
use crate::cardinality::Cardinality;
use crate::item::ItemType;
use std::fmt;

/// An item type paired with an occurrence bound: the unit of a "required
/// type" during type checking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceType {
    pub item_type: ItemType,
    pub cardinality: Cardinality,
}

impl SequenceType {
    pub fn new(item_type: ItemType, cardinality: Cardinality) -> Self {
        SequenceType {
            item_type,
            cardinality,
        }
    }

    pub fn single(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::ExactlyOne)
    }

    pub fn optional(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::ZeroOrOne)
    }

    pub fn star(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::ZeroOrMore)
    }

    pub fn plus(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::OneOrMore)
    }

    pub fn atomic(t: AtomicType, cardinality: Cardinality) -> Self {
        Self::new(ItemType::Atomic(t), cardinality)
    }

    /// `item()*`
    pub fn any() -> Self {
        Self::star(ItemType::AnyItem)
    }

    /// `empty-sequence()`
    pub fn empty() -> Self {
        Self::new(ItemType::Error, Cardinality::Empty)
    }

    pub fn is_empty_sequence(&self) -> bool {
        self.cardinality == Cardinality::Empty
    }

    /// True when every sequence matching `other` also matches `self`.
    pub fn subsumes(&self, other: &SequenceType) -> bool {
        self.cardinality.subsumes(other.cardinality)
            && (other.cardinality == Cardinality::Empty
                || other.item_type.is_subtype(&self.item_type))
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cardinality == Cardinality::Empty {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item_type, self.cardinality)
    }
}

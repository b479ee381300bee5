use crate::atomic::AtomicType;
use crate::relation::{self, Relation};
use crate::sequence::SequenceType;
use bitflags::bitflags;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    pub fn kind_test(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node()",
            NodeKind::Element => "element()",
            NodeKind::Attribute => "attribute()",
            NodeKind::Text => "text()",
            NodeKind::Comment => "comment()",
            NodeKind::ProcessingInstruction => "processing-instruction()",
            NodeKind::Namespace => "namespace-node()",
        }
    }

    /// Whether the typed value of an untyped node of this kind is
    /// `xs:untypedAtomic` (as opposed to `xs:string`).
    pub fn atomizes_untyped(self) -> bool {
        !matches!(
            self,
            NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeKinds: u8 {
        const DOCUMENT = 1 << 0;
        const ELEMENT = 1 << 1;
        const ATTRIBUTE = 1 << 2;
        const TEXT = 1 << 3;
        const COMMENT = 1 << 4;
        const PROCESSING_INSTRUCTION = 1 << 5;
        const NAMESPACE = 1 << 6;
    }
}

impl From<NodeKind> for NodeKinds {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Document => NodeKinds::DOCUMENT,
            NodeKind::Element => NodeKinds::ELEMENT,
            NodeKind::Attribute => NodeKinds::ATTRIBUTE,
            NodeKind::Text => NodeKinds::TEXT,
            NodeKind::Comment => NodeKinds::COMMENT,
            NodeKind::ProcessingInstruction => NodeKinds::PROCESSING_INSTRUCTION,
            NodeKind::Namespace => NodeKinds::NAMESPACE,
        }
    }
}

const KIND_ORDER: [NodeKind; 7] = [
    NodeKind::Document,
    NodeKind::Element,
    NodeKind::Attribute,
    NodeKind::Text,
    NodeKind::Comment,
    NodeKind::ProcessingInstruction,
    NodeKind::Namespace,
];

/// A node test: a set of node kinds, optionally restricted to one name.
/// A name is only meaningful when the kind set is exactly element or
/// exactly attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeTest {
    pub kinds: NodeKinds,
    pub name: Option<String>,
}

impl NodeTest {
    pub fn any() -> Self {
        NodeTest {
            kinds: NodeKinds::all(),
            name: None,
        }
    }

    pub fn kind(kind: NodeKind) -> Self {
        NodeTest {
            kinds: kind.into(),
            name: None,
        }
    }

    pub fn named(kind: NodeKind, name: impl Into<String>) -> Self {
        NodeTest {
            kinds: kind.into(),
            name: Some(name.into()),
        }
    }

    pub fn matches(&self, kind: NodeKind, name: Option<&str>) -> bool {
        self.kinds.contains(kind.into())
            && match &self.name {
                None => true,
                Some(required) => name == Some(required.as_str()),
            }
    }

    pub fn is_subtest_of(&self, other: &NodeTest) -> bool {
        other.kinds.contains(self.kinds)
            && match &other.name {
                None => true,
                Some(n) => self.name.as_ref() == Some(n),
            }
    }

    pub fn overlaps(&self, other: &NodeTest) -> bool {
        self.kinds.intersects(other.kinds)
            && match (&self.name, &other.name) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    fn kinds_iter(&self) -> impl Iterator<Item = NodeKind> + '_ {
        KIND_ORDER
            .iter()
            .copied()
            .filter(|k| self.kinds.contains((*k).into()))
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kinds == NodeKinds::all() {
            return f.write_str("node()");
        }
        let kinds: Vec<NodeKind> = self.kinds_iter().collect();
        match (kinds.as_slice(), &self.name) {
            ([NodeKind::Element], Some(n)) => write!(f, "element({})", n),
            ([NodeKind::Attribute], Some(n)) => write!(f, "attribute({})", n),
            ([single], _) => f.write_str(single.kind_test()),
            (many, _) => {
                let parts: Vec<&str> = many.iter().map(|k| k.kind_test()).collect();
                write!(f, "({})", parts.join(" | "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionType {
    /// `function(*)`
    Any,
    /// `map(*)`
    Map,
    /// `array(*)`
    Array,
    Signature {
        params: Vec<SequenceType>,
        result: Box<SequenceType>,
    },
}

impl FunctionType {
    pub fn arity(&self) -> Option<usize> {
        match self {
            FunctionType::Any => None,
            FunctionType::Map | FunctionType::Array => Some(1),
            FunctionType::Signature { params, .. } => Some(params.len()),
        }
    }

    /// Maps and arrays viewed as ordinary single-argument functions.
    fn as_signature(&self) -> Option<(Vec<SequenceType>, SequenceType)> {
        match self {
            FunctionType::Any => None,
            FunctionType::Map => Some((
                vec![SequenceType::single(ItemType::Atomic(AtomicType::AnyAtomic))],
                SequenceType::any(),
            )),
            FunctionType::Array => Some((
                vec![SequenceType::single(ItemType::Atomic(AtomicType::Integer))],
                SequenceType::any(),
            )),
            FunctionType::Signature { params, result } => {
                Some((params.clone(), (**result).clone()))
            }
        }
    }

    pub fn is_subtype_of(&self, other: &FunctionType) -> bool {
        match (self, other) {
            (_, FunctionType::Any) => true,
            (FunctionType::Any, _) => false,
            (FunctionType::Map, FunctionType::Map) | (FunctionType::Array, FunctionType::Array) => {
                true
            }
            (_, FunctionType::Map) | (_, FunctionType::Array) => false,
            _ => match (self.as_signature(), other.as_signature()) {
                (Some((p1, r1)), Some((p2, r2))) => {
                    p1.len() == p2.len()
                        && p1.iter().zip(&p2).all(|(a, b)| a.subsumes(b))
                        && r2.subsumes(&r1)
                }
                _ => false,
            },
        }
    }

    pub fn overlaps(&self, other: &FunctionType) -> bool {
        match (self, other) {
            (FunctionType::Any, _) | (_, FunctionType::Any) => true,
            (FunctionType::Map, FunctionType::Array) | (FunctionType::Array, FunctionType::Map) => {
                false
            }
            _ => self.arity() == other.arity(),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionType::Any => f.write_str("function(*)"),
            FunctionType::Map => f.write_str("map(*)"),
            FunctionType::Array => f.write_str("array(*)"),
            FunctionType::Signature { params, result } => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "function({}) as {}", params.join(", "), result)
            }
        }
    }
}

/// The static type of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemType {
    AnyItem,
    Atomic(AtomicType),
    /// A union of atomic types. Build with [`ItemType::union`] so that the
    /// member list is normalised.
    Union(Vec<AtomicType>),
    Node(NodeTest),
    Function(FunctionType),
    /// The uninhabited type: the item type of the empty sequence, and of
    /// expressions that can only raise an error.
    Error,
}

impl ItemType {
    pub fn atomic(t: AtomicType) -> Self {
        ItemType::Atomic(t)
    }

    pub fn any_atomic() -> Self {
        ItemType::Atomic(AtomicType::AnyAtomic)
    }

    /// `xs:numeric`
    pub fn numeric() -> Self {
        ItemType::union(AtomicType::NUMERIC)
    }

    pub fn any_node() -> Self {
        ItemType::Node(NodeTest::any())
    }

    pub fn node(kind: NodeKind) -> Self {
        ItemType::Node(NodeTest::kind(kind))
    }

    pub fn any_function() -> Self {
        ItemType::Function(FunctionType::Any)
    }

    /// Builds a union, dropping duplicates and members subsumed by another
    /// member. A single surviving member yields a plain atomic type.
    pub fn union(members: impl IntoIterator<Item = AtomicType>) -> Self {
        let mut all: Vec<AtomicType> = Vec::new();
        for m in members {
            if !all.contains(&m) {
                all.push(m);
            }
        }
        let kept: Vec<AtomicType> = all
            .iter()
            .copied()
            .filter(|m| !all.iter().any(|o| o != m && m.is_subtype_of(*o)))
            .collect();
        match kept.as_slice() {
            [] => ItemType::Error,
            [single] => ItemType::Atomic(*single),
            _ => ItemType::Union(kept),
        }
    }

    /// Atomic and union types (and the uninhabited type, which is a subtype
    /// of every plain type).
    pub fn is_plain(&self) -> bool {
        matches!(
            self,
            ItemType::Atomic(_) | ItemType::Union(_) | ItemType::Error
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ItemType::Error)
    }

    pub fn atomic_members(&self) -> Option<&[AtomicType]> {
        match self {
            ItemType::Atomic(t) => Some(std::slice::from_ref(t)),
            ItemType::Union(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<AtomicType> {
        match self {
            ItemType::Atomic(t) => Some(*t),
            _ => None,
        }
    }

    /// The primitive type shared by every member of a plain type, or
    /// `xs:anyAtomicType` when the members have different primitives.
    pub fn primitive_type(&self) -> Option<AtomicType> {
        let members = self.atomic_members()?;
        let mut iter = members.iter().map(|m| m.primitive());
        let first = iter.next()?;
        Some(iter.fold(first, |acc, p| acc.common_supertype(p)))
    }

    /// True when every value of this type is numeric.
    pub fn is_numeric(&self) -> bool {
        match self.atomic_members() {
            Some(ms) => !ms.is_empty() && ms.iter().all(|m| m.is_numeric()),
            None => false,
        }
    }

    /// Whether the type could contain some item that can be atomized.
    pub fn is_atomizable(&self) -> bool {
        match self {
            ItemType::Function(FunctionType::Map)
            | ItemType::Function(FunctionType::Signature { .. }) => false,
            _ => true,
        }
    }

    /// The item type of the result of atomizing a value of this type.
    pub fn atomized_type(&self) -> ItemType {
        match self {
            ItemType::Atomic(_) | ItemType::Union(_) | ItemType::Error => self.clone(),
            ItemType::Node(test) => {
                let mut untyped = false;
                let mut string = false;
                for kind in test.kinds_iter() {
                    if kind.atomizes_untyped() {
                        untyped = true;
                    } else {
                        string = true;
                    }
                }
                match (untyped, string) {
                    (true, false) => ItemType::Atomic(AtomicType::UntypedAtomic),
                    (false, true) => ItemType::Atomic(AtomicType::String),
                    (true, true) => {
                        ItemType::union([AtomicType::UntypedAtomic, AtomicType::String])
                    }
                    (false, false) => ItemType::Error,
                }
            }
            ItemType::Function(FunctionType::Map)
            | ItemType::Function(FunctionType::Signature { .. }) => ItemType::Error,
            ItemType::AnyItem | ItemType::Function(_) => ItemType::any_atomic(),
        }
    }

    pub fn relationship(&self, other: &ItemType) -> Relation {
        relation::relationship(self, other)
    }

    /// `self` is a (non-strict) subtype of `other`.
    pub fn is_subtype(&self, other: &ItemType) -> bool {
        relation::is_subtype(self, other)
    }

    pub fn common_supertype(&self, other: &ItemType) -> ItemType {
        relation::common_supertype(self, other)
    }
}

impl From<AtomicType> for ItemType {
    fn from(t: AtomicType) -> Self {
        ItemType::Atomic(t)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::Atomic(t) => write!(f, "{}", t),
            ItemType::Union(members) => {
                let numeric = members.len() == AtomicType::NUMERIC.len()
                    && AtomicType::NUMERIC.iter().all(|n| members.contains(n));
                if numeric {
                    return f.write_str("xs:numeric");
                }
                let names: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "union({})", names.join(", "))
            }
            ItemType::Node(test) => write!(f, "{}", test),
            ItemType::Function(ft) => write!(f, "{}", ft),
            ItemType::Error => f.write_str("xs:error"),
        }
    }
}

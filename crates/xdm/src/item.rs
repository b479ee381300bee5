use crate::atomic::AtomicValue;
use crate::error::ValueError;
use crate::function::FunctionItem;
use crate::node::XdmNode;
use quire_types::ItemType;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Item {
    Atomic(AtomicValue),
    Node(Rc<XdmNode>),
    Function(Rc<FunctionItem>),
}

/// A materialised sequence.
pub type Sequence = Vec<Item>;

impl Item {
    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Item::Function(_))
    }

    pub fn type_name(&self) -> String {
        match self {
            Item::Atomic(a) => a.type_name(),
            Item::Node(n) => n.kind.kind_test().to_string(),
            Item::Function(f) => f.function_type.to_string(),
        }
    }

    pub fn string_value(&self) -> Result<String, ValueError> {
        match self {
            Item::Atomic(a) => Ok(a.to_string_value()),
            Item::Node(n) => Ok(n.string_value.clone()),
            Item::Function(f) => Err(ValueError::NotAtomizable(f.function_type.to_string())),
        }
    }

    /// Typed value of the item. Function items (including maps and arrays,
    /// whose members are not modelled) have none.
    pub fn atomize(&self) -> Result<AtomicValue, ValueError> {
        match self {
            Item::Atomic(a) => Ok(a.clone()),
            Item::Node(n) => Ok(n.typed_value()),
            Item::Function(f) => Err(ValueError::NotAtomizable(f.function_type.to_string())),
        }
    }

    pub fn matches(&self, item_type: &ItemType) -> bool {
        match (self, item_type) {
            (_, ItemType::AnyItem) => true,
            (_, ItemType::Error) => false,
            (Item::Atomic(a), _) => match item_type.atomic_members() {
                Some(members) => {
                    let t = a.atomic_type();
                    members.iter().any(|m| t.is_subtype_of(*m))
                }
                None => false,
            },
            (Item::Node(n), ItemType::Node(test)) => test.matches(n.kind, n.name.as_deref()),
            (Item::Function(f), ItemType::Function(ft)) => f.function_type.is_subtype_of(ft),
            _ => false,
        }
    }

    /// Identity for nodes and functions, typed equality for atomics.
    pub fn is_identical(&self, other: &Item) -> bool {
        match (self, other) {
            (Item::Atomic(a), Item::Atomic(b)) => a == b,
            (Item::Node(a), Item::Node(b)) => Rc::ptr_eq(a, b),
            (Item::Function(a), Item::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

impl From<XdmNode> for Item {
    fn from(n: XdmNode) -> Self {
        Item::Node(Rc::new(n))
    }
}

impl From<FunctionItem> for Item {
    fn from(f: FunctionItem) -> Self {
        Item::Function(Rc::new(f))
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Atomic(a) => write!(f, "{}", a),
            Item::Node(n) => match &n.name {
                Some(name) => write!(f, "<{}>", name),
                None => f.write_str(n.kind.kind_test()),
            },
            Item::Function(func) => match &func.name {
                Some(name) => write!(f, "{}#{}", name, func.arity().unwrap_or(0)),
                None => f.write_str("function{...}"),
            },
        }
    }
}

use crate::atomic::AtomicValue;
use quire_types::NodeKind;

/// The slice of a node the compiler core needs: its kind, name and string
/// value. Tree storage and navigation belong to the node model that
/// supplies these.
#[derive(Debug, Clone, PartialEq)]
pub struct XdmNode {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub string_value: String,
}

impl XdmNode {
    pub fn new(kind: NodeKind, name: Option<String>, string_value: impl Into<String>) -> Self {
        XdmNode {
            kind,
            name,
            string_value: string_value.into(),
        }
    }

    pub fn element(name: impl Into<String>, string_value: impl Into<String>) -> Self {
        Self::new(NodeKind::Element, Some(name.into()), string_value)
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(NodeKind::Attribute, Some(name.into()), value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(NodeKind::Text, None, value)
    }

    /// The typed value of an unvalidated node.
    pub fn typed_value(&self) -> AtomicValue {
        if self.kind.atomizes_untyped() {
            AtomicValue::UntypedAtomic(self.string_value.clone())
        } else {
            AtomicValue::String(self.string_value.clone())
        }
    }
}

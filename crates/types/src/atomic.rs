use std::fmt;

/// Built-in atomic types known to the compiler.
///
/// The hierarchy is a tree rooted at `xs:anyAtomicType`. The only derived
/// type modelled below a primitive is `xs:integer`, a restriction of
/// `xs:decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AtomicType {
    AnyAtomic,
    UntypedAtomic,
    String,
    AnyUri,
    Boolean,
    Decimal,
    Integer,
    Float,
    Double,
    Date,
    DateTime,
    Time,
    Duration,
    QName,
    Notation,
}

impl AtomicType {
    pub const ALL: [AtomicType; 15] = [
        AtomicType::AnyAtomic,
        AtomicType::UntypedAtomic,
        AtomicType::String,
        AtomicType::AnyUri,
        AtomicType::Boolean,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::Float,
        AtomicType::Double,
        AtomicType::Date,
        AtomicType::DateTime,
        AtomicType::Time,
        AtomicType::Duration,
        AtomicType::QName,
        AtomicType::Notation,
    ];

    /// Members of the `xs:numeric` union, in promotion order.
    pub const NUMERIC: [AtomicType; 3] =
        [AtomicType::Double, AtomicType::Float, AtomicType::Decimal];

    pub fn supertype(self) -> Option<AtomicType> {
        match self {
            AtomicType::AnyAtomic => None,
            AtomicType::Integer => Some(AtomicType::Decimal),
            _ => Some(AtomicType::AnyAtomic),
        }
    }

    /// The primitive type this type is derived from. `xs:anyAtomicType`
    /// and `xs:untypedAtomic` are their own primitives.
    pub fn primitive(self) -> AtomicType {
        match self {
            AtomicType::Integer => AtomicType::Decimal,
            other => other,
        }
    }

    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.supertype();
        }
        false
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AtomicType::Decimal | AtomicType::Integer | AtomicType::Float | AtomicType::Double
        )
    }

    /// Types whose values carry namespace bindings and therefore cannot be
    /// produced from an untyped string.
    pub fn is_namespace_sensitive(self) -> bool {
        matches!(self, AtomicType::QName | AtomicType::Notation)
    }

    /// Abstract types have no values of their own and cannot be cast targets.
    pub fn is_abstract(self) -> bool {
        matches!(self, AtomicType::AnyAtomic | AtomicType::Notation)
    }

    /// Types whose values order totally under `lt`/`gt`.
    pub fn is_ordered(self) -> bool {
        self.is_numeric()
            || matches!(
                self,
                AtomicType::String
                    | AtomicType::AnyUri
                    | AtomicType::UntypedAtomic
                    | AtomicType::Boolean
                    | AtomicType::Date
                    | AtomicType::DateTime
                    | AtomicType::Time
                    | AtomicType::Duration
            )
    }

    pub fn local_name(self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "anyAtomicType",
            AtomicType::UntypedAtomic => "untypedAtomic",
            AtomicType::String => "string",
            AtomicType::AnyUri => "anyURI",
            AtomicType::Boolean => "boolean",
            AtomicType::Decimal => "decimal",
            AtomicType::Integer => "integer",
            AtomicType::Float => "float",
            AtomicType::Double => "double",
            AtomicType::Date => "date",
            AtomicType::DateTime => "dateTime",
            AtomicType::Time => "time",
            AtomicType::Duration => "duration",
            AtomicType::QName => "QName",
            AtomicType::Notation => "NOTATION",
        }
    }

    /// Looks a type up by its local name in the XML Schema namespace.
    pub fn from_local_name(name: &str) -> Option<AtomicType> {
        AtomicType::ALL
            .iter()
            .copied()
            .find(|t| t.local_name() == name)
    }

    /// Nearest common ancestor in the hierarchy.
    pub fn common_supertype(self, other: AtomicType) -> AtomicType {
        let mut current = self;
        loop {
            if other.is_subtype_of(current) {
                return current;
            }
            match current.supertype() {
                Some(t) => current = t,
                None => return AtomicType::AnyAtomic,
            }
        }
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.local_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_is_decimal() {
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::Decimal));
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::AnyAtomic));
        assert!(!AtomicType::Decimal.is_subtype_of(AtomicType::Integer));
        assert!(!AtomicType::Float.is_subtype_of(AtomicType::Double));
    }

    #[test]
    fn test_primitive_and_names() {
        assert_eq!(AtomicType::Integer.primitive(), AtomicType::Decimal);
        assert_eq!(AtomicType::from_local_name("anyURI"), Some(AtomicType::AnyUri));
        assert_eq!(AtomicType::from_local_name("int"), None);
        assert_eq!(AtomicType::Double.to_string(), "xs:double");
    }

    #[test]
    fn test_common_supertype() {
        assert_eq!(
            AtomicType::Integer.common_supertype(AtomicType::Decimal),
            AtomicType::Decimal
        );
        assert_eq!(
            AtomicType::Integer.common_supertype(AtomicType::Double),
            AtomicType::AnyAtomic
        );
    }
}

//! The system function library: identity, signatures and static result
//! types of the built-in functions the compiler knows about.

pub mod eval;
pub mod rewrite;

use crate::error::{XPathError, XResult};
use crate::operand::OperandRole;
use crate::properties::{Dependencies, StaticProperties, numeric_operand_type};
use indexmap::IndexMap;
use quire_types::{AtomicType, Cardinality, ItemType, SequenceType};
use std::fmt;

/// Prefix bound to the vendor function namespace.
pub const VENDOR_PREFIX: &str = "quire";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemFunction {
    Position,
    Last,
    Boolean,
    Not,
    Exists,
    Empty,
    Count,
    String,
    Number,
    Data,
    Subsequence,
    Remove,
    Floor,
    Ceiling,
    /// `ignore_nan` is set by rewrites that know NaN cannot change the
    /// outcome of the comparison they serve.
    Min { ignore_nan: bool },
    Max { ignore_nan: bool },
    Concat,
    Error,
    True,
    False,
    IsWholeNumber,
}

impl SystemFunction {
    pub const ALL: [SystemFunction; 21] = [
        SystemFunction::Position,
        SystemFunction::Last,
        SystemFunction::Boolean,
        SystemFunction::Not,
        SystemFunction::Exists,
        SystemFunction::Empty,
        SystemFunction::Count,
        SystemFunction::String,
        SystemFunction::Number,
        SystemFunction::Data,
        SystemFunction::Subsequence,
        SystemFunction::Remove,
        SystemFunction::Floor,
        SystemFunction::Ceiling,
        SystemFunction::Min { ignore_nan: false },
        SystemFunction::Max { ignore_nan: false },
        SystemFunction::Concat,
        SystemFunction::Error,
        SystemFunction::True,
        SystemFunction::False,
        SystemFunction::IsWholeNumber,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SystemFunction::Position => "position",
            SystemFunction::Last => "last",
            SystemFunction::Boolean => "boolean",
            SystemFunction::Not => "not",
            SystemFunction::Exists => "exists",
            SystemFunction::Empty => "empty",
            SystemFunction::Count => "count",
            SystemFunction::String => "string",
            SystemFunction::Number => "number",
            SystemFunction::Data => "data",
            SystemFunction::Subsequence => "subsequence",
            SystemFunction::Remove => "remove",
            SystemFunction::Floor => "floor",
            SystemFunction::Ceiling => "ceiling",
            SystemFunction::Min { .. } => "min",
            SystemFunction::Max { .. } => "max",
            SystemFunction::Concat => "concat",
            SystemFunction::Error => "error",
            SystemFunction::True => "true",
            SystemFunction::False => "false",
            SystemFunction::IsWholeNumber => "is-whole-number",
        }
    }

    pub fn is_vendor(self) -> bool {
        matches!(self, SystemFunction::IsWholeNumber)
    }

    pub fn qualified_name(self) -> String {
        let prefix = if self.is_vendor() { VENDOR_PREFIX } else { "fn" };
        format!("{}:{}", prefix, self.name())
    }

    /// Minimum and (if bounded) maximum number of arguments.
    pub fn arity_range(self) -> (usize, Option<usize>) {
        match self {
            SystemFunction::Position
            | SystemFunction::Last
            | SystemFunction::True
            | SystemFunction::False => (0, Some(0)),
            SystemFunction::Subsequence => (2, Some(3)),
            SystemFunction::Remove => (2, Some(2)),
            SystemFunction::Concat => (2, None),
            SystemFunction::Error => (0, Some(2)),
            _ => (1, Some(1)),
        }
    }

    pub fn accepts_arity(self, arity: usize) -> bool {
        let (min, max) = self.arity_range();
        arity >= min && max.is_none_or(|m| arity <= m)
    }

    /// Declared type of argument `index`.
    pub fn parameter_type(self, index: usize) -> SequenceType {
        let any_atomic_opt = SequenceType::optional(ItemType::any_atomic());
        match self {
            SystemFunction::Boolean
            | SystemFunction::Not
            | SystemFunction::Exists
            | SystemFunction::Empty
            | SystemFunction::Count
            | SystemFunction::Data => SequenceType::any(),
            SystemFunction::String => SequenceType::optional(ItemType::AnyItem),
            SystemFunction::Number | SystemFunction::Concat => any_atomic_opt,
            SystemFunction::Subsequence => {
                if index == 0 {
                    SequenceType::any()
                } else {
                    SequenceType::atomic(AtomicType::Double, Cardinality::ExactlyOne)
                }
            }
            SystemFunction::Remove => {
                if index == 0 {
                    SequenceType::any()
                } else {
                    SequenceType::atomic(AtomicType::Integer, Cardinality::ExactlyOne)
                }
            }
            SystemFunction::Floor | SystemFunction::Ceiling | SystemFunction::IsWholeNumber => {
                SequenceType::optional(ItemType::numeric())
            }
            SystemFunction::Min { .. } | SystemFunction::Max { .. } => {
                SequenceType::star(ItemType::any_atomic())
            }
            SystemFunction::Error => {
                if index == 0 {
                    any_atomic_opt
                } else {
                    SequenceType::atomic(AtomicType::String, Cardinality::ExactlyOne)
                }
            }
            SystemFunction::Position
            | SystemFunction::Last
            | SystemFunction::True
            | SystemFunction::False => SequenceType::empty(),
        }
    }

    pub fn operand_role(self, index: usize) -> OperandRole {
        match self {
            SystemFunction::Boolean
            | SystemFunction::Not
            | SystemFunction::Exists
            | SystemFunction::Empty
            | SystemFunction::Count => OperandRole::INSPECT,
            SystemFunction::Subsequence | SystemFunction::Remove if index == 0 => {
                OperandRole::SAME_FOCUS_ACTION
            }
            _ => OperandRole::ABSORB,
        }
    }

    /// Returns at most one item.
    pub fn is_singleton_valued(self) -> bool {
        !matches!(
            self,
            SystemFunction::Subsequence
                | SystemFunction::Remove
                | SystemFunction::Data
                | SystemFunction::Error
        )
    }

    pub fn intrinsic_dependencies(self) -> Dependencies {
        match self {
            SystemFunction::Position => Dependencies::POSITION,
            SystemFunction::Last => Dependencies::LAST,
            _ => Dependencies::empty(),
        }
    }

    pub fn has_side_effects(self) -> bool {
        matches!(self, SystemFunction::Error)
    }

    /// Static result type given the static properties of the arguments.
    pub fn result_type(self, args: &[&StaticProperties]) -> (ItemType, Cardinality) {
        let boolean = (ItemType::Atomic(AtomicType::Boolean), Cardinality::ExactlyOne);
        match self {
            SystemFunction::Position | SystemFunction::Last | SystemFunction::Count => {
                (ItemType::Atomic(AtomicType::Integer), Cardinality::ExactlyOne)
            }
            SystemFunction::Boolean
            | SystemFunction::Not
            | SystemFunction::Exists
            | SystemFunction::Empty
            | SystemFunction::True
            | SystemFunction::False
            | SystemFunction::IsWholeNumber => boolean,
            SystemFunction::String | SystemFunction::Concat => {
                (ItemType::Atomic(AtomicType::String), Cardinality::ExactlyOne)
            }
            SystemFunction::Number => {
                (ItemType::Atomic(AtomicType::Double), Cardinality::ExactlyOne)
            }
            SystemFunction::Data => (args[0].item_type.atomized_type(), args[0].cardinality),
            SystemFunction::Subsequence | SystemFunction::Remove => (
                args[0].item_type.clone(),
                args[0].cardinality.with_zero(),
            ),
            SystemFunction::Floor | SystemFunction::Ceiling => {
                let t = numeric_operand_type(&args[0].item_type);
                let t = if t.is_numeric() { t } else { ItemType::numeric() };
                (t, at_most_one(args[0].cardinality))
            }
            SystemFunction::Min { .. } | SystemFunction::Max { .. } => {
                let t = numeric_operand_type(&args[0].item_type.atomized_type());
                let card = if args[0].cardinality.allows_zero() {
                    Cardinality::ZeroOrOne
                } else {
                    Cardinality::ExactlyOne
                };
                (t, card)
            }
            SystemFunction::Error => (ItemType::Error, Cardinality::ZeroOrMore),
        }
    }
}

fn at_most_one(c: Cardinality) -> Cardinality {
    match c {
        Cardinality::Empty => Cardinality::Empty,
        c if c.allows_zero() => Cardinality::ZeroOrOne,
        _ => Cardinality::ExactlyOne,
    }
}

impl fmt::Display for SystemFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// Resolves function names to system functions. Unprefixed names and the
/// `fn:` prefix address the standard namespace.
#[derive(Debug, Clone)]
pub struct FunctionLibrary {
    functions: IndexMap<String, SystemFunction>,
}

impl Default for FunctionLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

impl FunctionLibrary {
    pub fn standard() -> Self {
        let functions = SystemFunction::ALL
            .iter()
            .map(|f| (f.qualified_name(), *f))
            .collect();
        FunctionLibrary { functions }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str, arity: usize) -> XResult<SystemFunction> {
        let qualified = if name.contains(':') {
            name.to_string()
        } else {
            format!("fn:{}", name)
        };
        match self.functions.get(&qualified) {
            Some(f) if f.accepts_arity(arity) => Ok(*f),
            _ => Err(XPathError::static_error(
                "XPST0017",
                format!("Cannot find a {}-argument function named {}()", arity, qualified),
            )),
        }
    }
}

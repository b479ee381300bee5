use crate::atomic::AtomicValue;
use crate::error::ValueError;
use quire_types::AtomicType;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

pub const CODEPOINT_COLLATION: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";
pub const ASCII_CASE_BLIND_COLLATION: &str =
    "http://www.w3.org/2005/xpath-functions/collation/html-ascii-case-insensitive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    #[default]
    Codepoint,
    AsciiCaseInsensitive,
}

impl Collation {
    pub fn from_uri(uri: &str) -> Option<Collation> {
        match uri {
            CODEPOINT_COLLATION => Some(Collation::Codepoint),
            ASCII_CASE_BLIND_COLLATION => Some(Collation::AsciiCaseInsensitive),
            _ => None,
        }
    }

    pub fn uri(self) -> &'static str {
        match self {
            Collation::Codepoint => CODEPOINT_COLLATION,
            Collation::AsciiCaseInsensitive => ASCII_CASE_BLIND_COLLATION,
        }
    }

    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Codepoint => a.cmp(b),
            Collation::AsciiCaseInsensitive => a
                .bytes()
                .map(|c| c.to_ascii_lowercase())
                .cmp(b.bytes().map(|c| c.to_ascii_lowercase())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOperator {
    /// The operator that gives the same answer with the operands swapped.
    pub fn inverse(self) -> Self {
        match self {
            ComparisonOperator::Lt => ComparisonOperator::Gt,
            ComparisonOperator::Le => ComparisonOperator::Ge,
            ComparisonOperator::Gt => ComparisonOperator::Lt,
            ComparisonOperator::Ge => ComparisonOperator::Le,
            other => other,
        }
    }

    /// The logical complement (not valid for NaN operands).
    pub fn negate(self) -> Self {
        match self {
            ComparisonOperator::Eq => ComparisonOperator::Ne,
            ComparisonOperator::Ne => ComparisonOperator::Eq,
            ComparisonOperator::Lt => ComparisonOperator::Ge,
            ComparisonOperator::Le => ComparisonOperator::Gt,
            ComparisonOperator::Gt => ComparisonOperator::Le,
            ComparisonOperator::Ge => ComparisonOperator::Lt,
        }
    }

    pub fn is_ordering(self) -> bool {
        !matches!(self, ComparisonOperator::Eq | ComparisonOperator::Ne)
    }

    pub fn general_symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
        }
    }

    pub fn value_symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "eq",
            ComparisonOperator::Ne => "ne",
            ComparisonOperator::Lt => "lt",
            ComparisonOperator::Le => "le",
            ComparisonOperator::Gt => "gt",
            ComparisonOperator::Ge => "ge",
        }
    }

    pub fn test(self, ordering: Option<Ordering>) -> bool {
        match ordering {
            // NaN: only "ne" holds
            None => self == ComparisonOperator::Ne,
            Some(o) => match self {
                ComparisonOperator::Eq => o == Ordering::Equal,
                ComparisonOperator::Ne => o != Ordering::Equal,
                ComparisonOperator::Lt => o == Ordering::Less,
                ComparisonOperator::Le => o != Ordering::Greater,
                ComparisonOperator::Gt => o == Ordering::Greater,
                ComparisonOperator::Ge => o != Ordering::Less,
            },
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value_symbol())
    }
}

/// Groups of types whose values are mutually comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonClass {
    Numeric,
    Stringy,
    Boolean,
    Date,
    DateTime,
    Time,
    Duration,
    QName,
}

fn class_of(t: AtomicType) -> Option<ComparisonClass> {
    match t {
        AtomicType::Decimal | AtomicType::Integer | AtomicType::Float | AtomicType::Double => {
            Some(ComparisonClass::Numeric)
        }
        AtomicType::String | AtomicType::AnyUri | AtomicType::UntypedAtomic => {
            Some(ComparisonClass::Stringy)
        }
        AtomicType::Boolean => Some(ComparisonClass::Boolean),
        AtomicType::Date => Some(ComparisonClass::Date),
        AtomicType::DateTime => Some(ComparisonClass::DateTime),
        AtomicType::Time => Some(ComparisonClass::Time),
        AtomicType::Duration => Some(ComparisonClass::Duration),
        AtomicType::QName | AtomicType::Notation => Some(ComparisonClass::QName),
        AtomicType::AnyAtomic => None,
    }
}

/// Whether values of the two types could ever be compared with `eq`.
/// `xs:anyAtomicType` is comparable with anything.
pub fn is_comparable(a: AtomicType, b: AtomicType, ordered: bool) -> bool {
    match (class_of(a), class_of(b)) {
        (None, _) | (_, None) => true,
        (Some(x), Some(y)) => x == y && (!ordered || x != ComparisonClass::QName),
    }
}

/// Compares two atomic values under the value-comparison rules. Untyped
/// values are compared as strings; callers apply general-comparison
/// conversions first. Returns `None` when either operand is NaN.
pub fn compare_atomic(
    a: &AtomicValue,
    b: &AtomicValue,
    collation: Collation,
) -> Result<Option<Ordering>, ValueError> {
    let (ta, tb) = (a.atomic_type(), b.atomic_type());
    let class = match (class_of(ta), class_of(tb)) {
        (Some(x), Some(y)) if x == y => x,
        _ => return Err(ValueError::incomparable(ta.to_string(), tb.to_string())),
    };
    Ok(match class {
        ComparisonClass::Numeric => compare_numeric(a, b),
        ComparisonClass::Stringy => {
            Some(collation.compare(&a.to_string_value(), &b.to_string_value()))
        }
        ComparisonClass::Boolean => a.effective_boolean().partial_cmp(&b.effective_boolean()),
        ComparisonClass::QName => {
            if a == b {
                Some(Ordering::Equal)
            } else {
                Some(a.to_string_value().cmp(&b.to_string_value()))
            }
        }
        _ => Some(a.to_string_value().cmp(&b.to_string_value())),
    })
}

fn compare_numeric(a: &AtomicValue, b: &AtomicValue) -> Option<Ordering> {
    match (a, b) {
        (AtomicValue::Integer(x), AtomicValue::Integer(y)) => Some(x.cmp(y)),
        (
            AtomicValue::Integer(_) | AtomicValue::Decimal(_),
            AtomicValue::Integer(_) | AtomicValue::Decimal(_),
        ) => {
            let x: Option<Decimal> = a.to_decimal();
            let y: Option<Decimal> = b.to_decimal();
            x.zip(y).map(|(x, y)| x.cmp(&y))
        }
        _ => a.to_double().partial_cmp(&b.to_double()),
    }
}

/// A value comparison `a op b`. Ordering operators are rejected for types
/// without an ordering.
pub fn value_compare(
    a: &AtomicValue,
    op: ComparisonOperator,
    b: &AtomicValue,
    collation: Collation,
) -> Result<bool, ValueError> {
    if op.is_ordering() && (!a.atomic_type().is_ordered() || !b.atomic_type().is_ordered()) {
        return Err(ValueError::incomparable(a.type_name(), b.type_name()));
    }
    Ok(op.test(compare_atomic(a, b, collation)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(a: AtomicValue, op: ComparisonOperator, b: AtomicValue) -> bool {
        value_compare(&a, op, &b, Collation::Codepoint).unwrap()
    }

    #[test]
    fn test_numeric_comparison_across_types() {
        use ComparisonOperator::*;
        assert!(eval(AtomicValue::Integer(3), Eq, AtomicValue::Double(3.0)));
        assert!(eval(AtomicValue::Decimal(Decimal::new(25, 1)), Lt, AtomicValue::Integer(3)));
        assert!(!eval(AtomicValue::Double(f64::NAN), Eq, AtomicValue::Double(f64::NAN)));
        assert!(eval(AtomicValue::Double(f64::NAN), Ne, AtomicValue::Integer(1)));
    }

    #[test]
    fn test_string_and_untyped_compare_as_strings() {
        use ComparisonOperator::*;
        assert!(eval(AtomicValue::untyped("5"), Eq, AtomicValue::string("5")));
        assert!(eval(AtomicValue::string("A"), Lt, AtomicValue::string("a")));
        let blind = value_compare(
            &AtomicValue::string("ABC"),
            Eq,
            &AtomicValue::string("abc"),
            Collation::AsciiCaseInsensitive,
        );
        assert_eq!(blind, Ok(true));
    }

    #[test]
    fn test_incomparable_types() {
        let err = value_compare(
            &AtomicValue::Integer(1),
            ComparisonOperator::Eq,
            &AtomicValue::string("1"),
            Collation::Codepoint,
        )
        .unwrap_err();
        assert_eq!(err.code(), "XPTY0004");
        assert!(!is_comparable(AtomicType::Date, AtomicType::Integer, false));
        assert!(is_comparable(AtomicType::AnyAtomic, AtomicType::Date, true));
        assert!(!is_comparable(AtomicType::QName, AtomicType::QName, true));
    }

    #[test]
    fn test_numeric_types_form_one_class() {
        let numeric = [
            AtomicType::Decimal,
            AtomicType::Integer,
            AtomicType::Float,
            AtomicType::Double,
        ];
        for a in numeric {
            for b in numeric {
                assert!(is_comparable(a, b, true), "{} vs {}", a, b);
            }
            assert!(!is_comparable(a, AtomicType::String, false));
            assert!(!is_comparable(a, AtomicType::Boolean, false));
        }
    }

    #[test]
    fn test_operator_algebra() {
        assert_eq!(ComparisonOperator::Lt.inverse(), ComparisonOperator::Gt);
        assert_eq!(ComparisonOperator::Eq.inverse(), ComparisonOperator::Eq);
        assert_eq!(ComparisonOperator::Le.negate(), ComparisonOperator::Gt);
        assert_eq!(Collation::from_uri(CODEPOINT_COLLATION), Some(Collation::Codepoint));
    }
}

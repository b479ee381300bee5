use quire_types::AtomicType;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub enum AtomicValue {
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Float(f32),
    Double(f64),
    Date(String),
    DateTime(String),
    Time(String),
    Duration(String),
    QName {
        prefix: Option<String>,
        local: String,
        namespace: Option<String>,
    },
}

impl AtomicValue {
    pub fn atomic_type(&self) -> AtomicType {
        match self {
            AtomicValue::String(_) => AtomicType::String,
            AtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            AtomicValue::AnyUri(_) => AtomicType::AnyUri,
            AtomicValue::Boolean(_) => AtomicType::Boolean,
            AtomicValue::Integer(_) => AtomicType::Integer,
            AtomicValue::Decimal(_) => AtomicType::Decimal,
            AtomicValue::Float(_) => AtomicType::Float,
            AtomicValue::Double(_) => AtomicType::Double,
            AtomicValue::Date(_) => AtomicType::Date,
            AtomicValue::DateTime(_) => AtomicType::DateTime,
            AtomicValue::Time(_) => AtomicType::Time,
            AtomicValue::Duration(_) => AtomicType::Duration,
            AtomicValue::QName { .. } => AtomicType::QName,
        }
    }

    pub fn type_name(&self) -> String {
        self.atomic_type().to_string()
    }

    pub fn to_string_value(&self) -> String {
        match self {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                s.clone()
            }
            AtomicValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => d.normalize().to_string(),
            AtomicValue::Float(f) => format_double(*f as f64),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::Date(s)
            | AtomicValue::DateTime(s)
            | AtomicValue::Time(s)
            | AtomicValue::Duration(s) => s.clone(),
            AtomicValue::QName { prefix, local, .. } => match prefix {
                Some(p) => format!("{}:{}", p, local),
                None => local.clone(),
            },
        }
    }

    /// Effective boolean value of a single atomic item, or `None` when the
    /// type has no boolean value (FORG0006).
    pub fn effective_boolean(&self) -> Option<bool> {
        match self {
            AtomicValue::Boolean(b) => Some(*b),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                Some(!s.is_empty())
            }
            AtomicValue::Integer(i) => Some(*i != 0),
            AtomicValue::Decimal(d) => Some(!d.is_zero()),
            AtomicValue::Float(f) => Some(*f != 0.0 && !f.is_nan()),
            AtomicValue::Double(d) => Some(*d != 0.0 && !d.is_nan()),
            _ => None,
        }
    }

    pub fn to_double(&self) -> f64 {
        match self {
            AtomicValue::Double(d) => *d,
            AtomicValue::Float(f) => *f as f64,
            AtomicValue::Integer(i) => *i as f64,
            AtomicValue::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => parse_double(s),
            AtomicValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            AtomicValue::Integer(i) => Some(Decimal::from(*i)),
            AtomicValue::Decimal(d) => Some(*d),
            AtomicValue::Float(f) => Decimal::from_f32(*f),
            AtomicValue::Double(d) => Decimal::from_f64(*d),
            _ => None,
        }
    }

    /// Integer value of a numeric that is a whole number, if it fits.
    pub fn as_whole_number(&self) -> Option<i64> {
        match self {
            AtomicValue::Integer(i) => Some(*i),
            AtomicValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            AtomicValue::Float(_) | AtomicValue::Double(_) => {
                let d = self.to_double();
                if d.is_finite() && d.fract() == 0.0 && d.abs() < 9.0e15 {
                    Some(d as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Integer(_)
                | AtomicValue::Decimal(_)
                | AtomicValue::Float(_)
                | AtomicValue::Double(_)
        )
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, AtomicValue::UntypedAtomic(_))
    }

    pub fn is_nan(&self) -> bool {
        match self {
            AtomicValue::Double(d) => d.is_nan(),
            AtomicValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        AtomicValue::String(s.into())
    }

    pub fn untyped(s: impl Into<String>) -> Self {
        AtomicValue::UntypedAtomic(s.into())
    }
}

pub(crate) fn parse_double(s: &str) -> f64 {
    match s.trim() {
        "INF" | "+INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        other => other.parse().unwrap_or(f64::NAN),
    }
}

pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if d == 0.0 && d.is_sign_negative() {
        "-0".to_string()
    } else if d != 0.0 && (d.abs() >= 1e6 || d.abs() < 1e-6) {
        format!("{:E}", d)
    } else {
        d.to_string()
    }
}

/// Identity comparison used for hashing and structural equality of literal
/// values. XPath value comparison lives in [`crate::compare`].
impl PartialEq for AtomicValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AtomicValue::String(a), AtomicValue::String(b))
            | (AtomicValue::UntypedAtomic(a), AtomicValue::UntypedAtomic(b))
            | (AtomicValue::AnyUri(a), AtomicValue::AnyUri(b))
            | (AtomicValue::Date(a), AtomicValue::Date(b))
            | (AtomicValue::DateTime(a), AtomicValue::DateTime(b))
            | (AtomicValue::Time(a), AtomicValue::Time(b))
            | (AtomicValue::Duration(a), AtomicValue::Duration(b)) => a == b,
            (AtomicValue::Boolean(a), AtomicValue::Boolean(b)) => a == b,
            (AtomicValue::Integer(a), AtomicValue::Integer(b)) => a == b,
            (AtomicValue::Decimal(a), AtomicValue::Decimal(b)) => a == b,
            (AtomicValue::Float(a), AtomicValue::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (AtomicValue::Double(a), AtomicValue::Double(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (
                AtomicValue::QName {
                    local: l1,
                    namespace: n1,
                    ..
                },
                AtomicValue::QName {
                    local: l2,
                    namespace: n2,
                    ..
                },
            ) => l1 == l2 && n1 == n2,
            _ => false,
        }
    }
}

impl Eq for AtomicValue {}

impl Hash for AtomicValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AtomicValue::String(s)
            | AtomicValue::UntypedAtomic(s)
            | AtomicValue::AnyUri(s)
            | AtomicValue::Date(s)
            | AtomicValue::DateTime(s)
            | AtomicValue::Time(s)
            | AtomicValue::Duration(s) => s.hash(state),
            AtomicValue::Boolean(b) => b.hash(state),
            AtomicValue::Integer(i) => i.hash(state),
            AtomicValue::Decimal(d) => d.normalize().to_string().hash(state),
            AtomicValue::Float(f) => {
                if !f.is_nan() {
                    f.to_bits().hash(state)
                }
            }
            AtomicValue::Double(d) => {
                if !d.is_nan() {
                    d.to_bits().hash(state)
                }
            }
            AtomicValue::QName {
                local, namespace, ..
            } => {
                local.hash(state);
                namespace.hash(state);
            }
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => {
                f.write_str(&self.to_string_value())
            }
            AtomicValue::Boolean(b) => write!(f, "{}()", b),
            other => write!(f, "{}(\"{}\")", other.type_name(), other.to_string_value()),
        }
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<i32> for AtomicValue {
    fn from(i: i32) -> Self {
        AtomicValue::Integer(i as i64)
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}

impl From<Decimal> for AtomicValue {
    fn from(d: Decimal) -> Self {
        AtomicValue::Decimal(d)
    }
}

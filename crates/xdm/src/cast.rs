//! Casting between atomic types.
//!
//! [`cast_possibility`] answers statically whether a cast can succeed;
//! [`Converter`] is the value-level conversion selected once at compile time
//! and applied to every item at run time.

use crate::atomic::{AtomicValue, parse_double};
use crate::error::ValueError;
use quire_types::AtomicType;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Castability {
    /// Every value of the source type converts.
    Always,
    /// Success depends on the value (e.g. string to integer).
    Maybe,
    /// No value of the source type converts.
    Never,
}

pub fn cast_possibility(from: AtomicType, to: AtomicType) -> Castability {
    use AtomicType::*;
    if to.is_abstract() {
        return Castability::Never;
    }
    if from == to || from.is_subtype_of(to) {
        return Castability::Always;
    }
    match (from, to) {
        (AnyAtomic, _) => Castability::Maybe,
        (_, String) | (_, UntypedAtomic) => Castability::Always,
        (String, QName) | (UntypedAtomic, QName) => Castability::Never,
        (String, _) | (UntypedAtomic, _) => Castability::Maybe,
        (Integer, Decimal) | (Integer, Double) | (Integer, Float) => Castability::Always,
        (Decimal, Double) | (Decimal, Float) | (Float, Double) => Castability::Always,
        (Double, Float) => Castability::Always,
        (Double | Float, Decimal | Integer) => Castability::Maybe,
        (Decimal, Integer) => Castability::Maybe,
        (Boolean, t) if t.is_numeric() => Castability::Always,
        (f, Boolean) if f.is_numeric() => Castability::Always,
        (DateTime, Date) | (DateTime, Time) | (Date, DateTime) => Castability::Always,
        _ => Castability::Never,
    }
}

/// A conversion chosen statically for a fixed (source, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    Identity,
    /// The source is a subtype of the target: the value is relabelled,
    /// never rejected.
    UpCast(AtomicType),
    Cast { from: AtomicType, to: AtomicType },
    /// Source type unknown until run time.
    Dynamic(AtomicType),
}

impl Converter {
    /// Picks the converter for a statically known source type, or `None`
    /// when no value of `from` can be cast to `to`.
    pub fn for_types(from: AtomicType, to: AtomicType) -> Option<Converter> {
        if from == to {
            return Some(Converter::Identity);
        }
        if from == AtomicType::AnyAtomic {
            return Some(Converter::Dynamic(to));
        }
        if from.is_subtype_of(to) {
            return Some(Converter::UpCast(to));
        }
        match cast_possibility(from, to) {
            Castability::Never => None,
            _ => Some(Converter::Cast { from, to }),
        }
    }

    pub fn target(&self) -> Option<AtomicType> {
        match self {
            Converter::Identity => None,
            Converter::UpCast(t) | Converter::Dynamic(t) => Some(*t),
            Converter::Cast { to, .. } => Some(*to),
        }
    }

    pub fn convert(&self, value: AtomicValue) -> Result<AtomicValue, ValueError> {
        match self {
            Converter::Identity => Ok(value),
            Converter::UpCast(to) => Ok(relabel(value, *to)),
            Converter::Cast { to, .. } | Converter::Dynamic(to) => cast_atomic(&value, *to),
        }
    }
}

fn relabel(value: AtomicValue, to: AtomicType) -> AtomicValue {
    match (value, to) {
        (AtomicValue::Integer(i), AtomicType::Decimal) => AtomicValue::Decimal(Decimal::from(i)),
        (v, _) => v,
    }
}

/// Numeric promotion: decimal (and integer) to float or double, float to
/// double. Other values pass through unchanged.
pub fn promote(value: AtomicValue, to: AtomicType) -> AtomicValue {
    match (&value, to) {
        (AtomicValue::Integer(_) | AtomicValue::Decimal(_), AtomicType::Double)
        | (AtomicValue::Float(_), AtomicType::Double) => AtomicValue::Double(value.to_double()),
        (AtomicValue::Integer(_) | AtomicValue::Decimal(_), AtomicType::Float) => {
            AtomicValue::Float(value.to_double() as f32)
        }
        _ => value,
    }
}

pub fn cast_atomic(value: &AtomicValue, target: AtomicType) -> Result<AtomicValue, ValueError> {
    let source = value.atomic_type();
    if source == target {
        return Ok(value.clone());
    }
    if cast_possibility(source, target) == Castability::Never {
        return Err(ValueError::invalid_cast(source.to_string(), target.to_string()));
    }
    let lexical = || value.to_string_value();
    let invalid = || ValueError::invalid_lexical(value.to_string_value(), target.to_string());

    match target {
        AtomicType::String => Ok(AtomicValue::String(lexical())),
        AtomicType::UntypedAtomic => Ok(AtomicValue::UntypedAtomic(lexical())),
        AtomicType::AnyUri => Ok(AtomicValue::AnyUri(lexical().trim().to_string())),

        AtomicType::Boolean => {
            let b = match value {
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => match s.trim() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(invalid()),
                },
                other => other.effective_boolean().ok_or_else(invalid)?,
            };
            Ok(AtomicValue::Boolean(b))
        }

        AtomicType::Integer => match value {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => s
                .trim()
                .parse::<i64>()
                .map(AtomicValue::Integer)
                .map_err(|_| invalid()),
            AtomicValue::Boolean(b) => Ok(AtomicValue::Integer(i64::from(*b))),
            AtomicValue::Decimal(d) => d
                .trunc()
                .to_i64()
                .map(AtomicValue::Integer)
                .ok_or(ValueError::Overflow),
            AtomicValue::Float(_) | AtomicValue::Double(_) => {
                let d = value.to_double();
                if !d.is_finite() {
                    return Err(invalid());
                }
                let t = d.trunc();
                if t.abs() > i64::MAX as f64 {
                    return Err(ValueError::Overflow);
                }
                Ok(AtomicValue::Integer(t as i64))
            }
            _ => Err(invalid()),
        },

        AtomicType::Decimal => match value {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
                let t = s.trim();
                if t.contains(['e', 'E']) || t.is_empty() {
                    return Err(invalid());
                }
                t.parse::<Decimal>()
                    .map(AtomicValue::Decimal)
                    .map_err(|_| invalid())
            }
            AtomicValue::Boolean(b) => Ok(AtomicValue::Decimal(Decimal::from(i64::from(*b)))),
            other => other
                .to_decimal()
                .map(AtomicValue::Decimal)
                .ok_or_else(invalid),
        },

        AtomicType::Double | AtomicType::Float => {
            let d = match value {
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
                    let d = parse_double(s);
                    if d.is_nan() && s.trim() != "NaN" {
                        return Err(invalid());
                    }
                    d
                }
                other => other.to_double(),
            };
            if target == AtomicType::Float {
                Ok(AtomicValue::Float(d as f32))
            } else {
                Ok(AtomicValue::Double(d))
            }
        }

        AtomicType::Date => match value {
            AtomicValue::DateTime(dt) => dt
                .split_once('T')
                .map(|(date, _)| AtomicValue::Date(date.to_string()))
                .ok_or_else(invalid),
            _ => lexical_check(&lexical(), is_date_lexical)
                .map(AtomicValue::Date)
                .ok_or_else(invalid),
        },
        AtomicType::Time => match value {
            AtomicValue::DateTime(dt) => dt
                .split_once('T')
                .map(|(_, time)| AtomicValue::Time(time.to_string()))
                .ok_or_else(invalid),
            _ => lexical_check(&lexical(), is_time_lexical)
                .map(AtomicValue::Time)
                .ok_or_else(invalid),
        },
        AtomicType::DateTime => match value {
            AtomicValue::Date(d) => Ok(AtomicValue::DateTime(format!("{}T00:00:00", d))),
            _ => lexical_check(&lexical(), |s| {
                s.split_once('T')
                    .is_some_and(|(d, t)| is_date_lexical(d) && is_time_lexical(t))
            })
            .map(AtomicValue::DateTime)
            .ok_or_else(invalid),
        },
        AtomicType::Duration => lexical_check(&lexical(), |s| {
            let s = s.strip_prefix('-').unwrap_or(s);
            s.starts_with('P') && s.len() > 1
        })
        .map(AtomicValue::Duration)
        .ok_or_else(invalid),

        AtomicType::QName | AtomicType::Notation | AtomicType::AnyAtomic => {
            Err(ValueError::invalid_cast(source.to_string(), target.to_string()))
        }
    }
}

fn lexical_check(s: &str, valid: impl Fn(&str) -> bool) -> Option<String> {
    let t = s.trim();
    valid(t).then(|| t.to_string())
}

fn is_date_lexical(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let parts: Vec<&str> = body.splitn(3, '-').collect();
    let digits = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    // the day may carry a timezone suffix
    parts.len() == 3
        && parts[0].len() >= 4
        && digits(parts[0])
        && parts[1].len() == 2
        && digits(parts[1])
        && parts[2].len() >= 2
        && parts[2].is_char_boundary(2)
        && digits(&parts[2][..2])
}

fn is_time_lexical(s: &str) -> bool {
    let parts: Vec<&str> = s.splitn(3, ':').collect();
    parts.len() == 3
        && parts[0].len() == 2
        && parts[1].len() == 2
        && parts[0].chars().chain(parts[1].chars()).all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_possibility_table() {
        use AtomicType::*;
        assert_eq!(cast_possibility(Integer, Decimal), Castability::Always);
        assert_eq!(cast_possibility(String, Integer), Castability::Maybe);
        assert_eq!(cast_possibility(Date, Integer), Castability::Never);
        assert_eq!(cast_possibility(Boolean, Double), Castability::Always);
        assert_eq!(cast_possibility(Double, AnyAtomic), Castability::Never);
        assert_eq!(cast_possibility(Date, String), Castability::Always);
    }

    #[test]
    fn test_converter_selection() {
        use AtomicType::*;
        assert_eq!(Converter::for_types(Integer, Integer), Some(Converter::Identity));
        assert_eq!(Converter::for_types(Integer, Decimal), Some(Converter::UpCast(Decimal)));
        assert_eq!(Converter::for_types(Date, Boolean), None);
        assert_eq!(Converter::for_types(AnyAtomic, Double), Some(Converter::Dynamic(Double)));
    }

    #[test]
    fn test_upcast_relabels_integer_as_decimal() {
        let out = Converter::UpCast(AtomicType::Decimal)
            .convert(AtomicValue::Integer(4))
            .unwrap();
        assert_eq!(out, AtomicValue::Decimal(Decimal::from(4)));
    }

    #[test]
    fn test_string_casts() {
        assert_eq!(
            cast_atomic(&AtomicValue::string(" 42 "), AtomicType::Integer).unwrap(),
            AtomicValue::Integer(42)
        );
        assert_eq!(
            cast_atomic(&AtomicValue::untyped("2.5"), AtomicType::Double).unwrap(),
            AtomicValue::Double(2.5)
        );
        let err = cast_atomic(&AtomicValue::string("abc"), AtomicType::Integer).unwrap_err();
        assert_eq!(err.code(), "FORG0001");
        assert_eq!(
            cast_atomic(&AtomicValue::string("true"), AtomicType::Boolean).unwrap(),
            AtomicValue::Boolean(true)
        );
    }

    #[test]
    fn test_numeric_casts() {
        assert_eq!(
            cast_atomic(&AtomicValue::Double(3.7), AtomicType::Integer).unwrap(),
            AtomicValue::Integer(3)
        );
        assert!(cast_atomic(&AtomicValue::Double(f64::NAN), AtomicType::Integer).is_err());
        assert_eq!(
            cast_atomic(&AtomicValue::Integer(1), AtomicType::Boolean).unwrap(),
            AtomicValue::Boolean(true)
        );
    }

    #[test]
    fn test_date_casts() {
        assert_eq!(
            cast_atomic(&AtomicValue::string("2024-03-01"), AtomicType::Date).unwrap(),
            AtomicValue::Date("2024-03-01".into())
        );
        assert_eq!(
            cast_atomic(&AtomicValue::DateTime("2024-03-01T10:00:00".into()), AtomicType::Date)
                .unwrap(),
            AtomicValue::Date("2024-03-01".into())
        );
        assert!(cast_atomic(&AtomicValue::string("yesterday"), AtomicType::Date).is_err());
    }

    #[test]
    fn test_promotion() {
        assert_eq!(
            promote(AtomicValue::Integer(2), AtomicType::Double),
            AtomicValue::Double(2.0)
        );
        assert_eq!(
            promote(AtomicValue::string("x"), AtomicType::Double),
            AtomicValue::string("x")
        );
    }
}

use crate::atomic::AtomicValue;
use crate::error::ValueError;
use quire_types::AtomicType;
use rust_decimal::Decimal;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOperator {
    Plus,
    Minus,
    Times,
    Div,
    IDiv,
    Mod,
}

impl ArithmeticOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOperator::Plus => "+",
            ArithmeticOperator::Minus => "-",
            ArithmeticOperator::Times => "*",
            ArithmeticOperator::Div => "div",
            ArithmeticOperator::IDiv => "idiv",
            ArithmeticOperator::Mod => "mod",
        }
    }
}

impl fmt::Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NumericRank {
    Integer,
    Decimal,
    Float,
    Double,
}

fn rank(t: AtomicType) -> Option<NumericRank> {
    match t {
        AtomicType::Integer => Some(NumericRank::Integer),
        AtomicType::Decimal => Some(NumericRank::Decimal),
        AtomicType::Float => Some(NumericRank::Float),
        AtomicType::Double => Some(NumericRank::Double),
        _ => None,
    }
}

/// Static result type of `a op b` for numeric operand types, or `None` if
/// either side is not a known numeric type.
pub fn arithmetic_result_type(
    a: AtomicType,
    op: ArithmeticOperator,
    b: AtomicType,
) -> Option<AtomicType> {
    let r = rank(a)?.max(rank(b)?);
    Some(match (r, op) {
        (_, ArithmeticOperator::IDiv) => AtomicType::Integer,
        (NumericRank::Integer, ArithmeticOperator::Div) => AtomicType::Decimal,
        (NumericRank::Integer, _) => AtomicType::Integer,
        (NumericRank::Decimal, _) => AtomicType::Decimal,
        (NumericRank::Float, _) => AtomicType::Float,
        (NumericRank::Double, _) => AtomicType::Double,
    })
}

/// Numeric arithmetic with the usual promotion: operands are raised to the
/// wider of their two types before the operation.
pub fn arithmetic(
    a: &AtomicValue,
    op: ArithmeticOperator,
    b: &AtomicValue,
) -> Result<AtomicValue, ValueError> {
    let (ra, rb) = match (rank(a.atomic_type()), rank(b.atomic_type())) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(ValueError::InvalidArithmetic {
                left: a.type_name(),
                right: b.type_name(),
            });
        }
    };
    match ra.max(rb) {
        NumericRank::Integer => match (a, b) {
            (AtomicValue::Integer(x), AtomicValue::Integer(y)) => integer_arith(*x, op, *y),
            _ => Err(ValueError::InvalidArithmetic {
                left: a.type_name(),
                right: b.type_name(),
            }),
        },
        NumericRank::Decimal => {
            let x = a.to_decimal().ok_or(ValueError::Overflow)?;
            let y = b.to_decimal().ok_or(ValueError::Overflow)?;
            decimal_arith(x, op, y)
        }
        NumericRank::Float => {
            double_arith(a.to_double(), op, b.to_double()).map(|v| match v {
                AtomicValue::Double(d) => AtomicValue::Float(d as f32),
                other => other,
            })
        }
        NumericRank::Double => double_arith(a.to_double(), op, b.to_double()),
    }
}

fn integer_arith(x: i64, op: ArithmeticOperator, y: i64) -> Result<AtomicValue, ValueError> {
    let result = match op {
        ArithmeticOperator::Plus => x.checked_add(y),
        ArithmeticOperator::Minus => x.checked_sub(y),
        ArithmeticOperator::Times => x.checked_mul(y),
        ArithmeticOperator::Div => {
            return decimal_arith(Decimal::from(x), op, Decimal::from(y));
        }
        ArithmeticOperator::IDiv | ArithmeticOperator::Mod if y == 0 => {
            return Err(ValueError::DivisionByZero);
        }
        ArithmeticOperator::IDiv => x.checked_div(y),
        ArithmeticOperator::Mod => x.checked_rem(y),
    };
    result.map(AtomicValue::Integer).ok_or(ValueError::Overflow)
}

fn decimal_arith(
    x: Decimal,
    op: ArithmeticOperator,
    y: Decimal,
) -> Result<AtomicValue, ValueError> {
    let divides = matches!(
        op,
        ArithmeticOperator::Div | ArithmeticOperator::IDiv | ArithmeticOperator::Mod
    );
    if divides && y.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    let result = match op {
        ArithmeticOperator::Plus => x.checked_add(y),
        ArithmeticOperator::Minus => x.checked_sub(y),
        ArithmeticOperator::Times => x.checked_mul(y),
        ArithmeticOperator::Div => x.checked_div(y),
        ArithmeticOperator::IDiv => {
            let q = x.checked_div(y).ok_or(ValueError::Overflow)?.trunc();
            return i64::try_from(q)
                .map(AtomicValue::Integer)
                .map_err(|_| ValueError::Overflow);
        }
        ArithmeticOperator::Mod => x.checked_rem(y),
    };
    result.map(AtomicValue::Decimal).ok_or(ValueError::Overflow)
}

fn double_arith(x: f64, op: ArithmeticOperator, y: f64) -> Result<AtomicValue, ValueError> {
    let d = match op {
        ArithmeticOperator::Plus => x + y,
        ArithmeticOperator::Minus => x - y,
        ArithmeticOperator::Times => x * y,
        ArithmeticOperator::Div => x / y,
        ArithmeticOperator::Mod => x % y,
        ArithmeticOperator::IDiv => {
            if y == 0.0 {
                return Err(ValueError::DivisionByZero);
            }
            let q = (x / y).trunc();
            if !q.is_finite() || q.abs() > i64::MAX as f64 {
                return Err(ValueError::Overflow);
            }
            return Ok(AtomicValue::Integer(q as i64));
        }
    };
    Ok(AtomicValue::Double(d))
}

pub fn negate(a: &AtomicValue) -> Result<AtomicValue, ValueError> {
    match a {
        AtomicValue::Integer(i) => i
            .checked_neg()
            .map(AtomicValue::Integer)
            .ok_or(ValueError::Overflow),
        AtomicValue::Decimal(d) => Ok(AtomicValue::Decimal(-*d)),
        AtomicValue::Float(f) => Ok(AtomicValue::Float(-*f)),
        AtomicValue::Double(d) => Ok(AtomicValue::Double(-*d)),
        other => Err(ValueError::InvalidArithmetic {
            left: other.type_name(),
            right: other.type_name(),
        }),
    }
}

pub fn floor(a: &AtomicValue) -> AtomicValue {
    match a {
        AtomicValue::Decimal(d) => AtomicValue::Decimal(d.floor()),
        AtomicValue::Float(f) => AtomicValue::Float(f.floor()),
        AtomicValue::Double(d) => AtomicValue::Double(d.floor()),
        other => other.clone(),
    }
}

pub fn ceiling(a: &AtomicValue) -> AtomicValue {
    match a {
        AtomicValue::Decimal(d) => AtomicValue::Decimal(d.ceil()),
        AtomicValue::Float(f) => AtomicValue::Float(f.ceil()),
        AtomicValue::Double(d) => AtomicValue::Double(d.ceil()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ArithmeticOperator::*;

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(
            arithmetic(&AtomicValue::Integer(2), Plus, &AtomicValue::Integer(3)).unwrap(),
            AtomicValue::Integer(5)
        );
        assert_eq!(
            arithmetic(&AtomicValue::Integer(7), IDiv, &AtomicValue::Integer(2)).unwrap(),
            AtomicValue::Integer(3)
        );
        assert_eq!(
            arithmetic(&AtomicValue::Integer(1), Div, &AtomicValue::Integer(4)).unwrap(),
            AtomicValue::Decimal(Decimal::new(25, 2))
        );
        assert_eq!(
            arithmetic(&AtomicValue::Integer(i64::MAX), Plus, &AtomicValue::Integer(1)),
            Err(ValueError::Overflow)
        );
        assert_eq!(
            arithmetic(&AtomicValue::Integer(1), Mod, &AtomicValue::Integer(0)),
            Err(ValueError::DivisionByZero)
        );
    }

    #[test]
    fn test_promotion_to_double() {
        assert_eq!(
            arithmetic(&AtomicValue::Integer(1), Plus, &AtomicValue::Double(0.5)).unwrap(),
            AtomicValue::Double(1.5)
        );
        assert_eq!(
            arithmetic(&AtomicValue::Double(1.0), Div, &AtomicValue::Integer(0)).unwrap(),
            AtomicValue::Double(f64::INFINITY)
        );
    }

    #[test]
    fn test_result_types() {
        let (int, dbl) = (AtomicType::Integer, AtomicType::Double);
        assert_eq!(arithmetic_result_type(int, Div, int), Some(AtomicType::Decimal));
        assert_eq!(arithmetic_result_type(int, Times, dbl), Some(dbl));
        assert_eq!(arithmetic_result_type(AtomicType::Float, IDiv, dbl), Some(int));
        assert_eq!(arithmetic_result_type(AtomicType::String, Plus, int), None);
    }

    #[test]
    fn test_rejects_non_numeric_operands() {
        assert!(arithmetic(&AtomicValue::string("a"), Plus, &AtomicValue::Integer(1)).is_err());
    }
}

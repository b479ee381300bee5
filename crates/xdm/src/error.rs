use thiserror::Error;

/// Failures raised while converting, comparing or computing atomic values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Cannot cast {from_type} to {to_type}")]
    InvalidCast { from_type: String, to_type: String },

    #[error("Invalid value for cast to {to_type}: '{value}'")]
    InvalidLexical { value: String, to_type: String },

    #[error("Cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },

    #[error("Cannot atomize {0}")]
    NotAtomizable(String),

    #[error("Arithmetic operator is not defined for {left} and {right}")]
    InvalidArithmetic { left: String, right: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Numeric overflow")]
    Overflow,
}

impl ValueError {
    pub fn invalid_cast(from_type: impl Into<String>, to_type: impl Into<String>) -> Self {
        Self::InvalidCast {
            from_type: from_type.into(),
            to_type: to_type.into(),
        }
    }

    pub fn invalid_lexical(value: impl Into<String>, to_type: impl Into<String>) -> Self {
        Self::InvalidLexical {
            value: value.into(),
            to_type: to_type.into(),
        }
    }

    pub fn incomparable(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::Incomparable {
            left: left.into(),
            right: right.into(),
        }
    }

    /// The XPath error code this failure maps to.
    pub fn code(&self) -> &'static str {
        match self {
            ValueError::InvalidCast { .. }
            | ValueError::Incomparable { .. }
            | ValueError::InvalidArithmetic { .. } => "XPTY0004",
            ValueError::InvalidLexical { .. } => "FORG0001",
            ValueError::NotAtomizable(_) => "FOTY0013",
            ValueError::DivisionByZero => "FOAR0001",
            ValueError::Overflow => "FOAR0002",
        }
    }
}

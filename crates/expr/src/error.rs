use quire_xdm::ValueError;
use std::fmt;
use thiserror::Error;

/// Position of an expression in the source text. Line 0 means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const UNKNOWN: Location = Location { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            Ok(())
        } else {
            write!(f, " at line {}, column {}", self.line, self.column)
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    /// Raised by simplify, type-check or optimize. Always fatal to the
    /// compilation of the enclosing expression.
    #[error("{code}: {message}{location}")]
    Static {
        code: String,
        message: String,
        is_type_error: bool,
        location: Location,
    },

    /// Raised while evaluating, including by guards the type checker
    /// inserted.
    #[error("{code}: {message}{location}")]
    Dynamic {
        code: String,
        message: String,
        location: Location,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl XPathError {
    pub fn static_type(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Static {
            code: code.into(),
            message: message.into(),
            is_type_error: true,
            location: Location::UNKNOWN,
        }
    }

    pub fn static_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Static {
            code: code.into(),
            message: message.into(),
            is_type_error: false,
            location: Location::UNKNOWN,
        }
    }

    pub fn dynamic(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dynamic {
            code: code.into(),
            message: message.into(),
            location: Location::UNKNOWN,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            XPathError::Static { code, .. } | XPathError::Dynamic { code, .. } => Some(code),
            XPathError::Config(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            XPathError::Static { message, .. }
            | XPathError::Dynamic { message, .. }
            | XPathError::Config(message) => message,
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            XPathError::Static {
                is_type_error: true,
                ..
            }
        )
    }

    pub fn is_static(&self) -> bool {
        matches!(self, XPathError::Static { .. })
    }

    /// Attaches a location unless the error already carries one.
    pub fn at(mut self, at: Location) -> Self {
        match &mut self {
            XPathError::Static { location, .. } | XPathError::Dynamic { location, .. } => {
                if location.is_unknown() {
                    *location = at;
                }
            }
            XPathError::Config(_) => {}
        }
        self
    }

    /// Re-raises a dynamic failure as a static one: used when the failing
    /// expression is a compile-time constant and could never succeed.
    pub fn into_static(self) -> Self {
        match self {
            XPathError::Dynamic {
                code,
                message,
                location,
            } => XPathError::Static {
                code,
                message,
                is_type_error: true,
                location,
            },
            other => other,
        }
    }
}

impl From<ValueError> for XPathError {
    fn from(e: ValueError) -> Self {
        XPathError::dynamic(e.code(), e.to_string())
    }
}

pub type XResult<T> = Result<T, XPathError>;

use crate::error::XPathError;
use quire_types::{Cardinality, ItemType};
use std::fmt;

/// Where a value being type-checked comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleKind {
    FunctionArgument { function: String, position: usize },
    Operand { operator: String, position: usize },
    Variable(String),
    TypeOperation(String),
    ContextItem,
}

/// Describes the operand being checked, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleDiagnostic {
    pub kind: RoleKind,
    pub error_code: String,
}

impl RoleDiagnostic {
    fn new(kind: RoleKind) -> Self {
        RoleDiagnostic {
            kind,
            error_code: "XPTY0004".to_string(),
        }
    }

    /// `position` counts from zero.
    pub fn function_argument(function: impl Into<String>, position: usize) -> Self {
        Self::new(RoleKind::FunctionArgument {
            function: function.into(),
            position,
        })
    }

    pub fn operand(operator: impl Into<String>, position: usize) -> Self {
        Self::new(RoleKind::Operand {
            operator: operator.into(),
            position,
        })
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(RoleKind::Variable(name.into()))
    }

    pub fn type_operation(name: impl Into<String>) -> Self {
        Self::new(RoleKind::TypeOperation(name.into()))
    }

    pub fn context_item() -> Self {
        Self::new(RoleKind::ContextItem)
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = code.into();
        self
    }

    pub fn message(&self) -> String {
        match &self.kind {
            RoleKind::FunctionArgument { function, position } => {
                format!("{} argument of {}()", ordinal(*position), function)
            }
            RoleKind::Operand { operator, position } => {
                format!("{} operand of '{}'", ordinal(*position), operator)
            }
            RoleKind::Variable(name) => format!("variable ${}", name),
            RoleKind::TypeOperation(name) => format!("operand of '{}'", name),
            RoleKind::ContextItem => "context item".to_string(),
        }
    }

    pub fn item_type_mismatch(&self, required: &ItemType, supplied: &str) -> String {
        format!(
            "Required item type of {} is {}; supplied value has item type {}",
            self.message(),
            required,
            supplied
        )
    }

    pub fn cardinality_mismatch(&self, required: Cardinality, supplied: &str) -> String {
        format!(
            "Required cardinality of {} is {}; supplied value has {}",
            self.message(),
            required.describe(),
            supplied
        )
    }

    pub fn static_error(&self, message: String) -> XPathError {
        XPathError::static_type(self.error_code.clone(), message)
    }

    pub fn dynamic_error(&self, message: String) -> XPathError {
        XPathError::dynamic(self.error_code.clone(), message)
    }
}

impl fmt::Display for RoleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

fn ordinal(position: usize) -> String {
    match position {
        0 => "first".to_string(),
        1 => "second".to_string(),
        2 => "third".to_string(),
        3 => "fourth".to_string(),
        n => format!("{}th", n + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_types::AtomicType;

    #[test]
    fn test_messages() {
        assert_eq!(
            RoleDiagnostic::function_argument("subsequence", 1).message(),
            "second argument of subsequence()"
        );
        assert_eq!(
            RoleDiagnostic::operand("=", 0).message(),
            "first operand of '='"
        );
        assert_eq!(RoleDiagnostic::variable("x").to_string(), "variable $x");
    }

    #[test]
    fn test_mismatch_text() {
        let role = RoleDiagnostic::function_argument("floor", 0);
        assert_eq!(
            role.item_type_mismatch(&ItemType::numeric(), "xs:string"),
            "Required item type of first argument of floor() is xs:numeric; supplied value has item type xs:string"
        );
        let err = role
            .with_error_code("XPTY0004")
            .static_error(String::from("boom"));
        assert!(err.is_type_error());
        assert_eq!(ItemType::atomic(AtomicType::String).to_string(), "xs:string");
    }
}

//! Typed edges of the expression graph.
//!
//! An operand owns exactly one child and records how the parent uses it,
//! so that generic algorithms (dependency computation, loop detection,
//! promotion) can work without knowing the parent's kind.

use crate::arena::ExprId;
use bitflags::bitflags;

/// Which dynamic focus the child is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRole {
    /// The parent's own focus.
    Same,
    /// A focus established by the parent, e.g. the items of a filter's base.
    New,
    /// No focus at all.
    None,
}

bitflags! {
    /// How the parent consumes the child's value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OperandUsage: u8 {
        /// The child selects the items the parent navigates from.
        const NAVIGATION = 1 << 0;
        /// Only the existence or boolean value of the child matters.
        const INSPECTION = 1 << 1;
        /// The child's items are atomized or otherwise consumed.
        const ABSORPTION = 1 << 2;
        /// The child's items become part of the parent's result.
        const TRANSMISSION = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandRole {
    pub focus: FocusRole,
    pub usage: OperandUsage,
    /// Evaluated more than once per evaluation of the parent.
    pub repeated: bool,
}

impl OperandRole {
    pub const SAME_FOCUS_ACTION: OperandRole = OperandRole {
        focus: FocusRole::Same,
        usage: OperandUsage::TRANSMISSION,
        repeated: false,
    };

    pub const FOCUS_CONTROLLING_SELECT: OperandRole = OperandRole {
        focus: FocusRole::Same,
        usage: OperandUsage::NAVIGATION,
        repeated: false,
    };

    pub const FOCUS_CONTROLLED_ACTION: OperandRole = OperandRole {
        focus: FocusRole::New,
        usage: OperandUsage::TRANSMISSION,
        repeated: true,
    };

    pub const PREDICATE: OperandRole = OperandRole {
        focus: FocusRole::New,
        usage: OperandUsage::INSPECTION,
        repeated: true,
    };

    pub const REPEATED_ACTION: OperandRole = OperandRole {
        focus: FocusRole::Same,
        usage: OperandUsage::TRANSMISSION,
        repeated: true,
    };

    pub const INSPECT: OperandRole = OperandRole {
        focus: FocusRole::Same,
        usage: OperandUsage::INSPECTION,
        repeated: false,
    };

    pub const ABSORB: OperandRole = OperandRole {
        focus: FocusRole::Same,
        usage: OperandUsage::ABSORPTION,
        repeated: false,
    };

    /// Focus-dependencies of a child under this role do not propagate to
    /// the parent.
    pub fn masks_focus(&self) -> bool {
        self.focus != FocusRole::Same
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub child: ExprId,
    pub role: OperandRole,
}

impl Operand {
    pub fn new(child: ExprId, role: OperandRole) -> Self {
        Operand { child, role }
    }
}

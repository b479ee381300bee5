//! Static analysis and rewriting core of the quire XPath compiler.
//!
//! Expressions live in an [`ExprArena`] as nodes addressed by [`ExprId`],
//! each with its ordered operands and a parent link. Compilation runs
//! three passes over a tree:
//!
//! - **simplify**: context-free local rewrites
//! - **type check**: static types are inferred bottom-up; guards and
//!   converters are inserted where a supplied type only overlaps the
//!   required one, and disjoint types are reported as static errors
//! - **optimize**: constant folding, positional filter rewrites,
//!   promotion of loop-invariant code
//!
//! The resulting tree can be evaluated lazily with a [`DynamicContext`]
//! or rendered with [`explain`].
//!
//! # Example
//!
//! ```ignore
//! let mut arena = ExprArena::new();
//! let seq = arena.strings(&["a", "b", "c"]);
//! let one = arena.int(1);
//! let filter = arena.filter(seq, one);
//! let root = compile_passes(&mut arena, filter, &StaticContext::default())?;
//! let value = DynamicContext::new(&arena).evaluate(root)?;
//! ```

pub mod arena;
pub mod builder;
pub mod config;
pub mod context;
pub mod conversion;
pub mod error;
pub mod eval;
pub mod explain;
pub mod functions;
pub mod kind;
pub mod kinds;
pub mod operand;
pub mod promotion;
pub mod properties;
pub mod role;
pub mod type_checker;
pub mod visitor;

pub use arena::{ExprArena, ExprId, VariableId};
pub use config::{CompilerConfig, XPathVersion};
pub use context::{CollectWarnings, LogWarnings, StaticContext, WarningSink};
pub use conversion::apply_function_conversion_rules;
pub use error::{Location, XPathError, XResult};
pub use eval::{DynamicContext, SequenceIter, effective_boolean_value};
pub use explain::explain;
pub use functions::{FunctionLibrary, SystemFunction};
pub use kind::{ComparisonShape, EvaluationMode, ExprKind, FilterFlags};
pub use properties::{Dependencies, StaticProperties};
pub use role::RoleDiagnostic;
pub use type_checker::{static_type_check, strict_type_check};
pub use visitor::{ContextItemStaticInfo, ExpressionVisitor, compile_passes};

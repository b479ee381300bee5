//! quire: the static analysis and rewriting core of an XPath compiler.
//!
//! A parser (not part of this crate) builds an [`ExprArena`] holding the
//! raw expression tree. [`Compiler::compile`] runs the simplify, type-check
//! and optimize passes over it and returns a [`CompiledExpression`] that
//! evaluates lazily against supplied variable values.
//!
//! # Crates
//!
//! - [`quire_types`]: static type descriptors and their relationships
//! - [`quire_xdm`]: the runtime values expressions evaluate to
//! - [`quire_expr`]: expression graph, passes, evaluator
//!
//! # Example
//!
//! ```ignore
//! use quire::{Compiler, CompilerConfig, ExprArena};
//!
//! let config = CompilerConfig::default().with_variable("seq", "xs:integer*");
//! let compiler = Compiler::new(config)?;
//!
//! let mut arena = ExprArena::new();
//! let seq = arena.global_ref("seq", "xs:integer*".parse()?);
//! let three = arena.int(3);
//! let filter = arena.filter(seq, three);
//!
//! let compiled = compiler.compile(arena, filter)?;
//! let value = compiled.evaluate(None, vec![("seq".into(), items)])?;
//! ```

pub mod compiler;

pub use compiler::{CompiledExpression, Compiler};

pub use quire_expr::{
    CollectWarnings, CompilerConfig, DynamicContext, ExprArena, ExprId, ExprKind, LogWarnings,
    RoleDiagnostic, StaticContext, SystemFunction, WarningSink, XPathError, XPathVersion,
    XResult, explain,
};
pub use quire_types::{AtomicType, Cardinality, ItemType, Relation, SequenceType};
pub use quire_xdm::{AtomicValue, Item, Sequence};

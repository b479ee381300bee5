//! The runtime value contract the compiler core evaluates against: atomic
//! values, a minimal node view, function items, and the conversion,
//! comparison and arithmetic rules over atomic values.

pub mod arith;
pub mod atomic;
pub mod cast;
pub mod compare;
pub mod error;
pub mod function;
pub mod item;
pub mod node;

pub use arith::ArithmeticOperator;
pub use atomic::AtomicValue;
pub use cast::{Castability, Converter, cast_atomic, cast_possibility};
pub use compare::{Collation, ComparisonOperator, compare_atomic, value_compare};
pub use error::ValueError;
pub use function::FunctionItem;
pub use item::{Item, Sequence};
pub use node::XdmNode;

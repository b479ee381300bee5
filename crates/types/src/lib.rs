//! Static type descriptors: atomic types, item types, cardinalities and
//! sequence types, together with the relationship algebra the type checker
//! is built on.

pub mod atomic;
pub mod cardinality;
pub mod error;
pub mod item;
pub mod parse;
pub mod relation;
pub mod sequence;

pub use atomic::AtomicType;
pub use cardinality::Cardinality;
pub use error::TypeParseError;
pub use item::{FunctionType, ItemType, NodeKind, NodeKinds, NodeTest};
pub use parse::parse_sequence_type;
pub use relation::Relation;
pub use sequence::SequenceType;

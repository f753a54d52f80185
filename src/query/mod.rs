//! Query composition
//!
//! Predicates, sort descriptors and the immutable [`QuerySpec`] builder.
//! Nothing here talks to a store; see [`crate::executor`] for compilation
//! and execution.

mod errors;
mod predicate;
mod sort;
mod spec;

pub use errors::{QueryError, QueryResult};
pub use predicate::{Attribute, Comparison, ComparisonOp, Predicate};
pub use sort::{ComparisonMode, SortDescriptor};
pub use spec::QuerySpec;

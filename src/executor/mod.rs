//! Query execution
//!
//! [`QueryExecutor`] compiles specs into native fetch requests and runs them
//! against a store context, synchronously, through a completion queue, or
//! as a future. [`PredicateFilter`] and [`ResultSorter`] evaluate compiled
//! requests in memory for stores that have no query engine of their own.

mod executor;
mod filters;
mod sorter;

pub use executor::QueryExecutor;
pub use filters::PredicateFilter;
pub use sorter::ResultSorter;

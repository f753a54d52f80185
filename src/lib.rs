//! livefetch - composable queries and live result sets over an object store
//!
//! Query specs are immutable values compiled into fetch requests against a
//! [`store::StoreContext`]. A [`controller::LiveResultController`] keeps a
//! sectioned result set in step with its context and reports changes as
//! bracketed batches through a [`notify::ChangeDelegate`].

pub mod config;
pub mod controller;
pub mod executor;
pub mod notify;
pub mod observability;
pub mod query;
pub mod store;
pub mod table;

pub use controller::{FetchedResultSet, LiveResultController};
pub use query::{Predicate, QueryError, QueryResult, QuerySpec, SortDescriptor};
pub use table::Table;

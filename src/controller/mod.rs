//! Live results
//!
//! [`LiveResultController`] keeps a sectioned [`FetchedResultSet`] in step
//! with its store and reports every change through its
//! [`ChangeDelegate`](crate::notify::ChangeDelegate).

mod controller;
mod results;

pub use controller::{ControllerOptions, FetchOutcome, LiveResultController};
pub use results::FetchedResultSet;

//! Configuration
//!
//! Query construction defaults and store location resolution.

mod location;
mod options;

pub use location::StoreLocation;
pub use options::QueryOptions;

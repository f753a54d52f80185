//! # Query Errors
//!
//! Error taxonomy for composing, compiling and executing queries.
//!
//! Error codes:
//! - LIVEFETCH_UNSUPPORTED_PREDICATE
//! - LIVEFETCH_UNEXPECTED_SHAPE
//! - LIVEFETCH_FETCH_EXECUTION
//! - LIVEFETCH_INVALID_LOCATION
//! - LIVEFETCH_BATCH_IN_PROGRESS
//! - LIVEFETCH_INVALID_CONFIG

use thiserror::Error;

use crate::store::StoreError;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Predicate shape is not usable for the requested operation
    #[error("Unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    /// A fetched row did not have the shape the caller asked for
    #[error("Unexpected shape: {0}")]
    UnexpectedShape(String),

    /// The store failed to run a compiled fetch
    #[error("Fetch execution failed: {0}")]
    FetchExecution(#[from] StoreError),

    /// Model or store location could not be resolved
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// A change batch is being delivered; refresh from a callback is refused
    #[error("A change batch is already being delivered")]
    BatchInProgress,

    /// Options could not be parsed or installed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QueryError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::UnsupportedPredicate(_) => "LIVEFETCH_UNSUPPORTED_PREDICATE",
            QueryError::UnexpectedShape(_) => "LIVEFETCH_UNEXPECTED_SHAPE",
            QueryError::FetchExecution(_) => "LIVEFETCH_FETCH_EXECUTION",
            QueryError::InvalidLocation(_) => "LIVEFETCH_INVALID_LOCATION",
            QueryError::BatchInProgress => "LIVEFETCH_BATCH_IN_PROGRESS",
            QueryError::InvalidConfig(_) => "LIVEFETCH_INVALID_CONFIG",
        }
    }

    /// Returns the underlying store error for execution failures
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            QueryError::FetchExecution(err) => Some(err),
            _ => None,
        }
    }
}

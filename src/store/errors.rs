//! # Store Errors
//!
//! Failures raised by a backing store while compiling against its model,
//! running a fetch, or mutating an execution context.

use thiserror::Error;

use super::object::ObjectId;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Backing store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Entity name is not part of the store's model
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Object identity does not resolve to a live object in this context
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Request is structurally valid but the store cannot run it
    #[error("Invalid fetch request: {0}")]
    InvalidRequest(String),

    /// A fault point armed for testing fired
    #[error("Injected fault at {0}")]
    InjectedFault(&'static str),

    /// The execution context (or its queue) has shut down
    #[error("Context closed: {0}")]
    ContextClosed(String),
}

impl StoreError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::UnknownEntity(_) => "LIVEFETCH_STORE_UNKNOWN_ENTITY",
            StoreError::ObjectNotFound(_) => "LIVEFETCH_STORE_OBJECT_NOT_FOUND",
            StoreError::InvalidRequest(_) => "LIVEFETCH_STORE_INVALID_REQUEST",
            StoreError::InjectedFault(_) => "LIVEFETCH_STORE_INJECTED_FAULT",
            StoreError::ContextClosed(_) => "LIVEFETCH_STORE_CONTEXT_CLOSED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::UnknownEntity("Person".into()).code(),
            "LIVEFETCH_STORE_UNKNOWN_ENTITY"
        );
        assert_eq!(
            StoreError::InjectedFault("fetch").code(),
            "LIVEFETCH_STORE_INJECTED_FAULT"
        );
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::InvalidRequest("negative offset".into());
        assert_eq!(err.to_string(), "Invalid fetch request: negative offset");
    }
}

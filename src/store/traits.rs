//! Backing store capability traits.
//!
//! The query and live-result layers are generic over these traits and never
//! name a concrete store. [`MemoryStore`](super::MemoryStore) is the
//! in-crate implementation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::errors::StoreResult;
use super::object::{ManagedObject, ObjectChanges, ObjectId, Row};
use super::queue::CompletionQueue;
use super::request::{FetchOutput, FetchRequest, ResultType};

/// Handle returned by [`StoreContext::observe`]
pub type ObservationToken = u64;

/// Background work scheduled with [`StoreContext::perform_in_background`]
pub type BackgroundTask<C> = Box<dyn FnOnce(&C) + Send + 'static>;

/// Typed view over a [`ManagedObject`].
///
/// Implementations are thin wrappers; the object snapshot is the source of
/// truth for attribute values.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Entity name in the store's model
    const ENTITY_NAME: &'static str;

    fn from_object(object: ManagedObject) -> Self;

    fn object(&self) -> &ManagedObject;

    fn object_id(&self) -> &ObjectId {
        self.object().id()
    }
}

/// Receives the object changes a context announces
pub trait ContextObserver: Send + Sync {
    fn objects_did_change(&self, changes: &ObjectChanges);
}

/// An execution context of a backing store.
///
/// Contexts are cheap-clone handles with single-writer affinity: mutations
/// are only issued from work running on [`StoreContext::queue`]. Changes
/// from another context arrive through `save` on that context followed by a
/// merge on this context's queue.
pub trait StoreContext: Clone + Send + Sync + 'static {
    /// Human-readable context name for logs
    fn name(&self) -> &str;

    /// Runs a compiled fetch
    fn execute(&self, request: &FetchRequest) -> StoreResult<FetchOutput>;

    /// Counts matching objects without materializing them where possible
    fn count(&self, request: &FetchRequest) -> StoreResult<usize> {
        Ok(self
            .execute(&request.with_result_type(ResultType::Objects))?
            .len())
    }

    /// Inserts a new, unsaved object
    fn insert(&self, entity_name: &str) -> StoreResult<ManagedObject>;

    /// Resolves an identity to the object as this context sees it
    fn existing_object(&self, id: &ObjectId) -> StoreResult<ManagedObject>;

    fn set_value(&self, id: &ObjectId, attribute: &str, value: Value) -> StoreResult<()>;

    /// Deletes an object. Deleting an already-deleted identity is a no-op.
    fn delete(&self, id: &ObjectId) -> StoreResult<()>;

    /// Re-reads an object from the store, keeping or discarding local edits
    fn refresh(&self, id: &ObjectId, merge_changes: bool) -> StoreResult<ManagedObject>;

    /// Sets `values` on every object matching `request`; returns the number touched
    fn batch_update(&self, request: &FetchRequest, values: &Row) -> StoreResult<usize> {
        let ids = match self.execute(&request.with_result_type(ResultType::ObjectIds))? {
            FetchOutput::Ids(ids) => ids,
            other => {
                return Err(super::StoreError::InvalidRequest(format!(
                    "identity fetch returned {}",
                    other.kind()
                )))
            }
        };
        for id in &ids {
            for (attribute, value) in values {
                self.set_value(id, attribute, value.clone())?;
            }
        }
        Ok(ids.len())
    }

    /// True if the context holds unsaved changes
    fn has_changes(&self) -> bool;

    /// Commits unsaved changes and hands them to sibling contexts
    fn save(&self) -> StoreResult<()>;

    /// Announces accumulated changes to this context's observers
    fn process_pending_changes(&self);

    fn observe(&self, observer: Arc<dyn ContextObserver>) -> ObservationToken;

    /// Removes an observation. Unknown tokens are ignored.
    fn detach(&self, token: ObservationToken);

    /// Declares a named result cache
    fn register_cache(&self, name: &str);

    /// Drops a named result cache so the next fetch recomputes it
    fn invalidate_cache(&self, name: &str);

    /// Runs `task` with a fresh background context on the store's worker
    fn perform_in_background(&self, task: BackgroundTask<Self>) -> StoreResult<()>;

    /// Queue this context's work runs on
    fn queue(&self) -> Arc<dyn CompletionQueue>;
}

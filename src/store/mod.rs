//! Backing store collaborator
//!
//! Capability traits the query and live-result layers are generic over,
//! the native fetch request form, object identity, execution queues and an
//! in-memory reference store.
//!
//! # Context affinity
//!
//! Every context has one serial queue. A context is only mutated by work on
//! that queue; changes cross contexts by saving on one and merging the
//! resulting [`SaveNotification`] on the other's queue.

mod errors;
pub mod fault;
mod memory;
mod object;
mod queue;
mod request;
mod traits;

pub use errors::{StoreError, StoreResult};
pub use fault::FaultPlan;
pub use memory::{MemoryContext, MemoryStore, SaveNotification};
pub use object::{ManagedObject, ObjectChanges, ObjectId, Row};
pub use queue::{BackgroundQueue, CompletionQueue, Job, MainQueue};
pub use request::{FetchOutput, FetchRequest, ResultType};
pub use traits::{BackgroundTask, ContextObserver, Entity, ObservationToken, StoreContext};

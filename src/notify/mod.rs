//! Change notification
//!
//! Events a live result controller emits when its results change, the
//! delegate that routes them to consumers, and the diff that produces them.

mod collector;
mod delegate;
mod diff;
mod event;
mod observers;

pub use collector::{ListOp, ListUpdate, ListUpdateCollector};
pub use delegate::{ChangeDelegate, EventKind, SubscriptionHandle};
pub use diff::ChangeTracker;
pub use event::{ChangeBatch, ChangeKind, IndexPath, ObjectChange, SectionChange, SectionInfo};
pub use observers::{ListenerId, ObserverList};

//! Change notification delegate
//!
//! Optional per-event handler slots for a live result controller. Every
//! delivered batch is bracketed:
//!
//! ```text
//! will_change
//!   section events (deletes, inserts, updates)
//!   object events  (deletes, inserts, moves, updates)
//! did_change
//! ```
//!
//! A full reload replaces the granular events with `needs_reload` fired
//! ahead of `will_change`. Batches are never interleaved: delivering while
//! another batch is open fails with `BatchInProgress`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::event::{ChangeBatch, IndexPath, ObjectChange, SectionChange, SectionInfo};
use super::observers::{ListenerId, ObserverList};
use crate::query::{QueryError, QueryResult};

type BracketHandler = dyn Fn() + Send + Sync;
type SectionHandler = dyn Fn(&SectionInfo, usize) + Send + Sync;
type ObjectHandler<E> = dyn Fn(&E, IndexPath) + Send + Sync;
type MoveHandler<E> = dyn Fn(&E, IndexPath, IndexPath) + Send + Sync;
type TitleMapper = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Delegate event a handler is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WillChange,
    DidChange,
    SectionInserted,
    SectionDeleted,
    SectionUpdated,
    ObjectInserted,
    ObjectDeleted,
    ObjectUpdated,
    ObjectMoved,
    NeedsReload,
}

/// Handle to a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    kind: EventKind,
    id: ListenerId,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Handler slots for one controller
pub struct ChangeDelegate<E> {
    will_change: ObserverList<BracketHandler>,
    did_change: ObserverList<BracketHandler>,
    needs_reload: ObserverList<BracketHandler>,
    section_inserted: ObserverList<SectionHandler>,
    section_deleted: ObserverList<SectionHandler>,
    section_updated: ObserverList<SectionHandler>,
    object_inserted: ObserverList<ObjectHandler<E>>,
    object_deleted: ObserverList<ObjectHandler<E>>,
    object_updated: ObserverList<ObjectHandler<E>>,
    object_moved: ObserverList<MoveHandler<E>>,
    title_mapper: RwLock<Option<Arc<TitleMapper>>>,
    delivering: AtomicBool,
}

/// Clears the delivery flag when a batch closes, including on unwind
struct DeliveryGuard<'a>(&'a AtomicBool);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<E> ChangeDelegate<E> {
    pub fn new() -> Self {
        Self {
            will_change: ObserverList::new(),
            did_change: ObserverList::new(),
            needs_reload: ObserverList::new(),
            section_inserted: ObserverList::new(),
            section_deleted: ObserverList::new(),
            section_updated: ObserverList::new(),
            object_inserted: ObserverList::new(),
            object_deleted: ObserverList::new(),
            object_updated: ObserverList::new(),
            object_moved: ObserverList::new(),
            title_mapper: RwLock::new(None),
            delivering: AtomicBool::new(false),
        }
    }

    fn handle(kind: EventKind, id: ListenerId) -> SubscriptionHandle {
        SubscriptionHandle { kind, id }
    }

    pub fn on_will_change(&self, f: impl Fn() + Send + Sync + 'static) -> SubscriptionHandle {
        Self::handle(EventKind::WillChange, self.will_change.register(Arc::new(f)))
    }

    pub fn on_did_change(&self, f: impl Fn() + Send + Sync + 'static) -> SubscriptionHandle {
        Self::handle(EventKind::DidChange, self.did_change.register(Arc::new(f)))
    }

    /// Fires when the next batch is a full reload; granular events are skipped
    pub(crate) fn on_needs_reload(&self, f: impl Fn() + Send + Sync + 'static) -> SubscriptionHandle {
        Self::handle(EventKind::NeedsReload, self.needs_reload.register(Arc::new(f)))
    }

    pub fn on_section_inserted(
        &self,
        f: impl Fn(&SectionInfo, usize) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        Self::handle(EventKind::SectionInserted, self.section_inserted.register(Arc::new(f)))
    }

    pub fn on_section_deleted(
        &self,
        f: impl Fn(&SectionInfo, usize) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        Self::handle(EventKind::SectionDeleted, self.section_deleted.register(Arc::new(f)))
    }

    pub fn on_section_updated(
        &self,
        f: impl Fn(&SectionInfo, usize) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        Self::handle(EventKind::SectionUpdated, self.section_updated.register(Arc::new(f)))
    }

    /// `f` receives the inserted object and its position after the batch
    pub fn on_object_inserted(
        &self,
        f: impl Fn(&E, IndexPath) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        Self::handle(EventKind::ObjectInserted, self.object_inserted.register(Arc::new(f)))
    }

    /// `f` receives the deleted object and its position before the batch
    pub fn on_object_deleted(
        &self,
        f: impl Fn(&E, IndexPath) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        Self::handle(EventKind::ObjectDeleted, self.object_deleted.register(Arc::new(f)))
    }

    /// `f` receives the updated object and its position before the batch
    pub fn on_object_updated(
        &self,
        f: impl Fn(&E, IndexPath) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        Self::handle(EventKind::ObjectUpdated, self.object_updated.register(Arc::new(f)))
    }

    pub fn on_object_moved(
        &self,
        f: impl Fn(&E, IndexPath, IndexPath) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        Self::handle(EventKind::ObjectMoved, self.object_moved.register(Arc::new(f)))
    }

    /// Removes a handler. Returns false if it was already removed.
    pub fn unregister(&self, handle: SubscriptionHandle) -> bool {
        match handle.kind {
            EventKind::WillChange => self.will_change.unregister(handle.id),
            EventKind::DidChange => self.did_change.unregister(handle.id),
            EventKind::NeedsReload => self.needs_reload.unregister(handle.id),
            EventKind::SectionInserted => self.section_inserted.unregister(handle.id),
            EventKind::SectionDeleted => self.section_deleted.unregister(handle.id),
            EventKind::SectionUpdated => self.section_updated.unregister(handle.id),
            EventKind::ObjectInserted => self.object_inserted.unregister(handle.id),
            EventKind::ObjectDeleted => self.object_deleted.unregister(handle.id),
            EventKind::ObjectUpdated => self.object_updated.unregister(handle.id),
            EventKind::ObjectMoved => self.object_moved.unregister(handle.id),
        }
    }

    /// Replaces the section-name to index-title mapping.
    ///
    /// Takes effect for result sets built after the call.
    pub fn set_section_index_title_mapper(
        &self,
        f: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) {
        *self.title_mapper.write() = Some(Arc::new(f));
    }

    pub fn clear_section_index_title_mapper(&self) {
        *self.title_mapper.write() = None;
    }

    /// Index title for a section name: the mapper's answer, or the
    /// upper-cased first character of the name
    pub fn section_index_title(&self, section_name: &str) -> Option<String> {
        let mapper = self.title_mapper.read().clone();
        match mapper {
            Some(mapper) => mapper(section_name),
            None => default_index_title(section_name),
        }
    }

    /// True while a batch is open
    pub fn is_delivering(&self) -> bool {
        self.delivering.load(Ordering::Acquire)
    }

    fn begin(&self) -> QueryResult<DeliveryGuard<'_>> {
        if self.delivering.swap(true, Ordering::AcqRel) {
            return Err(QueryError::BatchInProgress);
        }
        Ok(DeliveryGuard(&self.delivering))
    }

    fn emit_bracket(list: &ObserverList<BracketHandler>) {
        for handler in list.snapshot() {
            handler();
        }
    }

    /// Delivers one granular batch
    pub fn deliver(&self, batch: &ChangeBatch<E>) -> QueryResult<()> {
        let _guard = self.begin()?;

        Self::emit_bracket(&self.will_change);

        for change in &batch.sections {
            let list = match change {
                SectionChange::Inserted { .. } => &self.section_inserted,
                SectionChange::Deleted { .. } => &self.section_deleted,
                SectionChange::Updated { .. } => &self.section_updated,
            };
            for handler in list.snapshot() {
                handler(change.info(), change.index());
            }
        }

        for change in &batch.objects {
            match change {
                ObjectChange::Insert { object, new_index } => {
                    for handler in self.object_inserted.snapshot() {
                        handler(object, *new_index);
                    }
                }
                ObjectChange::Delete { object, old_index } => {
                    for handler in self.object_deleted.snapshot() {
                        handler(object, *old_index);
                    }
                }
                ObjectChange::Update { object, index } => {
                    for handler in self.object_updated.snapshot() {
                        handler(object, *index);
                    }
                }
                ObjectChange::Move {
                    object,
                    old_index,
                    new_index,
                } => {
                    for handler in self.object_moved.snapshot() {
                        handler(object, *old_index, *new_index);
                    }
                }
            }
        }

        Self::emit_bracket(&self.did_change);
        Ok(())
    }

    /// Delivers a full reload: `needs_reload`, `will_change`, then `reload`
    /// runs, then `did_change`. The bracket closes whatever `reload` returns.
    pub fn deliver_reload<R>(&self, reload: impl FnOnce() -> R) -> QueryResult<R> {
        let _guard = self.begin()?;

        Self::emit_bracket(&self.needs_reload);
        Self::emit_bracket(&self.will_change);
        let outcome = reload();
        Self::emit_bracket(&self.did_change);
        Ok(outcome)
    }
}

impl<E> Default for ChangeDelegate<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn default_index_title(section_name: &str) -> Option<String> {
    section_name
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
}

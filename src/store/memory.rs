//! # Memory Store
//!
//! In-memory backing store with execution contexts.
//!
//! Every context sees the committed state overlaid with its own unsaved
//! inserts, edits and deletes. Saving commits the overlay, announces the
//! changes to the saving context's observers and then hands a
//! [`SaveNotification`] to every sibling context on that sibling's own
//! queue, where it is merged (property-level, store wins) and announced.
//!
//! Changes recorded on a context are announced automatically on its queue,
//! or immediately through `process_pending_changes`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::fault::{points, FaultPlan};
use super::object::{ManagedObject, ObjectChanges, ObjectId, Row};
use super::queue::{BackgroundQueue, CompletionQueue, MainQueue};
use super::request::{FetchOutput, FetchRequest, ResultType};
use super::traits::{BackgroundTask, ContextObserver, ObservationToken, StoreContext};
use crate::executor::{PredicateFilter, ResultSorter};

/// Committed changes handed from a saving context to its siblings
#[derive(Debug, Clone, PartialEq)]
pub struct SaveNotification {
    /// Name of the context that saved
    pub source: String,
    pub changes: ObjectChanges,
    /// Attribute values written by the save, per inserted or updated object
    pub changed_values: BTreeMap<ObjectId, Row>,
}

struct StoreShared {
    id: Uuid,
    model: BTreeSet<String>,
    next_key: AtomicU64,
    next_context: AtomicU64,
    committed: RwLock<BTreeMap<ObjectId, Row>>,
    contexts: Mutex<Vec<Weak<ContextShared>>>,
    caches: Mutex<BTreeMap<String, u64>>,
    faults: FaultPlan,
    main_queue: Arc<MainQueue>,
    background: Arc<BackgroundQueue>,
}

/// In-memory store with one view context and on-demand background contexts
pub struct MemoryStore {
    shared: Arc<StoreShared>,
    view: MemoryContext,
}

impl MemoryStore {
    /// Creates a store whose model declares `entities`
    pub fn new<I, S>(entities: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shared = Arc::new(StoreShared {
            id: Uuid::new_v4(),
            model: entities.into_iter().map(Into::into).collect(),
            next_key: AtomicU64::new(1),
            next_context: AtomicU64::new(1),
            committed: RwLock::new(BTreeMap::new()),
            contexts: Mutex::new(Vec::new()),
            caches: Mutex::new(BTreeMap::new()),
            faults: FaultPlan::new(),
            main_queue: Arc::new(MainQueue::new("main")),
            background: Arc::new(BackgroundQueue::spawn("livefetch-background")?),
        });

        let main_queue: Arc<dyn CompletionQueue> = shared.main_queue.clone();
        let view = MemoryContext::attach(&shared, "view".to_string(), main_queue);

        debug!(store = %shared.id, entities = shared.model.len(), "opened memory store");
        Ok(Self { shared, view })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Context bound to the main queue
    pub fn view_context(&self) -> MemoryContext {
        self.view.clone()
    }

    /// New context bound to the background worker
    pub fn new_background_context(&self) -> MemoryContext {
        MemoryContext::background(&self.shared)
    }

    /// Runs `task` with a fresh background context on the worker
    pub fn perform_background_task(
        &self,
        task: impl FnOnce(&MemoryContext) + Send + 'static,
    ) -> StoreResult<()> {
        self.view.perform_in_background(Box::new(task))
    }

    pub fn main_queue(&self) -> &Arc<MainQueue> {
        &self.shared.main_queue
    }

    pub fn background_queue(&self) -> &Arc<BackgroundQueue> {
        &self.shared.background
    }

    /// Blocks until queued background work has run
    pub fn wait_for_background(&self) -> StoreResult<()> {
        self.shared.background.wait_until_idle()
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.shared.faults
    }

    /// Number of times the named cache was invalidated
    pub fn cache_invalidations(&self, name: &str) -> u64 {
        self.shared.caches.lock().get(name).copied().unwrap_or(0)
    }

    pub fn registered_caches(&self) -> Vec<String> {
        self.shared.caches.lock().keys().cloned().collect()
    }

    /// Number of committed objects of `entity_name`
    pub fn committed_count(&self, entity_name: &str) -> usize {
        self.shared
            .committed
            .read()
            .keys()
            .filter(|id| id.entity_name() == entity_name)
            .count()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("id", &self.shared.id)
            .field("model", &self.shared.model)
            .finish()
    }
}

#[derive(Default)]
struct ContextState {
    inserted: BTreeMap<ObjectId, Row>,
    /// Locally edited attribute values of committed objects
    edited: BTreeMap<ObjectId, Row>,
    deleted: BTreeSet<ObjectId>,
    unsaved: ObjectChanges,
    unannounced: ObjectChanges,
    announce_scheduled: bool,
}

struct ContextShared {
    name: String,
    store: Arc<StoreShared>,
    queue: Arc<dyn CompletionQueue>,
    state: Mutex<ContextState>,
    observers: Mutex<Vec<(ObservationToken, Arc<dyn ContextObserver>)>>,
    next_token: AtomicU64,
}

/// Execution context of a [`MemoryStore`]
#[derive(Clone)]
pub struct MemoryContext {
    inner: Arc<ContextShared>,
}

impl fmt::Debug for MemoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryContext")
            .field("name", &self.inner.name)
            .field("queue", &self.inner.queue.label())
            .finish()
    }
}

impl MemoryContext {
    fn attach(store: &Arc<StoreShared>, name: String, queue: Arc<dyn CompletionQueue>) -> Self {
        let inner = Arc::new(ContextShared {
            name,
            store: store.clone(),
            queue,
            state: Mutex::new(ContextState::default()),
            observers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        });

        let mut contexts = store.contexts.lock();
        contexts.retain(|c| c.strong_count() > 0);
        contexts.push(Arc::downgrade(&inner));

        Self { inner }
    }

    fn background(store: &Arc<StoreShared>) -> Self {
        let n = store.next_context.fetch_add(1, Ordering::Relaxed);
        let queue: Arc<dyn CompletionQueue> = store.background.clone();
        Self::attach(store, format!("background-{}", n), queue)
    }

    fn store(&self) -> &StoreShared {
        &self.inner.store
    }

    fn check_store(&self, id: &ObjectId) -> StoreResult<()> {
        if id.store_id() == self.store().id {
            Ok(())
        } else {
            Err(StoreError::ObjectNotFound(id.clone()))
        }
    }

    /// Records an unsaved change and schedules its announcement
    fn record(&self, state: &mut ContextState, apply: impl Fn(&mut ObjectChanges)) {
        apply(&mut state.unsaved);
        self.announce(state, apply);
    }

    /// Schedules an announcement on this context's queue without marking
    /// anything unsaved
    fn announce(&self, state: &mut ContextState, apply: impl Fn(&mut ObjectChanges)) {
        apply(&mut state.unannounced);
        if !state.announce_scheduled {
            state.announce_scheduled = true;
            let weak = Arc::downgrade(&self.inner);
            let job = Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    MemoryContext { inner }.process_pending_changes();
                }
            });
            if let Err(e) = self.inner.queue.dispatch(job) {
                warn!(context = %self.inner.name, error = %e, "cannot schedule change announcement");
            }
        }
    }

    fn view_of(state: &ContextState, committed: &BTreeMap<ObjectId, Row>, id: &ObjectId) -> Option<ManagedObject> {
        if state.deleted.contains(id) {
            return None;
        }
        if let Some(row) = state.inserted.get(id) {
            return Some(ManagedObject::with_attributes(id.clone(), row.clone()));
        }
        let mut row = committed.get(id)?.clone();
        if let Some(edits) = state.edited.get(id) {
            row.extend(edits.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(ManagedObject::with_attributes(id.clone(), row))
    }

    /// All objects of `entity_name` visible to this context, in key order
    fn snapshot(&self, entity_name: &str) -> Vec<ManagedObject> {
        let state = self.inner.state.lock();
        let committed = self.store().committed.read();

        let mut ids: BTreeSet<&ObjectId> = committed
            .keys()
            .filter(|id| id.entity_name() == entity_name)
            .collect();
        ids.extend(state.inserted.keys().filter(|id| id.entity_name() == entity_name));

        ids.into_iter()
            .filter_map(|id| Self::view_of(&state, &committed, id))
            .collect()
    }

    fn merge_save_notification(&self, notification: &SaveNotification) {
        {
            let mut state = self.inner.state.lock();
            let changes = &notification.changes;

            for id in &changes.updated {
                let Some(saved) = notification.changed_values.get(id) else {
                    continue;
                };
                // Store wins for attributes the save wrote; other local edits survive.
                let now_clean = match state.edited.get_mut(id) {
                    Some(edits) => {
                        edits.retain(|attr, _| !saved.contains_key(attr));
                        edits.is_empty()
                    }
                    None => false,
                };
                if now_clean {
                    state.edited.remove(id);
                    state.unsaved.updated.remove(id);
                }
            }
            for id in &changes.deleted {
                state.edited.remove(id);
                state.deleted.remove(id);
                state.unsaved.updated.remove(id);
                state.unsaved.deleted.remove(id);
            }

            self.announce(&mut state, |pending| {
                for id in &changes.inserted {
                    pending.record_insert(id.clone());
                }
                for id in &changes.updated {
                    pending.record_update(id.clone());
                }
                for id in &changes.deleted {
                    pending.record_delete(id.clone());
                }
            });
        }

        debug!(
            context = %self.inner.name,
            source = %notification.source,
            changes = notification.changes.len(),
            "merged save notification"
        );
        self.process_pending_changes();
    }

    fn siblings(&self) -> Vec<Arc<ContextShared>> {
        self.store()
            .contexts
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| !Arc::ptr_eq(c, &self.inner))
            .collect()
    }
}

fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let limit = if limit == 0 { usize::MAX } else { limit };
    items.into_iter().skip(offset).take(limit).collect()
}

fn project(objects: Vec<ManagedObject>, properties: &[String], distinct: bool) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::with_capacity(objects.len());
    for object in objects {
        let row: Row = if properties.is_empty() {
            object.attributes().clone()
        } else {
            properties
                .iter()
                .filter_map(|p| object.get(p).map(|v| (p.clone(), v.clone())))
                .collect()
        };
        if distinct && rows.contains(&row) {
            continue;
        }
        rows.push(row);
    }
    rows
}

impl StoreContext for MemoryContext {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn execute(&self, request: &FetchRequest) -> StoreResult<FetchOutput> {
        let store = self.store();
        let point = if request.result_type == ResultType::Count {
            points::COUNT
        } else {
            points::FETCH
        };
        store.faults.check(point)?;

        if !store.model.contains(&request.entity_name) {
            return Err(StoreError::UnknownEntity(request.entity_name.clone()));
        }
        if let Some(predicate) = &request.predicate {
            predicate
                .validate()
                .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;
        }

        let mut objects = self.snapshot(&request.entity_name);
        objects.retain(|o| PredicateFilter::matches(o, request.predicate.as_ref()));
        ResultSorter::sort(&mut objects, &request.sort_descriptors);

        let (offset, limit) = (request.fetch_offset, request.fetch_limit);
        let output = match request.result_type {
            ResultType::Objects => FetchOutput::Objects(paginate(objects, offset, limit)),
            ResultType::ObjectIds => FetchOutput::Ids(
                paginate(objects, offset, limit)
                    .into_iter()
                    .map(|o| o.id().clone())
                    .collect(),
            ),
            ResultType::Count => FetchOutput::Count(paginate(objects, offset, limit).len()),
            ResultType::Dictionaries => FetchOutput::Rows(paginate(
                project(
                    objects,
                    &request.properties_to_fetch,
                    request.returns_distinct_results,
                ),
                offset,
                limit,
            )),
        };

        debug!(
            context = %self.inner.name,
            entity = %request.entity_name,
            kind = output.kind(),
            results = output.len(),
            "executed fetch"
        );
        Ok(output)
    }

    fn count(&self, request: &FetchRequest) -> StoreResult<usize> {
        Ok(self
            .execute(&request.with_result_type(ResultType::Count))?
            .len())
    }

    fn insert(&self, entity_name: &str) -> StoreResult<ManagedObject> {
        let store = self.store();
        if !store.model.contains(entity_name) {
            return Err(StoreError::UnknownEntity(entity_name.to_string()));
        }
        let key = store.next_key.fetch_add(1, Ordering::Relaxed);
        let id = ObjectId::new(store.id, entity_name, key);

        let mut state = self.inner.state.lock();
        state.inserted.insert(id.clone(), Row::new());
        self.record(&mut state, |c| c.record_insert(id.clone()));
        Ok(ManagedObject::new(id))
    }

    fn existing_object(&self, id: &ObjectId) -> StoreResult<ManagedObject> {
        self.check_store(id)?;
        let state = self.inner.state.lock();
        let committed = self.store().committed.read();
        Self::view_of(&state, &committed, id).ok_or_else(|| StoreError::ObjectNotFound(id.clone()))
    }

    fn set_value(&self, id: &ObjectId, attribute: &str, value: Value) -> StoreResult<()> {
        self.check_store(id)?;
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.deleted.contains(id) {
            return Err(StoreError::ObjectNotFound(id.clone()));
        }
        if let Some(row) = state.inserted.get_mut(id) {
            row.insert(attribute.to_string(), value);
        } else if self.store().committed.read().contains_key(id) {
            state
                .edited
                .entry(id.clone())
                .or_default()
                .insert(attribute.to_string(), value);
        } else {
            return Err(StoreError::ObjectNotFound(id.clone()));
        }
        self.record(state, |c| c.record_update(id.clone()));
        Ok(())
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<()> {
        self.check_store(id)?;
        let mut state = self.inner.state.lock();
        let live = if state.inserted.remove(id).is_some() {
            true
        } else if !state.deleted.contains(id) && self.store().committed.read().contains_key(id) {
            state.edited.remove(id);
            state.deleted.insert(id.clone());
            true
        } else {
            false
        };
        if live {
            self.record(&mut state, |c| c.record_delete(id.clone()));
        }
        Ok(())
    }

    fn refresh(&self, id: &ObjectId, merge_changes: bool) -> StoreResult<ManagedObject> {
        self.check_store(id)?;
        {
            let mut state = self.inner.state.lock();
            if !merge_changes && state.edited.remove(id).is_some() {
                state.unsaved.updated.remove(id);
                self.announce(&mut state, |c| c.record_update(id.clone()));
            }
        }
        self.existing_object(id)
    }

    fn has_changes(&self) -> bool {
        !self.inner.state.lock().unsaved.is_empty()
    }

    fn save(&self) -> StoreResult<()> {
        let store = self.store();
        store.faults.check(points::SAVE)?;

        let notification = {
            let mut state = self.inner.state.lock();
            if state.unsaved.is_empty() {
                return Ok(());
            }
            let mut committed = store.committed.write();
            let mut changed_values = BTreeMap::new();

            for (id, row) in std::mem::take(&mut state.inserted) {
                committed.insert(id.clone(), row.clone());
                changed_values.insert(id, row);
            }
            for (id, edits) in std::mem::take(&mut state.edited) {
                if let Some(row) = committed.get_mut(&id) {
                    row.extend(edits.iter().map(|(k, v)| (k.clone(), v.clone())));
                    changed_values.insert(id, edits);
                }
            }
            for id in std::mem::take(&mut state.deleted) {
                committed.remove(&id);
            }

            SaveNotification {
                source: self.inner.name.clone(),
                changes: std::mem::take(&mut state.unsaved),
                changed_values,
            }
        };

        debug!(
            context = %self.inner.name,
            inserted = notification.changes.inserted.len(),
            updated = notification.changes.updated.len(),
            deleted = notification.changes.deleted.len(),
            "saved context"
        );
        self.process_pending_changes();

        for sibling in self.siblings() {
            let weak = Arc::downgrade(&sibling);
            let note = notification.clone();
            let job = Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    MemoryContext { inner }.merge_save_notification(&note);
                }
            });
            if let Err(e) = sibling.queue.dispatch(job) {
                warn!(context = %sibling.name, error = %e, "cannot hand off save notification");
            }
        }
        Ok(())
    }

    fn process_pending_changes(&self) {
        let changes = {
            let mut state = self.inner.state.lock();
            state.announce_scheduled = false;
            std::mem::take(&mut state.unannounced)
        };
        if changes.is_empty() {
            return;
        }

        // Snapshot observers; callbacks run without any context lock held.
        let observers: Vec<Arc<dyn ContextObserver>> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer.objects_did_change(&changes);
        }
    }

    fn observe(&self, observer: Arc<dyn ContextObserver>) -> ObservationToken {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.lock().push((token, observer));
        token
    }

    fn detach(&self, token: ObservationToken) {
        self.inner.observers.lock().retain(|(t, _)| *t != token);
    }

    fn register_cache(&self, name: &str) {
        self.store()
            .caches
            .lock()
            .entry(name.to_string())
            .or_insert(0);
    }

    fn invalidate_cache(&self, name: &str) {
        let mut caches = self.store().caches.lock();
        let count = caches.entry(name.to_string()).or_insert(0);
        *count += 1;
        debug!(cache = name, invalidations = *count, "invalidated result cache");
    }

    fn perform_in_background(&self, task: BackgroundTask<Self>) -> StoreResult<()> {
        let context = MemoryContext::background(&self.inner.store);
        self.store()
            .background
            .dispatch(Box::new(move || task(&context)))
    }

    fn queue(&self) -> Arc<dyn CompletionQueue> {
        self.inner.queue.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Predicate;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new(["Person", "Alarm"]).unwrap()
    }

    fn person(ctx: &MemoryContext, name: &str, age: i64) -> ObjectId {
        let obj = ctx.insert("Person").unwrap();
        ctx.set_value(obj.id(), "name", json!(name)).unwrap();
        ctx.set_value(obj.id(), "age", json!(age)).unwrap();
        obj.id().clone()
    }

    struct Recorder(Mutex<Vec<ObjectChanges>>);

    impl ContextObserver for Recorder {
        fn objects_did_change(&self, changes: &ObjectChanges) {
            self.0.lock().push(changes.clone());
        }
    }

    #[test]
    fn test_unknown_entity() {
        let store = store();
        let ctx = store.view_context();
        assert_eq!(
            ctx.execute(&FetchRequest::new("Ghost")),
            Err(StoreError::UnknownEntity("Ghost".into()))
        );
        assert!(ctx.insert("Ghost").is_err());
    }

    #[test]
    fn test_fetch_sees_unsaved_changes() {
        let store = store();
        let ctx = store.view_context();
        person(&ctx, "Alice", 30);

        let out = ctx.execute(&FetchRequest::new("Person")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(store.committed_count("Person"), 0);

        ctx.save().unwrap();
        assert_eq!(store.committed_count("Person"), 1);
        assert!(!ctx.has_changes());
    }

    #[test]
    fn test_filter_sort_paginate() {
        let store = store();
        let ctx = store.view_context();
        for (name, age) in [("e", 10), ("d", 18), ("c", 25), ("b", 30), ("a", 40)] {
            person(&ctx, name, age);
        }

        let request = FetchRequest {
            predicate: Some(Predicate::gte("age", 18)),
            sort_descriptors: vec![crate::query::SortDescriptor::ascending("name")],
            fetch_offset: 1,
            fetch_limit: 2,
            ..FetchRequest::new("Person")
        };
        let FetchOutput::Objects(objects) = ctx.execute(&request).unwrap() else {
            panic!("expected objects");
        };
        let names: Vec<_> = objects.iter().map(|o| o.value("name").clone()).collect();
        assert_eq!(names, vec![json!("b"), json!("c")]);

        assert_eq!(ctx.count(&request).unwrap(), 2);
    }

    #[test]
    fn test_distinct_rows() {
        let store = store();
        let ctx = store.view_context();
        person(&ctx, "a", 30);
        person(&ctx, "b", 30);

        let request = FetchRequest {
            result_type: ResultType::Dictionaries,
            properties_to_fetch: vec!["age".into()],
            returns_distinct_results: true,
            ..FetchRequest::new("Person")
        };
        let FetchOutput::Rows(rows) = ctx.execute(&request).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("age"), Some(&json!(30)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = store();
        let ctx = store.view_context();
        let id = person(&ctx, "a", 1);
        ctx.save().unwrap();

        ctx.delete(&id).unwrap();
        ctx.delete(&id).unwrap();
        assert!(ctx.existing_object(&id).is_err());

        ctx.save().unwrap();
        ctx.delete(&id).unwrap();
        assert_eq!(store.committed_count("Person"), 0);
    }

    #[test]
    fn test_refresh_discards_edits() {
        let store = store();
        let ctx = store.view_context();
        let id = person(&ctx, "a", 1);
        ctx.save().unwrap();

        ctx.set_value(&id, "name", json!("changed")).unwrap();
        let kept = ctx.refresh(&id, true).unwrap();
        assert_eq!(kept.value("name"), &json!("changed"));

        let reverted = ctx.refresh(&id, false).unwrap();
        assert_eq!(reverted.value("name"), &json!("a"));
        assert!(!ctx.has_changes());
    }

    #[test]
    fn test_observers_notified_on_process() {
        let store = store();
        let ctx = store.view_context();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let token = ctx.observe(recorder.clone());

        let id = person(&ctx, "a", 1);
        assert!(recorder.0.lock().is_empty());

        ctx.process_pending_changes();
        assert_eq!(recorder.0.lock().len(), 1);
        assert!(recorder.0.lock()[0].inserted.contains(&id));

        // Scheduled announcement finds nothing left to announce.
        store.main_queue().run_pending();
        assert_eq!(recorder.0.lock().len(), 1);

        ctx.detach(token);
        person(&ctx, "b", 2);
        ctx.process_pending_changes();
        assert_eq!(recorder.0.lock().len(), 1);
    }

    #[test]
    fn test_background_save_merges_on_view_queue() {
        let store = store();
        let view = store.view_context();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        view.observe(recorder.clone());

        store
            .perform_background_task(|bg| {
                person(bg, "from-background", 5);
                bg.save().unwrap();
            })
            .unwrap();
        store.wait_for_background().unwrap();

        // Not merged until the view context's queue runs.
        assert!(recorder.0.lock().is_empty());
        store.main_queue().run_pending();

        let seen = recorder.0.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].inserted.len(), 1);
        assert_eq!(view.execute(&FetchRequest::new("Person")).unwrap().len(), 1);
        // Merged changes are committed, not local edits
        assert!(!view.has_changes());
    }

    #[test]
    fn test_store_wins_per_property() {
        let store = store();
        let view = store.view_context();
        let id = person(&view, "a", 1);
        view.save().unwrap();

        view.set_value(&id, "name", json!("local")).unwrap();
        view.set_value(&id, "age", json!(99)).unwrap();

        let bg_id = id.clone();
        store
            .perform_background_task(move |bg| {
                bg.set_value(&bg_id, "name", json!("remote")).unwrap();
                bg.save().unwrap();
            })
            .unwrap();
        store.wait_for_background().unwrap();
        store.main_queue().run_pending();

        let merged = view.existing_object(&id).unwrap();
        assert_eq!(merged.value("name"), &json!("remote"));
        assert_eq!(merged.value("age"), &json!(99));
        assert!(view.has_changes());
    }

    #[test]
    fn test_injected_fetch_fault() {
        let store = store();
        let ctx = store.view_context();
        store.faults().arm(points::FETCH, 1);

        assert_eq!(
            ctx.execute(&FetchRequest::new("Person")),
            Err(StoreError::InjectedFault("fetch"))
        );
        assert!(ctx.execute(&FetchRequest::new("Person")).is_ok());
    }

    #[test]
    fn test_cache_invalidation_counted() {
        let store = store();
        let ctx = store.view_context();
        ctx.register_cache("people");
        ctx.invalidate_cache("people");
        ctx.invalidate_cache("people");
        assert_eq!(store.cache_invalidations("people"), 2);
        assert_eq!(store.registered_caches(), vec!["people".to_string()]);
    }
}

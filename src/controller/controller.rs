//! Live result controller
//!
//! Owns a query spec, the current [`FetchedResultSet`] and a
//! [`ChangeDelegate`]. Store notifications for the controller's entity are
//! re-fetched, diffed against the current set and delivered as one bracketed
//! batch.
//!
//! # Delivery
//!
//! One batch at a time per controller. Notifications that arrive while a
//! batch is open (including ones triggered from inside a callback) are
//! queued and merged into the next batch after `did_change`. Refresh calls
//! made while a batch is open fail with `BatchInProgress`.
//!
//! # Failure
//!
//! Fetch failures never replace the current results. `refresh*` still
//! closes its bracket over the previous result set and returns the error.
//!
//! # Teardown
//!
//! The store holds only a weak back-reference to the controller. Dropping
//! the controller detaches the observation first.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::results::FetchedResultSet;
use crate::executor::QueryExecutor;
use crate::notify::{ChangeDelegate, ChangeTracker, IndexPath, SectionInfo};
use crate::observability::MetricsRegistry;
use crate::query::{Predicate, QueryError, QueryResult, QuerySpec, SortDescriptor};
use crate::store::{
    CompletionQueue, ContextObserver, Entity, ObjectChanges, ObjectId, ObservationToken,
    StoreContext,
};

/// Controller construction options
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Attribute whose value names each entity's section
    pub section_name_key_path: Option<String>,
    /// Store-side result cache to invalidate on refresh
    pub cache_name: Option<String>,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

impl ControllerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sectioned_by(mut self, key_path: impl Into<String>) -> Self {
        self.section_name_key_path = Some(key_path.into());
        self
    }

    pub fn cached_as(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = Some(cache_name.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// How an async fetch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result replaced the controller's results
    Applied,
    /// A newer fetch was issued first; the result was dropped
    Superseded,
}

struct ControllerState<E> {
    spec: QuerySpec,
    results: Option<Arc<FetchedResultSet<E>>>,
    generation: u64,
    observation: Option<ObservationToken>,
}

struct Shared<E: Entity, C: StoreContext> {
    executor: QueryExecutor<C>,
    initial_predicate: Option<Predicate>,
    initial_sort: Vec<SortDescriptor>,
    section_name_key_path: Option<String>,
    cache_name: Option<String>,
    delegate: ChangeDelegate<E>,
    state: Mutex<ControllerState<E>>,
    pending: Mutex<VecDeque<ObjectChanges>>,
    busy: AtomicBool,
}

/// Releases the controller's delivery slot on drop
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Forwards store announcements to a controller that may already be gone
struct Forwarder<E: Entity, C: StoreContext> {
    target: Weak<Shared<E, C>>,
}

impl<E: Entity, C: StoreContext> ContextObserver for Forwarder<E, C> {
    fn objects_did_change(&self, changes: &ObjectChanges) {
        if let Some(shared) = self.target.upgrade() {
            shared.enqueue(changes);
        }
    }
}

impl<E: Entity, C: StoreContext> Shared<E, C> {
    fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.executor.metrics()
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(BusyGuard(&self.busy))
        }
    }

    fn begin(&self) -> QueryResult<BusyGuard<'_>> {
        self.try_begin().ok_or(QueryError::BatchInProgress)
    }

    fn build(&self, objects: Vec<E>) -> FetchedResultSet<E> {
        FetchedResultSet::build(objects, self.section_name_key_path.as_deref(), |name| {
            self.delegate.section_index_title(name)
        })
    }

    /// Executes `spec` and installs it with its results; leaves state alone on failure
    fn fetch_into_place(&self, spec: QuerySpec) -> QueryResult<()> {
        let objects = self.executor.execute::<E>(&spec)?;
        let results = Arc::new(self.build(objects));
        let mut state = self.state.lock();
        state.generation += 1;
        debug!(
            entity = E::ENTITY_NAME,
            generation = state.generation,
            count = results.len(),
            "results replaced"
        );
        state.spec = spec;
        state.results = Some(results);
        Ok(())
    }

    fn enqueue(&self, changes: &ObjectChanges) {
        if !changes.touches_entity(E::ENTITY_NAME) {
            return;
        }
        self.pending.lock().push_back(changes.clone());
        self.drain();
    }

    /// Processes queued notifications unless a batch is already open
    fn drain(&self) {
        loop {
            let Some(guard) = self.try_begin() else {
                return;
            };
            let merged = {
                let mut pending = self.pending.lock();
                let mut merged = ObjectChanges::new();
                for changes in pending.drain(..) {
                    merged.merge(&changes);
                }
                merged
            };
            if !merged.is_empty() {
                self.deliver_changes(&merged);
            }
            drop(guard);
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn deliver_changes(&self, changes: &ObjectChanges) {
        let (spec, current) = {
            let state = self.state.lock();
            (state.spec.clone(), state.results.clone())
        };
        // Nothing is displayed before the first fetch
        let Some(current) = current else {
            return;
        };

        let fresh = match self.executor.execute::<E>(&spec) {
            Ok(objects) => self.build(objects),
            Err(e) => {
                warn!(entity = E::ENTITY_NAME, error = %e, "live re-fetch failed; keeping results");
                return;
            }
        };

        let updated: BTreeSet<ObjectId> = changes.updated.clone();
        let batch = ChangeTracker::diff(&current, &fresh, &updated);
        if batch.is_empty() {
            return;
        }
        let patched = Arc::new(current.apply(&batch));

        {
            let mut state = self.state.lock();
            let unchanged = state
                .results
                .as_ref()
                .map_or(false, |r| Arc::ptr_eq(r, &current));
            if !unchanged {
                debug!(entity = E::ENTITY_NAME, "results replaced during re-fetch; dropping batch");
                return;
            }
            state.results = Some(patched);
        }

        debug!(
            entity = E::ENTITY_NAME,
            sections = batch.sections.len(),
            objects = batch.objects.len(),
            "delivering change batch"
        );
        match self.delegate.deliver(&batch) {
            Ok(()) => {
                if let Some(m) = self.metrics() {
                    m.increment_batches_delivered();
                }
            }
            Err(e) => warn!(entity = E::ENTITY_NAME, error = %e, "change batch not delivered"),
        }
    }

    fn reload(&self, spec: QuerySpec) -> QueryResult<()> {
        let outcome = {
            let _busy = self.begin()?;
            let delivered = self.delegate.deliver_reload(|| {
                if let Some(cache) = &self.cache_name {
                    self.executor.context().invalidate_cache(cache);
                    if let Some(m) = self.metrics() {
                        m.increment_cache_invalidations();
                    }
                }
                self.fetch_into_place(spec)
            });
            if let Some(m) = self.metrics() {
                m.increment_full_reloads();
            }
            delivered.and_then(|fetched| fetched)
        };
        self.drain();
        if let Err(e) = &outcome {
            warn!(entity = E::ENTITY_NAME, error = %e, "refresh failed; previous results kept");
        }
        outcome
    }

    fn apply_async(
        &self,
        generation: u64,
        spec: QuerySpec,
        result: QueryResult<Vec<E>>,
    ) -> QueryResult<FetchOutcome> {
        let objects = result?;
        let results = Arc::new(self.build(objects));
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(
                entity = E::ENTITY_NAME,
                generation,
                current = state.generation,
                "discarding superseded async fetch"
            );
            if let Some(m) = self.metrics() {
                m.increment_async_discarded();
            }
            return Ok(FetchOutcome::Superseded);
        }
        state.spec = spec;
        state.results = Some(results);
        if let Some(m) = self.metrics() {
            m.increment_async_applied();
        }
        Ok(FetchOutcome::Applied)
    }
}

/// Live, sectioned view over the results of a query
pub struct LiveResultController<E: Entity, C: StoreContext> {
    shared: Arc<Shared<E, C>>,
}

impl<E: Entity, C: StoreContext> LiveResultController<E, C> {
    /// Creates a controller for `spec` and starts observing `context`.
    ///
    /// Results stay empty until [`perform_fetch`](Self::perform_fetch).
    pub fn new(context: C, spec: QuerySpec, options: ControllerOptions) -> Self {
        if let Some(cache) = &options.cache_name {
            context.register_cache(cache);
        }
        let mut executor = QueryExecutor::new(context.clone());
        if let Some(metrics) = options.metrics {
            executor = executor.with_metrics(metrics);
        }

        let shared = Arc::new(Shared {
            executor,
            initial_predicate: spec.predicate().cloned(),
            initial_sort: spec.sort_descriptors().to_vec(),
            section_name_key_path: options.section_name_key_path,
            cache_name: options.cache_name,
            delegate: ChangeDelegate::new(),
            state: Mutex::new(ControllerState {
                spec,
                results: None,
                generation: 0,
                observation: None,
            }),
            pending: Mutex::new(VecDeque::new()),
            busy: AtomicBool::new(false),
        });

        let token = context.observe(Arc::new(Forwarder {
            target: Arc::downgrade(&shared),
        }));
        shared.state.lock().observation = Some(token);

        Self { shared }
    }

    pub fn delegate(&self) -> &ChangeDelegate<E> {
        &self.shared.delegate
    }

    pub fn context(&self) -> &C {
        self.shared.executor.context()
    }

    pub fn spec(&self) -> QuerySpec {
        self.shared.state.lock().spec.clone()
    }

    pub fn predicate(&self) -> Option<Predicate> {
        self.shared.state.lock().spec.predicate().cloned()
    }

    pub fn sort_descriptors(&self) -> Vec<SortDescriptor> {
        self.shared.state.lock().spec.sort_descriptors().to_vec()
    }

    pub fn initial_predicate(&self) -> Option<&Predicate> {
        self.shared.initial_predicate.as_ref()
    }

    pub fn initial_sort_descriptors(&self) -> &[SortDescriptor] {
        &self.shared.initial_sort
    }

    pub fn section_name_key_path(&self) -> Option<&str> {
        self.shared.section_name_key_path.as_deref()
    }

    pub fn cache_name(&self) -> Option<&str> {
        self.shared.cache_name.as_deref()
    }

    /// Fetch generation; bumped by every fetch that replaces the results
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    /// Runs the current spec and replaces the results wholesale.
    ///
    /// No delegate events fire. On failure the previous results remain.
    pub fn perform_fetch(&self) -> QueryResult<()> {
        let outcome = {
            let _busy = self.shared.begin()?;
            let spec = self.spec();
            self.shared.fetch_into_place(spec)
        };
        self.shared.drain();
        outcome
    }

    /// Runs the current spec on a background context.
    ///
    /// `completion` runs once on `queue`. The result is applied only if no
    /// other fetch replaced the results in the meantime; otherwise it is
    /// dropped and reported as [`FetchOutcome::Superseded`].
    pub fn perform_fetch_async<F>(&self, queue: Arc<dyn CompletionQueue>, completion: F)
    where
        F: FnOnce(QueryResult<FetchOutcome>) + Send + 'static,
    {
        let (generation, spec) = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            (state.generation, state.spec.clone())
        };
        debug!(entity = E::ENTITY_NAME, generation, "async fetch issued");

        let target = Arc::downgrade(&self.shared);
        let applied_spec = spec.clone();
        self.shared
            .executor
            .execute_async::<E, _>(&spec, queue, move |result| {
                let outcome = match target.upgrade() {
                    Some(shared) => shared.apply_async(generation, applied_spec, result),
                    None => Ok(FetchOutcome::Superseded),
                };
                completion(outcome);
            });
    }

    /// Full reload with the current spec
    pub fn refresh(&self) -> QueryResult<()> {
        self.shared.reload(self.spec())
    }

    /// Full reload with a new predicate.
    ///
    /// With `keep_original`, `predicate` is AND-ed onto the predicate the
    /// controller was created with, not the current one.
    pub fn refresh_with_predicate(
        &self,
        predicate: Option<Predicate>,
        keep_original: bool,
    ) -> QueryResult<()> {
        let spec = self
            .spec()
            .with_predicate(self.compose_predicate(predicate, keep_original));
        self.shared.reload(spec)
    }

    /// Full reload with new sort descriptors.
    ///
    /// With `keep_original`, `sort` is appended after the initial descriptors.
    pub fn refresh_with_sort(&self, sort: Vec<SortDescriptor>, keep_original: bool) -> QueryResult<()> {
        let spec = self
            .spec()
            .with_sort_descriptors(self.compose_sort(sort, keep_original));
        self.shared.reload(spec)
    }

    /// Full reload replacing predicate and sort together
    pub fn refresh_with(
        &self,
        predicate: Option<Predicate>,
        sort: Vec<SortDescriptor>,
        keep_original_predicate: bool,
        keep_original_sort: bool,
    ) -> QueryResult<()> {
        let spec = self
            .spec()
            .with_predicate(self.compose_predicate(predicate, keep_original_predicate))
            .with_sort_descriptors(self.compose_sort(sort, keep_original_sort));
        self.shared.reload(spec)
    }

    /// Narrows the initial predicate by `predicate`
    pub fn filter(&self, predicate: Predicate) -> QueryResult<()> {
        self.refresh_with_predicate(Some(predicate), true)
    }

    pub fn reset_filter(&self) -> QueryResult<()> {
        self.reset_predicate()
    }

    pub fn reset_predicate(&self) -> QueryResult<()> {
        self.refresh_with_predicate(self.shared.initial_predicate.clone(), false)
    }

    pub fn reset_sort(&self) -> QueryResult<()> {
        self.refresh_with_sort(self.shared.initial_sort.clone(), false)
    }

    /// Restores the initial predicate and sort descriptors
    pub fn reset(&self) -> QueryResult<()> {
        self.refresh_with(
            self.shared.initial_predicate.clone(),
            self.shared.initial_sort.clone(),
            false,
            false,
        )
    }

    fn compose_predicate(&self, predicate: Option<Predicate>, keep_original: bool) -> Option<Predicate> {
        if !keep_original {
            return predicate;
        }
        match (self.shared.initial_predicate.clone(), predicate) {
            (Some(initial), Some(p)) => Some(Predicate::and(initial, p)),
            (initial, None) => initial,
            (None, p) => p,
        }
    }

    fn compose_sort(&self, sort: Vec<SortDescriptor>, keep_original: bool) -> Vec<SortDescriptor> {
        if !keep_original {
            return sort;
        }
        let mut composed = self.shared.initial_sort.clone();
        composed.extend(sort);
        composed
    }

    /// Current result set, `None` before the first fetch
    pub fn results(&self) -> Option<Arc<FetchedResultSet<E>>> {
        self.shared.state.lock().results.clone()
    }

    /// Entities in section order
    pub fn entities(&self) -> Vec<E> {
        self.results()
            .map(|r| r.entities().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entity_at(&self, index: IndexPath) -> Option<E> {
        self.results()?.entity_at(index).cloned()
    }

    pub fn index_path_for(&self, entity: &E) -> Option<IndexPath> {
        self.results()?.index_path_for(entity.object_id())
    }

    pub fn sections(&self) -> Vec<SectionInfo> {
        self.results().map(|r| r.sections()).unwrap_or_default()
    }

    pub fn section_index_titles(&self) -> Vec<String> {
        self.results()
            .map(|r| r.section_index_titles().to_vec())
            .unwrap_or_default()
    }

    pub fn section_for_section_index_title(&self, title: &str, at_index: usize) -> Option<usize> {
        self.results()?
            .section_for_section_index_title(title, at_index)
    }

    pub fn section_index_title_for_section_name(&self, name: &str) -> Option<String> {
        self.results()?
            .section_index_title_for_section_name(name)
            .map(str::to_string)
    }

    /// Stops observing the store. Later store changes are ignored.
    pub fn detach(&self) {
        let token = self.shared.state.lock().observation.take();
        if let Some(token) = token {
            self.shared.executor.context().detach(token);
            debug!(entity = E::ENTITY_NAME, token, "controller detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.shared.state.lock().observation.is_some()
    }
}

impl<E: Entity, C: StoreContext> Drop for LiveResultController<E, C> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::store::{fault::points, ManagedObject, MemoryContext, MemoryStore};
    use serde_json::json;

    #[derive(Debug, Clone)]
    struct Note(ManagedObject);

    impl Entity for Note {
        const ENTITY_NAME: &'static str = "Note";

        fn from_object(object: ManagedObject) -> Self {
            Note(object)
        }

        fn object(&self) -> &ManagedObject {
            &self.0
        }
    }

    fn store_with(titles: &[&str]) -> MemoryStore {
        let store = MemoryStore::new(["Note", "Tag"]).unwrap();
        let ctx = store.view_context();
        for title in titles {
            let obj = ctx.insert("Note").unwrap();
            ctx.set_value(obj.id(), "title", json!(title)).unwrap();
        }
        ctx.save().unwrap();
        store.main_queue().run_pending();
        store
    }

    fn controller(store: &MemoryStore) -> LiveResultController<Note, MemoryContext> {
        let spec = QuerySpec::new("Note", &QueryOptions::default()).order_by("title");
        LiveResultController::new(store.view_context(), spec, ControllerOptions::new())
    }

    fn titles(c: &LiveResultController<Note, MemoryContext>) -> Vec<String> {
        c.entities()
            .iter()
            .map(|n| n.0.value("title").as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_empty_before_fetch() {
        let store = store_with(&["b", "a"]);
        let c = controller(&store);
        assert!(c.results().is_none());
        assert!(c.entities().is_empty());

        c.perform_fetch().unwrap();
        assert_eq!(titles(&c), vec!["a", "b"]);
        assert_eq!(c.generation(), 1);
    }

    #[test]
    fn test_failed_fetch_keeps_results() {
        let store = store_with(&["a"]);
        let c = controller(&store);
        c.perform_fetch().unwrap();

        store.faults().arm(points::FETCH, 1);
        assert!(matches!(c.perform_fetch(), Err(QueryError::FetchExecution(_))));
        assert_eq!(titles(&c), vec!["a"]);
        assert_eq!(c.generation(), 1);
    }

    #[test]
    fn test_unrelated_entity_changes_ignored() {
        let store = store_with(&["a"]);
        let c = controller(&store);
        c.perform_fetch().unwrap();

        let batches = Arc::new(Mutex::new(0));
        let b = batches.clone();
        c.delegate().on_did_change(move || *b.lock() += 1);

        let ctx = store.view_context();
        ctx.insert("Tag").unwrap();
        store.main_queue().run_pending();
        assert_eq!(*batches.lock(), 0);
    }

    #[test]
    fn test_detach_on_drop() {
        let store = store_with(&["a"]);
        let weak = {
            let c = controller(&store);
            c.perform_fetch().unwrap();
            Arc::downgrade(&c.shared)
        };
        assert!(weak.upgrade().is_none());

        // Announcements after teardown reach nobody
        let ctx = store.view_context();
        ctx.insert("Note").unwrap();
        store.main_queue().run_pending();
    }

    #[test]
    fn test_compose_relative_to_initial() {
        let store = store_with(&["a"]);
        let spec = QuerySpec::new("Note", &QueryOptions::default())
            .filter(Predicate::eq("archived", false))
            .order_by("title");
        let c = LiveResultController::<Note, _>::new(store.view_context(), spec, ControllerOptions::new());

        let composed = c.compose_predicate(Some(Predicate::eq("pinned", true)), true);
        assert_eq!(
            composed,
            Some(Predicate::and(
                Predicate::eq("archived", false),
                Predicate::eq("pinned", true)
            ))
        );
        assert_eq!(c.compose_predicate(None, true), Some(Predicate::eq("archived", false)));
        assert_eq!(c.compose_predicate(None, false), None);

        let sort = c.compose_sort(vec![SortDescriptor::descending("created")], true);
        assert_eq!(sort.len(), 2);
        assert_eq!(sort[0].attribute, "title");
    }
}

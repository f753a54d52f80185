//! Entity tables
//!
//! [`Table`] is the entity-typed entry point: a context, a query spec for
//! the entity, and the executor that runs it. Builder calls return a new
//! table with a narrowed spec; terminal calls run it.
//!
//! ```
//! use livefetch::query::Predicate;
//! use livefetch::store::{Entity, ManagedObject, MemoryStore, StoreContext};
//! use livefetch::table::Table;
//!
//! #[derive(Debug, Clone)]
//! struct Folder(ManagedObject);
//!
//! impl Entity for Folder {
//!     const ENTITY_NAME: &'static str = "Folder";
//!     fn from_object(object: ManagedObject) -> Self { Folder(object) }
//!     fn object(&self) -> &ManagedObject { &self.0 }
//! }
//!
//! let store = MemoryStore::new(["Folder"]).unwrap();
//! let folders: Table<Folder, _> = Table::new(store.view_context());
//!
//! let home = folders.first_or_create(Predicate::eq("name", "home")).unwrap();
//! let again = folders.first_or_create(Predicate::eq("name", "home")).unwrap();
//! assert_eq!(home.object_id(), again.object_id());
//! assert_eq!(folders.count().unwrap(), 1);
//! ```

use std::collections::BTreeSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::QueryOptions;
use crate::controller::{ControllerOptions, LiveResultController};
use crate::executor::QueryExecutor;
use crate::observability::MetricsRegistry;
use crate::query::{Predicate, QueryResult, QuerySpec, SortDescriptor};
use crate::store::{CompletionQueue, Entity, ObjectId, Row, StoreContext};

/// Query entry point for one entity type on one context
#[derive(Clone)]
pub struct Table<E: Entity, C: StoreContext> {
    executor: QueryExecutor<C>,
    spec: QuerySpec,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, C: StoreContext> Table<E, C> {
    /// Table using the process-wide query options
    pub fn new(context: C) -> Self {
        Self::with_spec(QueryExecutor::new(context), QuerySpec::for_entity(E::ENTITY_NAME))
    }

    pub fn with_options(context: C, options: &QueryOptions) -> Self {
        Self::with_spec(
            QueryExecutor::new(context),
            QuerySpec::new(E::ENTITY_NAME, options),
        )
    }

    fn with_spec(executor: QueryExecutor<C>, spec: QuerySpec) -> Self {
        Self {
            executor,
            spec,
            _entity: PhantomData,
        }
    }

    fn narrowed(&self, spec: QuerySpec) -> Self {
        Self::with_spec(self.executor.clone(), spec)
    }

    pub fn with_metrics(self, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            executor: self.executor.with_metrics(metrics),
            spec: self.spec,
            _entity: PhantomData,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn context(&self) -> &C {
        self.executor.context()
    }

    // Builder

    pub fn filter(&self, predicate: Predicate) -> Self {
        self.narrowed(self.spec.filter(predicate))
    }

    pub fn sort(&self, descriptor: SortDescriptor) -> Self {
        self.narrowed(self.spec.sort(descriptor))
    }

    pub fn sort_by(&self, attribute: &str, ascending: bool) -> Self {
        self.narrowed(self.spec.sort_by(attribute, ascending))
    }

    pub fn order_by(&self, attribute: &str) -> Self {
        self.narrowed(self.spec.order_by(attribute))
    }

    pub fn order_by_descending(&self, attribute: &str) -> Self {
        self.narrowed(self.spec.order_by_descending(attribute))
    }

    pub fn then_by(&self, attribute: &str) -> Self {
        self.narrowed(self.spec.then_by(attribute))
    }

    pub fn then_by_descending(&self, attribute: &str) -> Self {
        self.narrowed(self.spec.then_by_descending(attribute))
    }

    pub fn skip(&self, offset: usize) -> Self {
        self.narrowed(self.spec.skip(offset))
    }

    pub fn take(&self, limit: usize) -> Self {
        self.narrowed(self.spec.take(limit))
    }

    pub fn paginate(&self, offset: usize, limit: usize) -> Self {
        self.narrowed(self.spec.paginate(offset, limit))
    }

    pub fn batch(&self, batch_size: usize) -> Self {
        self.narrowed(self.spec.batch(batch_size))
    }

    /// Switches to attribute rows; see [`rows`](Self::rows)
    pub fn project<I, S>(&self, attributes: I, distinct: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.narrowed(self.spec.project(attributes, distinct))
    }

    // Object lifecycle

    /// Inserts a new, unsaved entity
    pub fn create(&self) -> QueryResult<E> {
        let object = self.context().insert(E::ENTITY_NAME)?;
        Ok(E::from_object(object))
    }

    pub fn delete(&self, entity: &E) -> QueryResult<()> {
        Ok(self.context().delete(entity.object_id())?)
    }

    /// Re-reads an entity, keeping local edits when `merge_changes` is set
    pub fn refresh(&self, entity: &E, merge_changes: bool) -> QueryResult<E> {
        let object = self.context().refresh(entity.object_id(), merge_changes)?;
        Ok(E::from_object(object))
    }

    /// Deletes every match; returns the number of distinct identities deleted.
    ///
    /// Only identities are fetched.
    pub fn delete_all(&self) -> QueryResult<usize> {
        let ids: BTreeSet<ObjectId> = self.executor.object_ids(&self.spec)?.into_iter().collect();
        for id in &ids {
            self.context().delete(id)?;
        }
        debug!(entity = E::ENTITY_NAME, deleted = ids.len(), "delete_all");
        Ok(ids.len())
    }

    /// First match of `predicate`, or a new entity carrying its value.
    ///
    /// `predicate` must be a single `attribute == value` comparison;
    /// anything else fails with `UnsupportedPredicate`.
    pub fn first_or_create(&self, predicate: Predicate) -> QueryResult<E> {
        let (attribute, value) = predicate.equality_pair()?;
        if let Some(existing) = self.filter(predicate.clone()).first()? {
            return Ok(existing);
        }

        let created = self.context().insert(E::ENTITY_NAME)?;
        self.context()
            .set_value(created.id(), attribute, value.clone())?;
        debug!(entity = E::ENTITY_NAME, attribute, "first_or_create inserted");
        Ok(E::from_object(self.context().existing_object(created.id())?))
    }

    // Terminal queries

    pub fn first(&self) -> QueryResult<Option<E>> {
        self.executor.first(&self.spec)
    }

    pub fn first_where(&self, predicate: Predicate) -> QueryResult<Option<E>> {
        self.filter(predicate).first()
    }

    pub fn to_vec(&self) -> QueryResult<Vec<E>> {
        self.executor.execute(&self.spec)
    }

    pub fn iter(&self) -> QueryResult<std::vec::IntoIter<E>> {
        Ok(self.to_vec()?.into_iter())
    }

    pub fn count(&self) -> QueryResult<usize> {
        self.executor.count(&self.spec)
    }

    pub fn count_where(&self, predicate: Predicate) -> QueryResult<usize> {
        self.filter(predicate).count()
    }

    pub fn any(&self) -> QueryResult<bool> {
        self.executor.any(&self.spec)
    }

    pub fn any_where(&self, predicate: Predicate) -> QueryResult<bool> {
        self.filter(predicate).any()
    }

    pub fn none(&self) -> QueryResult<bool> {
        self.executor.none(&self.spec)
    }

    /// Values of one attribute across the matches
    pub fn values(&self, attribute: &str) -> QueryResult<Vec<Value>> {
        self.executor.values(&self.spec.project([attribute], false))
    }

    /// Distinct values of one attribute
    pub fn distinct_values(&self, attribute: &str) -> QueryResult<Vec<Value>> {
        self.executor.values(&self.spec.project([attribute], true))
    }

    /// Attribute rows; projected attributes only when the table projects
    pub fn rows(&self) -> QueryResult<Vec<Row>> {
        self.executor.rows(&self.spec)
    }

    /// Sets `values` on every match; returns the number touched
    pub fn batch_update(&self, values: &Row) -> QueryResult<usize> {
        self.executor.batch_update(&self.spec, values)
    }

    // Async

    pub fn execute_async<F>(&self, queue: Arc<dyn CompletionQueue>, callback: F)
    where
        F: FnOnce(QueryResult<Vec<E>>) + Send + 'static,
    {
        self.executor.execute_async::<E, F>(&self.spec, queue, callback)
    }

    pub fn fetch(&self) -> impl Future<Output = QueryResult<Vec<E>>> + Send + 'static {
        self.executor.fetch::<E>(&self.spec)
    }

    /// Live controller over this table's spec
    pub fn to_live_controller(
        &self,
        section_name_key_path: Option<&str>,
        cache_name: Option<&str>,
    ) -> LiveResultController<E, C> {
        let mut options = ControllerOptions::new();
        if let Some(key_path) = section_name_key_path {
            options = options.sectioned_by(key_path);
        }
        if let Some(cache) = cache_name {
            options = options.cached_as(cache);
        }
        if let Some(metrics) = self.executor.metrics() {
            options = options.with_metrics(metrics.clone());
        }
        LiveResultController::new(self.context().clone(), self.spec.clone(), options)
    }
}

//! Query executor
//!
//! Compiles a [`QuerySpec`] into the store's native [`FetchRequest`] and
//! runs it against a context.
//!
//! Compilation is structural: the predicate tree and sort keys are carried
//! over as-is, pagination is copied verbatim (with the batch-size collapse
//! rule applied) and projection switches the result type to rows.
//!
//! The async path runs the fetch on a background context and hands the
//! result to a caller-chosen completion queue, never to the worker thread.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::observability::MetricsRegistry;
use crate::query::{QueryError, QueryResult, QuerySpec};
use crate::store::{
    CompletionQueue, Entity, FetchOutput, FetchRequest, ObjectId, ResultType, Row, StoreContext,
    StoreError,
};

/// Callback slot that can fire at most once
type CompletionSlot<T> = Arc<Mutex<Option<Box<dyn FnOnce(QueryResult<T>) + Send + 'static>>>>;

/// Executes query specs against one store context
#[derive(Clone)]
pub struct QueryExecutor<C: StoreContext> {
    context: C,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<C: StoreContext> QueryExecutor<C> {
    /// Creates a new executor
    pub fn new(context: C) -> Self {
        Self {
            context,
            metrics: None,
        }
    }

    /// Attaches a metrics registry
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    /// Compiles a spec into a native fetch request.
    ///
    /// Fails with `UnsupportedPredicate` if any comparison pairs an operator
    /// with a value it cannot compare against.
    pub fn compile(spec: &QuerySpec) -> QueryResult<FetchRequest> {
        if let Some(predicate) = spec.predicate() {
            predicate.validate()?;
        }

        let result_type = if spec.is_projecting() {
            ResultType::Dictionaries
        } else {
            ResultType::Objects
        };

        Ok(FetchRequest {
            entity_name: spec.entity_name().to_string(),
            predicate: spec.predicate().cloned(),
            sort_descriptors: spec.sort_descriptors().to_vec(),
            fetch_offset: spec.offset(),
            fetch_limit: spec.limit(),
            fetch_batch_size: spec.effective_batch_size(),
            result_type,
            properties_to_fetch: spec.projection().to_vec(),
            returns_distinct_results: spec.is_distinct(),
        })
    }

    fn run(&self, request: &FetchRequest) -> QueryResult<FetchOutput> {
        match self.context.execute(request) {
            Ok(output) => {
                if let Some(m) = &self.metrics {
                    m.increment_fetches_executed();
                }
                Ok(output)
            }
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.increment_fetches_failed();
                }
                debug!(
                    context = self.context.name(),
                    entity = %request.entity_name,
                    error = %e,
                    "fetch failed"
                );
                Err(e.into())
            }
        }
    }

    fn compile_checked(&self, spec: &QuerySpec) -> QueryResult<FetchRequest> {
        Self::compile(spec).map_err(|e| {
            if let Some(m) = &self.metrics {
                m.increment_fetches_failed();
            }
            e
        })
    }

    /// Fetches full entities
    pub fn execute<E: Entity>(&self, spec: &QuerySpec) -> QueryResult<Vec<E>> {
        if spec.entity_name() != E::ENTITY_NAME {
            return Err(StoreError::InvalidRequest(format!(
                "spec targets '{}' but '{}' was requested",
                spec.entity_name(),
                E::ENTITY_NAME
            ))
            .into());
        }
        if spec.is_projecting() {
            return Err(QueryError::UnexpectedShape(
                "spec projects attributes; fetch rows or values instead".into(),
            ));
        }

        let request = self.compile_checked(spec)?;
        match self.run(&request)? {
            FetchOutput::Objects(objects) => Ok(objects.into_iter().map(E::from_object).collect()),
            other => Err(shape_mismatch("objects", &other)),
        }
    }

    /// Fetches attribute rows; all attributes when the spec does not project
    pub fn rows(&self, spec: &QuerySpec) -> QueryResult<Vec<Row>> {
        let request = self
            .compile_checked(spec)?
            .with_result_type(ResultType::Dictionaries);
        match self.run(&request)? {
            FetchOutput::Rows(rows) => Ok(rows),
            other => Err(shape_mismatch("rows", &other)),
        }
    }

    /// Fetches a single projected attribute.
    ///
    /// Every row must hold exactly one value; anything else is a hard
    /// `UnexpectedShape` error, never coerced.
    pub fn values(&self, spec: &QuerySpec) -> QueryResult<Vec<Value>> {
        let rows = self.rows(spec)?;
        rows.into_iter()
            .map(|row| {
                if row.len() != 1 {
                    return Err(QueryError::UnexpectedShape(format!(
                        "expected exactly one value per row, found {}",
                        row.len()
                    )));
                }
                row.into_values().next().ok_or_else(|| {
                    QueryError::UnexpectedShape("row has no value".into())
                })
            })
            .collect()
    }

    /// Fetches identities only
    pub fn object_ids(&self, spec: &QuerySpec) -> QueryResult<Vec<ObjectId>> {
        let request = self
            .compile_checked(spec)?
            .with_result_type(ResultType::ObjectIds);
        match self.run(&request)? {
            FetchOutput::Ids(ids) => Ok(ids),
            other => Err(shape_mismatch("ids", &other)),
        }
    }

    /// Cardinality of the result without materializing it
    pub fn count(&self, spec: &QuerySpec) -> QueryResult<usize> {
        let request = self
            .compile_checked(spec)?
            .with_result_type(ResultType::Count);
        let count = self.context.count(&request).map_err(|e| {
            if let Some(m) = &self.metrics {
                m.increment_fetches_failed();
            }
            QueryError::from(e)
        })?;
        if let Some(m) = &self.metrics {
            m.increment_counts_executed();
        }
        Ok(count)
    }

    /// True if at least one object matches
    pub fn any(&self, spec: &QuerySpec) -> QueryResult<bool> {
        Ok(self.count(&spec.take(1))? > 0)
    }

    /// True if nothing matches
    pub fn none(&self, spec: &QuerySpec) -> QueryResult<bool> {
        Ok(!self.any(spec)?)
    }

    /// First matching entity, if any
    pub fn first<E: Entity>(&self, spec: &QuerySpec) -> QueryResult<Option<E>> {
        Ok(self.execute::<E>(&spec.take(1))?.into_iter().next())
    }

    /// Sets `values` on every matching object; returns the number touched
    pub fn batch_update(&self, spec: &QuerySpec, values: &Row) -> QueryResult<usize> {
        let request = self.compile_checked(spec)?;
        Ok(self.context.batch_update(&request, values)?)
    }

    /// Fetches on a background context and invokes `callback` on `queue`.
    ///
    /// The callback runs exactly once, with either the entities or the
    /// error, as long as `queue` accepts work.
    pub fn execute_async<E, F>(&self, spec: &QuerySpec, queue: Arc<dyn CompletionQueue>, callback: F)
    where
        E: Entity,
        F: FnOnce(QueryResult<Vec<E>>) + Send + 'static,
    {
        if let Some(m) = &self.metrics {
            m.increment_async_issued();
        }

        let callback: Box<dyn FnOnce(QueryResult<Vec<E>>) + Send> = Box::new(callback);
        let slot: CompletionSlot<Vec<E>> = Arc::new(Mutex::new(Some(callback)));
        let task_slot = slot.clone();
        let task_queue = queue.clone();
        let spec = spec.clone();
        let metrics = self.metrics.clone();

        let scheduled = self.context.perform_in_background(Box::new(move |background: &C| {
            let executor = QueryExecutor {
                context: background.clone(),
                metrics,
            };
            let result = executor.execute::<E>(&spec);
            complete(&task_queue, &task_slot, result);
        }));

        if let Err(e) = scheduled {
            complete(&queue, &slot, Err(e.into()));
        }
    }

    /// Fetches on a background context, resolving the returned future with the result
    pub fn fetch<E: Entity>(
        &self,
        spec: &QuerySpec,
    ) -> impl Future<Output = QueryResult<Vec<E>>> + Send + 'static {
        if let Some(m) = &self.metrics {
            m.increment_async_issued();
        }

        let (tx, rx) = oneshot::channel::<QueryResult<Vec<E>>>();
        let spec = spec.clone();
        let metrics = self.metrics.clone();

        let scheduled = self.context.perform_in_background(Box::new(move |background: &C| {
            let executor = QueryExecutor {
                context: background.clone(),
                metrics,
            };
            let _ = tx.send(executor.execute::<E>(&spec));
        }));

        async move {
            if let Err(e) = scheduled {
                return Err(QueryError::from(e));
            }
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(QueryError::FetchExecution(StoreError::ContextClosed(
                    "background fetch dropped".into(),
                ))),
            }
        }
    }
}

fn shape_mismatch(expected: &str, found: &FetchOutput) -> QueryError {
    QueryError::UnexpectedShape(format!("expected {}, store returned {}", expected, found.kind()))
}

/// Dispatches the callback in `slot` onto `queue`, at most once
fn complete<T: Send + 'static>(
    queue: &Arc<dyn CompletionQueue>,
    slot: &CompletionSlot<T>,
    result: QueryResult<T>,
) {
    let Some(callback) = slot.lock().take() else {
        return;
    };
    if let Err(e) = queue.dispatch(Box::new(move || callback(result))) {
        warn!(queue = queue.label(), error = %e, "completion queue rejected async fetch result");
    }
}

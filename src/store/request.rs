//! Native fetch request form.
//!
//! A `FetchRequest` is what a [`QuerySpec`](crate::query::QuerySpec)
//! compiles into: the same predicate tree and sort keys, pagination copied
//! verbatim, and a result type telling the store what shape to return.

use super::object::{ManagedObject, ObjectId, Row};
use crate::query::{Predicate, SortDescriptor};

/// Shape of the rows a fetch returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultType {
    /// Full managed objects
    #[default]
    Objects,
    /// Attribute rows restricted to `properties_to_fetch`
    Dictionaries,
    /// Identities only
    ObjectIds,
    /// Cardinality only
    Count,
}

/// Compiled fetch request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchRequest {
    pub entity_name: String,
    pub predicate: Option<Predicate>,
    pub sort_descriptors: Vec<SortDescriptor>,
    pub fetch_offset: usize,
    /// 0 means unbounded
    pub fetch_limit: usize,
    /// 0 means fetch everything at once
    pub fetch_batch_size: usize,
    pub result_type: ResultType,
    pub properties_to_fetch: Vec<String>,
    pub returns_distinct_results: bool,
}

impl FetchRequest {
    /// Create an unfiltered object fetch for `entity_name`
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            ..Default::default()
        }
    }

    /// Returns a copy asking for a different result shape
    pub fn with_result_type(&self, result_type: ResultType) -> Self {
        Self {
            result_type,
            ..self.clone()
        }
    }
}

/// What a store returns for a fetch, one variant per [`ResultType`]
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutput {
    Objects(Vec<ManagedObject>),
    Rows(Vec<Row>),
    Ids(Vec<ObjectId>),
    Count(usize),
}

impl FetchOutput {
    /// Number of results, or the count itself
    pub fn len(&self) -> usize {
        match self {
            FetchOutput::Objects(objects) => objects.len(),
            FetchOutput::Rows(rows) => rows.len(),
            FetchOutput::Ids(ids) => ids.len(),
            FetchOutput::Count(count) => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Variant name, for shape mismatch messages
    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutput::Objects(_) => "objects",
            FetchOutput::Rows(_) => "rows",
            FetchOutput::Ids(_) => "ids",
            FetchOutput::Count(_) => "count",
        }
    }
}

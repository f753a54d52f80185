//! Query specification builder.
//!
//! `QuerySpec` is an immutable value. Every builder method takes `&self`
//! and returns a new spec, so one base spec can be shared and specialised
//! several ways (a count and a first-row query, for example) without the
//! variants interfering.

use std::fmt;

use super::predicate::Predicate;
use super::sort::{ComparisonMode, SortDescriptor};
use crate::config::QueryOptions;

/// Immutable description of a filter/sort/pagination query over one entity
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    entity_name: String,
    predicate: Option<Predicate>,
    sort_descriptors: Vec<SortDescriptor>,
    offset: usize,
    limit: usize,
    batch_size: usize,
    projection: Vec<String>,
    distinct: bool,
    comparison_mode: ComparisonMode,
}

impl QuerySpec {
    /// Create a spec over `entity_name` with defaults taken from `options`
    pub fn new(entity_name: impl Into<String>, options: &QueryOptions) -> Self {
        Self {
            entity_name: entity_name.into(),
            predicate: None,
            sort_descriptors: Vec::new(),
            offset: 0,
            limit: 0,
            batch_size: options.default_batch_size,
            projection: Vec::new(),
            distinct: false,
            comparison_mode: options.default_comparison_mode,
        }
    }

    /// Create a spec using the process-wide options
    pub fn for_entity(entity_name: impl Into<String>) -> Self {
        Self::new(entity_name, QueryOptions::global())
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn sort_descriptors(&self) -> &[SortDescriptor] {
        &self.sort_descriptors
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Row limit; 0 means unbounded
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    pub fn is_projecting(&self) -> bool {
        !self.projection.is_empty()
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Comparison mode used by [`QuerySpec::sort_by`]
    pub fn comparison_mode(&self) -> ComparisonMode {
        self.comparison_mode
    }

    /// Batch size actually sent to the store.
    ///
    /// A batch larger than a positive limit collapses to 0 (fetch all at once).
    pub fn effective_batch_size(&self) -> usize {
        if self.limit > 0 && self.batch_size > self.limit {
            0
        } else {
            self.batch_size
        }
    }

    // ==================
    // Filtering
    // ==================

    /// AND-combines `predicate` with the existing predicate, if any
    pub fn filter(&self, predicate: Predicate) -> Self {
        let mut next = self.clone();
        next.predicate = Some(match next.predicate.take() {
            Some(existing) => Predicate::and(existing, predicate),
            None => predicate,
        });
        next
    }

    /// Replaces the predicate outright
    pub fn with_predicate(&self, predicate: Option<Predicate>) -> Self {
        let mut next = self.clone();
        next.predicate = predicate;
        next
    }

    pub fn without_predicate(&self) -> Self {
        self.with_predicate(None)
    }

    // ==================
    // Sorting
    // ==================

    /// Appends one sort descriptor
    pub fn sort(&self, descriptor: SortDescriptor) -> Self {
        self.sort_all(std::iter::once(descriptor))
    }

    /// Appends several sort descriptors in order
    pub fn sort_all(&self, descriptors: impl IntoIterator<Item = SortDescriptor>) -> Self {
        let mut next = self.clone();
        next.sort_descriptors.extend(descriptors);
        next
    }

    /// Appends a sort on `attribute` using the spec's comparison mode
    pub fn sort_by(&self, attribute: impl Into<String>, ascending: bool) -> Self {
        self.sort(SortDescriptor::new(attribute, ascending, self.comparison_mode))
    }

    pub fn order_by(&self, attribute: impl Into<String>) -> Self {
        self.sort_by(attribute, true)
    }

    pub fn order_by_descending(&self, attribute: impl Into<String>) -> Self {
        self.sort_by(attribute, false)
    }

    pub fn then_by(&self, attribute: impl Into<String>) -> Self {
        self.sort_by(attribute, true)
    }

    pub fn then_by_descending(&self, attribute: impl Into<String>) -> Self {
        self.sort_by(attribute, false)
    }

    /// Replaces the sort descriptors outright
    pub fn with_sort_descriptors(&self, descriptors: Vec<SortDescriptor>) -> Self {
        let mut next = self.clone();
        next.sort_descriptors = descriptors;
        next
    }

    pub fn without_sort(&self) -> Self {
        self.with_sort_descriptors(Vec::new())
    }

    // ==================
    // Pagination
    // ==================

    pub fn skip(&self, offset: usize) -> Self {
        let mut next = self.clone();
        next.offset = offset;
        next
    }

    pub fn take(&self, limit: usize) -> Self {
        let mut next = self.clone();
        next.limit = limit;
        next
    }

    pub fn paginate(&self, offset: usize, limit: usize) -> Self {
        self.skip(offset).take(limit)
    }

    pub fn batch(&self, batch_size: usize) -> Self {
        let mut next = self.clone();
        next.batch_size = batch_size;
        next
    }

    // ==================
    // Projection
    // ==================

    /// Switches to attribute projection: results become rows keyed by attribute
    pub fn project<I, S>(&self, attributes: I, distinct: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.projection = attributes.into_iter().map(Into::into).collect();
        next.distinct = distinct;
        next
    }

    /// Returns a copy with distinct results requested
    pub fn distinct(&self) -> Self {
        let mut next = self.clone();
        next.distinct = true;
        next
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FETCH {}", self.entity_name)?;
        if !self.projection.is_empty() {
            write!(f, " [{}]", self.projection.join(", "))?;
            if self.distinct {
                write!(f, " DISTINCT")?;
            }
        }
        if let Some(predicate) = &self.predicate {
            write!(f, " WHERE {}", predicate)?;
        }
        if !self.sort_descriptors.is_empty() {
            let keys: Vec<String> = self
                .sort_descriptors
                .iter()
                .map(|d| format!("{} {}", d.attribute, if d.ascending { "ASC" } else { "DESC" }))
                .collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }
        if self.offset > 0 {
            write!(f, " OFFSET {}", self.offset)?;
        }
        if self.limit > 0 {
            write!(f, " LIMIT {}", self.limit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> QuerySpec {
        QuerySpec::new("Person", &QueryOptions::default())
    }

    #[test]
    fn test_defaults_from_options() {
        let s = QuerySpec::new("Person", &QueryOptions::with_batch_size(7));
        assert_eq!(s.batch_size(), 7);
        assert_eq!(s.limit(), 0);
        assert!(s.predicate().is_none());
        assert!(!s.is_projecting());
    }

    #[test]
    fn test_filter_combines_with_and() {
        let p1 = Predicate::gte("age", 18);
        let p2 = Predicate::eq("active", true);

        let chained = spec().filter(p1.clone()).filter(p2.clone());
        let combined = spec().filter(Predicate::and(p1, p2));
        assert_eq!(chained.predicate(), combined.predicate());
    }

    #[test]
    fn test_sort_appends_without_mutating() {
        let base = spec().sort(SortDescriptor::ascending("name"));
        let extended = base.sort(SortDescriptor::descending("age"));

        assert_eq!(base.sort_descriptors().len(), 1);
        assert_eq!(extended.sort_descriptors().len(), 2);
        assert_eq!(extended.sort_descriptors()[1].attribute, "age");
    }

    #[test]
    fn test_sort_by_uses_configured_mode() {
        let s = spec().order_by("name").then_by_descending("age");
        assert_eq!(
            s.sort_descriptors()[0].mode,
            ComparisonMode::CaseAndDiacriticInsensitive
        );
        assert!(!s.sort_descriptors()[1].ascending);
        assert!(s.without_sort().sort_descriptors().is_empty());
    }

    #[test]
    fn test_batch_collapses_above_limit() {
        let s = spec().batch(50).take(10);
        assert_eq!(s.effective_batch_size(), 0);

        let s = spec().batch(5).take(10);
        assert_eq!(s.effective_batch_size(), 5);

        // Unbounded limit never collapses.
        let s = spec().batch(50);
        assert_eq!(s.effective_batch_size(), 50);
    }

    #[test]
    fn test_distinct_returns_new_spec() {
        let base = spec();
        let d = base.distinct();
        assert!(d.is_distinct());
        assert!(!base.is_distinct());
    }

    #[test]
    fn test_project() {
        let s = spec().project(["name", "age"], true);
        assert!(s.is_projecting());
        assert!(s.is_distinct());
        assert_eq!(s.projection(), ["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn test_display() {
        let s = spec()
            .filter(Predicate::gte("age", 18))
            .sort(SortDescriptor::ascending("name"))
            .paginate(5, 10);
        assert_eq!(
            s.to_string(),
            "FETCH Person WHERE age >= 18 ORDER BY name ASC OFFSET 5 LIMIT 10"
        );
    }
}

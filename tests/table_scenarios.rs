//! Table Scenario Tests
//!
//! Tests for the entity table entry point:
//! - first_or_create identity and shape rules
//! - delete_all over identities
//! - Terminal queries and attribute values
//! - Save hand-off between contexts

mod common;

use common::{empty_store, insert_person, names, seeded_store, Folder, Person};
use livefetch::config::QueryOptions;
use livefetch::query::{Predicate, QueryError};
use livefetch::store::{fault::points, MemoryContext, StoreContext, StoreError};
use livefetch::table::Table;
use serde_json::json;

fn people_table(ctx: MemoryContext) -> Table<Person, MemoryContext> {
    Table::with_options(ctx, &QueryOptions::default())
}

// =============================================================================
// first_or_create
// =============================================================================

/// First call creates exactly one entity; the second returns it.
#[test]
fn test_first_or_create_is_idempotent() {
    let store = empty_store();
    let folders: Table<Folder, _> = Table::with_options(store.view_context(), &QueryOptions::default());

    let home = folders.first_or_create(Predicate::eq("name", "home")).unwrap();
    assert_eq!(home.0.value("name"), &json!("home"));
    assert_eq!(folders.count().unwrap(), 1);

    let again = folders.first_or_create(Predicate::eq("name", "home")).unwrap();
    assert_eq!(again.0.id(), home.0.id());
    assert_eq!(folders.count().unwrap(), 1);

    folders.first_or_create(Predicate::eq("name", "work")).unwrap();
    assert_eq!(folders.count().unwrap(), 2);
}

/// Compound predicates are a caller error and create nothing.
#[test]
fn test_first_or_create_compound_rejected() {
    let store = empty_store();
    let folders: Table<Folder, _> = Table::with_options(store.view_context(), &QueryOptions::default());

    let compound = Predicate::and(Predicate::eq("name", "home"), Predicate::eq("shared", true));
    let err = folders.first_or_create(compound).unwrap_err();

    assert!(matches!(err, QueryError::UnsupportedPredicate(_)));
    assert_eq!(err.code(), "LIVEFETCH_UNSUPPORTED_PREDICATE");
    assert!(folders.none().unwrap());
}

// =============================================================================
// delete_all
// =============================================================================

/// Deleting over an empty match set succeeds and does nothing.
#[test]
fn test_delete_all_empty_is_noop() {
    let store = seeded_store();
    let table = people_table(store.view_context());

    let deleted = table.filter(Predicate::gt("age", 100)).delete_all().unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(table.count().unwrap(), 5);
    assert!(!store.view_context().has_changes());
}

/// delete_all removes the matches only and can be repeated.
#[test]
fn test_delete_all_matches() {
    let store = seeded_store();
    let table = people_table(store.view_context());
    let minors = table.filter(Predicate::lt("age", 18));

    assert_eq!(minors.delete_all().unwrap(), 1);
    assert_eq!(minors.delete_all().unwrap(), 0);
    assert_eq!(table.count().unwrap(), 4);

    table.context().save().unwrap();
    assert_eq!(store.committed_count("Person"), 4);
}

/// Deleting the same identity twice is harmless.
#[test]
fn test_delete_is_idempotent() {
    let store = seeded_store();
    let table = people_table(store.view_context());
    let ann = table.first_where(Predicate::eq("name", "Ann")).unwrap().unwrap();

    table.delete(&ann).unwrap();
    table.delete(&ann).unwrap();
    assert_eq!(table.count().unwrap(), 4);
}

// =============================================================================
// Terminal Queries
// =============================================================================

/// first/to_vec/iter delegate to the executor with the table's spec.
#[test]
fn test_terminal_queries() {
    let store = seeded_store();
    let table = people_table(store.view_context()).order_by("age");

    assert_eq!(table.first().unwrap().unwrap().name(), "Eve");
    assert_eq!(table.to_vec().unwrap().len(), 5);
    let ages: Vec<i64> = table.iter().unwrap().map(|p| p.age()).collect();
    assert_eq!(ages, vec![10, 18, 25, 30, 40]);

    assert!(table.any_where(Predicate::eq("group", "kids")).unwrap());
    assert_eq!(table.count_where(Predicate::eq("group", "adults")).unwrap(), 3);
    assert_eq!(
        table.skip(3).values("name").unwrap(),
        vec![json!("Bob"), json!("Ann")]
    );
}

/// Rows carry the projected attributes only.
#[test]
fn test_rows_projection() {
    let store = seeded_store();
    let table = people_table(store.view_context()).order_by("name").take(2);

    let rows = table.project(["name", "age"], false).rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 2);
    assert_eq!(rows[0]["name"], json!("Ann"));
    assert!(!rows[0].contains_key("group"));
}

/// A store failure surfaces as a typed fetch error.
#[test]
fn test_fetch_failure_is_typed() {
    let store = seeded_store();
    let table = people_table(store.view_context());

    store.faults().arm(points::COUNT, 1);
    let err = table.count().unwrap_err();
    assert_eq!(err.store_error(), Some(&StoreError::InjectedFault("count")));
    assert_eq!(table.count().unwrap(), 5);
}

// =============================================================================
// Contexts
// =============================================================================

/// Work saved on a background context reaches the view context after the
/// main queue merges it.
#[test]
fn test_background_save_merges_into_view() {
    let store = seeded_store();
    let view = people_table(store.view_context());

    store
        .perform_background_task(|ctx| {
            insert_person(ctx, "Fay", 33, "adults");
            ctx.save().unwrap();
        })
        .unwrap();
    store.wait_for_background().unwrap();
    store.main_queue().run_pending();

    let adults = view.filter(Predicate::eq("group", "adults")).order_by("name").to_vec().unwrap();
    assert_eq!(names(&adults), vec!["Bob", "Cat", "Dan", "Fay"]);
}

/// Unsaved view changes stay invisible to background contexts.
#[test]
fn test_unsaved_changes_are_context_local() {
    let store = seeded_store();
    let view = people_table(store.view_context());
    view.create().unwrap();
    assert_eq!(view.count().unwrap(), 6);

    let background = people_table(store.new_background_context());
    assert_eq!(background.count().unwrap(), 5);
}

/// The future-returning fetch resolves with the committed matches.
#[tokio::test]
async fn test_fetch_future() {
    let store = seeded_store();
    let table = people_table(store.view_context());

    let seniors = table.filter(Predicate::eq("group", "seniors")).fetch().await.unwrap();
    assert_eq!(names(&seniors), vec!["Ann"]);
}

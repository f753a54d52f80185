//! Shared fixtures for integration tests

#![allow(dead_code)]

use livefetch::config::QueryOptions;
use livefetch::query::QuerySpec;
use livefetch::store::{Entity, ManagedObject, MemoryContext, MemoryStore, ObjectId, StoreContext};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct Person(pub ManagedObject);

impl Entity for Person {
    const ENTITY_NAME: &'static str = "Person";

    fn from_object(object: ManagedObject) -> Self {
        Person(object)
    }

    fn object(&self) -> &ManagedObject {
        &self.0
    }
}

impl Person {
    pub fn name(&self) -> &str {
        self.0.value("name").as_str().unwrap_or_default()
    }

    pub fn age(&self) -> i64 {
        self.0.value("age").as_i64().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Folder(pub ManagedObject);

impl Entity for Folder {
    const ENTITY_NAME: &'static str = "Folder";

    fn from_object(object: ManagedObject) -> Self {
        Folder(object)
    }

    fn object(&self) -> &ManagedObject {
        &self.0
    }
}

pub const AGES: [(&str, i64, &str); 5] = [
    ("Eve", 10, "kids"),
    ("Dan", 18, "adults"),
    ("Cat", 25, "adults"),
    ("Bob", 30, "adults"),
    ("Ann", 40, "seniors"),
];

pub fn empty_store() -> MemoryStore {
    MemoryStore::new(["Person", "Folder"]).unwrap()
}

pub fn insert_person(ctx: &MemoryContext, name: &str, age: i64, group: &str) -> ObjectId {
    let object = ctx.insert("Person").unwrap();
    ctx.set_value(object.id(), "name", json!(name)).unwrap();
    ctx.set_value(object.id(), "age", json!(age)).unwrap();
    ctx.set_value(object.id(), "group", json!(group)).unwrap();
    object.id().clone()
}

/// Store with the five committed people of [`AGES`], announcements drained
pub fn seeded_store() -> MemoryStore {
    let store = empty_store();
    let ctx = store.view_context();
    for (name, age, group) in AGES {
        insert_person(&ctx, name, age, group);
    }
    ctx.save().unwrap();
    store.main_queue().run_pending();
    store
}

pub fn people() -> QuerySpec {
    QuerySpec::new("Person", &QueryOptions::default())
}

pub fn names(people: &[Person]) -> Vec<&str> {
    people.iter().map(Person::name).collect()
}

pub fn set(ctx: &MemoryContext, id: &ObjectId, attribute: &str, value: Value) {
    ctx.set_value(id, attribute, value).unwrap();
}

//! Object identity and materialized objects.
//!
//! A `ManagedObject` is a snapshot of one entity instance as seen by an
//! execution context: its store-assigned identity plus attribute values.
//! Mutation always goes through the owning context.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

/// Raw attribute row returned by dictionary (projection) fetches
pub type Row = BTreeMap<String, Value>;

/// Store-assigned opaque identity of a persisted object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    store: Uuid,
    entity: Arc<str>,
    key: u64,
}

impl ObjectId {
    pub(crate) fn new(store: Uuid, entity: impl Into<Arc<str>>, key: u64) -> Self {
        Self {
            store,
            entity: entity.into(),
            key,
        }
    }

    /// Identifier of the store that minted this id
    pub fn store_id(&self) -> Uuid {
        self.store
    }

    /// Entity name of the identified object
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    /// Store-local primary key
    pub fn key(&self) -> u64 {
        self.key
    }

    /// URI form, stable for the lifetime of the store
    pub fn uri(&self) -> String {
        format!("x-livefetch://{}/{}/p{}", self.store, self.entity, self.key)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// Snapshot of an entity instance
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    id: ObjectId,
    attributes: Row,
}

impl ManagedObject {
    pub(crate) fn new(id: ObjectId) -> Self {
        Self {
            id,
            attributes: Row::new(),
        }
    }

    pub(crate) fn with_attributes(id: ObjectId, attributes: Row) -> Self {
        Self { id, attributes }
    }

    /// Returns the object's identity
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Returns the entity name
    pub fn entity_name(&self) -> &str {
        self.id.entity_name()
    }

    /// Returns an attribute value if it has been set
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Returns an attribute value, `Null` when unset
    pub fn value(&self, attribute: &str) -> &Value {
        self.attributes.get(attribute).unwrap_or(&Value::Null)
    }

    /// All attribute values keyed by name
    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub(crate) fn set(&mut self, attribute: impl Into<String>, value: Value) {
        self.attributes.insert(attribute.into(), value);
    }
}

/// Set of object identities touched since the last announcement.
///
/// Folding rules: an insert followed by a delete cancels out, an update of
/// an inserted object stays an insert, and an update followed by a delete
/// is a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectChanges {
    pub inserted: BTreeSet<ObjectId>,
    pub updated: BTreeSet<ObjectId>,
    pub deleted: BTreeSet<ObjectId>,
}

impl ObjectChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of touched identities
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    pub fn record_insert(&mut self, id: ObjectId) {
        self.deleted.remove(&id);
        self.inserted.insert(id);
    }

    pub fn record_update(&mut self, id: ObjectId) {
        if !self.inserted.contains(&id) && !self.deleted.contains(&id) {
            self.updated.insert(id);
        }
    }

    pub fn record_delete(&mut self, id: ObjectId) {
        self.updated.remove(&id);
        if !self.inserted.remove(&id) {
            self.deleted.insert(id);
        }
    }

    /// Folds `other` into `self`, applying the rules above
    pub fn merge(&mut self, other: &ObjectChanges) {
        for id in &other.inserted {
            self.record_insert(id.clone());
        }
        for id in &other.updated {
            self.record_update(id.clone());
        }
        for id in &other.deleted {
            self.record_delete(id.clone());
        }
    }

    /// Returns true if any touched identity belongs to `entity_name`
    pub fn touches_entity(&self, entity_name: &str) -> bool {
        self.inserted
            .iter()
            .chain(self.updated.iter())
            .chain(self.deleted.iter())
            .any(|id| id.entity_name() == entity_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(key: u64) -> ObjectId {
        ObjectId::new(Uuid::nil(), "Person", key)
    }

    #[test]
    fn test_object_id_uri() {
        let oid = id(7);
        assert_eq!(
            oid.uri(),
            "x-livefetch://00000000-0000-0000-0000-000000000000/Person/p7"
        );
        assert_eq!(oid.entity_name(), "Person");
    }

    #[test]
    fn test_unset_attribute_is_null() {
        let mut object = ManagedObject::new(id(1));
        assert_eq!(object.value("name"), &Value::Null);

        object.set("name", json!("Alice"));
        assert_eq!(object.get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_insert_then_delete_cancels() {
        let mut changes = ObjectChanges::new();
        changes.record_insert(id(1));
        changes.record_update(id(1));
        changes.record_delete(id(1));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_update_then_delete_is_delete() {
        let mut changes = ObjectChanges::new();
        changes.record_update(id(2));
        changes.record_delete(id(2));
        assert!(changes.updated.is_empty());
        assert!(changes.deleted.contains(&id(2)));
    }

    #[test]
    fn test_touches_entity() {
        let mut changes = ObjectChanges::new();
        changes.record_update(id(3));
        assert!(changes.touches_entity("Person"));
        assert!(!changes.touches_entity("Alarm"));
    }
}

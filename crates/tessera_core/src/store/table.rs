//! Records and per-type tables.

use crate::object::ObjectId;
use crate::value::{Fields, PrimaryKey, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A stored object record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Record {
    /// Stable identity.
    pub id: ObjectId,
    /// Store-wide insertion ordinal; defines the natural order of a table.
    pub ordinal: u64,
    /// Primary key, if the type declares one.
    pub primary_key: Option<PrimaryKey>,
    /// Stored property values.
    pub values: Fields,
}

impl Record {
    /// Returns the value of a stored property.
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }
}

/// All records of one object type.
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    /// Insertion ordinal -> object, iterated in insertion order.
    order: BTreeMap<u64, ObjectId>,
    /// Object -> record.
    records: HashMap<ObjectId, Arc<Record>>,
    /// Primary key -> object.
    keys: HashMap<PrimaryKey, ObjectId>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Arc<Record>> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn find_by_key(&self, key: &PrimaryKey) -> Option<&Arc<Record>> {
        self.keys.get(key).and_then(|id| self.records.get(id))
    }

    /// Iterates records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Record>> + '_ {
        self.order.values().filter_map(|id| self.records.get(id))
    }

    pub fn insert(&mut self, record: Record) {
        self.order.insert(record.ordinal, record.id);
        if let Some(key) = &record.primary_key {
            self.keys.insert(key.clone(), record.id);
        }
        self.records.insert(record.id, Arc::new(record));
    }

    /// Replaces a record's values in place, keeping its position.
    pub fn replace_values(&mut self, id: ObjectId, values: Fields) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                Arc::make_mut(record).values = values;
                true
            }
            None => false,
        }
    }

    /// Sets `property` on every record that lacks it.
    pub fn fill_missing(&mut self, property: &str, value: &Value) {
        for record in self.records.values_mut() {
            if !record.values.contains_key(property) {
                Arc::make_mut(record)
                    .values
                    .insert(property.to_string(), value.clone());
            }
        }
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Arc<Record>> {
        let record = self.records.remove(&id)?;
        self.order.remove(&record.ordinal);
        if let Some(key) = &record.primary_key {
            self.keys.remove(key);
        }
        Some(record)
    }
}

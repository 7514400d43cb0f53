//! Per-transaction change tracking.

use crate::change_feed::{ChangeEvent, ChangeType};
use crate::object::ObjectId;
use crate::value::PrimaryKey;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    object_type: String,
    primary_key: Option<PrimaryKey>,
    change: ChangeType,
}

/// Net effect of a write transaction on each touched object.
///
/// Changes to the same object collapse: an object created and then
/// modified is reported as an insert, and one created and then deleted is
/// not reported at all.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeLog {
    order: Vec<ObjectId>,
    entries: HashMap<ObjectId, Entry>,
}

impl ChangeLog {
    pub fn inserted(&mut self, object_type: &str, id: ObjectId, primary_key: Option<PrimaryKey>) {
        self.record(object_type, id, primary_key, ChangeType::Insert);
    }

    pub fn modified(&mut self, object_type: &str, id: ObjectId, primary_key: Option<PrimaryKey>) {
        if !self.entries.contains_key(&id) {
            self.record(object_type, id, primary_key, ChangeType::Update);
        }
    }

    pub fn deleted(&mut self, object_type: &str, id: ObjectId, primary_key: Option<PrimaryKey>) {
        match self.entries.get(&id).map(|e| e.change) {
            Some(ChangeType::Insert) => {
                self.entries.remove(&id);
                self.order.retain(|o| *o != id);
            }
            Some(_) => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.change = ChangeType::Delete;
                }
            }
            None => self.record(object_type, id, primary_key, ChangeType::Delete),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Converts the log into change feed events, in first-touch order.
    pub fn into_events(self, sequence: u64) -> Vec<ChangeEvent> {
        let Self { order, mut entries } = self;
        order
            .into_iter()
            .filter_map(|id| {
                entries.remove(&id).map(|e| {
                    ChangeEvent::new(sequence, e.object_type, id, e.primary_key, e.change)
                })
            })
            .collect()
    }

    fn record(
        &mut self,
        object_type: &str,
        id: ObjectId,
        primary_key: Option<PrimaryKey>,
        change: ChangeType,
    ) {
        self.order.push(id);
        self.entries.insert(
            id,
            Entry {
                object_type: object_type.to_string(),
                primary_key,
                change,
            },
        );
    }
}

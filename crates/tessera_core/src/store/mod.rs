//! In-memory object storage.
//!
//! The store is a set of per-type tables plus an inverse link index. A
//! [`StoreState`] is cheap to clone: tables and the index sit behind `Arc`s
//! and are copied on first write, so a write transaction can work on its
//! own copy while readers keep using the last committed one.

mod backlinks;
mod table;
mod validate;

pub(crate) use table::Record;

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectId;
use crate::schema::{ObjectSchema, PropertyKind, SchemaRegistry};
use crate::types::SequenceNumber;
use crate::value::{Fields, PrimaryKey, Value};
use backlinks::BacklinkIndex;
use std::collections::HashMap;
use std::sync::Arc;
use table::Table;

/// A consistent view of the database: data plus the schema it conforms to.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    /// Last commit included in this view.
    pub seq: SequenceNumber,
    /// Changes on every commit and on every uncommitted write.
    pub version: u64,
    /// Schema in effect.
    pub registry: Arc<SchemaRegistry>,
    /// Object data.
    pub state: StoreState,
}

/// Result of deleting one object.
#[derive(Debug)]
pub(crate) struct Removed {
    /// The deleted record.
    pub record: Arc<Record>,
    /// Objects whose links were cleared: `(object type, id)`.
    pub unlinked: Vec<(String, ObjectId)>,
}

/// Object tables and the inverse link index.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    tables: HashMap<String, Arc<Table>>,
    backlinks: Arc<BacklinkIndex>,
    next_ordinal: u64,
}

impl StoreState {
    /// Looks up an object by type and id.
    pub fn get(&self, object_type: &str, id: ObjectId) -> Option<&Arc<Record>> {
        self.tables.get(object_type)?.get(id)
    }

    pub fn contains(&self, object_type: &str, id: ObjectId) -> bool {
        self.tables
            .get(object_type)
            .is_some_and(|table| table.contains(id))
    }

    /// Looks up an object by primary key.
    pub fn find_by_key(&self, object_type: &str, key: &PrimaryKey) -> Option<&Arc<Record>> {
        self.tables.get(object_type)?.find_by_key(key)
    }

    /// Number of live objects of a type.
    pub fn count(&self, object_type: &str) -> usize {
        self.tables.get(object_type).map_or(0, |t| t.len())
    }

    /// Number of live objects across all types.
    pub fn total_count(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    /// Iterates the objects of a type in insertion order.
    pub fn scan<'a>(&'a self, object_type: &str) -> Box<dyn Iterator<Item = &'a Arc<Record>> + 'a> {
        match self.tables.get(object_type) {
            Some(table) => Box::new(table.iter()),
            None => Box::new(std::iter::empty()),
        }
    }

    /// Objects of `source_type` whose `property` links to `target`, in
    /// insertion order of the sources.
    pub fn backlinks(&self, target: ObjectId, source_type: &str, property: &str) -> Vec<&Arc<Record>> {
        let mut sources: Vec<_> = self
            .backlinks
            .sources(target, source_type, property)
            .into_iter()
            .filter_map(|id| self.get(source_type, id))
            .collect();
        sources.sort_by_key(|r| r.ordinal);
        sources
    }

    /// Validates and stores a new object.
    pub fn insert(
        &mut self,
        registry: &SchemaRegistry,
        schema: &ObjectSchema,
        values: Fields,
    ) -> CoreResult<ObjectId> {
        if schema.embedded {
            return Err(CoreError::schema(
                &schema.name,
                "embedded objects can only be created inside their owner",
            ));
        }
        let values = validate::normalize_fields(registry, schema, values, self)?;

        let primary_key = match schema.primary_key.as_deref() {
            Some(pk) => {
                let key = values
                    .get(pk)
                    .and_then(PrimaryKey::from_value)
                    .ok_or_else(|| CoreError::validation(&schema.name, pk, "missing primary key value"))?;
                if self.find_by_key(&schema.name, &key).is_some() {
                    return Err(CoreError::duplicate_primary_key(&schema.name, key.to_string()));
                }
                Some(key)
            }
            None => None,
        };

        let id = ObjectId::new();
        self.index_links(registry, schema, id, &values, true);
        let record = Record {
            id,
            ordinal: self.next_ordinal,
            primary_key,
            values,
        };
        self.next_ordinal += 1;
        self.table_mut(&schema.name).insert(record);
        Ok(id)
    }

    /// Assigns several properties of an existing object.
    ///
    /// Every value is checked before any is applied. Returns true if any
    /// stored value changed.
    pub fn update(
        &mut self,
        registry: &SchemaRegistry,
        schema: &ObjectSchema,
        id: ObjectId,
        changes: Fields,
    ) -> CoreResult<bool> {
        let record = self
            .get(&schema.name, id)
            .cloned()
            .ok_or_else(|| CoreError::dangling(&schema.name, id))?;

        let mut normalized = Vec::with_capacity(changes.len());
        for (name, value) in changes {
            let prop = schema
                .get_property(&name)
                .ok_or_else(|| CoreError::unknown_property(&schema.name, &name))?;
            let value = validate::normalize_property(registry, schema, prop, value, self)?;
            if schema.primary_key.as_deref() == Some(name.as_str())
                && record.get(&name) != Some(&value)
            {
                return Err(CoreError::validation(
                    &schema.name,
                    name,
                    "primary key cannot be changed",
                ));
            }
            normalized.push((name, value));
        }

        let mut values = record.values.clone();
        let mut changed = false;
        for (name, value) in normalized {
            if values.get(&name) == Some(&value) {
                continue;
            }
            let old = values.insert(name.clone(), value.clone());
            if let Some(PropertyKind::Link(_)) = schema.get_property(&name).map(|p| registry.kind_of(p)) {
                let index = Arc::make_mut(&mut self.backlinks);
                for target in old.iter().flat_map(link_targets) {
                    index.remove(target, &schema.name, &name, id);
                }
                for target in link_targets(&value) {
                    index.add(target, &schema.name, &name, id);
                }
            }
            changed = true;
        }

        if changed {
            self.table_mut(&schema.name).replace_values(id, values);
        }
        Ok(changed)
    }

    /// Removes an object and clears every link that pointed at it.
    pub fn remove(
        &mut self,
        registry: &SchemaRegistry,
        schema: &ObjectSchema,
        id: ObjectId,
    ) -> CoreResult<Removed> {
        let record = self
            .table_mut(&schema.name)
            .remove(id)
            .ok_or_else(|| CoreError::dangling(&schema.name, id))?;
        self.index_links(registry, schema, id, &record.values, false);

        let inbound = Arc::make_mut(&mut self.backlinks).take_all(id);
        let mut unlinked: Vec<(String, ObjectId)> = Vec::new();
        for (source_type, property, source) in inbound {
            let Some(source_record) = self.get(&source_type, source) else {
                continue;
            };
            let mut values = source_record.values.clone();
            match values.get_mut(&property) {
                Some(Value::List(items)) => items.retain(|v| v.as_link() != Some(id)),
                Some(slot) if slot.as_link().is_some() => *slot = Value::Null,
                _ => {}
            }
            self.table_mut(&source_type).replace_values(source, values);
            if !unlinked.iter().any(|(t, s)| *s == source && *t == source_type) {
                unlinked.push((source_type, source));
            }
        }

        Ok(Removed { record, unlinked })
    }

    /// Gives every object of a type a value for a newly added property.
    pub fn fill_missing(&mut self, object_type: &str, property: &str, value: &Value) {
        if self.count(object_type) > 0 {
            self.table_mut(object_type).fill_missing(property, value);
        }
    }

    fn table_mut(&mut self, object_type: &str) -> &mut Table {
        Arc::make_mut(self.tables.entry(object_type.to_string()).or_default())
    }

    fn index_links(
        &mut self,
        registry: &SchemaRegistry,
        schema: &ObjectSchema,
        id: ObjectId,
        values: &Fields,
        add: bool,
    ) {
        for prop in schema.stored_properties() {
            if !matches!(registry.kind_of(prop), PropertyKind::Link(_)) {
                continue;
            }
            let Some(value) = values.get(&prop.name) else {
                continue;
            };
            let targets = link_targets(value);
            if targets.is_empty() {
                continue;
            }
            let index = Arc::make_mut(&mut self.backlinks);
            for target in targets {
                if add {
                    index.add(target, &schema.name, &prop.name, id);
                } else {
                    index.remove(target, &schema.name, &prop.name, id);
                }
            }
        }
    }
}

fn link_targets(value: &Value) -> Vec<ObjectId> {
    match value {
        Value::Link(id) => vec![*id],
        Value::List(items) => items.iter().filter_map(Value::as_link).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(
            1,
            vec![
                ObjectSchema::from_shorthand(
                    "User",
                    Some("name"),
                    &[("name", "string"), ("posts", "Post[]"), ("pinned", "Post")],
                )
                .unwrap(),
                ObjectSchema::from_shorthand("Post", None, &[("title", "string")]).unwrap(),
            ],
        )
        .unwrap()
    }

    fn fields(pairs: Vec<(&str, Value)>) -> Fields {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn post(state: &mut StoreState, registry: &SchemaRegistry, title: &str) -> ObjectId {
        let schema = registry.resolve("Post").unwrap().clone();
        state
            .insert(registry, &schema, fields(vec![("title", Value::from(title))]))
            .unwrap()
    }

    #[test]
    fn duplicate_primary_key_is_rejected() {
        let registry = registry();
        let user = registry.resolve("User").unwrap().clone();
        let mut state = StoreState::default();

        state
            .insert(&registry, &user, fields(vec![("name", Value::from("ann"))]))
            .unwrap();
        let err = state
            .insert(&registry, &user, fields(vec![("name", Value::from("ann"))]))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicatePrimaryKey { .. }));
        assert_eq!(state.count("User"), 1);
    }

    #[test]
    fn backlinks_follow_updates() {
        let registry = registry();
        let user = registry.resolve("User").unwrap().clone();
        let mut state = StoreState::default();
        let p1 = post(&mut state, &registry, "one");
        let p2 = post(&mut state, &registry, "two");

        let u = state
            .insert(
                &registry,
                &user,
                fields(vec![
                    ("name", Value::from("ann")),
                    ("posts", Value::List(vec![Value::Link(p1)])),
                ]),
            )
            .unwrap();
        assert_eq!(state.backlinks(p1, "User", "posts").len(), 1);

        let changed = state
            .update(
                &registry,
                &user,
                u,
                fields(vec![("posts", Value::List(vec![Value::Link(p2)]))]),
            )
            .unwrap();
        assert!(changed);
        assert!(state.backlinks(p1, "User", "posts").is_empty());
        assert_eq!(state.backlinks(p2, "User", "posts")[0].id, u);
    }

    #[test]
    fn remove_clears_inbound_links() {
        let registry = registry();
        let user = registry.resolve("User").unwrap().clone();
        let post_schema = registry.resolve("Post").unwrap().clone();
        let mut state = StoreState::default();
        let p1 = post(&mut state, &registry, "one");
        let p2 = post(&mut state, &registry, "two");
        let u = state
            .insert(
                &registry,
                &user,
                fields(vec![
                    ("name", Value::from("ann")),
                    ("posts", Value::List(vec![Value::Link(p1), Value::Link(p2), Value::Link(p1)])),
                    ("pinned", Value::Link(p1)),
                ]),
            )
            .unwrap();

        let removed = state.remove(&registry, &post_schema, p1).unwrap();
        assert_eq!(removed.unlinked, vec![("User".to_string(), u)]);

        let record = state.get("User", u).unwrap();
        assert_eq!(record.get("posts"), Some(&Value::List(vec![Value::Link(p2)])));
        assert_eq!(record.get("pinned"), Some(&Value::Null));
        assert!(matches!(
            state.remove(&registry, &post_schema, p1),
            Err(CoreError::DanglingReference { .. })
        ));
    }

    #[test]
    fn primary_key_is_immutable() {
        let registry = registry();
        let user = registry.resolve("User").unwrap().clone();
        let mut state = StoreState::default();
        let u = state
            .insert(&registry, &user, fields(vec![("name", Value::from("ann"))]))
            .unwrap();

        let unchanged = state
            .update(&registry, &user, u, fields(vec![("name", Value::from("ann"))]))
            .unwrap();
        assert!(!unchanged);
        assert!(state
            .update(&registry, &user, u, fields(vec![("name", Value::from("bob"))]))
            .is_err());
    }

    #[test]
    fn clones_share_nothing_after_write() {
        let registry = registry();
        let mut state = StoreState::default();
        post(&mut state, &registry, "one");
        let before = state.clone();
        post(&mut state, &registry, "two");
        assert_eq!(before.count("Post"), 1);
        assert_eq!(state.count("Post"), 2);
        assert_eq!(state.total_count(), 2);
    }
}

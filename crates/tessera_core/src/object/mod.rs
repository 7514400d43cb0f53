//! Object identity and live object handles.

mod id;

pub use id::ObjectId;

use crate::database::DatabaseInner;
use crate::error::{CoreError, CoreResult};
use crate::schema::{ObjectSchema, PropertyKind};
use crate::store::{Record, Snapshot};
use crate::value::{Fields, PrimaryKey, Value};
use std::fmt;
use std::sync::Arc;

/// Handle to a stored object.
///
/// A handle does not hold data: every accessor reads the current state
/// (the open transaction's state on the writing thread, the latest commit
/// elsewhere). Once the object is deleted, accessors fail with
/// [`CoreError::DanglingReference`].
#[derive(Clone)]
pub struct Object {
    db: Arc<DatabaseInner>,
    object_type: Arc<str>,
    id: ObjectId,
}

impl Object {
    pub(crate) fn new(db: Arc<DatabaseInner>, object_type: impl Into<Arc<str>>, id: ObjectId) -> Self {
        Self {
            db,
            object_type: object_type.into(),
            id,
        }
    }

    /// Returns the object's identity.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the object type name.
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Returns true if the object still exists.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.db
            .view()
            .is_ok_and(|snap| snap.state.contains(&self.object_type, self.id))
    }

    /// Returns the primary key value, if the type declares one.
    pub fn primary_key(&self) -> CoreResult<Option<PrimaryKey>> {
        let snap = self.db.view()?;
        Ok(self.record(&snap)?.primary_key.clone())
    }

    /// Reads a property.
    ///
    /// Links read as [`Value::Link`], collections as [`Value::List`], and
    /// `linkingObjects` properties as a list of links to the current
    /// sources.
    pub fn get(&self, property: &str) -> CoreResult<Value> {
        let snap = self.db.view()?;
        let record = self.record(&snap)?;
        let schema = self.schema(&snap)?;
        let prop = schema
            .get_property(property)
            .ok_or_else(|| CoreError::unknown_property(&*self.object_type, property))?;

        if let PropertyKind::LinkingObjects {
            object_type,
            property: source_property,
        } = snap.registry.kind_of(prop)
        {
            let sources = snap.state.backlinks(self.id, object_type, source_property);
            return Ok(Value::List(sources.iter().map(|r| Value::Link(r.id)).collect()));
        }
        Ok(record.get(property).cloned().unwrap_or(Value::Null))
    }

    /// Reads all stored properties.
    pub fn values(&self) -> CoreResult<Fields> {
        let snap = self.db.view()?;
        Ok(self.record(&snap)?.values.clone())
    }

    /// Follows a single link. Returns `None` for an unset link.
    pub fn get_link(&self, property: &str) -> CoreResult<Option<Object>> {
        let snap = self.db.view()?;
        let record = self.record(&snap)?;
        let schema = self.schema(&snap)?;
        let prop = schema
            .get_property(property)
            .ok_or_else(|| CoreError::unknown_property(&*self.object_type, property))?;

        match snap.registry.kind_of(prop) {
            PropertyKind::Link(target) if !prop.is_collection() => Ok(record
                .get(property)
                .and_then(Value::as_link)
                .map(|id| Object::new(Arc::clone(&self.db), target, id))),
            _ => Err(CoreError::validation(
                &*self.object_type,
                property,
                "not a single link property",
            )),
        }
    }

    /// Returns the objects referenced by a link, list of links or
    /// `linkingObjects` property, in stored order.
    pub fn get_objects(&self, property: &str) -> CoreResult<Vec<Object>> {
        let snap = self.db.view()?;
        let record = self.record(&snap)?;
        let schema = self.schema(&snap)?;
        let prop = schema
            .get_property(property)
            .ok_or_else(|| CoreError::unknown_property(&*self.object_type, property))?;

        match snap.registry.kind_of(prop) {
            PropertyKind::Link(target) => {
                let ids: Vec<ObjectId> = match record.get(property) {
                    Some(Value::List(items)) => items.iter().filter_map(Value::as_link).collect(),
                    Some(Value::Link(id)) => vec![*id],
                    _ => Vec::new(),
                };
                Ok(ids
                    .into_iter()
                    .map(|id| Object::new(Arc::clone(&self.db), target, id))
                    .collect())
            }
            PropertyKind::LinkingObjects {
                object_type,
                property: source_property,
            } => Ok(self.wrap(&snap, object_type, source_property)),
            _ => Err(CoreError::validation(
                &*self.object_type,
                property,
                "not a link property",
            )),
        }
    }

    /// Returns every object of `object_type` whose `property` links here.
    ///
    /// This is the `@links.<type>.<property>` relationship; no inverse
    /// property needs to be declared.
    pub fn linking_objects(&self, object_type: &str, property: &str) -> CoreResult<Vec<Object>> {
        let snap = self.db.view()?;
        self.record(&snap)?;
        let source = snap.registry.resolve(object_type)?;
        let links_here = source
            .get_property(property)
            .is_some_and(|p| snap.registry.kind_of(p) == PropertyKind::Link(&*self.object_type));
        if !links_here {
            return Err(CoreError::unknown_property(object_type, property));
        }
        Ok(self.wrap(&snap, object_type, property))
    }

    fn wrap(&self, snap: &Snapshot, object_type: &str, property: &str) -> Vec<Object> {
        let source_type: Arc<str> = Arc::from(object_type);
        snap.state
            .backlinks(self.id, object_type, property)
            .into_iter()
            .map(|r| Object::new(Arc::clone(&self.db), Arc::clone(&source_type), r.id))
            .collect()
    }

    fn record<'s>(&self, snap: &'s Snapshot) -> CoreResult<&'s Arc<Record>> {
        snap.state
            .get(&self.object_type, self.id)
            .ok_or_else(|| CoreError::dangling(&*self.object_type, self.id))
    }

    fn schema<'s>(&self, snap: &'s Snapshot) -> CoreResult<&'s Arc<ObjectSchema>> {
        snap.registry.resolve(&self.object_type)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.object_type == other.object_type
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.object_type)
            .field("id", &self.id)
            .finish()
    }
}

impl From<&Object> for Value {
    fn from(object: &Object) -> Self {
        Value::Link(object.id)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Link(object.id)
    }
}

//! Schema changes on an open database.
//!
//! A new set of object types is compared with the registered one, type by
//! type and property by property. Changes that existing objects can absorb
//! are applied directly:
//! - new object types
//! - new properties that may be empty (optional values, links,
//!   collections, `linkingObjects`)
//! - removed `linkingObjects` properties
//! - making a required property optional
//!
//! Everything else is *breaking* for a type that already holds objects.
//! Under [`MigrationPolicy::Strict`] a breaking change fails with
//! [`CoreError::MigrationRequired`]; under
//! [`MigrationPolicy::ResetOnMismatch`] the objects of every affected type
//! are deleted first. The whole change is applied as one commit.

use crate::config::MigrationPolicy;
use crate::error::{CoreError, CoreResult};
use crate::schema::{ObjectSchema, PropertyDef, PropertyKind, SchemaRegistry};
use crate::store::{Snapshot, StoreState};
use crate::transaction::{delete_in, ChangeLog};
use crate::types::SchemaVersion;
use crate::value::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// One difference between two schema versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// A new object type.
    AddType {
        /// Type name.
        object_type: String,
    },
    /// An object type that is no longer declared.
    RemoveType {
        /// Type name.
        object_type: String,
    },
    /// A new property.
    AddProperty {
        /// Owning type.
        object_type: String,
        /// Property name.
        property: String,
        /// Whether existing objects would need a value supplied.
        requires_value: bool,
    },
    /// A property that is no longer declared.
    RemoveProperty {
        /// Owning type.
        object_type: String,
        /// Property name.
        property: String,
        /// Whether the property held stored data.
        stored: bool,
    },
    /// A property whose type, optionality or container changed.
    ChangeProperty {
        /// Owning type.
        object_type: String,
        /// Property name.
        property: String,
        /// Previous compact type.
        from: String,
        /// New compact type.
        to: String,
    },
    /// The primary key or the embedded flag of a type changed.
    ChangeIdentity {
        /// Type name.
        object_type: String,
    },
}

impl SchemaChange {
    /// The object type the change applies to.
    #[must_use]
    pub fn object_type(&self) -> &str {
        match self {
            Self::AddType { object_type }
            | Self::RemoveType { object_type }
            | Self::AddProperty { object_type, .. }
            | Self::RemoveProperty { object_type, .. }
            | Self::ChangeProperty { object_type, .. }
            | Self::ChangeIdentity { object_type } => object_type,
        }
    }

    /// Returns true if existing objects of the type cannot be kept as they
    /// are.
    #[must_use]
    pub fn is_breaking(&self) -> bool {
        match self {
            Self::AddType { .. } => false,
            Self::AddProperty { requires_value, .. } => *requires_value,
            Self::RemoveProperty { stored, .. } => *stored,
            Self::RemoveType { .. } | Self::ChangeProperty { .. } | Self::ChangeIdentity { .. } => {
                true
            }
        }
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddType { object_type } => write!(f, "add type '{object_type}'"),
            Self::RemoveType { object_type } => write!(f, "remove type '{object_type}'"),
            Self::AddProperty {
                object_type,
                property,
                ..
            } => write!(f, "add property '{object_type}.{property}'"),
            Self::RemoveProperty {
                object_type,
                property,
                ..
            } => write!(f, "remove property '{object_type}.{property}'"),
            Self::ChangeProperty {
                object_type,
                property,
                from,
                to,
            } => write!(f, "change '{object_type}.{property}' from {from} to {to}"),
            Self::ChangeIdentity { object_type } => {
                write!(f, "change primary key or embedding of '{object_type}'")
            }
        }
    }
}

/// The differences between the registered schema and a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Version being replaced.
    pub from_version: SchemaVersion,
    /// Version being installed.
    pub to_version: SchemaVersion,
    /// Every detected change.
    pub changes: Vec<SchemaChange>,
    /// Types whose objects were deleted to apply the plan.
    pub reset_types: Vec<String>,
}

impl MigrationPlan {
    /// Compares two registries.
    #[must_use]
    pub fn diff(current: &SchemaRegistry, next: &SchemaRegistry) -> Self {
        let mut changes = Vec::new();

        for old in current.iter() {
            match next.get(&old.name) {
                None => changes.push(SchemaChange::RemoveType {
                    object_type: old.name.clone(),
                }),
                Some(new) => diff_type(next, old, new, &mut changes),
            }
        }
        for new in next.iter() {
            if current.get(&new.name).is_none() {
                changes.push(SchemaChange::AddType {
                    object_type: new.name.clone(),
                });
            }
        }

        Self {
            from_version: current.version(),
            to_version: next.version(),
            changes,
            reset_types: Vec::new(),
        }
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Breaking changes to types that hold objects in `state`.
    pub(crate) fn conflicts<'a>(&'a self, state: &'a StoreState) -> impl Iterator<Item = &'a SchemaChange> {
        self.changes
            .iter()
            .filter(move |c| c.is_breaking() && state.count(c.object_type()) > 0)
    }
}

fn diff_type(next: &SchemaRegistry, old: &ObjectSchema, new: &ObjectSchema, changes: &mut Vec<SchemaChange>) {
    if old.primary_key != new.primary_key || old.embedded != new.embedded {
        changes.push(SchemaChange::ChangeIdentity {
            object_type: old.name.clone(),
        });
    }

    for prop in &old.properties {
        match new.get_property(&prop.name) {
            None => changes.push(SchemaChange::RemoveProperty {
                object_type: old.name.clone(),
                property: prop.name.clone(),
                stored: !prop.is_computed(),
            }),
            Some(updated) if updated != prop && !relaxes(prop, updated) => {
                changes.push(SchemaChange::ChangeProperty {
                    object_type: old.name.clone(),
                    property: prop.name.clone(),
                    from: prop.type_spec(),
                    to: updated.type_spec(),
                });
            }
            Some(_) => {}
        }
    }

    for prop in &new.properties {
        if old.get_property(&prop.name).is_none() {
            changes.push(SchemaChange::AddProperty {
                object_type: old.name.clone(),
                property: prop.name.clone(),
                requires_value: default_value(next, prop).is_none(),
            });
        }
    }
}

/// A required property becoming optional keeps every stored value valid.
fn relaxes(old: &PropertyDef, new: &PropertyDef) -> bool {
    !old.optional
        && new.optional
        && old.property_type == new.property_type
        && old.collection == new.collection
}

/// Value given to existing objects for a new property, if it has one.
fn default_value(registry: &SchemaRegistry, prop: &PropertyDef) -> Option<Option<Value>> {
    if prop.is_computed() {
        return Some(None);
    }
    if prop.is_collection() {
        return Some(Some(Value::List(Vec::new())));
    }
    match registry.kind_of(prop) {
        PropertyKind::Link(_) => Some(Some(Value::Null)),
        _ if prop.optional => Some(Some(Value::Null)),
        _ => None,
    }
}

/// Installs `next` into the working snapshot.
pub(crate) fn apply(
    snapshot: &mut Snapshot,
    changes: &mut ChangeLog,
    next: SchemaRegistry,
    policy: MigrationPolicy,
) -> CoreResult<MigrationPlan> {
    let current = Arc::clone(&snapshot.registry);
    if next.version() < current.version() {
        return Err(CoreError::schema(
            "",
            format!(
                "schema version {} is lower than the current version {}",
                next.version(),
                current.version()
            ),
        ));
    }

    let mut plan = MigrationPlan::diff(&current, &next);
    let conflicting: BTreeSet<String> = plan
        .conflicts(&snapshot.state)
        .map(|c| c.object_type().to_string())
        .collect();

    if !conflicting.is_empty() {
        match policy {
            MigrationPolicy::Strict => {
                let first = plan
                    .conflicts(&snapshot.state)
                    .next()
                    .map(|c| (c.object_type().to_string(), c.to_string()));
                let (object_type, message) = first.unwrap_or_default();
                return Err(CoreError::migration_required(object_type, message));
            }
            MigrationPolicy::ResetOnMismatch => {
                for object_type in &conflicting {
                    let ids: Vec<_> = snapshot.state.scan(object_type).map(|r| r.id).collect();
                    for id in ids {
                        delete_in(snapshot, changes, object_type, id)?;
                    }
                }
                plan.reset_types = conflicting.into_iter().collect();
            }
        }
    }

    for change in &plan.changes {
        if let SchemaChange::AddProperty {
            object_type,
            property,
            ..
        } = change
        {
            let default = next
                .get(object_type)
                .and_then(|s| s.get_property(property))
                .and_then(|p| default_value(&next, p))
                .flatten();
            if let Some(value) = default {
                snapshot.state.fill_missing(object_type, property, &value);
            }
        }
    }

    snapshot.registry = Arc::new(next);
    Ok(plan)
}

//! Schema registry.

use super::{CollectionKind, ObjectSchema, PropertyDef, PropertyType};
use crate::error::{CoreError, CoreResult};
use crate::types::SchemaVersion;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// How a property is stored, resolved against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind<'a> {
    /// Scalar value or collection of scalars.
    Primitive,
    /// Link (or collection of links) to a top-level type.
    Link(&'a str),
    /// Inline embedded object (or list of them).
    Embedded(&'a str),
    /// Computed inverse relationship.
    LinkingObjects {
        /// Source type.
        object_type: &'a str,
        /// Forward property on the source type.
        property: &'a str,
    },
}

/// Validated, immutable set of object types.
///
/// A registry is fixed for the lifetime of the store it was opened with;
/// schema changes install a new registry.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: SchemaVersion,
    schemas: BTreeMap<String, Arc<ObjectSchema>>,
}

impl SchemaRegistry {
    /// Validates and registers a batch of object types.
    ///
    /// Fails with [`CoreError::Schema`] naming the first conflicting type.
    pub fn new(version: SchemaVersion, schemas: Vec<ObjectSchema>) -> CoreResult<Self> {
        let mut map = BTreeMap::new();
        for schema in schemas {
            if schema.name.is_empty() {
                return Err(CoreError::schema("", "object type name must not be empty"));
            }
            if map.contains_key(&schema.name) {
                return Err(CoreError::schema(
                    &schema.name,
                    "object type is declared more than once",
                ));
            }
            map.insert(schema.name.clone(), Arc::new(schema));
        }

        let registry = Self {
            version,
            schemas: map,
        };
        for schema in registry.schemas.values() {
            registry.validate_schema(schema)?;
        }
        Ok(registry)
    }

    /// Returns the schema version.
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Resolves an object type by name.
    pub fn resolve(&self, name: &str) -> CoreResult<&Arc<ObjectSchema>> {
        self.schemas
            .get(name)
            .ok_or_else(|| CoreError::unknown_object_type(name))
    }

    /// Looks up an object type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ObjectSchema>> {
        self.schemas.get(name)
    }

    /// Iterates over all registered types, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ObjectSchema>> {
        self.schemas.values()
    }

    /// Iterates over top-level (non-embedded) types.
    pub fn top_level(&self) -> impl Iterator<Item = &Arc<ObjectSchema>> {
        self.schemas.values().filter(|s| !s.embedded)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Classifies a property of a registered type.
    #[must_use]
    pub fn kind_of<'a>(&self, property: &'a PropertyDef) -> PropertyKind<'a> {
        match &property.property_type {
            PropertyType::Object(target) => {
                if self.get(target).is_some_and(|s| s.embedded) {
                    PropertyKind::Embedded(target)
                } else {
                    PropertyKind::Link(target)
                }
            }
            PropertyType::LinkingObjects {
                object_type,
                property,
            } => PropertyKind::LinkingObjects {
                object_type,
                property,
            },
            _ => PropertyKind::Primitive,
        }
    }

    /// Finds every `(source type, property)` that links to `target`.
    #[must_use]
    pub fn inbound_links(&self, target: &str) -> Vec<(Arc<ObjectSchema>, String)> {
        let mut out = Vec::new();
        for schema in self.schemas.values() {
            for prop in &schema.properties {
                if matches!(self.kind_of(prop), PropertyKind::Link(t) if t == target) {
                    out.push((Arc::clone(schema), prop.name.clone()));
                }
            }
        }
        out
    }

    fn validate_schema(&self, schema: &ObjectSchema) -> CoreResult<()> {
        let fail = |msg: String| Err(CoreError::schema(&schema.name, msg));

        let mut seen = HashSet::new();
        for prop in &schema.properties {
            if prop.name.is_empty() || prop.name.starts_with('@') || prop.name.contains('.') {
                return fail(format!("invalid property name '{}'", prop.name));
            }
            if !seen.insert(prop.name.as_str()) {
                return fail(format!("duplicate property '{}'", prop.name));
            }
            self.validate_property(schema, prop)?;
        }

        match (&schema.primary_key, schema.embedded) {
            (Some(_), true) => fail("embedded object types cannot declare a primary key".into()),
            (Some(pk), false) => match schema.get_property(pk) {
                None => fail(format!("primary key '{pk}' is not a declared property")),
                Some(p) if !p.property_type.is_indexable() || p.is_collection() => fail(format!(
                    "primary key '{pk}' must be a single int, string, uuid or objectId"
                )),
                Some(p) if p.optional => fail(format!("primary key '{pk}' cannot be optional")),
                Some(_) => Ok(()),
            },
            (None, _) => Ok(()),
        }
    }

    fn validate_property(&self, schema: &ObjectSchema, prop: &PropertyDef) -> CoreResult<()> {
        let fail = |msg: String| Err(CoreError::schema(&schema.name, msg));

        match &prop.property_type {
            PropertyType::Object(target) => {
                let Some(target_schema) = self.get(target) else {
                    return fail(format!(
                        "property '{}' references unknown type '{target}'",
                        prop.name
                    ));
                };
                if target_schema.embedded {
                    if prop.collection == Some(CollectionKind::Set) {
                        return fail(format!(
                            "property '{}' cannot be a set of embedded objects",
                            prop.name
                        ));
                    }
                } else {
                    if schema.embedded {
                        return fail(format!(
                            "embedded type cannot link to top-level type '{target}'"
                        ));
                    }
                    if prop.is_collection() && prop.optional {
                        return fail(format!(
                            "collection of links '{}' cannot have optional elements",
                            prop.name
                        ));
                    }
                }
                Ok(())
            }
            PropertyType::LinkingObjects {
                object_type,
                property,
            } => {
                if schema.embedded {
                    return fail(format!(
                        "embedded type cannot declare linkingObjects '{}'",
                        prop.name
                    ));
                }
                if prop.is_collection() || prop.optional {
                    return fail(format!(
                        "linkingObjects '{}' cannot carry collection or optional markers",
                        prop.name
                    ));
                }
                let Some(source) = self.get(object_type).filter(|s| !s.embedded) else {
                    return fail(format!(
                        "linkingObjects '{}' names unknown top-level type '{object_type}'",
                        prop.name
                    ));
                };
                match source.get_property(property) {
                    Some(fwd) if fwd.property_type == PropertyType::Object(schema.name.clone()) => {
                        Ok(())
                    }
                    _ => fail(format!(
                        "linkingObjects '{}' requires '{object_type}.{property}' to link to '{}'",
                        prop.name, schema.name
                    )),
                }
            }
            _ => Ok(()),
        }
    }
}

//! Object type definitions and the schema registry.
//!
//! Object types are declared up front and validated as a batch, so types in
//! the same batch may reference each other in any order.

mod property;
mod registry;

pub use property::{CollectionKind, PropertyDef, PropertyType};
pub use registry::{PropertyKind, SchemaRegistry};

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Definition of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSchema {
    /// Type name, unique within a registry.
    pub name: String,
    /// Name of the primary key property, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Embedded types live inline inside their owner.
    #[serde(default)]
    pub embedded: bool,
    /// Properties in declaration order.
    pub properties: Vec<PropertyDef>,
}

impl ObjectSchema {
    /// Creates an empty top-level object type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
            embedded: false,
            properties: Vec::new(),
        }
    }

    /// Builds a schema from `(name, type)` pairs in compact notation.
    ///
    /// ```
    /// use tessera_core::ObjectSchema;
    ///
    /// let character = ObjectSchema::from_shorthand(
    ///     "Character",
    ///     Some("_id"),
    ///     &[("_id", "objectId"), ("name", "string"), ("levelsCompleted", "int<>")],
    /// )
    /// .unwrap();
    /// assert_eq!(character.properties.len(), 3);
    /// ```
    pub fn from_shorthand(
        name: impl Into<String>,
        primary_key: Option<&str>,
        properties: &[(&str, &str)],
    ) -> CoreResult<Self> {
        let mut schema = Self::new(name);
        schema.primary_key = primary_key.map(str::to_string);
        for (prop, spec) in properties {
            let def = PropertyDef::parse(*prop, spec)
                .map_err(|msg| CoreError::schema(&schema.name, msg))?;
            schema.properties.push(def);
        }
        Ok(schema)
    }

    /// Sets the primary key property.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    /// Marks the type as embedded.
    #[must_use]
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    /// Appends a property.
    #[must_use]
    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the primary key definition, if one is declared.
    #[must_use]
    pub fn primary_key_property(&self) -> Option<&PropertyDef> {
        self.primary_key
            .as_deref()
            .and_then(|pk| self.get_property(pk))
    }

    /// Iterates over stored (non-computed) properties.
    pub fn stored_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| !p.is_computed())
    }
}

//! Property definitions and the compact type notation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// `bool`
    Bool,
    /// `int`
    Int,
    /// `double`
    Double,
    /// `string`
    String,
    /// `date`
    Date,
    /// `uuid`
    Uuid,
    /// `objectId`
    ObjectId,
    /// Another object type. A link when the target is a top-level type,
    /// inline storage when the target is embedded.
    Object(String),
    /// Computed inverse of `property` on `object_type`.
    LinkingObjects {
        /// Type whose property points at this one.
        object_type: String,
        /// The forward property on `object_type`.
        property: String,
    },
}

impl PropertyType {
    /// Returns true for scalar types that are stored by value.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Object(_) | Self::LinkingObjects { .. })
    }

    /// Returns true for types that may serve as a primary key.
    #[must_use]
    pub fn is_indexable(&self) -> bool {
        matches!(self, Self::Int | Self::String | Self::Uuid | Self::ObjectId)
    }

    fn parse_base(base: &str) -> Option<Self> {
        let ty = match base {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "double" | "float" => Self::Double,
            "string" => Self::String,
            "date" => Self::Date,
            "uuid" => Self::Uuid,
            "objectId" => Self::ObjectId,
            other if is_identifier(other) => Self::Object(other.to_string()),
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Double => f.write_str("double"),
            Self::String => f.write_str("string"),
            Self::Date => f.write_str("date"),
            Self::Uuid => f.write_str("uuid"),
            Self::ObjectId => f.write_str("objectId"),
            Self::Object(name) => f.write_str(name),
            Self::LinkingObjects {
                object_type,
                property,
            } => write!(f, "linkingObjects<{object_type}.{property}>"),
        }
    }
}

/// Container kind of a collection-valued property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Ordered, duplicates allowed (`[]`).
    List,
    /// Insertion-ordered, duplicates removed (`<>`).
    Set,
}

/// Definition of one property of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProperty", into = "RawProperty")]
pub struct PropertyDef {
    /// Property name, unique within its object type.
    pub name: String,
    /// Declared type (the element type for collections).
    pub property_type: PropertyType,
    /// Container kind, if the property holds a collection.
    pub collection: Option<CollectionKind>,
    /// Whether the value (or each element) may be null.
    pub optional: bool,
}

impl PropertyDef {
    /// Creates a required, single-valued property.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            collection: None,
            optional: false,
        }
    }

    /// Creates a single link to another object type.
    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Object(target.into())).optional()
    }

    /// Creates a computed inverse of `object_type.property`.
    pub fn linking_objects(
        name: impl Into<String>,
        object_type: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            PropertyType::LinkingObjects {
                object_type: object_type.into(),
                property: property.into(),
            },
        )
    }

    /// Parses the compact notation, e.g. `int`, `string?`, `Person[]`,
    /// `int<>` or `linkingObjects<User.posts>`.
    pub fn parse(name: impl Into<String>, spec: &str) -> Result<Self, String> {
        let name = name.into();
        let spec = spec.trim();

        if let Some(inner) = spec
            .strip_prefix("linkingObjects<")
            .and_then(|s| s.strip_suffix('>'))
        {
            let (object_type, property) = inner
                .split_once('.')
                .filter(|(t, p)| is_identifier(t) && is_identifier(p))
                .ok_or_else(|| format!("malformed linkingObjects type '{spec}'"))?;
            return Ok(Self::linking_objects(name, object_type, property));
        }

        let (rest, collection) = if let Some(rest) = spec.strip_suffix("[]") {
            (rest, Some(CollectionKind::List))
        } else if let Some(rest) = spec.strip_suffix("<>") {
            (rest, Some(CollectionKind::Set))
        } else {
            (spec, None)
        };
        let (base, optional) = match rest.strip_suffix('?') {
            Some(base) => (base, true),
            None => (rest, false),
        };
        let property_type =
            PropertyType::parse_base(base).ok_or_else(|| format!("unknown type '{spec}'"))?;

        Ok(Self {
            name,
            property_type,
            collection,
            optional,
        })
    }

    /// Marks the property optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Makes the property a list of its type.
    #[must_use]
    pub fn list(mut self) -> Self {
        self.collection = Some(CollectionKind::List);
        self
    }

    /// Makes the property a set of its type.
    #[must_use]
    pub fn set(mut self) -> Self {
        self.collection = Some(CollectionKind::Set);
        self
    }

    /// Returns true if the property holds a collection.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    /// Returns true if the property is computed rather than stored.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(self.property_type, PropertyType::LinkingObjects { .. })
    }

    /// Renders the compact notation for this property.
    #[must_use]
    pub fn type_spec(&self) -> String {
        let mut spec = self.property_type.to_string();
        if self.optional {
            spec.push('?');
        }
        match self.collection {
            Some(CollectionKind::List) => spec.push_str("[]"),
            Some(CollectionKind::Set) => spec.push_str("<>"),
            None => {}
        }
        spec
    }
}

#[derive(Serialize, Deserialize)]
struct RawProperty {
    name: String,
    #[serde(rename = "type")]
    type_spec: String,
}

impl TryFrom<RawProperty> for PropertyDef {
    type Error = String;

    fn try_from(raw: RawProperty) -> Result<Self, Self::Error> {
        PropertyDef::parse(raw.name, &raw.type_spec)
    }
}

impl From<PropertyDef> for RawProperty {
    fn from(def: PropertyDef) -> Self {
        Self {
            type_spec: def.type_spec(),
            name: def.name,
        }
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_primitives() {
        let p = PropertyDef::parse("age", "int").unwrap();
        assert_eq!(p.property_type, PropertyType::Int);
        assert!(!p.optional);
        assert!(p.collection.is_none());

        let p = PropertyDef::parse("email", "string?").unwrap();
        assert!(p.optional);
    }

    #[test]
    fn parse_collections() {
        let p = PropertyDef::parse("levelsCompleted", "int<>").unwrap();
        assert_eq!(p.collection, Some(CollectionKind::Set));
        assert_eq!(p.property_type, PropertyType::Int);

        let p = PropertyDef::parse("posts", "Post[]").unwrap();
        assert_eq!(p.collection, Some(CollectionKind::List));
        assert_eq!(p.property_type, PropertyType::Object("Post".into()));

        let p = PropertyDef::parse("scores", "double?[]").unwrap();
        assert!(p.optional);
        assert_eq!(p.type_spec(), "double?[]");
    }

    #[test]
    fn parse_linking_objects() {
        let p = PropertyDef::parse("author", "linkingObjects<User.posts>").unwrap();
        assert!(p.is_computed());
        assert_eq!(p.type_spec(), "linkingObjects<User.posts>");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(PropertyDef::parse("x", "9lives").is_err());
        assert!(PropertyDef::parse("x", "linkingObjects<User>").is_err());
        assert!(PropertyDef::parse("x", "").is_err());
    }

    #[test]
    fn serde_uses_compact_notation() {
        let p = PropertyDef::parse("inventory", "string<>").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"name":"inventory","type":"string<>"}"#);
        let back: PropertyDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}

//! JSON fixture files.
//!
//! A fixture declares object types and the objects to load into a fresh
//! in-memory database:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "schema": [
//!     { "name": "Person", "primaryKey": "name",
//!       "properties": [{ "name": "name", "type": "string" }] },
//!     { "name": "Task", "primaryKey": "_id",
//!       "properties": [{ "name": "_id", "type": "int" },
//!                      { "name": "assignee", "type": "Person?" }] }
//!   ],
//!   "objects": [
//!     { "type": "Person", "values": { "name": "Ann" } },
//!     { "type": "Task", "values": { "_id": 1, "assignee": { "$ref": "Ann" } } }
//!   ]
//! }
//! ```
//!
//! Links are written as `{"$ref": <primary key>}` and must point at an
//! object listed earlier in the file. Dates accept RFC 3339 or
//! `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value as Json};
use std::path::Path;
use tessera_core::{
    Config, CoreError, Database, Fields, Object, ObjectId, ObjectSchema, PrimaryKey, PropertyDef,
    PropertyKind, PropertyType, SchemaRegistry, SchemaVersion, Timestamp, Value,
};
use thiserror::Error;
use uuid::Uuid;
use tracing::{debug, info};

/// Errors raised while loading a fixture.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the fixture.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a well-formed fixture.
    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The database rejected the schema or an object.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A JSON value does not fit its property.
    #[error("object #{index} ({object_type}): {message}")]
    Value {
        /// Position of the object in the file.
        index: usize,
        /// Type of the object.
        object_type: String,
        /// What went wrong.
        message: String,
    },
}

/// Result type for fixture operations.
pub type FixtureResult<T> = Result<T, FixtureError>;

/// A parsed fixture file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Version of the declared schema.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Object types.
    pub schema: Vec<ObjectSchema>,
    /// Objects to load, in order.
    #[serde(default)]
    pub objects: Vec<FixtureObject>,
}

/// One object in a fixture.
#[derive(Debug, Deserialize)]
pub struct FixtureObject {
    /// Object type name.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Property values.
    #[serde(default)]
    pub values: Map<String, Json>,
}

impl Fixture {
    /// Reads a fixture from a file.
    pub fn from_path(path: &Path) -> FixtureResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parses a fixture.
    pub fn from_json(text: &str) -> FixtureResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validates the declared object types.
    pub fn registry(&self) -> FixtureResult<SchemaRegistry> {
        Ok(SchemaRegistry::new(self.schema_version, self.schema.clone())?)
    }

    /// Opens an in-memory database with the fixture's types and objects.
    pub fn open(&self) -> FixtureResult<Database> {
        let db = Database::open(
            Config::new()
                .schema(self.schema.clone())
                .schema_version(self.schema_version),
        )?;
        let loaded = self.load_into(&db)?;
        info!(objects = loaded, "loaded fixture");
        Ok(db)
    }

    /// Creates every object of the fixture in one transaction. Nothing is
    /// created if any object fails.
    pub fn load_into(&self, db: &Database) -> FixtureResult<usize> {
        let registry = db.schema()?;
        let mut txn = db.begin_write()?;

        for (index, object) in self.objects.iter().enumerate() {
            let context = |message: String| FixtureError::Value {
                index,
                object_type: object.object_type.clone(),
                message,
            };
            let schema = registry.resolve(&object.object_type)?;
            let values = {
                let resolve = |target: &str, key: &Json| -> Result<ObjectId, String> {
                    let key = primary_key(&registry, target, key)?;
                    match txn.object(target, key.clone()) {
                        Ok(Some(found)) => Ok(found.id()),
                        Ok(None) => Err(format!("no {target} with primary key {key}")),
                        Err(err) => Err(err.to_string()),
                    }
                };
                fields(&registry, schema, &object.values, &resolve).map_err(context)?
            };
            txn.create(&object.object_type, values)?;
            debug!(index, object_type = %object.object_type, "created fixture object");
        }

        txn.commit()?;
        Ok(self.objects.len())
    }
}

type Resolver<'a> = dyn Fn(&str, &Json) -> Result<ObjectId, String> + 'a;

fn fields(
    registry: &SchemaRegistry,
    schema: &ObjectSchema,
    values: &Map<String, Json>,
    resolve: &Resolver<'_>,
) -> Result<Fields, String> {
    let mut out = Fields::new();
    for (name, json) in values {
        let prop = schema
            .get_property(name)
            .ok_or_else(|| format!("unknown property '{name}'"))?;
        let value = property_value(registry, prop, json, resolve)
            .map_err(|message| format!("property '{name}': {message}"))?;
        out.insert(name.clone(), value);
    }
    Ok(out)
}

fn property_value(
    registry: &SchemaRegistry,
    prop: &PropertyDef,
    json: &Json,
    resolve: &Resolver<'_>,
) -> Result<Value, String> {
    if prop.is_computed() {
        return Err("computed properties cannot be loaded".into());
    }
    if !prop.is_collection() {
        return element(registry, prop, json, resolve);
    }
    match json {
        Json::Null => Ok(Value::List(Vec::new())),
        Json::Array(items) => items
            .iter()
            .map(|item| element(registry, prop, item, resolve))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        other => Err(format!("expected an array, got {other}")),
    }
}

fn element(
    registry: &SchemaRegistry,
    prop: &PropertyDef,
    json: &Json,
    resolve: &Resolver<'_>,
) -> Result<Value, String> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    match registry.kind_of(prop) {
        PropertyKind::Embedded(target) => {
            let schema = registry
                .get(target)
                .ok_or_else(|| format!("unknown embedded type '{target}'"))?;
            let Json::Object(map) = json else {
                return Err(format!("expected an object for '{target}', got {json}"));
            };
            return fields(registry, schema, map, resolve).map(Value::Embedded);
        }
        PropertyKind::Link(target) => {
            let key = json
                .get("$ref")
                .ok_or_else(|| format!("expected {{\"$ref\": <primary key>}}, got {json}"))?;
            return resolve(target, key).map(Value::Link);
        }
        PropertyKind::Primitive | PropertyKind::LinkingObjects { .. } => {}
    }

    primitive(&prop.property_type, json)
        .ok_or_else(|| format!("expected {}, got {json}", prop.property_type))
}

fn primitive(ty: &PropertyType, json: &Json) -> Option<Value> {
    match ty {
        PropertyType::Bool => json.as_bool().map(Value::Bool),
        PropertyType::Int => json.as_i64().map(Value::Int),
        PropertyType::Double => json.as_f64().map(Value::Double),
        PropertyType::String => json.as_str().map(Value::from),
        PropertyType::Date => json.as_str().and_then(parse_date).map(Value::Date),
        PropertyType::Uuid => json
            .as_str()
            .and_then(|s| s.parse::<Uuid>().ok())
            .map(Value::Uuid),
        PropertyType::ObjectId => json
            .as_str()
            .and_then(|s| s.parse::<ObjectId>().ok())
            .map(Value::ObjectId),
        PropertyType::Object(_) | PropertyType::LinkingObjects { .. } => None,
    }
}

fn primary_key(registry: &SchemaRegistry, target: &str, json: &Json) -> Result<PrimaryKey, String> {
    let schema = registry.resolve(target).map_err(|e| e.to_string())?;
    let prop = schema
        .primary_key_property()
        .ok_or_else(|| format!("'{target}' has no primary key to reference"))?;
    primitive(&prop.property_type, json)
        .as_ref()
        .and_then(PrimaryKey::from_value)
        .ok_or_else(|| format!("invalid primary key {json} for '{target}'"))
}

/// Parses an RFC 3339 timestamp or a `YYYY-MM-DD` date.
pub fn parse_date(text: &str) -> Option<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Renders a value as JSON, writing links as `{"$ref": <object id>}`.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        Value::Double(d) => serde_json::Number::from_f64(*d).map_or(Json::Null, Json::Number),
        Value::String(s) => json!(s),
        Value::Date(d) => json!(d.to_rfc3339()),
        Value::Uuid(u) => json!(u.to_string()),
        Value::ObjectId(id) => json!(id.to_hex()),
        Value::Link(id) => json!({ "$ref": id.to_hex() }),
        Value::Embedded(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
    }
}

/// Renders an object in the fixture's object format.
pub fn object_to_json(object: &Object) -> FixtureResult<Json> {
    let values: Map<String, Json> = object
        .values()?
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    Ok(json!({ "type": object.object_type(), "id": object.id().to_hex(), "values": values }))
}

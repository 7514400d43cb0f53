//! Shape checks for values written to the store.
//!
//! Every value passes through here before it reaches a table, so a stored
//! record always matches its schema: required properties are present,
//! `int` arrives in `double` properties as a double, sets hold no
//! duplicates and links point at live objects of the declared type.

use super::StoreState;
use crate::error::{CoreError, CoreResult};
use crate::schema::{CollectionKind, ObjectSchema, PropertyDef, PropertyKind, PropertyType, SchemaRegistry};
use crate::value::{Fields, Value};

/// Checks a full set of property values for a new object (or a new
/// embedded object) and fills in defaults for omitted properties.
pub(crate) fn normalize_fields(
    registry: &SchemaRegistry,
    schema: &ObjectSchema,
    mut input: Fields,
    state: &StoreState,
) -> CoreResult<Fields> {
    let mut out = Fields::new();
    for prop in schema.stored_properties() {
        let value = match input.remove(&prop.name) {
            Some(value) => normalize_property(registry, schema, prop, value, state)?,
            None => default_value(registry, schema, prop)?,
        };
        out.insert(prop.name.clone(), value);
    }

    if let Some(name) = input.into_keys().next() {
        return Err(match schema.get_property(&name) {
            Some(_) => CoreError::validation(&schema.name, name, "computed property cannot be assigned"),
            None => CoreError::unknown_property(&schema.name, name),
        });
    }
    Ok(out)
}

/// Checks a value assigned to a single property.
pub(crate) fn normalize_property(
    registry: &SchemaRegistry,
    schema: &ObjectSchema,
    prop: &PropertyDef,
    value: Value,
    state: &StoreState,
) -> CoreResult<Value> {
    if prop.is_computed() {
        return Err(CoreError::validation(
            &schema.name,
            &prop.name,
            "computed property cannot be assigned",
        ));
    }

    let Some(kind) = prop.collection else {
        return normalize_element(registry, schema, prop, value, state);
    };

    let items = match value {
        Value::List(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(CoreError::validation(
                &schema.name,
                &prop.name,
                format!("expected a collection, got {}", other.kind()),
            ))
        }
    };

    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        let item = normalize_element(registry, schema, prop, item, state)?;
        if kind == CollectionKind::Set && out.iter().any(|e| e.loosely_equals(&item)) {
            continue;
        }
        out.push(item);
    }
    Ok(Value::List(out))
}

fn default_value(
    registry: &SchemaRegistry,
    schema: &ObjectSchema,
    prop: &PropertyDef,
) -> CoreResult<Value> {
    if prop.is_collection() {
        return Ok(Value::List(Vec::new()));
    }
    if prop.optional || matches!(registry.kind_of(prop), PropertyKind::Link(_)) {
        return Ok(Value::Null);
    }
    let message = if schema.primary_key.as_deref() == Some(prop.name.as_str()) {
        "missing primary key value"
    } else {
        "missing value for required property"
    };
    Err(CoreError::validation(&schema.name, &prop.name, message))
}

fn normalize_element(
    registry: &SchemaRegistry,
    schema: &ObjectSchema,
    prop: &PropertyDef,
    value: Value,
    state: &StoreState,
) -> CoreResult<Value> {
    let invalid = |message: String| CoreError::validation(&schema.name, &prop.name, message);
    let kind = registry.kind_of(prop);

    if value.is_null() {
        let nullable =
            prop.optional || (!prop.is_collection() && matches!(kind, PropertyKind::Link(_)));
        return if nullable {
            Ok(Value::Null)
        } else {
            Err(invalid("value is required".into()))
        };
    }

    match (&prop.property_type, value) {
        (PropertyType::Bool, v @ Value::Bool(_))
        | (PropertyType::Int, v @ Value::Int(_))
        | (PropertyType::Double, v @ Value::Double(_))
        | (PropertyType::String, v @ Value::String(_))
        | (PropertyType::Date, v @ Value::Date(_))
        | (PropertyType::Uuid, v @ Value::Uuid(_))
        | (PropertyType::ObjectId, v @ Value::ObjectId(_)) => Ok(v),
        #[allow(clippy::cast_precision_loss)]
        (PropertyType::Double, Value::Int(n)) => Ok(Value::Double(n as f64)),
        (PropertyType::Object(target), value) => match kind {
            PropertyKind::Embedded(_) => match value {
                Value::Embedded(fields) => {
                    let target_schema = registry.resolve(target)?;
                    Ok(Value::Embedded(normalize_fields(
                        registry,
                        target_schema,
                        fields,
                        state,
                    )?))
                }
                other => Err(invalid(format!(
                    "expected an embedded '{target}', got {}",
                    other.kind()
                ))),
            },
            _ => match value {
                Value::Link(id) | Value::ObjectId(id) => {
                    if state.contains(target, id) {
                        Ok(Value::Link(id))
                    } else {
                        Err(CoreError::dangling(target.as_str(), id))
                    }
                }
                other => Err(invalid(format!(
                    "expected a link to '{target}', got {}",
                    other.kind()
                ))),
            },
        },
        (ty, other) => Err(invalid(format!("expected {ty}, got {}", other.kind()))),
    }
}

//! Dynamic property values.

use crate::object::ObjectId;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Point in time stored by `date` properties.
pub type Timestamp = DateTime<Utc>;

/// Property values of an embedded object, keyed by property name.
pub type Fields = BTreeMap<String, Value>;

/// A dynamic property value.
///
/// Records store one `Value` per declared property. Links to other
/// top-level objects hold only the target's [`ObjectId`]; embedded objects
/// are stored inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value of an optional property, or an unset link.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Date and time (UTC).
    Date(Timestamp),
    /// UUID value.
    Uuid(Uuid),
    /// Object ID value (an `objectId` property, not a link).
    ObjectId(ObjectId),
    /// Reference to another top-level object.
    Link(ObjectId),
    /// Inline embedded object.
    Embedded(Fields),
    /// List or set contents, in insertion order.
    List(Vec<Value>),
}

impl Value {
    /// Returns a short name of the value's kind, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Uuid(_) => "uuid",
            Value::ObjectId(_) => "objectId",
            Value::Link(_) => "link",
            Value::Embedded(_) => "embedded object",
            Value::List(_) => "collection",
        }
    }

    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, widening integers.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    #[must_use]
    pub fn as_date(&self) -> Option<Timestamp> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Get the target of a link, if this value is one.
    #[must_use]
    pub fn as_link(&self) -> Option<ObjectId> {
        match self {
            Value::Link(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the elements of a collection value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the fields of an embedded object.
    #[must_use]
    pub fn as_embedded(&self) -> Option<&Fields> {
        match self {
            Value::Embedded(fields) => Some(fields),
            _ => None,
        }
    }

    /// Compares two values by natural ordering.
    ///
    /// Numbers compare numerically across `int` and `double`, strings
    /// lexicographically, dates chronologically. `null` is only equal to
    /// `null`. Values of unrelated kinds are incomparable.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Double(_), Value::Int(_) | Value::Double(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::ObjectId(a), Value::ObjectId(b)) | (Value::Link(a), Value::Link(b)) => {
                Some(a.cmp(b))
            }
            _ => None,
        }
    }

    /// Equality under natural ordering (`3 == 3.0`).
    #[must_use]
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Embedded(a), Value::Embedded(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d@%H:%M:%S")),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::ObjectId(id) => write!(f, "oid({id})"),
            Value::Link(id) => write!(f, "link({id})"),
            Value::Embedded(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Date(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<Fields> for Value {
    fn from(v: Fields) -> Self {
        Value::Embedded(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A primary key value.
///
/// Only `int`, `string`, `uuid` and `objectId` properties may be declared
/// as primary keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimaryKey {
    /// Integer key.
    Int(i64),
    /// String key.
    String(String),
    /// UUID key.
    Uuid(Uuid),
    /// Object ID key.
    ObjectId(ObjectId),
}

impl PrimaryKey {
    /// Extracts a key from a property value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(Self::Int(*n)),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Uuid(u) => Some(Self::Uuid(*u)),
            Value::ObjectId(id) => Some(Self::ObjectId(*id)),
            _ => None,
        }
    }

    /// Converts the key back into a property value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::Int(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Uuid(u) => Value::Uuid(*u),
            Self::ObjectId(id) => Value::ObjectId(*id),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::ObjectId(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Uuid> for PrimaryKey {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<ObjectId> for PrimaryKey {
    fn from(v: ObjectId) -> Self {
        Self::ObjectId(v)
    }
}

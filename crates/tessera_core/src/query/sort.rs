//! Sort specifications.

use super::keypath::KeyPath;
use super::parser::parse_key_path;
use crate::error::{CoreError, CoreResult};
use crate::schema::SchemaRegistry;
use crate::store::{Record, StoreState};
use crate::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// One sort key: a key path and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    /// Property name or dotted path through single links and embedded
    /// objects, e.g. `assignee.name`.
    pub key_path: String,
    /// Sort in descending order.
    pub descending: bool,
}

impl SortDescriptor {
    /// Ascending sort on `key_path`.
    pub fn ascending(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            descending: false,
        }
    }

    /// Descending sort on `key_path`.
    pub fn descending(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            descending: true,
        }
    }
}

/// Ordered sort keys; later keys break ties of earlier ones.
///
/// Objects that tie on every key keep their insertion order.
///
/// ```
/// use tessera_core::SortSpec;
///
/// let by_priority: SortSpec = vec![("priority", true), ("name", false)].into();
/// assert_eq!(by_priority.descriptors().len(), 2);
///
/// let by_name: SortSpec = "name".into();
/// assert!(!by_name.descriptors()[0].descending);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    descriptors: Vec<SortDescriptor>,
}

impl SortSpec {
    /// Creates an empty specification (insertion order).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a key.
    #[must_use]
    pub fn then(mut self, key_path: impl Into<String>, descending: bool) -> Self {
        self.descriptors.push(SortDescriptor {
            key_path: key_path.into(),
            descending,
        });
        self
    }

    /// Returns the keys, primary first.
    #[must_use]
    pub fn descriptors(&self) -> &[SortDescriptor] {
        &self.descriptors
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl From<&str> for SortSpec {
    fn from(key_path: &str) -> Self {
        Self::new().then(key_path, false)
    }
}

impl From<(&str, bool)> for SortSpec {
    fn from((key_path, descending): (&str, bool)) -> Self {
        Self::new().then(key_path, descending)
    }
}

impl From<&[(&str, bool)]> for SortSpec {
    fn from(keys: &[(&str, bool)]) -> Self {
        keys.iter()
            .fold(Self::new(), |spec, (path, desc)| spec.then(*path, *desc))
    }
}

impl From<Vec<(&str, bool)>> for SortSpec {
    fn from(keys: Vec<(&str, bool)>) -> Self {
        Self::from(keys.as_slice())
    }
}

impl From<SortDescriptor> for SortSpec {
    fn from(descriptor: SortDescriptor) -> Self {
        Self {
            descriptors: vec![descriptor],
        }
    }
}

impl From<Vec<SortDescriptor>> for SortSpec {
    fn from(descriptors: Vec<SortDescriptor>) -> Self {
        Self { descriptors }
    }
}

/// A sort specification resolved against one object type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledSort {
    keys: Vec<(KeyPath, bool)>,
}

impl CompiledSort {
    pub fn compile(registry: &SchemaRegistry, object_type: &str, spec: &SortSpec) -> CoreResult<Self> {
        let mut keys = Vec::with_capacity(spec.descriptors.len());
        for descriptor in &spec.descriptors {
            let path = parse_key_path(&descriptor.key_path).map_err(|err| match err {
                CoreError::PredicateSyntax { message, .. } => {
                    CoreError::invalid_sort(&descriptor.key_path, message)
                }
                other => other,
            })?;
            let resolved = KeyPath::resolve(registry, object_type, &path)?;
            if !resolved.is_scalar(registry, object_type) {
                return Err(CoreError::invalid_sort(
                    &descriptor.key_path,
                    "sort keys must reach a single value through single links or embedded objects",
                ));
            }
            keys.push((resolved, descriptor.descending));
        }
        Ok(Self { keys })
    }

    /// Stable sort of `records`, which must be in insertion order.
    pub fn apply<'a>(&self, state: &'a StoreState, records: Vec<&'a Arc<Record>>) -> Vec<&'a Arc<Record>> {
        if self.keys.is_empty() {
            return records;
        }
        let mut keyed: Vec<(Vec<Value>, &Arc<Record>)> = records
            .into_iter()
            .map(|record| {
                let key = self
                    .keys
                    .iter()
                    .map(|(path, _)| {
                        path.values(state, record)
                            .into_iter()
                            .next()
                            .map_or(Value::Null, |v| v.into_owned())
                    })
                    .collect();
                (key, record)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            for ((lhs, rhs), (_, descending)) in a.iter().zip(b).zip(&self.keys) {
                let ordering = sort_order(lhs, rhs);
                let ordering = if *descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        keyed.into_iter().map(|(_, record)| record).collect()
    }
}

/// Nulls sort before every other value, then NaN before every number.
fn sort_order(lhs: &Value, rhs: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Double(d) if d.is_nan() => 1,
            _ => 2,
        }
    }
    rank(lhs)
        .cmp(&rank(rhs))
        .then_with(|| lhs.compare(rhs).unwrap_or(Ordering::Equal))
}

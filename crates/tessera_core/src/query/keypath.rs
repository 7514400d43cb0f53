//! Key path resolution and traversal.
//!
//! A key path is resolved once against the schema into a list of [`Step`]s
//! ending in a [`Terminal`]. Evaluating it against an object yields every
//! value reachable along the path; predicates test them existentially.

use super::ast::{Component, PathExpr};
use crate::error::{CoreError, CoreResult};
use crate::schema::{PropertyKind, SchemaRegistry};
use crate::store::{Record, StoreState};
use crate::value::{Fields, Value};
use std::borrow::Cow;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    /// Single link.
    Link { property: String, target: String },
    /// List or set of links.
    Links { property: String, target: String },
    /// Inline embedded object or list of them.
    Embedded { property: String },
    /// Objects of `source_type` whose `property` links here.
    Backlinks { source_type: String, property: String },
}

#[cfg(test)]
impl Step {
    fn is_multi(&self) -> bool {
        matches!(self, Step::Links { .. } | Step::Backlinks { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Terminal {
    /// Stored property; collections are flattened.
    Value(String),
    /// Size of a collection property.
    Count(String),
    /// Number of objects reached by the last step.
    StepCount,
    /// The reached object itself, as a link.
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KeyPath {
    pub steps: Vec<Step>,
    pub terminal: Terminal,
    pub text: String,
}

/// Object reached while walking a key path.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Node<'a> {
    Record(&'a Arc<Record>),
    Embedded(&'a Fields),
    /// An unset single link or embedded object.
    Null,
}

impl<'a> Node<'a> {
    fn field(self, name: &str) -> Option<&'a Value> {
        match self {
            Node::Record(record) => record.get(name),
            Node::Embedded(fields) => fields.get(name),
            Node::Null => None,
        }
    }
}

impl KeyPath {
    /// Resolves a parsed path starting at `root`.
    pub fn resolve(registry: &SchemaRegistry, root: &str, path: &PathExpr) -> CoreResult<Self> {
        let syntax = |message: &str| CoreError::predicate_syntax(&path.text, path.offset, message);

        let mut current = registry.resolve(root)?;
        let mut steps = Vec::new();
        let components = &path.components;

        for (i, component) in components.iter().enumerate() {
            let next_is_count = matches!(components.get(i + 1), Some(Component::Count));
            let is_last = i + 1 == components.len() || (next_is_count && i + 2 == components.len());

            match component {
                Component::Count => {
                    return Err(syntax("'@count' must follow a collection at the end of a key path"));
                }
                Component::Links {
                    object_type,
                    property,
                } => {
                    let source = registry.resolve(object_type)?;
                    let links_here = source
                        .get_property(property)
                        .is_some_and(|p| registry.kind_of(p) == PropertyKind::Link(&current.name));
                    if !links_here {
                        return Err(CoreError::unknown_property(object_type, property));
                    }
                    steps.push(Step::Backlinks {
                        source_type: object_type.clone(),
                        property: property.clone(),
                    });
                    if is_last {
                        let terminal = if next_is_count {
                            Terminal::StepCount
                        } else {
                            Terminal::Object
                        };
                        return Ok(Self::finish(steps, terminal, path));
                    }
                    current = source;
                }
                Component::Property(name) => {
                    let prop = current
                        .get_property(name)
                        .ok_or_else(|| CoreError::unknown_property(&current.name, name))?;
                    let kind = registry.kind_of(prop);

                    if next_is_count {
                        if !is_last {
                            return Err(syntax("'@count' must end the key path"));
                        }
                        let terminal = match kind {
                            PropertyKind::LinkingObjects {
                                object_type,
                                property,
                            } => {
                                steps.push(Step::Backlinks {
                                    source_type: object_type.to_string(),
                                    property: property.to_string(),
                                });
                                Terminal::StepCount
                            }
                            _ if prop.is_collection() => Terminal::Count(name.clone()),
                            _ => return Err(syntax("'@count' applies only to collections")),
                        };
                        return Ok(Self::finish(steps, terminal, path));
                    }

                    if is_last {
                        let terminal = match kind {
                            PropertyKind::LinkingObjects {
                                object_type,
                                property,
                            } => {
                                steps.push(Step::Backlinks {
                                    source_type: object_type.to_string(),
                                    property: property.to_string(),
                                });
                                Terminal::Object
                            }
                            _ => Terminal::Value(name.clone()),
                        };
                        return Ok(Self::finish(steps, terminal, path));
                    }

                    let (step, next) = match kind {
                        PropertyKind::Link(target) if prop.is_collection() => (
                            Step::Links {
                                property: name.clone(),
                                target: target.to_string(),
                            },
                            target,
                        ),
                        PropertyKind::Link(target) => (
                            Step::Link {
                                property: name.clone(),
                                target: target.to_string(),
                            },
                            target,
                        ),
                        PropertyKind::Embedded(target) => (
                            Step::Embedded {
                                property: name.clone(),
                            },
                            target,
                        ),
                        PropertyKind::LinkingObjects {
                            object_type,
                            property,
                        } => (
                            Step::Backlinks {
                                source_type: object_type.to_string(),
                                property: property.to_string(),
                            },
                            object_type,
                        ),
                        PropertyKind::Primitive => {
                            let rest = match components.get(i + 1) {
                                Some(Component::Property(next)) => format!("{name}.{next}"),
                                _ => name.clone(),
                            };
                            return Err(CoreError::unknown_property(&current.name, rest));
                        }
                    };
                    steps.push(step);
                    current = registry.resolve(next)?;
                }
            }
        }

        Err(syntax("empty key path"))
    }

    fn finish(steps: Vec<Step>, terminal: Terminal, path: &PathExpr) -> Self {
        Self {
            steps,
            terminal,
            text: path.text.clone(),
        }
    }

    /// True if the path passes through a collection of objects.
    #[cfg(test)]
    pub fn is_multi(&self) -> bool {
        self.steps.iter().any(Step::is_multi)
    }

    /// True if the path reaches exactly one scalar per object.
    pub fn is_scalar(&self, registry: &SchemaRegistry, root: &str) -> bool {
        let Terminal::Value(name) = &self.terminal else {
            return false;
        };
        if self.steps.iter().any(|s| !matches!(s, Step::Link { .. } | Step::Embedded { .. })) {
            return false;
        }
        let mut current = match registry.get(root) {
            Some(schema) => schema,
            None => return false,
        };
        for step in &self.steps {
            let (property, target) = match step {
                Step::Link { property, target } => (property, Some(target.as_str())),
                Step::Embedded { property } => (property, None),
                _ => return false,
            };
            let Some(prop) = current.get_property(property) else {
                return false;
            };
            if prop.is_collection() {
                return false;
            }
            let next = match (target, registry.kind_of(prop)) {
                (Some(t), _) => t,
                (None, PropertyKind::Embedded(t)) => t,
                _ => return false,
            };
            current = match registry.get(next) {
                Some(schema) => schema,
                None => return false,
            };
        }
        current.get_property(name).is_some_and(|p| {
            !p.is_collection() && registry.kind_of(p) == PropertyKind::Primitive
        })
    }

    /// Collects every value the path reaches from `record`.
    pub fn values<'a>(&self, state: &'a StoreState, record: &'a Arc<Record>) -> Vec<Cow<'a, Value>> {
        let mut out = Vec::new();
        self.walk(state, Node::Record(record), &self.steps, &mut out);
        out
    }

    fn walk<'a>(&self, state: &'a StoreState, node: Node<'a>, steps: &[Step], out: &mut Vec<Cow<'a, Value>>) {
        let Some((step, rest)) = steps.split_first() else {
            self.terminal_values(node, out);
            return;
        };

        let children = children(state, node, step);
        if rest.is_empty() && self.terminal == Terminal::StepCount {
            out.push(Cow::Owned(Value::Int(count(&children))));
            return;
        }
        for child in children {
            self.walk(state, child, rest, out);
        }
    }

    fn terminal_values<'a>(&self, node: Node<'a>, out: &mut Vec<Cow<'a, Value>>) {
        match &self.terminal {
            Terminal::Value(name) => match node.field(name) {
                Some(Value::List(items)) => out.extend(items.iter().map(Cow::Borrowed)),
                Some(value) => out.push(Cow::Borrowed(value)),
                None => out.push(Cow::Owned(Value::Null)),
            },
            Terminal::Count(name) => {
                let len = node.field(name).and_then(Value::as_list).map_or(0, <[Value]>::len);
                out.push(Cow::Owned(Value::Int(len as i64)));
            }
            Terminal::Object => match node {
                Node::Record(record) => out.push(Cow::Owned(Value::Link(record.id))),
                _ => out.push(Cow::Owned(Value::Null)),
            },
            // Handled in `walk` before reaching the node.
            Terminal::StepCount => {}
        }
    }
}

fn count(nodes: &[Node<'_>]) -> i64 {
    nodes.iter().filter(|n| !matches!(n, Node::Null)).count() as i64
}

fn children<'a>(state: &'a StoreState, node: Node<'a>, step: &Step) -> Vec<Node<'a>> {
    match step {
        Step::Link { property, target } => match node.field(property).and_then(Value::as_link) {
            Some(id) => state
                .get(target, id)
                .map_or_else(Vec::new, |r| vec![Node::Record(r)]),
            None => vec![Node::Null],
        },
        Step::Links { property, target } => match node.field(property) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(Value::as_link)
                .filter_map(|id| state.get(target, id))
                .map(Node::Record)
                .collect(),
            _ => Vec::new(),
        },
        Step::Embedded { property } => match node.field(property) {
            Some(Value::Embedded(fields)) => vec![Node::Embedded(fields)],
            Some(Value::List(items)) => items
                .iter()
                .filter_map(Value::as_embedded)
                .map(Node::Embedded)
                .collect(),
            _ => vec![Node::Null],
        },
        Step::Backlinks {
            source_type,
            property,
        } => match node {
            Node::Record(record) => state
                .backlinks(record.id, source_type, property)
                .into_iter()
                .map(Node::Record)
                .collect(),
            _ => Vec::new(),
        },
    }
}

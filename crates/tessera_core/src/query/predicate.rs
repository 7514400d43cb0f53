//! Compiled predicates.

use super::ast::{CompareOp, Comparison, Expr, Operand};
use super::keypath::KeyPath;
use super::parser::parse;
use crate::error::{CoreError, CoreResult};
use crate::schema::SchemaRegistry;
use crate::store::{Record, StoreState};
use crate::value::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

/// A predicate resolved against one object type, with arguments bound.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Constant(bool),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Compare {
        lhs: Side,
        op: CompareOp,
        rhs: Side,
        case_insensitive: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Side {
    Path(KeyPath),
    Constant(Value),
}

impl Predicate {
    /// Parses `text` and resolves it against `object_type`.
    pub fn compile(
        registry: &SchemaRegistry,
        object_type: &str,
        text: &str,
        args: &[Value],
    ) -> CoreResult<Self> {
        let expr = parse(text)?;
        Self::lower(registry, object_type, expr, args)
    }

    fn lower(registry: &SchemaRegistry, object_type: &str, expr: Expr, args: &[Value]) -> CoreResult<Self> {
        let lower = |e: Box<Expr>| Self::lower(registry, object_type, *e, args).map(Box::new);
        Ok(match expr {
            Expr::Constant(b) => Predicate::Constant(b),
            Expr::Not(inner) => Predicate::Not(lower(inner)?),
            Expr::And(a, b) => Predicate::And(lower(a)?, lower(b)?),
            Expr::Or(a, b) => Predicate::Or(lower(a)?, lower(b)?),
            Expr::Compare(Comparison {
                lhs,
                op,
                rhs,
                case_insensitive,
            }) => Predicate::Compare {
                lhs: Self::side(registry, object_type, lhs, args)?,
                op,
                rhs: Self::side(registry, object_type, rhs, args)?,
                case_insensitive,
            },
        })
    }

    fn side(registry: &SchemaRegistry, object_type: &str, operand: Operand, args: &[Value]) -> CoreResult<Side> {
        match operand {
            Operand::Path(path) => KeyPath::resolve(registry, object_type, &path).map(Side::Path),
            Operand::Literal(value) => Ok(Side::Constant(value)),
            Operand::Arg { index, offset } => args
                .get(index)
                .cloned()
                .map(Side::Constant)
                .ok_or_else(|| {
                    CoreError::predicate_syntax(
                        format!("${index}"),
                        offset,
                        format!("missing argument ${index}, {} supplied", args.len()),
                    )
                }),
        }
    }

    /// Combines two predicates with AND.
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Evaluates the predicate against one record.
    pub fn matches(&self, state: &StoreState, record: &Arc<Record>) -> bool {
        match self {
            Predicate::Constant(b) => *b,
            Predicate::Not(inner) => !inner.matches(state, record),
            Predicate::And(a, b) => a.matches(state, record) && b.matches(state, record),
            Predicate::Or(a, b) => a.matches(state, record) || b.matches(state, record),
            Predicate::Compare {
                lhs,
                op,
                rhs,
                case_insensitive,
            } => {
                let left = side_values(lhs, state, record);
                let right = side_values(rhs, state, record);
                left.iter().any(|l| {
                    right
                        .iter()
                        .any(|r| compare_values(l, *op, r, *case_insensitive))
                })
            }
        }
    }
}

fn side_values<'a>(side: &'a Side, state: &'a StoreState, record: &'a Arc<Record>) -> Vec<Cow<'a, Value>> {
    match side {
        Side::Path(path) => path.values(state, record),
        Side::Constant(value) => vec![Cow::Borrowed(value)],
    }
}

fn is_orderable(value: &Value) -> bool {
    matches!(
        value,
        Value::Int(_) | Value::Double(_) | Value::String(_) | Value::Date(_)
    )
}

fn compare_values(lhs: &Value, op: CompareOp, rhs: &Value, case_insensitive: bool) -> bool {
    if op.is_string_op() {
        let (Some(l), Some(r)) = (lhs.as_str(), rhs.as_str()) else {
            return false;
        };
        let (l, r) = fold(l, r, case_insensitive);
        return match op {
            CompareOp::BeginsWith => l.starts_with(r.as_ref()),
            CompareOp::EndsWith => l.ends_with(r.as_ref()),
            CompareOp::Contains => l.contains(r.as_ref()),
            _ => like(&l, &r),
        };
    }

    if op.is_ordering() {
        if !is_orderable(lhs) || !is_orderable(rhs) {
            return false;
        }
        let ordering = match (lhs.as_str(), rhs.as_str()) {
            (Some(l), Some(r)) => {
                let (l, r) = fold(l, r, case_insensitive);
                Some(l.cmp(&r))
            }
            _ => lhs.compare(rhs),
        };
        return match (ordering, op) {
            (Some(o), CompareOp::Lt) => o == Ordering::Less,
            (Some(o), CompareOp::Le) => o != Ordering::Greater,
            (Some(o), CompareOp::Gt) => o == Ordering::Greater,
            (Some(o), CompareOp::Ge) => o != Ordering::Less,
            _ => false,
        };
    }

    let equal = match (lhs, rhs) {
        (Value::Null, _) | (_, Value::Null) => Some(lhs.is_null() && rhs.is_null()),
        (Value::String(l), Value::String(r)) if case_insensitive => {
            Some(l.to_lowercase() == r.to_lowercase())
        }
        (Value::Embedded(_), Value::Embedded(_)) | (Value::List(_), Value::List(_)) => {
            Some(lhs.loosely_equals(rhs))
        }
        // A link compared against an objectId argument.
        (Value::Link(a), Value::ObjectId(b)) | (Value::ObjectId(a), Value::Link(b)) => Some(a == b),
        _ => lhs.compare(rhs).map(|o| o == Ordering::Equal),
    };
    match (equal, op) {
        (Some(eq), CompareOp::Eq) => eq,
        (Some(eq), CompareOp::Ne) => !eq,
        _ => false,
    }
}

fn fold<'a>(lhs: &'a str, rhs: &'a str, case_insensitive: bool) -> (Cow<'a, str>, Cow<'a, str>) {
    if case_insensitive {
        (Cow::Owned(lhs.to_lowercase()), Cow::Owned(rhs.to_lowercase()))
    } else {
        (Cow::Borrowed(lhs), Cow::Borrowed(rhs))
    }
}

/// Wildcard match: `*` matches any run of characters, `?` exactly one.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

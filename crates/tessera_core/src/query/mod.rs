//! Predicate and sort engine.
//!
//! Predicates are parsed into an AST, then resolved against the schema of
//! the queried type: every key path is checked and turned into a list of
//! traversal steps. A compiled [`Query`] is evaluated against a
//! [`StoreState`] snapshot, so the same query can be re-run after every
//! commit.
//!
//! # Grammar
//!
//! - Comparisons: `==` (or `=`), `!=` (or `<>`), `<`, `<=`, `>`, `>=`
//! - String operators: `BEGINSWITH`, `ENDSWITH`, `CONTAINS`, `LIKE`, each
//!   optionally followed by `[c]` for case-insensitive matching
//! - Logic: `&&`/`AND`, `||`/`OR`, `!`/`NOT`, parentheses
//! - Literals: numbers, quoted strings, `true`, `false`, `null`, dates
//!   (`2000-01-01`, `2000-01-01@00:00:00:0`), `$0`-style arguments
//! - Key paths: `assignee.name`, `tags.@count`,
//!   `@links.User.posts.birthdate`
//!
//! A comparison through a collection is true if any reached value matches.

mod ast;
mod keypath;
mod lexer;
mod parser;
mod predicate;
mod sort;

pub use sort::{SortDescriptor, SortSpec};

pub(crate) use predicate::Predicate;
pub(crate) use sort::CompiledSort;

use crate::object::ObjectId;
use crate::store::StoreState;
use std::sync::Arc;

/// A filtered, sorted scan of one object type.
#[derive(Debug, Clone)]
pub(crate) struct Query {
    pub object_type: Arc<str>,
    pub predicate: Option<Arc<Predicate>>,
    pub sort: Option<Arc<CompiledSort>>,
}

impl Query {
    /// Every object of a type, in insertion order.
    pub fn all(object_type: impl Into<Arc<str>>) -> Self {
        Self {
            object_type: object_type.into(),
            predicate: None,
            sort: None,
        }
    }

    /// Returns a query that also requires `predicate`.
    pub fn filter(&self, predicate: Predicate) -> Self {
        let predicate = match &self.predicate {
            Some(existing) => existing.as_ref().clone().and(predicate),
            None => predicate,
        };
        Self {
            object_type: Arc::clone(&self.object_type),
            predicate: Some(Arc::new(predicate)),
            sort: self.sort.clone(),
        }
    }

    /// Returns a query with its sort replaced.
    pub fn sorted(&self, sort: CompiledSort) -> Self {
        Self {
            object_type: Arc::clone(&self.object_type),
            predicate: self.predicate.clone(),
            sort: Some(Arc::new(sort)),
        }
    }

    /// Runs the query against a snapshot.
    pub fn evaluate(&self, state: &StoreState) -> Vec<ObjectId> {
        let matching: Vec<_> = state
            .scan(&self.object_type)
            .filter(|record| {
                self.predicate
                    .as_ref()
                    .map_or(true, |p| p.matches(state, record))
            })
            .collect();
        let ordered = match &self.sort {
            Some(sort) => sort.apply(state, matching),
            None => matching,
        };
        ordered.into_iter().map(|record| record.id).collect()
    }
}

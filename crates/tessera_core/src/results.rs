//! Live query results.

use crate::change_feed::ChangeType;
use crate::database::DatabaseInner;
use crate::error::CoreResult;
use crate::notifier::{CommitInfo, CommitObserver, NotificationToken};
use crate::object::{Object, ObjectId};
use crate::query::{CompiledSort, Predicate, Query, SortSpec};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Cached = Option<(u64, Arc<Vec<ObjectId>>)>;

/// A live view of the objects of one type, optionally filtered and sorted.
///
/// `Results` never goes stale: every access checks the state visible to the
/// calling thread and re-runs the query if anything changed since the last
/// evaluation. On the thread with an open write transaction that includes
/// the transaction's uncommitted changes.
///
/// ```
/// use tessera_core::{Config, Database, ObjectSchema, Value};
///
/// let task = ObjectSchema::from_shorthand(
///     "Task",
///     Some("_id"),
///     &[("_id", "int"), ("name", "string"), ("priority", "int")],
/// )
/// .unwrap();
/// let db = Database::open(Config::new().schema(vec![task])).unwrap();
///
/// let urgent = db
///     .objects("Task")
///     .unwrap()
///     .filtered("priority > 3")
///     .unwrap();
/// assert_eq!(urgent.len().unwrap(), 0);
///
/// db.write(|txn| {
///     txn.create("Task", [("_id", Value::Int(1)), ("name", "Ship".into()), ("priority", Value::Int(5))])?;
///     Ok(())
/// })
/// .unwrap();
/// assert_eq!(urgent.len().unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct Results {
    db: Arc<DatabaseInner>,
    query: Query,
    cache: Arc<Mutex<Cached>>,
}

impl Results {
    pub(crate) fn new(db: Arc<DatabaseInner>, query: Query) -> Self {
        Self {
            db,
            query,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the object type of the results.
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.query.object_type
    }

    fn current_ids(&self) -> CoreResult<Arc<Vec<ObjectId>>> {
        let snapshot = self.db.view()?;
        let mut cache = self.cache.lock();
        if let Some((version, ids)) = cache.as_ref() {
            if *version == snapshot.version {
                return Ok(Arc::clone(ids));
            }
        }
        let ids = Arc::new(self.query.evaluate(&snapshot.state));
        self.db.stats.record_evaluation();
        *cache = Some((snapshot.version, Arc::clone(&ids)));
        Ok(ids)
    }

    fn object(&self, id: ObjectId) -> Object {
        Object::new(Arc::clone(&self.db), Arc::clone(&self.query.object_type), id)
    }

    /// Number of objects currently in the results.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.current_ids()?.len())
    }

    /// Returns true if no object currently matches.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.current_ids()?.is_empty())
    }

    /// Returns the object at `index`.
    pub fn get(&self, index: usize) -> CoreResult<Option<Object>> {
        Ok(self.current_ids()?.get(index).map(|id| self.object(*id)))
    }

    /// Returns the first object.
    pub fn first(&self) -> CoreResult<Option<Object>> {
        self.get(0)
    }

    /// Returns the last object.
    pub fn last(&self) -> CoreResult<Option<Object>> {
        let ids = self.current_ids()?;
        Ok(ids.last().map(|id| self.object(*id)))
    }

    /// Returns the ids of the current objects, in result order.
    pub fn ids(&self) -> CoreResult<Vec<ObjectId>> {
        Ok(self.current_ids()?.as_ref().clone())
    }

    /// Iterates over the current objects.
    ///
    /// The iterator walks the result as it was when `iter` was called;
    /// calling `iter` again picks up later changes.
    pub fn iter(&self) -> CoreResult<ResultsIter> {
        Ok(ResultsIter {
            db: Arc::clone(&self.db),
            object_type: Arc::clone(&self.query.object_type),
            ids: self.current_ids()?,
            pos: 0,
        })
    }

    /// Collects the current objects.
    pub fn to_vec(&self) -> CoreResult<Vec<Object>> {
        Ok(self.iter()?.collect())
    }

    /// Applies `f` to every current object.
    pub fn map<T>(&self, f: impl FnMut(Object) -> T) -> CoreResult<Vec<T>> {
        Ok(self.iter()?.map(f).collect())
    }

    /// Narrows the results with a predicate.
    ///
    /// The new predicate is combined with any existing one; the sort is
    /// kept.
    pub fn filtered(&self, predicate: &str) -> CoreResult<Results> {
        self.filtered_with(predicate, &[])
    }

    /// Narrows the results with a predicate that takes `$0`, `$1`, ...
    /// arguments.
    pub fn filtered_with(&self, predicate: &str, args: &[Value]) -> CoreResult<Results> {
        let snapshot = self.db.view()?;
        let compiled = Predicate::compile(&snapshot.registry, &self.query.object_type, predicate, args)
            .inspect_err(|_| self.db.stats.record_error())?;
        self.db.stats.record_query_compile();
        debug!(object_type = %self.query.object_type, predicate, "compiled predicate");
        Ok(Self::new(Arc::clone(&self.db), self.query.filter(compiled)))
    }

    /// Returns the same objects ordered by `spec`, replacing any earlier
    /// sort.
    pub fn sorted(&self, spec: impl Into<SortSpec>) -> CoreResult<Results> {
        let spec = spec.into();
        let snapshot = self.db.view()?;
        let compiled = CompiledSort::compile(&snapshot.registry, &self.query.object_type, &spec)
            .inspect_err(|_| self.db.stats.record_error())?;
        self.db.stats.record_query_compile();
        debug!(object_type = %self.query.object_type, keys = spec.descriptors().len(), "compiled sort");
        Ok(Self::new(Arc::clone(&self.db), self.query.sorted(compiled)))
    }

    /// Calls `callback` after every commit that changes these results.
    ///
    /// The callback receives the results and the changes relative to the
    /// previous notification (or to the moment `observe` was called).
    /// Callbacks run on the committing thread once the write lock has been
    /// released, in commit order. Notifications stop when the returned
    /// token is dropped.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(&Results, &CollectionChange) + Send + 'static,
    {
        self.db.ensure_open()?;
        let initial = self.query.evaluate(&self.db.txn_manager.committed().state);
        let observer = ResultsObserver {
            results: Self::new(Arc::clone(&self.db), self.query.clone()),
            last: Mutex::new(initial),
            callback: Mutex::new(Box::new(callback)),
        };
        Ok(self.db.notifier.register(Arc::new(observer)))
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("object_type", &self.query.object_type)
            .field("filtered", &self.query.predicate.is_some())
            .field("sorted", &self.query.sort.is_some())
            .finish()
    }
}

impl IntoIterator for &Results {
    type Item = Object;
    type IntoIter = ResultsIter;

    /// Iterates the current objects; an empty iterator if the database is
    /// closed.
    fn into_iter(self) -> ResultsIter {
        let ids = self.current_ids().unwrap_or_default();
        ResultsIter {
            db: Arc::clone(&self.db),
            object_type: Arc::clone(&self.query.object_type),
            ids,
            pos: 0,
        }
    }
}

/// Iterator over [`Results`].
pub struct ResultsIter {
    db: Arc<DatabaseInner>,
    object_type: Arc<str>,
    ids: Arc<Vec<ObjectId>>,
    pos: usize,
}

impl Iterator for ResultsIter {
    type Item = Object;

    fn next(&mut self) -> Option<Object> {
        let id = *self.ids.get(self.pos)?;
        self.pos += 1;
        Some(Object::new(Arc::clone(&self.db), Arc::clone(&self.object_type), id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ids.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ResultsIter {}

impl fmt::Debug for ResultsIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultsIter")
            .field("object_type", &self.object_type)
            .field("remaining", &(self.ids.len() - self.pos))
            .finish()
    }
}

/// Positions that changed between two notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionChange {
    /// Indices in the new results of objects that entered or moved.
    pub insertions: Vec<usize>,
    /// Indices in the previous results of objects that left or moved.
    pub deletions: Vec<usize>,
    /// Indices in the new results of objects whose properties changed.
    pub modifications: Vec<usize>,
}

impl CollectionChange {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }

    /// Computes the change from `old` to `new`.
    ///
    /// Objects kept in both are matched up so that the largest possible
    /// set stays in place; the others are reported as moves (a deletion
    /// plus an insertion). Objects that stayed in place are reported as
    /// modified if they are in `updated`.
    pub(crate) fn between(old: &[ObjectId], new: &[ObjectId], updated: &HashSet<ObjectId>) -> Self {
        let old_pos: HashMap<ObjectId, usize> = old.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let new_set: HashSet<ObjectId> = new.iter().copied().collect();

        let mut change = Self {
            deletions: old
                .iter()
                .enumerate()
                .filter(|(_, id)| !new_set.contains(id))
                .map(|(i, _)| i)
                .collect(),
            ..Self::default()
        };

        // (new index, old index) of objects present in both.
        let kept: Vec<(usize, usize)> = new
            .iter()
            .enumerate()
            .filter_map(|(j, id)| old_pos.get(id).map(|&i| (j, i)))
            .collect();
        let stable = longest_increasing(&kept.iter().map(|&(_, i)| i).collect::<Vec<_>>());

        for (j, id) in new.iter().enumerate() {
            if !old_pos.contains_key(id) {
                change.insertions.push(j);
            }
        }
        for (k, &(j, i)) in kept.iter().enumerate() {
            if stable.contains(&k) {
                if updated.contains(&new[j]) {
                    change.modifications.push(j);
                }
            } else {
                change.deletions.push(i);
                change.insertions.push(j);
            }
        }
        change.deletions.sort_unstable();
        change.insertions.sort_unstable();
        change
    }
}

/// Positions in `seq` of one longest strictly increasing subsequence.
fn longest_increasing(seq: &[usize]) -> HashSet<usize> {
    // tails[k]: position in `seq` of the smallest tail of a run of length k+1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (pos, &value) in seq.iter().enumerate() {
        let k = tails.partition_point(|&t| seq[t] < value);
        prev[pos] = k.checked_sub(1).map(|p| tails[p]);
        if k == tails.len() {
            tails.push(pos);
        } else {
            tails[k] = pos;
        }
    }

    let mut out = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(pos) = cursor {
        out.insert(pos);
        cursor = prev[pos];
    }
    out
}

type Callback = Box<dyn FnMut(&Results, &CollectionChange) + Send>;

struct ResultsObserver {
    results: Results,
    last: Mutex<Vec<ObjectId>>,
    callback: Mutex<Callback>,
}

impl CommitObserver for ResultsObserver {
    fn on_commit(&self, commit: &CommitInfo) {
        let object_type = self.results.object_type();
        let touched = commit.events.iter().any(|e| e.object_type == object_type)
            || self.results.query.predicate.is_some()
            || self.results.query.sort.is_some();
        if !touched {
            return;
        }

        let new = self.results.query.evaluate(&commit.snapshot.state);
        let updated: HashSet<ObjectId> = commit
            .events
            .iter()
            .filter(|e| e.object_type == object_type && e.change_type == ChangeType::Update)
            .map(|e| e.id)
            .collect();

        let change = {
            let mut last = self.last.lock();
            let change = CollectionChange::between(&last, &new, &updated);
            *last = new;
            change
        };
        if change.is_empty() {
            return;
        }

        self.results.db.stats.record_notification();
        let mut callback = self.callback.lock();
        (*callback)(&self.results, &change);
    }
}

//! Write transaction handle.

use crate::database::DatabaseInner;
use crate::error::{CoreError, CoreResult};
use crate::notifier::CommitInfo;
use crate::object::Object;
use crate::query::Query;
use crate::results::Results;
use crate::types::{SequenceNumber, TransactionId};
use crate::value::{Fields, PrimaryKey, Value};
use parking_lot::MutexGuard;
use std::sync::Arc;
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// An open write transaction.
///
/// Holds the database's write lock until it is committed, aborted or
/// dropped. Dropping an active transaction aborts it. Reads through the
/// transaction, and through any [`Object`] or [`Results`] on the same
/// thread, see its uncommitted changes; other threads keep seeing the last
/// commit.
pub struct WriteTransaction<'db> {
    db: &'db Arc<DatabaseInner>,
    guard: Option<MutexGuard<'db, ()>>,
    id: TransactionId,
    snapshot_seq: SequenceNumber,
    state: TransactionState,
}

fn collect_fields<I, K>(values: I) -> Fields
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    values.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

impl<'db> WriteTransaction<'db> {
    pub(crate) fn begin(db: &'db Arc<DatabaseInner>) -> CoreResult<Self> {
        db.ensure_open()?;
        let (id, guard) = db.txn_manager.begin()?;
        let snapshot_seq = db.txn_manager.committed_seq();
        db.stats.record_transaction_start();
        debug!(txid = %id, snapshot = %snapshot_seq, "began write transaction");
        Ok(Self {
            db,
            guard: Some(guard),
            id,
            snapshot_seq,
            state: TransactionState::Active,
        })
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the last commit the transaction started from.
    #[must_use]
    pub fn snapshot_seq(&self) -> SequenceNumber {
        self.snapshot_seq
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => {
                Err(CoreError::transaction("transaction is already committed"))
            }
            TransactionState::Aborted => Err(CoreError::transaction("transaction is aborted")),
        }
    }

    fn track<T>(&self, result: CoreResult<T>) -> CoreResult<T> {
        if result.is_err() {
            self.db.stats.record_error();
        }
        result
    }

    /// Creates an object.
    ///
    /// Properties left out take their defaults: null for optional values
    /// and links, empty for collections. Fails with
    /// [`CoreError::DuplicatePrimaryKey`] if the key is taken.
    pub fn create<I, K>(&mut self, object_type: &str, values: I) -> CoreResult<Object>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.ensure_active()?;
        let id = self.track(self.db.txn_manager.create(object_type, collect_fields(values)))?;
        self.db.stats.record_create();
        Ok(Object::new(Arc::clone(self.db), object_type, id))
    }

    /// Creates an object, or updates the one with the same primary key.
    ///
    /// When updating, only the given properties change.
    pub fn create_or_update<I, K>(&mut self, object_type: &str, values: I) -> CoreResult<Object>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.ensure_active()?;
        let (id, created) = self.track(
            self.db
                .txn_manager
                .create_or_update(object_type, collect_fields(values)),
        )?;
        if created {
            self.db.stats.record_create();
        } else {
            self.db.stats.record_update();
        }
        Ok(Object::new(Arc::clone(self.db), object_type, id))
    }

    /// Sets one property.
    pub fn set(&mut self, object: &Object, property: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.update(object, [(property, value.into())]).map(|_| ())
    }

    /// Sets several properties at once. Either all of them change or, on
    /// error, none do. Returns true if any value changed.
    pub fn update<I, K>(&mut self, object: &Object, values: I) -> CoreResult<bool>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.ensure_active()?;
        let changed = self.track(self.db.txn_manager.update(
            object.object_type(),
            object.id(),
            collect_fields(values),
        ))?;
        if changed {
            self.db.stats.record_update();
        }
        Ok(changed)
    }

    /// Appends an element to a list or set property. Appending a value a
    /// set already holds changes nothing.
    pub fn push(&mut self, object: &Object, property: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.ensure_active()?;
        let changed = self.track(self.db.txn_manager.push(
            object.object_type(),
            object.id(),
            property,
            value.into(),
        ))?;
        if changed {
            self.db.stats.record_update();
        }
        Ok(())
    }

    /// Deletes an object.
    ///
    /// Links to it are cleared: single links become null and the object
    /// is removed from lists and sets.
    pub fn delete(&mut self, object: &Object) -> CoreResult<()> {
        self.ensure_active()?;
        self.track(self.db.txn_manager.delete(object.object_type(), object.id()))?;
        self.db.stats.record_delete();
        Ok(())
    }

    /// Deletes every object of a type. Returns how many were deleted.
    pub fn delete_all(&mut self, object_type: &str) -> CoreResult<usize> {
        self.ensure_active()?;
        let count = self.track(self.db.txn_manager.delete_all(object_type))?;
        for _ in 0..count {
            self.db.stats.record_delete();
        }
        Ok(count)
    }

    /// Looks up an object by primary key, including uncommitted objects.
    pub fn object(&self, object_type: &str, key: impl Into<PrimaryKey>) -> CoreResult<Option<Object>> {
        self.ensure_active()?;
        let snapshot = self.db.view()?;
        snapshot.registry.resolve(object_type)?;
        Ok(snapshot
            .state
            .find_by_key(object_type, &key.into())
            .map(|record| Object::new(Arc::clone(self.db), object_type, record.id)))
    }

    /// Returns every object of a type, including uncommitted objects.
    pub fn objects(&self, object_type: &str) -> CoreResult<Results> {
        self.ensure_active()?;
        self.db.view()?.registry.resolve(object_type)?;
        Ok(Results::new(Arc::clone(self.db), Query::all(object_type)))
    }

    /// Commits the transaction.
    ///
    /// Observers and change feed subscribers are notified after the write
    /// lock is released. Returns the sequence number of the commit.
    pub fn commit(mut self) -> CoreResult<SequenceNumber> {
        self.ensure_active()?;
        let commit = self.db.txn_manager.commit()?;
        self.state = TransactionState::Committed;

        let events = commit.changes.into_events(commit.seq.as_u64());
        let changes = events.len();
        let deliver = self.db.notifier.enqueue(CommitInfo {
            seq: commit.seq,
            events,
            snapshot: commit.snapshot,
        });
        self.guard.take();
        self.db.stats.record_transaction_commit();
        debug!(txid = %commit.txid, seq = %commit.seq, changes, "committed write transaction");

        if deliver {
            self.db.notifier.drain();
        }
        Ok(commit.seq)
    }

    /// Discards every change made in the transaction.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        self.db.txn_manager.abort();
        self.state = TransactionState::Aborted;
        self.guard.take();
        self.db.stats.record_transaction_abort();
        debug!(txid = %self.id, "aborted write transaction");
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("id", &self.id)
            .field("snapshot_seq", &self.snapshot_seq)
            .field("state", &self.state)
            .finish()
    }
}

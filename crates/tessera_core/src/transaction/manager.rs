//! Transaction manager.

use super::changes::ChangeLog;
use crate::error::{CoreError, CoreResult};
use crate::object::ObjectId;
use crate::schema::SchemaRegistry;
use crate::store::{Snapshot, StoreState};
use crate::types::{SequenceNumber, TransactionId};
use crate::value::{Fields, PrimaryKey, Value};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::warn;

/// Uncommitted state of the open write transaction.
struct Pending {
    txid: TransactionId,
    snapshot: Arc<Snapshot>,
    changes: ChangeLog,
}

/// Outcome of a successful commit.
#[derive(Debug)]
pub(crate) struct Commit {
    pub txid: TransactionId,
    pub seq: SequenceNumber,
    pub changes: ChangeLog,
    /// The snapshot this commit published.
    pub snapshot: Arc<Snapshot>,
}

/// Serializes writers and publishes committed snapshots.
///
/// The manager provides:
/// - Single-writer concurrency control via `begin()`
/// - Copy-on-write snapshots for readers, which never wait for a writer
/// - Read-your-writes for the thread that holds the open transaction
/// - Commit ordering via sequence numbers
pub(crate) struct TransactionManager {
    /// Last committed snapshot.
    committed: RwLock<Arc<Snapshot>>,
    /// Working copy of the open write transaction.
    pending: Mutex<Option<Pending>>,
    /// Thread that owns the open write transaction.
    writer: RwLock<Option<ThreadId>>,
    /// Write lock - only one writer at a time.
    write_lock: Mutex<()>,
    next_txid: AtomicU64,
    next_version: AtomicU64,
    lock_timeout: Option<Duration>,
}

impl TransactionManager {
    pub fn new(registry: Arc<SchemaRegistry>, lock_timeout: Option<Duration>) -> Self {
        let snapshot = Snapshot {
            seq: SequenceNumber::default(),
            version: 0,
            registry,
            state: StoreState::default(),
        };
        Self {
            committed: RwLock::new(Arc::new(snapshot)),
            pending: Mutex::new(None),
            writer: RwLock::new(None),
            write_lock: Mutex::new(()),
            next_txid: AtomicU64::new(1),
            next_version: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Returns the state visible to the calling thread: the open
    /// transaction's working copy on the writer thread, the last committed
    /// snapshot everywhere else.
    pub fn view(&self) -> Arc<Snapshot> {
        if self.is_writer() {
            if let Some(pending) = self.pending.lock().as_ref() {
                return Arc::clone(&pending.snapshot);
            }
        }
        self.committed()
    }

    /// Returns the last committed snapshot.
    pub fn committed(&self) -> Arc<Snapshot> {
        Arc::clone(&self.committed.read())
    }

    pub fn committed_seq(&self) -> SequenceNumber {
        self.committed.read().seq
    }

    /// Returns true if the calling thread owns the open write transaction.
    pub fn is_writer(&self) -> bool {
        *self.writer.read() == Some(thread::current().id())
    }

    /// Acquires the write lock and opens a working copy of the store.
    ///
    /// Fails if the calling thread already has a write transaction open;
    /// waiting would deadlock. Other threads block until the lock is free,
    /// or until the configured timeout elapses.
    pub fn begin(&self) -> CoreResult<(TransactionId, MutexGuard<'_, ()>)> {
        if self.is_writer() {
            return Err(CoreError::transaction(
                "a write transaction is already open on this thread",
            ));
        }

        let guard = match self.lock_timeout {
            Some(timeout) => self.write_lock.try_lock_for(timeout).ok_or_else(|| {
                warn!(?timeout, "timed out waiting for the write lock");
                CoreError::LockTimeout { waited: timeout }
            })?,
            None => self.write_lock.lock(),
        };

        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        *self.pending.lock() = Some(Pending {
            txid,
            snapshot: self.committed(),
            changes: ChangeLog::default(),
        });
        *self.writer.write() = Some(thread::current().id());
        Ok((txid, guard))
    }

    /// Publishes the working copy as the new committed snapshot.
    pub fn commit(&self) -> CoreResult<Commit> {
        let Some(Pending {
            txid,
            mut snapshot,
            changes,
        }) = self.pending.lock().take()
        else {
            return Err(CoreError::transaction("no write transaction is open"));
        };

        let seq = {
            let mut committed = self.committed.write();
            let seq = committed.seq.next();
            let working = Arc::make_mut(&mut snapshot);
            working.seq = seq;
            working.version = self.next_version.fetch_add(1, Ordering::SeqCst);
            *committed = Arc::clone(&snapshot);
            seq
        };
        *self.writer.write() = None;
        Ok(Commit {
            txid,
            seq,
            changes,
            snapshot,
        })
    }

    /// Discards the working copy. Returns the id of the discarded
    /// transaction, if one was open.
    pub fn abort(&self) -> Option<TransactionId> {
        let pending = self.pending.lock().take();
        *self.writer.write() = None;
        pending.map(|p| p.txid)
    }

    /// Runs a mutation against the working copy of the calling thread's
    /// open transaction.
    pub fn with_pending<R>(
        &self,
        f: impl FnOnce(&mut Snapshot, &mut ChangeLog) -> CoreResult<R>,
    ) -> CoreResult<R> {
        if !self.is_writer() {
            return Err(CoreError::transaction(
                "mutation requires an open write transaction on this thread",
            ));
        }
        let mut pending = self.pending.lock();
        let Some(Pending {
            snapshot, changes, ..
        }) = pending.as_mut()
        else {
            return Err(CoreError::transaction("no write transaction is open"));
        };

        let working = Arc::make_mut(snapshot);
        let result = f(working, changes)?;
        working.version = self.next_version.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    pub fn create(&self, object_type: &str, values: Fields) -> CoreResult<ObjectId> {
        self.with_pending(|snap, changes| {
            let registry = Arc::clone(&snap.registry);
            let schema = registry.resolve(object_type)?;
            let id = snap.state.insert(&registry, schema, values)?;
            changes.inserted(object_type, id, primary_key_of(&snap.state, object_type, id));
            Ok(id)
        })
    }

    /// Creates an object, or updates the existing object with the same
    /// primary key. Returns the id and whether the object was created.
    pub fn create_or_update(
        &self,
        object_type: &str,
        mut values: Fields,
    ) -> CoreResult<(ObjectId, bool)> {
        self.with_pending(|snap, changes| {
            let registry = Arc::clone(&snap.registry);
            let schema = registry.resolve(object_type)?;
            let Some(pk) = schema.primary_key.as_deref() else {
                return Err(CoreError::validation(
                    object_type,
                    "",
                    "create_or_update requires a primary key",
                ));
            };
            let key = values
                .get(pk)
                .and_then(PrimaryKey::from_value)
                .ok_or_else(|| CoreError::validation(object_type, pk, "missing primary key value"))?;

            match snap.state.find_by_key(object_type, &key).map(|r| r.id) {
                Some(id) => {
                    values.remove(pk);
                    if snap.state.update(&registry, schema, id, values)? {
                        changes.modified(object_type, id, Some(key));
                    }
                    Ok((id, false))
                }
                None => {
                    let id = snap.state.insert(&registry, schema, values)?;
                    changes.inserted(object_type, id, Some(key));
                    Ok((id, true))
                }
            }
        })
    }

    /// Returns true if any stored value changed.
    pub fn update(&self, object_type: &str, id: ObjectId, values: Fields) -> CoreResult<bool> {
        self.with_pending(|snap, changes| {
            let registry = Arc::clone(&snap.registry);
            let schema = registry.resolve(object_type)?;
            let changed = snap.state.update(&registry, schema, id, values)?;
            if changed {
                changes.modified(object_type, id, primary_key_of(&snap.state, object_type, id));
            }
            Ok(changed)
        })
    }

    /// Appends one element to a list or set property.
    pub fn push(&self, object_type: &str, id: ObjectId, property: &str, value: Value) -> CoreResult<bool> {
        self.with_pending(|snap, changes| {
            let registry = Arc::clone(&snap.registry);
            let schema = registry.resolve(object_type)?;
            let prop = schema
                .get_property(property)
                .ok_or_else(|| CoreError::unknown_property(object_type, property))?;
            if !prop.is_collection() || prop.is_computed() {
                return Err(CoreError::validation(
                    object_type,
                    property,
                    "elements can only be appended to a list or set",
                ));
            }
            let record = snap
                .state
                .get(object_type, id)
                .ok_or_else(|| CoreError::dangling(object_type, id))?;
            let mut items = record
                .get(property)
                .and_then(Value::as_list)
                .map(<[Value]>::to_vec)
                .unwrap_or_default();
            items.push(value);

            let mut values = Fields::new();
            values.insert(property.to_string(), Value::List(items));
            let changed = snap.state.update(&registry, schema, id, values)?;
            if changed {
                changes.modified(object_type, id, primary_key_of(&snap.state, object_type, id));
            }
            Ok(changed)
        })
    }

    pub fn delete(&self, object_type: &str, id: ObjectId) -> CoreResult<()> {
        self.with_pending(|snap, changes| delete_in(snap, changes, object_type, id))
    }

    /// Deletes every object of a type. Returns how many were removed.
    pub fn delete_all(&self, object_type: &str) -> CoreResult<usize> {
        self.with_pending(|snap, changes| {
            snap.registry.resolve(object_type)?;
            let ids: Vec<ObjectId> = snap.state.scan(object_type).map(|r| r.id).collect();
            for id in &ids {
                delete_in(snap, changes, object_type, *id)?;
            }
            Ok(ids.len())
        })
    }
}

pub(crate) fn delete_in(
    snap: &mut Snapshot,
    changes: &mut ChangeLog,
    object_type: &str,
    id: ObjectId,
) -> CoreResult<()> {
    let registry = Arc::clone(&snap.registry);
    let schema = registry.resolve(object_type)?;
    let removed = snap.state.remove(&registry, schema, id)?;
    changes.deleted(object_type, id, removed.record.primary_key.clone());
    for (source_type, source) in removed.unlinked {
        let key = primary_key_of(&snap.state, &source_type, source);
        changes.modified(&source_type, source, key);
    }
    Ok(())
}

fn primary_key_of(state: &StoreState, object_type: &str, id: ObjectId) -> Option<PrimaryKey> {
    state.get(object_type, id).and_then(|r| r.primary_key.clone())
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("committed_seq", &self.committed_seq())
            .field("writing", &self.writer.read().is_some())
            .finish_non_exhaustive()
    }
}

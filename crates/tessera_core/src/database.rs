//! Database facade.

use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::migration::{self, MigrationPlan};
use crate::notifier::Notifier;
use crate::object::{Object, ObjectId};
use crate::query::Query;
use crate::results::Results;
use crate::schema::{ObjectSchema, SchemaRegistry};
use crate::stats::DatabaseStats;
use crate::store::Snapshot;
use crate::transaction::{TransactionManager, WriteTransaction};
use crate::types::{SchemaVersion, SequenceNumber};
use crate::value::{Fields, PrimaryKey, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state behind [`Database`], [`Object`] and [`Results`] handles.
pub(crate) struct DatabaseInner {
    pub config: Config,
    pub txn_manager: TransactionManager,
    pub notifier: Arc<Notifier>,
    pub change_feed: Arc<ChangeFeed>,
    pub stats: DatabaseStats,
    is_open: AtomicBool,
}

impl DatabaseInner {
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    /// The state visible to the calling thread.
    pub fn view(&self) -> CoreResult<Arc<Snapshot>> {
        self.ensure_open()?;
        Ok(self.txn_manager.view())
    }
}

/// The main database handle.
///
/// `Database` is the entry point for interacting with Tessera. It provides:
/// - Write transactions (one writer at a time, readers never blocked)
/// - Object lookup by primary key
/// - Live, filterable and sortable [`Results`]
/// - A change feed of committed events
/// - Schema changes on the open store
///
/// # Example
///
/// ```
/// use tessera_core::{Config, Database, ObjectSchema, Value};
///
/// let person = ObjectSchema::from_shorthand("Person", Some("name"), &[("name", "string"), ("age", "int")])
///     .unwrap();
/// let db = Database::open(Config::new().schema(vec![person])).unwrap();
///
/// db.write(|txn| {
///     txn.create("Person", [("name", Value::from("Ann")), ("age", Value::Int(31))])?;
///     Ok(())
/// })
/// .unwrap();
///
/// let ann = db.object("Person", "Ann").unwrap().unwrap();
/// assert_eq!(ann.get("age").unwrap(), Value::Int(31));
/// ```
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Opens an in-memory database with the configured object types.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] naming the first invalid or
    /// conflicting object type.
    pub fn open(config: Config) -> CoreResult<Self> {
        let registry = SchemaRegistry::new(config.schema_version, config.schema.clone())?;
        let types = registry.len();
        let change_feed = Arc::new(ChangeFeed::with_max_history(config.change_history));
        let inner = DatabaseInner {
            txn_manager: TransactionManager::new(Arc::new(registry), config.write_lock_timeout),
            notifier: Arc::new(Notifier::new(Arc::clone(&change_feed))),
            change_feed,
            stats: DatabaseStats::new(),
            is_open: AtomicBool::new(true),
            config,
        };
        info!(
            types,
            schema_version = inner.config.schema_version,
            "opened database"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Begins a write transaction.
    ///
    /// Blocks while another thread holds the write lock, up to the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Transaction`] if this thread already has one open
    /// - [`CoreError::LockTimeout`] if the lock could not be acquired in time
    pub fn begin_write(&self) -> CoreResult<WriteTransaction<'_>> {
        WriteTransaction::begin(&self.inner)
    }

    /// Runs `f` in a write transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back if it
    /// returns an error or panics; either way the write lock is released.
    pub fn write<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T>,
    {
        let mut txn = self.begin_write()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                warn!(txid = %txn.id(), error = %err, "write failed, rolling back");
                txn.abort();
                Err(err)
            }
        }
    }

    /// Creates an object in the write transaction open on this thread.
    ///
    /// # Errors
    ///
    /// [`CoreError::Transaction`] if this thread has no open transaction.
    pub fn create<I, K>(&self, object_type: &str, values: I) -> CoreResult<Object>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.inner.ensure_open()?;
        let fields: Fields = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let id = self.inner.txn_manager.create(object_type, fields)?;
        self.inner.stats.record_create();
        Ok(Object::new(Arc::clone(&self.inner), object_type, id))
    }

    /// Deletes an object in the write transaction open on this thread.
    ///
    /// # Errors
    ///
    /// [`CoreError::Transaction`] if this thread has no open transaction.
    pub fn delete(&self, object: &Object) -> CoreResult<()> {
        self.inner.ensure_open()?;
        self.inner
            .txn_manager
            .delete(object.object_type(), object.id())?;
        self.inner.stats.record_delete();
        Ok(())
    }

    /// Returns a live view of every object of a type, in insertion order.
    ///
    /// Embedded types have no independent objects and cannot be listed.
    pub fn objects(&self, object_type: &str) -> CoreResult<Results> {
        if self.inner.view()?.registry.resolve(object_type)?.embedded {
            return Err(CoreError::schema(
                object_type,
                "embedded objects can only be reached through their owner",
            ));
        }
        Ok(Results::new(Arc::clone(&self.inner), Query::all(object_type)))
    }

    /// Looks up an object by primary key.
    pub fn object(&self, object_type: &str, key: impl Into<PrimaryKey>) -> CoreResult<Option<Object>> {
        let snapshot = self.inner.view()?;
        let schema = snapshot.registry.resolve(object_type)?;
        if schema.primary_key.is_none() {
            return Err(CoreError::schema(object_type, "object type has no primary key"));
        }
        Ok(snapshot
            .state
            .find_by_key(object_type, &key.into())
            .map(|record| Object::new(Arc::clone(&self.inner), object_type, record.id)))
    }

    /// Looks up an object by its identity.
    pub fn object_by_id(&self, object_type: &str, id: ObjectId) -> CoreResult<Option<Object>> {
        let snapshot = self.inner.view()?;
        snapshot.registry.resolve(object_type)?;
        Ok(snapshot
            .state
            .contains(object_type, id)
            .then(|| Object::new(Arc::clone(&self.inner), object_type, id)))
    }

    /// Replaces the registered object types.
    ///
    /// See [`crate::migration`] for which changes are accepted. The change
    /// is committed like a write transaction, so it waits for the write
    /// lock and notifies observers of any objects it deletes.
    pub fn update_schema(&self, schema: Vec<ObjectSchema>, version: SchemaVersion) -> CoreResult<MigrationPlan> {
        let next = SchemaRegistry::new(version, schema)?;
        let policy = self.inner.config.migration_policy;

        let txn = self.begin_write()?;
        let plan = self
            .inner
            .txn_manager
            .with_pending(|snapshot, changes| migration::apply(snapshot, changes, next, policy));
        match plan {
            Ok(plan) => {
                txn.commit()?;
                info!(
                    from = plan.from_version,
                    to = plan.to_version,
                    changes = plan.changes.len(),
                    reset = ?plan.reset_types,
                    "updated schema"
                );
                Ok(plan)
            }
            Err(err) => {
                warn!(error = %err, "schema update rejected");
                txn.abort();
                Err(err)
            }
        }
    }

    /// Returns the schema in effect for the calling thread.
    pub fn schema(&self) -> CoreResult<Arc<SchemaRegistry>> {
        Ok(Arc::clone(&self.inner.view()?.registry))
    }

    /// Subscribes to committed change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.inner.change_feed.subscribe()
    }

    /// Returns change events with a sequence above `cursor`, oldest first.
    pub fn poll_changes(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.inner.change_feed.poll(cursor, limit)
    }

    /// Returns the change feed.
    #[must_use]
    pub fn change_feed(&self) -> &ChangeFeed {
        &self.inner.change_feed
    }

    /// Sequence number of the last commit.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.inner.txn_manager.committed_seq()
    }

    /// Number of live objects across all types, as last committed.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.inner.txn_manager.committed().state.total_count()
    }

    /// Returns the database statistics.
    #[must_use]
    pub fn stats(&self) -> &DatabaseStats {
        &self.inner.stats
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns true until [`Database::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_open.load(Ordering::Acquire)
    }

    /// Closes the database.
    ///
    /// Observers are dropped; handles fail with
    /// [`CoreError::DatabaseClosed`] from now on.
    pub fn close(&self) -> CoreResult<()> {
        if !self.inner.is_open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.notifier.clear();
        info!(objects = self.object_count(), "closed database");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.is_open() {
            debug!("database dropped while open");
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("committed_seq", &self.committed_seq())
            .field("objects", &self.object_count())
            .finish()
    }
}

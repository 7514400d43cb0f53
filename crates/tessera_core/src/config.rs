//! Database configuration.

use crate::schema::ObjectSchema;
use crate::types::SchemaVersion;
use std::time::Duration;

/// What to do when a schema change is incompatible with stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationPolicy {
    /// Reject the change with [`crate::CoreError::MigrationRequired`].
    #[default]
    Strict,
    /// Delete the data of every affected type and apply the change.
    ResetOnMismatch,
}

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Object types to register.
    pub schema: Vec<ObjectSchema>,

    /// Version of the schema definitions.
    pub schema_version: SchemaVersion,

    /// Handling of incompatible schema changes.
    pub migration_policy: MigrationPolicy,

    /// Maximum time to wait for the write lock (`None` = wait forever).
    pub write_lock_timeout: Option<Duration>,

    /// Number of change events kept for polling.
    pub change_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: Vec::new(),
            schema_version: 0,
            migration_policy: MigrationPolicy::Strict,
            write_lock_timeout: None,
            change_history: 10_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the object types to register.
    #[must_use]
    pub fn schema(mut self, schema: Vec<ObjectSchema>) -> Self {
        self.schema = schema;
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets the migration policy.
    #[must_use]
    pub const fn migration_policy(mut self, policy: MigrationPolicy) -> Self {
        self.migration_policy = policy;
        self
    }

    /// Bounds the wait for the write lock.
    #[must_use]
    pub const fn write_lock_timeout(mut self, timeout: Duration) -> Self {
        self.write_lock_timeout = Some(timeout);
        self
    }

    /// Sets how many change events are kept for polling.
    #[must_use]
    pub const fn change_history(mut self, events: usize) -> Self {
        self.change_history = events;
        self
    }
}

//! # Tessera Core
//!
//! Embedded object store with live queries.
//!
//! This crate provides:
//! - A schema registry validating object types before any object exists
//! - An in-memory object store with primary keys, links and embedded objects
//! - Serialized write transactions over copy-on-write snapshots
//! - A predicate language with backlink traversal, and multi-key sorting
//! - Live results that re-evaluate on commit and notify observers
//!
//! ## Design Principles
//!
//! - Readers never wait for the writer; they see the last commit
//! - The writing thread reads its own uncommitted changes
//! - Backlinks are derived from forward links, never stored
//! - Handles hold no data; a deleted object fails loudly
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{Config, Database, ObjectSchema, SortSpec, Value};
//!
//! let task = ObjectSchema::from_shorthand(
//!     "Task",
//!     Some("_id"),
//!     &[("_id", "int"), ("name", "string"), ("priority", "int")],
//! )
//! .unwrap();
//! let db = Database::open(Config::new().schema(vec![task])).unwrap();
//!
//! db.write(|txn| {
//!     for (id, name, priority) in [(1, "Wash the dishes", 3), (2, "Do the laundry", 4), (3, "Gym Workout", 3)] {
//!         txn.create(
//!             "Task",
//!             [("_id", Value::Int(id)), ("name", name.into()), ("priority", Value::Int(priority))],
//!         )?;
//!     }
//!     Ok(())
//! })
//! .unwrap();
//!
//! let sorted = db
//!     .objects("Task")
//!     .unwrap()
//!     .sorted(SortSpec::from(vec![("priority", true), ("name", false)]))
//!     .unwrap();
//! let names = sorted.map(|t| t.get("name").unwrap()).unwrap();
//! assert_eq!(names, vec![
//!     Value::from("Do the laundry"),
//!     Value::from("Gym Workout"),
//!     Value::from("Wash the dishes"),
//! ]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod database;
mod error;
pub mod migration;
mod notifier;
mod object;
mod query;
mod results;
pub mod schema;
mod stats;
mod store;
mod transaction;
mod types;
mod value;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeType};
pub use config::{Config, MigrationPolicy};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use migration::{MigrationPlan, SchemaChange};
pub use notifier::NotificationToken;
pub use object::{Object, ObjectId};
pub use query::{SortDescriptor, SortSpec};
pub use results::{CollectionChange, Results, ResultsIter};
pub use schema::{CollectionKind, ObjectSchema, PropertyDef, PropertyKind, PropertyType, SchemaRegistry};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{TransactionState, WriteTransaction};
pub use types::{SchemaVersion, SequenceNumber, TransactionId};
pub use value::{Fields, PrimaryKey, Timestamp, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

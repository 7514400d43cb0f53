//! Write transactions.
//!
//! Tessera serializes writers and never blocks readers:
//! - **Atomicity**: a transaction's changes are published together on
//!   commit, or not at all
//! - **Isolation**: readers see the last committed snapshot; the writing
//!   thread sees its own uncommitted changes
//! - **Ordering**: every commit gets the next sequence number, and
//!   observers are notified in that order

mod changes;
mod manager;
mod state;

pub(crate) use changes::ChangeLog;
pub(crate) use manager::{delete_in, TransactionManager};
pub use state::{TransactionState, WriteTransaction};

//! # Tessera Testkit
//!
//! Test utilities for Tessera.
//!
//! This crate provides:
//! - The sample object models used throughout the test suites
//!   (Task/Person, User/Post, Character, Business with embedded contacts)
//! - Database helpers that open a store with one of those models
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use tessera_testkit::prelude::*;
//!
//! with_task_db(|db| {
//!     seed_tasks(db, &[("Wash the dishes", 3, 5), ("Gym Workout", 3, 30)]);
//!     assert_eq!(db.objects("Task").unwrap().len().unwrap(), 2);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

//! Error types for Tessera core.

use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Tessera core operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    /// A schema definition is malformed or conflicts with another.
    #[error("schema error in '{object_type}': {message}")]
    Schema {
        /// The first conflicting object type.
        object_type: String,
        /// Description of the conflict.
        message: String,
    },

    /// The requested object type is not registered.
    #[error("unknown object type: {name}")]
    UnknownObjectType {
        /// Name that failed to resolve.
        name: String,
    },

    /// A value does not match the declared shape of a property.
    #[error("invalid value for '{object_type}.{property}': {message}")]
    Validation {
        /// Object type being written.
        object_type: String,
        /// Offending property.
        property: String,
        /// Description of the mismatch.
        message: String,
    },

    /// An object with the same primary key already exists.
    #[error("duplicate primary key {key} for object type '{object_type}'")]
    DuplicatePrimaryKey {
        /// Object type being written.
        object_type: String,
        /// Rendered primary key value.
        key: String,
    },

    /// Operation attempted outside of a valid write scope.
    #[error("transaction error: {message}")]
    Transaction {
        /// Why the operation is not permitted.
        message: String,
    },

    /// Timed out waiting for the write lock.
    #[error("timed out after {waited:?} waiting for the write lock")]
    LockTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// A predicate string could not be parsed.
    #[error("syntax error at offset {offset} near '{token}': {message}")]
    PredicateSyntax {
        /// The offending token text.
        token: String,
        /// Byte offset of the token in the predicate.
        offset: usize,
        /// What the parser expected.
        message: String,
    },

    /// A key path names a property that does not exist.
    #[error("unknown property '{property}' on object type '{object_type}'")]
    UnknownProperty {
        /// Object type the lookup was made against.
        object_type: String,
        /// Property that failed to resolve.
        property: String,
    },

    /// A sort key path cannot be used for ordering.
    #[error("cannot sort on '{key_path}': {message}")]
    InvalidSort {
        /// The key path.
        key_path: String,
        /// Why it is not sortable.
        message: String,
    },

    /// Access through a handle whose object has been deleted.
    #[error("object {id} of type '{object_type}' has been deleted")]
    DanglingReference {
        /// Object type of the handle.
        object_type: String,
        /// Identity of the deleted object.
        id: String,
    },

    /// A schema change needs data migration and the policy forbids it.
    #[error("migration required for '{object_type}': {message}")]
    MigrationRequired {
        /// First incompatible object type.
        object_type: String,
        /// Description of the incompatibility.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(object_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            object_type: object_type.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown object type error.
    pub fn unknown_object_type(name: impl Into<String>) -> Self {
        Self::UnknownObjectType { name: name.into() }
    }

    /// Creates a validation error.
    pub fn validation(
        object_type: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            object_type: object_type.into(),
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate primary key error.
    pub fn duplicate_primary_key(object_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicatePrimaryKey {
            object_type: object_type.into(),
            key: key.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a predicate syntax error.
    pub fn predicate_syntax(
        token: impl Into<String>,
        offset: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::PredicateSyntax {
            token: token.into(),
            offset,
            message: message.into(),
        }
    }

    /// Creates an unknown property error.
    pub fn unknown_property(object_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            object_type: object_type.into(),
            property: property.into(),
        }
    }

    /// Creates an invalid sort error.
    pub fn invalid_sort(key_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSort {
            key_path: key_path.into(),
            message: message.into(),
        }
    }

    /// Creates a dangling reference error.
    pub fn dangling(object_type: impl Into<String>, id: impl ToString) -> Self {
        Self::DanglingReference {
            object_type: object_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a migration required error.
    pub fn migration_required(object_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MigrationRequired {
            object_type: object_type.into(),
            message: message.into(),
        }
    }

    /// Returns true if the caller can recover by correcting its input.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::DuplicatePrimaryKey { .. }
                | Self::PredicateSyntax { .. }
                | Self::UnknownProperty { .. }
                | Self::InvalidSort { .. }
                | Self::LockTimeout { .. }
        )
    }
}

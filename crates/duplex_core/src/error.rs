//! Error types for the synchronization engine

use thiserror::Error;

use crate::property::PropertyKind;

/// Core engine errors
///
/// Tolerated conditions (decode mismatches, enqueues against destroyed
/// objects) are not errors; those paths report `false` and log instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Host-visible type error
    #[error("TypeError: {0}")]
    Type(String),

    #[error("unknown or freed managed object")]
    UnknownObject,

    #[error("unknown property id {0}")]
    UnknownProperty(u32),

    #[error("property is {expected:?}, value is {actual:?}")]
    KindMismatch {
        expected: PropertyKind,
        actual: PropertyKind,
    },

    #[error("event handler destroyed")]
    HandlerDestroyed,
}

impl CoreError {
    /// Shorthand for a host-visible type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        CoreError::Type(msg.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

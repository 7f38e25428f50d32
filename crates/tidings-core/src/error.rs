//! Domain error types.

use thiserror::Error;

/// Top-level error type for the notification feed.
///
/// `Clone` so that a single failed batch lookup can be handed to every
/// renderer waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up.
        entity: &'static str,
        /// The identifier that was looked up, rendered as text.
        id: String,
    },

    /// Caller input was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// The request carries no usable identity.
    #[error("unauthorized")]
    Unauthorized,

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl FeedError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

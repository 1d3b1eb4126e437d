//! Error handling for wastetrack-store
//!
//! Wraps wastetrack-core ExError with store-specific helpers

use wastetrack_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// The table does not exist on this backend
pub fn relation_not_found(backend: &str, table: &str) -> ExError {
    ExError::new(ExErrorKind::RelationNotFound)
        .with_backend(backend)
        .with_table(table)
        .with_message(format!("relation \"{}\" does not exist", table))
}

/// No relationship named `relation` is declared for `table`
pub fn missing_relationship(backend: &str, table: &str, relation: &str) -> ExError {
    ExError::new(ExErrorKind::RelationNotFound)
        .with_backend(backend)
        .with_table(table)
        .with_message(format!(
            "Could not find a relationship between '{}' and '{}'",
            table, relation
        ))
}

/// The backend refused a propagated session
pub fn session_rejected(backend: &str) -> ExError {
    ExError::new(ExErrorKind::Unauthorised)
        .with_op("set_session")
        .with_backend(backend)
        .with_message("invalid JWT: signature does not match this project")
}

/// Internal state could not be locked
pub fn state_unavailable(backend: &str) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_backend(backend)
        .with_message("backend state lock poisoned")
}

/// Create a seed validation error
pub fn seed_validation(reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("seed_parse")
        .with_message(reason.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

//! Unified error handling for the path-tracker library.
//!
//! Some of these variants are recoverable and never leave the component that
//! raised them: `StorageCorrupted` and `StorageWriteFailed` are logged by the
//! persistence gateway, and `NoOpenSession` is logged by the event loop when a
//! location fix arrives with nothing to append to.

use thiserror::Error;

use crate::session::SessionState;

/// Unified error type for path-tracker operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The platform refused location access. Aborts session start, not retried.
    #[error("Location permission denied: {message}")]
    PermissionDenied { message: String },

    /// A stored collection failed to parse or validate and was reset.
    #[error("Stored '{key}' data was corrupted: {message}")]
    StorageCorrupted { key: String, message: String },

    /// A durable write did not land. Superseded by the next write of the key.
    #[error("Failed to write '{key}': {message}")]
    StorageWriteFailed { key: String, message: String },

    /// The durable store could not be read.
    #[error("Failed to read '{key}': {message}")]
    StorageReadFailed { key: String, message: String },

    /// A location fix arrived while no path record was open.
    #[error("No open path to append to")]
    NoOpenSession,

    /// The requested session operation is not valid in the current state.
    #[error("Cannot {operation} while {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    /// No path record with this id.
    #[error("Path '{id}' not found")]
    PathNotFound { id: String },

    /// The open record cannot be deleted while the session is running.
    #[error("Path '{id}' is still recording")]
    OpenPathDeletion { id: String },

    /// A pin detail field name that is not `name`, `category` or `notes`.
    #[error("Unknown pin field '{field}'")]
    InvalidPinField { field: String },

    /// No pin record with this id.
    #[error("Pin '{id}' not found")]
    PinNotFound { id: String },

    /// A pin detail operation was issued with no capture workflow open.
    #[error("No pin capture in progress")]
    NoActiveCapture,

    /// A pin was requested before any location fix was known.
    #[error("No location fix available")]
    NoLocationFix,

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "persistence")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for path-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Extension trait for converting Option to TrackerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a path-not-found error.
    fn ok_or_path_not_found(self, id: &str) -> Result<T>;

    /// Convert Option to Result with a pin-not-found error.
    fn ok_or_pin_not_found(self, id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_path_not_found(self, id: &str) -> Result<T> {
        self.ok_or_else(|| TrackerError::PathNotFound { id: id.to_string() })
    }

    fn ok_or_pin_not_found(self, id: &str) -> Result<T> {
        self.ok_or_else(|| TrackerError::PinNotFound { id: id.to_string() })
    }
}

//! Error types for the drill_core library.

use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for drill_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reorder target or source index fell outside the session sequence
    #[error("Index {index} is out of range for a session of {len} drills")]
    InvalidRange { index: usize, len: usize },

    /// The referenced group is neither a saved group nor the liked group
    #[error("Group not found: {0}")]
    GroupNotFound(Uuid),

    /// Backend rejected a request or could not be reached
    #[error("Sync failed: {status} - {message}")]
    Sync { status: u16, message: String },

    /// Cached or backend payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// An operation needed a logged-in user
    #[error("No user is logged in")]
    NotLoggedIn,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transport-level failure with no HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Sync {
            status: 0,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let err = Error::Sync {
            status: 401,
            message: "token expired".into(),
        };
        assert_eq!(err.to_string(), "Sync failed: 401 - token expired");
    }

    #[test]
    fn test_invalid_range_display() {
        let err = Error::InvalidRange { index: 7, len: 3 };
        assert_eq!(
            err.to_string(),
            "Index 7 is out of range for a session of 3 drills"
        );
    }

    #[test]
    fn test_json_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{{nope").unwrap_err();
        let err: Error = serde_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
    }
}

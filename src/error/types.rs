//! Error type definitions
//!
//! Defines the main error types used throughout the session lifecycle manager.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Platform;

/// Main error type for the session lifecycle manager
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure while reading or writing a session record
    #[error("Storage error: {operation} {path:?}: {source}")]
    Storage {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record file exists but cannot be decoded
    #[error("Corrupt session record {path:?}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    /// Account name is empty or not filesystem-safe
    #[error("Invalid account name: {0:?}")]
    InvalidAccount(String),

    /// Platform identifier not in the supported set
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    /// The login artifact could not be located on the login page
    #[error("Login artifact not found for {platform} within {waited:?}")]
    ArtifactNotFound { platform: Platform, waited: Duration },

    /// The human did not finish the login before the deadline
    #[error("No login navigation for {platform} within {waited:?}")]
    NavigationTimeout { platform: Platform, waited: Duration },

    /// A liveness check could not reach a verdict
    #[error("Verification inconclusive: {reason}")]
    VerificationInconclusive { reason: String },

    /// Browser automation failures
    #[error("Browser driver error: {0}")]
    Driver(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error for the given operation and path
    pub fn storage(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Create a corrupt record error
    pub fn corrupt_record(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an artifact-not-found error
    pub fn artifact_not_found(platform: Platform, waited: Duration) -> Self {
        Self::ArtifactNotFound { platform, waited }
    }

    /// Create a navigation timeout error
    pub fn navigation_timeout(platform: Platform, waited: Duration) -> Self {
        Self::NavigationTimeout { platform, waited }
    }

    /// Create an inconclusive verification error
    pub fn verification_inconclusive(reason: impl Into<String>) -> Self {
        Self::VerificationInconclusive {
            reason: reason.into(),
        }
    }

    /// Create a browser driver error
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    /// Whether this error comes from the record store
    ///
    /// Storage failures are fatal to the calling operation; every other
    /// failure is folded into a login outcome or a verification result.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::CorruptRecord { .. })
    }
}

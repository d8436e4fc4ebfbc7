//! Unified error types for the lxcprov workspace.
//!
//! Provisioning failures are classified by kind here; the stage at which a
//! failure happened is tracked separately by the runtime engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum LxcprovError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A batch record failed validation before any backend call.
    #[error("invalid {field} {value:?}: {reason}")]
    Validation {
        /// Wire name of the offending field.
        field: &'static str,
        /// Value as it appeared in the input.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The container runtime refused or failed an operation.
    #[error("backend {op} failed for container {name}: {message}")]
    Backend {
        /// Backend operation that failed.
        op: &'static str,
        /// Container the operation targeted.
        name: String,
        /// Detail reported by the runtime.
        message: String,
    },

    /// Reading or writing the guest network file failed.
    #[error("guest network file {path}: {source}")]
    GuestFile {
        /// Host-side path of the guest file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An in-guest command exceeded its time budget.
    #[error("command {command:?} in container {name} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Container the command ran in.
        name: String,
        /// Command line that was killed.
        command: Vec<String>,
        /// Budget that expired.
        after: Duration,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl LxcprovError {
    /// Shorthand for a [`LxcprovError::Backend`] error.
    pub fn backend(op: &'static str, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            op,
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, LxcprovError>;

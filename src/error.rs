//! Error types for Playscan.
//!
//! This module defines the error types used throughout the resolution engine.
//! Most of them are recoverable at some level: a missing role file simply
//! contributes nothing, a malformed task file is reported and skipped. Only
//! the root playbook turns them into fatal conditions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Playscan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Playscan.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Loading Errors
    // ========================================================================
    /// The requested file does not exist.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file exists but could not be deserialized.
    #[error("Failed to parse '{}': {message}", path.display())]
    MalformedConfig {
        /// Path to the offending file
        path: PathBuf,
        /// Parser message, including the location when known
        message: String,
    },

    /// The document parsed but does not have the expected shape.
    #[error("Invalid structure in '{}': {message}", path.display())]
    InvalidStructure {
        /// Path to the offending file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// A task's action type could not be inferred from its keys.
    #[error("Cannot infer action type from keys [{}]", keys.join(", "))]
    AmbiguousType {
        /// The keys left after removing all reserved keys
        keys: Vec<String>,
    },

    /// A task file, role or playbook re-enters itself.
    #[error("Cyclic dependency detected: {chain}")]
    CyclicDependency {
        /// Human-readable chain, outermost first
        chain: String,
    },

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new malformed config error.
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedConfig {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid structure error.
    pub fn invalid_structure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error means "the target contributes nothing"
    /// when it happens below the root document.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::FileNotFound(_)
                | Error::MalformedConfig { .. }
                | Error::InvalidStructure { .. }
                | Error::AmbiguousType { .. }
        )
    }

    /// A copy of a recoverable error, used to replay cached load failures.
    ///
    /// Returns `None` for errors that are not recoverable.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Error::FileNotFound(path) => Some(Error::FileNotFound(path.clone())),
            Error::MalformedConfig { path, message } => {
                Some(Error::malformed(path.clone(), message.clone()))
            }
            Error::InvalidStructure { path, message } => {
                Some(Error::invalid_structure(path.clone(), message.clone()))
            }
            Error::AmbiguousType { keys } => Some(Error::AmbiguousType { keys: keys.clone() }),
            _ => None,
        }
    }

    /// Returns true if the target file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileNotFound(_))
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::FileNotFound(_) => 2,
            Error::MalformedConfig { .. } | Error::InvalidStructure { .. } => 4,
            Error::CyclicDependency { .. } => 5,
            _ => 1,
        }
    }
}

//! Error types for teamfolder.
//!
//! This module defines all error types used throughout the teamfolder crate,
//! providing detailed context for debugging and actionable messages for users.
//!
//! User cancellation and declining to join are not errors; they are reported
//! as outcomes by the coordinator.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for teamfolder operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Identity Errors ===
    /// Failed to read the local identity file.
    #[error("failed to read identity file at {path}: {source}")]
    IdentityRead {
        /// Path to the identity file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the local identity file.
    #[error("failed to write identity file at {path}: {source}")]
    IdentityWrite {
        /// Path that couldn't be written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The identity file exists but could not be parsed.
    #[error("identity file corrupted at {path}: {message}")]
    IdentityCorrupted {
        /// Path to the identity file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Identity details were rejected (e.g. blank name).
    #[error("invalid identity: {message}")]
    InvalidIdentity {
        /// Why the identity was rejected.
        message: String,
    },

    /// No local identity has been created yet.
    #[error("no local identity exists; run `teamfolder identity init` first")]
    IdentityMissing,

    // === Folder Errors ===
    /// Access to the team folder was denied.
    #[error("permission denied for {path}")]
    PermissionDenied {
        /// Path that could not be accessed.
        path: PathBuf,
    },

    /// A file system operation inside the team folder failed.
    #[error("I/O error on {path}: {source}")]
    FolderIo {
        /// Path the operation targeted.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The folder handle no longer refers to a usable directory.
    #[error("team folder '{folder}' is unavailable: {message}")]
    FolderUnavailable {
        /// Display name of the folder.
        folder: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Roster Errors ===
    /// The roster document exists but could not be parsed.
    #[error("roster document corrupted at {path}: {message}")]
    RosterCorrupted {
        /// Path to the roster document.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The roster kept changing underneath us while writing.
    #[error("roster in '{folder}' changed concurrently; gave up after {attempts} attempts")]
    WriteConflict {
        /// Display name of the folder.
        folder: String,
        /// Number of write attempts made.
        attempts: u32,
    },

    // === Coordinator Errors ===
    /// An operation was requested in a state that does not allow it.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// The requested operation.
        action: &'static str,
        /// The current coordinator state.
        state: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for teamfolder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid identity error.
    #[must_use]
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    /// Classify an I/O error raised while touching the team folder.
    ///
    /// Permission failures get their own variant so callers can tell a revoked
    /// grant apart from an ordinary I/O fault.
    #[must_use]
    pub fn folder_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path }
        } else {
            Self::FolderIo { path, source }
        }
    }

    /// Create a folder unavailable error.
    #[must_use]
    pub fn folder_unavailable(folder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FolderUnavailable {
            folder: folder.into(),
            message: message.into(),
        }
    }

    /// Create an invalid transition error.
    #[must_use]
    pub fn invalid_transition(action: &'static str, state: impl ToString) -> Self {
        Self::InvalidTransition {
            action,
            state: state.to_string(),
        }
    }

    /// Check if this error is a permission issue.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Check if this error points at a damaged document rather than a failed operation.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::RosterCorrupted { .. } | Self::IdentityCorrupted { .. }
        )
    }

    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WriteConflict { .. } | Self::FolderIo { .. } | Self::IdentityWrite { .. }
        )
    }

    /// User-facing hint describing how to recover.
    #[must_use]
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } | Self::FolderUnavailable { .. } => {
                "Re-select the team folder and grant access again."
            }
            Self::RosterCorrupted { .. } => {
                "Run `teamfolder repair <DIR> --yes` to move the damaged roster aside, then connect again."
            }
            Self::IdentityCorrupted { .. } => {
                "Run `teamfolder identity reset` to back up the damaged identity and create a new one."
            }
            Self::IdentityMissing | Self::InvalidIdentity { .. } => {
                "Create a local identity with `teamfolder identity init --name <NAME>`."
            }
            Self::WriteConflict { .. } => {
                "Another team member is writing the roster. Try again in a moment."
            }
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } => {
                "Fix the configuration file and try again."
            }
            _ => "Check disk space and file permissions, then try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::IdentityMissing;
        assert!(err.to_string().contains("identity init"));

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_folder_io_maps_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = Error::folder_io("/shared/team", io_err);
        assert!(err.is_permission_error());
        assert!(err.to_string().contains("/shared/team"));
    }

    #[test]
    fn test_folder_io_keeps_other_kinds() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = Error::folder_io("/shared/team", io_err);
        assert!(matches!(err, Error::FolderIo { .. }));
        assert!(err.is_transient());
        assert!(!err.is_permission_error());
    }

    #[test]
    fn test_roster_corrupted_is_corruption() {
        let err = Error::RosterCorrupted {
            path: PathBuf::from("/team/.teamfolder/roster.json"),
            message: "expected value".to_string(),
        };
        assert!(err.is_corruption());
        assert!(!err.is_transient());
        assert!(err.recovery_hint().contains("repair"));
    }

    #[test]
    fn test_write_conflict_display() {
        let err = Error::WriteConflict {
            folder: "recruiting".to_string(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("recruiting"));
        assert!(msg.contains('3'));
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::invalid_transition("select a folder", "connected to 'team'");
        assert_eq!(
            err.to_string(),
            "cannot select a folder while connected to 'team'"
        );
    }

    #[test]
    fn test_invalid_identity() {
        let err = Error::invalid_identity("name must not be empty");
        assert_eq!(err.to_string(), "invalid identity: name must not be empty");
        assert!(err.recovery_hint().contains("identity init"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "max_write_attempts must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("max_write_attempts"));
    }

    #[test]
    fn test_every_error_has_hint() {
        let errors = vec![
            Error::IdentityMissing,
            Error::folder_unavailable("team", "gone"),
            Error::internal("x"),
            Error::ConfigValidation {
                message: "x".to_string(),
            },
        ];
        for err in errors {
            assert!(!err.recovery_hint().is_empty());
        }
    }
}

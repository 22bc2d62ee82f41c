//! Core error types for pomoledger-core.
//!
//! Every error here is recoverable: the controller reports it to the caller
//! and stays usable afterwards.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::EndReason;
use crate::storage::NewSession;

/// Core error type for pomoledger-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A focus or break interval is already active
    #[error("Session already running. Stop it first.")]
    AlreadyRunning,

    /// Command issued while idle or in the wrong sub-state
    #[error("No session running.")]
    NoActiveSession,

    /// Blank project name
    #[error("Project name required.")]
    EmptyProjectName,

    /// Store operation failed
    #[error("Persistence failure: {0}")]
    Persistence(#[from] DatabaseError),

    /// A finished interval could not be written. The draft is handed back so
    /// the caller can re-attempt the commit.
    #[error("Failed to record {} seconds of '{}': {source}", .draft.duration_secs, .draft.project_name)]
    CommitFailed {
        draft: NewSession,
        reason: EndReason,
        #[source]
        source: DatabaseError,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// The unsaved session carried by a failed commit, if any.
    pub fn unsaved_session(&self) -> Option<&NewSession> {
        match self {
            CoreError::CommitFailed { draft, .. } => Some(draft),
            _ => None,
        }
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Store is not reachable at all
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseBusy
                    || code.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

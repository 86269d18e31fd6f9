//! Error types for moyun-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using moyun-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in moyun-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A remote write was requested without a signed-in user
    #[error("Not signed in")]
    NotAuthenticated,

    /// Backup payload missing or unusable; nothing was changed locally
    #[error("Backup is unusable: {0}")]
    MalformedBackup(String),
}

impl Error {
    /// Short, human-readable reason suitable for a toast or CLI line.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote(RemoteError::PermissionDenied(_)) => {
                "Sync failed: the remote store denied access. Check the database rules for this account."
                    .to_string()
            }
            Self::Remote(RemoteError::Unavailable(_) | RemoteError::Http(_)) => {
                "Sync failed: the remote store could not be reached. Try again when online."
                    .to_string()
            }
            Self::NotAuthenticated => "Sign in to sync with the cloud.".to_string(),
            Self::MalformedBackup(reason) => format!("Restore aborted: {reason}"),
            other => other.to_string(),
        }
    }

    /// Whether this error is the distinguished permission-denied case.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::PermissionDenied(_)))
    }
}

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}", .0.user_message())]
    Core(#[from] moyun_core::Error),
    #[error(transparent)]
    Remote(#[from] moyun_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Document ID cannot be empty")]
    EmptyDocumentId,
    #[error("Document title cannot be empty")]
    EmptyTitle,
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Incomplete(String),
    #[error("Restore cancelled")]
    Cancelled,
    #[error(
        "Remote store is not configured. Run `moyun config set --database-url <URL> --user-id <ID>`, or set MOYUN_DATABASE_URL and MOYUN_USER_ID."
    )]
    RemoteNotConfigured,
}
